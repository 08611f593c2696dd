mod cycle;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use warden_core::config::{Config, LoggingConfig};
use warden_core::report::ReportSink;
use warden_core::vault::EnvVaultProvider;
use warden_core::{Monitor, RunMode};
use warden_drive::DriveClient;
use warden_drive::http::build_client;
use warden_scheduler::{RetryPolicy, Scheduler};

use crate::cycle::MonitorTask;

/// Audits a Google Drive account for public sharing and removes it.
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (also: WARDEN_CONFIG)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// What each cycle does: monitor, probe or both
    #[arg(long, value_name = "MODE")]
    mode: Option<RunMode>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Report what would be removed without removing it
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());
    let mut config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(mode) = cli.mode {
        config.scan.mode = mode;
    }
    if cli.dry_run {
        config.scan.dry_run = true;
    }
    config.validate()?;

    init_subscriber(&config.logging)?;
    tracing::info!(
        config = %config_path.display(),
        mode = %config.scan.mode,
        dry_run = config.scan.dry_run,
        "warden starting"
    );

    config.resolve_secrets(&EnvVaultProvider::default()).await?;
    let token = config
        .secrets
        .access_token
        .as_ref()
        .context("neither WARDEN_DRIVE_ACCESS_TOKEN nor WARDEN_DRIVE_ACCESS_TOKEN_FILE is set")?;

    let client = DriveClient::new(token.expose())
        .with_base_url(config.gateway.base_url.clone())
        .with_page_size(config.gateway.page_size)
        .with_client(build_client(
            Duration::from_secs(config.gateway.connect_timeout_secs),
            Duration::from_secs(config.gateway.timeout_secs),
        ));

    let sink = ReportSink::from_config(&config.report)
        .await
        .with_context(|| format!("opening report destination {}", config.report.destination))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let monitor = Monitor::new(client, &config)
        .with_sink(sink)
        .with_shutdown(shutdown_rx.clone());
    let task = MonitorTask::new(monitor, config.scan.mode);

    let mut scheduler = Scheduler::new(config.scan.interval(), Box::new(task), shutdown_rx)
        .with_retry(RetryPolicy {
            max_attempts: config.scan.max_fetch_attempts,
            ..RetryPolicy::default()
        });

    if cli.once {
        scheduler.run_once().await?;
    } else {
        scheduler.run().await?;
    }

    tracing::info!(cycles = scheduler.cycles(), "warden stopped");
    Ok(())
}

fn resolve_config_path(cli_path: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_path {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("WARDEN_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

fn init_subscriber(logging: &LoggingConfig) -> anyhow::Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let fmt_layer = tracing_subscriber::fmt::layer();

    let file_layer = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {path}"))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(file_layer)
        .init();
    Ok(())
}
