use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;
use warden_drive::{NodeId, StorageGateway};

use crate::backoff::BackoffPolicy;
pub use crate::config::RunMode;
use crate::config::{Config, ProbeConfig};
use crate::error::{CycleError, ProbeError};
use crate::fetcher::{FetchScope, Fetcher};
use crate::probe::{Probe, ProbeReport};
use crate::remediation::{OutcomeReport, RemediationDriver, RemediationPlan};
use crate::report::{ReportEntry, ReportSink};
use crate::resolver::{ExposureCounts, resolve};

/// Result of the scan and remediate half of a cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub cycle_id: Uuid,
    pub nodes: usize,
    pub counts: ExposureCounts,
    pub outcome: OutcomeReport,
}

#[derive(Debug, Default)]
pub struct CycleReport {
    pub scan: Option<ScanReport>,
    pub probe: Option<ProbeReport>,
}

/// Wires fetcher, resolver, remediation driver and probe into one cycle.
pub struct Monitor<G> {
    gateway: G,
    scope: FetchScope,
    max_pages: usize,
    backoff: BackoffPolicy,
    concurrency: usize,
    dry_run: bool,
    probe: ProbeConfig,
    sink: Option<ReportSink>,
    shutdown: Option<watch::Receiver<bool>>,
    probed: AtomicBool,
}

impl<G: StorageGateway> Monitor<G> {
    #[must_use]
    pub fn new(gateway: G, config: &Config) -> Self {
        Self {
            gateway,
            scope: FetchScope {
                root: config.scan.root.as_deref().map(NodeId::from),
            },
            max_pages: config.gateway.max_pages,
            backoff: config.remediation.backoff(),
            concurrency: config.remediation.concurrency,
            dry_run: config.scan.dry_run,
            probe: config.probe.clone(),
            sink: None,
            shutdown: None,
            probed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: ReportSink) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Fetch, resolve and remediate once.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be fetched or is structurally invalid.
    pub async fn scan(&self) -> Result<ScanReport, CycleError> {
        let cycle_id = Uuid::new_v4();
        tracing::info!(%cycle_id, gateway = self.gateway.name(), "scan started");

        let snapshot = Fetcher::new(&self.gateway)
            .with_max_pages(self.max_pages)
            .fetch(&self.scope)
            .await?;
        let report = resolve(&snapshot)?;
        let counts = report.counts();
        tracing::info!(
            %cycle_id,
            nodes = report.len(),
            public = counts.public(),
            public_direct = counts.public_direct,
            public_inherited = counts.public_inherited,
            public_both = counts.public_both,
            "exposure resolved"
        );

        let plan = RemediationPlan::build(&snapshot, &report);
        let mut driver = RemediationDriver::new(&self.gateway, self.backoff)
            .with_concurrency(self.concurrency)
            .with_dry_run(self.dry_run);
        if let Some(rx) = &self.shutdown {
            driver = driver.with_shutdown(rx.clone());
        }
        let outcome = driver.execute(cycle_id, &plan).await;

        Ok(ScanReport {
            cycle_id,
            nodes: report.len(),
            counts,
            outcome,
        })
    }

    /// Run the default-sharing probe once.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway rejects the credentials.
    pub async fn probe(&self) -> Result<ProbeReport, ProbeError> {
        Probe::new(&self.gateway, &self.probe)
            .run(Uuid::new_v4())
            .await
    }

    /// One full cycle in `mode`. The probe runs on the first cycle only
    /// unless `probe.every_cycle` is set.
    ///
    /// # Errors
    ///
    /// Returns the first error that aborts the cycle.
    pub async fn run_cycle(&self, mode: RunMode) -> Result<CycleReport, CycleError> {
        let mut cycle = CycleReport::default();

        if mode.probes() && (self.probe.every_cycle || !self.probed.swap(true, Ordering::SeqCst))
        {
            let report = self.probe().await?;
            self.emit(&ReportEntry::Probe(&report)).await;
            cycle.probe = Some(report);
        }

        if mode.scans() {
            let report = self.scan().await?;
            self.emit(&ReportEntry::Scan(&report)).await;
            cycle.scan = Some(report);
        }

        Ok(cycle)
    }

    async fn emit(&self, entry: &ReportEntry<'_>) {
        if let Some(sink) = &self.sink {
            sink.emit(entry).await;
        }
    }
}
