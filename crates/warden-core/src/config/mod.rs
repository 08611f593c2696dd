mod env;
mod types;


pub use types::*;

use std::path::Path;

use anyhow::{Context, bail};

use crate::vault::VaultProvider;

/// Drive API hard limit on `pageSize`.
const MAX_PAGE_SIZE: u32 = 1000;

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.gateway.base_url.trim().is_empty() {
            bail!("gateway.base_url must not be empty");
        }
        if self.gateway.page_size == 0 || self.gateway.page_size > MAX_PAGE_SIZE {
            bail!(
                "gateway.page_size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.gateway.page_size
            );
        }
        if self.gateway.max_pages == 0 {
            bail!("gateway.max_pages must be at least 1");
        }
        if self.scan.interval_secs == 0 {
            bail!("scan.interval_secs must be at least 1");
        }
        if self.scan.max_fetch_attempts == 0 {
            bail!("scan.max_fetch_attempts must be at least 1");
        }
        if self.remediation.concurrency == 0 {
            bail!("remediation.concurrency must be at least 1");
        }
        let max_backoff_ms = self.remediation.max_backoff_secs.saturating_mul(1000);
        if self.remediation.base_backoff_ms > max_backoff_ms {
            bail!("remediation.base_backoff_ms must not exceed remediation.max_backoff_secs");
        }
        if self.report.destination.trim().is_empty() {
            bail!("report.destination must not be empty");
        }
        Ok(())
    }

    /// Resolve the Drive access token through `vault`.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured token file cannot be read.
    pub async fn resolve_secrets(&mut self, vault: &impl VaultProvider) -> anyhow::Result<()> {
        self.secrets.access_token = vault
            .access_token()
            .await
            .context("resolving drive access token")?;
        Ok(())
    }
}
