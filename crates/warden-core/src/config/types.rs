use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_drive::drive::{DEFAULT_BASE_URL, DEFAULT_PAGE_SIZE};

use crate::backoff::BackoffPolicy;
use crate::fetcher::DEFAULT_MAX_PAGES;
use crate::probe::VisibilityRequest;
use crate::vault::AccessToken;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub remediation: RemediationConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}

/// Which halves of a cycle run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Scan and remediate only.
    Monitor,
    /// Default-sharing probe only.
    Probe,
    #[default]
    Both,
}

impl RunMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monitor => "monitor",
            Self::Probe => "probe",
            Self::Both => "both",
        }
    }

    #[must_use]
    pub fn scans(self) -> bool {
        matches!(self, Self::Monitor | Self::Both)
    }

    #[must_use]
    pub fn probes(self) -> bool {
        matches!(self, Self::Probe | Self::Both)
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "monitor" => Ok(Self::Monitor),
            "probe" => Ok(Self::Probe),
            "both" => Ok(Self::Both),
            other => Err(format!(
                "unknown run mode `{other}` (expected monitor, probe or both)"
            )),
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_max_pages() -> usize {
    DEFAULT_MAX_PAGES
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Upper bound on listing pages per scan; guards against a cursor that never ends.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_pages: default_max_pages(),
        }
    }
}

fn default_interval_secs() -> u64 {
    60
}

fn default_max_fetch_attempts() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub mode: RunMode,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Restrict the scan to this folder and its descendants.
    #[serde(default)]
    pub root: Option<String>,
    /// Plan and report remediation without issuing removals.
    #[serde(default)]
    pub dry_run: bool,
    /// Attempts per cycle when the listing fails transiently.
    #[serde(default = "default_max_fetch_attempts")]
    pub max_fetch_attempts: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            interval_secs: default_interval_secs(),
            root: None,
            dry_run: false,
            max_fetch_attempts: default_max_fetch_attempts(),
        }
    }
}

impl ScanConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_concurrency() -> usize {
    8
}

fn default_max_retries() -> u32 {
    4
}

fn default_base_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemediationConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Retries after a rate-limited removal before it is reported as failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

impl RemediationConfig {
    #[must_use]
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_retries: self.max_retries,
            base: Duration::from_millis(self.base_backoff_ms),
            cap: Duration::from_secs(self.max_backoff_secs),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    /// Folder the probe artifacts are created in; account root when unset.
    #[serde(default)]
    pub parent: Option<String>,
    /// Enables the domain case of the default request set.
    #[serde(default)]
    pub domain: Option<String>,
    /// Enables the specific-identity case of the default request set.
    #[serde(default)]
    pub identity: Option<String>,
    /// Also compare artifacts created with and without default visibility.
    #[serde(default = "default_true")]
    pub default_visibility: bool,
    /// Probe on every cycle instead of only the first.
    #[serde(default)]
    pub every_cycle: bool,
    /// Replaces the default request set when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cases: Option<Vec<VisibilityRequest>>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            parent: None,
            domain: None,
            identity: None,
            default_visibility: true,
            every_cycle: false,
            cases: None,
        }
    }
}

impl ProbeConfig {
    #[must_use]
    pub fn requests(&self) -> Vec<VisibilityRequest> {
        match &self.cases {
            Some(cases) => cases.clone(),
            None => {
                VisibilityRequest::default_set(self.domain.as_deref(), self.identity.as_deref())
            }
        }
    }
}

fn default_report_destination() -> String {
    "stdout".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    /// `stdout` or a path to a JSON-lines file.
    #[serde(default = "default_report_destination")]
    pub destination: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            destination: default_report_destination(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Also append logs to this file.
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ResolvedSecrets {
    pub access_token: Option<AccessToken>,
}
