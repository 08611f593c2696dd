use super::{Config, RunMode};

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_gateway();
        self.apply_env_overrides_scan();
        self.apply_env_overrides_output();
    }

    fn apply_env_overrides_gateway(&mut self) {
        if let Ok(v) = std::env::var("WARDEN_GATEWAY_BASE_URL") {
            self.gateway.base_url = v;
        }
        if let Ok(v) = std::env::var("WARDEN_GATEWAY_PAGE_SIZE")
            && let Ok(size) = v.parse::<u32>()
        {
            self.gateway.page_size = size;
        }
        if let Ok(v) = std::env::var("WARDEN_GATEWAY_TIMEOUT")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.gateway.timeout_secs = secs;
        }
        if let Ok(v) = std::env::var("WARDEN_GATEWAY_MAX_PAGES")
            && let Ok(pages) = v.parse::<usize>()
        {
            self.gateway.max_pages = pages;
        }
    }

    fn apply_env_overrides_scan(&mut self) {
        if let Ok(v) = std::env::var("WARDEN_MODE") {
            match v.parse::<RunMode>() {
                Ok(mode) => self.scan.mode = mode,
                Err(e) => tracing::warn!("ignoring invalid WARDEN_MODE value: {e}"),
            }
        }
        if let Ok(v) = std::env::var("WARDEN_SCAN_INTERVAL")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.scan.interval_secs = secs;
        }
        if let Ok(v) = std::env::var("WARDEN_SCAN_ROOT") {
            self.scan.root = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Ok(v) = std::env::var("WARDEN_DRY_RUN")
            && let Ok(dry_run) = v.parse::<bool>()
        {
            self.scan.dry_run = dry_run;
        }
        if let Ok(v) = std::env::var("WARDEN_REMEDIATION_CONCURRENCY")
            && let Ok(n) = v.parse::<usize>()
        {
            self.remediation.concurrency = n;
        }
        if let Ok(v) = std::env::var("WARDEN_REMEDIATION_MAX_RETRIES")
            && let Ok(n) = v.parse::<u32>()
        {
            self.remediation.max_retries = n;
        }
        if let Ok(v) = std::env::var("WARDEN_PROBE_DOMAIN") {
            self.probe.domain = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Ok(v) = std::env::var("WARDEN_PROBE_IDENTITY") {
            self.probe.identity = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Ok(v) = std::env::var("WARDEN_PROBE_EVERY_CYCLE")
            && let Ok(every) = v.parse::<bool>()
        {
            self.probe.every_cycle = every;
        }
    }

    fn apply_env_overrides_output(&mut self) {
        if let Ok(v) = std::env::var("WARDEN_REPORT_DESTINATION") {
            self.report.destination = v;
        }
        if let Ok(v) = std::env::var("WARDEN_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("WARDEN_LOG_FILE") {
            self.logging.file = Some(v).filter(|s| !s.trim().is_empty());
        }
    }
}
