use std::future::Future;
use std::pin::Pin;

use warden_core::{CycleError, CycleReport, Monitor, RunMode};
use warden_drive::StorageGateway;
use warden_scheduler::{CycleHandler, SchedulerError};

/// Adapts a [`Monitor`] to the scheduler.
pub struct MonitorTask<G> {
    monitor: Monitor<G>,
    mode: RunMode,
}

impl<G: StorageGateway> MonitorTask<G> {
    pub fn new(monitor: Monitor<G>, mode: RunMode) -> Self {
        Self { monitor, mode }
    }

    async fn cycle(&self, mode: RunMode) -> Result<(), SchedulerError> {
        match self.monitor.run_cycle(mode).await {
            Ok(report) => {
                log_cycle(&report);
                Ok(())
            }
            Err(e) => Err(classify(&e)),
        }
    }
}

/// Mode for a retry within the same tick. Only the scan can fail
/// transiently, and the probe of the first attempt already ran.
fn retry_mode(mode: RunMode) -> RunMode {
    if mode.scans() { RunMode::Monitor } else { mode }
}

impl<G: StorageGateway> CycleHandler for MonitorTask<G> {
    fn run_cycle(&self) -> Pin<Box<dyn Future<Output = Result<(), SchedulerError>> + Send + '_>> {
        Box::pin(self.cycle(self.mode))
    }

    fn retry_cycle(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<(), SchedulerError>> + Send + '_>> {
        Box::pin(self.cycle(retry_mode(self.mode)))
    }

    fn name(&self) -> &str {
        "monitor"
    }
}

fn log_cycle(report: &CycleReport) {
    if let Some(scan) = &report.scan {
        let summary = &scan.outcome.summary;
        tracing::info!(
            cycle_id = %scan.cycle_id,
            nodes = scan.nodes,
            public = scan.counts.public(),
            removed = summary.removed,
            already_absent = summary.already_absent,
            failed = summary.failed,
            skipped = summary.skipped,
            "scan cycle complete"
        );
    }
    if let Some(probe) = &report.probe {
        if probe.has_drift() {
            tracing::warn!(
                run_id = %probe.run_id,
                findings = probe.findings.len(),
                default_grants = probe.default_grants.len(),
                "sharing defaults differ from requests"
            );
        }
        if !probe.orphaned_artifacts.is_empty() {
            tracing::error!(
                run_id = %probe.run_id,
                orphaned = probe.orphaned_artifacts.len(),
                "probe left test artifacts behind; delete them manually"
            );
        }
    }
}

fn classify(e: &CycleError) -> SchedulerError {
    if e.is_fatal() {
        SchedulerError::Fatal(e.to_string())
    } else if e.is_transient() {
        SchedulerError::Transient(e.to_string())
    } else {
        SchedulerError::Defect(e.to_string())
    }
}
