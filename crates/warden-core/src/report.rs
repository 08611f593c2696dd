use std::path::Path;

use serde::Serialize;

use crate::config::ReportConfig;
use crate::monitor::ScanReport;
use crate::probe::ProbeReport;

/// Where cycle reports are written, one JSON document per line.
#[derive(Debug)]
pub struct ReportSink {
    destination: ReportDestination,
}

#[derive(Debug)]
enum ReportDestination {
    Stdout,
    File(tokio::sync::Mutex<tokio::fs::File>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportEntry<'a> {
    Scan(&'a ScanReport),
    Probe(&'a ProbeReport),
}

impl Default for ReportSink {
    fn default() -> Self {
        Self {
            destination: ReportDestination::Stdout,
        }
    }
}

impl ReportSink {
    /// Create a sink from config. `stdout` routes reports through tracing.
    ///
    /// # Errors
    ///
    /// Returns an error if a file destination cannot be opened.
    pub async fn from_config(config: &ReportConfig) -> Result<Self, std::io::Error> {
        let destination = if config.destination == "stdout" {
            ReportDestination::Stdout
        } else {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(Path::new(&config.destination))
                .await?;
            ReportDestination::File(tokio::sync::Mutex::new(file))
        };

        Ok(Self { destination })
    }

    pub async fn emit(&self, entry: &ReportEntry<'_>) {
        let json = match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("failed to serialize report: {e}");
                return;
            }
        };

        match &self.destination {
            ReportDestination::Stdout => {
                tracing::info!(target: "report", "{json}");
            }
            ReportDestination::File(file) => {
                use tokio::io::AsyncWriteExt;
                let mut f = file.lock().await;
                let line = format!("{json}\n");
                if let Err(e) = f.write_all(line.as_bytes()).await {
                    tracing::error!("failed to write report: {e}");
                } else if let Err(e) = f.flush().await {
                    tracing::error!("failed to flush report: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;
    use warden_drive::NodeId;

    use super::*;
    use crate::remediation::{
        OutcomeReport, OutcomeSummary, RemovalOutcome, RemovalStatus,
    };
    use crate::resolver::ExposureCounts;

    fn scan_report() -> ScanReport {
        let cycle_id = Uuid::new_v4();
        ScanReport {
            cycle_id,
            nodes: 3,
            counts: ExposureCounts {
                private: 1,
                public_direct: 1,
                public_inherited: 1,
                public_both: 0,
            },
            outcome: OutcomeReport {
                cycle_id,
                started_at: Utc::now(),
                finished_at: Utc::now(),
                dry_run: false,
                outcomes: vec![RemovalOutcome {
                    node_id: NodeId::new("F"),
                    entry_id: "pF".into(),
                    status: RemovalStatus::Removed,
                    attempts: 1,
                }],
                summary: OutcomeSummary {
                    planned: 1,
                    removed: 1,
                    ..OutcomeSummary::default()
                },
            },
        }
    }

    #[test]
    fn scan_entry_serialization() {
        let report = scan_report();
        let json = serde_json::to_value(ReportEntry::Scan(&report)).unwrap();
        assert_eq!(json["kind"], "scan");
        assert_eq!(json["nodes"], 3);
        assert_eq!(json["counts"]["public_inherited"], 1);
        assert_eq!(json["outcome"]["outcomes"][0]["status"], "removed");
        assert_eq!(json["outcome"]["summary"]["removed"], 1);
    }

    #[tokio::test]
    async fn stdout_sink_from_config() {
        let sink = ReportSink::from_config(&ReportConfig::default())
            .await
            .unwrap();
        assert!(matches!(sink.destination, ReportDestination::Stdout));
        sink.emit(&ReportEntry::Scan(&scan_report())).await;
    }

    #[tokio::test]
    async fn file_sink_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports.jsonl");
        let config = ReportConfig {
            destination: path.display().to_string(),
        };

        let sink = ReportSink::from_config(&config).await.unwrap();
        let report = scan_report();
        sink.emit(&ReportEntry::Scan(&report)).await;
        sink.emit(&ReportEntry::Scan(&report)).await;
        drop(sink);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["kind"], "scan");
            assert_eq!(value["cycle_id"], report.cycle_id.to_string());
        }
    }

    #[tokio::test]
    async fn unwritable_destination_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = ReportConfig {
            destination: dir.path().join("missing/dir/report.jsonl").display().to_string(),
        };
        assert!(ReportSink::from_config(&config).await.is_err());
    }
}
