use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;
use warden_drive::{DeleteOutcome, NodeId, StorageGateway};

use crate::backoff::{BackoffPolicy, retry_rate_limited};
use crate::resolver::ExposureReport;
use crate::tree::Snapshot;

/// One direct `anyone` entry scheduled for removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalTarget {
    pub node_id: NodeId,
    pub node_name: String,
    pub entry_id: String,
    pub discoverable: bool,
    /// Inherited-only nodes that become private once this entry is gone.
    pub covers_descendants: usize,
    /// The entry sits on an ancestor above the scanned folder.
    pub outside_scope: bool,
}

/// Deduplicated removal targets for one cycle, ordered by (node, entry).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemediationPlan {
    targets: Vec<RemovalTarget>,
}

impl RemediationPlan {
    /// Collect every direct `anyone` entry responsible for public exposure.
    ///
    /// Inherited-only nodes resolve to their nearest public ancestor, so a
    /// shared folder is fixed once no matter how many descendants it exposes.
    /// That ancestor may lie above a scoped scan's root; such targets are kept
    /// and flagged `outside_scope`.
    #[must_use]
    pub fn build(snapshot: &Snapshot, report: &ExposureReport) -> Self {
        let mut targets: BTreeMap<(NodeId, String), RemovalTarget> = BTreeMap::new();

        for (id, verdict) in report.iter() {
            let (owner_id, inherited_only) = if verdict.exposure.is_direct() {
                (id, false)
            } else if let Some(ancestor) = verdict.inherited_from.as_ref() {
                (ancestor, true)
            } else {
                continue;
            };
            let Some(owner) = snapshot.get(owner_id) else {
                continue;
            };

            for entry in owner.direct_public_entries() {
                let target = targets
                    .entry((owner.id.clone(), entry.id.clone()))
                    .or_insert_with(|| RemovalTarget {
                        node_id: owner.id.clone(),
                        node_name: owner.name.clone(),
                        entry_id: entry.id.clone(),
                        discoverable: entry.discoverable,
                        covers_descendants: 0,
                        outside_scope: !snapshot.in_scope(&owner.id),
                    });
                if inherited_only {
                    target.covers_descendants += 1;
                }
            }
        }

        Self {
            targets: targets.into_values().collect(),
        }
    }

    #[must_use]
    pub fn targets(&self) -> &[RemovalTarget] {
        &self.targets
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    DryRun,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RemovalStatus {
    Removed,
    /// The entry was already gone; counts as success.
    AlreadyAbsent,
    Failed { error: String },
    Skipped { reason: SkipReason },
}

impl RemovalStatus {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Removed | Self::AlreadyAbsent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalOutcome {
    pub node_id: NodeId,
    pub entry_id: String,
    #[serde(flatten)]
    pub status: RemovalStatus,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeSummary {
    pub planned: usize,
    pub removed: usize,
    pub already_absent: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl OutcomeSummary {
    fn tally(outcomes: &[RemovalOutcome]) -> Self {
        let mut summary = Self {
            planned: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome.status {
                RemovalStatus::Removed => summary.removed += 1,
                RemovalStatus::AlreadyAbsent => summary.already_absent += 1,
                RemovalStatus::Failed { .. } => summary.failed += 1,
                RemovalStatus::Skipped { .. } => summary.skipped += 1,
            }
        }
        summary
    }
}

/// Everything one remediation pass did.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub outcomes: Vec<RemovalOutcome>,
    pub summary: OutcomeSummary,
}

impl OutcomeReport {
    #[must_use]
    pub fn failures(&self) -> impl Iterator<Item = &RemovalOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, RemovalStatus::Failed { .. }))
    }
}

/// Issues the removals of a [`RemediationPlan`] with bounded fan-out.
pub struct RemediationDriver<'a, G> {
    gateway: &'a G,
    backoff: BackoffPolicy,
    concurrency: usize,
    dry_run: bool,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<'a, G: StorageGateway> RemediationDriver<'a, G> {
    #[must_use]
    pub fn new(gateway: &'a G, backoff: BackoffPolicy) -> Self {
        Self {
            gateway,
            backoff,
            concurrency: 8,
            dry_run: false,
            shutdown: None,
        }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Removals not yet started when this flips to `true` are skipped.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn cancelled(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Attempt every target once. Individual failures never stop the pass.
    pub async fn execute(&self, cycle_id: Uuid, plan: &RemediationPlan) -> OutcomeReport {
        let started_at = Utc::now();

        let mut outcomes: Vec<RemovalOutcome> =
            futures::stream::iter(plan.targets().iter().cloned())
                .map(|target| self.remove(target))
                .buffer_unordered(self.concurrency)
                .collect()
                .await;
        outcomes.sort_by(|a, b| (&a.node_id, &a.entry_id).cmp(&(&b.node_id, &b.entry_id)));

        let summary = OutcomeSummary::tally(&outcomes);
        tracing::info!(
            %cycle_id,
            planned = summary.planned,
            removed = summary.removed,
            already_absent = summary.already_absent,
            failed = summary.failed,
            skipped = summary.skipped,
            "remediation pass finished"
        );

        OutcomeReport {
            cycle_id,
            started_at,
            finished_at: Utc::now(),
            dry_run: self.dry_run,
            outcomes,
            summary,
        }
    }

    async fn remove(&self, target: RemovalTarget) -> RemovalOutcome {
        let skipped = |reason| RemovalOutcome {
            node_id: target.node_id.clone(),
            entry_id: target.entry_id.clone(),
            status: RemovalStatus::Skipped { reason },
            attempts: 0,
        };

        if self.dry_run {
            tracing::info!(
                node_id = %target.node_id,
                entry_id = %target.entry_id,
                node_name = %target.node_name,
                "dry run: would remove public sharing"
            );
            return skipped(SkipReason::DryRun);
        }
        if self.cancelled() {
            return skipped(SkipReason::Cancelled);
        }

        let retried = retry_rate_limited(&self.backoff, "permission removal", || {
            self.gateway
                .delete_permission(&target.node_id, &target.entry_id)
        })
        .await;

        let status = match retried.result {
            Ok(DeleteOutcome::Deleted) => {
                tracing::info!(
                    node_id = %target.node_id,
                    entry_id = %target.entry_id,
                    node_name = %target.node_name,
                    covers_descendants = target.covers_descendants,
                    outside_scope = target.outside_scope,
                    "removed public sharing"
                );
                RemovalStatus::Removed
            }
            Ok(DeleteOutcome::NotFound) => {
                tracing::debug!(
                    node_id = %target.node_id,
                    entry_id = %target.entry_id,
                    "public entry already absent"
                );
                RemovalStatus::AlreadyAbsent
            }
            Err(e) => {
                tracing::warn!(
                    node_id = %target.node_id,
                    entry_id = %target.entry_id,
                    attempts = retried.attempts,
                    "failed to remove public sharing: {e}"
                );
                RemovalStatus::Failed {
                    error: e.to_string(),
                }
            }
        };

        RemovalOutcome {
            node_id: target.node_id,
            entry_id: target.entry_id,
            status,
            attempts: retried.attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use warden_drive::mock::{GatewayCall, MockFailure, MockGateway, anyone, file, folder, user};
    use warden_drive::{
        ArtifactOptions, GatewayError, NodeKind, NodePage, PermissionEntry, PermissionRequest,
        RemoteNode, Role,
    };

    use super::*;
    use crate::resolver::resolve;

    fn fast_backoff() -> BackoffPolicy {
        BackoffPolicy {
            max_retries: 2,
            base: Duration::from_millis(1),
            cap: Duration::from_millis(2),
        }
    }

    fn scenario() -> Vec<RemoteNode> {
        vec![
            folder("F", None).with_permission(anyone("pF", false)),
            file("A", Some("F")),
            file("B", Some("F")).with_permission(anyone("pB", true)),
            folder("G", Some("F")),
            file("C", Some("G")),
            file("private", None).with_permission(user("u1", "a@example.com", Role::Writer)),
        ]
    }

    fn plan_for(nodes: Vec<RemoteNode>) -> RemediationPlan {
        let snapshot = Snapshot::from_nodes(nodes);
        let report = resolve(&snapshot).unwrap();
        RemediationPlan::build(&snapshot, &report)
    }

    #[test]
    fn plan_targets_each_direct_entry_once() {
        let plan = plan_for(scenario());
        let pairs: Vec<(&str, &str)> = plan
            .targets()
            .iter()
            .map(|t| (t.node_id.as_str(), t.entry_id.as_str()))
            .collect();
        assert_eq!(pairs, vec![("B", "pB"), ("F", "pF")]);

        let folder_target = &plan.targets()[1];
        // A, G and C are exposed only through F.
        assert_eq!(folder_target.covers_descendants, 3);
        assert!(!folder_target.discoverable);
        assert!(plan.targets()[0].discoverable);
    }

    #[test]
    fn plan_includes_every_anyone_entry_on_a_node() {
        let plan = plan_for(vec![
            file("f", None)
                .with_permission(anyone("p1", false))
                .with_permission(anyone("p2", true)),
        ]);
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn ancestor_above_scope_is_flagged_not_dropped() {
        let mut snapshot = Snapshot::from_nodes([
            folder("top", None).with_permission(anyone("p-top", false)),
            folder("scope", Some("top")),
            file("doc", Some("scope")).with_permission(anyone("p-doc", true)),
            file("other", Some("top")),
        ]);
        assert!(snapshot.restrict_to(&NodeId::new("scope")));
        let plan = RemediationPlan::build(&snapshot, &resolve(&snapshot).unwrap());

        let pairs: Vec<(&str, &str, bool)> = plan
            .targets()
            .iter()
            .map(|t| (t.node_id.as_str(), t.entry_id.as_str(), t.outside_scope))
            .collect();
        assert_eq!(pairs, vec![("doc", "p-doc", false), ("top", "p-top", true)]);
        // Only `scope` is exposed solely through `top`; `other` is out of scope.
        assert_eq!(plan.targets()[1].covers_descendants, 1);
    }

    #[test]
    fn private_tree_has_empty_plan() {
        let plan = plan_for(vec![folder("d", None), file("x", Some("d"))]);
        assert!(plan.is_empty());
    }

    #[tokio::test]
    async fn removes_and_converges() {
        let gateway = MockGateway::new().with_nodes(scenario());
        let plan = plan_for(scenario());
        let report = RemediationDriver::new(&gateway, fast_backoff())
            .execute(Uuid::new_v4(), &plan)
            .await;

        assert_eq!(report.summary.removed, 2);
        assert_eq!(report.summary.failed, 0);
        assert!(report.outcomes.iter().all(|o| o.attempts == 1));
        assert!(
            gateway
                .permissions_of(&NodeId::new("F"))
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            gateway.count_calls(|c| matches!(c, GatewayCall::DeletePermission { .. })),
            2
        );
    }

    #[tokio::test]
    async fn missing_entry_counts_as_already_absent() {
        let gateway = MockGateway::new().with_nodes(scenario());
        let plan = plan_for(scenario());
        assert!(gateway.remove_permission_externally(&NodeId::new("B"), "pB"));

        let report = RemediationDriver::new(&gateway, fast_backoff())
            .execute(Uuid::new_v4(), &plan)
            .await;
        let b = report
            .outcomes
            .iter()
            .find(|o| o.node_id.as_str() == "B")
            .unwrap();
        assert_eq!(b.status, RemovalStatus::AlreadyAbsent);
        assert!(b.status.is_success());
        assert_eq!(report.summary.already_absent, 1);
        assert_eq!(report.summary.removed, 1);
    }

    #[tokio::test]
    async fn rate_limit_retries_then_succeeds() {
        let gateway = MockGateway::new().with_nodes(scenario());
        gateway.fail_delete_permission(
            &NodeId::new("F"),
            "pF",
            [MockFailure::RateLimited, MockFailure::RateLimited],
        );
        let report = RemediationDriver::new(&gateway, fast_backoff())
            .execute(Uuid::new_v4(), &plan_for(scenario()))
            .await;
        let f = report
            .outcomes
            .iter()
            .find(|o| o.node_id.as_str() == "F")
            .unwrap();
        assert_eq!(f.status, RemovalStatus::Removed);
        assert_eq!(f.attempts, 3);
    }

    #[tokio::test]
    async fn exhausted_rate_limit_fails_without_aborting_others() {
        let gateway = MockGateway::new().with_nodes(scenario());
        gateway.fail_delete_permission(&NodeId::new("F"), "pF", [MockFailure::RateLimited; 5]);
        let report = RemediationDriver::new(&gateway, fast_backoff())
            .execute(Uuid::new_v4(), &plan_for(scenario()))
            .await;

        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.removed, 1);
        let failed: Vec<_> = report.failures().collect();
        assert_eq!(failed[0].node_id.as_str(), "F");
        assert_eq!(failed[0].attempts, 3);
        assert!(
            gateway
                .permissions_of(&NodeId::new("B"))
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn non_rate_limit_error_is_not_retried() {
        let gateway = MockGateway::new().with_nodes(scenario());
        gateway.fail_delete_permission(&NodeId::new("B"), "pB", [MockFailure::Forbidden]);
        let report = RemediationDriver::new(&gateway, fast_backoff())
            .execute(Uuid::new_v4(), &plan_for(scenario()))
            .await;
        let b = report
            .outcomes
            .iter()
            .find(|o| o.node_id.as_str() == "B")
            .unwrap();
        assert!(matches!(b.status, RemovalStatus::Failed { .. }));
        assert_eq!(b.attempts, 1);
    }

    #[tokio::test]
    async fn dry_run_issues_no_deletes() {
        let gateway = MockGateway::new().with_nodes(scenario());
        let report = RemediationDriver::new(&gateway, fast_backoff())
            .with_dry_run(true)
            .execute(Uuid::new_v4(), &plan_for(scenario()))
            .await;
        assert!(report.dry_run);
        assert_eq!(report.summary.skipped, 2);
        assert!(report.outcomes.iter().all(|o| o.status
            == RemovalStatus::Skipped {
                reason: SkipReason::DryRun
            }));
        assert_eq!(
            gateway.count_calls(|c| matches!(c, GatewayCall::DeletePermission { .. })),
            0
        );
    }

    #[tokio::test]
    async fn shutdown_skips_pending_removals() {
        let gateway = MockGateway::new().with_nodes(scenario());
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let report = RemediationDriver::new(&gateway, fast_backoff())
            .with_shutdown(rx)
            .execute(Uuid::new_v4(), &plan_for(scenario()))
            .await;
        assert_eq!(report.summary.skipped, 2);
        assert!(report.outcomes.iter().all(|o| o.attempts == 0));
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn second_pass_is_idempotent() {
        let gateway = MockGateway::new().with_nodes(scenario());
        let plan = plan_for(scenario());
        let driver = RemediationDriver::new(&gateway, fast_backoff()).with_concurrency(1);
        driver.execute(Uuid::new_v4(), &plan).await;
        let again = driver.execute(Uuid::new_v4(), &plan).await;
        assert_eq!(again.summary.already_absent, 2);
        assert_eq!(again.summary.failed, 0);
    }

    #[test]
    fn outcome_serializes_with_flat_status() {
        let outcome = RemovalOutcome {
            node_id: NodeId::new("F"),
            entry_id: "pF".into(),
            status: RemovalStatus::Skipped {
                reason: SkipReason::DryRun,
            },
            attempts: 0,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "dry_run");
        assert_eq!(json["node_id"], "F");
    }

    /// Delays every removal and records how many overlap.
    struct SlowGateway {
        inner: MockGateway,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowGateway {
        fn new(inner: MockGateway) -> Self {
            Self {
                inner,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    impl StorageGateway for SlowGateway {
        async fn list_nodes(&self, page_token: Option<&str>) -> Result<NodePage, GatewayError> {
            self.inner.list_nodes(page_token).await
        }

        async fn list_permissions(
            &self,
            node: &NodeId,
        ) -> Result<Vec<PermissionEntry>, GatewayError> {
            self.inner.list_permissions(node).await
        }

        async fn create_permission(
            &self,
            node: &NodeId,
            request: &PermissionRequest,
        ) -> Result<String, GatewayError> {
            self.inner.create_permission(node, request).await
        }

        async fn delete_permission(
            &self,
            node: &NodeId,
            entry_id: &str,
        ) -> Result<DeleteOutcome, GatewayError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.inner.delete_permission(node, entry_id).await
        }

        async fn create_artifact(
            &self,
            kind: NodeKind,
            parent: Option<&NodeId>,
            options: &ArtifactOptions,
        ) -> Result<NodeId, GatewayError> {
            self.inner.create_artifact(kind, parent, options).await
        }

        async fn delete_artifact(&self, node: &NodeId) -> Result<(), GatewayError> {
            self.inner.delete_artifact(node).await
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn concurrency_bounds_removals_in_flight() {
        let nodes: Vec<RemoteNode> = (0..8)
            .map(|i| file(&format!("f{i}"), None).with_permission(anyone(&format!("p{i}"), false)))
            .collect();
        let gateway = SlowGateway::new(MockGateway::new().with_nodes(nodes.clone()));
        let plan = plan_for(nodes);

        let report = RemediationDriver::new(&gateway, fast_backoff())
            .with_concurrency(3)
            .execute(Uuid::new_v4(), &plan)
            .await;

        assert_eq!(report.summary.removed, 8);
        let peak = gateway.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak {peak} exceeded the limit");
        assert!(peak > 1, "removals never overlapped");
    }

    #[tokio::test]
    async fn concurrency_of_one_is_sequential() {
        let nodes: Vec<RemoteNode> = (0..4)
            .map(|i| file(&format!("f{i}"), None).with_permission(anyone(&format!("p{i}"), true)))
            .collect();
        let gateway = SlowGateway::new(MockGateway::new().with_nodes(nodes.clone()));
        let plan = plan_for(nodes);

        RemediationDriver::new(&gateway, fast_backoff())
            .with_concurrency(1)
            .execute(Uuid::new_v4(), &plan)
            .await;
        assert_eq!(gateway.peak.load(Ordering::SeqCst), 1);
    }
}
