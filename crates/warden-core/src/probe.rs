//! Default-sharing probe.
//!
//! Creates throwaway artifacts, grants each configured visibility request,
//! reads the resulting entries back and reports every field where the
//! provider stored something other than what was asked for. Each artifact is
//! deleted exactly once whatever happens in between.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_drive::{
    ArtifactOptions, GatewayError, GranteeType, NodeId, NodeKind, PermissionEntry,
    PermissionRequest, Role, StorageGateway,
};

use crate::config::ProbeConfig;
use crate::error::ProbeError;

const DEFAULT_VISIBILITY_CASE: &str = "default-visibility";

/// A permission the probe asks the provider to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityRequest {
    pub label: String,
    pub grantee: GranteeType,
    pub role: Role,
    /// Only sent for `anyone` grants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discoverable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl VisibilityRequest {
    /// Anyone with and without discoverability, plus a domain and a specific
    /// identity case when those targets are known.
    #[must_use]
    pub fn default_set(domain: Option<&str>, identity: Option<&str>) -> Vec<Self> {
        let mut set = vec![
            Self::from_request(
                "anyone-discoverable",
                PermissionRequest::anyone(Role::Reader, true),
            ),
            Self::from_request(
                "anyone-link-only",
                PermissionRequest::anyone(Role::Reader, false),
            ),
        ];
        if let Some(domain) = domain {
            set.push(Self::from_request(
                "domain",
                PermissionRequest::domain(Role::Reader, domain),
            ));
        }
        if let Some(identity) = identity {
            set.push(Self::from_request(
                "specific-identity",
                PermissionRequest::user(Role::Reader, identity),
            ));
        }
        set
    }

    fn from_request(label: &str, request: PermissionRequest) -> Self {
        Self {
            label: label.to_owned(),
            grantee: request.grantee,
            role: request.role,
            discoverable: request.discoverable,
            domain: request.domain,
            email: request.email,
        }
    }

    #[must_use]
    pub fn to_request(&self) -> PermissionRequest {
        PermissionRequest {
            grantee: self.grantee,
            role: self.role,
            discoverable: self
                .discoverable
                .filter(|_| self.grantee == GranteeType::Anyone),
            domain: self.domain.clone(),
            email: self.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftField {
    GranteeType,
    Role,
    Discoverability,
    /// The requested entry is missing altogether.
    Presence,
}

/// A field the provider stored differently from the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefaultDriftFinding {
    pub case: String,
    pub artifact: NodeId,
    pub field: DriftField,
    pub requested: String,
    pub observed: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeCase {
    pub request: VisibilityRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
    pub observed: Vec<PermissionEntry>,
}

/// An entry the account adds to new files on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefaultGrant {
    pub grantee: GranteeType,
    pub role: Role,
    pub discoverable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStage {
    Create,
    Grant,
    Fetch,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeFailure {
    pub case: String,
    pub stage: ProbeStage,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cases: Vec<ProbeCase>,
    pub findings: Vec<DefaultDriftFinding>,
    pub default_grants: Vec<DefaultGrant>,
    pub failures: Vec<ProbeFailure>,
    pub orphaned_artifacts: Vec<NodeId>,
}

impl ProbeReport {
    fn new(run_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            started_at: now,
            finished_at: now,
            cases: Vec::new(),
            findings: Vec::new(),
            default_grants: Vec::new(),
            failures: Vec::new(),
            orphaned_artifacts: Vec::new(),
        }
    }

    #[must_use]
    pub fn has_drift(&self) -> bool {
        !self.findings.is_empty() || !self.default_grants.is_empty()
    }

    fn fail(&mut self, case: &str, stage: ProbeStage, error: &ProbeError) {
        tracing::warn!(case, ?stage, "probe step failed: {error}");
        self.failures.push(ProbeFailure {
            case: case.to_owned(),
            stage,
            error: error.to_string(),
        });
    }
}

/// Runs the configured visibility requests against a gateway.
pub struct Probe<'a, G> {
    gateway: &'a G,
    parent: Option<NodeId>,
    requests: Vec<VisibilityRequest>,
    default_visibility: bool,
}

impl<'a, G: StorageGateway> Probe<'a, G> {
    #[must_use]
    pub fn new(gateway: &'a G, config: &ProbeConfig) -> Self {
        Self {
            gateway,
            parent: config.parent.as_deref().map(NodeId::from),
            requests: config.requests(),
            default_visibility: config.default_visibility,
        }
    }

    #[must_use]
    pub fn with_requests(mut self, requests: Vec<VisibilityRequest>) -> Self {
        self.requests = requests;
        self
    }

    #[must_use]
    pub fn with_default_visibility(mut self, enabled: bool) -> Self {
        self.default_visibility = enabled;
        self
    }

    /// Probe every request and, when enabled, the account default visibility.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Unauthorized`] when the gateway rejects the
    /// credentials. Any other failure is recorded in the report.
    pub async fn run(&self, run_id: Uuid) -> Result<ProbeReport, ProbeError> {
        let mut report = ProbeReport::new(run_id);

        for request in &self.requests {
            self.probe_case(request, &mut report).await?;
        }
        if self.default_visibility {
            self.probe_default_visibility(&mut report).await?;
        }

        report.finished_at = Utc::now();
        tracing::info!(
            %run_id,
            cases = report.cases.len(),
            findings = report.findings.len(),
            default_grants = report.default_grants.len(),
            failures = report.failures.len(),
            orphaned = report.orphaned_artifacts.len(),
            "probe finished"
        );
        Ok(report)
    }

    async fn probe_case(
        &self,
        request: &VisibilityRequest,
        report: &mut ProbeReport,
    ) -> Result<(), ProbeError> {
        let label = request.label.as_str();
        let mut case = ProbeCase {
            request: request.clone(),
            artifact: None,
            entry_id: None,
            observed: Vec::new(),
        };

        let artifact = match self.acquire(label, true).await {
            Ok(artifact) => artifact,
            Err(e) => {
                report.cases.push(case);
                return self.record_create_failure(label, e, report);
            }
        };
        case.artifact = Some(artifact.clone());

        let inspected = self.inspect(&artifact, request).await;
        self.release(label, &artifact, report).await;

        match inspected {
            Ok((entry_id, observed)) => {
                report
                    .findings
                    .extend(compare(label, &artifact, request, &entry_id, &observed));
                case.entry_id = Some(entry_id);
                case.observed = observed;
                report.cases.push(case);
                Ok(())
            }
            Err(e) => {
                report.cases.push(case);
                Self::record_inspect_failure(label, e, report)
            }
        }
    }

    async fn probe_default_visibility(&self, report: &mut ProbeReport) -> Result<(), ProbeError> {
        let label = DEFAULT_VISIBILITY_CASE;

        let honoured = match self.acquire(label, false).await {
            Ok(artifact) => artifact,
            Err(e) => return self.record_create_failure(label, e, report),
        };
        let isolated = match self.acquire(label, true).await {
            Ok(artifact) => artifact,
            Err(e) => {
                self.release(label, &honoured, report).await;
                return self.record_create_failure(label, e, report);
            }
        };

        let with_defaults = self.read_back(&honoured).await;
        let without_defaults = self.read_back(&isolated).await;
        self.release(label, &honoured, report).await;
        self.release(label, &isolated, report).await;

        match (with_defaults, without_defaults) {
            (Ok(with_defaults), Ok(without_defaults)) => {
                let grants = default_grants(&with_defaults, &without_defaults);
                for grant in &grants {
                    tracing::warn!(
                        grantee = %grant.grantee,
                        role = %grant.role,
                        discoverable = grant.discoverable,
                        "new files receive a default grant"
                    );
                }
                report.default_grants.extend(grants);
                Ok(())
            }
            (Err(e), _) | (_, Err(e)) => Self::record_inspect_failure(label, e, report),
        }
    }

    async fn acquire(
        &self,
        label: &str,
        ignore_default_visibility: bool,
    ) -> Result<NodeId, GatewayError> {
        let options = ArtifactOptions {
            name: format!("warden-probe-{label}-{}", Uuid::new_v4().simple()),
            ignore_default_visibility,
        };
        let artifact = self
            .gateway
            .create_artifact(NodeKind::File, self.parent.as_ref(), &options)
            .await?;
        tracing::debug!(case = label, artifact = %artifact, "probe artifact created");
        Ok(artifact)
    }

    async fn inspect(
        &self,
        artifact: &NodeId,
        request: &VisibilityRequest,
    ) -> Result<(String, Vec<PermissionEntry>), ProbeError> {
        let entry_id = self
            .gateway
            .create_permission(artifact, &request.to_request())
            .await
            .map_err(|source| ProbeError::Grant {
                artifact: artifact.clone(),
                source,
            })?;
        let observed = self.read_back(artifact).await?;
        Ok((entry_id, observed))
    }

    async fn read_back(&self, artifact: &NodeId) -> Result<Vec<PermissionEntry>, ProbeError> {
        self.gateway
            .list_permissions(artifact)
            .await
            .map_err(|source| ProbeError::Fetch {
                artifact: artifact.clone(),
                source,
            })
    }

    /// The single delete call an artifact ever receives.
    async fn release(&self, label: &str, artifact: &NodeId, report: &mut ProbeReport) {
        match self.gateway.delete_artifact(artifact).await {
            Ok(()) => tracing::debug!(case = label, artifact = %artifact, "probe artifact deleted"),
            Err(source) => {
                let err = ProbeError::OrphanedArtifact {
                    artifact: artifact.clone(),
                    source,
                };
                tracing::error!(case = label, artifact = %artifact, "ALERT {err}");
                report.fail(label, ProbeStage::Delete, &err);
                report.orphaned_artifacts.push(artifact.clone());
            }
        }
    }

    fn record_create_failure(
        &self,
        label: &str,
        source: GatewayError,
        report: &mut ProbeReport,
    ) -> Result<(), ProbeError> {
        if source.is_auth_failure() {
            tracing::error!(gateway = self.gateway.name(), "probe aborted: {source}");
            return Err(ProbeError::Unauthorized(source));
        }
        report.fail(label, ProbeStage::Create, &ProbeError::CreateArtifact(source));
        Ok(())
    }

    fn record_inspect_failure(
        label: &str,
        error: ProbeError,
        report: &mut ProbeReport,
    ) -> Result<(), ProbeError> {
        match error {
            ProbeError::Grant { source, .. } | ProbeError::Fetch { source, .. }
                if source.is_auth_failure() =>
            {
                Err(ProbeError::Unauthorized(source))
            }
            other => {
                let stage = match other {
                    ProbeError::Grant { .. } => ProbeStage::Grant,
                    _ => ProbeStage::Fetch,
                };
                report.fail(label, stage, &other);
                Ok(())
            }
        }
    }
}

/// Field-by-field comparison of one request against what was stored.
fn compare(
    case: &str,
    artifact: &NodeId,
    request: &VisibilityRequest,
    entry_id: &str,
    observed: &[PermissionEntry],
) -> Vec<DefaultDriftFinding> {
    let finding = |field, requested: String, observed: String| DefaultDriftFinding {
        case: case.to_owned(),
        artifact: artifact.clone(),
        field,
        requested,
        observed,
    };

    let entry = observed.iter().find(|e| e.id == entry_id).or_else(|| {
        observed
            .iter()
            .find(|e| e.grantee == request.grantee && e.role != Role::Owner)
    });
    let Some(entry) = entry else {
        return vec![finding(
            DriftField::Presence,
            "present".into(),
            "absent".into(),
        )];
    };

    let mut findings = Vec::new();
    if entry.grantee != request.grantee {
        findings.push(finding(
            DriftField::GranteeType,
            request.grantee.to_string(),
            entry.grantee.to_string(),
        ));
    }
    if entry.role != request.role {
        findings.push(finding(
            DriftField::Role,
            request.role.to_string(),
            entry.role.to_string(),
        ));
    }
    if request.grantee == GranteeType::Anyone
        && let Some(requested) = request.discoverable
        && entry.discoverable != requested
    {
        findings.push(finding(
            DriftField::Discoverability,
            requested.to_string(),
            entry.discoverable.to_string(),
        ));
    }

    for f in &findings {
        tracing::warn!(
            case,
            artifact = %artifact,
            field = ?f.field,
            requested = %f.requested,
            observed = %f.observed,
            "sharing default drift"
        );
    }
    findings
}

/// Entries on `with_defaults` with no identical counterpart on `without_defaults`.
fn default_grants(
    with_defaults: &[PermissionEntry],
    without_defaults: &[PermissionEntry],
) -> Vec<DefaultGrant> {
    let same = |a: &PermissionEntry, b: &PermissionEntry| {
        a.grantee == b.grantee
            && a.role == b.role
            && a.discoverable == b.discoverable
            && a.domain == b.domain
            && a.email == b.email
    };
    with_defaults
        .iter()
        .filter(|e| e.role != Role::Owner)
        .filter(|e| !without_defaults.iter().any(|b| same(e, b)))
        .map(|e| DefaultGrant {
            grantee: e.grantee,
            role: e.role,
            discoverable: e.discoverable,
            domain: e.domain.clone(),
            email: e.email.clone(),
        })
        .collect()
}
