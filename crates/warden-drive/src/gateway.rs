use std::future::Future;

use crate::error::GatewayError;
use crate::types::{
    ArtifactOptions, DeleteOutcome, NodeId, NodeKind, NodePage, PermissionEntry,
    PermissionRequest,
};

/// Remote storage service the engine audits and mutates.
///
/// Authentication and token lifecycle belong to the implementation; callers
/// only ever see classified [`GatewayError`]s.
pub trait StorageGateway: Send + Sync {
    /// Fetch one page of the account listing. `None` requests the first page.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the request or is unreachable.
    fn list_nodes(
        &self,
        page_token: Option<&str>,
    ) -> impl Future<Output = Result<NodePage, GatewayError>> + Send;

    /// Current permission entries of a single node.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is missing or the request fails.
    fn list_permissions(
        &self,
        node: &NodeId,
    ) -> impl Future<Output = Result<Vec<PermissionEntry>, GatewayError>> + Send;

    /// Grant a permission and return the new entry identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider refuses the grant.
    fn create_permission(
        &self,
        node: &NodeId,
        request: &PermissionRequest,
    ) -> impl Future<Output = Result<String, GatewayError>> + Send;

    /// Remove a permission entry. An already-absent entry is `Ok(DeleteOutcome::NotFound)`.
    ///
    /// # Errors
    ///
    /// Returns an error for every failure other than a missing entry.
    fn delete_permission(
        &self,
        node: &NodeId,
        entry_id: &str,
    ) -> impl Future<Output = Result<DeleteOutcome, GatewayError>> + Send;

    /// Create an empty file or folder under `parent` (account root when `None`).
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact cannot be created.
    fn create_artifact(
        &self,
        kind: NodeKind,
        parent: Option<&NodeId>,
        options: &ArtifactOptions,
    ) -> impl Future<Output = Result<NodeId, GatewayError>> + Send;

    /// Permanently delete an artifact. Deleting a missing artifact succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider refuses the deletion.
    fn delete_artifact(&self, node: &NodeId)
    -> impl Future<Output = Result<(), GatewayError>> + Send;

    fn name(&self) -> &'static str;
}
