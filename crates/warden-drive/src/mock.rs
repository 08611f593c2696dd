//! Test-only in-memory gateway.
//!
//! Holds a mutable account, records every call, and lets tests script
//! failures or mutate state behind the engine's back.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::GatewayError;
use crate::gateway::StorageGateway;
use crate::types::{
    ArtifactOptions, DeleteOutcome, GranteeType, NodeId, NodeKind, NodePage, PermissionEntry,
    PermissionRequest, RemoteNode, Role,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    ListNodes { page_token: Option<String> },
    ListPermissions(NodeId),
    CreatePermission { node: NodeId, grantee: GranteeType },
    DeletePermission { node: NodeId, entry_id: String },
    CreateArtifact { ignore_default_visibility: bool },
    DeleteArtifact(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    RateLimited,
    Unauthorized,
    Forbidden,
    Server,
    Timeout,
}

impl MockFailure {
    fn into_error(self) -> GatewayError {
        match self {
            Self::RateLimited => GatewayError::RateLimited {
                retry_after: Some(Duration::ZERO),
            },
            Self::Unauthorized => GatewayError::Unauthorized("mock: invalid credentials".into()),
            Self::Forbidden => GatewayError::Forbidden("mock: insufficient permissions".into()),
            Self::Server => GatewayError::Server {
                status: 503,
                message: "mock: backend error".into(),
            },
            Self::Timeout => GatewayError::Timeout,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    nodes: Vec<RemoteNode>,
    calls: Vec<GatewayCall>,
    next_id: u64,
    list_failures: VecDeque<MockFailure>,
    create_permission_failures: VecDeque<MockFailure>,
    create_artifact_failures: VecDeque<MockFailure>,
    delete_artifact_failures: VecDeque<MockFailure>,
    list_permissions_failures: VecDeque<MockFailure>,
    delete_permission_failures: HashMap<(NodeId, String), VecDeque<MockFailure>>,
    forced_discoverability: Option<bool>,
    forced_role: Option<Role>,
    default_grants: Vec<PermissionRequest>,
    endless_cursor: bool,
}

impl MockState {
    fn node_mut(&mut self, id: &NodeId) -> Option<&mut RemoteNode> {
        self.nodes.iter_mut().find(|n| &n.id == id)
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

#[derive(Debug, Clone)]
pub struct MockGateway {
    state: Arc<Mutex<MockState>>,
    page_size: usize,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            page_size: 100,
        }
    }
}

/// Folder node with no permissions.
#[must_use]
pub fn folder(id: &str, parent: Option<&str>) -> RemoteNode {
    RemoteNode::new(id, NodeKind::Folder, parent.map(NodeId::from))
}

/// File node with no permissions.
#[must_use]
pub fn file(id: &str, parent: Option<&str>) -> RemoteNode {
    RemoteNode::new(id, NodeKind::File, parent.map(NodeId::from))
}

/// Direct `anyone` reader entry.
#[must_use]
pub fn anyone(entry_id: &str, discoverable: bool) -> PermissionEntry {
    PermissionEntry {
        id: entry_id.to_owned(),
        grantee: GranteeType::Anyone,
        role: Role::Reader,
        discoverable,
        inherited: false,
        domain: None,
        email: None,
    }
}

/// Direct user entry.
#[must_use]
pub fn user(entry_id: &str, email: &str, role: Role) -> PermissionEntry {
    PermissionEntry {
        id: entry_id.to_owned(),
        grantee: GranteeType::User,
        role,
        discoverable: false,
        inherited: false,
        domain: None,
        email: Some(email.to_owned()),
    }
}

impl MockGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub fn with_nodes(self, nodes: impl IntoIterator<Item = RemoteNode>) -> Self {
        self.state.lock().unwrap().nodes.extend(nodes);
        self
    }

    pub fn insert(&self, node: RemoteNode) {
        self.state.lock().unwrap().nodes.push(node);
    }

    /// Every call received so far, in arrival order.
    #[must_use]
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().unwrap().calls.clone()
    }

    #[must_use]
    pub fn count_calls(&self, predicate: impl Fn(&GatewayCall) -> bool) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| predicate(c))
            .count()
    }

    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.state.lock().unwrap().nodes.iter().any(|n| &n.id == id)
    }

    #[must_use]
    pub fn permissions_of(&self, id: &NodeId) -> Option<Vec<PermissionEntry>> {
        self.state
            .lock()
            .unwrap()
            .nodes
            .iter()
            .find(|n| &n.id == id)
            .map(|n| n.permissions.clone())
    }

    /// Remove an entry without recording a call, as an outside actor would.
    pub fn remove_permission_externally(&self, node: &NodeId, entry_id: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(target) = state.node_mut(node) else {
            return false;
        };
        let before = target.permissions.len();
        target.permissions.retain(|p| p.id != entry_id);
        target.permissions.len() != before
    }

    pub fn fail_next_list(&self, failure: MockFailure) {
        self.state.lock().unwrap().list_failures.push_back(failure);
    }

    pub fn fail_delete_permission(
        &self,
        node: &NodeId,
        entry_id: &str,
        failures: impl IntoIterator<Item = MockFailure>,
    ) {
        self.state
            .lock()
            .unwrap()
            .delete_permission_failures
            .entry((node.clone(), entry_id.to_owned()))
            .or_default()
            .extend(failures);
    }

    pub fn fail_next_create_permission(&self, failure: MockFailure) {
        self.state
            .lock()
            .unwrap()
            .create_permission_failures
            .push_back(failure);
    }

    pub fn fail_next_create_artifact(&self, failure: MockFailure) {
        self.state
            .lock()
            .unwrap()
            .create_artifact_failures
            .push_back(failure);
    }

    pub fn fail_next_delete_artifact(&self, failure: MockFailure) {
        self.state
            .lock()
            .unwrap()
            .delete_artifact_failures
            .push_back(failure);
    }

    pub fn fail_next_list_permissions(&self, failure: MockFailure) {
        self.state
            .lock()
            .unwrap()
            .list_permissions_failures
            .push_back(failure);
    }

    /// Every `anyone` grant lands with this discoverability regardless of the request.
    pub fn force_discoverability(&self, discoverable: bool) {
        self.state.lock().unwrap().forced_discoverability = Some(discoverable);
    }

    /// Every grant lands with this role regardless of the request.
    pub fn force_role(&self, role: Role) {
        self.state.lock().unwrap().forced_role = Some(role);
    }

    /// Grant applied to artifacts created without `ignore_default_visibility`.
    pub fn add_default_grant(&self, grant: PermissionRequest) {
        self.state.lock().unwrap().default_grants.push(grant);
    }

    /// Listing keeps returning a cursor forever.
    pub fn endless_pagination(&self) {
        self.state.lock().unwrap().endless_cursor = true;
    }
}

impl StorageGateway for MockGateway {
    async fn list_nodes(&self, page_token: Option<&str>) -> Result<NodePage, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(GatewayCall::ListNodes {
            page_token: page_token.map(str::to_owned),
        });
        if let Some(failure) = state.list_failures.pop_front() {
            return Err(failure.into_error());
        }
        let offset = match page_token {
            None => 0,
            Some(token) => token.parse::<usize>().map_err(|_| GatewayError::Api {
                status: 400,
                message: format!("mock: invalid page token {token}"),
            })?,
        };
        let end = (offset + self.page_size).min(state.nodes.len());
        let nodes = state.nodes.get(offset..end).unwrap_or_default().to_vec();
        let next_page_token = if state.endless_cursor {
            Some(offset.to_string())
        } else if end < state.nodes.len() {
            Some(end.to_string())
        } else {
            None
        };
        Ok(NodePage {
            nodes,
            next_page_token,
        })
    }

    async fn list_permissions(&self, node: &NodeId) -> Result<Vec<PermissionEntry>, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(GatewayCall::ListPermissions(node.clone()));
        if let Some(failure) = state.list_permissions_failures.pop_front() {
            return Err(failure.into_error());
        }
        state
            .node_mut(node)
            .map(|n| n.permissions.clone())
            .ok_or_else(|| GatewayError::NotFound(format!("mock: file {node}")))
    }

    async fn create_permission(
        &self,
        node: &NodeId,
        request: &PermissionRequest,
    ) -> Result<String, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(GatewayCall::CreatePermission {
            node: node.clone(),
            grantee: request.grantee,
        });
        if let Some(failure) = state.create_permission_failures.pop_front() {
            return Err(failure.into_error());
        }
        let id = state.next_id("perm");
        let discoverable = request.grantee == GranteeType::Anyone
            && state
                .forced_discoverability
                .unwrap_or(request.discoverable.unwrap_or(false));
        let role = state.forced_role.unwrap_or(request.role);
        let entry = PermissionEntry {
            id: id.clone(),
            grantee: request.grantee,
            role,
            discoverable,
            inherited: false,
            domain: request.domain.clone(),
            email: request.email.clone(),
        };
        let target = state
            .node_mut(node)
            .ok_or_else(|| GatewayError::NotFound(format!("mock: file {node}")))?;
        target.permissions.push(entry);
        Ok(id)
    }

    async fn delete_permission(
        &self,
        node: &NodeId,
        entry_id: &str,
    ) -> Result<DeleteOutcome, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(GatewayCall::DeletePermission {
            node: node.clone(),
            entry_id: entry_id.to_owned(),
        });
        let key = (node.clone(), entry_id.to_owned());
        if let Some(failure) = state
            .delete_permission_failures
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
        {
            return Err(failure.into_error());
        }
        let Some(target) = state.node_mut(node) else {
            return Ok(DeleteOutcome::NotFound);
        };
        let before = target.permissions.len();
        target.permissions.retain(|p| p.id != entry_id);
        if target.permissions.len() == before {
            Ok(DeleteOutcome::NotFound)
        } else {
            Ok(DeleteOutcome::Deleted)
        }
    }

    async fn create_artifact(
        &self,
        kind: NodeKind,
        parent: Option<&NodeId>,
        options: &ArtifactOptions,
    ) -> Result<NodeId, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(GatewayCall::CreateArtifact {
            ignore_default_visibility: options.ignore_default_visibility,
        });
        if let Some(failure) = state.create_artifact_failures.pop_front() {
            return Err(failure.into_error());
        }
        let id = NodeId::new(state.next_id("artifact"));
        let owner_id = state.next_id("owner");
        let mut node = RemoteNode::new(id.clone(), kind, parent.cloned())
            .with_name(options.name.clone())
            .with_permission(user(&owner_id, "owner@example.com", Role::Owner));
        if !options.ignore_default_visibility {
            for grant in state.default_grants.clone() {
                let entry_id = state.next_id("default");
                node.permissions.push(PermissionEntry {
                    id: entry_id,
                    grantee: grant.grantee,
                    role: grant.role,
                    discoverable: grant.discoverable.unwrap_or(false),
                    inherited: false,
                    domain: grant.domain,
                    email: grant.email,
                });
            }
        }
        state.nodes.push(node);
        Ok(id)
    }

    async fn delete_artifact(&self, node: &NodeId) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(GatewayCall::DeleteArtifact(node.clone()));
        if let Some(failure) = state.delete_artifact_failures.pop_front() {
            return Err(failure.into_error());
        }
        state.nodes.retain(|n| &n.id != node);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
