use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque provider identifier of a file or folder.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Folder,
}

/// Who a permission entry grants access to.
///
/// `User` and `Group` are the specific-identity grantees; only `Anyone`
/// exposes a node to the public.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GranteeType {
    User,
    Group,
    Domain,
    Anyone,
}

impl GranteeType {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "group" => Some(Self::Group),
            "domain" => Some(Self::Domain),
            "anyone" => Some(Self::Anyone),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::Domain => "domain",
            Self::Anyone => "anyone",
        }
    }
}

impl fmt::Display for GranteeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Owner,
    Organizer,
    FileOrganizer,
    Writer,
    Commenter,
    Reader,
}

impl Role {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(Self::Owner),
            "organizer" => Some(Self::Organizer),
            "fileOrganizer" => Some(Self::FileOrganizer),
            "writer" => Some(Self::Writer),
            "commenter" => Some(Self::Commenter),
            "reader" => Some(Self::Reader),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Organizer => "organizer",
            Self::FileOrganizer => "fileOrganizer",
            Self::Writer => "writer",
            Self::Commenter => "commenter",
            Self::Reader => "reader",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One access grant attached to a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    /// Handle required by removal calls.
    pub id: String,
    pub grantee: GranteeType,
    pub role: Role,
    /// Search/listing visibility. Only meaningful for `GranteeType::Anyone`.
    pub discoverable: bool,
    /// Set when the provider reports the entry as inherited from an ancestor folder.
    pub inherited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl PermissionEntry {
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.grantee == GranteeType::Anyone
    }

    /// Public and attached to this node rather than inherited.
    #[must_use]
    pub fn is_direct_public(&self) -> bool {
        self.is_public() && !self.inherited
    }
}

/// A node as returned by the gateway listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteNode {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub permissions: Vec<PermissionEntry>,
}

impl RemoteNode {
    #[must_use]
    pub fn new(id: impl Into<NodeId>, kind: NodeKind, parent: Option<NodeId>) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            kind,
            parent,
            permissions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_permission(mut self, entry: PermissionEntry) -> Self {
        self.permissions.push(entry);
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct NodePage {
    pub nodes: Vec<RemoteNode>,
    pub next_page_token: Option<String>,
}

/// Permission to grant on a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequest {
    pub grantee: GranteeType,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discoverable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl PermissionRequest {
    #[must_use]
    pub fn anyone(role: Role, discoverable: bool) -> Self {
        Self {
            grantee: GranteeType::Anyone,
            role,
            discoverable: Some(discoverable),
            domain: None,
            email: None,
        }
    }

    #[must_use]
    pub fn domain(role: Role, domain: impl Into<String>) -> Self {
        Self {
            grantee: GranteeType::Domain,
            role,
            discoverable: None,
            domain: Some(domain.into()),
            email: None,
        }
    }

    #[must_use]
    pub fn user(role: Role, email: impl Into<String>) -> Self {
        Self {
            grantee: GranteeType::User,
            role,
            discoverable: None,
            domain: None,
            email: Some(email.into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactOptions {
    pub name: String,
    /// Skip the account's default visibility settings when creating the artifact.
    pub ignore_default_visibility: bool,
}

/// Result of a permission removal that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The entry was already gone, e.g. removed by another actor.
    NotFound,
}
