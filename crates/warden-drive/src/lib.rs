//! Storage gateway abstraction and the Google Drive v3 backend.

pub mod drive;
pub mod error;
pub mod gateway;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod types;

pub use drive::DriveClient;
pub use error::GatewayError;
pub use gateway::StorageGateway;
pub use types::{
    ArtifactOptions, DeleteOutcome, GranteeType, NodeId, NodeKind, NodePage, PermissionEntry,
    PermissionRequest, RemoteNode, Role,
};
