use warden_drive::{GatewayError, NodeId};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Quota, network, timeout or provider-side failure. Retry later.
    #[error("transient fetch error: {0}")]
    Transient(#[source] GatewayError),

    /// Authorization failure or a request the provider will never accept.
    #[error("fatal fetch error: {0}")]
    Fatal(#[source] GatewayError),

    #[error("listing still paginating after {pages} pages")]
    PageLimit { pages: usize },

    #[error("scan root {0} is not in the account listing")]
    RootNotFound(NodeId),
}

impl FetchError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<GatewayError> for FetchError {
    fn from(e: GatewayError) -> Self {
        if e.is_transient() {
            Self::Transient(e)
        } else {
            Self::Fatal(e)
        }
    }
}

/// Structural precondition violation in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidTreeError {
    #[error("parent links form a cycle through node {node}")]
    Cycle { node: NodeId },

    #[error("node {child} has file {parent} as its parent")]
    ParentNotFolder { parent: NodeId, child: NodeId },
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to create probe artifact: {0}")]
    CreateArtifact(#[source] GatewayError),

    #[error("failed to grant probe permission on {artifact}: {source}")]
    Grant {
        artifact: NodeId,
        #[source]
        source: GatewayError,
    },

    #[error("failed to read back permissions of {artifact}: {source}")]
    Fetch {
        artifact: NodeId,
        #[source]
        source: GatewayError,
    },

    #[error("orphaned test artifact {artifact}: {source}")]
    OrphanedArtifact {
        artifact: NodeId,
        #[source]
        source: GatewayError,
    },

    #[error("probe aborted, gateway rejected credentials: {0}")]
    Unauthorized(#[source] GatewayError),
}

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("invalid snapshot: {0}")]
    InvalidTree(#[from] InvalidTreeError),

    #[error(transparent)]
    Probe(#[from] ProbeError),
}

impl CycleError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Fetch(e) if e.is_transient())
    }

    /// The process cannot make progress without operator action.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Fetch(
                FetchError::Fatal(_) | FetchError::PageLimit { .. } | FetchError::RootNotFound(_)
            )
                | Self::Probe(ProbeError::Unauthorized(_))
        )
    }
}
