use chrono::Utc;
use warden_drive::{NodeId, StorageGateway};

use crate::error::FetchError;
use crate::tree::{Node, Snapshot};

/// Which part of the account a scan covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchScope {
    /// Folder whose subtree is reported and remediated; whole account when `None`.
    pub root: Option<NodeId>,
}

impl FetchScope {
    #[must_use]
    pub fn account() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn folder(root: impl Into<NodeId>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }
}

/// Listing pages fetched before a cursor is considered runaway.
pub const DEFAULT_MAX_PAGES: usize = 10_000;

/// Builds a [`Snapshot`] by walking the gateway listing to its end.
pub struct Fetcher<'a, G> {
    gateway: &'a G,
    max_pages: usize,
}

impl<'a, G: StorageGateway> Fetcher<'a, G> {
    #[must_use]
    pub fn new(gateway: &'a G) -> Self {
        Self {
            gateway,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    #[must_use]
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Fetch a consistent snapshot of the account, scoped to `scope`.
    ///
    /// The whole listing is kept even when scoped: a folder shared above the
    /// scope root still exposes everything below it. Pages are requested one
    /// after another because each cursor comes from the previous response.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Transient`] or [`FetchError::Fatal`] for gateway
    /// failures, [`FetchError::PageLimit`] if the cursor never terminates and
    /// [`FetchError::RootNotFound`] if the scope folder is not listed.
    pub async fn fetch(&self, scope: &FetchScope) -> Result<Snapshot, FetchError> {
        let taken_at = Utc::now();
        let mut snapshot = Snapshot::new(taken_at);
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            if pages == self.max_pages {
                tracing::error!(
                    gateway = self.gateway.name(),
                    pages,
                    "listing cursor did not terminate"
                );
                return Err(FetchError::PageLimit { pages });
            }

            let page = self
                .gateway
                .list_nodes(cursor.as_deref())
                .await
                .inspect_err(|e| {
                    tracing::warn!(
                        gateway = self.gateway.name(),
                        page = pages,
                        "listing failed: {e}"
                    );
                })?;
            pages += 1;

            for remote in page.nodes {
                let id = remote.id.clone();
                if snapshot.insert(Node::from_remote(remote, taken_at)).is_some() {
                    tracing::warn!(node_id = %id, "node listed twice, keeping the later entry");
                }
            }

            cursor = normalize_cursor(page.next_page_token);
            if cursor.is_none() {
                break;
            }
        }

        if let Some(root) = &scope.root
            && !snapshot.restrict_to(root)
        {
            return Err(FetchError::RootNotFound(root.clone()));
        }

        tracing::info!(
            gateway = self.gateway.name(),
            nodes = snapshot.len(),
            scoped = snapshot.scoped_nodes().count(),
            pages,
            "snapshot fetched"
        );
        Ok(snapshot)
    }
}

/// An empty or blank cursor means the listing is complete.
fn normalize_cursor(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.trim().is_empty())
}
