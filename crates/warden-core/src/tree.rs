use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use warden_drive::{NodeId, NodeKind, PermissionEntry, RemoteNode};

/// A file or folder as seen by one scan.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub permissions: Vec<PermissionEntry>,
    pub seen_at: DateTime<Utc>,
}

impl Node {
    #[must_use]
    pub fn from_remote(remote: RemoteNode, seen_at: DateTime<Utc>) -> Self {
        Self {
            id: remote.id,
            name: remote.name,
            kind: remote.kind,
            parent: remote.parent,
            permissions: remote.permissions,
            seen_at,
        }
    }

    #[must_use]
    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    /// `anyone` entries attached to this node itself.
    pub fn direct_public_entries(&self) -> impl Iterator<Item = &PermissionEntry> {
        self.permissions.iter().filter(|p| p.is_direct_public())
    }

    #[must_use]
    pub fn has_direct_public(&self) -> bool {
        self.direct_public_entries().next().is_some()
    }
}

/// Point-in-time view of the account tree.
///
/// Nodes keep listing order. A node whose parent is not part of the
/// snapshot is a root. A scoped snapshot still holds the whole listing so
/// that exposure flowing in from above the scope folder is not lost.
#[derive(Debug, Clone)]
pub struct Snapshot {
    nodes: HashMap<NodeId, Node>,
    order: Vec<NodeId>,
    scope: Option<HashSet<NodeId>>,
    taken_at: DateTime<Utc>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Snapshot {
    #[must_use]
    pub fn new(taken_at: DateTime<Utc>) -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            scope: None,
            taken_at,
        }
    }

    /// Build a snapshot from already-fetched nodes, later duplicates winning.
    #[must_use]
    pub fn from_nodes(nodes: impl IntoIterator<Item = RemoteNode>) -> Self {
        let mut snapshot = Self::default();
        let taken_at = snapshot.taken_at;
        for remote in nodes {
            snapshot.insert(Node::from_remote(remote, taken_at));
        }
        snapshot
    }

    /// Insert or replace a node. Returns the node it replaced.
    pub fn insert(&mut self, node: Node) -> Option<Node> {
        let id = node.id.clone();
        let replaced = self.nodes.insert(id.clone(), node);
        if replaced.is_none() {
            self.order.push(id);
        }
        replaced
    }

    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Nodes in listing order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Nodes with no parent or with a parent outside the snapshot.
    pub fn roots(&self) -> impl Iterator<Item = &Node> {
        self.nodes().filter(|n| {
            n.parent
                .as_ref()
                .is_none_or(|parent| !self.nodes.contains_key(parent))
        })
    }

    /// Parent id to child ids, children in listing order.
    #[must_use]
    pub fn children_index(&self) -> HashMap<&NodeId, Vec<&NodeId>> {
        let mut index: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
        for node in self.nodes() {
            if let Some(parent) = node.parent.as_ref()
                && self.nodes.contains_key(parent)
            {
                index.entry(parent).or_default().push(&node.id);
            }
        }
        index
    }

    /// Limit reporting to the subtree rooted at `root`. Nodes outside it stay
    /// in the snapshot for inheritance.
    ///
    /// Returns `false` and leaves the scope untouched when `root` is absent.
    pub fn restrict_to(&mut self, root: &NodeId) -> bool {
        if !self.nodes.contains_key(root) {
            return false;
        }

        let children = self.children_index();
        let mut keep = HashSet::new();
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            if !keep.insert(id.clone()) {
                continue;
            }
            if let Some(kids) = children.get(id) {
                queue.extend(kids.iter().copied());
            }
        }
        self.scope = Some(keep);
        true
    }

    /// Whether `id` falls inside the scope; always true when unscoped.
    #[must_use]
    pub fn in_scope(&self, id: &NodeId) -> bool {
        self.scope.as_ref().is_none_or(|scope| scope.contains(id))
    }

    /// Nodes inside the scope, in listing order.
    pub fn scoped_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes().filter(|n| self.in_scope(&n.id))
    }
}
