use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;
use warden_drive::NodeId;

use crate::error::InvalidTreeError;
use crate::tree::Snapshot;

/// Effective public exposure of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Exposure {
    Private,
    PublicDirect,
    PublicInherited,
    PublicBoth,
}

impl Exposure {
    #[must_use]
    pub fn from_flags(direct: bool, inherited: bool) -> Self {
        match (direct, inherited) {
            (false, false) => Self::Private,
            (true, false) => Self::PublicDirect,
            (false, true) => Self::PublicInherited,
            (true, true) => Self::PublicBoth,
        }
    }

    #[must_use]
    pub fn is_public(self) -> bool {
        self != Self::Private
    }

    /// The node itself carries an `anyone` entry.
    #[must_use]
    pub fn is_direct(self) -> bool {
        matches!(self, Self::PublicDirect | Self::PublicBoth)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExposureVerdict {
    pub exposure: Exposure,
    /// Listed in search for anyone; true if any contributing entry is discoverable.
    pub discoverable: bool,
    /// Nearest ancestor folder with a direct `anyone` entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherited_from: Option<NodeId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExposureCounts {
    pub private: usize,
    pub public_direct: usize,
    pub public_inherited: usize,
    pub public_both: usize,
}

impl ExposureCounts {
    #[must_use]
    pub fn public(&self) -> usize {
        self.public_direct + self.public_inherited + self.public_both
    }
}

/// One verdict per snapshot node, keyed and ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExposureReport {
    verdicts: BTreeMap<NodeId, ExposureVerdict>,
}

impl ExposureReport {
    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<&ExposureVerdict> {
        self.verdicts.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &ExposureVerdict)> {
        self.verdicts.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.verdicts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.verdicts.is_empty()
    }

    #[must_use]
    pub fn counts(&self) -> ExposureCounts {
        let mut counts = ExposureCounts::default();
        for verdict in self.verdicts.values() {
            match verdict.exposure {
                Exposure::Private => counts.private += 1,
                Exposure::PublicDirect => counts.public_direct += 1,
                Exposure::PublicInherited => counts.public_inherited += 1,
                Exposure::PublicBoth => counts.public_both += 1,
            }
        }
        counts
    }
}

/// What a node passes down to its children.
#[derive(Clone)]
struct Inherited {
    public: bool,
    discoverable: bool,
    nearest: Option<NodeId>,
}

const PRIVATE: Inherited = Inherited {
    public: false,
    discoverable: false,
    nearest: None,
};

/// Compute the effective exposure of every node in `snapshot`.
///
/// The walk covers the whole listing; only verdicts for nodes inside the
/// snapshot's scope are reported. `inherited_from` may name an ancestor
/// outside the scope.
///
/// # Errors
///
/// Returns [`InvalidTreeError::ParentNotFolder`] when a node hangs off a file
/// and [`InvalidTreeError::Cycle`] when parent links loop back on themselves.
pub fn resolve(snapshot: &Snapshot) -> Result<ExposureReport, InvalidTreeError> {
    for node in snapshot.nodes() {
        if let Some(parent) = node.parent.as_ref().and_then(|p| snapshot.get(p))
            && !parent.is_folder()
        {
            return Err(InvalidTreeError::ParentNotFolder {
                parent: parent.id.clone(),
                child: node.id.clone(),
            });
        }
    }

    let children = snapshot.children_index();
    let mut verdicts = BTreeMap::new();
    let mut queue: VecDeque<(&NodeId, Inherited)> =
        snapshot.roots().map(|n| (&n.id, PRIVATE)).collect();

    while let Some((id, from_above)) = queue.pop_front() {
        let Some(node) = snapshot.get(id) else {
            continue;
        };

        let mut direct = false;
        let mut direct_discoverable = false;
        for entry in node.direct_public_entries() {
            direct = true;
            direct_discoverable |= entry.discoverable;
        }

        verdicts.insert(
            id.clone(),
            ExposureVerdict {
                exposure: Exposure::from_flags(direct, from_above.public),
                discoverable: direct_discoverable || from_above.discoverable,
                inherited_from: from_above.nearest.clone(),
            },
        );

        if let Some(kids) = children.get(id) {
            let passed = if direct {
                Inherited {
                    public: true,
                    discoverable: direct_discoverable || from_above.discoverable,
                    nearest: Some(id.clone()),
                }
            } else {
                from_above
            };
            queue.extend(kids.iter().map(|kid| (*kid, passed.clone())));
        }
    }

    if let Some(stranded) = snapshot.nodes().find(|n| !verdicts.contains_key(&n.id)) {
        return Err(InvalidTreeError::Cycle {
            node: stranded.id.clone(),
        });
    }

    verdicts.retain(|id, _| snapshot.in_scope(id));
    tracing::debug!(nodes = verdicts.len(), "exposure resolved");
    Ok(ExposureReport { verdicts })
}
