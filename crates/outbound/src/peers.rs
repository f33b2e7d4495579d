//! The mutable peer model: routing tiers behind a read-mostly lock.

use spool_types::{NodeClass, PeerId, PeerTiers};
use std::sync::RwLock;
use tracing::debug;

/// Current routing tiers with atomic mutation and cheap read views.
///
/// Mutations take the write lock, so a [`snapshot`](PeerModel::snapshot)
/// reflects either the pre- or post-state of a concurrent add/remove,
/// never a torn mix. Callers must not rely on consistency *across* two
/// snapshots taken around a mutation.
#[derive(Debug, Default)]
pub struct PeerModel {
    tiers: RwLock<PeerTiers>,
}

impl PeerModel {
    pub fn new(initial: PeerTiers) -> Self {
        Self {
            tiers: RwLock::new(initial),
        }
    }

    /// Union-merge new tiers; insertion order preserved, duplicates dropped
    /// (first wins). Returns the newly added ids.
    pub fn add_known_peers(&self, incoming: PeerTiers) -> Vec<PeerId> {
        let added = self
            .tiers
            .write()
            .expect("peer model lock poisoned")
            .merge(incoming);
        if !added.is_empty() {
            debug!(count = added.len(), "peers added to model");
        }
        added
    }

    /// Remove a peer from whichever group contains it; a group emptied by
    /// the removal is dropped. Returns `true` if the peer was present.
    pub fn remove_peer(&self, id: &PeerId) -> bool {
        let removed = self
            .tiers
            .write()
            .expect("peer model lock poisoned")
            .remove(id);
        if removed {
            debug!(peer = %id, "peer removed from model");
        }
        removed
    }

    /// A consistent copy of the current tiers.
    pub fn snapshot(&self) -> PeerTiers {
        self.tiers.read().expect("peer model lock poisoned").clone()
    }

    pub fn classify(&self, id: &PeerId) -> Option<NodeClass> {
        self.tiers
            .read()
            .expect("peer model lock poisoned")
            .classify(id)
    }

    pub fn peer_count(&self) -> usize {
        self.tiers
            .read()
            .expect("peer model lock poisoned")
            .peer_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spool_types::{AlternativeGroup, Peer};

    fn tiers_of(hosts: &[&str], class: NodeClass) -> PeerTiers {
        let mut tiers = PeerTiers::new();
        tiers.insert_group(AlternativeGroup::new(
            hosts
                .iter()
                .map(|h| Peer::new(PeerId::new(*h, 3000), class))
                .collect(),
        ));
        tiers
    }

    #[test]
    fn add_reports_only_new_ids() {
        let model = PeerModel::new(tiers_of(&["a"], NodeClass::Relay));
        let added = model.add_known_peers(tiers_of(&["a", "b"], NodeClass::Relay));
        assert_eq!(added, vec![PeerId::new("b", 3000)]);
        assert_eq!(model.peer_count(), 2);
    }

    #[test]
    fn snapshot_is_detached_from_later_mutation() {
        let model = PeerModel::new(tiers_of(&["a"], NodeClass::Core));
        let snapshot = model.snapshot();
        model.remove_peer(&PeerId::new("a", 3000));
        assert_eq!(snapshot.peer_count(), 1, "snapshot must not see the removal");
        assert_eq!(model.peer_count(), 0);
    }

    #[test]
    fn classify_reflects_membership() {
        let model = PeerModel::new(tiers_of(&["a"], NodeClass::Edge));
        assert_eq!(model.classify(&PeerId::new("a", 3000)), Some(NodeClass::Edge));
        assert_eq!(model.classify(&PeerId::new("b", 3000)), None);
    }
}
