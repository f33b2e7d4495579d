//! Routing tiers: per-class lists of alternative groups.
//!
//! An alternative group is an ordered list of peers where position 0 is the
//! primary and later positions are fallbacks; one logical delivery goes to
//! one member of the group. Groups are bucketed by the class of their
//! primary, one bucket per [`NodeClass`].

use crate::peer::{NodeClass, Peer, PeerId};

/// Ordered (primary, fallback-1, …) list of peers backing one delivery slot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AlternativeGroup {
    members: Vec<Peer>,
}

impl AlternativeGroup {
    pub fn new(members: Vec<Peer>) -> Self {
        Self { members }
    }

    /// The preferred member, if the group is non-empty.
    pub fn primary(&self) -> Option<&Peer> {
        self.members.first()
    }

    pub fn members(&self) -> &[Peer] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn retain_new(&mut self, known: impl Fn(&PeerId) -> bool) {
        self.members.retain(|p| !known(&p.id));
    }
}

/// Per-class alternative groups. No peer occurs in more than one group;
/// duplicates are dropped at insertion, first occurrence winning.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PeerTiers {
    tiers: [Vec<AlternativeGroup>; 3],
}

impl PeerTiers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one group, deduplicating against every peer already present.
    ///
    /// The surviving group is bucketed by its primary's class. Returns the
    /// ids that were actually added; an emptied group is dropped.
    pub fn insert_group(&mut self, mut group: AlternativeGroup) -> Vec<PeerId> {
        group.retain_new(|id| self.classify(id).is_some());
        // Dedup within the incoming group itself as well.
        let mut kept: Vec<Peer> = Vec::with_capacity(group.members.len());
        for peer in group.members {
            if !kept.iter().any(|p| p.id == peer.id) {
                kept.push(peer);
            }
        }
        let Some(primary) = kept.first() else {
            return Vec::new();
        };
        let tier = primary.class.index();
        let added: Vec<PeerId> = kept.iter().map(|p| p.id.clone()).collect();
        self.tiers[tier].push(AlternativeGroup::new(kept));
        added
    }

    /// Union-merge another tier set into this one, preserving insertion
    /// order. Returns the newly added ids.
    pub fn merge(&mut self, other: PeerTiers) -> Vec<PeerId> {
        let mut added = Vec::new();
        for tier in other.tiers {
            for group in tier {
                added.extend(self.insert_group(group));
            }
        }
        added
    }

    /// Remove a peer from whichever group contains it. A group emptied by
    /// the removal is dropped. Returns `true` if the peer was present.
    pub fn remove(&mut self, id: &PeerId) -> bool {
        for tier in &mut self.tiers {
            for index in 0..tier.len() {
                let group = &mut tier[index];
                let before = group.members.len();
                group.members.retain(|p| &p.id != id);
                if group.members.len() != before {
                    if tier[index].is_empty() {
                        tier.remove(index);
                    }
                    return true;
                }
            }
        }
        false
    }

    /// The groups bucketed under one class.
    pub fn tier(&self, class: NodeClass) -> &[AlternativeGroup] {
        &self.tiers[class.index()]
    }

    /// All groups in tier order (core, relay, edge), insertion order within
    /// a tier.
    pub fn groups(&self) -> impl Iterator<Item = &AlternativeGroup> {
        self.tiers.iter().flatten()
    }

    /// Every peer across all groups.
    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.groups().flat_map(|g| g.members.iter())
    }

    /// The class recorded for a peer, if it is present anywhere.
    pub fn classify(&self, id: &PeerId) -> Option<NodeClass> {
        self.peers().find(|p| &p.id == id).map(|p| p.class)
    }

    pub fn peer_count(&self) -> usize {
        self.peers().count()
    }

    pub fn group_count(&self) -> usize {
        self.groups().count()
    }

    pub fn is_empty(&self) -> bool {
        self.groups().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(host: &str, class: NodeClass) -> Peer {
        Peer::new(PeerId::new(host, 3000), class)
    }

    #[test]
    fn group_is_bucketed_by_primary_class() {
        let mut tiers = PeerTiers::new();
        tiers.insert_group(AlternativeGroup::new(vec![
            peer("core-1", NodeClass::Core),
            peer("relay-1", NodeClass::Relay),
        ]));
        assert_eq!(tiers.tier(NodeClass::Core).len(), 1);
        assert!(tiers.tier(NodeClass::Relay).is_empty());
        assert_eq!(tiers.classify(&PeerId::new("relay-1", 3000)), Some(NodeClass::Relay));
    }

    #[test]
    fn duplicate_insertion_first_wins() {
        let mut tiers = PeerTiers::new();
        let added = tiers.insert_group(AlternativeGroup::new(vec![peer("a", NodeClass::Relay)]));
        assert_eq!(added.len(), 1);

        // Same id again, even under a different class: dropped.
        let added = tiers.insert_group(AlternativeGroup::new(vec![
            peer("a", NodeClass::Core),
            peer("b", NodeClass::Relay),
        ]));
        assert_eq!(added, vec![PeerId::new("b", 3000)]);
        assert_eq!(
            tiers.classify(&PeerId::new("a", 3000)),
            Some(NodeClass::Relay),
            "first insertion must win"
        );
    }

    #[test]
    fn fully_duplicate_group_is_dropped() {
        let mut tiers = PeerTiers::new();
        tiers.insert_group(AlternativeGroup::new(vec![peer("a", NodeClass::Core)]));
        let added = tiers.insert_group(AlternativeGroup::new(vec![peer("a", NodeClass::Core)]));
        assert!(added.is_empty());
        assert_eq!(tiers.group_count(), 1);
    }

    #[test]
    fn removal_drops_emptied_group() {
        let mut tiers = PeerTiers::new();
        tiers.insert_group(AlternativeGroup::new(vec![peer("a", NodeClass::Relay)]));
        tiers.insert_group(AlternativeGroup::new(vec![
            peer("b", NodeClass::Relay),
            peer("c", NodeClass::Relay),
        ]));

        assert!(tiers.remove(&PeerId::new("a", 3000)));
        assert_eq!(tiers.tier(NodeClass::Relay).len(), 1, "emptied group is gone");

        assert!(tiers.remove(&PeerId::new("b", 3000)));
        assert_eq!(tiers.tier(NodeClass::Relay).len(), 1, "group with a fallback left survives");
        assert!(!tiers.remove(&PeerId::new("b", 3000)), "second removal is a no-op");
    }

    #[test]
    fn merge_preserves_insertion_order_and_dedups() {
        let mut left = PeerTiers::new();
        left.insert_group(AlternativeGroup::new(vec![peer("a", NodeClass::Core)]));

        let mut right = PeerTiers::new();
        right.insert_group(AlternativeGroup::new(vec![peer("b", NodeClass::Core)]));
        right.insert_group(AlternativeGroup::new(vec![peer("a", NodeClass::Core)]));

        let added = left.merge(right);
        assert_eq!(added, vec![PeerId::new("b", 3000)]);

        let hosts: Vec<&str> = left
            .tier(NodeClass::Core)
            .iter()
            .filter_map(|g| g.primary())
            .map(|p| p.id.host.as_str())
            .collect();
        assert_eq!(hosts, vec!["a", "b"]);
    }
}
