// Copyright (c) 2019-2023 The Ferrocoin Foundation

//! The quorum slice is the essential unit of trust.
//!
//! A quorum slice names the peers a node trusts and how many of them must
//! agree before the node goes along. Quorums are never declared globally;
//! they emerge from the overlap of individual slices.

use fc_common::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A node's declaration of whom it trusts: a member list and a threshold.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct QuorumSlice {
    /// The trusted peers, in declaration order, without duplicates.
    pub Members: Vec<NodeId>,

    /// How many members must agree. In `[1, Members.len()]` for a usable
    /// slice.
    pub Threshold: u32,
}

impl QuorumSlice {
    /// Create a new quorum slice.
    pub fn new(threshold: u32, members: Vec<NodeId>) -> Self {
        Self {
            Members: members,
            Threshold: threshold,
        }
    }

    /// Check that the threshold is achievable.
    pub fn is_valid(&self) -> bool {
        self.Threshold >= 1 && self.Threshold as usize <= self.Members.len()
    }

    /// Whether `nodes` satisfies this slice: at least `Threshold` members are
    /// in `nodes`.
    pub fn satisfied_by(&self, nodes: &[NodeId]) -> bool {
        let present = self.Members.iter().filter(|m| nodes.contains(m)).count();
        present as u32 >= self.Threshold
    }

    /// Whether `nodes` blocks this slice: too few members remain outside
    /// `nodes` to reach the threshold without it. Every possible selection of
    /// `Threshold` members intersects a blocking set.
    pub fn blocked_by(&self, nodes: &[NodeId]) -> bool {
        let outside = self.Members.iter().filter(|m| !nodes.contains(m)).count();
        (outside as u32) < self.Threshold
    }
}

/// A per-peer quorum slice lookup.
///
/// The lookup is defined for the local node always, and for any peer whose
/// message (which carries its slice) has been received.
pub trait QuorumFinder {
    /// The slice declared by `node`, if known.
    fn quorum_slice(&self, node: &NodeId) -> Option<QuorumSlice>;

    /// The local node.
    fn node_id(&self) -> &NodeId;
}

/// Whether `nodes` contains a quorum for the local node of `finder`.
///
/// Starting from `nodes` plus the local node, restricted to nodes with a
/// known slice, repeatedly drop any node whose slice is not satisfied by
/// what remains. The fixed point is the maximal quorum contained in the
/// candidate set; there is a quorum for us iff we survive.
pub fn meets_quorum<F: QuorumFinder>(finder: &F, nodes: &[NodeId]) -> bool {
    let mut candidates: BTreeSet<NodeId> = nodes.iter().cloned().collect();
    candidates.insert(finder.node_id().clone());

    let mut quorum: Vec<(NodeId, QuorumSlice)> = candidates
        .into_iter()
        .filter_map(|node| finder.quorum_slice(&node).map(|slice| (node, slice)))
        .collect();

    loop {
        let remaining: Vec<NodeId> = quorum.iter().map(|(node, _)| node.clone()).collect();
        let before = quorum.len();
        quorum.retain(|(_, slice)| slice.satisfied_by(&remaining));
        if quorum.len() == before {
            break;
        }
    }

    quorum.iter().any(|(node, _)| node == finder.node_id())
}

#[cfg(test)]
mod quorum_slice_tests {
    use super::*;
    use fc_common::HashMap;

    fn id(n: u32) -> NodeId {
        NodeId(format!("node{n}"))
    }

    fn ids(ns: &[u32]) -> Vec<NodeId> {
        ns.iter().map(|n| id(*n)).collect()
    }

    struct Table {
        own: NodeId,
        slices: HashMap<NodeId, QuorumSlice>,
    }

    impl QuorumFinder for Table {
        fn quorum_slice(&self, node: &NodeId) -> Option<QuorumSlice> {
            self.slices.get(node).cloned()
        }

        fn node_id(&self) -> &NodeId {
            &self.own
        }
    }

    fn three_of_four() -> QuorumSlice {
        QuorumSlice::new(3, ids(&[0, 1, 2, 3]))
    }

    fn full_table(own: u32) -> Table {
        let mut slices = HashMap::default();
        for n in 0..4 {
            slices.insert(id(n), three_of_four());
        }
        Table {
            own: id(own),
            slices,
        }
    }

    #[test]
    fn satisfied_by_counts_members() {
        let slice = three_of_four();
        assert!(!slice.satisfied_by(&ids(&[0, 1])));
        assert!(slice.satisfied_by(&ids(&[0, 1, 2])));
        // Non-members don't count.
        assert!(!slice.satisfied_by(&ids(&[0, 1, 7, 8])));
    }

    #[test]
    fn blocked_by_needs_overlap_with_every_selection() {
        let slice = three_of_four();
        // One node leaves three others, enough for the threshold.
        assert!(!slice.blocked_by(&ids(&[0])));
        // Two nodes leave only two others.
        assert!(slice.blocked_by(&ids(&[0, 1])));
    }

    #[test]
    fn meets_quorum_with_three_of_four() {
        let table = full_table(0);
        assert!(meets_quorum(&table, &ids(&[1, 2])));
        assert!(!meets_quorum(&table, &ids(&[1])));
        // Duplicates don't help.
        assert!(!meets_quorum(&table, &ids(&[1, 1, 1])));
    }

    #[test]
    fn nodes_without_slices_are_ignored() {
        let mut table = full_table(0);
        table.slices.remove(&id(2));
        // Node 2 has no known slice; only {0, 1} remain, below threshold.
        assert!(!meets_quorum(&table, &ids(&[1, 2])));
        assert!(meets_quorum(&table, &ids(&[1, 2, 3])));
    }

    #[test]
    fn unsatisfied_nodes_are_removed_transitively() {
        // Node 3 insists on nodes 7, 8, 9, which are absent, so node 3 drops
        // out of any candidate quorum and cannot be counted by the others.
        let mut table = full_table(0);
        table
            .slices
            .insert(id(3), QuorumSlice::new(3, ids(&[7, 8, 9])));
        assert!(!meets_quorum(&table, &ids(&[1, 3])));
        assert!(meets_quorum(&table, &ids(&[1, 2, 3])));
    }

    // Adding a node whose slice is unsatisfied by the surviving quorum never
    // changes the outcome.
    #[test]
    fn fixed_point_ignores_unsatisfiable_additions() {
        let mut table = full_table(0);
        table
            .slices
            .insert(id(9), QuorumSlice::new(2, ids(&[7, 8])));

        let without = meets_quorum(&table, &ids(&[1, 2]));
        let with = meets_quorum(&table, &ids(&[1, 2, 9]));
        assert_eq!(without, with);
    }
}
