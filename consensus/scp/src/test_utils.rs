// Copyright (c) 2019-2023 The Ferrocoin Foundation

//! Utilities for consensus tests.

// Not every test uses every helper here.
#![allow(dead_code)]

use crate::{driver::ProposalFn, quorum_slice::QuorumSlice, value::SlotValue};
use fc_common::{keys::KeyPair, NodeId};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// The node id derived from the secret phrase `node{n}`.
pub fn test_node_id(n: u32) -> NodeId {
    KeyPair::from_secret_phrase(&format!("node{n}")).node_id()
}

/// A quorum slice over `n` test nodes with a two-thirds-plus-one threshold
/// (3-of-4 for `n = 4`), along with the node ids. Every node, including the
/// local one, appears in the member list.
pub fn test_quorum_slice(n: u32) -> (QuorumSlice, Vec<NodeId>) {
    let ids: Vec<NodeId> = (0..n).map(test_node_id).collect();
    let threshold = 2 * n / 3 + 1;
    (QuorumSlice::new(threshold, ids.clone()), ids)
}

/// A proposal function producing distinct values: `name:0`, `name:1`, ...
/// Deterministic, unlike the wall-clock stamps production nodes use.
pub fn counting_proposal_fn(name: &str) -> ProposalFn {
    let name = name.to_string();
    let counter = Arc::new(AtomicU64::new(0));
    Arc::new(move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        SlotValue::new(format!("{name}:{n}"))
    })
}
