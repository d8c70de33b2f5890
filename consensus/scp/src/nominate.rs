// Copyright (c) 2019-2023 The Ferrocoin Foundation

//! The nomination round of a slot.

use crate::{
    msg::NominationMessage,
    quorum_slice::{meets_quorum, QuorumFinder, QuorumSlice},
    value::SlotValue,
};
use fc_common::{
    logger::{log, Logger},
    HashMap, NodeId,
};

/// Per-slot nomination state.
///
/// Values move through three monotone stages: voted to nominate (`X`),
/// accepted as nominated (`Y`), confirmed as nominated (`Z`). Invariant:
/// `Z ⊆ Y ⊆ X`, and no value ever leaves a stage.
pub struct NominationState {
    /// The values we have voted to nominate.
    pub X: Vec<SlotValue>,

    /// The values we have accepted as nominated.
    pub Y: Vec<SlotValue>,

    /// The values we have confirmed as nominated (our candidates).
    pub Z: Vec<SlotValue>,

    /// The last nomination message received from each peer.
    N: HashMap<NodeId, NominationMessage>,

    /// Who we are.
    node_id: NodeId,

    /// Who we listen to for quorum.
    D: QuorumSlice,

    logger: Logger,
}

impl QuorumFinder for NominationState {
    fn quorum_slice(&self, node: &NodeId) -> Option<QuorumSlice> {
        if *node == self.node_id {
            return Some(self.D.clone());
        }
        self.N.get(node).map(|m| m.D.clone())
    }

    fn node_id(&self) -> &NodeId {
        &self.node_id
    }
}

impl NominationState {
    /// Create nomination state for a new slot.
    pub fn new(node_id: NodeId, quorum_slice: QuorumSlice, logger: Logger) -> Self {
        Self {
            X: Vec::new(),
            Y: Vec::new(),
            Z: Vec::new(),
            N: HashMap::default(),
            node_id,
            D: quorum_slice,
            logger,
        }
    }

    /// Whether we have anything to put in an outgoing nomination message.
    /// False until we either receive a peer nomination or get a default.
    pub fn has_nomination(&self) -> bool {
        !self.X.is_empty()
    }

    /// Vote to nominate `v` if we aren't voting for anything yet.
    pub fn set_default(&mut self, v: SlotValue) {
        if self.has_nomination() {
            return;
        }
        self.X = vec![v];
    }

    /// The value balloting should start from: the combination of the most
    /// advanced non-empty stage. Calling this with nothing nominated is a
    /// programming error.
    pub fn predict_value(&self) -> SlotValue {
        if !self.Z.is_empty() {
            return SlotValue::combine_slice(&self.Z);
        }
        if !self.Y.is_empty() {
            return SlotValue::combine_slice(&self.Y);
        }
        if !self.X.is_empty() {
            return SlotValue::combine_slice(&self.X);
        }
        panic!("predict_value called with no nomination");
    }

    /// Handle an incoming nomination message from a peer node.
    pub fn handle(&mut self, node: &NodeId, m: &NominationMessage) {
        let (old_len_x, old_len_y) = match self.N.get(node) {
            Some(old) => (old.X.len(), old.Y.len()),
            None => (0, 0),
        };

        // X and Y only grow; shorter lists mean an out-of-order arrival.
        if m.X.len() < old_len_x || m.Y.len() < old_len_y {
            log::warn!(self.logger, "node {} sent a stale nomination", node);
            return;
        }
        if m.X.len() == old_len_x && m.Y.len() == old_len_y {
            // A dupe.
            return;
        }
        self.N.insert(node.clone(), m.clone());

        // Values we have seen new information about.
        let mut touched = Vec::<SlotValue>::new();

        for v in &m.X[old_len_x..] {
            if !touched.contains(v) {
                touched.push(v.clone());
            }

            // Support any nomination we haven't voted for yet.
            if !self.X.contains(v) {
                log::debug!(self.logger, "supporting the nomination of {}", v);
                self.X.push(v.clone());
            }
        }

        for v in &m.Y[old_len_y..] {
            if !touched.contains(v) {
                touched.push(v.clone());
            }
        }

        for v in touched {
            self.maybe_advance(&v);
        }
    }

    /// Check whether `v` should move to accepted or confirmed, and move it.
    /// Both moves can happen in one call. Returns whether anything changed.
    pub fn maybe_advance(&mut self, v: &SlotValue) -> bool {
        if self.Z.contains(v) {
            // Already confirmed; nothing above that.
            return false;
        }

        let mut changed = false;
        let mut voted_or_accepted = Vec::<NodeId>::new();
        let mut accepted = Vec::<NodeId>::new();
        if self.X.contains(v) {
            voted_or_accepted.push(self.node_id.clone());
        }
        if self.Y.contains(v) {
            accepted.push(self.node_id.clone());
        }
        for (node, m) in &self.N {
            if m.Y.contains(v) {
                voted_or_accepted.push(node.clone());
                accepted.push(node.clone());
                continue;
            }
            if m.X.contains(v) {
                voted_or_accepted.push(node.clone());
            }
        }

        // Accept when a quorum voted for or accepted the nomination, or when
        // a set that blocks us accepted it.
        let accept = meets_quorum(self, &voted_or_accepted) || self.D.blocked_by(&accepted);

        if accept && !self.Y.contains(v) {
            log::debug!(self.logger, "accepting the nomination of {}", v);
            changed = true;
            self.Y.push(v.clone());
        }

        // Confirm once a quorum has accepted.
        if meets_quorum(self, &accepted) {
            log::debug!(self.logger, "confirming the nomination of {}", v);
            changed = true;
            self.Z.push(v.clone());
        }
        changed
    }
}
