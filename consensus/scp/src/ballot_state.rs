// Copyright (c) 2019-2023 The Ferrocoin Foundation

//! The three-phase ballot protocol of a slot.

use crate::{
    ballot::Ballot,
    msg::{BallotMessage, ConfirmMessage, ExternalizeMessage, PrepareMessage},
    quorum_slice::{meets_quorum, QuorumFinder, QuorumSlice},
    value::SlotValue,
    SlotIndex,
};
use fc_common::{
    logger::{log, Logger},
    HashMap, NodeId,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The phases of the ballot protocol. A slot only ever moves forward:
/// Prepare, then Confirm, then Externalize, which is terminal.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Phase {
    /// Voting and accepting ballots as prepared.
    Prepare,
    /// A commit has been accepted; the value is fixed.
    Confirm,
    /// A commit has been confirmed; the slot is decided.
    Externalize,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Phase::Prepare => write!(f, "Prepare"),
            Phase::Confirm => write!(f, "Confirm"),
            Phase::Externalize => write!(f, "Externalize"),
        }
    }
}

/// Per-slot ballot state.
///
/// The null ballot is represented by `None`; `CN = HN = 0` is the empty
/// counter range (0 is not a valid ballot counter). The meaning of
/// `[CN, HN]` depends on the phase: counters we have voted to commit
/// (Prepare), accepted as committed (Confirm), or confirmed as committed
/// (Externalize).
pub struct BallotState {
    /// What phase of balloting we are in.
    phase: Phase,

    /// The current ballot we are trying to prepare and commit.
    pub B: Option<Ballot>,

    /// The highest two incompatible ballots that are accepted as prepared.
    /// P is the highest, PP the next. Invariant: when both are present they
    /// are incompatible and `PP < P`.
    pub P: Option<Ballot>,
    /// See `P`.
    pub PP: Option<Ballot>,

    /// Low end of the phase-dependent counter range.
    pub CN: u32,
    /// High end of the phase-dependent counter range.
    pub HN: u32,

    /// The value to use in the next ballot, if this ballot fails. `None`
    /// when we have no idea what value we would use.
    pub Z: Option<SlotValue>,

    /// The latest ballot message from each peer.
    M: HashMap<NodeId, BallotMessage>,

    /// Who we are.
    node_id: NodeId,

    /// Who we listen to for quorum.
    D: QuorumSlice,

    logger: Logger,
}

impl QuorumFinder for BallotState {
    fn quorum_slice(&self, node: &NodeId) -> Option<QuorumSlice> {
        if *node == self.node_id {
            return Some(self.D.clone());
        }
        self.M.get(node).map(|m| m.quorum_slice().clone())
    }

    fn node_id(&self) -> &NodeId {
        &self.node_id
    }
}

impl BallotState {
    /// Create ballot state for a new slot.
    pub fn new(node_id: NodeId, quorum_slice: QuorumSlice, logger: Logger) -> Self {
        Self {
            phase: Phase::Prepare,
            B: None,
            P: None,
            PP: None,
            CN: 0,
            HN: 0,
            Z: None,
            M: HashMap::default(),
            node_id,
            D: quorum_slice,
            logger,
        }
    }

    /// The current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The decided value and confirmed-commit range, once the slot has
    /// externalized.
    pub fn externalized(&self) -> Option<(SlotValue, u32, u32)> {
        if self.phase != Phase::Externalize {
            return None;
        }
        let b = self
            .B
            .as_ref()
            .expect("externalize phase without a ballot");
        Some((b.X.clone(), self.CN, self.HN))
    }

    /// Start balloting on `v` if nothing has happened yet. This is the first
    /// Prepare vote of the slot; it is a no-op once any ballot, accepted
    /// prepare, or commit range exists.
    pub fn maybe_start(&mut self, v: SlotValue) -> bool {
        if self.phase != Phase::Prepare
            || self.B.is_some()
            || self.P.is_some()
            || self.PP.is_some()
            || self.HN != 0
        {
            return false;
        }
        log::debug!(self.logger, "voting to prepare <1, {}>", v);
        self.B = Some(Ballot::new(1, &v));
        self.Z = Some(v);
        true
    }

    /// Move our prepare vote to `v` if balloting is still unanchored: we
    /// have voted but nothing has been accepted as prepared and no commit
    /// range exists, here or among our peers' influence on us. Nomination
    /// keeps running underneath balloting, so the composite candidate value
    /// can grow after our first vote; without this, nodes that seeded from
    /// different partial candidate sets could wait on each other forever.
    /// The counter goes up so peers treat the new vote as newer.
    pub fn maybe_update_vote(&mut self, v: SlotValue) -> bool {
        if self.phase != Phase::Prepare
            || self.P.is_some()
            || self.PP.is_some()
            || self.CN != 0
            || self.HN != 0
        {
            return false;
        }
        let current = match &self.B {
            Some(b) => b.clone(),
            None => return false,
        };
        if current.X == v {
            return false;
        }
        log::debug!(
            self.logger,
            "moving prepare vote from {} to <{}, {}>",
            current,
            current.N + 1,
            v,
        );
        self.B = Some(Ballot::new(current.N + 1, &v));
        self.Z = Some(v);
        true
    }

    /// Maybe accept ballot `(n, x)` as prepared.
    pub fn maybe_accept_as_prepared(&mut self, n: u32, x: &SlotValue) {
        if self.phase != Phase::Prepare {
            return;
        }
        if n == 0 {
            return;
        }

        // Check if we already accept this as prepared.
        if let Some(p) = &self.P {
            if p.covers(n, x) {
                return;
            }
        }
        if let Some(pp) = &self.PP {
            if pp.covers(n, x) {
                return;
            }
            if pp.N >= n {
                // This is about an old ballot number; even if it is accepted
                // it does not change P or PP.
                return;
            }
        }

        // The rules for accepting: a quorum has voted or accepted, or a set
        // that blocks us has accepted.
        let mut voted_or_accepted = Vec::<NodeId>::new();
        let mut accepted = Vec::<NodeId>::new();
        if let Some(b) = &self.B {
            if b.covers(n, x) {
                // We have voted for this.
                voted_or_accepted.push(self.node_id.clone());
            }
        }

        for (node, m) in &self.M {
            if m.accepts_as_prepared(n, x) {
                accepted.push(node.clone());
                voted_or_accepted.push(node.clone());
                continue;
            }
            if m.votes_to_prepare(n, x) {
                voted_or_accepted.push(node.clone());
            }
        }

        if !meets_quorum(self, &voted_or_accepted) && !self.D.blocked_by(&accepted) {
            // We can't accept this as prepared yet.
            return;
        }

        if let Some(b) = &self.B {
            if self.HN <= n && b.X != *x {
                // Accepting this as prepared aborts our current ballot.
                log::debug!(self.logger, "aborting {} for <{}, {}>", b, n, x);
                self.B = None;
                self.CN = 0;
                self.HN = 0;
            }
        }

        // P and PP are the top two conflicting ballots we accept as
        // prepared; fold the new one in.
        let ballot = Ballot::new(n, x);
        match self.P.take() {
            None => {
                self.P = Some(ballot);
            }
            Some(mut p) if p.X == *x => {
                assert!(n > p.N, "covered ballots were short-circuited above");
                p.N = n;
                self.P = Some(p);
            }
            Some(p) if n >= p.N => {
                self.PP = Some(p);
                self.P = Some(ballot);
            }
            Some(p) => {
                // Anything not worth bumping PP was filtered at the top.
                self.P = Some(p);
                self.PP = Some(ballot);
            }
        }
        log::debug!(
            self.logger,
            "accepted <{}, {}> as prepared (P={:?} PP={:?})",
            n,
            x,
            self.P.as_ref().map(|b| b.N),
            self.PP.as_ref().map(|b| b.N),
        );
    }

    /// Maybe confirm ballot `(n, x)` as prepared, which is when we begin
    /// voting to commit it.
    pub fn maybe_confirm_as_prepared(&mut self, n: u32, x: &SlotValue) {
        if self.phase != Phase::Prepare {
            return;
        }
        if self.HN >= n {
            // We are already past this ballot.
            return;
        }

        // We confirm when a quorum accepts as prepared.
        let mut accepted = Vec::<NodeId>::new();
        let self_accepts = self.P.as_ref().map_or(false, |p| p.covers(n, x))
            || self.PP.as_ref().map_or(false, |pp| pp.covers(n, x));
        if self_accepts {
            accepted.push(self.node_id.clone());
        }

        for (node, m) in &self.M {
            if m.accepts_as_prepared(n, x) {
                accepted.push(node.clone());
            }
        }

        if !meets_quorum(self, &accepted) {
            return;
        }

        // Time to vote to commit it.
        log::debug!(self.logger, "confirmed <{}, {}> as prepared", n, x);
        if let Some(b) = &self.B {
            if b.X != *x {
                // We have to abort the current ballot first.
                self.B = None;
                self.HN = 0;
                self.CN = 0;
            }
        }

        match &mut self.B {
            None => {
                // We weren't working on any ballot; work on this one.
                self.B = Some(Ballot::new(n, x));
                self.HN = n;
                self.CN = n;
                self.Z = Some(x.clone());
            }
            Some(b) => {
                // We were working on a lower number; extend the range,
                // keeping the lowest counter we began voting to commit at.
                self.HN = n;
                if self.CN == 0 {
                    self.CN = n;
                }
                // Invariant: B.N >= HN.
                if b.N < n {
                    b.N = n;
                }
            }
        }
    }

    /// Maybe accept ballot `(n, x)` as committed. The first acceptance moves
    /// us to the Confirm phase and fixes the slot's value.
    pub fn maybe_accept_as_committed(&mut self, n: u32, x: &SlotValue) {
        if self.phase == Phase::Externalize {
            return;
        }
        if self.phase == Phase::Confirm
            && self.CN <= n
            && n <= self.HN
            && self.B.as_ref().map_or(false, |b| b.X == *x)
        {
            // We already accept this commit.
            return;
        }

        let mut voted_or_accepted = Vec::<NodeId>::new();
        let mut accepted = Vec::<NodeId>::new();

        if self.phase == Phase::Prepare {
            if let Some(b) = &self.B {
                if b.X == *x && self.CN != 0 && self.CN <= n && n <= self.HN {
                    // We vote to commit this.
                    voted_or_accepted.push(self.node_id.clone());
                }
            }
        }

        for (node, m) in &self.M {
            if m.accepts_as_committed(n, x) {
                voted_or_accepted.push(node.clone());
                accepted.push(node.clone());
            } else if m.votes_to_commit(n, x) {
                voted_or_accepted.push(node.clone());
            }
        }

        if !meets_quorum(self, &voted_or_accepted) && !self.D.blocked_by(&accepted) {
            // We can't accept this commit yet.
            return;
        }

        if self.phase == Phase::Prepare {
            log::info!(self.logger, "accepted commit <{}, {}>, moving to Confirm", n, x);
        }
        self.phase = Phase::Confirm;
        let replace = match &self.B {
            None => true,
            Some(b) => b.X != *x,
        };
        if replace {
            // Totally replace our old target value.
            self.B = Some(Ballot::new(n, x));
            self.CN = n;
            self.HN = n;
            self.Z = Some(x.clone());
        } else {
            // Just widen our range of acceptance. A zero CN means we had
            // not voted to commit anything yet; the range starts here.
            if self.CN == 0 || n < self.CN {
                self.CN = n;
            }
            if n > self.HN {
                self.HN = n;
            }
        }
    }

    /// Maybe confirm ballot `(n, x)` as committed. The first confirmation
    /// externalizes the slot.
    pub fn maybe_confirm_as_committed(&mut self, n: u32, x: &SlotValue) {
        if self.phase == Phase::Prepare {
            return;
        }
        let compatible = self.B.as_ref().map_or(false, |b| b.X == *x);
        if !compatible {
            return;
        }

        let mut accepted = Vec::<NodeId>::new();
        if self.phase == Phase::Confirm {
            if self.CN <= n && n <= self.HN {
                accepted.push(self.node_id.clone());
            }
        } else if self.CN <= n && n <= self.HN {
            // We already confirmed this as committed.
            return;
        }

        for (node, m) in &self.M {
            if m.accepts_as_committed(n, x) {
                accepted.push(node.clone());
            }
        }

        if !meets_quorum(self, &accepted) {
            return;
        }

        if self.phase == Phase::Confirm {
            log::info!(self.logger, "confirmed commit <{}, {}>, externalizing", n, x);
            self.phase = Phase::Externalize;
            self.CN = n;
            self.HN = n;
        } else {
            if n < self.CN {
                self.CN = n;
            }
            if n > self.HN {
                self.HN = n;
            }
        }
    }

    /// Bump the ballot counter if the nodes already on a higher counter
    /// block us. Returns whether a bump happened.
    pub fn maybe_next_ballot(&mut self) -> bool {
        if self.Z.is_none() || self.B.is_none() {
            return false;
        }

        let current = self.B.as_ref().map_or(0, |b| b.N);
        let higher: Vec<NodeId> = self
            .M
            .iter()
            .filter(|(_, m)| m.ballot_number() > current)
            .map(|(node, _)| node.clone())
            .collect();

        if !self.D.blocked_by(&higher) {
            return false;
        }

        let b = self.B.as_mut().expect("checked above");
        b.N += 1;
        log::debug!(self.logger, "bumping ballot to counter {}", b.N);
        true
    }

    /// Run the four checks, in order, for ballot `(n, x)`.
    pub fn investigate(&mut self, n: u32, x: &SlotValue) {
        if n == 0 {
            return;
        }
        self.maybe_accept_as_prepared(n, x);
        self.maybe_confirm_as_prepared(n, x);
        self.maybe_accept_as_committed(n, x);
        self.maybe_confirm_as_committed(n, x);
    }

    /// Handle an incoming ballot message from a peer node.
    pub fn handle(&mut self, node: &NodeId, message: &BallotMessage) {
        // If this message isn't new, skip it.
        if let Some(old) = self.M.get(node) {
            if old >= message {
                log::debug!(self.logger, "node {} sent a stale ballot message", node);
                return;
            }
        }
        self.M.insert(node.clone(), message.clone());

        loop {
            // Investigate every ballot the message names.
            match message {
                BallotMessage::Prepare(m) => {
                    self.investigate(m.Bn, &m.Bx);
                    self.investigate(m.Pn, &m.Px);
                    self.investigate(m.Ppn, &m.Ppx);
                }
                BallotMessage::Confirm(m) => {
                    self.investigate(m.Hn, &m.X);
                }
                BallotMessage::Externalize(m) => {
                    for n in m.Cn..=m.Hn {
                        self.investigate(n, &m.X);
                    }
                }
            }

            // A bumped ballot can re-enable the checks above; keep going
            // until the counter settles.
            if !self.maybe_next_ballot() {
                break;
            }
        }
    }

    /// Whether we have anything to broadcast yet.
    pub fn has_message(&self) -> bool {
        self.B.is_some()
    }

    /// The outgoing broadcast for this slot. Calling this without a ballot
    /// is a programming error; check `has_message` first.
    pub fn message(&self, slot: SlotIndex, quorum_slice: QuorumSlice) -> BallotMessage {
        let b = self.B.as_ref().expect("message called without a ballot");

        match self.phase {
            Phase::Prepare => BallotMessage::Prepare(PrepareMessage {
                I: slot,
                Bn: b.N,
                Bx: b.X.clone(),
                Pn: self.P.as_ref().map_or(0, |p| p.N),
                Px: self.P.as_ref().map_or_else(SlotValue::default, |p| p.X.clone()),
                Ppn: self.PP.as_ref().map_or(0, |pp| pp.N),
                Ppx: self
                    .PP
                    .as_ref()
                    .map_or_else(SlotValue::default, |pp| pp.X.clone()),
                Cn: self.CN,
                Hn: self.HN,
                D: quorum_slice,
            }),
            Phase::Confirm => BallotMessage::Confirm(ConfirmMessage {
                I: slot,
                X: b.X.clone(),
                Pn: self.P.as_ref().map_or(0, |p| p.N),
                Cn: self.CN,
                Hn: self.HN,
                D: quorum_slice,
            }),
            Phase::Externalize => BallotMessage::Externalize(ExternalizeMessage {
                I: slot,
                X: b.X.clone(),
                Cn: self.CN,
                Hn: self.HN,
                D: quorum_slice,
            }),
        }
    }
}

#[cfg(test)]
mod ballot_state_tests {
    use super::*;
    use crate::test_utils::test_quorum_slice;
    use fc_common::logger::create_null_logger;

    fn value(s: &str) -> SlotValue {
        SlotValue::new(s.to_string())
    }

    fn new_state() -> (BallotState, Vec<NodeId>, QuorumSlice) {
        let (slice, ids) = test_quorum_slice(4);
        let state = BallotState::new(ids[0].clone(), slice.clone(), create_null_logger());
        (state, ids, slice)
    }

    fn prepare_msg(slice: &QuorumSlice, bn: u32, bx: &SlotValue) -> BallotMessage {
        BallotMessage::Prepare(PrepareMessage {
            I: 1,
            Bn: bn,
            Bx: bx.clone(),
            Pn: 0,
            Px: SlotValue::default(),
            Ppn: 0,
            Ppx: SlotValue::default(),
            Cn: 0,
            Hn: 0,
            D: slice.clone(),
        })
    }

    fn prepared_msg(slice: &QuorumSlice, pn: u32, px: &SlotValue) -> BallotMessage {
        BallotMessage::Prepare(PrepareMessage {
            I: 1,
            Bn: pn,
            Bx: px.clone(),
            Pn: pn,
            Px: px.clone(),
            Ppn: 0,
            Ppx: SlotValue::default(),
            Cn: 0,
            Hn: 0,
            D: slice.clone(),
        })
    }

    fn commit_vote_msg(slice: &QuorumSlice, n: u32, x: &SlotValue) -> BallotMessage {
        BallotMessage::Prepare(PrepareMessage {
            I: 1,
            Bn: n,
            Bx: x.clone(),
            Pn: n,
            Px: x.clone(),
            Ppn: 0,
            Ppx: SlotValue::default(),
            Cn: n,
            Hn: n,
            D: slice.clone(),
        })
    }

    fn confirm_msg(slice: &QuorumSlice, n: u32, x: &SlotValue) -> BallotMessage {
        BallotMessage::Confirm(ConfirmMessage {
            I: 1,
            X: x.clone(),
            Pn: n,
            Cn: n,
            Hn: n,
            D: slice.clone(),
        })
    }

    #[test]
    fn maybe_start_is_once_only() {
        let (mut state, _, _) = new_state();
        assert!(state.maybe_start(value("a")));
        assert_eq!(state.B, Some(Ballot::new(1, &value("a"))));
        assert_eq!(state.Z, Some(value("a")));

        assert!(!state.maybe_start(value("b")));
        assert_eq!(state.B, Some(Ballot::new(1, &value("a"))));
    }

    #[test]
    fn unanchored_vote_follows_the_growing_candidate() {
        let (mut state, ids, slice) = new_state();
        let small = value("a");
        let grown = SlotValue::combine(&small, &value("b"));

        state.maybe_start(small.clone());
        assert!(state.maybe_update_vote(grown.clone()));
        // The counter goes up so the re-vote supersedes the old one.
        assert_eq!(state.B, Some(Ballot::new(2, &grown)));
        assert_eq!(state.Z, Some(grown.clone()));

        // Same value again: nothing to do.
        assert!(!state.maybe_update_vote(grown.clone()));

        // Once something is accepted as prepared, the vote is anchored.
        state.handle(&ids[1], &prepared_msg(&slice, 2, &grown));
        state.handle(&ids[2], &prepared_msg(&slice, 2, &grown));
        assert!(!state.maybe_update_vote(value("c")));
    }

    #[test]
    fn quorum_of_prepare_votes_accepts_prepared() {
        let (mut state, ids, slice) = new_state();
        let v = value("a");
        state.maybe_start(v.clone());

        // Our own vote plus two peers is a 3-of-4 quorum.
        state.handle(&ids[1], &prepare_msg(&slice, 1, &v));
        state.handle(&ids[2], &prepare_msg(&slice, 1, &v));

        assert_eq!(state.P, Some(Ballot::new(1, &v)));
        assert_eq!(state.PP, None);
        assert_eq!(state.phase(), Phase::Prepare);
    }

    #[test]
    fn quorum_of_accepts_confirms_prepared_and_votes_commit() {
        let (mut state, ids, slice) = new_state();
        let v = value("a");
        state.maybe_start(v.clone());

        state.handle(&ids[1], &prepared_msg(&slice, 1, &v));
        state.handle(&ids[2], &prepared_msg(&slice, 1, &v));

        // Confirmed prepared: we adopt the range and vote to commit.
        assert_eq!(state.CN, 1);
        assert_eq!(state.HN, 1);
        assert_eq!(state.B, Some(Ballot::new(1, &v)));
        assert_eq!(state.phase(), Phase::Prepare);
    }

    #[test]
    fn accepting_conflicting_prepared_aborts_ballot() {
        let (mut state, ids, slice) = new_state();
        let mine = value("a");
        let theirs = value("b");
        state.maybe_start(mine.clone());

        // A quorum votes to prepare a conflicting higher ballot.
        state.handle(&ids[1], &prepare_msg(&slice, 2, &theirs));
        state.handle(&ids[2], &prepare_msg(&slice, 2, &theirs));

        // Our working ballot is aborted, and the conflicting ballot is now
        // the highest accepted-prepared.
        assert_eq!(state.P, Some(Ballot::new(2, &theirs)));
        assert_eq!(state.B, None);
        assert_eq!(state.CN, 0);
        assert_eq!(state.HN, 0);
    }

    #[test]
    fn p_and_pp_track_top_two_incompatible() {
        let (mut state, ids, slice) = new_state();
        let a = value("a");
        let b = value("b");

        state.handle(&ids[1], &prepared_msg(&slice, 2, &a));
        state.handle(&ids[2], &prepared_msg(&slice, 2, &a));
        assert_eq!(state.P, Some(Ballot::new(2, &a)));

        state.handle(&ids[1], &prepared_msg(&slice, 3, &b));
        state.handle(&ids[2], &prepared_msg(&slice, 3, &b));
        assert_eq!(state.P, Some(Ballot::new(3, &b)));
        assert_eq!(state.PP, Some(Ballot::new(2, &a)));

        // Same value at a higher counter only raises P.
        state.handle(&ids[1], &prepared_msg(&slice, 5, &b));
        state.handle(&ids[2], &prepared_msg(&slice, 5, &b));
        assert_eq!(state.P, Some(Ballot::new(5, &b)));
        assert_eq!(state.PP, Some(Ballot::new(2, &a)));
    }

    #[test]
    fn accept_commit_moves_to_confirm() {
        let (mut state, ids, slice) = new_state();
        let v = value("a");
        state.maybe_start(v.clone());

        // Get to voting commit [1, 1].
        state.handle(&ids[1], &prepared_msg(&slice, 1, &v));
        state.handle(&ids[2], &prepared_msg(&slice, 1, &v));
        assert_eq!((state.CN, state.HN), (1, 1));

        // Two peers voting commit plus our own vote is a quorum.
        state.handle(&ids[1], &commit_vote_msg(&slice, 1, &v));
        state.handle(&ids[2], &commit_vote_msg(&slice, 1, &v));
        assert_eq!(state.phase(), Phase::Confirm);
        assert_eq!((state.CN, state.HN), (1, 1));
    }

    #[test]
    fn confirm_commit_externalizes() {
        let (mut state, ids, slice) = new_state();
        let v = value("a");
        state.maybe_start(v.clone());

        state.handle(&ids[1], &confirm_msg(&slice, 1, &v));
        state.handle(&ids[2], &confirm_msg(&slice, 1, &v));

        assert_eq!(state.phase(), Phase::Externalize);
        assert_eq!(state.externalized(), Some((v, 1, 1)));
    }

    #[test]
    fn phase_only_advances() {
        let (mut state, ids, slice) = new_state();
        let v = value("a");
        state.maybe_start(v.clone());

        state.handle(&ids[1], &confirm_msg(&slice, 1, &v));
        state.handle(&ids[2], &confirm_msg(&slice, 1, &v));
        assert_eq!(state.phase(), Phase::Externalize);

        // More traffic cannot move the slot out of Externalize.
        state.handle(&ids[3], &prepare_msg(&slice, 5, &value("b")));
        assert_eq!(state.phase(), Phase::Externalize);
        assert_eq!(state.externalized(), Some((v, 1, 1)));
    }

    #[test]
    fn blocking_set_on_higher_counter_bumps_ballot() {
        let (mut state, ids, slice) = new_state();
        let v = value("a");
        state.maybe_start(v.clone());
        assert_eq!(state.B.as_ref().unwrap().N, 1);

        // Two peers on counter 3 block every 3-of-4 selection; we bump one
        // counter per handled message until we catch up.
        state.handle(&ids[1], &prepare_msg(&slice, 3, &v));
        state.handle(&ids[2], &prepare_msg(&slice, 3, &v));
        assert_eq!(state.B.as_ref().unwrap().N, 3);
    }

    #[test]
    fn stale_ballot_messages_are_discarded() {
        let (mut state, ids, slice) = new_state();
        let v = value("a");

        state.handle(&ids[1], &prepared_msg(&slice, 3, &v));
        // An older message from the same peer does not roll back its entry:
        // with only node 1 accepting at counter 5 nothing changes, and the
        // stale lower prepare cannot re-trigger anything either.
        let before = state.M.get(&ids[1]).cloned();
        state.handle(&ids[1], &prepare_msg(&slice, 1, &v));
        assert_eq!(state.M.get(&ids[1]).cloned(), before);
    }

    #[test]
    fn z_agrees_with_ballot_value() {
        let (mut state, ids, slice) = new_state();
        let v = value("a");
        state.maybe_start(v.clone());

        state.handle(&ids[1], &prepared_msg(&slice, 1, &v));
        state.handle(&ids[2], &prepared_msg(&slice, 1, &v));
        state.handle(&ids[1], &commit_vote_msg(&slice, 1, &v));
        state.handle(&ids[2], &commit_vote_msg(&slice, 1, &v));
        state.handle(&ids[1], &confirm_msg(&slice, 1, &v));
        state.handle(&ids[2], &confirm_msg(&slice, 1, &v));

        // Whenever a ballot exists, Z matches its value.
        let b = state.B.as_ref().unwrap();
        assert_eq!(state.Z.as_ref(), Some(&b.X));
    }

    #[test]
    fn externalize_message_range_catches_up_a_peerless_state() {
        let (mut state, ids, slice) = new_state();
        let v = value("a");

        // Externalize messages from two peers cover [1, 2]; that is a
        // blocking set for accept-committed and, with their slices known, a
        // quorum for confirm-committed.
        let ext = BallotMessage::Externalize(ExternalizeMessage {
            I: 1,
            X: v.clone(),
            Cn: 1,
            Hn: 2,
            D: slice.clone(),
        });
        state.handle(&ids[1], &ext);
        assert_eq!(state.phase(), Phase::Prepare);
        state.handle(&ids[2], &ext);

        assert_eq!(state.phase(), Phase::Externalize);
        let (x, cn, hn) = state.externalized().unwrap();
        assert_eq!(x, v);
        assert!(cn >= 1 && hn <= 2 && cn <= hn);
    }

    #[test]
    #[should_panic(expected = "without a ballot")]
    fn message_without_a_ballot_is_a_bug() {
        let (state, _, slice) = new_state();
        assert!(!state.has_message());
        let _ = state.message(1, slice);
    }

    #[test]
    fn message_reflects_phase() {
        let (mut state, ids, slice) = new_state();
        let v = value("a");
        state.maybe_start(v.clone());
        assert!(state.has_message());

        match state.message(1, slice.clone()) {
            BallotMessage::Prepare(m) => {
                assert_eq!(m.Bn, 1);
                assert_eq!(m.Bx, v);
                assert_eq!((m.Pn, m.Ppn, m.Cn, m.Hn), (0, 0, 0, 0));
            }
            other => panic!("expected prepare, got {:?}", other),
        }

        state.handle(&ids[1], &confirm_msg(&slice, 1, &v));
        state.handle(&ids[2], &confirm_msg(&slice, 1, &v));
        match state.message(1, slice) {
            BallotMessage::Externalize(m) => {
                assert_eq!(m.X, v);
                assert_eq!((m.Cn, m.Hn), (1, 1));
            }
            other => panic!("expected externalize, got {:?}", other),
        }
    }
}
