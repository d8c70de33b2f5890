// Copyright (c) 2019-2023 The Ferrocoin Foundation

//! The slot driver composes nomination and balloting for the current slot.

use crate::{
    ballot_state::BallotState,
    msg::{BallotMessage, Message, NominationMessage},
    nominate::NominationState,
    quorum_slice::QuorumSlice,
    value::SlotValue,
    SlotIndex,
};
use fc_common::{
    logger::{log, Logger},
    NodeId,
};
use std::{collections::BTreeMap, sync::Arc, time::Instant};

/// Application-specific source of the default value to nominate when a slot
/// starts with nothing else on the table. Must produce a value unique to
/// this node and moment, so that concurrent defaults merge instead of
/// colliding.
pub type ProposalFn = Arc<dyn Fn() -> SlotValue + Send + Sync>;

/// A decided slot: the value and the confirmed-commit counter range.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExternalizedSlot {
    /// The slot index.
    pub slot: SlotIndex,
    /// The decided value.
    pub value: SlotValue,
    /// Low end of the confirmed-commit range.
    pub CN: u32,
    /// High end of the confirmed-commit range.
    pub HN: u32,
}

/// Runs one slot at a time: nomination plus balloting, the record of every
/// slot decided so far, and the production of our outgoing broadcast.
pub struct SlotDriver {
    /// Which slot is actively being built. Starts at 1.
    slot: SlotIndex,

    /// When we started working on the current slot.
    start: Instant,

    /// Values for past slots that have already achieved consensus.
    values: BTreeMap<SlotIndex, ExternalizedSlot>,

    n_state: NominationState,

    /// Created when balloting first has something to do.
    b_state: Option<BallotState>,

    /// Who we are.
    node_id: NodeId,

    /// Who we care about.
    D: QuorumSlice,

    proposal_fn: ProposalFn,

    logger: Logger,
}

impl SlotDriver {
    /// Create a driver starting at slot 1.
    pub fn new(
        node_id: NodeId,
        quorum_slice: QuorumSlice,
        proposal_fn: ProposalFn,
        logger: Logger,
    ) -> Self {
        let n_state =
            NominationState::new(node_id.clone(), quorum_slice.clone(), logger.clone());
        Self {
            slot: 1,
            start: Instant::now(),
            values: BTreeMap::new(),
            n_state,
            b_state: None,
            node_id,
            D: quorum_slice,
            proposal_fn,
            logger,
        }
    }

    /// The slot currently being agreed on (the next un-externalized slot).
    pub fn slot(&self) -> SlotIndex {
        self.slot
    }

    /// Our quorum slice.
    pub fn quorum_slice(&self) -> &QuorumSlice {
        &self.D
    }

    /// The record for an already-decided slot, if we have it.
    pub fn externalized(&self, slot: SlotIndex) -> Option<&ExternalizedSlot> {
        self.values.get(&slot)
    }

    /// The nomination state of the current slot.
    pub fn nomination_state(&self) -> &NominationState {
        &self.n_state
    }

    /// The ballot state of the current slot, if balloting has started.
    pub fn ballot_state(&self) -> Option<&BallotState> {
        self.b_state.as_ref()
    }

    fn fresh_states(&mut self) {
        self.n_state =
            NominationState::new(self.node_id.clone(), self.D.clone(), self.logger.clone());
        self.b_state = None;
        self.start = Instant::now();
    }

    // Move from nomination to balloting once nomination has confirmed
    // candidates, and track the growing composite value while balloting is
    // still unanchored.
    fn maybe_start_ballot(&mut self) {
        if self.n_state.Z.is_empty() {
            return;
        }
        let value = self.n_state.predict_value();
        let node_id = self.node_id.clone();
        let quorum_slice = self.D.clone();
        let logger = self.logger.clone();
        let b_state = self
            .b_state
            .get_or_insert_with(|| BallotState::new(node_id, quorum_slice, logger));
        if !b_state.maybe_start(value.clone()) {
            b_state.maybe_update_vote(value);
        }
    }

    fn check_externalized(&mut self) -> Option<ExternalizedSlot> {
        let (value, cn, hn) = self.b_state.as_ref()?.externalized()?;
        let record = ExternalizedSlot {
            slot: self.slot,
            value,
            CN: cn,
            HN: hn,
        };
        log::info!(
            self.logger,
            "slot {} externalized {} after {:?}",
            self.slot,
            record.value,
            self.start.elapsed(),
        );
        self.values.insert(self.slot, record.clone());
        self.slot += 1;
        self.fresh_states();
        Some(record)
    }

    /// The outgoing broadcast: one nomination message, plus a ballot message
    /// once balloting has begun. Nominates a default value if there is
    /// nothing to nominate yet.
    pub fn outgoing_messages(&mut self) -> Vec<Message> {
        if !self.n_state.has_nomination() {
            // There's nothing on the table. Put our own proposal up.
            let value = (self.proposal_fn)();
            log::debug!(self.logger, "nominating {}", value);
            self.n_state.set_default(value);
        }
        self.maybe_start_ballot();

        let mut answer = vec![Message::Nomination(NominationMessage {
            I: self.slot,
            X: self.n_state.X.clone(),
            Y: self.n_state.Y.clone(),
            D: self.D.clone(),
        })];

        if let Some(b_state) = &self.b_state {
            if b_state.has_message() {
                answer.push(b_state.message(self.slot, self.D.clone()).into());
            }
        }

        answer
    }

    /// Handle a nomination message for the current slot.
    pub fn handle_nomination(&mut self, sender: &NodeId, m: &NominationMessage) {
        self.n_state.handle(sender, m);
        self.maybe_start_ballot();
    }

    /// Handle a ballot message for the current slot. Returns the slot record
    /// if this message externalized the slot.
    pub fn handle_ballot(
        &mut self,
        sender: &NodeId,
        m: &BallotMessage,
    ) -> Option<ExternalizedSlot> {
        self.maybe_start_ballot();
        let node_id = self.node_id.clone();
        let quorum_slice = self.D.clone();
        let logger = self.logger.clone();
        let b_state = self
            .b_state
            .get_or_insert_with(|| BallotState::new(node_id, quorum_slice, logger));
        b_state.handle(sender, m);
        self.check_externalized()
    }

    /// Handle any message for the current slot, dispatching by variant.
    pub fn handle(&mut self, sender: &NodeId, message: &Message) -> Option<ExternalizedSlot> {
        match message {
            Message::Nomination(m) => {
                self.handle_nomination(sender, m);
                None
            }
            Message::Prepare(m) => {
                self.handle_ballot(sender, &BallotMessage::Prepare(m.clone()))
            }
            Message::Confirm(m) => {
                self.handle_ballot(sender, &BallotMessage::Confirm(m.clone()))
            }
            Message::Externalize(m) => {
                self.handle_ballot(sender, &BallotMessage::Externalize(m.clone()))
            }
        }
    }

    /// Adopt an already-decided slot without running the protocol, because a
    /// peer showed us its externalized record. No-op for slots we already
    /// have. Returns the adopted record.
    pub fn catch_up(
        &mut self,
        slot: SlotIndex,
        value: SlotValue,
        cn: u32,
        hn: u32,
    ) -> Option<ExternalizedSlot> {
        if slot < self.slot {
            return None;
        }
        if slot > self.slot {
            // We never saw the slots in between; their values are lost to us
            // unless a peer replays them later.
            log::warn!(
                self.logger,
                "catching up from slot {} to {} leaves a gap",
                self.slot,
                slot,
            );
        }
        log::info!(self.logger, "caught up: slot {} decided {}", slot, value);
        let record = ExternalizedSlot {
            slot,
            value,
            CN: cn,
            HN: hn,
        };
        self.values.insert(slot, record.clone());
        self.slot = slot + 1;
        self.fresh_states();
        Some(record)
    }
}
