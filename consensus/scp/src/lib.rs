// Copyright (c) 2019-2023 The Ferrocoin Foundation

//! Ferrocoin's implementation of federated Byzantine agreement.
//!
//! Nodes exchange signed messages with a self-chosen set of peers and agree,
//! slot by slot, on an ordered sequence of slot values. Each slot runs a
//! nomination round followed by three-phase balloting (Prepare, Confirm,
//! Externalize); quorums are discovered transitively from the quorum slices
//! peers declare in their messages.
//!
//! Where single-letter names appear (`X`, `Y`, `Z`, `B`, `P`, `PP`, `CN`,
//! `HN`), they line up with the Stellar consensus whitepaper so the code can
//! be read against the protocol description.

#![allow(non_snake_case)]
#![deny(missing_docs)]

pub mod ballot;
pub mod ballot_state;
pub mod driver;
pub mod msg;
pub mod nominate;
pub mod quorum_slice;
pub mod value;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

/// Slot index. The first slot of a chain is slot 1.
pub type SlotIndex = u64;

#[doc(inline)]
pub use crate::{
    ballot::Ballot,
    ballot_state::{BallotState, Phase},
    driver::{ExternalizedSlot, ProposalFn, SlotDriver},
    msg::{
        BallotMessage, ConfirmMessage, ExternalizeMessage, Message, NominationMessage,
        PrepareMessage,
    },
    nominate::NominationState,
    quorum_slice::{meets_quorum, QuorumFinder, QuorumSlice},
    value::SlotValue,
};
