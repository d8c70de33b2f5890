// Copyright (c) 2019-2023 The Ferrocoin Foundation

//! Messages used in federated voting.
//!
//! Four message types cross the wire: one for nomination and three for the
//! ballot phases. Each carries the slot index `I` and the sender's quorum
//! slice `D`. Absent ballots are encoded as counter 0 with the zero value.

use crate::{quorum_slice::QuorumSlice, value::SlotValue, SlotIndex};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt};

/// The nomination round: the values we have voted to nominate (`X`) and the
/// values we have accepted as nominated (`Y`). Both grow monotonically, so a
/// message with shorter lists than an earlier one is stale.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NominationMessage {
    /// Slot we are nominating values for.
    pub I: SlotIndex,

    /// The values we have voted to nominate.
    pub X: Vec<SlotValue>,

    /// The values we have accepted as nominated.
    pub Y: Vec<SlotValue>,

    /// Our quorum slice.
    pub D: QuorumSlice,
}

/// The Prepare phase: our current ballot `B`, the two highest incompatible
/// ballots we accept as prepared (`P` and `PP`), and the counter range
/// `[Cn, Hn]` we have voted to commit.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PrepareMessage {
    /// Slot.
    pub I: SlotIndex,

    /// Current ballot counter.
    pub Bn: u32,
    /// Current ballot value.
    pub Bx: SlotValue,

    /// Highest accepted-prepared ballot counter (0 if none).
    pub Pn: u32,
    /// Highest accepted-prepared ballot value.
    pub Px: SlotValue,

    /// Counter of the highest accepted-prepared ballot incompatible with
    /// `(Pn, Px)` (0 if none).
    pub Ppn: u32,
    /// Value of that ballot.
    pub Ppx: SlotValue,

    /// Low end of the voted-to-commit range (0 for the empty range).
    pub Cn: u32,
    /// High end of the voted-to-commit range.
    pub Hn: u32,

    /// Our quorum slice.
    pub D: QuorumSlice,
}

/// The Confirm phase: we accept commits of `X` for every counter in
/// `[Cn, Hn]`, and accept `X` as prepared up to counter `Pn`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConfirmMessage {
    /// Slot.
    pub I: SlotIndex,

    /// The value whose commit we accept.
    pub X: SlotValue,

    /// Counter up to which we accept `X` as prepared.
    pub Pn: u32,

    /// Low end of the accepted-commit range.
    pub Cn: u32,
    /// High end of the accepted-commit range.
    pub Hn: u32,

    /// Our quorum slice.
    pub D: QuorumSlice,
}

/// The terminal phase: we confirm commits of `X` for `[Cn, Hn]`. The slot is
/// decided.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExternalizeMessage {
    /// Slot.
    pub I: SlotIndex,

    /// The externalized value.
    pub X: SlotValue,

    /// Low end of the confirmed-commit range.
    pub Cn: u32,
    /// High end of the confirmed-commit range.
    pub Hn: u32,

    /// Our quorum slice.
    pub D: QuorumSlice,
}

/// Any consensus message, tagged `T` on the wire.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "T")]
pub enum Message {
    /// Nomination round.
    Nomination(NominationMessage),
    /// Ballot phase 1.
    Prepare(PrepareMessage),
    /// Ballot phase 2.
    Confirm(ConfirmMessage),
    /// Ballot phase 3, terminal.
    Externalize(ExternalizeMessage),
}

impl Message {
    /// The slot this message is about.
    pub fn slot(&self) -> SlotIndex {
        match self {
            Message::Nomination(m) => m.I,
            Message::Prepare(m) => m.I,
            Message::Confirm(m) => m.I,
            Message::Externalize(m) => m.I,
        }
    }

    /// The sender's quorum slice.
    pub fn quorum_slice(&self) -> &QuorumSlice {
        match self {
            Message::Nomination(m) => &m.D,
            Message::Prepare(m) => &m.D,
            Message::Confirm(m) => &m.D,
            Message::Externalize(m) => &m.D,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Message::Nomination(m) => {
                write!(f, "nominate(I={} |X|={} |Y|={})", m.I, m.X.len(), m.Y.len())
            }
            Message::Prepare(m) => write!(
                f,
                "prepare(I={} B=<{}, {}> P=<{}, {}> PP=<{}, {}> C={} H={})",
                m.I, m.Bn, m.Bx, m.Pn, m.Px, m.Ppn, m.Ppx, m.Cn, m.Hn
            ),
            Message::Confirm(m) => write!(
                f,
                "confirm(I={} X={} P={} C={} H={})",
                m.I, m.X, m.Pn, m.Cn, m.Hn
            ),
            Message::Externalize(m) => {
                write!(f, "externalize(I={} X={} C={} H={})", m.I, m.X, m.Cn, m.Hn)
            }
        }
    }
}

/// The three ballot-phase messages. The ballot state machine keeps the most
/// recent one per peer; `Ord` is the total order used to discard stale
/// arrivals (type priority first, then the carried ballots).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum BallotMessage {
    /// Ballot phase 1.
    Prepare(PrepareMessage),
    /// Ballot phase 2.
    Confirm(ConfirmMessage),
    /// Ballot phase 3.
    Externalize(ExternalizeMessage),
}

impl BallotMessage {
    /// The slot this message is about.
    pub fn slot(&self) -> SlotIndex {
        match self {
            BallotMessage::Prepare(m) => m.I,
            BallotMessage::Confirm(m) => m.I,
            BallotMessage::Externalize(m) => m.I,
        }
    }

    /// The sender's quorum slice.
    pub fn quorum_slice(&self) -> &QuorumSlice {
        match self {
            BallotMessage::Prepare(m) => &m.D,
            BallotMessage::Confirm(m) => &m.D,
            BallotMessage::Externalize(m) => &m.D,
        }
    }

    /// The sender's working ballot counter, for the bump rule.
    pub fn ballot_number(&self) -> u32 {
        match self {
            BallotMessage::Prepare(m) => m.Bn,
            BallotMessage::Confirm(m) => m.Hn,
            BallotMessage::Externalize(m) => m.Hn,
        }
    }

    /// Whether the sender votes to prepare ballot `(n, x)`.
    pub fn votes_to_prepare(&self, n: u32, x: &SlotValue) -> bool {
        match self {
            BallotMessage::Prepare(m) => m.Bn >= n && m.Bx == *x,
            // Past the Prepare phase the sender stands behind its value at
            // every counter.
            BallotMessage::Confirm(m) => m.X == *x,
            BallotMessage::Externalize(m) => m.X == *x,
        }
    }

    /// Whether the sender accepts ballot `(n, x)` as prepared.
    pub fn accepts_as_prepared(&self, n: u32, x: &SlotValue) -> bool {
        match self {
            BallotMessage::Prepare(m) => {
                (m.Pn >= n && m.Px == *x) || (m.Ppn >= n && m.Ppx == *x)
            }
            BallotMessage::Confirm(m) => m.X == *x && n <= m.Pn,
            BallotMessage::Externalize(m) => m.X == *x,
        }
    }

    /// Whether the sender votes to commit ballot `(n, x)`.
    pub fn votes_to_commit(&self, n: u32, x: &SlotValue) -> bool {
        match self {
            BallotMessage::Prepare(m) => m.Cn != 0 && m.Cn <= n && n <= m.Hn && m.Bx == *x,
            BallotMessage::Confirm(m) => m.X == *x,
            BallotMessage::Externalize(m) => m.X == *x,
        }
    }

    /// Whether the sender accepts ballot `(n, x)` as committed.
    pub fn accepts_as_committed(&self, n: u32, x: &SlotValue) -> bool {
        match self {
            BallotMessage::Prepare(_) => false,
            BallotMessage::Confirm(m) => m.X == *x && m.Cn <= n && n <= m.Hn,
            BallotMessage::Externalize(m) => m.X == *x && n >= m.Cn,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            BallotMessage::Prepare(_) => 0,
            BallotMessage::Confirm(_) => 1,
            BallotMessage::Externalize(_) => 2,
        }
    }
}

// Total order: type priority, then the carried ballots. Within a type the
// counters are compared before the values; `Cn` compares reversed for
// Confirm and Externalize because the accepted/confirmed range widens
// downward as the sender's state advances.
impl Ord for BallotMessage {
    fn cmp(&self, other: &Self) -> Ordering {
        let rank = self.type_rank().cmp(&other.type_rank());
        if rank != Ordering::Equal {
            return rank;
        }

        match (self, other) {
            (BallotMessage::Prepare(a), BallotMessage::Prepare(b)) => a
                .Bn
                .cmp(&b.Bn)
                .then(a.Pn.cmp(&b.Pn))
                .then(a.Ppn.cmp(&b.Ppn))
                .then(a.Hn.cmp(&b.Hn))
                .then(a.Cn.cmp(&b.Cn))
                .then_with(|| a.Bx.cmp(&b.Bx))
                .then_with(|| a.Px.cmp(&b.Px))
                .then_with(|| a.Ppx.cmp(&b.Ppx)),
            (BallotMessage::Confirm(a), BallotMessage::Confirm(b)) => a
                .Hn
                .cmp(&b.Hn)
                .then(a.Pn.cmp(&b.Pn))
                .then(b.Cn.cmp(&a.Cn))
                .then_with(|| a.X.cmp(&b.X)),
            (BallotMessage::Externalize(a), BallotMessage::Externalize(b)) => a
                .Hn
                .cmp(&b.Hn)
                .then(b.Cn.cmp(&a.Cn))
                .then_with(|| a.X.cmp(&b.X)),
            _ => unreachable!("equal type ranks imply equal variants"),
        }
    }
}

impl PartialOrd for BallotMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<BallotMessage> for Message {
    fn from(src: BallotMessage) -> Message {
        match src {
            BallotMessage::Prepare(m) => Message::Prepare(m),
            BallotMessage::Confirm(m) => Message::Confirm(m),
            BallotMessage::Externalize(m) => Message::Externalize(m),
        }
    }
}

impl TryFrom<Message> for BallotMessage {
    type Error = Message;

    /// Fails on nomination messages, handing the input back.
    fn try_from(src: Message) -> Result<BallotMessage, Message> {
        match src {
            Message::Prepare(m) => Ok(BallotMessage::Prepare(m)),
            Message::Confirm(m) => Ok(BallotMessage::Confirm(m)),
            Message::Externalize(m) => Ok(BallotMessage::Externalize(m)),
            other => Err(other),
        }
    }
}

#[cfg(test)]
mod msg_tests {
    use super::*;
    use fc_common::NodeId;

    fn value(s: &str) -> SlotValue {
        SlotValue::new(s.to_string())
    }

    fn slice() -> QuorumSlice {
        QuorumSlice::new(1, vec![NodeId("peer".to_string())])
    }

    fn prepare(bn: u32, bx: &SlotValue, pn: u32, cn: u32, hn: u32) -> BallotMessage {
        BallotMessage::Prepare(PrepareMessage {
            I: 1,
            Bn: bn,
            Bx: bx.clone(),
            Pn: pn,
            Px: if pn > 0 { bx.clone() } else { SlotValue::default() },
            Ppn: 0,
            Ppx: SlotValue::default(),
            Cn: cn,
            Hn: hn,
            D: slice(),
        })
    }

    #[test]
    fn type_priority_orders_phases() {
        let v = value("a");
        let p = prepare(9, &v, 9, 9, 9);
        let c = BallotMessage::Confirm(ConfirmMessage {
            I: 1,
            X: v.clone(),
            Pn: 1,
            Cn: 1,
            Hn: 1,
            D: slice(),
        });
        let e = BallotMessage::Externalize(ExternalizeMessage {
            I: 1,
            X: v,
            Cn: 1,
            Hn: 1,
            D: slice(),
        });
        assert!(p < c);
        assert!(c < e);
        assert!(p < e);
    }

    #[test]
    fn prepare_ordering_follows_progress() {
        let v = value("a");
        // Bumping the ballot counter makes a higher message.
        assert!(prepare(2, &v, 0, 0, 0) > prepare(1, &v, 0, 0, 0));
        // Accepting prepared makes a higher message.
        assert!(prepare(1, &v, 1, 0, 0) > prepare(1, &v, 0, 0, 0));
        // Voting to commit makes a higher message.
        assert!(prepare(1, &v, 1, 1, 1) > prepare(1, &v, 1, 0, 0));
        // A duplicate is equal.
        assert_eq!(prepare(1, &v, 1, 1, 1).cmp(&prepare(1, &v, 1, 1, 1)), Ordering::Equal);
    }

    #[test]
    fn confirm_widening_downward_is_newer() {
        let v = value("a");
        let narrow = BallotMessage::Confirm(ConfirmMessage {
            I: 1,
            X: v.clone(),
            Pn: 3,
            Cn: 3,
            Hn: 5,
            D: slice(),
        });
        let widened = BallotMessage::Confirm(ConfirmMessage {
            I: 1,
            X: v,
            Pn: 3,
            Cn: 2,
            Hn: 5,
            D: slice(),
        });
        assert!(widened > narrow);
    }

    #[test]
    fn prepare_predicates() {
        let v = value("a");
        let w = value("b");
        let m = prepare(5, &v, 3, 2, 4);

        assert!(m.votes_to_prepare(5, &v));
        assert!(m.votes_to_prepare(1, &v));
        assert!(!m.votes_to_prepare(6, &v));
        assert!(!m.votes_to_prepare(1, &w));

        assert!(m.accepts_as_prepared(3, &v));
        assert!(!m.accepts_as_prepared(4, &v));

        assert!(m.votes_to_commit(2, &v));
        assert!(m.votes_to_commit(4, &v));
        assert!(!m.votes_to_commit(5, &v));
        assert!(!m.accepts_as_committed(3, &v));
    }

    #[test]
    fn confirm_and_externalize_predicates() {
        let v = value("a");
        let c = BallotMessage::Confirm(ConfirmMessage {
            I: 1,
            X: v.clone(),
            Pn: 4,
            Cn: 2,
            Hn: 3,
            D: slice(),
        });
        assert!(c.accepts_as_prepared(4, &v));
        assert!(!c.accepts_as_prepared(5, &v));
        assert!(c.accepts_as_committed(2, &v));
        assert!(c.accepts_as_committed(3, &v));
        assert!(!c.accepts_as_committed(4, &v));
        assert!(c.votes_to_commit(9, &v));

        let e = BallotMessage::Externalize(ExternalizeMessage {
            I: 1,
            X: v.clone(),
            Cn: 2,
            Hn: 3,
            D: slice(),
        });
        assert!(e.accepts_as_prepared(100, &v));
        assert!(e.accepts_as_committed(2, &v));
        assert!(e.accepts_as_committed(50, &v));
        assert!(!e.accepts_as_committed(1, &v));
    }

    #[test]
    fn wire_encoding_round_trips_with_type_tag() {
        let v = value("a");
        let m = Message::Prepare(PrepareMessage {
            I: 3,
            Bn: 1,
            Bx: v.clone(),
            Pn: 0,
            Px: SlotValue::default(),
            Ppn: 0,
            Ppx: SlotValue::default(),
            Cn: 0,
            Hn: 0,
            D: slice(),
        });

        let encoded = serde_json::to_string(&m).unwrap();
        assert!(encoded.contains("\"T\":\"Prepare\""));
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, m);

        let n = Message::Nomination(NominationMessage {
            I: 3,
            X: vec![v.clone()],
            Y: vec![],
            D: slice(),
        });
        let encoded = serde_json::to_string(&n).unwrap();
        assert!(encoded.contains("\"T\":\"Nomination\""));
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, n);
    }
}
