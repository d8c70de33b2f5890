// Copyright (c) 2019-2023 The Ferrocoin Foundation

//! Everything a node can receive: the four consensus messages plus client
//! transaction submissions, as one wire enum tagged `T`.

use fc_consensus_scp::{
    ConfirmMessage, ExternalizeMessage, Message, NominationMessage, PrepareMessage, SlotIndex,
};
use fc_currency::TransactionMessage;
use serde::{Deserialize, Serialize};

/// A message addressed to a node.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "T")]
#[allow(missing_docs)]
pub enum NodeMessage {
    Nomination(NominationMessage),
    Prepare(PrepareMessage),
    Confirm(ConfirmMessage),
    Externalize(ExternalizeMessage),
    Transaction(TransactionMessage),
}

impl NodeMessage {
    /// The slot a consensus message is about; transactions have none.
    pub fn slot(&self) -> Option<SlotIndex> {
        match self {
            NodeMessage::Nomination(m) => Some(m.I),
            NodeMessage::Prepare(m) => Some(m.I),
            NodeMessage::Confirm(m) => Some(m.I),
            NodeMessage::Externalize(m) => Some(m.I),
            NodeMessage::Transaction(_) => None,
        }
    }
}

impl From<Message> for NodeMessage {
    fn from(src: Message) -> Self {
        match src {
            Message::Nomination(m) => NodeMessage::Nomination(m),
            Message::Prepare(m) => NodeMessage::Prepare(m),
            Message::Confirm(m) => NodeMessage::Confirm(m),
            Message::Externalize(m) => NodeMessage::Externalize(m),
        }
    }
}

/// Encode a message as one line of JSON (no trailing newline).
pub fn encode_message(message: &NodeMessage) -> String {
    serde_json::to_string(message).expect("message serialization cannot fail")
}

/// Decode a message from its JSON encoding.
pub fn decode_message(encoded: &str) -> Result<NodeMessage, serde_json::Error> {
    serde_json::from_str(encoded)
}
