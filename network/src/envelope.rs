// Copyright (c) 2019-2023 The Ferrocoin Foundation

//! The signed envelope around every wire message.
//!
//! A frame is one line of JSON: `{pubkey, payload, signature}` where
//! `payload` is the encoded message and the signature covers the payload
//! bytes. A blank line is a keepalive and carries nothing.

use crate::message::{decode_message, encode_message, NodeMessage};
use displaydoc::Display;
use fc_common::{
    keys::{verify_signature, KeyPair},
    NodeId,
};
use serde::{Deserialize, Serialize};

/// Problems opening an envelope.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum EnvelopeError {
    /// malformed envelope: {0}
    Malformed(String),

    /// the signature does not verify
    BadSignature,
}

impl std::error::Error for EnvelopeError {}

/// A signed, encoded message.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SignedMessage {
    /// Hex public key of the sender.
    pub pubkey: String,

    /// The encoded message.
    pub payload: String,

    /// Hex signature over the payload bytes.
    pub signature: String,
}

/// Wrap and sign a message.
pub fn seal(keypair: &KeyPair, message: &NodeMessage) -> SignedMessage {
    let payload = encode_message(message);
    let signature = keypair.sign(payload.as_bytes());
    SignedMessage {
        pubkey: keypair.public_key_hex(),
        payload,
        signature,
    }
}

/// Verify and unwrap a message, returning the sender.
pub fn open(signed: &SignedMessage) -> Result<(NodeId, NodeMessage), EnvelopeError> {
    if !verify_signature(
        &signed.pubkey,
        signed.payload.as_bytes(),
        &signed.signature,
    ) {
        return Err(EnvelopeError::BadSignature);
    }
    let message = decode_message(&signed.payload)
        .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
    Ok((NodeId(signed.pubkey.clone()), message))
}

/// Frame an envelope as a newline-terminated line.
pub fn to_line(signed: &SignedMessage) -> String {
    let mut line =
        serde_json::to_string(signed).expect("envelope serialization cannot fail");
    line.push('\n');
    line
}

/// Parse one framed line. Blank lines (keepalives) yield `None`.
pub fn from_line(line: &str) -> Result<Option<SignedMessage>, EnvelopeError> {
    let trimmed = line.trim_end_matches(&['\r', '\n'][..]);
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| EnvelopeError::Malformed(e.to_string()))
}

#[cfg(test)]
mod envelope_tests {
    use super::*;
    use fc_consensus_scp::{NominationMessage, QuorumSlice, SlotValue};

    fn sample() -> NodeMessage {
        NodeMessage::Nomination(NominationMessage {
            I: 1,
            X: vec![SlotValue::new("chunk".to_string())],
            Y: vec![],
            D: QuorumSlice::new(1, vec![KeyPair::from_secret_phrase("peer").node_id()]),
        })
    }

    #[test]
    fn seal_then_open() {
        let kp = KeyPair::from_secret_phrase("sender");
        let message = sample();
        let signed = seal(&kp, &message);

        let (sender, opened) = open(&signed).unwrap();
        assert_eq!(sender, kp.node_id());
        assert_eq!(opened, message);
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let kp = KeyPair::from_secret_phrase("sender");
        let mut signed = seal(&kp, &sample());
        signed.payload = signed.payload.replace("chunk", "chonk");
        assert_eq!(open(&signed), Err(EnvelopeError::BadSignature));
    }

    #[test]
    fn line_framing_round_trips() {
        let kp = KeyPair::from_secret_phrase("sender");
        let signed = seal(&kp, &sample());
        let line = to_line(&signed);
        assert!(line.ends_with('\n'));

        let parsed = from_line(&line).unwrap().unwrap();
        assert_eq!(parsed, signed);
    }

    #[test]
    fn blank_lines_are_keepalives() {
        assert_eq!(from_line("\n").unwrap(), None);
        assert_eq!(from_line("\r\n").unwrap(), None);
        assert!(from_line("junk\n").is_err());
    }
}
