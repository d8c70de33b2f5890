// Copyright (c) 2019-2023 The Ferrocoin Foundation

//! Operations are the things that go on the blockchain. Logically the chain
//! is a sequence of operations; everything else stored alongside them is for
//! efficiency.

use displaydoc::Display;
use fc_common::keys::{verify_signature, KeyPair};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Problems decoding an operation.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum OperationError {
    /// malformed operation: {0}
    Malformed(String),
}

impl std::error::Error for OperationError {}

/// Send some amount from the signer to another account.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct SendOperation {
    /// The public key of the sender, who signs the operation.
    pub Signer: String,

    /// The sequence number of this operation for the signer. Sequence
    /// numbers start at 1 and leave no gaps; they prevent replay.
    pub Sequence: u32,

    /// The public key of the recipient.
    pub To: String,

    /// How much to send.
    pub Amount: u64,

    /// How much the signer pays to prioritize this operation. Fees are
    /// burned.
    pub Fee: u64,
}

/// Every kind of operation the chain understands.
///
/// Encoded adjacently tagged, `{"T": "Send", "O": {...}}`, so the wire form
/// names the operation type. Adding a kind means adding a variant here; the
/// compiler finds every match that needs extending.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(tag = "T", content = "O")]
pub enum Operation {
    /// A transfer between accounts.
    Send(SendOperation),
}

impl Operation {
    /// A unique short string naming the operation type.
    pub fn operation_type(&self) -> &'static str {
        match self {
            Operation::Send(_) => "Send",
        }
    }

    /// The public key of the user who must sign this operation.
    pub fn signer(&self) -> &str {
        match self {
            Operation::Send(op) => &op.Signer,
        }
    }

    /// The number in sequence that this operation is for the signer.
    pub fn sequence(&self) -> u32 {
        match self {
            Operation::Send(op) => op.Sequence,
        }
    }

    /// How much the signer is willing to pay to prioritize this operation.
    pub fn fee(&self) -> u64 {
        match self {
            Operation::Send(op) => op.Fee,
        }
    }

    /// Internal validity, independent of chain state.
    pub fn verify(&self) -> bool {
        match self {
            Operation::Send(op) => {
                op.Sequence > 0 && op.Amount > 0 && !op.To.is_empty() && !op.Signer.is_empty()
            }
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operation::Send(op) => write!(
                f,
                "send {} from {}#{} to {}",
                op.Amount,
                &op.Signer[..8.min(op.Signer.len())],
                op.Sequence,
                &op.To[..8.min(op.To.len())],
            ),
        }
    }
}

/// Encode an operation, type tag included.
pub fn encode_operation(op: &Operation) -> String {
    serde_json::to_string(op).expect("operation serialization cannot fail")
}

/// Decode an operation. Unknown type tags and garbage both fail.
pub fn decode_operation(encoded: &str) -> Result<Operation, OperationError> {
    serde_json::from_str(encoded).map_err(|e| OperationError::Malformed(e.to_string()))
}

/// An operation plus the signer's signature over its canonical encoding.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct SignedOperation {
    /// The operation itself.
    pub Operation: Operation,

    /// Hex ed25519 signature by `Operation.signer()`.
    pub Signature: String,
}

impl SignedOperation {
    /// Sign an operation. The caller is responsible for the keypair actually
    /// matching the operation's signer.
    pub fn sign(operation: Operation, keypair: &KeyPair) -> Self {
        let signature = keypair.sign(encode_operation(&operation).as_bytes());
        Self {
            Operation: operation,
            Signature: signature,
        }
    }

    /// Check the signature and the operation's internal validity.
    pub fn verify(&self) -> bool {
        self.Operation.verify()
            && verify_signature(
                self.Operation.signer(),
                encode_operation(&self.Operation).as_bytes(),
                &self.Signature,
            )
    }
}

#[cfg(test)]
mod operation_tests {
    use super::*;

    fn send_op(keypair: &KeyPair, seq: u32) -> SendOperation {
        SendOperation {
            Signer: keypair.public_key_hex(),
            Sequence: seq,
            To: KeyPair::from_secret_phrase("bob").public_key_hex(),
            Amount: 5,
            Fee: 0,
        }
    }

    #[test]
    fn operation_encoding_round_trips() {
        let kp = KeyPair::from_secret_phrase("client");
        let op = Operation::Send(send_op(&kp, 5));
        let encoded = encode_operation(&op);
        assert!(encoded.contains("\"T\":\"Send\""));

        let decoded = decode_operation(&encoded).unwrap();
        assert_eq!(decoded, op);
    }

    #[test]
    fn decoding_invalid_operation_fails() {
        assert!(decode_operation("{\"T\":\"Send\",\"O\":null}").is_err());
        assert!(decode_operation("{\"T\":\"Blorp\",\"O\":{}}").is_err());
        assert!(decode_operation("not json").is_err());
    }

    #[test]
    fn signed_operation_verifies() {
        let kp = KeyPair::from_secret_phrase("client");
        let signed = SignedOperation::sign(Operation::Send(send_op(&kp, 1)), &kp);
        assert!(signed.verify());

        // Signed by the wrong key.
        let wrong = KeyPair::from_secret_phrase("mallory");
        let forged = SignedOperation::sign(Operation::Send(send_op(&kp, 1)), &wrong);
        assert!(!forged.verify());

        // Tampered after signing.
        let mut tampered = signed;
        if let Operation::Send(op) = &mut tampered.Operation {
            op.Amount = 500;
        }
        assert!(!tampered.verify());
    }

    #[test]
    fn internal_validity_checks() {
        let kp = KeyPair::from_secret_phrase("client");
        let mut op = send_op(&kp, 1);
        op.Amount = 0;
        assert!(!Operation::Send(op.clone()).verify());
        op.Amount = 1;
        op.Sequence = 0;
        assert!(!Operation::Send(op).verify());
    }
}
