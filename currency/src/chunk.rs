// Copyright (c) 2019-2023 The Ferrocoin Foundation

//! Chunks are the batches of operations that consensus agrees on.

use crate::operation::{OperationError, SignedOperation};
use serde::{Deserialize, Serialize};

/// A batch of operations proposed for a slot, plus a provenance note naming
/// the proposing node and moment. The note keeps otherwise-identical
/// proposals from different nodes distinct, so merging them is harmless.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Chunk {
    /// Who proposed this chunk and when.
    pub Note: String,

    /// The operations, in canonical order.
    pub Ops: Vec<SignedOperation>,
}

impl Chunk {
    /// A chunk with no operations.
    pub fn empty(note: String) -> Self {
        Self {
            Note: note,
            Ops: Vec::new(),
        }
    }

    /// The canonical encoding carried inside a slot value.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("chunk serialization cannot fail")
    }

    /// Decode a chunk from a slot value part.
    pub fn decode(encoded: &str) -> Result<Chunk, OperationError> {
        serde_json::from_str(encoded).map_err(|e| OperationError::Malformed(e.to_string()))
    }
}

/// A client's submission of operations to a node.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TransactionMessage {
    /// The submitted operations.
    pub Ops: Vec<SignedOperation>,
}
