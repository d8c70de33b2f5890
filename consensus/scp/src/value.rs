// Copyright (c) 2019-2023 The Ferrocoin Foundation

//! The value on which to consense.

use fc_common::fast_hash;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};

/// A proposed payload for one slot.
///
/// A slot value is a set of canonically-encoded transaction chunks; the
/// consensus core treats the chunk encodings as opaque strings. Keeping the
/// chunks in an ordered set makes `combine` a plain set union, which is
/// deterministic, commutative, associative and idempotent, and makes the
/// canonical encoding independent of nomination order.
#[derive(
    Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SlotValue {
    chunks: BTreeSet<String>,
}

impl SlotValue {
    /// A slot value carrying a single encoded chunk.
    pub fn new(encoded_chunk: String) -> Self {
        let mut chunks = BTreeSet::new();
        chunks.insert(encoded_chunk);
        Self { chunks }
    }

    /// Merge two slot values. `combine(a, b) == combine(b, a)`.
    pub fn combine(a: &SlotValue, b: &SlotValue) -> SlotValue {
        SlotValue {
            chunks: a.chunks.union(&b.chunks).cloned().collect(),
        }
    }

    /// Merge a non-empty slice of slot values.
    ///
    /// Calling this with no values is a programming error.
    pub fn combine_slice(values: &[SlotValue]) -> SlotValue {
        assert!(
            !values.is_empty(),
            "combine_slice called with no slot values"
        );
        let mut combined = values[0].clone();
        for value in &values[1..] {
            combined = Self::combine(&combined, value);
        }
        combined
    }

    /// The encoded chunks carried by this value, in canonical order.
    pub fn chunks(&self) -> impl Iterator<Item = &str> {
        self.chunks.iter().map(|c| c.as_str())
    }

    /// Number of chunks carried by this value.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether this is the zero value (no chunks). The zero value is only
    /// valid on the wire, standing in for an absent ballot.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The canonical representation: the JSON encoding of the sorted chunk
    /// set. Equal values always produce identical canonical strings.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).expect("slot value serialization cannot fail")
    }
}

// Large values are unreadable in logs; show a count and a short hash instead.
impl fmt::Display for SlotValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let digest = fast_hash(self.canonical_json().as_bytes());
        write!(f, "[{} chunks:{}]", self.chunks.len(), hex::encode(&digest[..4]))
    }
}

#[cfg(test)]
mod value_tests {
    use super::*;

    #[test]
    fn combine_is_commutative_and_idempotent() {
        let a = SlotValue::new("alpha".to_string());
        let b = SlotValue::new("beta".to_string());

        let ab = SlotValue::combine(&a, &b);
        let ba = SlotValue::combine(&b, &a);
        assert_eq!(ab, ba);
        assert_eq!(SlotValue::combine(&ab, &a), ab);
        assert_eq!(ab.len(), 2);
    }

    #[test]
    fn combine_is_associative() {
        let a = SlotValue::new("alpha".to_string());
        let b = SlotValue::new("beta".to_string());
        let c = SlotValue::new("gamma".to_string());

        let left = SlotValue::combine(&SlotValue::combine(&a, &b), &c);
        let right = SlotValue::combine(&a, &SlotValue::combine(&b, &c));
        assert_eq!(left, right);
    }

    #[test]
    fn combine_slice_of_one_is_identity() {
        let a = SlotValue::new("alpha".to_string());
        assert_eq!(SlotValue::combine_slice(&[a.clone()]), a);
    }

    #[test]
    #[should_panic(expected = "no slot values")]
    fn combine_slice_of_none_panics() {
        let _ = SlotValue::combine_slice(&[]);
    }

    #[test]
    fn canonical_json_round_trips() {
        let a = SlotValue::combine(
            &SlotValue::new("alpha".to_string()),
            &SlotValue::new("beta".to_string()),
        );
        let decoded: SlotValue = serde_json::from_str(&a.canonical_json()).unwrap();
        assert_eq!(decoded, a);
    }
}
