// Copyright (c) 2019-2023 The Ferrocoin Foundation

//! Common types and methods shared by every Ferrocoin crate.

#![deny(missing_docs)]
#![warn(unused_extern_crates)]

use sha3::{Digest, Sha3_256};

mod node_id;

pub mod keys;
pub mod logger;

pub use node_id::NodeId;

/// A HashMap with hashbrown's default hasher.
pub type HashMap<K, V> = hashbrown::HashMap<K, V>;

/// A HashSet with hashbrown's default hasher.
pub type HashSet<K> = hashbrown::HashSet<K>;

/// Hash type
pub type Hash = [u8; 32];

/// A quick hash for logging and for deriving test identities.
///
/// Don't use this where the choice of hash function is security-relevant
/// without checking that Sha3-256 is what you want.
pub fn fast_hash(data: &[u8]) -> Hash {
    Sha3_256::digest(data).into()
}
