// Copyright (c) 2019-2023 The Ferrocoin Foundation

//! The Node ID type

use core::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};
use serde::{Deserialize, Serialize};

/// Node unique identifier.
///
/// A node is identified by the hex encoding of its ed25519 public key, so a
/// `NodeId` is both an address for quorum bookkeeping and enough information
/// to verify the node's signatures.
#[derive(Clone, Default, Debug, Eq, Serialize, Deserialize, PartialEq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub String);

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = core::convert::Infallible;

    fn from_str(src: &str) -> Result<NodeId, Self::Err> {
        Ok(Self(src.to_string()))
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(src: &str) -> Self {
        Self(src.to_string())
    }
}
