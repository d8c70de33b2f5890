// Copyright (c) 2019-2023 The Ferrocoin Foundation

use serde::{Deserialize, Serialize};

/// The state of one account: how many operations its owner has committed to
/// the chain, and what it holds.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// The sequence number of the last applied operation signed by this
    /// account. The next valid operation carries `Sequence + 1`.
    pub Sequence: u32,

    /// Current balance.
    pub Balance: u64,
}
