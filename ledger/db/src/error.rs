// Copyright (c) 2019-2023 The Ferrocoin Foundation

use displaydoc::Display;

/// A storage error kind.
///
/// Uniqueness violations are recoverable and tell the caller the row was
/// already saved; anything structurally wrong with the store itself panics
/// instead, because a node must not run on broken storage.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum Error {
    /// a block for slot {0} already exists
    BlockAlreadyExists(u64),

    /// a document with id {0} already exists
    DocumentAlreadyExists(u64),
}

impl std::error::Error for Error {}
