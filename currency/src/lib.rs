// Copyright (c) 2019-2023 The Ferrocoin Foundation

//! The currency layer: operations signed by users, the accounts they act on,
//! and the transaction queue that batches pending operations into chunks for
//! consensus to agree on.

#![allow(non_snake_case)]
#![deny(missing_docs)]

mod account;
mod chunk;
mod operation;
mod queue;

pub use account::Account;
pub use chunk::{Chunk, TransactionMessage};
pub use operation::{
    decode_operation, encode_operation, Operation, OperationError, SendOperation,
    SignedOperation,
};
pub use queue::TransactionQueue;
