// Copyright (c) 2019-2023 The Ferrocoin Foundation

//! The network layer: the `Node` that ties consensus to the transaction
//! queue and storage, the signed line-oriented wire codec, and the basic
//! two-way connection.

#![deny(missing_docs)]

pub mod connection;
pub mod envelope;
pub mod message;
pub mod node;

pub use connection::BasicConnection;
pub use envelope::{open, seal, EnvelopeError, SignedMessage};
pub use message::{decode_message, encode_message, NodeMessage};
pub use node::Node;
