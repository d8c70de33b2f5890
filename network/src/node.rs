// Copyright (c) 2019-2023 The Ferrocoin Foundation

//! A node ties the consensus driver to the transaction queue and storage.

use crate::message::NodeMessage;
use fc_common::{
    logger::{log, Logger},
    NodeId,
};
use fc_consensus_scp::{
    BallotMessage, ExternalizeMessage, ExternalizedSlot, QuorumSlice, SlotDriver, SlotIndex,
    SlotValue,
};
use fc_currency::{Account, TransactionQueue};
use fc_ledger_db::{Block, Database, Error as DbError};
use std::sync::{Arc, Mutex};

/// A node participating in federated voting.
///
/// All calls on a node execute serially; the dispatch thread holds the node
/// for the duration of `handle`. Incoming messages have already had their
/// envelope signature checked by the connection layer.
pub struct Node {
    node_id: NodeId,
    driver: SlotDriver,
    queue: Arc<Mutex<TransactionQueue>>,
    database: Option<Database>,
    logger: Logger,
}

impl Node {
    /// Create a node. With a database, the node replays the persisted
    /// blocks before participating, recovering the account state and slot
    /// position of the node that wrote them.
    pub fn new(
        node_id: NodeId,
        quorum_slice: QuorumSlice,
        database: Option<Database>,
        logger: Logger,
    ) -> Self {
        Self::build(node_id, quorum_slice, database, None, logger)
    }

    /// Create a node whose genesis state has `amount` at the mint key.
    /// Genesis is applied before any block replay, so replayed spends from
    /// the mint reconstruct the same balances on every node.
    pub fn new_with_mint(
        node_id: NodeId,
        quorum_slice: QuorumSlice,
        database: Option<Database>,
        mint: &str,
        amount: u64,
        logger: Logger,
    ) -> Self {
        Self::build(
            node_id,
            quorum_slice,
            database,
            Some((mint, amount)),
            logger,
        )
    }

    fn build(
        node_id: NodeId,
        quorum_slice: QuorumSlice,
        database: Option<Database>,
        genesis: Option<(&str, u64)>,
        logger: Logger,
    ) -> Self {
        let queue = Arc::new(Mutex::new(TransactionQueue::new(
            node_id.clone(),
            logger.clone(),
        )));
        if let Some((mint, amount)) = genesis {
            queue
                .lock()
                .expect("queue lock failed")
                .set_balance(mint, amount);
        }

        let proposal_queue = Arc::clone(&queue);
        let proposal_fn = Arc::new(move || {
            let chunk = proposal_queue
                .lock()
                .expect("queue lock failed")
                .suggest_chunk();
            SlotValue::new(chunk.encode())
        });

        let mut driver = SlotDriver::new(
            node_id.clone(),
            quorum_slice,
            proposal_fn,
            logger.clone(),
        );

        if let Some(db) = &database {
            let replay_queue = Arc::clone(&queue);
            let replay_driver = &mut driver;
            let replay_logger = logger.clone();
            let replayed = db.for_blocks(|block| {
                let value: SlotValue = serde_json::from_str(&block.chunk)
                    .unwrap_or_else(|e| {
                        log::crit!(replay_logger, "unreadable chunk for slot {}: {}", block.slot, e);
                        panic!("unreadable chunk for slot {}", block.slot);
                    });
                replay_queue
                    .lock()
                    .expect("queue lock failed")
                    .finalize_parts(value.chunks());
                replay_driver.catch_up(block.slot, value, block.c, block.h);
            });
            if replayed > 0 {
                log::info!(logger, "recovered {} blocks from storage", replayed);
            }
        }

        Self {
            node_id,
            driver,
            queue,
            database,
            logger,
        }
    }

    /// Our node id.
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// The next un-externalized slot number.
    pub fn slot(&self) -> SlotIndex {
        self.driver.slot()
    }

    /// The largest balance held by any account.
    pub fn max_balance(&self) -> u64 {
        self.queue.lock().expect("queue lock failed").max_balance()
    }

    /// An account's state, if known. Read-only inspection for tests and
    /// client queries.
    pub fn account(&self, key: &str) -> Option<Account> {
        self.queue.lock().expect("queue lock failed").account(key)
    }

    /// Set an account balance directly (genesis/test setup).
    pub fn set_balance(&mut self, key: &str, balance: u64) {
        self.queue
            .lock()
            .expect("queue lock failed")
            .set_balance(key, balance);
    }

    /// Our broadcast for the current slot.
    pub fn outgoing_messages(&mut self) -> Vec<NodeMessage> {
        self.driver
            .outgoing_messages()
            .into_iter()
            .map(NodeMessage::from)
            .collect()
    }

    /// Handle one message from `sender`. The return value is the reply
    /// addressed back to the sender, if the message calls for one; `None`
    /// means there is nothing the sender doesn't already know.
    pub fn handle(&mut self, sender: &NodeId, message: &NodeMessage) -> Option<NodeMessage> {
        if *sender == self.node_id {
            log::error!(self.logger, "received a message from ourselves");
            return None;
        }

        match message {
            NodeMessage::Transaction(m) => {
                let added = self
                    .queue
                    .lock()
                    .expect("queue lock failed")
                    .add_operations(&m.Ops);
                log::debug!(self.logger, "queued {} operations from {}", added, sender);
                None
            }
            _ => self.handle_consensus(sender, message),
        }
    }

    fn handle_consensus(
        &mut self,
        sender: &NodeId,
        message: &NodeMessage,
    ) -> Option<NodeMessage> {
        let slot = message.slot().expect("consensus messages carry a slot");
        let current = self.driver.slot();

        if slot < current {
            return self.handle_old_slot(sender, slot, message);
        }

        if slot > current {
            // We are behind. Only a decided slot can help us forward;
            // anything else will be re-sent once we catch up.
            if let NodeMessage::Externalize(m) = message {
                let record = self.driver.catch_up(m.I, m.X.clone(), m.Cn, m.Hn);
                if let Some(record) = record {
                    self.persist(&record);
                }
            } else {
                log::debug!(
                    self.logger,
                    "dropping slot {} message while on slot {}",
                    slot,
                    current,
                );
            }
            return None;
        }

        match message {
            NodeMessage::Nomination(m) => {
                self.driver.handle_nomination(sender, m);
                None
            }
            NodeMessage::Prepare(m) => {
                let record = self
                    .driver
                    .handle_ballot(sender, &BallotMessage::Prepare(m.clone()));
                if let Some(record) = record {
                    self.persist(&record);
                }
                None
            }
            NodeMessage::Confirm(m) => {
                let record = self
                    .driver
                    .handle_ballot(sender, &BallotMessage::Confirm(m.clone()));
                if let Some(record) = record {
                    self.persist(&record);
                }
                None
            }
            NodeMessage::Externalize(m) => {
                // Try the protocol first; if that doesn't settle the slot,
                // the sender is showing us decided history and we adopt it.
                let mut record = self
                    .driver
                    .handle_ballot(sender, &BallotMessage::Externalize(m.clone()));
                if record.is_none() {
                    record = self.driver.catch_up(m.I, m.X.clone(), m.Cn, m.Hn);
                }
                if let Some(record) = record {
                    self.persist(&record);
                }
                None
            }
            NodeMessage::Transaction(_) => unreachable!("routed in handle"),
        }
    }

    // A message about a slot that is already decided here. Answer with our
    // record of it, unless the sender already has it.
    fn handle_old_slot(
        &mut self,
        sender: &NodeId,
        slot: SlotIndex,
        message: &NodeMessage,
    ) -> Option<NodeMessage> {
        let record = self.driver.externalized(slot)?;

        if let NodeMessage::Externalize(m) = message {
            if m.X != record.value {
                // A conflicting decision means broken quorum intersection
                // or a Byzantine peer. Nothing safe to do but shout.
                log::error!(
                    self.logger,
                    "node {} externalized {} for slot {}, we have {}",
                    sender,
                    m.X,
                    slot,
                    record.value,
                );
            }
            return None;
        }

        Some(NodeMessage::Externalize(ExternalizeMessage {
            I: slot,
            X: record.value.clone(),
            Cn: record.CN,
            Hn: record.HN,
            D: self.driver.quorum_slice().clone(),
        }))
    }

    // A slot was decided: apply its chunks to the accounts and persist it.
    fn persist(&mut self, record: &ExternalizedSlot) {
        self.queue
            .lock()
            .expect("queue lock failed")
            .finalize_parts(record.value.chunks());

        if let Some(db) = &self.database {
            let block = Block {
                slot: record.slot,
                chunk: record.value.canonical_json(),
                c: record.CN,
                h: record.HN,
            };
            match db.insert_block(&block) {
                Ok(()) => {}
                Err(DbError::BlockAlreadyExists(slot)) => {
                    // An idempotent replay; the block is already durable.
                    log::debug!(self.logger, "block {} was already saved", slot);
                }
                Err(e) => {
                    log::warn!(self.logger, "unexpected storage error: {}", e);
                }
            }
        }
    }
}
