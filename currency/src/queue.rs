// Copyright (c) 2019-2023 The Ferrocoin Foundation

//! The transaction queue: pending operations waiting for a slot.

use crate::{
    account::Account,
    chunk::Chunk,
    operation::SignedOperation,
};
use fc_common::{
    logger::{log, Logger},
    NodeId,
};
use std::{
    collections::BTreeMap,
    time::{SystemTime, UNIX_EPOCH},
};

/// Pending operations and the account state derived from externalized
/// chunks.
///
/// Account state is a pure function of the sequence of finalized chunks:
/// operations are deduplicated by `(signer, sequence)` and applied in
/// canonical order, so every node that finalizes the same slots holds
/// identical accounts.
pub struct TransactionQueue {
    /// Who we are; stamped into the chunks we propose.
    node_id: NodeId,

    /// Account state after every chunk finalized so far.
    accounts: BTreeMap<String, Account>,

    /// Pending operations, keyed by `(signer, sequence)`.
    pending: BTreeMap<(String, u32), SignedOperation>,

    logger: Logger,
}

impl TransactionQueue {
    /// Create an empty queue.
    pub fn new(node_id: NodeId, logger: Logger) -> Self {
        Self {
            node_id,
            accounts: BTreeMap::new(),
            pending: BTreeMap::new(),
            logger,
        }
    }

    /// Set an account's balance directly. This is how genesis money enters
    /// the system; it never appears in a chunk.
    pub fn set_balance(&mut self, key: &str, balance: u64) {
        self.accounts.entry(key.to_string()).or_default().Balance = balance;
    }

    /// An account's current balance, zero if unknown.
    pub fn balance(&self, key: &str) -> u64 {
        self.accounts.get(key).map_or(0, |a| a.Balance)
    }

    /// An account's full state, if known.
    pub fn account(&self, key: &str) -> Option<Account> {
        self.accounts.get(key).copied()
    }

    /// The largest balance held by any account.
    pub fn max_balance(&self) -> u64 {
        self.accounts.values().map(|a| a.Balance).max().unwrap_or(0)
    }

    /// Take client-submitted operations into the pending set. Operations
    /// with bad signatures or stale sequence numbers are dropped. Returns
    /// how many were newly queued.
    pub fn add_operations(&mut self, ops: &[SignedOperation]) -> usize {
        let mut added = 0;
        for op in ops {
            if !op.verify() {
                log::warn!(
                    self.logger,
                    "dropping operation with a bad signature: {}",
                    op.Operation,
                );
                continue;
            }
            let signer = op.Operation.signer().to_string();
            let sequence = op.Operation.sequence();
            if sequence <= self.accounts.get(&signer).map_or(0, |a| a.Sequence) {
                // Already applied; a replay or a late duplicate.
                continue;
            }
            let key = (signer, sequence);
            if self.pending.contains_key(&key) {
                continue;
            }
            log::debug!(self.logger, "queueing {}", op.Operation);
            self.pending.insert(key, op.clone());
            added += 1;
        }
        added
    }

    /// Build the chunk we would propose right now: for each account, the run
    /// of pending operations that is valid against current balances. Credits
    /// from other pending operations are not counted; an operation that only
    /// becomes payable later stays pending for a future slot.
    pub fn suggest_chunk(&self) -> Chunk {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_micros());
        let mut chunk = Chunk::empty(format!("this is {} at {}", self.node_id, timestamp));

        // (next sequence, spendable balance) per account, advanced as we
        // tentatively include that account's operations.
        let mut tentative: BTreeMap<String, (u32, u64)> = BTreeMap::new();

        for ((signer, sequence), op) in &self.pending {
            let entry = tentative.entry(signer.clone()).or_insert_with(|| {
                let account = self.accounts.get(signer).copied().unwrap_or_default();
                (account.Sequence + 1, account.Balance)
            });
            let (next_sequence, balance) = *entry;
            let cost = self.operation_cost(op);
            if *sequence == next_sequence && balance >= cost {
                *entry = (next_sequence + 1, balance - cost);
                chunk.Ops.push(op.clone());
            }
        }

        chunk
    }

    fn operation_cost(&self, op: &SignedOperation) -> u64 {
        match &op.Operation {
            crate::operation::Operation::Send(send) => send.Amount.saturating_add(send.Fee),
        }
    }

    /// Apply an externalized slot value, given as its encoded chunk parts.
    ///
    /// Operations from all parts are deduplicated by `(signer, sequence)`
    /// and applied in canonical order. An operation applies iff its sequence
    /// is the account's next and the balance covers amount plus fee;
    /// anything else is skipped. Fees are burned. Applied and superseded
    /// pending operations are pruned.
    pub fn finalize_parts<'a>(&mut self, parts: impl IntoIterator<Item = &'a str>) {
        let mut ops: BTreeMap<(String, u32), SignedOperation> = BTreeMap::new();
        for part in parts {
            let chunk = match Chunk::decode(part) {
                Ok(chunk) => chunk,
                Err(e) => {
                    log::warn!(self.logger, "undecodable chunk in slot value: {}", e);
                    continue;
                }
            };
            for op in chunk.Ops {
                let key = (op.Operation.signer().to_string(), op.Operation.sequence());
                // Conflicting operations with the same key pick one winner
                // deterministically: highest fee, then encoding order.
                ops.entry(key)
                    .and_modify(|existing| {
                        let better =
                            (op.Operation.fee(), &op) > (existing.Operation.fee(), &*existing);
                        if better {
                            *existing = op.clone();
                        }
                    })
                    .or_insert(op);
            }
        }

        for ((signer, sequence), op) in ops {
            if !op.verify() {
                log::warn!(self.logger, "unverifiable operation in chunk: {}", op.Operation);
                continue;
            }
            let cost = self.operation_cost(&op);
            let account = self.accounts.entry(signer.clone()).or_default();
            if sequence != account.Sequence + 1 || account.Balance < cost {
                log::debug!(self.logger, "skipping inapplicable {}", op.Operation);
                continue;
            }
            account.Sequence = sequence;
            account.Balance -= cost;

            match &op.Operation {
                crate::operation::Operation::Send(send) => {
                    let to = self.accounts.entry(send.To.clone()).or_default();
                    to.Balance += send.Amount;
                }
            }
            log::debug!(self.logger, "applied {}", op.Operation);
        }

        // Anything at or below an account's sequence is settled history.
        let accounts = &self.accounts;
        self.pending
            .retain(|(signer, sequence), _| {
                *sequence > accounts.get(signer).map_or(0, |a| a.Sequence)
            });
    }
}
