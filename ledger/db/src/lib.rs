// Copyright (c) 2019-2023 The Ferrocoin Foundation

//! Durable storage for the node: the block table written on slot
//! externalization, and a document table queryable by JSON containment.
//!
//! A `Database` is a handle to a shared store; cloning a handle behaves like
//! opening another connection to the same database, which is how a restarted
//! node recovers the state its predecessor persisted. Within a node the
//! handle is used serially by the dispatch thread.

#![deny(missing_docs)]

mod error;

pub use error::Error;

use fc_common::logger::{log, Logger};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex},
};

/// One externalized slot, as persisted.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// The slot index. Unique across the table.
    pub slot: u64,

    /// The canonical representation of the externalized slot value.
    pub chunk: String,

    /// Low end of the confirmed-commit counter range.
    pub c: u32,

    /// High end of the confirmed-commit counter range.
    pub h: u32,
}

/// An application document: a JSON object with a unique id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique document id. Also stored inside `data`, so containment
    /// queries can match on it.
    pub id: u64,

    /// The document body.
    pub data: Value,
}

impl Document {
    /// Build a document, injecting `id` into the body the way the table
    /// stores it.
    pub fn new(id: u64, data: Value) -> Self {
        let mut data = data;
        if let Value::Object(map) = &mut data {
            map.insert("id".to_string(), Value::from(id));
        }
        Self { id, data }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            serde_json::to_string_pretty(self).map_err(|_| fmt::Error)?
        )
    }
}

#[derive(Default)]
struct Store {
    blocks: BTreeMap<u64, Block>,
    documents: BTreeMap<u64, Document>,
}

lazy_static! {
    // Named test databases, so independent handles with the same name share
    // a store the way connections to one Postgres database would.
    static ref TEST_STORES: Mutex<BTreeMap<String, Arc<Mutex<Store>>>> =
        Mutex::new(BTreeMap::new());
}

/// A handle to a database.
#[derive(Clone)]
pub struct Database {
    name: String,
    store: Arc<Mutex<Store>>,
    logger: Logger,
}

impl Database {
    /// A fresh, private database.
    pub fn new(name: &str, logger: Logger) -> Self {
        log::debug!(logger, "initializing database {}", name);
        Self {
            name: name.to_string(),
            store: Arc::new(Mutex::new(Store::default())),
            logger,
        }
    }

    /// A handle to the shared test database `i`. Handles with the same
    /// index see the same data.
    pub fn new_test(i: usize, logger: Logger) -> Self {
        let name = format!("test{i}");
        let store = TEST_STORES
            .lock()
            .expect("test store registry poisoned")
            .entry(name.clone())
            .or_default()
            .clone();
        Self {
            name,
            store,
            logger,
        }
    }

    /// Clear the shared test database `i`.
    pub fn drop_test_data(i: usize) {
        let name = format!("test{i}");
        if let Some(store) = TEST_STORES
            .lock()
            .expect("test store registry poisoned")
            .get(&name)
        {
            *store.lock().expect("test store poisoned") = Store::default();
        }
    }

    /// The database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().expect("database store poisoned")
    }

    /// Insert a block. Fails with `Error::BlockAlreadyExists` if this slot
    /// was already saved; the caller may treat that as a completed write.
    pub fn insert_block(&self, block: &Block) -> Result<(), Error> {
        let mut store = self.lock();
        if store.blocks.contains_key(&block.slot) {
            return Err(Error::BlockAlreadyExists(block.slot));
        }
        store.blocks.insert(block.slot, block.clone());
        Ok(())
    }

    /// The block for a slot, if any.
    pub fn get_block(&self, slot: u64) -> Option<Block> {
        self.lock().blocks.get(&slot).cloned()
    }

    /// The block with the highest slot, if any.
    pub fn last_block(&self) -> Option<Block> {
        self.lock().blocks.values().next_back().cloned()
    }

    /// Call `f` on each block, from lowest to highest slot, and return how
    /// many blocks there were. A gap in the slot sequence means the store
    /// is corrupt, which is fatal.
    pub fn for_blocks(&self, mut f: impl FnMut(&Block)) -> u64 {
        let store = self.lock();
        let mut slot = 0;
        for block in store.blocks.values() {
            if block.slot != slot + 1 {
                log::crit!(self.logger, "missing block with slot {}", slot + 1);
                panic!("missing block with slot {}", slot + 1);
            }
            slot = block.slot;
            f(block);
        }
        slot
    }

    /// Insert a document. Fails with `Error::DocumentAlreadyExists` if the
    /// id is taken.
    pub fn insert_document(&self, document: &Document) -> Result<(), Error> {
        let mut store = self.lock();
        if store.documents.contains_key(&document.id) {
            return Err(Error::DocumentAlreadyExists(document.id));
        }
        store.documents.insert(document.id, document.clone());
        Ok(())
    }

    /// The documents whose data contains `filter`, up to `limit` of them, in
    /// id order.
    pub fn get_documents(&self, filter: &Value, limit: usize) -> Vec<Document> {
        self.lock()
            .documents
            .values()
            .filter(|d| json_contains(&d.data, filter))
            .take(limit)
            .cloned()
            .collect()
    }
}

/// JSON containment: whether `doc` contains `filter`.
///
/// Objects contain a filter object when every filter key is present with a
/// containing value; arrays contain a filter array when every filter element
/// is contained by some document element; scalars must be equal.
fn json_contains(doc: &Value, filter: &Value) -> bool {
    match (doc, filter) {
        (Value::Object(doc_map), Value::Object(filter_map)) => filter_map
            .iter()
            .all(|(key, want)| doc_map.get(key).is_some_and(|have| json_contains(have, want))),
        (Value::Array(doc_items), Value::Array(filter_items)) => filter_items
            .iter()
            .all(|want| doc_items.iter().any(|have| json_contains(have, want))),
        (have, want) => have == want,
    }
}
