//! In-memory key/value and pending-queue store.
//!
//! Values are held as postcard blobs keyed by name, the same shape a
//! flash-backed store would use, so swapping in a durable implementation
//! changes no call sites. Used directly in tests and by the replay tool.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::app::ports::{ConfigStore, PendingKind, PendingRow, PendingStore, StoreError};

/// Rows the pending queue will hold before rejecting inserts.
const MAX_PENDING_ROWS: usize = 1024;

#[derive(Default)]
pub struct MemStore {
    values: HashMap<String, Vec<u8>>,
    pending: BTreeMap<u64, (PendingKind, Vec<u8>)>,
    next_row_id: u64,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            pending: BTreeMap::new(),
            next_row_id: 1,
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn get_value<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let blob = self.values.get(key)?;
        postcard::from_bytes(blob).ok()
    }

    fn put_value<T: Serialize>(&mut self, key: &str, value: &T) {
        match postcard::to_allocvec(value) {
            Ok(blob) => {
                self.values.insert(key.to_owned(), blob);
            }
            Err(err) => log::error!("cannot encode value for key '{key}': {err}"),
        }
    }
}

impl ConfigStore for MemStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.get_value(key)
    }

    fn put_string(&mut self, key: &str, value: &str) {
        self.put_value(key, &value.to_owned());
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get_value(key)
    }

    fn put_bool(&mut self, key: &str, value: bool) {
        self.put_value(key, &value);
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        self.get_value(key)
    }

    fn put_i64(&mut self, key: &str, value: i64) {
        self.put_value(key, &value);
    }

    fn get_string_set(&self, key: &str) -> BTreeSet<String> {
        self.get_value(key).unwrap_or_default()
    }

    fn put_string_set(&mut self, key: &str, value: &BTreeSet<String>) {
        self.put_value(key, value);
    }
}

impl PendingStore for MemStore {
    fn insert(&mut self, kind: PendingKind, record: &[u8]) -> Result<(), StoreError> {
        if self.pending.len() >= MAX_PENDING_ROWS {
            return Err(StoreError::Full);
        }
        let row_id = self.next_row_id;
        self.next_row_id += 1;
        self.pending.insert(row_id, (kind, record.to_vec()));
        Ok(())
    }

    fn head(&self) -> Result<Option<PendingRow>, StoreError> {
        Ok(self.pending.iter().next().map(|(&row_id, (kind, record))| {
            PendingRow {
                row_id,
                kind: *kind,
                record: record.clone(),
            }
        }))
    }

    fn remove(&mut self, row_id: u64) -> Result<(), StoreError> {
        self.pending.remove(&row_id);
        Ok(())
    }
}
