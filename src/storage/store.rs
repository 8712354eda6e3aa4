//! In-Memory Key-Value Store
//!
//! A single `HashMap` behind one `Mutex`. Every operation takes the lock
//! exactly once, so each command runs as one atomic step relative to every
//! other connection. The dataset has no per-key metadata: no TTL, no
//! versions, and nothing is persisted.

use crate::protocol::Value;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// The shared key-value store.
///
/// Keys are opaque bytes; values are stored and returned verbatim.
///
/// # Example
///
/// ```
/// use minikv::storage::Store;
/// use minikv::protocol::Value;
/// use bytes::Bytes;
///
/// let store = Store::new();
/// store.set(Bytes::from("name"), Value::bulk_string("Ariz"));
/// assert_eq!(store.get(b"name"), Some(Value::bulk_string("Ariz")));
/// assert!(store.delete(b"name"));
/// assert!(store.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct Store {
    data: Mutex<HashMap<Bytes, Value>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operations never leave the map half-updated, so a poisoned lock still
    /// guards a consistent map.
    fn lock(&self) -> MutexGuard<'_, HashMap<Bytes, Value>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &[u8]) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// Unconditional upsert.
    pub fn set(&self, key: Bytes, value: Value) {
        self.lock().insert(key, value);
    }

    /// Removes `key`, returning whether it was present.
    pub fn delete(&self, key: &[u8]) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Removes every entry and returns how many there were.
    pub fn flush(&self) -> usize {
        let mut data = self.lock();
        let count = data.len();
        data.clear();
        count
    }

    /// Looks up each key independently, preserving input order.
    pub fn get_many<K: AsRef<[u8]>>(&self, keys: &[K]) -> Vec<Option<Value>> {
        let data = self.lock();
        keys.iter().map(|k| data.get(k.as_ref()).cloned()).collect()
    }

    /// Upserts each pair in order under one lock; returns the pair count.
    pub fn set_many(&self, pairs: impl IntoIterator<Item = (Bytes, Value)>) -> usize {
        let mut data = self.lock();
        let mut written = 0;
        for (key, value) in pairs {
            data.insert(key, value);
            written += 1;
        }
        written
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
