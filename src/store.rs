use crate::error::{ProfileError, Result};
use crate::schema::{Document, StoredRecord};
use log::debug;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Result of an insert guarded by a unique field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniqueInsert {
    /// A record with the same key value was already stored; nothing was written.
    Existing(String),
    Inserted(String),
}

impl UniqueInsert {
    pub fn key(&self) -> &str {
        match self {
            UniqueInsert::Existing(key) | UniqueInsert::Inserted(key) => key,
        }
    }

    pub fn into_key(self) -> String {
        match self {
            UniqueInsert::Existing(key) | UniqueInsert::Inserted(key) => key,
        }
    }
}

/// A keyed document store with named collections.
///
/// Scans are not required to be consistent with concurrent writers.
pub trait DocumentStore {
    /// Every record in `collection` whose `field` equals `value`.
    fn find_by_field(&self, collection: &str, field: &str, value: &Value)
        -> Result<Vec<StoredRecord>>;

    fn get(&self, collection: &str, key: &str) -> Result<Option<Document>>;

    /// Stores a new document and returns its generated key.
    fn insert(&self, collection: &str, document: Document) -> Result<String>;

    /// Replaces (or creates) the whole document at `key`.
    fn set(&self, collection: &str, key: &str, document: Document) -> Result<()>;

    /// Every record in `collection`.
    fn scan(&self, collection: &str) -> Result<Vec<StoredRecord>>;

    /// Inserts `document` unless a record with `field == value` exists.
    ///
    /// The default is a lookup followed by an insert. Two callers racing on
    /// the same value can both miss the lookup and both insert. Stores with
    /// a uniqueness constraint or an atomic insert-if-absent should override.
    fn insert_unique(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
        document: Document,
    ) -> Result<UniqueInsert> {
        if let Some(existing) = self.find_by_field(collection, field, value)?.into_iter().next() {
            return Ok(UniqueInsert::Existing(existing.key));
        }
        self.insert(collection, document).map(UniqueInsert::Inserted)
    }
}

#[derive(Debug, Default)]
struct StoreState {
    collections: BTreeMap<String, BTreeMap<String, Document>>,
    next_key: u64,
}

impl StoreState {
    fn generate_key(&mut self) -> String {
        self.next_key += 1;
        format!("doc-{:06}", self.next_key)
    }

    fn find(&self, collection: &str, field: &str, value: &Value) -> Vec<StoredRecord> {
        self.collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, doc)| doc.get(field) == Some(value))
                    .map(|(key, doc)| StoredRecord {
                        key: key.clone(),
                        document: doc.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Process-local store. `insert_unique` holds one lock across the lookup and
/// the insert, so it never produces duplicates.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.lock()
            .map(|state| state.collections.get(collection).map_or(0, |c| c.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|_| ProfileError::Store("in-memory store lock poisoned".to_string()))
    }
}

impl DocumentStore for InMemoryStore {
    fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<StoredRecord>> {
        Ok(self.lock()?.find(collection, field, value))
    }

    fn get(&self, collection: &str, key: &str) -> Result<Option<Document>> {
        Ok(self
            .lock()?
            .collections
            .get(collection)
            .and_then(|docs| docs.get(key))
            .cloned())
    }

    fn insert(&self, collection: &str, document: Document) -> Result<String> {
        let mut state = self.lock()?;
        let key = state.generate_key();
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.clone(), document);
        debug!("Inserted {} into '{}'", key, collection);
        Ok(key)
    }

    fn set(&self, collection: &str, key: &str, document: Document) -> Result<()> {
        self.lock()?
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), document);
        Ok(())
    }

    fn scan(&self, collection: &str) -> Result<Vec<StoredRecord>> {
        Ok(self
            .lock()?
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(key, doc)| StoredRecord {
                        key: key.clone(),
                        document: doc.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn insert_unique(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
        document: Document,
    ) -> Result<UniqueInsert> {
        let mut state = self.lock()?;
        if let Some(existing) = state.find(collection, field, value).into_iter().next() {
            return Ok(UniqueInsert::Existing(existing.key));
        }
        let key = state.generate_key();
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.clone(), document);
        Ok(UniqueInsert::Inserted(key))
    }
}
