//! In-memory document store, the local emulator.
//!
//! Holds everything in process memory; nothing survives a restart. Tests
//! use `inject_failures` to make the next N data operations fail with a
//! chosen error, which is how retry and offline paths are exercised.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use serde_json::{Map, Value};

use super::{merge_fields, validate_path, Document, DocumentStore, StoreError, StoreErrorCode};

pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    online: AtomicBool,
    faults: Mutex<VecDeque<StoreError>>,
    toggle_fault: Mutex<Option<StoreError>>,
    operations: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            online: AtomicBool::new(true),
            faults: Mutex::new(VecDeque::new()),
            toggle_fault: Mutex::new(None),
            operations: AtomicUsize::new(0),
        }
    }

    /// Make the next `times` data operations fail with `error`.
    pub fn inject_failures(&self, error: StoreError, times: usize) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.extend(std::iter::repeat(error).take(times));
        }
    }

    /// Make `enable_network` / `disable_network` fail until cleared.
    pub fn set_network_toggle_failure(&self, error: Option<StoreError>) {
        if let Ok(mut fault) = self.toggle_fault.lock() {
            *fault = error;
        }
    }

    /// Number of data operations attempted so far (including failed ones).
    pub fn operation_count(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    fn begin(&self) -> Result<(), StoreError> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.faults.lock().ok().and_then(|mut f| f.pop_front()) {
            return Err(err);
        }
        if !self.online.load(Ordering::SeqCst) {
            return Err(StoreError::offline());
        }
        Ok(())
    }

    fn toggle(&self, online: bool) -> Result<(), StoreError> {
        if let Some(err) = self.toggle_fault.lock().ok().and_then(|f| f.clone()) {
            return Err(err);
        }
        self.online.store(online, Ordering::SeqCst);
        Ok(())
    }

    fn poisoned() -> StoreError {
        StoreError::new(StoreErrorCode::Internal, "memory store lock poisoned")
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        validate_path(collection, Some(id))?;
        self.begin()?;
        let collections = self.collections.read().map_err(|_| Self::poisoned())?;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id))
            .cloned())
    }

    fn set(
        &self,
        collection: &str,
        id: &str,
        data: Map<String, Value>,
        merge: bool,
    ) -> Result<(), StoreError> {
        validate_path(collection, Some(id))?;
        self.begin()?;
        let mut collections = self.collections.write().map_err(|_| Self::poisoned())?;
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.iter_mut().find(|d| d.id == id) {
            Some(existing) if merge => merge_fields(&mut existing.data, data),
            Some(existing) => existing.data = data,
            None => docs.push(Document {
                id: id.to_string(),
                data,
            }),
        }
        Ok(())
    }

    fn create(&self, collection: &str, id: &str, data: Map<String, Value>) -> Result<(), StoreError> {
        validate_path(collection, Some(id))?;
        self.begin()?;
        let mut collections = self.collections.write().map_err(|_| Self::poisoned())?;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.iter().any(|d| d.id == id) {
            return Err(StoreError::new(
                StoreErrorCode::AlreadyExists,
                format!("Document already exists: {collection}/{id}"),
            ));
        }
        docs.push(Document {
            id: id.to_string(),
            data,
        });
        Ok(())
    }

    fn update(&self, collection: &str, id: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        validate_path(collection, Some(id))?;
        self.begin()?;
        let mut collections = self.collections.write().map_err(|_| Self::poisoned())?;
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        doc.data.extend(fields);
        Ok(())
    }

    fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        validate_path(collection, None)?;
        self.begin()?;
        let collections = self.collections.read().map_err(|_| Self::poisoned())?;
        Ok(collections.get(collection).cloned().unwrap_or_default())
    }

    fn enable_network(&self) -> Result<(), StoreError> {
        self.toggle(true)
    }

    fn disable_network(&self) -> Result<(), StoreError> {
        self.toggle(false)
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
