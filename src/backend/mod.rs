//! Document-database and authentication backend.
//!
//! The clinic never talks to storage directly: every read and write goes
//! through the `DocumentStore` trait, which models a schema-less hosted
//! document database (collections of JSON documents addressed by
//! `collection/id`, nested collections as `parent/{id}/child`).
//!
//! Two implementations ship with the crate:
//! - `SqliteStore`: persistent, one `documents` table per database file
//! - `MemoryStore`: the local emulator, also used by tests (supports
//!   injected faults)

pub mod auth;
pub mod connection;
pub mod failsafe;
pub mod memory;
pub mod sqlite;

pub use auth::{AuthError, AuthService, AuthSession, AuthUser};
pub use connection::ConnectionController;
pub use failsafe::{get_document_failsafe, set_document_failsafe, FailsafeResult, RetryPolicy, WriteResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Message returned by every operation while the network is disabled.
pub const OFFLINE_MESSAGE: &str = "Failed to reach the document store because the client is offline.";

/// Status codes a store operation can fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorCode {
    Unavailable,
    ResourceExhausted,
    Internal,
    DeadlineExceeded,
    Aborted,
    PermissionDenied,
    NotFound,
    AlreadyExists,
    InvalidArgument,
}

impl StoreErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::ResourceExhausted => "resource-exhausted",
            Self::Internal => "internal",
            Self::DeadlineExceeded => "deadline-exceeded",
            Self::Aborted => "aborted",
            Self::PermissionDenied => "permission-denied",
            Self::NotFound => "not-found",
            Self::AlreadyExists => "already-exists",
            Self::InvalidArgument => "invalid-argument",
        }
    }
}

impl std::fmt::Display for StoreErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error from a document store operation. `code` is `None` when the
/// failure could not be attributed (treated as transient by the retry layer).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StoreError {
    pub code: Option<StoreErrorCode>,
    pub message: String,
}

impl StoreError {
    pub fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    pub fn uncoded(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::Unavailable, message)
    }

    pub fn offline() -> Self {
        Self::unavailable(OFFLINE_MESSAGE)
    }

    pub fn not_found(collection: &str, id: &str) -> Self {
        Self::new(
            StoreErrorCode::NotFound,
            format!("No document to update: {collection}/{id}"),
        )
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::InvalidArgument, message)
    }

    pub fn is_code(&self, code: StoreErrorCode) -> bool {
        self.code == Some(code)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::invalid_argument(format!("Invalid document data: {err}"))
    }
}

/// A stored document: its id within the collection plus its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Map<String, Value>,
}

impl Document {
    /// Deserialize the document fields. The document id is exposed to the
    /// target type as an `id` field when the data does not carry one.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let mut data = self.data.clone();
        data.entry("id")
            .or_insert_with(|| Value::String(self.id.clone()));
        Ok(serde_json::from_value(Value::Object(data))?)
    }
}

/// Serialize a value into document fields. Only JSON objects are documents.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Map<String, Value>, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::invalid_argument(format!(
            "Document data must be an object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Schema-less document database.
///
/// Collections are slash-separated paths with an odd number of segments
/// (`patients`, `patients/{id}/visits`). Implementations must return
/// `StoreError::offline()` for every data operation while the network is
/// disabled.
pub trait DocumentStore: Send + Sync {
    /// Fetch one document. A missing document is `Ok(None)`, not an error.
    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Write a document. With `merge`, nested objects are merged into the
    /// existing document instead of replacing it.
    fn set(
        &self,
        collection: &str,
        id: &str,
        data: Map<String, Value>,
        merge: bool,
    ) -> Result<(), StoreError>;

    /// Write a document that must not exist yet (`already-exists` otherwise).
    fn create(&self, collection: &str, id: &str, data: Map<String, Value>) -> Result<(), StoreError>;

    /// Replace top-level fields of an existing document (`not-found` otherwise).
    fn update(&self, collection: &str, id: &str, fields: Map<String, Value>) -> Result<(), StoreError>;

    /// All documents of a collection, in insertion order.
    fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    fn enable_network(&self) -> Result<(), StoreError>;

    fn disable_network(&self) -> Result<(), StoreError>;

    fn is_online(&self) -> bool;

    /// Write a document under a freshly generated id and return the id.
    fn add(&self, collection: &str, data: Map<String, Value>) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.create(collection, &id, data)?;
        Ok(id)
    }
}

/// Reject malformed collection paths and document ids.
pub fn validate_path(collection: &str, id: Option<&str>) -> Result<(), StoreError> {
    let segments: Vec<&str> = collection.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) || segments.len() % 2 == 0 {
        return Err(StoreError::invalid_argument(format!(
            "Invalid collection path: {collection:?}"
        )));
    }
    if let Some(id) = id {
        if id.is_empty() || id.contains('/') {
            return Err(StoreError::invalid_argument(format!(
                "Invalid document id: {id:?}"
            )));
        }
    }
    Ok(())
}

/// Path of a nested collection under a document.
pub fn subcollection(collection: &str, id: &str, child: &str) -> String {
    format!("{collection}/{id}/{child}")
}

/// Merge `source` into `target`. Nested objects merge recursively; every
/// other value replaces what was there.
pub fn merge_fields(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        let Value::Object(incoming) = value else {
            target.insert(key, value);
            continue;
        };
        if let Some(Value::Object(existing)) = target.get_mut(&key) {
            merge_fields(existing, incoming);
            continue;
        }
        target.insert(key, Value::Object(incoming));
    }
}
