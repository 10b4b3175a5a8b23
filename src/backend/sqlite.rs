use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde_json::{Map, Value};

use super::{merge_fields, validate_path, Document, DocumentStore, StoreError, StoreErrorCode};

/// Document store persisted in a single SQLite file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    online: AtomicBool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::new(
                    StoreErrorCode::Internal,
                    format!("Cannot create data directory {}: {e}", parent.display()),
                )
            })?;
        }
        let conn = open_database(path)?;
        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::from_connection(open_memory_database()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            online: AtomicBool::new(true),
        }
    }

    /// Lock the connection, failing fast while the network is disabled.
    fn connection(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(StoreError::offline());
        }
        self.conn
            .lock()
            .map_err(|_| StoreError::new(StoreErrorCode::Internal, "connection lock poisoned"))
    }
}

/// Open a SQLite connection to the given path and run migrations
pub fn open_database(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path).map_err(store_error)?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing)
pub fn open_memory_database() -> Result<Connection, StoreError> {
    let conn = Connection::open_in_memory().map_err(store_error)?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA busy_timeout=5000;",
    )
    .map_err(store_error)
}

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    let current_version = get_current_version(conn);

    let migrations: Vec<(i64, &str)> = vec![
        (1, include_str!("../../resources/migrations/001_documents.sql")),
    ];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running migration v{version}");
            conn.execute_batch(sql).map_err(|e| {
                StoreError::new(
                    StoreErrorCode::Internal,
                    format!("Migration failed at version {version}: {e}"),
                )
            })?;
        }
    }

    Ok(())
}

/// Get the current schema version (0 if no schema exists yet)
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, i64>(0)
    })
    .unwrap_or(0)
}

/// Translate SQLite failures into store status codes. Lock contention is
/// transient; constraint failures mean the row already exists.
fn store_error(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            StoreError::unavailable(format!("Database busy: {err}"))
        }
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            StoreError::new(StoreErrorCode::AlreadyExists, err.to_string())
        }
        _ => StoreError::new(StoreErrorCode::Internal, err.to_string()),
    }
}

fn decode_row(id: String, data: String) -> Result<Document, StoreError> {
    match serde_json::from_str::<Value>(&data)? {
        Value::Object(data) => Ok(Document { id, data }),
        _ => Err(StoreError::new(
            StoreErrorCode::Internal,
            format!("Stored document {id} is not an object"),
        )),
    }
}

fn read_document(conn: &Connection, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
    let row = conn
        .query_row(
            "SELECT id, data FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()
        .map_err(store_error)?;
    row.map(|(id, data)| decode_row(id, data)).transpose()
}

fn write_document(
    conn: &Connection,
    collection: &str,
    id: &str,
    data: &Map<String, Value>,
) -> Result<(), StoreError> {
    let json = serde_json::to_string(data)?;
    conn.execute(
        "INSERT INTO documents (collection, id, data) VALUES (?1, ?2, ?3)
         ON CONFLICT(collection, id) DO UPDATE SET
             data = excluded.data,
             updated_at = datetime('now')",
        params![collection, id, json],
    )
    .map_err(store_error)?;
    Ok(())
}

impl DocumentStore for SqliteStore {
    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        validate_path(collection, Some(id))?;
        let conn = self.connection()?;
        read_document(&conn, collection, id)
    }

    fn set(
        &self,
        collection: &str,
        id: &str,
        data: Map<String, Value>,
        merge: bool,
    ) -> Result<(), StoreError> {
        validate_path(collection, Some(id))?;
        let conn = self.connection()?;
        let data = match (merge, read_document(&conn, collection, id)?) {
            (true, Some(mut existing)) => {
                merge_fields(&mut existing.data, data);
                existing.data
            }
            _ => data,
        };
        write_document(&conn, collection, id, &data)
    }

    fn create(&self, collection: &str, id: &str, data: Map<String, Value>) -> Result<(), StoreError> {
        validate_path(collection, Some(id))?;
        let conn = self.connection()?;
        let json = serde_json::to_string(&data)?;
        conn.execute(
            "INSERT INTO documents (collection, id, data) VALUES (?1, ?2, ?3)",
            params![collection, id, json],
        )
        .map_err(|e| {
            let err = store_error(e);
            if err.is_code(StoreErrorCode::AlreadyExists) {
                StoreError::new(
                    StoreErrorCode::AlreadyExists,
                    format!("Document already exists: {collection}/{id}"),
                )
            } else {
                err
            }
        })?;
        Ok(())
    }

    fn update(&self, collection: &str, id: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        validate_path(collection, Some(id))?;
        let conn = self.connection()?;
        let mut doc = read_document(&conn, collection, id)?
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        doc.data.extend(fields);
        write_document(&conn, collection, id, &doc.data)
    }

    fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        validate_path(collection, None)?;
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare("SELECT id, data FROM documents WHERE collection = ?1 ORDER BY rowid")
            .map_err(store_error)?;
        let rows = stmt
            .query_map(params![collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(store_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_error)?;

        rows.into_iter()
            .map(|(id, data)| decode_row(id, data))
            .collect()
    }

    fn enable_network(&self) -> Result<(), StoreError> {
        self.online.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disable_network(&self) -> Result<(), StoreError> {
        self.online.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn schema_version_is_current() {
        let conn = open_memory_database().unwrap();
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn migration_idempotent() {
        let conn = open_memory_database().unwrap();
        // Migrations are idempotent
        assert!(run_migrations(&conn).is_ok());
    }

    #[test]
    fn set_get_and_merge() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .set("patients", "p1", fields(json!({"name": "Meera", "age": 31})), false)
            .unwrap();
        store
            .set("patients", "p1", fields(json!({"gender": "female"})), true)
            .unwrap();

        let doc = store.get("patients", "p1").unwrap().unwrap();
        assert_eq!(doc.data["name"], "Meera");
        assert_eq!(doc.data["gender"], "female");
        assert!(store.get("patients", "p2").unwrap().is_none());
    }

    #[test]
    fn create_conflict_maps_to_already_exists() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create("users", "u1", fields(json!({"role": "doctor"}))).unwrap();
        let err = store.create("users", "u1", Map::new()).unwrap_err();
        assert!(err.is_code(StoreErrorCode::AlreadyExists));
    }

    #[test]
    fn update_missing_document_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.update("users", "ghost", Map::new()).unwrap_err();
        assert!(err.is_code(StoreErrorCode::NotFound));
    }

    #[test]
    fn update_keeps_insertion_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.add("patients/p1/visits", fields(json!({"token": "AAA111"}))).unwrap();
        let b = store.add("patients/p1/visits", fields(json!({"token": "BBB222"}))).unwrap();
        store
            .update("patients/p1/visits", &a, fields(json!({"prescription": "Paracetamol"})))
            .unwrap();

        let docs = store.list("patients/p1/visits").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, a);
        assert_eq!(docs[0].data["prescription"], "Paracetamol");
        assert_eq!(docs[1].id, b);
    }

    #[test]
    fn disabled_network_reports_offline() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.disable_network().unwrap();
        let err = store.list("logs").unwrap_err();
        assert!(err.is_code(StoreErrorCode::Unavailable));
        assert!(err.message.contains("offline"));
        store.enable_network().unwrap();
        assert!(store.list("logs").unwrap().is_empty());
    }

    #[test]
    fn file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("clinic.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.set("users", "u1", fields(json!({"email": "d@c.org"})), false).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        let doc = store.get("users", "u1").unwrap().unwrap();
        assert_eq!(doc.data["email"], "d@c.org");
    }
}
