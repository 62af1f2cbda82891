//! SQLite storage backend

use crate::{Storage, StorageError, StorageStats};
use async_trait::async_trait;
use coedit_core::{DocumentId, ExportPayload};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// SQLite storage backend
///
/// Embedded persistence suitable for single-node setups. Exports are stored
/// as JSON alongside their version so stale writes can be spotted by
/// operators.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Create a new SQLite storage with the given path
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|e| StorageError::Database(e.to_string()))?;

        let storage = Self {
            conn: Mutex::new(conn),
        };

        storage.init_schema()?;
        Ok(storage)
    }

    /// Create an in-memory SQLite database (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|e| StorageError::Database(e.to_string()))?;

        let storage = Self {
            conn: Mutex::new(conn),
        };

        storage.init_schema()?;
        Ok(storage)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection mutex poisoned".into()))
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS document_exports (
                id TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                payload BLOB NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_document_exports_updated_at
                ON document_exports(updated_at);
            "#,
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }
}

fn read_id(row: &rusqlite::Row<'_>) -> rusqlite::Result<String> {
    row.get(0)
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn store(&self, payload: &ExportPayload) -> Result<(), StorageError> {
        let bytes =
            serde_json::to_vec(payload).map_err(|e| StorageError::Serialization(e.to_string()))?;

        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO document_exports (id, version, payload, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                version = excluded.version,
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
            params![
                payload.document.id.as_str(),
                payload.document.version as i64,
                bytes,
                payload.document.updated_at as i64
            ],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        debug!(document = %payload.document.id, version = payload.document.version, "Stored export");
        Ok(())
    }

    async fn load(&self, id: &DocumentId) -> Result<Option<ExportPayload>, StorageError> {
        let conn = self.conn()?;

        let result: Option<Vec<u8>> = conn
            .query_row(
                "SELECT payload FROM document_exports WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        match result {
            Some(bytes) => {
                let payload: ExportPayload = serde_json::from_slice(&bytes)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(payload))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &DocumentId) -> Result<bool, StorageError> {
        let conn = self.conn()?;

        let affected = conn
            .execute("DELETE FROM document_exports WHERE id = ?1", params![id.as_str()])
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(affected > 0)
    }

    async fn list(&self, pattern: Option<&str>) -> Result<Vec<DocumentId>, StorageError> {
        let conn = self.conn()?;

        // Document IDs cannot contain LIKE wildcards or quotes, so binding
        // the pattern as a parameter is enough.
        let (sql, arg) = match pattern {
            Some(p) if p == "*" => ("SELECT id FROM document_exports ORDER BY id", None),
            Some(p) if p.ends_with('*') => (
                "SELECT id FROM document_exports WHERE id LIKE ?1 ORDER BY id",
                Some(format!("{}%", p.trim_end_matches('*'))),
            ),
            Some(p) if p.starts_with('*') => (
                "SELECT id FROM document_exports WHERE id LIKE ?1 ORDER BY id",
                Some(format!("%{}", p.trim_start_matches('*'))),
            ),
            Some(p) => (
                "SELECT id FROM document_exports WHERE id = ?1 ORDER BY id",
                Some(p.to_string()),
            ),
            None => ("SELECT id FROM document_exports ORDER BY id", None),
        };

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let rows = match &arg {
            Some(a) => stmt.query_map(params![a], read_id),
            None => stmt.query_map([], read_id),
        }
        .map_err(|e| StorageError::Database(e.to_string()))?;

        let ids: Vec<DocumentId> = rows
            .filter_map(|r| r.ok())
            .filter_map(|id| DocumentId::new(id).ok())
            .collect();

        Ok(ids)
    }

    async fn exists(&self, id: &DocumentId) -> Result<bool, StorageError> {
        let conn = self.conn()?;

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM document_exports WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(count > 0)
    }

    async fn stats(&self) -> Result<StorageStats, StorageError> {
        let conn = self.conn()?;

        let document_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM document_exports", [], |row| row.get(0))
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let total_size: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(LENGTH(payload)), 0) FROM document_exports",
                [],
                |row| row.get(0),
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(StorageStats {
            document_count: document_count as usize,
            total_size_bytes: total_size as usize,
        })
    }
}
