//! coedit Storage Backends
//!
//! Persistence collaborators for document exports produced by
//! `ConflictResolutionService::export_document`:
//! - Memory (default): Fast, volatile storage
//! - SQLite: Embedded persistence

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use async_trait::async_trait;
use coedit_core::{DocumentId, ExportPayload};

/// Storage backend trait
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store (or replace) a document export
    async fn store(&self, payload: &ExportPayload) -> Result<(), StorageError>;

    /// Load the latest export of a document
    async fn load(&self, id: &DocumentId) -> Result<Option<ExportPayload>, StorageError>;

    /// Delete a document export
    async fn delete(&self, id: &DocumentId) -> Result<bool, StorageError>;

    /// List document IDs matching a pattern
    async fn list(&self, pattern: Option<&str>) -> Result<Vec<DocumentId>, StorageError>;

    /// Check if a document export exists
    async fn exists(&self, id: &DocumentId) -> Result<bool, StorageError>;

    /// Get storage statistics
    async fn stats(&self) -> Result<StorageStats, StorageError>;
}

/// Storage error types
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Storage statistics
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    pub document_count: usize,
    pub total_size_bytes: usize,
}

pub use memory::MemoryStorage;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;
