//! In-memory storage backend

use crate::{Storage, StorageError, StorageStats};
use async_trait::async_trait;
use coedit_core::{matches_pattern, DocumentId, ExportPayload};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// In-memory storage backend
///
/// Fast, volatile storage suitable for development and caching.
/// Exports are kept MessagePack-encoded; data is lost when the process exits.
pub struct MemoryStorage {
    /// Encoded exports: id -> bytes
    data: DashMap<String, Vec<u8>>,
    /// Total size tracking
    total_size: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            total_size: AtomicUsize::new(0),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn store(&self, payload: &ExportPayload) -> Result<(), StorageError> {
        // Named encoding: metadata skips empty fields, so positional
        // arrays would not decode.
        let bytes = rmp_serde::to_vec_named(payload)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let key = payload.document.id.as_str().to_string();
        let new_size = bytes.len();

        if let Some(existing) = self.data.get(&key) {
            self.total_size.fetch_sub(existing.len(), Ordering::Relaxed);
        }
        self.total_size.fetch_add(new_size, Ordering::Relaxed);

        debug!(document = %key, bytes = new_size, "Stored export");
        self.data.insert(key, bytes);
        Ok(())
    }

    async fn load(&self, id: &DocumentId) -> Result<Option<ExportPayload>, StorageError> {
        match self.data.get(id.as_str()) {
            Some(entry) => {
                let payload: ExportPayload = rmp_serde::from_slice(entry.value())
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(payload))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &DocumentId) -> Result<bool, StorageError> {
        match self.data.remove(id.as_str()) {
            Some((_, bytes)) => {
                self.total_size.fetch_sub(bytes.len(), Ordering::Relaxed);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list(&self, pattern: Option<&str>) -> Result<Vec<DocumentId>, StorageError> {
        let mut ids = Vec::new();
        for entry in self.data.iter() {
            let key = entry.key();
            let matches = pattern.map_or(true, |p| matches_pattern(key, p));
            if matches {
                if let Ok(id) = DocumentId::new(key.clone()) {
                    ids.push(id);
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn exists(&self, id: &DocumentId) -> Result<bool, StorageError> {
        Ok(self.data.contains_key(id.as_str()))
    }

    async fn stats(&self) -> Result<StorageStats, StorageError> {
        Ok(StorageStats {
            document_count: self.data.len(),
            total_size_bytes: self.total_size.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::export;

    #[tokio::test]
    async fn test_store_and_load() {
        let storage = MemoryStorage::new();
        let payload = export("plan:1", "hello world");

        storage.store(&payload).await.unwrap();

        let loaded = storage.load(&payload.document.id).await.unwrap().unwrap();
        assert_eq!(loaded, payload);
        assert_eq!(loaded.document.content, ">hello world");
    }

    #[tokio::test]
    async fn test_load_missing() {
        let storage = MemoryStorage::new();
        let id = DocumentId::new("plan:none").unwrap();
        assert!(storage.load(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let storage = MemoryStorage::new();
        let payload = export("plan:2", "data");
        let id = payload.document.id.clone();

        storage.store(&payload).await.unwrap();
        assert!(storage.exists(&id).await.unwrap());

        assert!(storage.delete(&id).await.unwrap());
        assert!(!storage.exists(&id).await.unwrap());
        assert_eq!(storage.stats().await.unwrap().total_size_bytes, 0);
    }

    #[tokio::test]
    async fn test_list_with_pattern() {
        let storage = MemoryStorage::new();

        for i in 0..5 {
            storage.store(&export(&format!("plan:{}", i), "x")).await.unwrap();
        }
        for i in 0..3 {
            storage.store(&export(&format!("site:{}", i), "x")).await.unwrap();
        }

        assert_eq!(storage.list(Some("plan:*")).await.unwrap().len(), 5);
        assert_eq!(storage.list(Some("site:*")).await.unwrap().len(), 3);
        assert_eq!(storage.list(None).await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_stats_track_replacement() {
        let storage = MemoryStorage::new();

        storage.store(&export("plan:stats", "short")).await.unwrap();
        let first = storage.stats().await.unwrap().total_size_bytes;
        assert!(first > 0);

        storage
            .store(&export("plan:stats", "a considerably longer body of text"))
            .await
            .unwrap();
        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.document_count, 1);
        assert!(stats.total_size_bytes > first);
    }
}
