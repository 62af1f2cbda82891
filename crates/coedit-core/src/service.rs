//! Conflict resolution service - owns the document registry and is the only
//! writer of document state

use crate::config::ServiceConfig;
use crate::conflict::ConflictRecord;
use crate::document::{
    ApplyOutcome, Document, DocumentId, DocumentSnapshot, DocumentState, DocumentStats, DocumentView,
    ExportPayload, VersionInfo,
};
use crate::error::{Error, Result};
use crate::operation::{now_millis, Operation};
use crate::presence::{Selection, UserState};
use crate::sequence::Edit;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Simple glob pattern matching: `*`, `prefix*`, `*suffix` or an exact key
pub fn matches_pattern(key: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if let Some(prefix) = pattern.strip_suffix('*') {
        return key.starts_with(prefix);
    }

    if let Some(suffix) = pattern.strip_prefix('*') {
        return key.ends_with(suffix);
    }

    key == pattern
}

/// Change notification for transport layers fanning out to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DocumentEvent {
    OperationApplied {
        document_id: DocumentId,
        version: u64,
        operation: Operation,
        edits: Vec<Edit>,
    },
    VersionCreated {
        document_id: DocumentId,
        version: VersionInfo,
    },
    UserJoined {
        document_id: DocumentId,
        user_id: String,
    },
    UserLeft {
        document_id: DocumentId,
        user_id: String,
    },
}

/// Registry of collaboratively edited documents.
///
/// The registry map only guards insertion and lookup; every document has
/// its own lock, so edits to different documents never contend.
pub struct ConflictResolutionService {
    documents: DashMap<String, Arc<Document>>,
    events: broadcast::Sender<DocumentEvent>,
    config: ServiceConfig,
    metrics: ApplyMetrics,
}

/// Apply-path counters, shared by all documents
#[derive(Debug, Default)]
struct ApplyMetrics {
    applied: AtomicU64,
    rejected: AtomicU64,
    conflicts: AtomicU64,
    apply_micros: AtomicU64,
}

impl ConflictResolutionService {
    /// Create a service with default configuration
    pub fn new() -> Self {
        let config = ServiceConfig::default();
        let (events, _) = broadcast::channel(config.event_capacity);

        Self {
            documents: DashMap::new(),
            events,
            config,
            metrics: ApplyMetrics::default(),
        }
    }

    pub fn with_config(config: ServiceConfig) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity);

        Ok(Self {
            documents: DashMap::new(),
            events,
            config,
            metrics: ApplyMetrics::default(),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Create a new document
    pub fn create_document(
        &self,
        id: DocumentId,
        initial_content: impl Into<String>,
        creator_id: &str,
    ) -> Result<DocumentView> {
        match self.documents.entry(id.as_str().to_string()) {
            Entry::Occupied(_) => Err(Error::DocumentExists(id.to_string())),
            Entry::Vacant(slot) => {
                let doc = Arc::new(Document::new(id.clone(), initial_content, now_millis()));
                let view = doc.read(None)?.view(&id);
                slot.insert(doc);

                info!(document = %id, creator = %creator_id, "Document created");
                Ok(view)
            }
        }
    }

    fn lookup(&self, id: &DocumentId) -> Result<Arc<Document>> {
        self.documents
            .get(id.as_str())
            .map(|r| r.value().clone())
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))
    }

    /// Full copy of a document
    pub fn get_document(&self, id: &DocumentId) -> Result<DocumentView> {
        let doc = self.lookup(id)?;
        let state = doc.read(self.config.lock_timeout())?;
        Ok(state.view(id))
    }

    /// Integrate `op` with everything already applied.
    ///
    /// Replayed operation IDs return `ApplyOutcome::Duplicate`. A rejected
    /// operation leaves the document unchanged.
    pub fn apply_operation(&self, id: &DocumentId, op: Operation) -> Result<ApplyOutcome> {
        let doc = self.lookup(id)?;
        let mut state = doc.write(self.config.lock_timeout()).map_err(|e| {
            warn!(document = %id, operation = %op.id, "Timed out waiting for document lock");
            e
        })?;

        self.apply_locked(id, &mut state, op)
    }

    fn apply_locked(&self, id: &DocumentId, state: &mut DocumentState, op: Operation) -> Result<ApplyOutcome> {
        let started = Instant::now();
        let conflicts_before = state.conflicts().len();

        let outcome = state.apply(&op, now_millis()).map_err(|e| {
            self.metrics.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(document = %id, operation = %op.id, author = %op.author_id, error = %e, "Operation rejected");
            e
        })?;

        if let ApplyOutcome::Applied { version, edits } = &outcome {
            let conflicts = state.conflicts().len() - conflicts_before;
            self.metrics.applied.fetch_add(1, Ordering::Relaxed);
            self.metrics.conflicts.fetch_add(conflicts as u64, Ordering::Relaxed);
            self.metrics
                .apply_micros
                .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);
            if conflicts > 0 {
                info!(document = %id, operation = %op.id, conflicts, "Concurrent edits resolved");
            }

            // Sent under the lock so subscribers see versions in order.
            let _ = self.events.send(DocumentEvent::OperationApplied {
                document_id: id.clone(),
                version: *version,
                operation: op,
                edits: edits.clone(),
            });
        }

        Ok(outcome)
    }

    /// Conflicts detected while applying, oldest first
    pub fn get_document_conflicts(&self, id: &DocumentId) -> Result<Vec<ConflictRecord>> {
        let doc = self.lookup(id)?;
        let state = doc.read(self.config.lock_timeout())?;
        Ok(state.conflicts().to_vec())
    }

    /// Checkpoint the current text as a named version
    pub fn create_version(&self, id: &DocumentId, created_by: &str, description: &str) -> Result<VersionInfo> {
        let doc = self.lookup(id)?;
        let mut state = doc.write(self.config.lock_timeout())?;

        let version = state.create_version(created_by, description, now_millis());
        info!(
            document = %id,
            version = %version.id,
            number = version.number,
            created_by = %created_by,
            "Version created"
        );
        let _ = self.events.send(DocumentEvent::VersionCreated {
            document_id: id.clone(),
            version: version.clone(),
        });

        Ok(version)
    }

    /// Checkpoints of a document, oldest first
    pub fn list_versions(&self, id: &DocumentId) -> Result<Vec<VersionInfo>> {
        let doc = self.lookup(id)?;
        let state = doc.read(self.config.lock_timeout())?;
        Ok(state.versions())
    }

    /// Bring the text back to a checkpoint.
    ///
    /// The change is applied as a regular operation by `reverted_by`, so
    /// history and subscribers see it like any other edit. Reverting to a
    /// checkpoint that matches the current text changes nothing.
    pub fn revert_to_version(&self, id: &DocumentId, version_id: &str, reverted_by: &str) -> Result<DocumentView> {
        let doc = self.lookup(id)?;
        let mut state = doc.write(self.config.lock_timeout())?;

        match state.revert_operation(id, version_id, reverted_by, now_millis())? {
            Some(op) => {
                info!(document = %id, version = %version_id, user = %reverted_by, "Reverting to version");
                self.apply_locked(id, &mut state, op)?;
            }
            None => debug!(document = %id, version = %version_id, "Revert matches current text"),
        }

        Ok(state.view(id))
    }

    /// Applied operations in application order, as originally submitted
    pub fn get_document_history(&self, id: &DocumentId) -> Result<Vec<Operation>> {
        let doc = self.lookup(id)?;
        let state = doc.read(self.config.lock_timeout())?;
        Ok(state.history().to_vec())
    }

    pub fn get_document_state(&self, id: &DocumentId) -> Result<DocumentSnapshot> {
        let doc = self.lookup(id)?;
        let state = doc.read(self.config.lock_timeout())?;
        Ok(state.snapshot(id))
    }

    pub fn get_document_statistics(&self, id: &DocumentId) -> Result<DocumentStats> {
        let doc = self.lookup(id)?;
        let state = doc.read(self.config.lock_timeout())?;
        Ok(state.stats(id, now_millis(), self.config.liveness_window_ms))
    }

    /// Everything a persistence collaborator needs to store the document
    pub fn export_document(&self, id: &DocumentId) -> Result<ExportPayload> {
        let doc = self.lookup(id)?;
        let state = doc.read(self.config.lock_timeout())?;
        Ok(ExportPayload {
            document: state.snapshot(id),
            history: state.history().to_vec(),
            users: state.users().snapshot(),
        })
    }

    /// Restoring documents is owned by the persistence layer.
    pub fn import_document(&self, payload: ExportPayload) -> Result<DocumentView> {
        warn!(document = %payload.document.id, "Import requested but not supported");
        Err(Error::ImportUnsupported(format!(
            "document {} must be restored by the persistence layer",
            payload.document.id
        )))
    }

    /// Join (or rejoin) a document
    pub fn join_document(&self, id: &DocumentId, user_id: &str, username: &str) -> Result<UserState> {
        self.join_document_at(id, user_id, username, now_millis())
    }

    pub fn join_document_at(
        &self,
        id: &DocumentId,
        user_id: &str,
        username: &str,
        now: u64,
    ) -> Result<UserState> {
        let doc = self.lookup(id)?;
        let mut state = doc.write(self.config.lock_timeout())?;

        let joined = state.users.join(user_id, username, &self.config.palette, now);
        let user = state
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| Error::UserNotFound {
                document: id.to_string(),
                user: user_id.to_string(),
            })?;

        if joined {
            info!(document = %id, user = %user_id, "User joined");
            let _ = self.events.send(DocumentEvent::UserJoined {
                document_id: id.clone(),
                user_id: user_id.to_string(),
            });
        }

        Ok(user)
    }

    /// Leave a document. Returns false if the user was not connected.
    pub fn leave_document(&self, id: &DocumentId, user_id: &str) -> Result<bool> {
        let doc = self.lookup(id)?;
        let mut state = doc.write(self.config.lock_timeout())?;

        if state.users.leave(user_id).is_none() {
            debug!(document = %id, user = %user_id, "Leave for unknown user ignored");
            return Ok(false);
        }

        info!(document = %id, user = %user_id, "User left");
        let _ = self.events.send(DocumentEvent::UserLeft {
            document_id: id.clone(),
            user_id: user_id.to_string(),
        });
        Ok(true)
    }

    /// Move a user's cursor. Unknown users are ignored and yield false.
    pub fn update_user_state(
        &self,
        id: &DocumentId,
        user_id: &str,
        cursor: usize,
        selection: Option<Selection>,
    ) -> Result<bool> {
        self.update_user_state_at(id, user_id, cursor, selection, now_millis())
    }

    pub fn update_user_state_at(
        &self,
        id: &DocumentId,
        user_id: &str,
        cursor: usize,
        selection: Option<Selection>,
        now: u64,
    ) -> Result<bool> {
        let doc = self.lookup(id)?;
        let mut state = doc.write(self.config.lock_timeout())?;

        let updated = state.users.update(user_id, cursor, selection, now);
        if !updated {
            debug!(document = %id, user = %user_id, "Presence update for unknown user ignored");
        }
        Ok(updated)
    }

    pub fn user_state(&self, id: &DocumentId, user_id: &str) -> Result<UserState> {
        let doc = self.lookup(id)?;
        let state = doc.read(self.config.lock_timeout())?;

        state.users().get(user_id).cloned().ok_or_else(|| Error::UserNotFound {
            document: id.to_string(),
            user: user_id.to_string(),
        })
    }

    /// Users seen within the liveness window, sorted by username
    pub fn get_active_users(&self, id: &DocumentId) -> Result<Vec<UserState>> {
        self.get_active_users_at(id, now_millis())
    }

    pub fn get_active_users_at(&self, id: &DocumentId, now: u64) -> Result<Vec<UserState>> {
        let doc = self.lookup(id)?;
        let state = doc.read(self.config.lock_timeout())?;
        Ok(state.users().active(now, self.config.liveness_window_ms))
    }

    /// Disconnect users idle longer than `idle` from every document.
    /// Returns the number of users removed.
    pub fn prune_inactive_users(&self, idle: Duration) -> usize {
        self.prune_inactive_users_at(idle, now_millis())
    }

    pub fn prune_inactive_users_at(&self, idle: Duration, now: u64) -> usize {
        let docs: Vec<Arc<Document>> = self.documents.iter().map(|e| e.value().clone()).collect();
        let idle_ms = idle.as_millis() as u64;
        let mut removed = 0;

        for doc in docs {
            let mut state = match doc.write(self.config.lock_timeout()) {
                Ok(state) => state,
                Err(_) => {
                    debug!(document = %doc.id(), "Skipping busy document during prune");
                    continue;
                }
            };
            for user_id in state.users.prune(now, idle_ms) {
                removed += 1;
                let _ = self.events.send(DocumentEvent::UserLeft {
                    document_id: doc.id().clone(),
                    user_id,
                });
            }
        }

        removed
    }

    /// Snapshots of all documents matching a pattern (glob syntax)
    pub fn list_documents(&self, pattern: Option<&str>) -> Result<Vec<DocumentSnapshot>> {
        let docs: Vec<Arc<Document>> = self
            .documents
            .iter()
            .filter(|entry| pattern.map_or(true, |p| matches_pattern(entry.key(), p)))
            .map(|entry| entry.value().clone())
            .collect();

        let mut snapshots = docs
            .iter()
            .map(|doc| Ok(doc.read(self.config.lock_timeout())?.snapshot(doc.id())))
            .collect::<Result<Vec<_>>>()?;
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(snapshots)
    }

    /// Subscribe to document events
    pub fn subscribe(&self) -> broadcast::Receiver<DocumentEvent> {
        self.events.subscribe()
    }

    /// Get statistics
    pub fn stats(&self) -> ServiceStats {
        let applied = self.metrics.applied.load(Ordering::Relaxed);
        let micros = self.metrics.apply_micros.load(Ordering::Relaxed);

        ServiceStats {
            document_count: self.documents.len(),
            subscriber_count: self.events.receiver_count(),
            operations_applied: applied,
            operations_rejected: self.metrics.rejected.load(Ordering::Relaxed),
            conflicts_detected: self.metrics.conflicts.load(Ordering::Relaxed),
            average_apply_micros: if applied == 0 { 0.0 } else { micros as f64 / applied as f64 },
        }
    }
}

impl Default for ConflictResolutionService {
    fn default() -> Self {
        Self::new()
    }
}

/// Service statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStats {
    pub document_count: usize,
    pub subscriber_count: usize,
    pub operations_applied: u64,
    pub operations_rejected: u64,
    pub conflicts_detected: u64,
    pub average_apply_micros: f64,
}
