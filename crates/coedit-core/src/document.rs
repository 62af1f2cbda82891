//! Document types and the apply path

use crate::clock::VectorClock;
use crate::conflict::ConflictRecord;
use crate::error::{Error, Result};
use crate::operation::{Operation, OperationKind};
use crate::presence::{Presence, UserState};
use crate::sequence::{Edit, Sequence};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::debug;

/// Document identifier - UTF-8 string, max 512 bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a new document ID, validating the format
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(Error::InvalidDocumentId("Document ID cannot be empty".into()));
        }

        if id.len() > 512 {
            return Err(Error::InvalidDocumentId("Document ID exceeds 512 bytes".into()));
        }

        // Validate pattern: [a-zA-Z0-9:_-]+
        if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == ':' || c == '_' || c == '-') {
            return Err(Error::InvalidDocumentId(
                "Document ID must match pattern [a-zA-Z0-9:_-]+".into(),
            ));
        }

        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for DocumentId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}

/// Full copy-out of a document, safe to serialize
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentView {
    pub id: DocumentId,
    pub content: String,
    pub version: u64,
    pub vector: VectorClock,
    pub history: Vec<Operation>,
    pub users: BTreeMap<String, UserState>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Current text and causal position, without history or presence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub id: DocumentId,
    pub content: String,
    pub version: u64,
    pub vector: VectorClock,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Payload handed to a persistence collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportPayload {
    pub document: DocumentSnapshot,
    pub history: Vec<Operation>,
    pub users: BTreeMap<String, UserState>,
}

/// Aggregate figures for one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentStats {
    pub id: DocumentId,
    pub version: u64,
    pub content_length: usize,
    pub history_length: usize,
    pub operations_by_kind: BTreeMap<OperationKind, usize>,
    pub operations_by_author: BTreeMap<String, usize>,
    pub connected_users: usize,
    pub active_users: usize,
    pub conflicts: usize,
    pub versions: usize,
    pub created_at: u64,
    pub updated_at: u64,
}

/// A named checkpoint of the document text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub id: String,
    /// 1-based, in creation order
    pub number: u64,
    /// Document version (history length) when the checkpoint was taken
    pub document_version: u64,
    pub created_by: String,
    pub description: String,
    pub created_at: u64,
    pub content_length: usize,
}

#[derive(Debug, Clone)]
struct Checkpoint {
    info: VersionInfo,
    content: String,
}

/// Result of a successful `apply`
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The operation landed; `edits` turn the previous content into the new one
    Applied { version: u64, edits: Vec<Edit> },
    /// An operation with the same ID was applied before; nothing changed
    Duplicate,
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied { .. })
    }
}

/// Mutable state of a document. Only reachable through `Document`'s lock.
#[derive(Debug)]
pub struct DocumentState {
    content: String,
    sequence: Sequence,
    vector: VectorClock,
    history: Vec<Operation>,
    applied: HashSet<String>,
    conflicts: Vec<ConflictRecord>,
    checkpoints: Vec<Checkpoint>,
    pub(crate) users: Presence,
    created_at: u64,
    updated_at: u64,
}

impl DocumentState {
    fn new(content: String, now: u64) -> Self {
        Self {
            sequence: Sequence::new(&content),
            content,
            vector: VectorClock::new(),
            history: Vec::new(),
            applied: HashSet::new(),
            conflicts: Vec::new(),
            checkpoints: Vec::new(),
            users: Presence::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Always equal to the history length
    pub fn version(&self) -> u64 {
        self.history.len() as u64
    }

    pub fn vector(&self) -> &VectorClock {
        &self.vector
    }

    pub fn history(&self) -> &[Operation] {
        &self.history
    }

    pub fn users(&self) -> &Presence {
        &self.users
    }

    pub fn updated_at(&self) -> u64 {
        self.updated_at
    }

    pub fn conflicts(&self) -> &[ConflictRecord] {
        &self.conflicts
    }

    /// Integrate `op` into the text and record it. On error nothing is
    /// modified.
    ///
    /// `op.vector` may not name operations this document has not applied;
    /// such an operation is refused with `MissingDependencies` and can be
    /// resubmitted once its predecessors are in.
    pub fn apply(&mut self, op: &Operation, now: u64) -> Result<ApplyOutcome> {
        if self.applied.contains(&op.id) {
            debug!(operation = %op.id, "Duplicate operation ignored");
            return Ok(ApplyOutcome::Duplicate);
        }

        op.validate()?;

        let missing = op
            .vector
            .iter()
            .find(|&(author, count)| count > self.vector.get(author));
        if let Some((author, count)) = missing {
            return Err(Error::MissingDependencies {
                operation: op.id.clone(),
                author: author.to_string(),
                expected: count,
                applied: self.vector.get(author),
            });
        }

        let integration = self.sequence.integrate(&self.history, op)?;

        debug!(
            operation = %op.id,
            author = %op.author_id,
            kind = %op.kind,
            position = op.position,
            edits = integration.edits.len(),
            conflicts = integration.conflicts.len(),
            "Applied operation"
        );

        for &(other, kind) in &integration.conflicts {
            let record = ConflictRecord::new(op, &self.history[other], kind, now);
            debug!(
                operation = %record.operation_id,
                other = %record.other_operation_id,
                kind = ?record.kind,
                severity = ?record.severity,
                "Conflict resolved"
            );
            self.conflicts.push(record);
        }

        self.content = self.sequence.text();
        self.history.push(op.clone());
        self.applied.insert(op.id.clone());
        self.vector.merge(&op.event_clock());
        self.updated_at = now;

        Ok(ApplyOutcome::Applied {
            version: self.version(),
            edits: integration.edits,
        })
    }

    /// Checkpoint the current text under a new version
    pub fn create_version(&mut self, created_by: &str, description: &str, now: u64) -> VersionInfo {
        let info = VersionInfo {
            id: uuid::Uuid::new_v4().to_string(),
            number: self.checkpoints.len() as u64 + 1,
            document_version: self.version(),
            created_by: created_by.to_string(),
            description: description.to_string(),
            created_at: now,
            content_length: self.content.chars().count(),
        };
        self.checkpoints.push(Checkpoint {
            info: info.clone(),
            content: self.content.clone(),
        });
        info
    }

    /// Checkpoints, oldest first
    pub fn versions(&self) -> Vec<VersionInfo> {
        self.checkpoints.iter().map(|c| c.info.clone()).collect()
    }

    /// The operation that takes the current text back to checkpoint
    /// `version_id`, or `None` if the text already matches.
    ///
    /// The operation has seen everything applied so far, so it replaces
    /// exactly the differing middle of the text.
    pub fn revert_operation(
        &self,
        id: &DocumentId,
        version_id: &str,
        author: &str,
        now: u64,
    ) -> Result<Option<Operation>> {
        let checkpoint = self
            .checkpoints
            .iter()
            .find(|c| c.info.id == version_id)
            .ok_or_else(|| Error::VersionNotFound {
                document: id.to_string(),
                version: version_id.to_string(),
            })?;

        let current: Vec<char> = self.content.chars().collect();
        let target: Vec<char> = checkpoint.content.chars().collect();

        let prefix = current.iter().zip(&target).take_while(|(a, b)| a == b).count();
        let suffix = current[prefix..]
            .iter()
            .rev()
            .zip(target[prefix..].iter().rev())
            .take_while(|(a, b)| a == b)
            .count();

        let removed = current.len() - prefix - suffix;
        let inserted: String = target[prefix..target.len() - suffix].iter().collect();

        let op = match (removed, inserted.is_empty()) {
            (0, true) => return Ok(None),
            (0, false) => Operation::insert(prefix, inserted, author),
            (_, true) => Operation::delete(prefix, removed, author),
            (_, false) => Operation::update(prefix, removed, inserted, author),
        };

        let mut op = op.with_timestamp(now).with_vector(self.vector.clone());
        op.metadata
            .labels
            .insert("revert_to".to_string(), checkpoint.info.id.clone());
        Ok(Some(op))
    }

    pub fn snapshot(&self, id: &DocumentId) -> DocumentSnapshot {
        DocumentSnapshot {
            id: id.clone(),
            content: self.content.clone(),
            version: self.version(),
            vector: self.vector.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn view(&self, id: &DocumentId) -> DocumentView {
        DocumentView {
            id: id.clone(),
            content: self.content.clone(),
            version: self.version(),
            vector: self.vector.clone(),
            history: self.history.clone(),
            users: self.users.snapshot(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn stats(&self, id: &DocumentId, now: u64, liveness_window_ms: u64) -> DocumentStats {
        let mut operations_by_kind = BTreeMap::new();
        let mut operations_by_author = BTreeMap::new();
        for op in &self.history {
            *operations_by_kind.entry(op.kind).or_insert(0) += 1;
            *operations_by_author.entry(op.author_id.clone()).or_insert(0) += 1;
        }

        DocumentStats {
            id: id.clone(),
            version: self.version(),
            content_length: self.content.chars().count(),
            history_length: self.history.len(),
            operations_by_kind,
            operations_by_author,
            connected_users: self.users.len(),
            active_users: self.users.active(now, liveness_window_ms).len(),
            conflicts: self.conflicts.len(),
            versions: self.checkpoints.len(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// A collaboratively edited document.
///
/// The lock is private; callers get copies through `DocumentView` and
/// friends, never a reference into the state.
pub struct Document {
    id: DocumentId,
    state: RwLock<DocumentState>,
}

impl Document {
    pub fn new(id: DocumentId, content: impl Into<String>, now: u64) -> Self {
        Self {
            id,
            state: RwLock::new(DocumentState::new(content.into(), now)),
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Shared access, optionally bounded by `timeout`
    pub(crate) fn read(&self, timeout: Option<Duration>) -> Result<RwLockReadGuard<'_, DocumentState>> {
        match timeout {
            Some(t) => self
                .state
                .try_read_for(t)
                .ok_or_else(|| Error::Busy(self.id.to_string())),
            None => Ok(self.state.read()),
        }
    }

    /// Exclusive access, optionally bounded by `timeout`
    pub(crate) fn write(&self, timeout: Option<Duration>) -> Result<RwLockWriteGuard<'_, DocumentState>> {
        match timeout {
            Some(t) => self
                .state
                .try_write_for(t)
                .ok_or_else(|| Error::Busy(self.id.to_string())),
            None => Ok(self.state.write()),
        }
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::{ConflictKind, ConflictSeverity};

    fn doc(content: &str) -> DocumentState {
        DocumentState::new(content.to_string(), 0)
    }

    #[test]
    fn test_document_id_valid() {
        assert!(DocumentId::new("plan:floor-2").is_ok());
        assert!(DocumentId::new("site_A:annex-1").is_ok());
    }

    #[test]
    fn test_document_id_invalid() {
        assert!(DocumentId::new("").is_err());
        assert!(DocumentId::new("plan/2").is_err());
        assert!(DocumentId::new("a".repeat(513)).is_err());
    }

    #[test]
    fn test_document_id_deserialize_validates() {
        assert!(serde_json::from_str::<DocumentId>(r#""plan:1""#).is_ok());
        assert!(serde_json::from_str::<DocumentId>(r#""bad id""#).is_err());
    }

    #[test]
    fn test_apply_each_kind() {
        let mut state = doc("abcdef");

        state.apply(&Operation::insert(6, "gh", "a"), 1).unwrap();
        assert_eq!(state.content(), "abcdefgh");

        let seen: VectorClock = [("a", 1u64)].into_iter().collect();
        state
            .apply(&Operation::delete(0, 2, "a").with_vector(seen.clone()), 2)
            .unwrap();
        assert_eq!(state.content(), "cdefgh");

        let seen: VectorClock = [("a", 2u64)].into_iter().collect();
        state
            .apply(&Operation::update(1, 2, "XYZ", "a").with_vector(seen), 3)
            .unwrap();
        assert_eq!(state.content(), "cXYZfgh");

        let seen: VectorClock = [("a", 3u64)].into_iter().collect();
        state
            .apply(&Operation::move_span(5, 2, 0, "a").with_vector(seen), 4)
            .unwrap();
        assert_eq!(state.content(), "ghcXYZf");

        assert_eq!(state.version(), 4);
        assert_eq!(state.vector().get("a"), 4);
        assert_eq!(state.updated_at(), 4);
    }

    #[test]
    fn test_move_forward() {
        let mut state = doc("abcdef");
        state.apply(&Operation::move_span(0, 2, 4, "a"), 1).unwrap();
        assert_eq!(state.content(), "cdabef");
    }

    #[test]
    fn test_multibyte_positions_are_chars() {
        let mut state = doc("héllo wörld");
        state.apply(&Operation::delete(1, 1, "a"), 1).unwrap();
        assert_eq!(state.content(), "hllo wörld");

        let seen: VectorClock = [("a", 1u64)].into_iter().collect();
        state
            .apply(&Operation::insert(10, "!", "b").with_vector(seen), 2)
            .unwrap();
        assert_eq!(state.content(), "hllo wörld!");
    }

    #[test]
    fn test_out_of_bounds_leaves_state_untouched() {
        let mut state = doc("Hello");
        let err = state.apply(&Operation::delete(100, 5, "a"), 1).unwrap_err();

        assert!(matches!(err, Error::InvalidOperation(_)));
        assert_eq!(state.content(), "Hello");
        assert_eq!(state.version(), 0);
        assert!(state.vector().is_empty());
        assert!(state.history().is_empty());
    }

    #[test]
    fn test_overflowing_span_rejected() {
        let mut state = doc("Hello");
        let err = state.apply(&Operation::delete(1, usize::MAX, "a"), 1).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[test]
    fn test_rejected_op_id_can_be_retried() {
        let mut state = doc("Hi");
        let op = Operation::insert(5, "x", "a").with_id("retry");
        assert!(state.apply(&op, 1).is_err());

        let fixed = Operation::insert(2, "x", "a").with_id("retry");
        assert!(state.apply(&fixed, 2).unwrap().is_applied());
        assert_eq!(state.content(), "Hix");
    }

    #[test]
    fn test_duplicate_is_noop() {
        let mut state = doc("Hello");
        let op = Operation::insert(5, "!", "a").with_id("op-1");

        assert!(state.apply(&op, 1).unwrap().is_applied());
        assert_eq!(state.apply(&op, 2).unwrap(), ApplyOutcome::Duplicate);
        assert_eq!(state.content(), "Hello!");
        assert_eq!(state.version(), 1);
    }

    #[test]
    fn test_history_keeps_original_operation() {
        let mut state = doc("Hello");
        state.apply(&Operation::insert(0, ">>", "a"), 1).unwrap();

        let op = Operation::insert(5, "!", "b");
        let outcome = state.apply(&op, 2).unwrap();

        match outcome {
            ApplyOutcome::Applied { version, edits } => {
                assert_eq!(version, 2);
                assert_eq!(
                    edits,
                    vec![Edit::Insert {
                        position: 7,
                        text: "!".into()
                    }]
                );
            }
            ApplyOutcome::Duplicate => panic!("expected apply"),
        }
        assert_eq!(state.history()[1], op);
        assert_eq!(state.content(), ">>Hello!");
    }

    fn clock(entries: &[(&str, u64)]) -> VectorClock {
        entries.iter().map(|&(a, c)| (a, c)).collect()
    }

    fn permutations(ops: &[Operation]) -> Vec<Vec<Operation>> {
        if ops.len() <= 1 {
            return vec![ops.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..ops.len() {
            let mut rest = ops.to_vec();
            let first = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, first.clone());
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn test_three_concurrent_inserts_converge_in_every_order() {
        let ops = vec![
            Operation::insert(0, "XXX", "alice").with_id("a").with_timestamp(1),
            Operation::insert(3, "Y", "bob").with_id("b").with_timestamp(2),
            Operation::insert(1, "Z", "carol").with_id("c").with_timestamp(3),
        ];

        for order in permutations(&ops) {
            let mut state = doc("abcd");
            for op in &order {
                state.apply(op, 1).unwrap();
            }
            let ids: Vec<_> = order.iter().map(|op| op.id.as_str()).collect();
            assert_eq!(state.content(), "XXXaZbcYd", "order {:?}", ids);
        }
    }

    #[test]
    fn test_mixed_concurrency_converges_in_every_order() {
        let ops = vec![
            Operation::insert(2, "12", "alice").with_id("a").with_timestamp(1),
            Operation::delete(1, 3, "bob").with_id("b").with_timestamp(2),
            Operation::update(3, 2, "Q", "carol").with_id("c").with_timestamp(3),
            Operation::move_span(0, 1, 6, "dave").with_id("d").with_timestamp(4),
        ];

        let mut results = Vec::new();
        for order in permutations(&ops) {
            let mut state = doc("abcdef");
            for op in &order {
                state.apply(op, 1).unwrap();
            }
            results.push(state.content().to_string());
        }

        assert_eq!(results.len(), 24);
        assert!(results.iter().all(|r| r == &results[0]), "{:?}", results);
    }

    #[test]
    fn test_op_resolved_in_its_own_context() {
        // A and B are concurrent; C has seen A but not B
        let a = Operation::insert(0, "X", "alice").with_id("a").with_timestamp(1);
        let b = Operation::insert(3, "Y", "bob").with_id("b").with_timestamp(2);
        let c = Operation::delete(3, 1, "carol")
            .with_id("c")
            .with_timestamp(3)
            .with_vector(clock(&[("alice", 1)]));

        for order in [[&a, &b, &c], [&b, &a, &c]] {
            let mut state = doc("abc");
            for op in order {
                state.apply(op, 1).unwrap();
            }
            assert_eq!(state.content(), "XabY");
        }
    }

    #[test]
    fn test_concurrent_updates_last_writer_wins() {
        let early = Operation::update(0, 5, "Howdy", "alice").with_id("a").with_timestamp(1);
        let late = Operation::update(0, 5, "Hi", "bob").with_id("b").with_timestamp(2);

        for order in [[&early, &late], [&late, &early]] {
            let mut state = doc("Hello world");
            for op in order {
                state.apply(op, 1).unwrap();
            }
            assert_eq!(state.content(), "Hi world");
            assert_eq!(state.conflicts().len(), 1);
            assert_eq!(state.conflicts()[0].winner_id.as_deref(), Some("b"));
        }
    }

    #[test]
    fn test_partially_overlapping_updates_converge() {
        let early = Operation::update(0, 5, "Howdy", "alice").with_id("a").with_timestamp(1);
        let late = Operation::update(3, 5, "P", "bob").with_id("b").with_timestamp(2);

        for order in [[&early, &late], [&late, &early]] {
            let mut state = doc("Hello world");
            for op in order {
                state.apply(op, 1).unwrap();
            }
            // Union of both spans is gone; only the later text survives
            assert_eq!(state.content(), "Prld");
        }
    }

    #[test]
    fn test_missing_dependencies_rejected() {
        let mut state = doc("abc");
        let early = Operation::insert(0, "x", "alice").with_id("a1");
        let later = Operation::insert(1, "y", "bob")
            .with_id("b1")
            .with_vector(clock(&[("alice", 1)]));

        let err = state.apply(&later, 1).unwrap_err();
        assert!(matches!(err, Error::MissingDependencies { .. }));
        assert!(err.is_retryable());
        assert_eq!(state.version(), 0);

        state.apply(&early, 2).unwrap();
        state.apply(&later, 3).unwrap();
        assert_eq!(state.content(), "xyabc");
    }

    #[test]
    fn test_conflicts_recorded_with_severity() {
        let mut state = doc("abcdef");
        state
            .apply(&Operation::delete(0, 3, "alice").with_id("d1"), 1)
            .unwrap();
        state
            .apply(&Operation::delete(2, 2, "bob").with_id("d2"), 2)
            .unwrap();

        assert_eq!(state.content(), "ef");
        let record = &state.conflicts()[0];
        assert_eq!(record.operation_id, "d2");
        assert_eq!(record.other_operation_id, "d1");
        assert_eq!(record.kind, ConflictKind::OverlappingDelete);
        assert_eq!(record.severity, ConflictSeverity::High);
        assert_eq!(record.detected_at, 2);

        let id = DocumentId::new("plan:c").unwrap();
        assert_eq!(state.stats(&id, 2, 30_000).conflicts, 1);
    }

    #[test]
    fn test_revert_to_version() {
        let id = DocumentId::new("plan:v").unwrap();
        let mut state = doc("Hello world");
        let v1 = state.create_version("alice", "first draft", 1);
        assert_eq!(v1.number, 1);
        assert_eq!(v1.document_version, 0);

        state.apply(&Operation::update(0, 5, "Howdy", "bob"), 2).unwrap();
        let seen = state.vector().clone();
        state
            .apply(&Operation::insert(11, "!", "bob").with_vector(seen), 3)
            .unwrap();
        assert_eq!(state.content(), "Howdy world!");

        let op = state.revert_operation(&id, &v1.id, "carol", 4).unwrap().unwrap();
        assert_eq!(op.kind, OperationKind::Update);
        assert_eq!(op.metadata.labels["revert_to"], v1.id);

        state.apply(&op, 4).unwrap();
        assert_eq!(state.content(), "Hello world");
        assert_eq!(state.version(), 3);

        assert!(state.revert_operation(&id, &v1.id, "carol", 5).unwrap().is_none());
        assert!(matches!(
            state.revert_operation(&id, "nope", "carol", 5),
            Err(Error::VersionNotFound { .. })
        ));
        assert_eq!(state.versions().len(), 1);
    }

    #[test]
    fn test_stats_counts() {
        let mut state = doc("abc");
        state.apply(&Operation::insert(0, "x", "a"), 1).unwrap();
        state.apply(&Operation::delete(0, 1, "b"), 2).unwrap();
        let seen: VectorClock = [("a", 1u64)].into_iter().collect();
        state
            .apply(&Operation::insert(0, "y", "a").with_vector(seen), 3)
            .unwrap();

        let id = DocumentId::new("plan:stats").unwrap();
        let stats = state.stats(&id, 3, 30_000);
        assert_eq!(stats.history_length, 3);
        assert_eq!(stats.operations_by_kind[&OperationKind::Insert], 2);
        assert_eq!(stats.operations_by_author["b"], 1);
        assert_eq!(stats.content_length, state.content().chars().count());
    }

    #[test]
    fn test_view_serializes_without_lock_fields() {
        let document = Document::new(DocumentId::new("plan:1").unwrap(), "abc", 7);
        let view = document.read(None).unwrap().view(document.id());
        let json = serde_json::to_value(&view).unwrap();

        let keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        assert_eq!(
            keys,
            vec!["content", "created_at", "history", "id", "updated_at", "users", "vector", "version"]
        );
    }

    #[test]
    fn test_write_timeout_reports_busy() {
        let document = Document::new(DocumentId::new("plan:busy").unwrap(), "", 0);
        let _held = document.write(None).unwrap();

        let err = document.write(Some(Duration::from_millis(10))).unwrap_err();
        assert!(err.is_retryable());
    }
}
