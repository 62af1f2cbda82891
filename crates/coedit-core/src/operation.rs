//! Edit operations and their metadata

use crate::clock::VectorClock;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current metadata schema version
pub const METADATA_SCHEMA_VERSION: u32 = 1;

/// Milliseconds since the Unix epoch
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Kind of edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Insert,
    Delete,
    Update,
    Move,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Insert => write!(f, "insert"),
            OperationKind::Delete => write!(f, "delete"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Move => write!(f, "move"),
        }
    }
}

impl std::str::FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "insert" | "ins" => Ok(OperationKind::Insert),
            "delete" | "del" => Ok(OperationKind::Delete),
            "update" | "replace" => Ok(OperationKind::Update),
            "move" => Ok(OperationKind::Move),
            _ => Err(Error::InvalidOperation(format!("Unknown operation kind: {}", s))),
        }
    }
}

/// Typed extension data carried by an operation.
///
/// Unknown fields are rejected so that a newer client cannot smuggle
/// untyped data past an older server; bump `schema_version` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OperationMetadata {
    pub schema_version: u32,
    /// Floor-plan element the edit annotates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    /// Drawing layer of the annotated element
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    /// Destination index for `Move`, in content coordinates before removal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub move_target: Option<usize>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl Default for OperationMetadata {
    fn default() -> Self {
        Self {
            schema_version: METADATA_SCHEMA_VERSION,
            element_id: None,
            layer: None,
            move_target: None,
            labels: BTreeMap::new(),
        }
    }
}

/// A single edit, as issued by its author.
///
/// `position` and `length` count characters in the content the author
/// observed. `vector` is the author's causal knowledge when issuing the
/// edit and does not include the edit itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub position: usize,
    #[serde(default)]
    pub length: usize,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "user_id")]
    pub author_id: String,
    pub timestamp: u64,
    #[serde(default)]
    pub vector: VectorClock,
    #[serde(default)]
    pub metadata: OperationMetadata,
}

impl Operation {
    fn new(kind: OperationKind, position: usize, length: usize, content: String, author: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            position,
            length,
            content,
            author_id: author,
            timestamp: now_millis(),
            vector: VectorClock::new(),
            metadata: OperationMetadata::default(),
        }
    }

    /// Insert `content` before character `position`
    pub fn insert(position: usize, content: impl Into<String>, author: impl Into<String>) -> Self {
        let content = content.into();
        let length = content.chars().count();
        Self::new(OperationKind::Insert, position, length, content, author.into())
    }

    /// Remove `length` characters starting at `position`
    pub fn delete(position: usize, length: usize, author: impl Into<String>) -> Self {
        Self::new(OperationKind::Delete, position, length, String::new(), author.into())
    }

    /// Replace `length` characters starting at `position` with `content`
    pub fn update(
        position: usize,
        length: usize,
        content: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self::new(OperationKind::Update, position, length, content.into(), author.into())
    }

    /// Relocate `length` characters starting at `position` to `target`
    pub fn move_span(position: usize, length: usize, target: usize, author: impl Into<String>) -> Self {
        let mut op = Self::new(OperationKind::Move, position, length, String::new(), author.into());
        op.metadata.move_target = Some(target);
        op
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_vector(mut self, vector: VectorClock) -> Self {
        self.vector = vector;
        self
    }

    pub fn with_metadata(mut self, metadata: OperationMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Number of characters this operation inserts
    pub fn content_len(&self) -> usize {
        self.content.chars().count()
    }

    /// Number of characters this operation covers in the observed content.
    /// For inserts this is the inserted length.
    pub fn span_len(&self) -> usize {
        match self.kind {
            OperationKind::Insert => self.content_len(),
            _ => self.length,
        }
    }

    /// The clock identifying this operation as an event: the issuing
    /// author's knowledge plus the operation itself.
    pub fn event_clock(&self) -> VectorClock {
        let mut clock = self.vector.clone();
        let own = clock.get(&self.author_id);
        clock.set(self.author_id.clone(), own + 1);
        clock
    }

    /// True when neither operation was known to the other's author.
    pub fn is_concurrent_with(&self, other: &Operation) -> bool {
        let mine = self.event_clock();
        let theirs = other.event_clock();
        !mine.happened_before(&theirs) && !theirs.happened_before(&mine)
    }

    /// Deterministic total order used to break position ties between
    /// concurrent operations: `(timestamp, author_id, id)` ascending.
    pub fn tie_break_cmp(&self, other: &Operation) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.author_id.cmp(&other.author_id))
            .then_with(|| self.id.cmp(&other.id))
    }

    /// Shape checks that do not depend on document content
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::InvalidOperation("Operation ID cannot be empty".into()));
        }
        if self.author_id.is_empty() {
            return Err(Error::InvalidOperation("Author ID cannot be empty".into()));
        }

        match self.kind {
            OperationKind::Insert => {
                if self.content.is_empty() {
                    return Err(Error::InvalidOperation("Insert requires content".into()));
                }
            }
            OperationKind::Delete | OperationKind::Update => {
                if self.length == 0 {
                    return Err(Error::InvalidOperation(format!(
                        "{} requires a positive length",
                        self.kind
                    )));
                }
            }
            OperationKind::Move => {
                if self.length == 0 {
                    return Err(Error::InvalidOperation("Move requires a positive length".into()));
                }
                let target = self.metadata.move_target.ok_or_else(|| {
                    Error::InvalidOperation("Move requires metadata.move_target".into())
                })?;
                if target > self.position && target < self.position.saturating_add(self.length) {
                    return Err(Error::InvalidOperation(format!(
                        "Move target {} lies inside the moved span",
                        target
                    )));
                }
            }
        }

        if self.metadata.schema_version > METADATA_SCHEMA_VERSION {
            return Err(Error::InvalidOperation(format!(
                "Unsupported metadata schema version {}",
                self.metadata.schema_version
            )));
        }

        Ok(())
    }

    /// Decode one operation from its JSON wire form and check its shape
    pub fn from_json(json: &str) -> Result<Self> {
        let op: Operation = serde_json::from_str(json)?;
        op.validate()?;
        Ok(op)
    }
}
