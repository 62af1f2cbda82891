//! coedit core - collaborative document conflict resolution
//!
//! This crate provides:
//! - Vector clocks for causality tracking between authors
//! - Operational transformation of concurrent text edits
//! - A character sequence that integrates concurrent edits in any order
//! - Documents with ordered, de-duplicated operation history, conflict
//!   records and named versions
//! - Presence tracking (cursors, selections, liveness)
//! - `ConflictResolutionService`, the registry that ties it together

pub mod clock;
pub mod config;
pub mod conflict;
pub mod document;
pub mod error;
pub mod operation;
pub mod presence;
pub mod sequence;
pub mod service;
pub mod transform;

pub use clock::{ClockOrdering, VectorClock};
pub use config::ServiceConfig;
pub use conflict::{ConflictKind, ConflictRecord, ConflictResolution, ConflictSeverity};
pub use document::{
    ApplyOutcome, Document, DocumentId, DocumentSnapshot, DocumentStats, DocumentView, ExportPayload,
    VersionInfo,
};
pub use error::{Error, Result};
pub use operation::{Operation, OperationKind, OperationMetadata};
pub use presence::{Selection, UserState};
pub use sequence::{apply_edits, Edit};
pub use service::{matches_pattern, ConflictResolutionService, DocumentEvent, ServiceStats};
