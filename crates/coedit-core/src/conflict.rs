//! Records of concurrent operations that touched the same text

use crate::operation::{Operation, OperationKind};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// How two concurrent operations collided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Both placed text on the same anchor
    SamePositionInsert,
    /// Both removed some of the same characters
    OverlappingDelete,
    /// Both replaced some of the same characters
    ConcurrentUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
}

impl ConflictSeverity {
    /// Deletes lose text, moves relocate it; anything else only interleaves.
    pub fn of(a: &Operation, b: &Operation) -> Self {
        let kinds = [a.kind, b.kind];
        if kinds.contains(&OperationKind::Delete) {
            ConflictSeverity::High
        } else if kinds.contains(&OperationKind::Move) {
            ConflictSeverity::Medium
        } else {
            ConflictSeverity::Low
        }
    }
}

/// How the engine settled a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Text ordered by rank, then `(timestamp, user_id, id)`
    TieBreak,
    /// Every character either side removed is gone
    Union,
    /// The later update's text is kept, the other hidden
    LastWriterWins,
}

impl From<ConflictKind> for ConflictResolution {
    fn from(kind: ConflictKind) -> Self {
        match kind {
            ConflictKind::SamePositionInsert => ConflictResolution::TieBreak,
            ConflictKind::OverlappingDelete => ConflictResolution::Union,
            ConflictKind::ConcurrentUpdate => ConflictResolution::LastWriterWins,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// The operation being applied when the conflict was found
    pub operation_id: String,
    /// The already applied concurrent operation
    pub other_operation_id: String,
    pub kind: ConflictKind,
    pub severity: ConflictSeverity,
    pub resolution: ConflictResolution,
    /// Operation whose text survived, for last-writer-wins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<String>,
    /// Milliseconds since the Unix epoch
    pub detected_at: u64,
}

impl ConflictRecord {
    pub fn new(op: &Operation, other: &Operation, kind: ConflictKind, detected_at: u64) -> Self {
        let winner_id = (kind == ConflictKind::ConcurrentUpdate).then(|| {
            match op.tie_break_cmp(other) {
                Ordering::Greater => op.id.clone(),
                _ => other.id.clone(),
            }
        });

        Self {
            operation_id: op.id.clone(),
            other_operation_id: other.id.clone(),
            kind,
            severity: ConflictSeverity::of(op, other),
            resolution: kind.into(),
            winner_id,
            detected_at,
        }
    }

    /// Every conflict the engine records is settled without intervention
    pub fn auto_resolved(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ranks_delete_over_move() {
        let insert = Operation::insert(0, "a", "alice");
        let delete = Operation::delete(0, 1, "bob");
        let moved = Operation::move_span(0, 1, 3, "carol");

        assert_eq!(ConflictSeverity::of(&insert, &delete), ConflictSeverity::High);
        assert_eq!(ConflictSeverity::of(&moved, &delete), ConflictSeverity::High);
        assert_eq!(ConflictSeverity::of(&insert, &moved), ConflictSeverity::Medium);
        assert_eq!(ConflictSeverity::of(&insert, &insert), ConflictSeverity::Low);
    }

    #[test]
    fn test_update_record_names_winner() {
        let early = Operation::update(0, 5, "Howdy", "alice").with_id("a").with_timestamp(10);
        let late = Operation::update(0, 5, "Hi", "bob").with_id("b").with_timestamp(20);

        let record = ConflictRecord::new(&early, &late, ConflictKind::ConcurrentUpdate, 1);
        assert_eq!(record.winner_id.as_deref(), Some("b"));
        assert_eq!(record.resolution, ConflictResolution::LastWriterWins);
        assert_eq!(record.severity, ConflictSeverity::Low);

        let record = ConflictRecord::new(&late, &early, ConflictKind::ConcurrentUpdate, 1);
        assert_eq!(record.winner_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_insert_record_has_no_winner() {
        let a = Operation::insert(0, "a", "alice");
        let b = Operation::insert(0, "b", "bob");

        let record = ConflictRecord::new(&a, &b, ConflictKind::SamePositionInsert, 1);
        assert_eq!(record.winner_id, None);
        assert_eq!(record.resolution, ConflictResolution::TieBreak);
        assert!(record.auto_resolved());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "same_position_insert");
        assert!(json.get("winner_id").is_none());
    }
}
