//! Character sequence behind a document's text.
//!
//! Every character ever inserted stays in the sequence; deletes only mark
//! it. An operation is resolved against its author's view of the sequence:
//! the characters inserted by operations the author had seen, minus those
//! such operations removed. Positions therefore always address what the
//! author was looking at, whatever arrived in between.
//!
//! New text is anchored after the character on its left in the author's
//! view. Concurrent inserts on the same anchor are ordered by rank, and an
//! operation's rank is always above the rank of everything it had seen, so
//! integrating the same operations in any causal order yields the same
//! sequence.

use crate::clock::VectorClock;
use crate::conflict::ConflictKind;
use crate::error::{Error, Result};
use crate::operation::{Operation, OperationKind};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Splice step turning the previous content into the current one.
///
/// Edits apply in order; each position counts characters in the content
/// as left by the preceding edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Edit {
    Insert { position: usize, text: String },
    Delete { position: usize, length: usize },
}

/// Apply `edits` to a copy of `content`, as a replica at the previous
/// version would. Returns `None` if an edit does not fit.
pub fn apply_edits(content: &str, edits: &[Edit]) -> Option<String> {
    let mut chars: Vec<char> = content.chars().collect();
    for edit in edits {
        match edit {
            Edit::Insert { position, text } => {
                if *position > chars.len() {
                    return None;
                }
                chars.splice(*position..*position, text.chars());
            }
            Edit::Delete { position, length } => {
                let end = position.checked_add(*length).filter(|&end| end <= chars.len())?;
                chars.drain(*position..end);
            }
        }
    }
    Some(chars.into_iter().collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    /// Part of the content the document was created with
    Initial,
    /// Inserted by the operation at this history index
    Op(usize),
}

#[derive(Debug, Clone)]
struct Atom {
    ch: char,
    source: Source,
    /// Operations whose span removed this character
    deleted_by: Vec<usize>,
    /// Updates that won a last-writer-wins decision against this text
    superseded_by: Vec<usize>,
}

impl Atom {
    fn new(ch: char, source: Source) -> Self {
        Self {
            ch,
            source,
            deleted_by: Vec::new(),
            superseded_by: Vec::new(),
        }
    }

    fn is_visible(&self) -> bool {
        self.deleted_by.is_empty() && self.superseded_by.is_empty()
    }

    /// Visible to an author who had seen exactly the operations in `seen`
    fn is_visible_to(&self, seen: &[bool]) -> bool {
        let inserted = match self.source {
            Source::Initial => true,
            Source::Op(idx) => seen[idx],
        };
        inserted
            && !self.deleted_by.iter().any(|&d| seen[d])
            && !self.superseded_by.iter().any(|&d| seen[d])
    }

    /// Visible before operation `me` was integrated
    fn was_visible(&self, me: usize) -> bool {
        self.source != Source::Op(me)
            && self.deleted_by.iter().all(|&d| d == me)
            && self.superseded_by.iter().all(|&d| d == me)
    }
}

/// Causal position of an integrated operation
#[derive(Debug, Clone)]
struct Entry {
    event: VectorClock,
    /// Sum of the event clock; strictly grows along causality
    rank: u64,
}

/// Effect of one integrated operation
#[derive(Debug, Clone, Default)]
pub(crate) struct Integration {
    pub edits: Vec<Edit>,
    /// Concurrent operations (history indices) this one collided with
    pub conflicts: Vec<(usize, ConflictKind)>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Sequence {
    atoms: Vec<Atom>,
    entries: Vec<Entry>,
}

fn rank_of(event: &VectorClock) -> u64 {
    event.iter().map(|(_, count)| count).sum()
}

/// Whether text from `other` sorts before text from `op` on a shared anchor
fn outranks(other: &Operation, other_rank: u64, op: &Operation, rank: u64) -> bool {
    match other_rank.cmp(&rank) {
        Ordering::Equal => other.tie_break_cmp(op) == Ordering::Less,
        ord => ord == Ordering::Greater,
    }
}

fn out_of_bounds(op: &Operation, len: usize) -> Error {
    Error::InvalidOperation(format!(
        "{} at {}+{} exceeds content length {}",
        op.kind, op.position, op.length, len
    ))
}

fn note(conflicts: &mut Vec<(usize, ConflictKind)>, other: usize, kind: ConflictKind) {
    if !conflicts.iter().any(|&(o, _)| o == other) {
        conflicts.push((other, kind));
    }
}

impl Sequence {
    pub fn new(content: &str) -> Self {
        Self {
            atoms: content.chars().map(|ch| Atom::new(ch, Source::Initial)).collect(),
            entries: Vec::new(),
        }
    }

    /// Current visible text
    pub fn text(&self) -> String {
        self.atoms.iter().filter(|a| a.is_visible()).map(|a| a.ch).collect()
    }

    /// Integrate `op`, which becomes history entry `history.len()`.
    ///
    /// `history` must hold every operation integrated so far, in order.
    /// On error nothing is modified.
    pub fn integrate(&mut self, history: &[Operation], op: &Operation) -> Result<Integration> {
        let me = self.entries.len();
        let event = op.event_clock();
        let rank = rank_of(&event);

        let seen: Vec<bool> = self
            .entries
            .iter()
            .map(|entry| entry.event.happened_before(&event))
            .collect();
        let view: Vec<usize> = (0..self.atoms.len())
            .filter(|&i| self.atoms[i].is_visible_to(&seen))
            .collect();
        let len = view.len();

        // Span removed from the author's view, and where new text goes
        let (removed, insert_at) = match op.kind {
            OperationKind::Insert => {
                if op.position > len {
                    return Err(out_of_bounds(op, len));
                }
                (0..0, Some(op.position))
            }
            OperationKind::Delete | OperationKind::Update | OperationKind::Move => {
                let end = op
                    .position
                    .checked_add(op.length)
                    .filter(|&end| end <= len)
                    .ok_or_else(|| out_of_bounds(op, len))?;
                let insert_at = match op.kind {
                    OperationKind::Delete => None,
                    OperationKind::Move => {
                        let target = op.metadata.move_target.ok_or_else(|| {
                            Error::InvalidOperation("Move requires metadata.move_target".into())
                        })?;
                        if target > len {
                            return Err(Error::InvalidOperation(format!(
                                "Move target {} exceeds content length {}",
                                target, len
                            )));
                        }
                        Some(target)
                    }
                    _ => Some(op.position),
                };
                (op.position..end, insert_at)
            }
        };

        let text: Vec<char> = match op.kind {
            OperationKind::Move => removed.clone().map(|i| self.atoms[view[i]].ch).collect(),
            _ => op.content.chars().collect(),
        };

        let mut conflicts = Vec::new();
        let mut rivals = Vec::new();

        for &idx in &view[removed.clone()] {
            for &other in &self.atoms[idx].deleted_by {
                if seen[other] {
                    continue;
                }
                if op.kind == OperationKind::Update && history[other].kind == OperationKind::Update {
                    if !rivals.contains(&other) {
                        rivals.push(other);
                    }
                    note(&mut conflicts, other, ConflictKind::ConcurrentUpdate);
                } else {
                    note(&mut conflicts, other, ConflictKind::OverlappingDelete);
                }
            }
        }

        let placement = insert_at.map(|at| {
            let start = at.checked_sub(1).map_or(0, |left| view[left] + 1);
            let right = view.get(at).copied().unwrap_or(self.atoms.len());
            (start, right)
        });

        // Nothing can fail past this point
        for &idx in &view[removed] {
            self.atoms[idx].deleted_by.push(me);
        }

        if let Some((start, right)) = placement {
            for atom in &self.atoms[start..right] {
                if let Source::Op(other) = atom.source {
                    if !seen[other] {
                        note(&mut conflicts, other, ConflictKind::SamePositionInsert);
                    }
                }
            }

            let mut at = start;
            while let Some(Atom {
                source: Source::Op(other),
                ..
            }) = self.atoms.get(at)
            {
                if !outranks(&history[*other], self.entries[*other].rank, op, rank) {
                    break;
                }
                at += 1;
            }

            self.atoms.splice(at..at, text.iter().map(|&ch| Atom::new(ch, Source::Op(me))));
        }

        for &rival in &rivals {
            let (winner, loser) = if op.tie_break_cmp(&history[rival]) == Ordering::Greater {
                (me, rival)
            } else {
                (rival, me)
            };
            for atom in self.atoms.iter_mut().filter(|a| a.source == Source::Op(loser)) {
                atom.superseded_by.push(winner);
            }
        }

        self.entries.push(Entry { event, rank });

        Ok(Integration {
            edits: self.edits_of(me),
            conflicts,
        })
    }

    /// Splice steps from the content before `me` to the content now
    fn edits_of(&self, me: usize) -> Vec<Edit> {
        let mut edits = Vec::new();
        let mut pending: Option<Edit> = None;
        let mut pos = 0;

        for atom in &self.atoms {
            match (atom.was_visible(me), atom.is_visible()) {
                (true, true) => {
                    edits.extend(pending.take());
                    pos += 1;
                }
                (true, false) => match &mut pending {
                    Some(Edit::Delete { position, length }) if *position == pos => *length += 1,
                    _ => {
                        edits.extend(pending.take());
                        pending = Some(Edit::Delete {
                            position: pos,
                            length: 1,
                        });
                    }
                },
                (false, true) => {
                    match &mut pending {
                        Some(Edit::Insert { position, text }) if *position + text.chars().count() == pos => {
                            text.push(atom.ch)
                        }
                        _ => {
                            edits.extend(pending.take());
                            pending = Some(Edit::Insert {
                                position: pos,
                                text: atom.ch.to_string(),
                            });
                        }
                    }
                    pos += 1;
                }
                (false, false) => {}
            }
        }

        edits.extend(pending);
        edits
    }
}
