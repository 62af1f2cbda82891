//! Operational transformation.
//!
//! Every operation is reduced to at most two primitive edits expressed in
//! its own coordinates, applied in sequence:
//!
//! | kind   | primitives                                   |
//! |--------|----------------------------------------------|
//! | insert | `Ins(p, len(content))`                       |
//! | delete | `Del(p, n)`                                  |
//! | update | `Del(p, n)`, `Ins(p, len(content))`          |
//! | move   | `Del(p, n)`, `Ins(t', n)`                    |
//!
//! where `t' = t` when the move target lies before the span and `t - n`
//! otherwise. Transforming `op` against `against` maps each of `op`'s
//! anchors (insert point, span endpoints, move target) through those
//! primitives.
//!
//! Two updates whose spans overlap are last-writer-wins in tie-break order:
//! the winner's span grows over the loser's text, the loser degrades to a
//! delete of whatever is left of its span.
//!
//! A span is a single range, so a delete straddling concurrently inserted
//! text grows to cover it. Documents do not go through this path; they keep
//! such text (see `sequence`).

use crate::operation::{Operation, OperationKind};
use std::cmp::Ordering;

/// Primitive edit in the coordinates of the content it applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Primitive {
    Ins { at: usize, len: usize },
    Del { at: usize, len: usize },
}

fn primitives(op: &Operation) -> Vec<Primitive> {
    match op.kind {
        OperationKind::Insert => vec![Primitive::Ins {
            at: op.position,
            len: op.content_len(),
        }],
        OperationKind::Delete => vec![Primitive::Del {
            at: op.position,
            len: op.length,
        }],
        OperationKind::Update => vec![
            Primitive::Del {
                at: op.position,
                len: op.length,
            },
            Primitive::Ins {
                at: op.position,
                len: op.content_len(),
            },
        ],
        OperationKind::Move => {
            let target = op.metadata.move_target.unwrap_or(op.position);
            let at = if target <= op.position {
                target
            } else {
                target.saturating_sub(op.length)
            };
            vec![
                Primitive::Del {
                    at: op.position,
                    len: op.length,
                },
                Primitive::Ins { at, len: op.length },
            ]
        }
    }
}

/// Map an insertion point. `yields` says whether a concurrent insert at the
/// same point goes first.
fn map_point(point: usize, prim: Primitive, yields: bool) -> usize {
    match prim {
        Primitive::Ins { at, len } => {
            if at < point || (at == point && yields) {
                point + len
            } else {
                point
            }
        }
        Primitive::Del { at, len } => shrink(point, at, len),
    }
}

/// Map a half-open span `[start, end)`.
fn map_span(start: usize, end: usize, prim: Primitive) -> (usize, usize) {
    match prim {
        Primitive::Ins { at, len } => {
            if at <= start {
                (start + len, end + len)
            } else if at < end {
                (start, end + len)
            } else {
                (start, end)
            }
        }
        Primitive::Del { at, len } => (shrink(start, at, len), shrink(end, at, len)),
    }
}

/// `x` minus the part of `[at, at + len)` lying before it
fn shrink(x: usize, at: usize, len: usize) -> usize {
    if at < x {
        x - len.min(x - at)
    } else {
        x
    }
}

/// Map a span for an update that wins over `against`: text inserted
/// anywhere within or at the edges of the span is taken over.
fn map_span_covering(start: usize, end: usize, prim: Primitive) -> (usize, usize) {
    match prim {
        Primitive::Ins { at, len } if start <= at && at <= end => (start, end + len),
        prim => map_span(start, end, prim),
    }
}

fn spans_overlap(a: &Operation, b: &Operation) -> bool {
    a.position < b.position.saturating_add(b.length) && b.position < a.position.saturating_add(a.length)
}

/// Rewrite `op` so it applies after `against`, which `op`'s author had not
/// seen. Pure: neither argument is modified and the ID is preserved.
pub fn transform(op: &Operation, against: &Operation) -> Operation {
    let mut out = op.clone();
    let yields = against.tie_break_cmp(op) == Ordering::Less;
    let rival = op.kind == OperationKind::Update
        && against.kind == OperationKind::Update
        && spans_overlap(op, against);

    for prim in primitives(against) {
        match out.kind {
            OperationKind::Insert => {
                out.position = map_point(out.position, prim, yields);
            }
            OperationKind::Delete | OperationKind::Update | OperationKind::Move => {
                let end = out.position.saturating_add(out.length);
                let (start, end) = if rival && yields {
                    map_span_covering(out.position, end, prim)
                } else {
                    map_span(out.position, end, prim)
                };
                out.position = start;
                out.length = end - start;

                if let Some(target) = out.metadata.move_target {
                    out.metadata.move_target = Some(map_point(target, prim, yields));
                }
            }
        }
    }

    if rival && !yields {
        out.kind = OperationKind::Delete;
        out.content.clear();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_after_earlier_insert_shifts() {
        let op = Operation::insert(5, "X", "alice");
        let prior = Operation::insert(2, "abc", "bob");

        assert_eq!(transform(&op, &prior).position, 8);
    }

    #[test]
    fn test_insert_before_later_insert_stays() {
        let op = Operation::insert(0, "Y", "bob");
        let prior = Operation::insert(5, "X", "alice");

        assert_eq!(transform(&op, &prior).position, 0);
    }

    #[test]
    fn test_same_position_insert_tie_break() {
        let early = Operation::insert(3, "A", "alice").with_timestamp(100);
        let late = Operation::insert(3, "B", "bob").with_timestamp(200);

        // The earlier insert keeps its place on both sides.
        assert_eq!(transform(&late, &early).position, 4);
        assert_eq!(transform(&early, &late).position, 3);
    }

    #[test]
    fn test_same_timestamp_breaks_on_author() {
        let a = Operation::insert(0, "A", "alice").with_timestamp(5);
        let b = Operation::insert(0, "B", "bob").with_timestamp(5);

        assert_eq!(transform(&b, &a).position, 1);
        assert_eq!(transform(&a, &b).position, 0);
    }

    #[test]
    fn test_insert_after_delete_shifts_back() {
        let op = Operation::insert(8, "X", "alice");
        let prior = Operation::delete(2, 3, "bob");

        assert_eq!(transform(&op, &prior).position, 5);
    }

    #[test]
    fn test_insert_inside_deleted_range_floors_at_start() {
        let op = Operation::insert(4, "X", "alice");
        let prior = Operation::delete(2, 5, "bob");

        assert_eq!(transform(&op, &prior).position, 2);
    }

    #[test]
    fn test_insert_at_delete_start_unchanged() {
        let op = Operation::insert(2, "X", "alice");
        let prior = Operation::delete(2, 5, "bob");

        assert_eq!(transform(&op, &prior).position, 2);
    }

    #[test]
    fn test_delete_after_insert_shifts() {
        let op = Operation::delete(4, 2, "alice");
        let prior = Operation::insert(4, "xyz", "bob");

        let out = transform(&op, &prior);
        assert_eq!((out.position, out.length), (7, 2));
    }

    #[test]
    fn test_delete_spanning_insert_grows() {
        let op = Operation::delete(1, 4, "alice");
        let prior = Operation::insert(3, "xy", "bob");

        let out = transform(&op, &prior);
        assert_eq!((out.position, out.length), (1, 6));
    }

    #[test]
    fn test_overlapping_deletes_union() {
        // "abcdef": prior removes "abc", op wanted "cd"; only "d" remains
        let prior = Operation::delete(0, 3, "alice");
        let op = Operation::delete(2, 2, "bob");

        let out = transform(&op, &prior);
        assert_eq!((out.position, out.length), (0, 1));
    }

    #[test]
    fn test_covered_delete_becomes_noop() {
        let prior = Operation::delete(1, 6, "alice");
        let op = Operation::delete(2, 3, "bob");

        let out = transform(&op, &prior);
        assert_eq!((out.position, out.length), (1, 0));
    }

    #[test]
    fn test_delete_before_other_delete_unchanged() {
        let prior = Operation::delete(6, 2, "alice");
        let op = Operation::delete(1, 3, "bob");

        let out = transform(&op, &prior);
        assert_eq!((out.position, out.length), (1, 3));
    }

    #[test]
    fn test_insert_after_update_shifts_by_net_change() {
        let prior = Operation::update(0, 2, "wxyz", "alice");
        let op = Operation::insert(5, "!", "bob");

        assert_eq!(transform(&op, &prior).position, 7);
    }

    #[test]
    fn test_insert_after_move_backwards() {
        // move "cd" of "abcdefgh" to the front: "cdabefgh"
        let prior = Operation::move_span(2, 2, 0, "alice");
        // bob inserts before "e"; "e" is still at index 4 after the move
        let op = Operation::insert(4, "!", "bob");

        assert_eq!(transform(&op, &prior).position, 4);

        // an insert at "b" follows it forward by two
        let op = Operation::insert(1, "?", "bob");
        assert_eq!(transform(&op, &prior).position, 3);
    }

    #[test]
    fn test_move_target_tracks_inserts() {
        let prior = Operation::insert(0, "zz", "alice");
        let op = Operation::move_span(3, 2, 8, "bob");

        let out = transform(&op, &prior);
        assert_eq!((out.position, out.length), (5, 2));
        assert_eq!(out.metadata.move_target, Some(10));
    }

    #[test]
    fn test_transform_is_pure() {
        let op = Operation::insert(5, "X", "alice").with_id("keep-me");
        let prior = Operation::insert(0, "abc", "bob");

        let out = transform(&op, &prior);
        assert_eq!(out.id, "keep-me");
        assert_eq!(op.position, 5);
        assert_eq!(prior.position, 0);
    }

    #[test]
    fn test_update_over_same_span_last_writer_wins() {
        // "Hello world"
        let early = Operation::update(0, 5, "Howdy", "alice").with_timestamp(1);
        let late = Operation::update(0, 5, "Hi", "bob").with_timestamp(2);

        // late replaces the early text outright
        let out = transform(&late, &early);
        assert_eq!(out.kind, OperationKind::Update);
        assert_eq!((out.position, out.length, out.content.as_str()), (0, 5, "Hi"));

        // early keeps nothing and leaves "Hi" alone
        let out = transform(&early, &late);
        assert_eq!(out.kind, OperationKind::Delete);
        assert_eq!((out.position, out.length), (2, 0));
        assert!(out.content.is_empty());
    }

    #[test]
    fn test_update_partial_overlap_last_writer_wins() {
        // "Hello world": both sides end at "Prld"
        let early = Operation::update(0, 5, "Howdy", "alice").with_timestamp(1);
        let late = Operation::update(3, 5, "P", "bob").with_timestamp(2);

        // after early: "Howdy world"; late takes "Howdy wo"
        let out = transform(&late, &early);
        assert_eq!((out.position, out.length), (0, 8));

        // after late: "HelPrld"; early removes "Hel"
        let out = transform(&early, &late);
        assert_eq!(out.kind, OperationKind::Delete);
        assert_eq!((out.position, out.length), (0, 3));
    }

    #[test]
    fn test_disjoint_updates_do_not_compete() {
        let a = Operation::update(0, 2, "xy", "alice").with_timestamp(1);
        let b = Operation::update(5, 2, "z", "bob").with_timestamp(2);

        let out = transform(&a, &b);
        assert_eq!(out.kind, OperationKind::Update);
        assert_eq!((out.position, out.length), (0, 2));
    }
}
