//! Presence tracking: cursors, selections and liveness per document.
//!
//! A `Presence` lives inside each document's state and is guarded by the
//! same lock; nothing here is historized.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default palette for collaborator colors
pub const DEFAULT_PALETTE: [&str; 8] = [
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4", "#42d4f4", "#f032e6", "#9a6324",
];

/// Character range selected by a user, `start` inclusive, `end` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
}

impl Selection {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Ephemeral per-user state within one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserState {
    pub user_id: String,
    pub username: String,
    pub cursor: usize,
    pub selection: Option<Selection>,
    pub last_seen_at: u64,
    pub color: String,
}

/// 32-bit FNV-1a. Stable across processes and toolchains, unlike `std`'s
/// `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Color for `user_id`; the same user always gets the same entry.
/// `palette` must be non-empty, which `ServiceConfig::validate` enforces.
pub(crate) fn color_for(user_id: &str, palette: &[String]) -> String {
    palette[fnv1a(user_id.as_bytes()) as usize % palette.len()].clone()
}

/// Users connected to one document, keyed by user ID
#[derive(Debug, Clone, Default)]
pub struct Presence {
    users: BTreeMap<String, UserState>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a user. Returns true when the user was not present.
    pub fn join(&mut self, user_id: &str, username: &str, palette: &[String], now: u64) -> bool {
        match self.users.get_mut(user_id) {
            Some(state) => {
                state.username = username.to_string();
                state.last_seen_at = now;
                false
            }
            None => {
                self.users.insert(
                    user_id.to_string(),
                    UserState {
                        user_id: user_id.to_string(),
                        username: username.to_string(),
                        cursor: 0,
                        selection: None,
                        last_seen_at: now,
                        color: color_for(user_id, palette),
                    },
                );
                true
            }
        }
    }

    pub fn leave(&mut self, user_id: &str) -> Option<UserState> {
        self.users.remove(user_id)
    }

    /// Move a user's cursor. Unknown users are ignored and yield false.
    pub fn update(
        &mut self,
        user_id: &str,
        cursor: usize,
        selection: Option<Selection>,
        now: u64,
    ) -> bool {
        match self.users.get_mut(user_id) {
            Some(state) => {
                state.cursor = cursor;
                state.selection = selection;
                state.last_seen_at = now;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, user_id: &str) -> Option<&UserState> {
        self.users.get(user_id)
    }

    /// Users seen within `window_ms` of `now`, sorted by username
    pub fn active(&self, now: u64, window_ms: u64) -> Vec<UserState> {
        let mut active: Vec<UserState> = self
            .users
            .values()
            .filter(|u| now.saturating_sub(u.last_seen_at) <= window_ms)
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            a.username
                .cmp(&b.username)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        active
    }

    /// Drop users idle for longer than `idle_ms`; returns the removed IDs
    pub fn prune(&mut self, now: u64, idle_ms: u64) -> Vec<String> {
        let stale: Vec<String> = self
            .users
            .values()
            .filter(|u| now.saturating_sub(u.last_seen_at) > idle_ms)
            .map(|u| u.user_id.clone())
            .collect();
        for id in &stale {
            self.users.remove(id);
        }
        stale
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, UserState> {
        self.users.clone()
    }
}
