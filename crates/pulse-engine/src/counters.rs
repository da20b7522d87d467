//! All-time per-entity activity totals.

use std::sync::Arc;

use serde::Serialize;

use crate::store::{RwLockStore, StateStore};

/// Cumulative totals for one entity. Both fields only ever grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterEntry {
    pub edit_count: u64,
    pub byte_volume: u64,
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub entity: String,
    pub edit_count: u64,
    pub byte_volume: u64,
}

/// Process-wide entity → totals mapping. No eviction.
pub struct CounterStore {
    entries: Arc<dyn StateStore<CounterEntry>>,
}

impl Default for CounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterStore {
    /// Counter store backed by a single store-wide reader/writer lock.
    pub fn new() -> Self {
        Self::with_store(Arc::new(RwLockStore::<CounterEntry>::new()))
    }

    pub fn with_store(entries: Arc<dyn StateStore<CounterEntry>>) -> Self {
        Self { entries }
    }

    /// Count one edit and add its absolute byte change to the entity's volume.
    pub fn record_edit(&self, entity: &str, bytes: u64) -> CounterEntry {
        let mut updated = CounterEntry::default();
        self.entries.upsert(entity, &mut |entry| {
            entry.edit_count = entry.edit_count.saturating_add(1);
            entry.byte_volume = entry.byte_volume.saturating_add(bytes);
            updated = *entry;
        });
        updated
    }

    /// Totals for `entity`; zero when unknown.
    pub fn entry(&self, entity: &str) -> CounterEntry {
        self.entries.get(entity).unwrap_or_default()
    }

    pub fn edit_count(&self, entity: &str) -> u64 {
        self.entry(entity).edit_count
    }

    pub fn byte_volume(&self, entity: &str) -> u64 {
        self.entry(entity).byte_volume
    }

    pub fn entity_count(&self) -> usize {
        self.entries.len()
    }

    /// Top `n` entities by edit count.
    pub fn top_by_edit_count(&self, n: usize) -> Vec<LeaderboardEntry> {
        self.leaderboard(n, |e| e.edit_count)
    }

    /// Top `n` entities by byte volume.
    pub fn top_by_byte_volume(&self, n: usize) -> Vec<LeaderboardEntry> {
        self.leaderboard(n, |e| e.byte_volume)
    }

    fn leaderboard(&self, n: usize, key: impl Fn(&CounterEntry) -> u64) -> Vec<LeaderboardEntry> {
        let mut rows = self.entries.snapshot();
        rows.sort_by(|(a_name, a), (b_name, b)| key(b).cmp(&key(a)).then_with(|| a_name.cmp(b_name)));
        rows.into_iter()
            .take(n)
            .map(|(entity, entry)| LeaderboardEntry {
                entity,
                edit_count: entry.edit_count,
                byte_volume: entry.byte_volume,
            })
            .collect()
    }
}
