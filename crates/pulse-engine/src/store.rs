//! Keyed state stores.
//!
//! Components never own a bare map: they hold an `Arc<dyn StateStore<V>>` so
//! the locking discipline lives with the store and tests can swap it out.
//! Every mutation runs a closure against the value while the store's lock for
//! that key is held, which makes each per-key update atomic.

use std::collections::HashMap;

use dashmap::DashMap;
use parking_lot::RwLock;

/// Keyed state with atomic per-key mutation.
pub trait StateStore<V>: Send + Sync
where
    V: Clone + Default + Send + Sync,
{
    /// Current value for `key`, if any.
    fn get(&self, key: &str) -> Option<V>;

    /// Apply `apply` to the value for `key`, creating it with `V::default()` first
    /// if absent.
    fn upsert(&self, key: &str, apply: &mut dyn FnMut(&mut V));

    /// Apply `apply` only if `key` exists. Returns whether it did.
    fn modify(&self, key: &str, apply: &mut dyn FnMut(&mut V)) -> bool;

    /// Keys whose current value satisfies `predicate`.
    fn keys_matching(&self, predicate: &dyn Fn(&V) -> bool) -> Vec<String>;

    /// Copy of every entry.
    fn snapshot(&self) -> Vec<(String, V)>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Store guarded by a single store-wide reader/writer lock.
///
/// Readers run concurrently with each other, never with a writer.
#[derive(Debug, Default)]
pub struct RwLockStore<V> {
    entries: RwLock<HashMap<String, V>>,
}

impl<V> RwLockStore<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<V> StateStore<V> for RwLockStore<V>
where
    V: Clone + Default + Send + Sync,
{
    fn get(&self, key: &str) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    fn upsert(&self, key: &str, apply: &mut dyn FnMut(&mut V)) {
        let mut entries = self.entries.write();
        if let Some(value) = entries.get_mut(key) {
            apply(value);
        } else {
            let mut value = V::default();
            apply(&mut value);
            entries.insert(key.to_owned(), value);
        }
    }

    fn modify(&self, key: &str, apply: &mut dyn FnMut(&mut V)) -> bool {
        match self.entries.write().get_mut(key) {
            Some(value) => {
                apply(value);
                true
            }
            None => false,
        }
    }

    fn keys_matching(&self, predicate: &dyn Fn(&V) -> bool) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .filter(|(_, v)| predicate(v))
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn snapshot(&self) -> Vec<(String, V)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

/// Store with per-shard locking: updates to different keys rarely contend.
#[derive(Debug, Default)]
pub struct ShardedStore<V> {
    entries: DashMap<String, V>,
}

impl<V> ShardedStore<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<V> StateStore<V> for ShardedStore<V>
where
    V: Clone + Default + Send + Sync,
{
    fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    fn upsert(&self, key: &str, apply: &mut dyn FnMut(&mut V)) {
        if let Some(mut value) = self.entries.get_mut(key) {
            apply(value.value_mut());
            return;
        }
        let mut value = self.entries.entry(key.to_owned()).or_default();
        apply(value.value_mut());
    }

    fn modify(&self, key: &str, apply: &mut dyn FnMut(&mut V)) -> bool {
        match self.entries.get_mut(key) {
            Some(mut value) => {
                apply(value.value_mut());
                true
            }
            None => false,
        }
    }

    fn keys_matching(&self, predicate: &dyn Fn(&V) -> bool) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.key().clone())
            .collect()
    }

    fn snapshot(&self) -> Vec<(String, V)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
