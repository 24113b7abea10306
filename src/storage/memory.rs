//! In-Memory Storage Module
//!
//! Process-local backend: a map per cache key, all behind one lock.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use crate::config::KeyConfig;
use crate::error::{CacheError, Result};
use crate::storage::{CacheStorage, StoredEntry};

// == In-Memory Storage ==
/// Stores entries in a `HashMap<key, HashMap<params, entry>>`.
///
/// The single lock covers every read-check-write on an entry. Concurrent
/// misses on the same entry are not coalesced: each caller resolves and the
/// last `set` wins.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    entries: RwLock<HashMap<String, HashMap<String, StoredEntry>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the raw entry, if any, ignoring tag and expiry.
    pub fn entry(&self, key: &str, params: &str) -> Option<StoredEntry> {
        self.entries
            .read()
            .get(key)
            .and_then(|by_params| by_params.get(params))
            .cloned()
    }

    /// Lists up to `limit` raw entries as `(key, params, entry)`, ordered by
    /// key then params. Meant for debugging.
    pub fn dump(&self, limit: usize) -> Vec<(String, String, StoredEntry)> {
        let entries = self.entries.read();
        let mut all: Vec<_> = entries
            .iter()
            .flat_map(|(key, by_params)| {
                by_params
                    .iter()
                    .map(move |(params, entry)| (key.as_str(), params.as_str(), entry))
            })
            .collect();
        all.sort_unstable_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        all.into_iter()
            .take(limit)
            .map(|(key, params, entry)| (key.to_string(), params.to_string(), entry.clone()))
            .collect()
    }
}

impl CacheStorage for InMemoryStorage {
    fn get(
        &self,
        key: &str,
        config: &KeyConfig,
        params: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<u8>> {
        let entries = self.entries.read();
        let entry = entries
            .get(key)
            .and_then(|by_params| by_params.get(params))
            .ok_or(CacheError::EntryNotFound)?;

        entry.check(&config.entry_tag(), cutoff)?;
        Ok(entry.data.clone())
    }

    fn set(
        &self,
        key: &str,
        config: &KeyConfig,
        params: &str,
        value: Vec<u8>,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let entry = StoredEntry::new(value, timestamp, config.entry_tag());
        self.entries
            .write()
            .entry(key.to_string())
            .or_default()
            .insert(params.to_string(), entry);
        Ok(())
    }

    fn entry_count(&self) -> Result<u64> {
        let entries = self.entries.read();
        Ok(entries.values().map(|by_params| by_params.len() as u64).sum())
    }

    fn expired_entry_count(
        &self,
        key: &str,
        _config: &KeyConfig,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let entries = self.entries.read();
        let count = entries
            .get(key)
            .map(|by_params| {
                by_params
                    .values()
                    .filter(|entry| entry.is_expired(cutoff))
                    .count()
            })
            .unwrap_or(0);
        Ok(count as u64)
    }

    fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }

    fn cleanup(&self, key: &str, _config: &KeyConfig, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut entries = self.entries.write();
        let Some(by_params) = entries.get_mut(key) else {
            return Ok(0);
        };

        let before = by_params.len();
        by_params.retain(|_, entry| !entry.is_expired(cutoff));
        let removed = (before - by_params.len()) as u64;

        if by_params.is_empty() {
            entries.remove(key);
        }

        debug!(key, removed, "in-memory cleanup");
        Ok(removed)
    }
}
