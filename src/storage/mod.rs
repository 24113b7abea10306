//! Storage Module
//!
//! The contract every cache backend satisfies, plus the bundled in-memory and
//! filesystem backends.
//!
//! Backends never reorder or merge entries across keys, and all expiry
//! accounting is scoped to a single key because each key may carry its own
//! TTL.

mod disk;
mod entry;
mod memory;
mod pather;

use chrono::{DateTime, Utc};

use crate::config::KeyConfig;
use crate::error::Result;

pub use disk::DiskStorage;
pub use entry::StoredEntry;
pub use memory::InMemoryStorage;
pub use pather::{sha256_base64_pather, sha256_hex_pather, Pather, DEFAULT_PATHER};

// == Storage Contract ==
/// A place to keep encoded entries keyed by `(key, params)`.
///
/// `config` is the KeyConfig in effect for the call; backends use
/// [`KeyConfig::entry_tag`] to recognise entries written in another format.
pub trait CacheStorage: Send + Sync {
    /// Returns the stored bytes.
    ///
    /// Fails with [`CacheError::EntryNotFound`](crate::CacheError::EntryNotFound)
    /// when nothing was written or the entry carries a different tag, and with
    /// [`CacheError::EntryExpired`](crate::CacheError::EntryExpired) when its
    /// timestamp is before `cutoff`.
    fn get(&self, key: &str, config: &KeyConfig, params: &str, cutoff: DateTime<Utc>)
        -> Result<Vec<u8>>;

    /// Upserts an entry; the last write wins regardless of timestamps.
    fn set(
        &self,
        key: &str,
        config: &KeyConfig,
        params: &str,
        value: Vec<u8>,
        timestamp: DateTime<Utc>,
    ) -> Result<()>;

    /// Number of entries across all keys.
    fn entry_count(&self) -> Result<u64>;

    /// Number of entries of `key` whose timestamp is before `cutoff`.
    fn expired_entry_count(&self, key: &str, config: &KeyConfig, cutoff: DateTime<Utc>)
        -> Result<u64>;

    /// Deletes every entry.
    fn clear(&self) -> Result<()>;

    /// Deletes the entries of `key` whose timestamp is before `cutoff` and
    /// returns how many were removed.
    fn cleanup(&self, key: &str, config: &KeyConfig, cutoff: DateTime<Utc>) -> Result<u64>;
}
