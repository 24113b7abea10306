//! Error types for the caching engine
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

use crate::codec::SerializationError;

// == Cache Error Enum ==
/// Unified error type for cache lookups, storage backends and wrapped calls.
#[derive(Error, Debug)]
pub enum CacheError {
    /// No entry was ever written for the key and params, or it was written
    /// under a different codec/compression tag
    #[error("cache entry not found")]
    EntryNotFound,

    /// An entry exists but its timestamp is before the expiry cutoff
    #[error("cache entry expired")]
    EntryExpired,

    /// Call parameters could not be rendered into a cache key
    #[error("failed to serialize parameters for key={key:?}")]
    Params {
        key: String,
        #[source]
        source: SerializationError,
    },

    /// A result body could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(#[from] SerializationError),

    /// The resolver failed and no stale value could be served instead
    #[error("failed to retrieve fresh value for key={key:?} params={params}")]
    Resolver {
        key: String,
        params: String,
        #[source]
        source: anyhow::Error,
    },

    /// The resolver succeeded but the result could not be persisted
    #[error("set cache failed for key={key:?} params={params}")]
    Store {
        key: String,
        params: String,
        #[source]
        source: Box<CacheError>,
    },

    /// Filesystem failure inside a storage backend
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other storage backend failure
    #[error("storage backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

impl CacheError {
    /// Returns true when the failure comes from a value that cannot be
    /// represented by the configured codecs ("un-cacheable" params or result).
    pub fn is_serialization(&self) -> bool {
        match self {
            CacheError::Params { .. } | CacheError::Serialization(_) => true,
            CacheError::Store { source, .. } => source.is_serialization(),
            _ => false,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the caching engine.
pub type Result<T> = std::result::Result<T, CacheError>;
