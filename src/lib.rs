//! cachewrap - Function-result caching
//!
//! Memoizes a resolver's result under a logical key plus its rendered call
//! parameters, with per-key TTL, write-time jitter and stale fallback when the
//! resolver fails.

pub mod codec;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod expiry;
pub mod storage;
pub mod tasks;
pub mod warnings;

pub use codec::{BodyCodec, BodyPipeline, Compression, ParamCodec, SerializationError};
pub use config::{Config, KeyConfig, DEFAULT_KEY_CONFIG, TTL_IMMEDIATELY_EXPIRES, TTL_NEVER_EXPIRES};
pub use context::{CallContext, DEFAULT_IGNORE_CACHE_KEY};
pub use engine::{CacheEngine, Fetched, LookupState, Origin};
pub use error::{CacheError, Result};
pub use expiry::{Clock, ManualClock, SystemClock};
pub use storage::{CacheStorage, DiskStorage, InMemoryStorage};
pub use tasks::spawn_cleanup_task;
pub use warnings::{RecordingSink, SilentSink, TracingSink, Warning, WarningSink};
