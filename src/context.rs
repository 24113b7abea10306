//! Call Context
//!
//! Explicit propagation context handed to context-aware resolvers. The engine
//! reads the ignore-cache flag from it under a configurable name.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Name the ignore-cache flag is stored under unless the engine overrides it.
pub const DEFAULT_IGNORE_CACHE_KEY: &str = "ignoreCache";

/// Immutable-by-convention bag of named values; cloning is cheap.
#[derive(Clone, Default)]
pub struct CallContext {
    values: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of this context with `key` bound to `value`.
    pub fn with_value<V: Any + Send + Sync>(mut self, key: impl Into<String>, value: V) -> Self {
        self.values.insert(key.into(), Arc::new(value));
        self
    }

    /// Shorthand for binding the flag under [`DEFAULT_IGNORE_CACHE_KEY`].
    pub fn with_ignore_cache(self, ignore: bool) -> Self {
        self.with_value(DEFAULT_IGNORE_CACHE_KEY, ignore)
    }

    pub fn value<V: Any>(&self, key: &str) -> Option<&V> {
        self.values.get(key).and_then(|v| v.downcast_ref::<V>())
    }

    /// Reads a `bool` flag; an absent or non-`bool` value counts as `false`.
    pub fn ignore_cache(&self, key: &str) -> bool {
        self.value::<bool>(key).copied().unwrap_or(false)
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("CallContext").field("keys", &keys).finish()
    }
}
