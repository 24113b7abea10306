//! Cache Engine
//!
//! Wraps a caller-supplied resolver with lookup, stale fallback and
//! write-back. The engine holds no per-call state; one instance is shared by
//! every caller (usually behind an `Arc`).
//!
//! A call moves through these steps:
//! 1. resolve the [`KeyConfig`] and render the params (a render failure ends
//!    the call before storage or the resolver are touched)
//! 2. unless the cache is ignored, check storage: a fresh hit returns at once,
//!    an expired hit, a miss or a storage error fall through
//! 3. run the resolver
//! 4. on success, encode and store the value; on failure, serve the expired
//!    entry if the key allows it, or return the resolver error

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::{Config, KeyConfig, TTL_IMMEDIATELY_EXPIRES};
use crate::context::{CallContext, DEFAULT_IGNORE_CACHE_KEY};
use crate::error::{CacheError, Result};
use crate::expiry::{expiry_cutoff, stored_timestamp, Clock, SystemClock, FAR_PAST};
use crate::storage::CacheStorage;
use crate::warnings::{TracingSink, Warning, WarningSink};

// == Call Outcome ==
/// What the storage lookup found before the resolver ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupState {
    /// The caller asked to ignore the cache
    NotChecked,
    FreshHit,
    ExpiredHit,
    Miss,
    /// Storage or decoding failed; handled as a miss
    Error,
}

/// Where the returned value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Cache,
    Resolver,
    /// Expired entry served because the resolver failed
    StaleFallback,
}

/// Value returned by a cached call, with how it was obtained.
#[derive(Debug)]
pub struct Fetched<T> {
    pub value: T,
    pub origin: Origin,
    pub lookup: LookupState,
    /// Set when the resolver succeeded but the value could not be stored.
    /// The value is still valid.
    pub store_error: Option<CacheError>,
}

impl<T> Fetched<T> {
    fn cached(value: T) -> Self {
        Self {
            value,
            origin: Origin::Cache,
            lookup: LookupState::FreshHit,
            store_error: None,
        }
    }

    /// Returns the value, dropping any store error.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Returns the value, or the store error if persisting it failed.
    pub fn into_result(self) -> Result<T> {
        match self.store_error {
            Some(err) => Err(err),
            None => Ok(self.value),
        }
    }
}

enum Lookup<T> {
    Hit(T),
    Fallthrough(LookupState),
}

// == Cache Engine ==
/// Orchestrates config, codecs, expiry and storage around resolvers.
pub struct CacheEngine {
    config: Config,
    storage: Arc<dyn CacheStorage>,
    ignore_key: String,
    warnings: Arc<dyn WarningSink>,
    clock: Arc<dyn Clock>,
}

impl CacheEngine {
    /// Creates an engine with the default ignore-cache key, warnings forwarded
    /// to `tracing`, and the system clock.
    pub fn new(config: Config, storage: Arc<dyn CacheStorage>) -> Self {
        Self {
            config,
            storage,
            ignore_key: DEFAULT_IGNORE_CACHE_KEY.to_string(),
            warnings: Arc::new(TracingSink),
            clock: Arc::new(SystemClock),
        }
    }

    /// Name under which context-aware calls look up the ignore-cache flag.
    pub fn with_ignore_key(mut self, key: impl Into<String>) -> Self {
        self.ignore_key = key.into();
        self
    }

    pub fn with_warnings(mut self, warnings: Arc<dyn WarningSink>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub fn ignore_key(&self) -> &str {
        &self.ignore_key
    }

    /// Effective policy for `key`.
    pub fn key_config(&self, key: &str) -> &KeyConfig {
        self.config.get(key)
    }

    // == Low-level Access ==
    /// Reads and decodes one entry.
    ///
    /// With `ignore_expiry` an expired entry is returned as if it were fresh.
    pub fn get<T: DeserializeOwned>(
        &self,
        key: &str,
        config: &KeyConfig,
        params: &str,
        ignore_expiry: bool,
    ) -> Result<T> {
        let cutoff = if ignore_expiry {
            FAR_PAST
        } else {
            expiry_cutoff(config, self.clock.now())
        };
        let data = self.storage.get(key, config, params, cutoff)?;
        Ok(config.pipeline().decode(&data)?)
    }

    /// Encodes and writes one entry. A TTL of zero writes nothing.
    pub fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        config: &KeyConfig,
        params: &str,
        value: &T,
    ) -> Result<()> {
        if config.ttl == TTL_IMMEDIATELY_EXPIRES {
            return Ok(());
        }
        let data = config.pipeline().encode(value)?;
        let timestamp = stored_timestamp(config, self.clock.now());
        self.storage.set(key, config, params, data, timestamp)
    }

    pub fn entry_count(&self) -> Result<u64> {
        self.storage.entry_count()
    }

    /// Expired entries across the configured keys. Keys that never expire
    /// are skipped.
    pub fn expired_entry_count(&self) -> Result<u64> {
        let now = self.clock.now();
        let mut total = 0;
        for (key, config) in &self.config.configs {
            if config.never_expires() {
                continue;
            }
            total += self
                .storage
                .expired_entry_count(key, config, expiry_cutoff(config, now))?;
        }
        Ok(total)
    }

    pub fn clear(&self) -> Result<()> {
        self.storage.clear()
    }

    /// Deletes expired entries of every configured key and returns how many
    /// were removed.
    ///
    /// A failure on one key is reported as [`Warning::CleanupFailed`] and the
    /// remaining keys are still processed. Keys that only resolve through the
    /// defaults are not visited; use [`cleanup_key`](Self::cleanup_key).
    pub fn cleanup(&self) -> u64 {
        let now = self.clock.now();
        let mut removed = 0;
        for (key, config) in &self.config.configs {
            if config.never_expires() {
                continue;
            }
            match self.storage.cleanup(key, config, expiry_cutoff(config, now)) {
                Ok(count) => removed += count,
                Err(err) => self.warnings.warn(Warning::CleanupFailed {
                    key: key.clone(),
                    error: err.to_string(),
                }),
            }
        }
        removed
    }

    /// Deletes expired entries of one key, configured or not.
    pub fn cleanup_key(&self, key: &str) -> Result<u64> {
        let config = self.key_config(key);
        if config.never_expires() {
            return Ok(0);
        }
        self.storage
            .cleanup(key, config, expiry_cutoff(config, self.clock.now()))
    }

    // == Cached Calls ==
    /// Runs `resolver` through the cache.
    ///
    /// # Arguments
    /// * `key` - logical cache key, selects the KeyConfig
    /// * `resolver` - produces the fresh value; receives `ignore_cache` and `params` unchanged
    /// * `ignore_cache` - skip the lookup but still store the fresh value
    /// * `params` - call parameters, rendered into the entry identity
    ///
    /// # Returns
    /// The value and its origin. Fails when the params cannot be rendered, or
    /// when the resolver fails and no stale value may be served.
    pub fn cache<P, T, E, F>(
        &self,
        key: &str,
        resolver: F,
        ignore_cache: bool,
        params: &P,
    ) -> Result<Fetched<T>>
    where
        P: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        E: Into<anyhow::Error>,
        F: FnOnce(bool, &P) -> std::result::Result<T, E>,
    {
        self.execute(key, ignore_cache, params, || resolver(ignore_cache, params))
    }

    /// Like [`cache`](Self::cache), with the ignore-cache flag read from
    /// `ctx` under [`ignore_key`](Self::ignore_key). A missing or non-`bool`
    /// value counts as `false`.
    pub fn cache_with_context<P, T, E, F>(
        &self,
        key: &str,
        resolver: F,
        ctx: &CallContext,
        params: &P,
    ) -> Result<Fetched<T>>
    where
        P: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        E: Into<anyhow::Error>,
        F: FnOnce(&CallContext, &P) -> std::result::Result<T, E>,
    {
        let ignore_cache = ctx.ignore_cache(&self.ignore_key);
        self.execute(key, ignore_cache, params, || resolver(ctx, params))
    }

    /// Async form of [`cache`](Self::cache). Only the resolver is awaited;
    /// storage calls run inline.
    pub async fn cache_async<P, T, E, F, Fut>(
        &self,
        key: &str,
        resolver: F,
        ignore_cache: bool,
        params: P,
    ) -> Result<Fetched<T>>
    where
        P: Serialize,
        T: Serialize + DeserializeOwned,
        E: Into<anyhow::Error>,
        F: FnOnce(bool, P) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.execute_async(key, ignore_cache, params, move |params| {
            resolver(ignore_cache, params)
        })
        .await
    }

    /// Async form of [`cache_with_context`](Self::cache_with_context).
    pub async fn cache_with_context_async<P, T, E, F, Fut>(
        &self,
        key: &str,
        resolver: F,
        ctx: CallContext,
        params: P,
    ) -> Result<Fetched<T>>
    where
        P: Serialize,
        T: Serialize + DeserializeOwned,
        E: Into<anyhow::Error>,
        F: FnOnce(CallContext, P) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let ignore_cache = ctx.ignore_cache(&self.ignore_key);
        self.execute_async(key, ignore_cache, params, move |params| resolver(ctx, params))
            .await
    }

    /// Binds `resolver` to `key` and returns a function with the same
    /// call shape as the resolver.
    pub fn wrap<P, T, E, F>(
        self: &Arc<Self>,
        key: impl Into<String>,
        resolver: F,
    ) -> impl Fn(bool, &P) -> Result<Fetched<T>>
    where
        P: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        E: Into<anyhow::Error>,
        F: Fn(bool, &P) -> std::result::Result<T, E>,
    {
        let engine = Arc::clone(self);
        let key = key.into();
        move |ignore_cache: bool, params: &P| engine.cache(&key, &resolver, ignore_cache, params)
    }

    /// Context-aware counterpart of [`wrap`](Self::wrap).
    pub fn wrap_with_context<P, T, E, F>(
        self: &Arc<Self>,
        key: impl Into<String>,
        resolver: F,
    ) -> impl Fn(&CallContext, &P) -> Result<Fetched<T>>
    where
        P: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        E: Into<anyhow::Error>,
        F: Fn(&CallContext, &P) -> std::result::Result<T, E>,
    {
        let engine = Arc::clone(self);
        let key = key.into();
        move |ctx: &CallContext, params: &P| engine.cache_with_context(&key, &resolver, ctx, params)
    }

    // == Call Steps ==
    fn execute<P, T, E>(
        &self,
        key: &str,
        ignore_cache: bool,
        params: &P,
        resolve: impl FnOnce() -> std::result::Result<T, E>,
    ) -> Result<Fetched<T>>
    where
        P: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        E: Into<anyhow::Error>,
    {
        let (config, rendered) = self.prepare(key, params)?;
        let lookup = match self.lookup(key, config, &rendered, ignore_cache) {
            Lookup::Hit(value) => return Ok(Fetched::cached(value)),
            Lookup::Fallthrough(state) => state,
        };
        let outcome = resolve();
        self.settle(key, config, rendered, lookup, outcome)
    }

    async fn execute_async<P, T, E, Fut>(
        &self,
        key: &str,
        ignore_cache: bool,
        params: P,
        resolve: impl FnOnce(P) -> Fut,
    ) -> Result<Fetched<T>>
    where
        P: Serialize,
        T: Serialize + DeserializeOwned,
        E: Into<anyhow::Error>,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let (config, rendered) = self.prepare(key, &params)?;
        let lookup = match self.lookup(key, config, &rendered, ignore_cache) {
            Lookup::Hit(value) => return Ok(Fetched::cached(value)),
            Lookup::Fallthrough(state) => state,
        };
        let outcome = resolve(params).await;
        self.settle(key, config, rendered, lookup, outcome)
    }

    fn prepare<P: Serialize + ?Sized>(&self, key: &str, params: &P) -> Result<(&KeyConfig, String)> {
        let config = self.key_config(key);
        let rendered = config
            .param_codec()
            .render(params)
            .map_err(|source| CacheError::Params {
                key: key.to_string(),
                source,
            })?;
        Ok((config, rendered))
    }

    fn lookup<T: DeserializeOwned>(
        &self,
        key: &str,
        config: &KeyConfig,
        params: &str,
        ignore_cache: bool,
    ) -> Lookup<T> {
        if ignore_cache {
            return Lookup::Fallthrough(LookupState::NotChecked);
        }
        match self.get(key, config, params, false) {
            Ok(value) => {
                debug!(key, params, "cache hit");
                Lookup::Hit(value)
            }
            Err(CacheError::EntryExpired) => {
                debug!(key, params, "cache entry expired");
                Lookup::Fallthrough(LookupState::ExpiredHit)
            }
            Err(CacheError::EntryNotFound) => {
                debug!(key, params, "cache miss");
                Lookup::Fallthrough(LookupState::Miss)
            }
            Err(err) => {
                self.warnings.warn(Warning::LookupFailed {
                    key: key.to_string(),
                    params: params.to_string(),
                    error: err.to_string(),
                });
                Lookup::Fallthrough(LookupState::Error)
            }
        }
    }

    fn settle<T, E>(
        &self,
        key: &str,
        config: &KeyConfig,
        params: String,
        lookup: LookupState,
        outcome: std::result::Result<T, E>,
    ) -> Result<Fetched<T>>
    where
        T: Serialize + DeserializeOwned,
        E: Into<anyhow::Error>,
    {
        let err: anyhow::Error = match outcome {
            Ok(value) => {
                let store_error = self.set(key, config, &params, &value).err().map(|source| {
                    debug!(key, params = %params, error = %source, "storing fresh value failed");
                    CacheError::Store {
                        key: key.to_string(),
                        params: params.clone(),
                        source: Box::new(source),
                    }
                });
                return Ok(Fetched {
                    value,
                    origin: Origin::Resolver,
                    lookup,
                    store_error,
                });
            }
            Err(err) => err.into(),
        };

        if config.fallback_to_expired && lookup == LookupState::ExpiredHit {
            match self.get(key, config, &params, true) {
                Ok(value) => {
                    self.warnings.warn(Warning::StaleFallback {
                        key: key.to_string(),
                        params: params.clone(),
                        error: format!("{err:#}"),
                    });
                    return Ok(Fetched {
                        value,
                        origin: Origin::StaleFallback,
                        lookup,
                        store_error: None,
                    });
                }
                Err(fallback_err) => {
                    debug!(key, params = %params, error = %fallback_err, "stale fallback unavailable");
                }
            }
        }

        Err(CacheError::Resolver {
            key: key.to_string(),
            params,
            source: err,
        })
    }
}

impl std::fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine")
            .field("config", &self.config)
            .field("ignore_key", &self.ignore_key)
            .finish_non_exhaustive()
    }
}
