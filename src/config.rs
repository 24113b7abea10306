//! Configuration Module
//!
//! Per-key cache policy (TTL, jitter, stale fallback, codecs) and the
//! aggregate mapping from cache key to policy.

use std::collections::HashMap;
use std::env;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::codec::{BodyCodec, BodyPipeline, Compression, ParamCodec};

/// Entries written with this TTL expire immediately (nothing is stored).
pub const TTL_IMMEDIATELY_EXPIRES: i64 = 0;
/// Any negative TTL means entries never expire; this is the canonical one.
pub const TTL_NEVER_EXPIRES: i64 = -1;

/// Param codec used when a KeyConfig leaves it unset.
pub const DEFAULT_PARAM_CODEC: ParamCodec = ParamCodec::Json;
/// Body codec used when a KeyConfig leaves it unset.
pub const DEFAULT_BODY_CODEC: BodyCodec = BodyCodec::Json;
/// Compression used when a KeyConfig leaves it unset.
pub const DEFAULT_COMPRESSION: Compression = Compression::Gzip;

/// Built-in policy for keys with no specific entry and no configured default.
pub static DEFAULT_KEY_CONFIG: KeyConfig = KeyConfig {
    ttl: 3600,
    ttl_jitter: 300,
    fallback_to_expired: false,
    param_codec: None,
    body_codec: None,
    body_compression: None,
};

// == Key Config ==
/// Cache policy for one logical cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyConfig {
    /// Seconds an entry stays fresh. 0 disables caching, negative never expires.
    pub ttl: i64,
    /// Upper bound (exclusive, seconds) of the random delay added to stored timestamps
    #[serde(default)]
    pub ttl_jitter: u64,
    /// Serve an expired entry when the resolver fails
    #[serde(default)]
    pub fallback_to_expired: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_codec: Option<ParamCodec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_codec: Option<BodyCodec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_compression: Option<Compression>,
}

impl KeyConfig {
    /// Creates a policy with the given TTL and everything else unset.
    pub const fn with_ttl(ttl: i64) -> Self {
        Self {
            ttl,
            ttl_jitter: 0,
            fallback_to_expired: false,
            param_codec: None,
            body_codec: None,
            body_compression: None,
        }
    }

    pub const fn jitter(mut self, seconds: u64) -> Self {
        self.ttl_jitter = seconds;
        self
    }

    pub const fn fallback_to_expired(mut self, enabled: bool) -> Self {
        self.fallback_to_expired = enabled;
        self
    }

    pub const fn params(mut self, codec: ParamCodec) -> Self {
        self.param_codec = Some(codec);
        self
    }

    pub const fn body(mut self, codec: BodyCodec) -> Self {
        self.body_codec = Some(codec);
        self
    }

    pub const fn compression(mut self, compression: Compression) -> Self {
        self.body_compression = Some(compression);
        self
    }

    pub fn param_codec(&self) -> ParamCodec {
        self.param_codec.unwrap_or(DEFAULT_PARAM_CODEC)
    }

    pub fn body_codec(&self) -> BodyCodec {
        self.body_codec.unwrap_or(DEFAULT_BODY_CODEC)
    }

    pub fn body_compression(&self) -> Compression {
        self.body_compression.unwrap_or(DEFAULT_COMPRESSION)
    }

    pub fn pipeline(&self) -> BodyPipeline {
        BodyPipeline::new(self.body_codec(), self.body_compression())
    }

    /// Format tag persisted next to every entry. An entry whose tag differs
    /// from the current one was written under another codec or compression.
    pub fn entry_tag(&self) -> String {
        format!("{}:{}", self.body_codec(), self.body_compression())
    }

    pub fn never_expires(&self) -> bool {
        self.ttl < 0
    }
}

impl Default for KeyConfig {
    fn default() -> Self {
        DEFAULT_KEY_CONFIG
    }
}

// == Config ==
/// Default policy plus per-key overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Option<KeyConfig>,
    #[serde(default)]
    pub configs: HashMap<String, KeyConfig>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(mut self, defaults: KeyConfig) -> Self {
        self.defaults = Some(defaults);
        self
    }

    pub fn with_key(mut self, key: impl Into<String>, config: KeyConfig) -> Self {
        self.configs.insert(key.into(), config);
        self
    }

    /// Resolves the policy for `key`.
    ///
    /// Falls back to `defaults`, then to [`DEFAULT_KEY_CONFIG`]. Never fails
    /// and never inserts anything into `configs`.
    pub fn get(&self, key: &str) -> &KeyConfig {
        self.configs
            .get(key)
            .or(self.defaults.as_ref())
            .unwrap_or(&DEFAULT_KEY_CONFIG)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Reads a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading cache config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing cache config {}", path.display()))
    }

    /// Builds a Config from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_CONFIG_PATH` - JSON file to start from (default: empty config)
    /// - `CACHE_DEFAULT_TTL` - TTL in seconds for the defaults entry
    /// - `CACHE_DEFAULT_TTL_JITTER` - jitter in seconds for the defaults entry
    /// - `CACHE_FALLBACK_TO_EXPIRED` - `true`/`false` for the defaults entry
    ///
    /// Any of the last three creates the defaults entry (starting from the
    /// built-in policy) when the file did not provide one.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = match env::var("CACHE_CONFIG_PATH") {
            Ok(path) => Self::load(path)?,
            Err(_) => Self::default(),
        };

        let ttl = env_var::<i64>("CACHE_DEFAULT_TTL")?;
        let jitter = env_var::<u64>("CACHE_DEFAULT_TTL_JITTER")?;
        let fallback = env_var::<bool>("CACHE_FALLBACK_TO_EXPIRED")?;

        if ttl.is_some() || jitter.is_some() || fallback.is_some() {
            let defaults = config.defaults.get_or_insert(DEFAULT_KEY_CONFIG);
            if let Some(ttl) = ttl {
                defaults.ttl = ttl;
            }
            if let Some(jitter) = jitter {
                defaults.ttl_jitter = jitter;
            }
            if let Some(fallback) = fallback {
                defaults.fallback_to_expired = fallback;
            }
        }

        Ok(config)
    }
}

fn env_var<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("invalid value {value:?} for {name}")),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_key_without_defaults() {
        let config = Config::default();
        assert!(std::ptr::eq(config.get("doesnotexist"), &DEFAULT_KEY_CONFIG));
    }

    #[test]
    fn test_unknown_key_uses_defaults_without_inserting() {
        let config = Config::new().with_defaults(KeyConfig::with_ttl(5).jitter(1));

        assert_eq!(config.get("doesnotexist").ttl, 5);
        assert!(config.configs.is_empty());
    }

    #[test]
    fn test_specific_key_wins_over_defaults() {
        let config = Config::new()
            .with_defaults(KeyConfig::with_ttl(5))
            .with_key("helloWorld", KeyConfig::with_ttl(60));

        assert_eq!(config.get("helloWorld").ttl, 60);
        assert_eq!(config.get("other").ttl, 5);
    }

    #[test]
    fn test_built_in_defaults() {
        let config = KeyConfig::default();
        assert_eq!(config.ttl, 3600);
        assert_eq!(config.ttl_jitter, 300);
        assert!(!config.fallback_to_expired);
        assert_eq!(config.param_codec(), ParamCodec::Json);
        assert_eq!(config.body_codec(), BodyCodec::Json);
        assert_eq!(config.body_compression(), Compression::Gzip);
        assert_eq!(config.entry_tag(), "json:gzip");
    }

    #[test]
    fn test_config_marshal_unmarshal() {
        let config = Config::new()
            .with_defaults(KeyConfig::with_ttl(1))
            .with_key("test", KeyConfig::with_ttl(1))
            .with_key(
                "test1",
                KeyConfig::with_ttl(1)
                    .jitter(1)
                    .fallback_to_expired(true)
                    .body(BodyCodec::Json)
                    .compression(Compression::Gzip)
                    .params(ParamCodec::Json),
            )
            .with_key(
                "test2",
                KeyConfig::with_ttl(1)
                    .jitter(1)
                    .fallback_to_expired(true)
                    .body(BodyCodec::MsgPack)
                    .compression(Compression::Zstd)
                    .params(ParamCodec::JsonBase64),
            )
            .with_key("test5", KeyConfig::with_ttl(1).body(BodyCodec::Bincode))
            .with_key(
                "test3",
                KeyConfig::with_ttl(1)
                    .body(BodyCodec::Raw)
                    .compression(Compression::Brotli),
            )
            .with_key(
                "test4",
                KeyConfig::with_ttl(1)
                    .body(BodyCodec::Raw)
                    .compression(Compression::None),
            );

        let data = config.to_json().unwrap();
        let other = Config::from_json(&data).unwrap();
        assert_eq!(config, other);
    }

    #[test]
    fn test_json_field_names_and_optional_fields() {
        let config = Config::from_json(
            r#"{
                "defaults": null,
                "configs": {
                    "minimal": {"ttl": 10},
                    "full": {
                        "ttl": -1,
                        "ttl_jitter": 3,
                        "fallback_to_expired": true,
                        "param_codec": "json+base64",
                        "body_codec": "msgpack",
                        "body_compression": "brotli"
                    }
                }
            }"#,
        )
        .unwrap();

        assert!(config.defaults.is_none());
        assert_eq!(config.get("minimal"), &KeyConfig::with_ttl(10));

        let full = config.get("full");
        assert!(full.never_expires());
        assert_eq!(full.ttl_jitter, 3);
        assert!(full.fallback_to_expired);
        assert_eq!(full.param_codec(), ParamCodec::JsonBase64);
        assert_eq!(full.entry_tag(), "msgpack:brotli");
    }

    #[test]
    fn test_passthrough_codec_is_named_string() {
        let config =
            Config::from_json(r#"{"configs": {"k": {"ttl": 1, "body_codec": "string"}}}"#).unwrap();
        assert_eq!(config.get("k").body_codec(), BodyCodec::Raw);
        assert_eq!(config.get("k").entry_tag(), "string:gzip");
        assert!(config.to_json().unwrap().contains(r#""body_codec": "string""#));
    }

    #[test]
    fn test_unset_strategies_are_omitted() {
        let text = serde_json::to_string(&KeyConfig::with_ttl(7)).unwrap();
        assert_eq!(text, r#"{"ttl":7,"ttl_jitter":0,"fallback_to_expired":false}"#);
    }

    #[test]
    fn test_missing_ttl_is_rejected() {
        assert!(Config::from_json(r#"{"configs": {"k": {"ttl_jitter": 1}}}"#).is_err());
    }

    #[test]
    fn test_unknown_strategy_name_is_rejected() {
        let err = Config::from_json(r#"{"configs": {"k": {"ttl": 1, "body_codec": "xml"}}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("unknown BodyCodec \"xml\""));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, r#"{"configs": {"k": {"ttl": 42}}}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.get("k").ttl, 42);

        assert!(Config::load(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_config_from_env() {
        env::remove_var("CACHE_CONFIG_PATH");
        env::remove_var("CACHE_DEFAULT_TTL");
        env::remove_var("CACHE_DEFAULT_TTL_JITTER");
        env::remove_var("CACHE_FALLBACK_TO_EXPIRED");

        let config = Config::from_env().unwrap();
        assert_eq!(config, Config::default());

        env::set_var("CACHE_DEFAULT_TTL", "120");
        env::set_var("CACHE_FALLBACK_TO_EXPIRED", "true");
        let config = Config::from_env().unwrap();
        let defaults = config.defaults.unwrap();
        assert_eq!(defaults.ttl, 120);
        assert_eq!(defaults.ttl_jitter, DEFAULT_KEY_CONFIG.ttl_jitter);
        assert!(defaults.fallback_to_expired);

        env::set_var("CACHE_DEFAULT_TTL", "soon");
        assert!(Config::from_env().is_err());

        env::remove_var("CACHE_DEFAULT_TTL");
        env::remove_var("CACHE_FALLBACK_TO_EXPIRED");
    }
}
