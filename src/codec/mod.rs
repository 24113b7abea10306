//! Codec Module
//!
//! Turns call parameters into cache-key fragments and typed results into
//! stored bytes. Every strategy is a closed enum addressed by a stable name,
//! the same name that appears in JSON configuration.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Implements the name table shared by all strategy enums: `ALL`, `name`,
/// `from_name`, `Display`, `FromStr` and the `String` conversions serde uses.
macro_rules! strategy_names {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// Every registered strategy, in declaration order.
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            /// Stable name used in configuration and storage tags.
            pub fn name(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }

            /// Looks a strategy up by its registered name.
            pub fn from_name(name: &str) -> Option<Self> {
                Self::ALL.iter().copied().find(|s| s.name() == name)
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = $crate::codec::UnknownStrategy;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_name(s).ok_or_else(|| $crate::codec::UnknownStrategy {
                    kind: stringify!($ty),
                    name: s.to_string(),
                })
            }
        }

        impl TryFrom<String> for $ty {
            type Error = $crate::codec::UnknownStrategy;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$ty> for String {
            fn from(s: $ty) -> String {
                s.name().to_string()
            }
        }
    };
}

mod body;
mod compression;
mod params;


pub use body::BodyCodec;
pub use compression::Compression;
pub use params::ParamCodec;

// == Errors ==
/// Failure to turn a value into bytes (or a cache-key string) or back.
#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("msgpack: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    #[error("msgpack: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    #[error("bincode: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("string codec: {0}")]
    Raw(#[from] serde::de::value::Error),

    #[error("string codec: unsupported type, expected a string or bytes")]
    UnsupportedRawType,

    #[error("{algorithm}: {source}")]
    Compression {
        algorithm: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// A strategy name that is not registered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} {name:?}")]
pub struct UnknownStrategy {
    pub kind: &'static str,
    pub name: String,
}

// == Body Pipeline ==
/// Body codec followed by compression on write; the reverse on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyPipeline {
    pub codec: BodyCodec,
    pub compression: Compression,
}

impl BodyPipeline {
    pub fn new(codec: BodyCodec, compression: Compression) -> Self {
        Self { codec, compression }
    }

    /// `compress(codec.marshal(value))`
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, SerializationError> {
        let body = self.codec.marshal(value)?;
        self.compression.compress(&body)
    }

    /// `codec.unmarshal(decompress(data))`
    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, SerializationError> {
        let body = self.compression.decompress(data)?;
        self.codec.unmarshal(&body)
    }
}
