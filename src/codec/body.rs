//! Body codecs
//!
//! Serialize a resolver's typed result to bytes and back.

use serde::de::value::SeqDeserializer;
use serde::de::{self, DeserializeOwned, Deserializer, Visitor};
use serde::{forward_to_deserialize_any, Deserialize, Serialize};
use serde_json::Value;

use super::SerializationError;

/// Strategy for encoding result bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BodyCodec {
    /// Structured JSON encoding
    Json,
    /// MessagePack, field names kept so structs decode by name
    MsgPack,
    /// Compact positional binary encoding
    Bincode,
    /// String or byte passthrough
    Raw,
}

strategy_names!(BodyCodec {
    Json => "json",
    MsgPack => "msgpack",
    Bincode => "bincode",
    Raw => "string",
});

impl BodyCodec {
    pub fn marshal<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, SerializationError> {
        match self {
            BodyCodec::Json => Ok(serde_json::to_vec(value)?),
            BodyCodec::MsgPack => Ok(rmp_serde::to_vec_named(value)?),
            BodyCodec::Bincode => Ok(bincode::serialize(value)?),
            BodyCodec::Raw => marshal_raw(value),
        }
    }

    pub fn unmarshal<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, SerializationError> {
        match self {
            BodyCodec::Json => Ok(serde_json::from_slice(data)?),
            BodyCodec::MsgPack => Ok(rmp_serde::from_slice(data)?),
            BodyCodec::Bincode => Ok(bincode::deserialize(data)?),
            BodyCodec::Raw => Ok(T::deserialize(RawDeserializer(data.to_vec()))?),
        }
    }
}

// Only strings and byte sequences pass through untouched.
fn marshal_raw<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, SerializationError> {
    match serde_json::to_value(value)? {
        Value::String(text) => Ok(text.into_bytes()),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect::<Option<Vec<u8>>>()
            .ok_or(SerializationError::UnsupportedRawType),
        _ => Err(SerializationError::UnsupportedRawType),
    }
}

/// Hands stored bytes to a visitor as a string when they are UTF-8, as a byte
/// buffer otherwise, or as a sequence of bytes when one is requested.
struct RawDeserializer(Vec<u8>);

impl<'de> Deserializer<'de> for RawDeserializer {
    type Error = de::value::Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match String::from_utf8(self.0) {
            Ok(text) => visitor.visit_string(text),
            Err(err) => visitor.visit_byte_buf(err.into_bytes()),
        }
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_byte_buf(self.0)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_byte_buf(self.0)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        SeqDeserializer::<_, Self::Error>::new(self.0.into_iter()).deserialize_any(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        unit unit_struct tuple tuple_struct map struct enum identifier ignored_any
    }
}
