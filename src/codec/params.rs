//! Parameter codecs
//!
//! Renders call parameters into the canonical string that, together with the
//! cache key, identifies one stored entry.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::ser;
use serde::{Deserialize, Serialize, Serializer};

use super::SerializationError;

/// Strategy for turning parameters into a cache-key fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ParamCodec {
    /// Canonical JSON text
    Json,
    /// Canonical JSON, URL-safe base64 encoded
    JsonBase64,
}

strategy_names!(ParamCodec {
    Json => "json",
    JsonBase64 => "json+base64",
});

impl ParamCodec {
    /// Renders `params` deterministically.
    ///
    /// The value is first converted into a JSON tree, whose object keys are
    /// kept sorted, so maps with unspecified iteration order still render
    /// byte-for-byte identically.
    ///
    /// NaN and infinite floats are rejected: JSON has no spelling for them
    /// and writing `null` would collide with absent params.
    pub fn render<P: Serialize + ?Sized>(&self, params: &P) -> Result<String, SerializationError> {
        params.serialize(FiniteFloats)?;
        let canonical = serde_json::to_value(params)?;
        let text = serde_json::to_string(&canonical)?;
        match self {
            ParamCodec::Json => Ok(text),
            ParamCodec::JsonBase64 => Ok(URL_SAFE.encode(text)),
        }
    }

    /// Parses a rendered string back into parameters.
    pub fn parse<P: DeserializeOwned>(&self, rendered: &str) -> Result<P, SerializationError> {
        match self {
            ParamCodec::Json => Ok(serde_json::from_str(rendered)?),
            ParamCodec::JsonBase64 => {
                let raw = URL_SAFE.decode(rendered)?;
                Ok(serde_json::from_slice(&raw)?)
            }
        }
    }
}

// == Finite Float Check ==
/// Walks a value and fails on the first non-finite float.
struct FiniteFloats;

fn check_float(v: f64) -> Result<(), serde_json::Error> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(<serde_json::Error as ser::Error>::custom(format!("unsupported value: {v}")))
    }
}

macro_rules! accept {
    ($($method:ident($ty:ty)),+ $(,)?) => {
        $(fn $method(self, _v: $ty) -> Result<(), serde_json::Error> {
            Ok(())
        })+
    };
}

impl Serializer for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    accept!(
        serialize_bool(bool),
        serialize_i8(i8),
        serialize_i16(i16),
        serialize_i32(i32),
        serialize_i64(i64),
        serialize_i128(i128),
        serialize_u8(u8),
        serialize_u16(u16),
        serialize_u32(u32),
        serialize_u64(u64),
        serialize_u128(u128),
        serialize_char(char),
        serialize_str(&str),
        serialize_bytes(&[u8]),
        serialize_unit_struct(&'static str),
    );

    fn serialize_f32(self, v: f32) -> Result<(), serde_json::Error> {
        check_float(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<(), serde_json::Error> {
        check_float(v)
    }

    fn serialize_none(self) -> Result<(), serde_json::Error> {
        Ok(())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<(), serde_json::Error> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<(), serde_json::Error> {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
    ) -> Result<(), serde_json::Error> {
        Ok(())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        value.serialize(self)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self, serde_json::Error> {
        Ok(self)
    }
}

macro_rules! walk_elements {
    ($($trait:ident::$method:ident),+ $(,)?) => {
        $(impl ser::$trait for FiniteFloats {
            type Ok = ();
            type Error = serde_json::Error;

            fn $method<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), serde_json::Error> {
                value.serialize(FiniteFloats)
            }

            fn end(self) -> Result<(), serde_json::Error> {
                Ok(())
            }
        })+
    };
}

walk_elements!(
    SerializeSeq::serialize_element,
    SerializeTuple::serialize_element,
    SerializeTupleStruct::serialize_field,
    SerializeTupleVariant::serialize_field,
);

macro_rules! walk_fields {
    ($($trait:ident),+ $(,)?) => {
        $(impl ser::$trait for FiniteFloats {
            type Ok = ();
            type Error = serde_json::Error;

            fn serialize_field<T: Serialize + ?Sized>(
                &mut self,
                _key: &'static str,
                value: &T,
            ) -> Result<(), serde_json::Error> {
                value.serialize(FiniteFloats)
            }

            fn end(self) -> Result<(), serde_json::Error> {
                Ok(())
            }
        })+
    };
}

walk_fields!(SerializeStruct, SerializeStructVariant);

impl ser::SerializeMap for FiniteFloats {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), serde_json::Error> {
        key.serialize(FiniteFloats)
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), serde_json::Error> {
        value.serialize(FiniteFloats)
    }

    fn end(self) -> Result<(), serde_json::Error> {
        Ok(())
    }
}
