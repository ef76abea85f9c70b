//! Structured key-value body of quests and answers.
//!
//! [`Payload`] owns a string-keyed map of [`Value`]s and knows how to
//! serialize itself through the codec selected by a [`PayloadFormat`].
//! Typed reads come in two families:
//!
//! - `get_<t>(key) -> (T, bool)` never fails. A missing key or a value of an
//!   incompatible type yields `T::default()`; the flag reports whether the
//!   key exists.
//! - `want_<t>(key) -> Result<T>` fails with [`ProtocolError::MissingField`]
//!   or [`ProtocolError::TypeConversion`].

use std::collections::btree_map;
use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ProtocolError, Result};
use crate::framing::FrameFlags;
use crate::value::Value;

/// Serialization format of a payload, selected by the frame's codec flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PayloadFormat {
    /// MessagePack (`rmp-serde`).
    #[default]
    MessagePack,
    /// JSON (`serde_json`).
    Json,
}

impl PayloadFormat {
    /// Codec bit written into the frame flags.
    pub fn flag(self) -> u8 {
        match self {
            PayloadFormat::MessagePack => FrameFlags::MSGPACK,
            PayloadFormat::Json => FrameFlags::JSON,
        }
    }

    /// Selects the format from a frame flag byte.
    pub fn from_flags(flags: u8) -> Result<Self> {
        let flags = FrameFlags(flags);
        match (flags.has(FrameFlags::MSGPACK), flags.has(FrameFlags::JSON)) {
            (true, false) => Ok(PayloadFormat::MessagePack),
            (false, true) => Ok(PayloadFormat::Json),
            _ => Err(ProtocolError::InvalidFrameFlags(flags.0)),
        }
    }
}

/// String-keyed map of payload values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Payload(BTreeMap<String, Value>);

fn mismatch(key: &str, expected: &'static str, found: &Value) -> ProtocolError {
    ProtocolError::TypeConversion {
        key: key.to_string(),
        expected,
        found: found.type_name(),
    }
}

macro_rules! numeric_accessors {
    ($($get:ident, $want:ident, $t:ty, $conv:ident;)*) => {
        $(
            #[doc = concat!("Speculative `", stringify!($t), "` read.")]
            pub fn $get(&self, key: &str) -> ($t, bool) {
                match self.0.get(key) {
                    Some(v) => (v.$conv().map(|n| n as $t).unwrap_or_default(), true),
                    None => (<$t>::default(), false),
                }
            }

            #[doc = concat!("Assertive `", stringify!($t), "` read.")]
            pub fn $want(&self, key: &str) -> Result<$t> {
                let v = self.require(key)?;
                v.$conv()
                    .map(|n| n as $t)
                    .ok_or_else(|| mismatch(key, stringify!($t), v))
            }
        )*
    };
}

impl Payload {
    /// Creates an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning the previous one for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder form of [`Payload::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    /// Consumes the payload, returning the underlying map.
    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }

    fn require(&self, key: &str) -> Result<&Value> {
        self.0
            .get(key)
            .ok_or_else(|| ProtocolError::MissingField(key.to_string()))
    }

    numeric_accessors! {
        get_i64, want_i64, i64, as_i64;
        get_i32, want_i32, i32, as_i64;
        get_i16, want_i16, i16, as_i64;
        get_i8, want_i8, i8, as_i64;
        get_u64, want_u64, u64, as_u64;
        get_u32, want_u32, u32, as_u64;
        get_u16, want_u16, u16, as_u64;
        get_u8, want_u8, u8, as_u64;
        get_f64, want_f64, f64, as_f64;
        get_f32, want_f32, f32, as_f64;
    }

    pub fn get_bool(&self, key: &str) -> (bool, bool) {
        match self.0.get(key) {
            Some(v) => (v.as_bool().unwrap_or_default(), true),
            None => (false, false),
        }
    }

    pub fn want_bool(&self, key: &str) -> Result<bool> {
        let v = self.require(key)?;
        v.as_bool().ok_or_else(|| mismatch(key, "bool", v))
    }

    /// Speculative string read; accepts `String` and `Bytes` values.
    pub fn get_string(&self, key: &str) -> (String, bool) {
        match self.0.get(key) {
            Some(v) => (v.as_str().map(|s| s.into_owned()).unwrap_or_default(), true),
            None => (String::new(), false),
        }
    }

    pub fn want_string(&self, key: &str) -> Result<String> {
        let v = self.require(key)?;
        v.as_str()
            .map(|s| s.into_owned())
            .ok_or_else(|| mismatch(key, "string", v))
    }

    /// Speculative byte read; accepts `Bytes` and `String` values.
    pub fn get_bytes(&self, key: &str) -> (Vec<u8>, bool) {
        match self.0.get(key) {
            Some(v) => (v.as_bytes().map(<[u8]>::to_vec).unwrap_or_default(), true),
            None => (Vec::new(), false),
        }
    }

    pub fn want_bytes(&self, key: &str) -> Result<Vec<u8>> {
        let v = self.require(key)?;
        v.as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| mismatch(key, "bytes", v))
    }

    pub fn get_array(&self, key: &str) -> (Vec<Value>, bool) {
        match self.0.get(key) {
            Some(v) => (v.as_array().map(<[Value]>::to_vec).unwrap_or_default(), true),
            None => (Vec::new(), false),
        }
    }

    pub fn want_array(&self, key: &str) -> Result<Vec<Value>> {
        let v = self.require(key)?;
        v.as_array()
            .map(<[Value]>::to_vec)
            .ok_or_else(|| mismatch(key, "array", v))
    }

    pub fn get_map(&self, key: &str) -> (BTreeMap<String, Value>, bool) {
        match self.0.get(key) {
            Some(v) => (v.as_map().cloned().unwrap_or_default(), true),
            None => (BTreeMap::new(), false),
        }
    }

    pub fn want_map(&self, key: &str) -> Result<BTreeMap<String, Value>> {
        let v = self.require(key)?;
        v.as_map().cloned().ok_or_else(|| mismatch(key, "map", v))
    }

    /// Speculative read of a nested map as a [`Payload`].
    pub fn get_dict(&self, key: &str) -> (Payload, bool) {
        let (map, found) = self.get_map(key);
        (Payload(map), found)
    }

    pub fn want_dict(&self, key: &str) -> Result<Payload> {
        self.want_map(key).map(Payload)
    }

    /// Serializes the payload with the given codec.
    pub fn encode(&self, format: PayloadFormat) -> Result<Vec<u8>> {
        match format {
            PayloadFormat::MessagePack => Ok(rmp_serde::to_vec(self)?),
            PayloadFormat::Json => Ok(serde_json::to_vec(self)?),
        }
    }

    /// Deserializes a payload. An empty slice yields an empty payload.
    pub fn decode(format: PayloadFormat, bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(Self::new());
        }
        match format {
            PayloadFormat::MessagePack => Ok(rmp_serde::from_slice(bytes)?),
            PayloadFormat::Json => Ok(serde_json::from_slice(bytes)?),
        }
    }
}

impl From<BTreeMap<String, Value>> for Payload {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Payload(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Payload(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for Payload {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Payload {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Serialize for Payload {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Map(map) => Ok(Payload(map)),
            Value::Null => Ok(Payload::new()),
            other => Err(serde::de::Error::custom(format!(
                "payload must be a map, found {}",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Payload {
        Payload::new()
            .with("int", -7i64)
            .with("big", u64::MAX)
            .with("float", 3.75f64)
            .with("flag", true)
            .with("name", "alice")
            .with("raw", b"bin".to_vec())
            .with("list", vec![Value::Int(1), Value::from("two")])
            .with("nested", Payload::new().with("depth", 2))
    }

    #[test]
    fn test_speculative_numeric_coercion() {
        let p = sample();
        assert_eq!(p.get_i32("int"), (-7, true));
        assert_eq!(p.get_i64("float"), (3, true));
        assert_eq!(p.get_f32("int"), (-7.0, true));
        assert_eq!(p.get_u8("float"), (3, true));
        assert_eq!(p.get_u64("big"), (u64::MAX, true));
    }

    #[test]
    fn test_speculative_mismatch_yields_default_and_presence() {
        let p = sample();
        assert_eq!(p.get_i64("name"), (0, true));
        assert_eq!(p.get_bool("int"), (false, true));
        assert_eq!(p.get_i64("absent"), (0, false));
        assert_eq!(p.get_string("absent"), (String::new(), false));
    }

    #[test]
    fn test_narrowing_truncates() {
        let p = Payload::new().with("n", 300i64);
        assert_eq!(p.get_u8("n"), (44, true));
        assert_eq!(p.want_i8("n").unwrap(), 44);
    }

    #[test]
    fn test_string_bytes_interchangeable() {
        let p = sample();
        assert_eq!(p.want_string("raw").unwrap(), "bin");
        assert_eq!(p.want_bytes("name").unwrap(), b"alice".to_vec());
    }

    #[test]
    fn test_want_missing_field() {
        let err = sample().want_i64("absent").unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField(ref k) if k == "absent"));
    }

    #[test]
    fn test_want_type_conversion() {
        let err = sample().want_bool("int").unwrap_err();
        match err {
            ProtocolError::TypeConversion {
                key,
                expected,
                found,
            } => {
                assert_eq!(key, "int");
                assert_eq!(expected, "bool");
                assert_eq!(found, "int");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_nested_dict() {
        let p = sample();
        let (nested, found) = p.get_dict("nested");
        assert!(found);
        assert_eq!(nested.get_i64("depth"), (2, true));
        assert!(p.want_dict("name").is_err());
        assert_eq!(p.want_array("list").unwrap().len(), 2);
    }

    #[test]
    fn test_msgpack_codec_roundtrip() {
        let p = sample();
        let bytes = p.encode(PayloadFormat::MessagePack).unwrap();
        let decoded = Payload::decode(PayloadFormat::MessagePack, &bytes).unwrap();
        assert_eq!(decoded, p);
    }

    #[test]
    fn test_json_codec_roundtrip() {
        let p = Payload::new()
            .with("x", 1)
            .with("s", "text")
            .with("list", vec![Value::Bool(false), Value::Null]);
        let bytes = p.encode(PayloadFormat::Json).unwrap();
        let decoded = Payload::decode(PayloadFormat::Json, &bytes).unwrap();
        assert_eq!(decoded, p);
    }

    #[test]
    fn test_decode_empty_slice() {
        assert!(Payload::decode(PayloadFormat::MessagePack, &[])
            .unwrap()
            .is_empty());
        assert!(Payload::decode(PayloadFormat::Json, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_decode_rejects_non_map() {
        let bytes = rmp_serde::to_vec(&Value::Int(5)).unwrap();
        let err = Payload::decode(PayloadFormat::MessagePack, &bytes).unwrap_err();
        assert!(matches!(err, ProtocolError::Deserialization(_)));
    }

    #[test]
    fn test_format_from_flags() {
        assert_eq!(
            PayloadFormat::from_flags(FrameFlags::MSGPACK).unwrap(),
            PayloadFormat::MessagePack
        );
        assert_eq!(
            PayloadFormat::from_flags(FrameFlags::JSON | FrameFlags::ENCRYPT).unwrap(),
            PayloadFormat::Json
        );
        assert!(PayloadFormat::from_flags(0).is_err());
        assert!(PayloadFormat::from_flags(FrameFlags::MSGPACK | FrameFlags::JSON).is_err());
    }

    #[test]
    fn test_from_iterator() {
        let p: Payload = [("a", 1), ("b", 2)].into_iter().collect();
        assert_eq!(p.len(), 2);
        assert_eq!(p.get_i64("b"), (2, true));
    }
}
