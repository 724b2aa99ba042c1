//! Serialization profile shared by every encode/decode call.
//!
//! A [`Codec`] is built once at startup and handed to whatever needs to
//! produce or consume wire bytes. Two replicas that encode the same value
//! with the same profile produce identical bytes, which is what keeps the
//! merkle root in agreement across the network.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Codec {
    /// Emit object keys in sorted order
    pub canonical: bool,
    /// Emit every integer as a decimal string
    pub integers_as_strings: bool,
}

impl Default for Codec {
    fn default() -> Self {
        Codec::canonical()
    }
}

impl Codec {
    /// The profile used for everything written into the ledger
    pub const fn canonical() -> Self {
        Codec {
            canonical: true,
            integers_as_strings: true,
        }
    }

    /// Plain serde_json output, used for logging and debugging only
    pub const fn plain() -> Self {
        Codec {
            canonical: false,
            integers_as_strings: false,
        }
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CoreError> {
        if !self.canonical && !self.integers_as_strings {
            return serde_json::to_vec(value).map_err(|e| CoreError::Serialization(e.to_string()));
        }

        let mut tree =
            serde_json::to_value(value).map_err(|e| CoreError::Serialization(e.to_string()))?;
        if self.integers_as_strings {
            stringify_integers(&mut tree);
        }
        if self.canonical {
            tree = sort_keys(tree);
        }
        serde_json::to_vec(&tree).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    /// Decoding accepts both integer encodings regardless of the profile.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CoreError> {
        serde_json::from_slice(bytes).map_err(|e| CoreError::Deserialization(e.to_string()))
    }

    pub fn decode_str<T: DeserializeOwned>(&self, s: &str) -> Result<T, CoreError> {
        self.decode(s.as_bytes())
    }
}

fn stringify_integers(value: &mut Value) {
    match value {
        Value::Number(n) if n.is_u64() || n.is_i64() => {
            *value = Value::String(n.to_string());
        }
        Value::Array(items) => items.iter_mut().for_each(stringify_integers),
        Value::Object(map) => map.values_mut().for_each(stringify_integers),
        _ => {}
    }
}

// Rebuilt explicitly so the output stays sorted even if serde_json's
// `preserve_order` feature gets unified into the build.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, sort_keys(v));
            }
            Value::Object(sorted)
        }
        other => other,
    }
}

/// Serialize to deterministic bincode bytes
pub fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CoreError> {
    bincode::serialize(value).map_err(|e| CoreError::Serialization(e.to_string()))
}

/// Deserialize from bincode bytes
pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CoreError> {
    bincode::deserialize(bytes).map_err(|e| CoreError::Deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_with::{serde_as, DisplayFromStr, PickFirst};
    use std::collections::BTreeMap;

    #[serde_as]
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        zeta: String,
        #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
        alpha: u64,
        rate: f64,
        keys: BTreeMap<u64, String>,
    }

    fn sample() -> Sample {
        let mut keys = BTreeMap::new();
        keys.insert(7, "seven".to_string());
        Sample {
            zeta: "z".to_string(),
            alpha: 42,
            rate: 0.25,
            keys,
        }
    }

    #[test]
    fn test_canonical_sorts_and_stringifies() {
        let bytes = Codec::canonical().encode(&sample()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            r#"{"alpha":"42","keys":{"7":"seven"},"rate":0.25,"zeta":"z"}"#
        );
    }

    #[test]
    fn test_decode_accepts_both_integer_forms() {
        let codec = Codec::canonical();
        let from_strings: Sample = codec.decode(&codec.encode(&sample()).unwrap()).unwrap();
        let from_numbers: Sample = codec
            .decode(&Codec::plain().encode(&sample()).unwrap())
            .unwrap();
        assert_eq!(from_strings, sample());
        assert_eq!(from_numbers, sample());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let codec = Codec::canonical();
        assert_eq!(codec.encode(&sample()).unwrap(), codec.encode(&sample()).unwrap());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result: Result<Sample, _> = Codec::canonical().decode(b"{not json");
        assert!(matches!(result, Err(CoreError::Deserialization(_))));
    }
}
