//! Opaque global ID encoding/decoding
//!
//! A global ID is `base64(tag + ":" + key)`. Decoding never fails: anything
//! that is not a well-formed ID comes back with the tag and/or key missing.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::key::NodeKey;

/// Separator between the collection tag and the key
pub const SEPARATOR: char = ':';

/// Result of decoding a global ID
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedId {
    pub tag: Option<String>,
    pub key: Option<String>,
}

impl DecodedId {
    /// Both segments, if the ID was well-formed
    pub fn parts(&self) -> Option<(&str, &str)> {
        match (&self.tag, &self.key) {
            (Some(tag), Some(key)) => Some((tag.as_str(), key.as_str())),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.parts().is_some()
    }
}

/// Global ID encoding/decoding
pub struct GlobalIdCodec;

impl GlobalIdCodec {
    /// Encode a collection tag and key into a global ID
    pub fn encode<K: NodeKey>(tag: &str, key: &K) -> String {
        Self::encode_raw(tag, &key.to_canonical())
    }

    /// Encode a tag and an already-canonical key
    pub fn encode_raw(tag: &str, key: &str) -> String {
        BASE64.encode(format!("{tag}{SEPARATOR}{key}").as_bytes())
    }

    /// Decode a global ID into its tag and key segments
    pub fn decode(id: &str) -> DecodedId {
        let Ok(bytes) = BASE64.decode(id.as_bytes()) else {
            return DecodedId::default();
        };
        let Ok(raw) = String::from_utf8(bytes) else {
            return DecodedId::default();
        };
        let Some((tag, key)) = raw.split_once(SEPARATOR) else {
            return DecodedId::default();
        };

        DecodedId {
            tag: non_empty(tag),
            key: non_empty(key),
        }
    }

    /// Decode a global ID and parse its key
    pub fn decode_key<K: NodeKey>(id: &str) -> Option<K> {
        Self::decode(id).key.as_deref().and_then(K::from_canonical)
    }
}

fn non_empty(segment: &str) -> Option<String> {
    if segment.is_empty() {
        None
    } else {
        Some(segment.to_string())
    }
}
