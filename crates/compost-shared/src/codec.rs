//! Serialized polymorphic payloads.
//!
//! Check specs and check responses travel in two forms: the typed variant,
//! and a `TypedPayload` carrying a type tag plus the variant's JSON bytes.
//! Older producers only fill in the payload, so readers resolve it by tag.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CompostError;

/// A type tag and an opaque serialized body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedPayload {
    pub type_url: String,
    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,
}

impl TypedPayload {
    pub fn encode<T: Serialize>(type_url: &str, value: &T) -> Result<Self, CompostError> {
        Ok(Self {
            type_url: type_url.to_string(),
            value: serde_json::to_vec(value)?,
        })
    }

    /// Bare type name, ignoring any `host/package.` prefix on the tag.
    pub fn type_name(&self) -> &str {
        let tail = self.type_url.rsplit('/').next().unwrap_or(&self.type_url);
        tail.rsplit('.').next().unwrap_or(tail)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CompostError> {
        Ok(serde_json::from_slice(&self.value)?)
    }
}

/// Serde adapter storing `Vec<u8>` as standard base64.
pub mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}
