//! Key-value result store.
//!
//! Two operations are enough for result reconstruction: a secondary-index
//! query returning sparse item references, and a get-item by primary key.

pub mod dynamo;
pub mod memory;

pub use dynamo::DynamoStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use compost_shared::codec::base64_bytes;
use compost_shared::CompostError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One stored item, attribute name to value
pub type Item = HashMap<String, AttributeValue>;

/// Attribute values in DynamoDB wire form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    S(String),
    N(String),
    B(#[serde(with = "base64_bytes")] Vec<u8>),
    #[serde(rename = "BOOL")]
    Bool(bool),
    #[serde(rename = "NULL")]
    Null(bool),
    L(Vec<AttributeValue>),
    M(HashMap<String, AttributeValue>),
    #[serde(rename = "SS")]
    Ss(Vec<String>),
}

impl AttributeValue {
    pub fn s(value: &str) -> Self {
        AttributeValue::S(value.to_string())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            AttributeValue::B(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::N(n) => n.parse().ok(),
            _ => None,
        }
    }

    /// Ordered string list, from either a list of strings or a string set
    pub fn as_string_list(&self) -> Option<Vec<String>> {
        match self {
            AttributeValue::Ss(values) => Some(values.clone()),
            AttributeValue::L(values) => values
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => None,
        }
    }
}

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Items whose `key_name` equals `key_value` in a secondary index.
    /// Index projections may be sparse; callers re-fetch by primary key.
    async fn query_index(
        &self,
        table: &str,
        index: &str,
        key_name: &str,
        key_value: &str,
    ) -> Result<Vec<Item>, CompostError>;

    async fn get_item(
        &self,
        table: &str,
        key_name: &str,
        key_value: &str,
    ) -> Result<Option<Item>, CompostError>;
}
