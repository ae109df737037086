//! DynamoDB JSON 1.0 protocol client.
//!
//! Requests are unsigned; point the endpoint at DynamoDB Local or a signing
//! proxy that owns the credentials.

use async_trait::async_trait;
use compost_shared::CompostError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::{AttributeValue, Item, KvStore};

const TARGET_PREFIX: &str = "DynamoDB_20120810";
const CONTENT_TYPE: &str = "application/x-amz-json-1.0";

pub struct DynamoStore {
    endpoint: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct QueryOutput {
    #[serde(rename = "Items", default)]
    items: Vec<Item>,
    #[serde(rename = "LastEvaluatedKey")]
    last_evaluated_key: Option<Item>,
}

#[derive(Debug, Deserialize)]
struct GetItemOutput {
    #[serde(rename = "Item")]
    item: Option<Item>,
}

#[derive(Debug, Deserialize)]
struct ErrorOutput {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(alias = "Message", default)]
    message: String,
}

impl DynamoStore {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, CompostError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CompostError::Store(format!("client build failed: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn call<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        operation: &str,
        body: &B,
    ) -> Result<T, CompostError> {
        let response = self
            .http
            .post(format!("{}/", self.endpoint))
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .header("X-Amz-Target", format!("{}.{}", TARGET_PREFIX, operation))
            .json(body)
            .send()
            .await
            .map_err(|e| CompostError::Store(format!("{}: {}", operation, e)))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CompostError::Store(format!("{}: {}", operation, e)))?;

        if !status.is_success() {
            let detail = serde_json::from_slice::<ErrorOutput>(&bytes)
                .map(|e| format!("{} {}", e.kind.rsplit('#').next().unwrap_or(""), e.message))
                .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
            return Err(CompostError::Store(format!(
                "{} returned HTTP {}: {}",
                operation,
                status,
                detail.trim()
            )));
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| CompostError::Store(format!("{}: undecodable response: {}", operation, e)))
    }
}

#[async_trait]
impl KvStore for DynamoStore {
    async fn query_index(
        &self,
        table: &str,
        index: &str,
        key_name: &str,
        key_value: &str,
    ) -> Result<Vec<Item>, CompostError> {
        let mut items = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let mut body = json!({
                "TableName": table,
                "IndexName": index,
                "KeyConditionExpression": "#k = :v",
                "ExpressionAttributeNames": { "#k": key_name },
                "ExpressionAttributeValues": { ":v": AttributeValue::s(key_value) },
            });
            if let Some(key) = start_key.take() {
                body["ExclusiveStartKey"] = serde_json::to_value(key)?;
            }

            let output: QueryOutput = self.call("Query", &body).await?;
            debug!(table, index, count = output.items.len(), "query page");
            items.extend(output.items);

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => return Ok(items),
            }
        }
    }

    async fn get_item(
        &self,
        table: &str,
        key_name: &str,
        key_value: &str,
    ) -> Result<Option<Item>, CompostError> {
        let key: HashMap<&str, AttributeValue> =
            HashMap::from([(key_name, AttributeValue::s(key_value))]);
        let body = json!({ "TableName": table, "Key": key });

        let output: GetItemOutput = self.call("GetItem", &body).await?;
        Ok(output.item)
    }
}
