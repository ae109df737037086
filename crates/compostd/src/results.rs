//! Check result reconstruction from the result store.
//!
//! A result lives in three places: an index entry (sparse reference), the
//! result item (scalar fields plus a list of response ids) and one response
//! item per id holding the serialized response. Everything is fetched
//! sequentially and any failure aborts the whole fetch; no partial results.

use chrono::{TimeZone, Utc};
use compost_shared::{CheckResponse, CheckResult, CompostError};
use std::sync::Arc;
use tracing::{debug, error};

use crate::config::StoreConfig;
use crate::store::{AttributeValue, Item, KvStore};

const RESULT_KEY: &str = "result_id";
const RESPONSE_KEY: &str = "response_id";
const CHECK_ID_ATTR: &str = "check_id";
const CUSTOMER_ID_ATTR: &str = "customer_id";
const RESPONSES_ATTR: &str = "responses";

pub struct ResultStore {
    store: Arc<dyn KvStore>,
    config: StoreConfig,
}

impl ResultStore {
    pub fn new(store: Arc<dyn KvStore>, config: StoreConfig) -> Self {
        Self { store, config }
    }

    /// Results for one check (narrow index) or for every check the customer
    /// owns (broad index). Each result's responses keep the stored id order.
    pub async fn get_results(
        &self,
        customer_id: &str,
        check_id: Option<&str>,
    ) -> Result<Vec<CheckResult>, CompostError> {
        let (index, key_name, key_value) = match check_id {
            Some(id) => (&self.config.check_id_index, CHECK_ID_ATTR, id),
            None => (&self.config.customer_id_index, CUSTOMER_ID_ATTR, customer_id),
        };

        let hits = self
            .store
            .query_index(&self.config.result_table, index, key_name, key_value)
            .await
            .map_err(|e| {
                error!(customer_id, ?check_id, %index, error = %e, "Error querying result index");
                e
            })?;
        debug!(customer_id, ?check_id, hits = hits.len(), "result index query");

        let mut results = Vec::with_capacity(hits.len());
        for hit in &hits {
            let result_id = string_attr(hit, RESULT_KEY).ok_or_else(|| {
                error!(customer_id, ?check_id, "Index entry without result id");
                CompostError::StoreIntegrity(format!("{} entry without {}", index, RESULT_KEY))
            })?;
            results.push(self.fetch_result(customer_id, result_id).await?);
        }

        Ok(results)
    }

    async fn fetch_result(&self, customer_id: &str, result_id: &str) -> Result<CheckResult, CompostError> {
        let item = self
            .store
            .get_item(&self.config.result_table, RESULT_KEY, result_id)
            .await
            .map_err(|e| {
                error!(customer_id, result_id, error = %e, "Error getting result item");
                e
            })?
            .ok_or_else(|| {
                error!(customer_id, result_id, "Indexed result item is missing");
                CompostError::StoreIntegrity(format!("result {} is indexed but absent", result_id))
            })?;

        let mut result = result_from_item(&item, result_id)?;

        let response_ids = item
            .get(RESPONSES_ATTR)
            .and_then(AttributeValue::as_string_list)
            .ok_or_else(|| {
                error!(customer_id, result_id, "Result item has no response list");
                CompostError::StoreIntegrity(format!("result {} has no response list", result_id))
            })?;

        let mut responses = Vec::with_capacity(response_ids.len());
        for response_id in &response_ids {
            responses.push(self.fetch_response(customer_id, result_id, response_id).await?);
        }
        result.responses = responses;

        Ok(result)
    }

    async fn fetch_response(
        &self,
        customer_id: &str,
        result_id: &str,
        response_id: &str,
    ) -> Result<CheckResponse, CompostError> {
        let attr = &self.config.payload_attribute;
        let item = self
            .store
            .get_item(&self.config.response_table, RESPONSE_KEY, response_id)
            .await
            .map_err(|e| {
                error!(customer_id, result_id, response_id, error = %e, "Error getting response item");
                e
            })?
            .ok_or_else(|| {
                error!(customer_id, result_id, response_id, "Referenced response item is missing");
                CompostError::StoreIntegrity(format!("response {} is referenced but absent", response_id))
            })?;

        let payload = item.get(attr.as_str()).and_then(AttributeValue::as_bytes).ok_or_else(|| {
            error!(customer_id, result_id, response_id, "No {} on response item", attr);
            CompostError::StoreIntegrity(format!("response {} had no {}", response_id, attr))
        })?;

        let mut response: CheckResponse = serde_json::from_slice(payload).map_err(|e| {
            error!(customer_id, result_id, response_id, error = %e, "Error decoding response payload");
            CompostError::StoreIntegrity(format!("response {} payload undecodable: {}", response_id, e))
        })?;
        if response.response_id.is_empty() {
            response.response_id = response_id.to_string();
        }
        response.resolve_reply().map_err(|e| {
            CompostError::StoreIntegrity(format!("response {} reply undecodable: {}", response_id, e))
        })?;

        Ok(response)
    }
}

fn string_attr<'a>(item: &'a Item, name: &str) -> Option<&'a str> {
    item.get(name).and_then(AttributeValue::as_str)
}

fn result_from_item(item: &Item, result_id: &str) -> Result<CheckResult, CompostError> {
    let check_id = string_attr(item, CHECK_ID_ATTR).ok_or_else(|| {
        CompostError::StoreIntegrity(format!("result {} has no {}", result_id, CHECK_ID_ATTR))
    })?;

    Ok(CheckResult {
        check_id: check_id.to_string(),
        customer_id: string_attr(item, CUSTOMER_ID_ATTR).unwrap_or_default().to_string(),
        result_id: result_id.to_string(),
        timestamp: item
            .get("timestamp")
            .and_then(AttributeValue::as_i64)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        passing: item.get("passing").and_then(AttributeValue::as_bool).unwrap_or(false),
        bastion_id: string_attr(item, "bastion_id").unwrap_or_default().to_string(),
        version: version_attr(item, result_id)?,
        responses: Vec::new(),
    })
}

/// Absent versions read as 0; anything outside i32 is rejected.
fn version_attr(item: &Item, result_id: &str) -> Result<i32, CompostError> {
    match item.get("version").and_then(AttributeValue::as_i64) {
        None => Ok(0),
        Some(v) => i32::try_from(v).map_err(|_| {
            CompostError::StoreIntegrity(format!("result {} version {} out of range", result_id, v))
        }),
    }
}
