//! Fixtures shared by the compostd integration tests.

#![allow(dead_code)]

use compost_shared::{Check, CheckResponse, HttpResponse, Notification, Target, TypedPayload};
use compostd::aggregator::CheckAggregator;
use compostd::backends::{FakeCheckService, FakeNotificationService, FakeStateHistory};
use compostd::config::StoreConfig;
use compostd::results::ResultStore;
use compostd::store::{AttributeValue, Item, MemoryStore};
use std::sync::Arc;

pub const CUSTOMER: &str = "cust-1";

pub struct Harness {
    pub checks: Arc<FakeCheckService>,
    pub notifications: Arc<FakeNotificationService>,
    pub store: Arc<MemoryStore>,
    pub config: StoreConfig,
    pub aggregator: CheckAggregator,
}

impl Harness {
    pub fn new(checks: Vec<Check>, notifications: Vec<Notification>) -> Self {
        Self::with_history(checks, notifications, FakeStateHistory::default())
    }

    pub fn with_history(checks: Vec<Check>, notifications: Vec<Notification>, history: FakeStateHistory) -> Self {
        let config = StoreConfig::default();
        let store = Arc::new(memory_store(&config));
        let checks = Arc::new(FakeCheckService::with_checks(checks));
        let notifications = Arc::new(FakeNotificationService::with_notifications(notifications));
        let results = ResultStore::new(store.clone(), config.clone());
        let aggregator = CheckAggregator::new(
            checks.clone(),
            notifications.clone(),
            Arc::new(history),
            Arc::new(results),
        );

        Self {
            checks,
            notifications,
            store,
            config,
            aggregator,
        }
    }

    /// Store one result for `check_id` whose responses are stored in the given order
    pub fn seed_result(&self, check_id: &str, result_id: &str, responses: &[CheckResponse]) {
        seed_result(&self.store, &self.config, check_id, result_id, responses);
    }
}

/// Empty store with every table and index the result store reads
pub fn memory_store(config: &StoreConfig) -> MemoryStore {
    MemoryStore::new()
        .with_table(&config.result_table, "result_id")
        .with_index(&config.result_table, &config.check_id_index, "check_id")
        .with_index(&config.result_table, &config.customer_id_index, "customer_id")
        .with_table(&config.response_table, "response_id")
}

pub fn seed_result(
    store: &MemoryStore,
    config: &StoreConfig,
    check_id: &str,
    result_id: &str,
    responses: &[CheckResponse],
) {
    let ids: Vec<AttributeValue> = responses
        .iter()
        .map(|r| AttributeValue::s(&r.response_id))
        .collect();

    store.put(
        &config.result_table,
        Item::from([
            ("result_id".to_string(), AttributeValue::s(result_id)),
            ("check_id".to_string(), AttributeValue::s(check_id)),
            ("customer_id".to_string(), AttributeValue::s(CUSTOMER)),
            ("timestamp".to_string(), AttributeValue::N("1466000000".to_string())),
            ("passing".to_string(), AttributeValue::Bool(true)),
            ("version".to_string(), AttributeValue::N("1".to_string())),
            ("responses".to_string(), AttributeValue::L(ids)),
        ]),
    );

    for response in responses {
        let payload = serde_json::to_vec(response).unwrap();
        store.put(
            &config.response_table,
            Item::from([
                ("response_id".to_string(), AttributeValue::s(&response.response_id)),
                (config.payload_attribute.clone(), AttributeValue::B(payload)),
            ]),
        );
    }
}

pub fn check(id: &str) -> Check {
    Check {
        id: id.to_string(),
        customer_id: CUSTOMER.to_string(),
        name: format!("{} check", id),
        interval: 60,
        target: Some(Target {
            id: "sg-123".to_string(),
            name: "web".to_string(),
            kind: "sg".to_string(),
            address: None,
        }),
        ..Default::default()
    }
}

/// A passing HTTP response carried only in serialized form
pub fn http_response(response_id: &str, code: i32) -> CheckResponse {
    CheckResponse {
        response_id: response_id.to_string(),
        response: Some(
            TypedPayload::encode(
                "HttpResponse",
                &HttpResponse {
                    code,
                    ..Default::default()
                },
            )
            .unwrap(),
        ),
        passing: code < 400,
        ..Default::default()
    }
}
