//! Check aggregation tests
//!
//! Fake check, notification and history backends over an in-memory result
//! store; no network.

mod common;

use chrono::{TimeZone, Utc};
use common::{check, http_response, Harness, CUSTOMER};
use compost_shared::{CheckReply, CheckSpec, CompostError, HttpCheck, Notification, StateTransition, TypedPayload, User};
use compostd::backends::FakeStateHistory;
use compostd::results::ResultStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn user() -> User {
    User::new(CUSTOMER)
}

// ============================================================================
// list_checks
// ============================================================================

/// c1 has three results and one notification, c2 has neither
#[tokio::test]
async fn test_checks_are_enriched() {
    let harness = Harness::new(
        vec![check("c1"), check("c2")],
        vec![Notification::new("c1", "email", "a@x")],
    );
    harness.seed_result("c1", "r1", &[http_response("resp-1", 200)]);
    harness.seed_result("c1", "r2", &[http_response("resp-2", 500)]);
    harness.seed_result("c1", "r3", &[http_response("resp-3", 204)]);

    let checks = harness.aggregator.list_checks(&user(), None).await.unwrap();
    let ids: Vec<_> = checks.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["c1", "c2"]);

    assert_eq!(checks[0].notifications, vec![Notification::new("c1", "email", "a@x")]);
    let result_ids: Vec<_> = checks[0].results.iter().map(|r| r.result_id.as_str()).collect();
    assert_eq!(result_ids, vec!["r1", "r2", "r3"]);

    assert!(checks[1].notifications.is_empty());
    assert!(checks[1].results.is_empty());
}

#[tokio::test]
async fn test_single_check_lookup() {
    let harness = Harness::new(
        vec![check("c1"), check("c2")],
        vec![
            Notification::new("c1", "email", "a@x"),
            Notification::new("c2", "slack_bot", "#ops"),
        ],
    );

    let checks = harness.aggregator.list_checks(&user(), Some("c2")).await.unwrap();
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0].id, "c2");
    assert_eq!(checks[0].notifications.len(), 1);
    assert_eq!(checks[0].notifications[0].kind, "slack_bot");
}

#[tokio::test]
async fn test_notification_failure_degrades() {
    let harness = Harness::new(vec![check("c1")], vec![Notification::new("c1", "email", "a@x")]);
    harness.notifications.set_failing(true);

    let checks = harness.aggregator.list_checks(&user(), None).await.unwrap();
    assert_eq!(checks.len(), 1);
    assert!(checks[0].notifications.is_empty());
}

#[tokio::test]
async fn test_check_listing_failure_is_fatal() {
    let harness = Harness::new(vec![check("c1")], vec![]);
    harness.notifications.set_delay(Duration::from_millis(50));
    harness.checks.set_failing(true);

    let err = harness.aggregator.list_checks(&user(), None).await.unwrap_err();
    assert!(matches!(err, CompostError::Backend { service: "bartnet", .. }));
    assert_eq!(harness.store.query_count(), 0);
}

#[tokio::test]
async fn test_slow_notifications_are_joined() {
    let harness = Harness::new(vec![check("c1")], vec![Notification::new("c1", "email", "a@x")]);
    harness.notifications.set_delay(Duration::from_millis(100));

    let checks = harness.aggregator.list_checks(&user(), None).await.unwrap();
    assert_eq!(checks[0].notifications.len(), 1);
    assert_eq!(harness.notifications.list_calls(), 1);
}

#[tokio::test]
async fn test_cancelled_listing_drops_notification_call() {
    let harness = Harness::new(vec![check("c1")], vec![Notification::new("c1", "email", "a@x")]);
    harness.notifications.set_delay(Duration::from_secs(600));
    // held by the harness and the aggregator
    let idle = Arc::strong_count(&harness.notifications);

    let binding = user();
    let listing = harness.aggregator.list_checks(&binding, None);
    assert!(tokio::time::timeout(Duration::from_millis(100), listing).await.is_err());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(Arc::strong_count(&harness.notifications), idle);
}

#[tokio::test]
async fn test_result_failure_fails_whole_call() {
    let harness = Harness::new(vec![check("c1"), check("c2")], vec![]);
    harness.seed_result("c1", "r1", &[http_response("resp-1", 200)]);
    harness.store.fail_table(&harness.config.response_table);

    let err = harness.aggregator.list_checks(&user(), None).await.unwrap_err();
    assert!(matches!(err, CompostError::Store(_)));
}

#[tokio::test]
async fn test_missing_payload_is_integrity_error() {
    let harness = Harness::new(vec![check("c1")], vec![]);
    harness.seed_result("c1", "r1", &[http_response("resp-1", 200)]);
    harness
        .store
        .strip_attribute(&harness.config.response_table, "resp-1", &harness.config.payload_attribute);

    let err = harness.aggregator.list_checks(&user(), None).await.unwrap_err();
    match err {
        CompostError::StoreIntegrity(msg) => assert!(msg.contains("response_protobuf"), "{}", msg),
        other => panic!("expected integrity error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_responses_keep_stored_order() {
    let harness = Harness::new(vec![check("c1")], vec![]);
    harness.seed_result(
        "c1",
        "r1",
        &[
            http_response("resp-b", 200),
            http_response("resp-a", 500),
            http_response("resp-c", 204),
        ],
    );

    let checks = harness.aggregator.list_checks(&user(), None).await.unwrap();
    let result = &checks[0].results[0];
    let ids: Vec<_> = result.responses.iter().map(|r| r.response_id.as_str()).collect();
    assert_eq!(ids, vec!["resp-b", "resp-a", "resp-c"]);

    match &result.responses[1].reply {
        Some(CheckReply::Http(reply)) => assert_eq!(reply.code, 500),
        other => panic!("expected http reply, got {:?}", other),
    }
}

/// Every result for the customer, across checks, each with its responses
#[tokio::test]
async fn test_customer_wide_results() {
    let harness = Harness::new(vec![], vec![]);
    harness.seed_result("c1", "r1", &[http_response("resp-1a", 200), http_response("resp-1b", 503)]);
    harness.seed_result("c2", "r2", &[http_response("resp-2", 200)]);

    let results = ResultStore::new(harness.store.clone(), harness.config.clone())
        .get_results(CUSTOMER, None)
        .await
        .unwrap();

    let by_check: Vec<_> = results
        .iter()
        .map(|r| (r.check_id.as_str(), r.result_id.as_str()))
        .collect();
    assert_eq!(by_check, vec![("c1", "r1"), ("c2", "r2")]);

    let first: Vec<_> = results[0].responses.iter().map(|r| r.response_id.as_str()).collect();
    assert_eq!(first, vec!["resp-1a", "resp-1b"]);
    assert_eq!(results[1].responses.len(), 1);
    assert!(results.iter().all(|r| r.customer_id == CUSTOMER));
}

#[tokio::test]
async fn test_serialized_spec_is_resolved() {
    let mut tagged = check("c1");
    tagged.check_spec = Some(
        TypedPayload::encode(
            "HttpCheck",
            &HttpCheck {
                path: "/health".to_string(),
                port: 443,
                ..Default::default()
            },
        )
        .unwrap(),
    );
    let mut unknown = check("c2");
    unknown.check_spec = Some(TypedPayload {
        type_url: "PingCheck".to_string(),
        value: b"{}".to_vec(),
    });

    let harness = Harness::new(vec![tagged, unknown], vec![]);
    let checks = harness.aggregator.list_checks(&user(), None).await.unwrap();

    match &checks[0].spec {
        Some(CheckSpec::Http(spec)) => assert_eq!(spec.port, 443),
        other => panic!("expected http spec, got {:?}", other),
    }
    assert!(checks[1].spec.is_none());
}

// ============================================================================
// upsert_checks / delete_checks
// ============================================================================

#[tokio::test]
async fn test_upsert_then_list_carries_notifications() {
    let harness = Harness::new(vec![], vec![]);

    let saved = harness
        .aggregator
        .upsert_checks(
            &user(),
            vec![json!({
                "name": "new check",
                "target": {"id": "sg-1", "type": "sg"},
                "notifications": [
                    {"type": "email", "value": "a@x"},
                    {"type": "slack_bot", "value": ""}
                ]
            })],
        )
        .await
        .unwrap();
    assert_eq!(saved.len(), 1);
    assert!(!saved[0].id.is_empty());
    assert_eq!(saved[0].notifications.len(), 1);

    let listed = harness.aggregator.list_checks(&user(), None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, saved[0].id);
    assert_eq!(listed[0].notifications, vec![Notification::new(&saved[0].id, "email", "a@x")]);
}

#[tokio::test]
async fn test_upsert_updates_existing() {
    let harness = Harness::new(vec![check("c1")], vec![]);

    let saved = harness
        .aggregator
        .upsert_checks(&user(), vec![json!({"id": "c1", "name": "renamed"})])
        .await
        .unwrap();
    assert_eq!(saved[0].id, "c1");
    assert_eq!(harness.checks.stored()[0].name, "renamed");
}

#[tokio::test]
async fn test_upsert_aborts_at_first_failure() {
    let harness = Harness::new(vec![], vec![]);
    harness.checks.fail_writes_after(1);

    let err = harness
        .aggregator
        .upsert_checks(&user(), vec![json!({"name": "first"}), json!({"name": "second"}), json!({"name": "third"})])
        .await
        .unwrap_err();
    assert!(matches!(err, CompostError::Backend { .. }));

    let stored = harness.checks.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].name, "first");
}

#[tokio::test]
async fn test_upsert_rejects_non_object() {
    let harness = Harness::new(vec![], vec![]);
    let err = harness
        .aggregator
        .upsert_checks(&user(), vec![json!("c1")])
        .await
        .unwrap_err();
    assert!(matches!(err, CompostError::InvalidInput(_)));
}

#[tokio::test]
async fn test_delete_stops_at_first_failure() {
    let harness = Harness::new(vec![check("c1"), check("c2"), check("c3")], vec![]);

    let err = harness
        .aggregator
        .delete_checks(&user(), vec![json!("c1"), json!("missing"), json!("c3")])
        .await
        .unwrap_err();
    assert!(matches!(err, CompostError::Backend { .. }));

    let remaining: Vec<_> = harness.checks.stored().into_iter().map(|c| c.id).collect();
    assert_eq!(remaining, vec!["c2", "c3"]);
}

#[tokio::test]
async fn test_delete_returns_ids() {
    let harness = Harness::new(vec![check("c1"), check("c2")], vec![]);
    let deleted = harness
        .aggregator
        .delete_checks(&user(), vec![json!("c2"), json!("c1")])
        .await
        .unwrap();
    assert_eq!(deleted, vec!["c2", "c1"]);
    assert!(harness.checks.stored().is_empty());
}

// ============================================================================
// check_state_transitions
// ============================================================================

#[tokio::test]
async fn test_transitions_are_windowed() {
    let at = |h| Utc.with_ymd_and_hms(2016, 6, 15, h, 0, 0).unwrap();
    let transition = |h, to: &str| StateTransition {
        check_id: "c1".to_string(),
        customer_id: CUSTOMER.to_string(),
        from: "OK".to_string(),
        to: to.to_string(),
        occurred_at: at(h),
    };
    let history = FakeStateHistory::with_transitions(vec![
        transition(1, "FAIL_WAIT"),
        transition(5, "FAIL"),
        transition(9, "OK"),
    ]);
    let harness = Harness::with_history(vec![check("c1")], vec![], history);

    let transitions = harness
        .aggregator
        .check_state_transitions(&user(), "c1", at(4), at(10))
        .await
        .unwrap();
    let states: Vec<_> = transitions.iter().map(|t| t.to.as_str()).collect();
    assert_eq!(states, vec!["FAIL", "OK"]);

    assert!(harness
        .aggregator
        .check_state_transitions(&user(), "", at(4), at(10))
        .await
        .is_err());
}
