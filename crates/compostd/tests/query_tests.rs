//! Query executor and HTTP surface tests

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{check, http_response, Harness, CUSTOMER};
use compost_shared::{Datapoint, Instance, InstanceKind, Notification, User};
use compostd::backends::FakeCloudProvider;
use compostd::config::{DirectoryConfig, DispatcherConfig};
use compostd::directory::FakeDirectory;
use compostd::dispatcher::{FakeWorkerConnector, TestDispatcher};
use compostd::query::{MutationRequest, QueryExecutor, QueryRequest};
use compostd::server::{self, AppState};
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn instance(kind: InstanceKind, id: &str) -> Instance {
    Instance {
        kind,
        id: id.to_string(),
        attributes: json!({"state": "running"}),
    }
}

fn executor(harness: Harness, cloud: Arc<FakeCloudProvider>) -> QueryExecutor {
    let dispatcher = TestDispatcher::new(
        Arc::new(FakeDirectory::new()),
        Arc::new(FakeWorkerConnector::new()),
        DirectoryConfig::default(),
        DispatcherConfig::default(),
    );
    QueryExecutor::new(Arc::new(harness.aggregator), Arc::new(dispatcher), cloud)
}

fn default_cloud() -> Arc<FakeCloudProvider> {
    let point = Datapoint {
        timestamp: Utc.with_ymd_and_hms(2016, 6, 15, 12, 0, 0).unwrap(),
        value: 42.5,
        unit: "Percent".to_string(),
    };
    Arc::new(
        FakeCloudProvider::new(vec![
            instance(InstanceKind::Ec2, "i-1"),
            instance(InstanceKind::Ec2, "i-2"),
            instance(InstanceKind::Rds, "db-1"),
        ])
        .with_metric("CPUUtilization", vec![point]),
    )
}

fn parse<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> T {
    serde_json::from_value(value).unwrap()
}

// ============================================================================
// Executor
// ============================================================================

#[tokio::test]
async fn test_instances_read_region_and_vpc() {
    let cloud = default_cloud();
    let exec = executor(Harness::new(vec![], vec![]), cloud.clone());

    let response = exec
        .query(
            &User::new(CUSTOMER),
            parse(json!({"region": {"id": "us-west-2", "vpc": {"id": "vpc-1",
                "instances": {"type": "ec2", "metrics": ["CPUUtilization"]}}}})),
        )
        .await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);

    let region = response.region.unwrap();
    assert_eq!(region.id, "us-west-2");
    let instances = region.vpc.unwrap().instances.unwrap();
    let ids: Vec<_> = instances.iter().map(|i| i.instance.id.as_str()).collect();
    assert_eq!(ids, vec!["i-1", "i-2"]);
    assert_eq!(instances[0].metrics["CPUUtilization"][0].value, 42.5);

    let calls = cloud.listing_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].region, "us-west-2");
    assert_eq!(calls[0].vpc, "vpc-1");
    assert_eq!(calls[0].kind, InstanceKind::Ec2);
}

#[tokio::test]
async fn test_missing_vpc_is_field_error() {
    let cloud = default_cloud();
    let exec = executor(Harness::new(vec![check("c1")], vec![]), cloud.clone());

    let response = exec
        .query(
            &User::new(CUSTOMER),
            parse(json!({
                "checks": {},
                "region": {"id": "us-west-2", "vpc": {"id": "", "instances": {"type": "ec2"}}}
            })),
        )
        .await;

    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].path, "region.vpc");
    assert_eq!(response.errors[0].message, "missing vpc id");
    assert!(response.region.unwrap().vpc.is_none());
    assert_eq!(response.checks.unwrap().len(), 1);
    assert!(cloud.listing_calls().is_empty());
}

#[tokio::test]
async fn test_missing_region_is_field_error() {
    let exec = executor(Harness::new(vec![], vec![]), default_cloud());
    let response = exec
        .query(&User::new(CUSTOMER), parse(json!({"region": {"id": ""}})))
        .await;
    assert!(response.region.is_none());
    assert_eq!(response.errors[0].path, "region");
    assert_eq!(response.errors[0].message, "missing region id");
}

#[tokio::test]
async fn test_instance_type_and_metric_errors() {
    let exec = executor(Harness::new(vec![], vec![]), default_cloud());
    let user = User::new(CUSTOMER);

    let response = exec
        .query(
            &user,
            parse(json!({"region": {"id": "us-west-2", "vpc": {"id": "vpc-1", "instances": {"type": ""}}}})),
        )
        .await;
    assert_eq!(response.errors[0].path, "region.vpc.instances");
    assert!(response.errors[0].message.starts_with("missing instance type"));

    let response = exec
        .query(
            &user,
            parse(json!({"region": {"id": "us-west-2", "vpc": {"id": "vpc-1", "instances": {"type": "elb"}}}})),
        )
        .await;
    assert_eq!(response.errors[0].message, "instance type not known: elb");

    let response = exec
        .query(
            &user,
            parse(json!({
                "checks": {},
                "region": {"id": "us-west-2", "vpc": {"id": "vpc-1",
                    "instances": {"type": "rds", "metrics": ["CPUUtilization", "Bogus"]}}}
            })),
        )
        .await;
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].message, "no metric named Bogus");
    assert!(response.checks.is_some());
    assert!(response.region.unwrap().vpc.unwrap().instances.is_none());
}

#[tokio::test]
async fn test_test_check_without_workers_is_field_error() {
    let exec = executor(Harness::new(vec![], vec![]), default_cloud());
    let response = exec
        .query(
            &User::new(CUSTOMER),
            parse(json!({"test_check": {"name": "t", "target": {"id": "sg-1", "type": "sg"}}})),
        )
        .await;
    assert!(response.test_check.is_none());
    assert_eq!(response.errors[0].path, "test_check");
    assert_eq!(response.errors[0].message, "no workers found for cust-1");
}

#[tokio::test]
async fn test_mutation_fields_resolve_independently() {
    let harness = Harness::new(vec![check("c1")], vec![]);
    let exec = executor(harness, default_cloud());

    let request: MutationRequest = parse(json!({
        "upsert_checks": [{"name": "fresh", "notifications": [{"type": "email", "value": "a@x"}]}],
        "delete_checks": [7]
    }));
    let response = exec.mutate(&User::new(CUSTOMER), request).await;

    assert_eq!(response.upsert_checks.unwrap()[0].notifications.len(), 1);
    assert!(response.delete_checks.is_none());
    assert_eq!(response.errors[0].path, "delete_checks");
}

// ============================================================================
// HTTP surface
// ============================================================================

fn app() -> axum::Router {
    let harness = Harness::new(vec![check("c1")], vec![Notification::new("c1", "email", "a@x")]);
    harness.seed_result("c1", "r1", &[http_response("resp-1", 200)]);
    server::router(AppState::new(executor(harness, default_cloud())), Duration::from_secs(5))
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = http_body_util::BodyExt::collect(response.into_body())
        .await
        .unwrap()
        .to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_query_route_returns_checks() {
    let request = Request::post("/v1/query")
        .header("x-customer-id", CUSTOMER)
        .header("content-type", "application/json")
        .body(Body::from(r#"{"checks": {"id": "c1"}}"#))
        .unwrap();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["checks"][0]["id"], "c1");
    assert_eq!(body["checks"][0]["notifications"][0]["type"], "email");
    assert_eq!(body["checks"][0]["results"][0]["responses"][0]["response_id"], "resp-1");
    assert!(body.get("errors").is_none());
}

#[tokio::test]
async fn test_query_route_requires_customer() {
    let request = Request::post("/v1/query")
        .body(Body::from(r#"{"checks": {}}"#))
        .unwrap();
    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let request = Request::post("/v1/mutation")
        .header("x-customer-id", CUSTOMER)
        .body(Body::from("{"))
        .unwrap();
    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_route() {
    let request = Request::get("/v1/health").body(Body::empty()).unwrap();
    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "healthy");
}

#[test]
fn test_query_request_ignores_absent_fields() {
    let request: QueryRequest = parse(json!({}));
    assert!(request.checks.is_none());
    assert!(request.region.is_none());
    assert!(request.test_check.is_none());
    assert!(request.check_state_transitions.is_none());
}
