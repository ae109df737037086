//! API routes for compostd
//!
//! The caller identity arrives in headers set by the authenticating proxy in
//! front of us; `x-customer-id` is required.

use crate::query::{MutationRequest, MutationResponse, QueryRequest, QueryResponse};
use crate::server::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use compost_shared::{CompostError, User};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

type AppStateArc = Arc<AppState>;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const CUSTOMER_ID_HEADER: &str = "x-customer-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

// ============================================================================
// Query Routes
// ============================================================================

pub fn query_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/query", post(run_query))
        .route("/v1/mutation", post(run_mutation))
}

async fn run_query(
    State(state): State<AppStateArc>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<QueryResponse>, (StatusCode, String)> {
    let user = decode_user(&headers).map_err(unauthorized)?;
    let request: QueryRequest = decode_body(&body)?;
    info!(customer_id = %user.customer_id, "query");

    Ok(Json(state.executor.query(&user, request).await))
}

async fn run_mutation(
    State(state): State<AppStateArc>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MutationResponse>, (StatusCode, String)> {
    let user = decode_user(&headers).map_err(unauthorized)?;
    let request: MutationRequest = decode_body(&body)?;
    info!(customer_id = %user.customer_id, "mutation");

    Ok(Json(state.executor.mutate(&user, request).await))
}

/// Caller identity from the proxy headers
pub fn decode_user(headers: &HeaderMap) -> Result<User, CompostError> {
    let customer_id = header_value(headers, CUSTOMER_ID_HEADER)?
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(CompostError::DecodeUser)?;
    let id = match header_value(headers, USER_ID_HEADER)? {
        Some(raw) => raw.trim().parse().map_err(|_| CompostError::DecodeUser)?,
        None => 0,
    };

    Ok(User {
        id,
        customer_id: customer_id.to_string(),
        email: header_value(headers, USER_EMAIL_HEADER)?.unwrap_or_default().to_string(),
    })
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, CompostError> {
    headers
        .get(name)
        .map(|v| v.to_str().map_err(|_| CompostError::DecodeUser))
        .transpose()
}

fn unauthorized(e: CompostError) -> (StatusCode, String) {
    warn!(error = %e, "rejected request");
    (StatusCode::UNAUTHORIZED, e.to_string())
}

fn decode_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, (StatusCode, String)> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| (StatusCode::BAD_REQUEST, format!("malformed request body: {}", e)))
}

// ============================================================================
// Health Routes
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/health", get(health_check))
}

async fn health_check(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: compost_shared::VERSION.to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}
