//! Health check endpoint.

use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use serde::Serialize;

use super::router::{request_id, AppState, X_ONAP_REQUEST_ID};

#[derive(Debug, Serialize)]
pub struct HealthCheckReport {
    pub name: String,
    pub url: &'static str,
    pub healthy: bool,
    pub code: u16,
    pub message: &'static str,
}

/// GET /policy/pdpx/v1/healthcheck
pub async fn health_check(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    tracing::debug!("received health check");
    (
        [(X_ONAP_REQUEST_ID, request_id(&headers, "000000000000"))],
        Json(HealthCheckReport {
            name: state.identity.name().to_string(),
            url: "self",
            healthy: true,
            code: 200,
            message: "alive",
        }),
    )
}
