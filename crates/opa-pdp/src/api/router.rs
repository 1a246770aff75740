//! Axum router configuration.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use opa_pdp_telemetry::{prometheus::render_metrics, MetricsRegistry, PROMETHEUS_CONTENT_TYPE};
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use uuid::Uuid;

use super::auth::{self, ApiCredentials};
use super::{decision, health, statistics};
use crate::evaluator::PolicyEvaluator;
use crate::identity::PdpIdentity;
use crate::lifecycle::Lifecycle;

pub const X_ONAP_REQUEST_ID: HeaderName = HeaderName::from_static("x-onap-requestid");
pub const X_LATEST_VERSION: HeaderName = HeaderName::from_static("x-latestversion");
pub const X_MINOR_VERSION: HeaderName = HeaderName::from_static("x-minorversion");
pub const X_PATCH_VERSION: HeaderName = HeaderName::from_static("x-patchversion");

pub const LATEST_VERSION: &str = "1.0.0";
pub const MINOR_VERSION: &str = "0";
pub const PATCH_VERSION: &str = "0";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<PdpIdentity>,
    pub lifecycle: Arc<Lifecycle>,
    pub evaluator: Arc<dyn PolicyEvaluator>,
    pub metrics: Arc<MetricsRegistry>,
    pub credentials: ApiCredentials,
}

/// Echo the caller's request id when it is a UUID, otherwise `fallback`.
pub fn request_id(headers: &HeaderMap, fallback: &'static str) -> HeaderValue {
    headers
        .get(&X_ONAP_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .and_then(|id| HeaderValue::from_str(&id.to_string()).ok())
        .unwrap_or_else(|| HeaderValue::from_static(fallback))
}

/// GET /ready
async fn ready() -> &'static str {
    "Ready"
}

/// GET /metrics
async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        render_metrics(&state.metrics),
    )
}

/// Create the HTTP router with all routes.
pub fn create_router(state: AppState) -> Router {
    let pdpx = Router::new()
        .route("/decision", post(decision::opa_decision))
        .route("/healthcheck", get(health::health_check))
        .route("/statistics", get(statistics::fetch_statistics))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_basic_auth,
        ))
        .layer(SetResponseHeaderLayer::overriding(
            X_LATEST_VERSION,
            HeaderValue::from_static(LATEST_VERSION),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            X_MINOR_VERSION,
            HeaderValue::from_static(MINOR_VERSION),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            X_PATCH_VERSION,
            HeaderValue::from_static(PATCH_VERSION),
        ));

    Router::new()
        .nest("/policy/pdpx/v1", pdpx)
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
