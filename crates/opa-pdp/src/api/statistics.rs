//! Statistics report endpoint.

use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use opa_pdp_telemetry::DecisionStatistics;
use serde::Serialize;

use super::router::{request_id, AppState, X_ONAP_REQUEST_ID};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsReport {
    pub code: i32,
    pub total_policy_types_count: u64,
    pub total_policies_count: u64,
    pub total_error_count: u64,
    pub permit_decisions_count: u64,
    pub deny_decisions_count: u64,
    pub deploy_success_count: u64,
    pub deploy_failure_count: u64,
    pub undeploy_success_count: u64,
    pub undeploy_failure_count: u64,
    pub indeterminant_decisions_count: u64,
    pub query_success_count: u64,
    pub query_failure_count: u64,
}

impl From<DecisionStatistics> for StatisticsReport {
    fn from(stats: DecisionStatistics) -> Self {
        // Policy deployment is not tracked by this PDP; those counts stay fixed.
        Self {
            code: 200,
            total_policy_types_count: 1,
            total_policies_count: 0,
            total_error_count: stats.errors,
            permit_decisions_count: stats.permit,
            deny_decisions_count: stats.deny,
            deploy_success_count: 0,
            deploy_failure_count: 0,
            undeploy_success_count: 0,
            undeploy_failure_count: 0,
            indeterminant_decisions_count: stats.indeterminate,
            query_success_count: stats.query_success,
            query_failure_count: stats.query_failure,
        }
    }
}

/// GET /policy/pdpx/v1/statistics
pub async fn fetch_statistics(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    (
        [(X_ONAP_REQUEST_ID, request_id(&headers, "000000000000"))],
        Json(StatisticsReport::from(state.metrics.snapshot())),
    )
}
