//! Decision endpoint.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use opa_pdp_telemetry::decision as outcome;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ErrorResponse;
use super::router::{request_id, AppState, X_ONAP_REQUEST_ID};
use crate::error::EvaluationError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    #[serde(default)]
    pub policy_name: Option<String>,
    #[serde(default)]
    pub input: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Permit,
    Deny,
    Indeterminate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResponse {
    pub status_message: String,
    pub decision: Decision,
    pub policy_name: String,
}

/// POST /policy/pdpx/v1/decision
pub async fn opa_decision(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = request_id(&headers, "Unknown");

    let result = decide(&state, &body).await;
    if result.is_err() {
        state.metrics.record_error();
    }

    let mut response = match result {
        Ok(decision) => Json(decision).into_response(),
        Err(err) => err.into_response(),
    };
    response.headers_mut().insert(X_ONAP_REQUEST_ID, request_id);
    response
}

async fn decide(state: &AppState, body: &[u8]) -> Result<DecisionResponse, ErrorResponse> {
    let current = state.lifecycle.current();
    if !state.lifecycle.is_active() {
        return Err(ErrorResponse::internal_error(
            format!("PDP is in {current} state and cannot make decisions until it is ACTIVE"),
            format!("decision refused in {current} state"),
        ));
    }

    let request: DecisionRequest = serde_json::from_slice(body).map_err(|e| {
        ErrorResponse::bad_request("Error decoding the request", e.to_string(), "")
    })?;

    let policy_name = match request.policy_name {
        Some(name) if !name.is_empty() => name,
        _ => {
            return Err(ErrorResponse::bad_request(
                "policy details not provided",
                "Policy used to make decision is nil",
                "",
            ))
        }
    };

    tracing::debug!(policy = %policy_name, "evaluating decision");
    match state.evaluator.evaluate(&policy_name, request.input).await {
        Ok(Value::Bool(true)) => {
            state.metrics.record_decision(outcome::PERMIT);
            Ok(DecisionResponse {
                status_message: "OPA Allowed".to_string(),
                decision: Decision::Permit,
                policy_name,
            })
        }
        Ok(_) => {
            state.metrics.record_decision(outcome::DENY);
            Ok(DecisionResponse {
                status_message: "OPA Denied".to_string(),
                decision: Decision::Deny,
                policy_name,
            })
        }
        Err(EvaluationError::Undefined(detail)) => {
            state.metrics.record_decision(outcome::INDETERMINATE);
            Ok(DecisionResponse {
                status_message: format!("policy result is undefined: {detail}"),
                decision: Decision::Indeterminate,
                policy_name,
            })
        }
        Err(e @ EvaluationError::Engine(_)) => {
            tracing::warn!(policy = %policy_name, error = %e, "policy evaluation failed");
            Err(ErrorResponse::bad_request(
                "Error from OPA while making decision",
                e.to_string(),
                policy_name,
            ))
        }
    }
}
