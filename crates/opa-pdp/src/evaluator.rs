//! Policy evaluation through an OPA server's REST data API.

use crate::error::EvaluationError;
use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Evaluates a policy path against an input document.
pub trait PolicyEvaluator: Send + Sync {
    /// `policy_path` uses dots as separators (`example.allow`). A result the
    /// engine cannot produce comes back as [`EvaluationError::Undefined`].
    fn evaluate<'a>(
        &'a self,
        policy_path: &'a str,
        input: Value,
    ) -> BoxFuture<'a, Result<Value, EvaluationError>>;
}

#[derive(Deserialize)]
struct DataResponse {
    result: Option<Value>,
}

/// Calls `POST {base}/v1/data/{path}` on an OPA server.
pub struct OpaRestEvaluator {
    client: reqwest::Client,
    base_url: String,
}

impl OpaRestEvaluator {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, EvaluationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EvaluationError::Engine(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Data API URL for a dotted policy path.
    pub fn data_url(&self, policy_path: &str) -> String {
        format!(
            "{}/v1/data/{}",
            self.base_url,
            policy_path.trim_matches('.').replace('.', "/")
        )
    }

    async fn query(&self, policy_path: &str, input: Value) -> Result<Value, EvaluationError> {
        let url = self.data_url(policy_path);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "input": input }))
            .send()
            .await
            .map_err(|e| EvaluationError::Engine(format!("OPA request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EvaluationError::Engine(format!(
                "OPA returned {status}: {body}"
            )));
        }

        let data: DataResponse = response
            .json()
            .await
            .map_err(|e| EvaluationError::Engine(format!("invalid OPA response: {e}")))?;

        data.result
            .ok_or_else(|| EvaluationError::Undefined(policy_path.to_string()))
    }
}

impl PolicyEvaluator for OpaRestEvaluator {
    fn evaluate<'a>(
        &'a self,
        policy_path: &'a str,
        input: Value,
    ) -> BoxFuture<'a, Result<Value, EvaluationError>> {
        Box::pin(self.query(policy_path, input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode, routing::post, Json, Router};
    use serde_json::json;

    /// Minimal stand-in for OPA's data API.
    async fn spawn_fake_opa() -> String {
        async fn data(Path(path): Path<String>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
            match path.as_str() {
                "example/allow" => {
                    let allowed = body["input"]["user"] == "alice";
                    (StatusCode::OK, Json(json!({ "result": allowed })))
                }
                "example/undefined" => (StatusCode::OK, Json(json!({}))),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "code": "internal_error" })),
                ),
            }
        }

        let app = Router::new().route("/v1/data/{*path}", post(data));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn data_url_converts_dots() {
        let evaluator = OpaRestEvaluator::new("http://opa:8181/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            evaluator.data_url("example.allow"),
            "http://opa:8181/v1/data/example/allow"
        );
    }

    #[tokio::test]
    async fn evaluates_boolean_result() {
        let base = spawn_fake_opa().await;
        let evaluator = OpaRestEvaluator::new(base, Duration::from_secs(5)).unwrap();

        let allowed = evaluator
            .evaluate("example.allow", json!({ "user": "alice" }))
            .await
            .unwrap();
        assert_eq!(allowed, json!(true));

        let denied = evaluator
            .evaluate("example.allow", json!({ "user": "bob" }))
            .await
            .unwrap();
        assert_eq!(denied, json!(false));
    }

    #[tokio::test]
    async fn missing_result_is_undefined() {
        let base = spawn_fake_opa().await;
        let evaluator = OpaRestEvaluator::new(base, Duration::from_secs(5)).unwrap();

        let result = evaluator.evaluate("example.undefined", json!({})).await;
        assert!(matches!(result, Err(EvaluationError::Undefined(_))));
    }

    #[tokio::test]
    async fn server_error_is_engine_error() {
        let base = spawn_fake_opa().await;
        let evaluator = OpaRestEvaluator::new(base, Duration::from_secs(5)).unwrap();

        let result = evaluator.evaluate("missing.policy", json!({})).await;
        assert!(matches!(result, Err(EvaluationError::Engine(_))));
    }

    #[tokio::test]
    async fn unreachable_engine_is_engine_error() {
        let evaluator =
            OpaRestEvaluator::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap();
        let result = evaluator.evaluate("example.allow", json!({})).await;
        assert!(matches!(result, Err(EvaluationError::Engine(_))));
    }
}
