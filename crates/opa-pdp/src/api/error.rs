//! Error body returned by the `/policy/pdpx` endpoints.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseCode {
    BadRequest,
    Unauthorized,
    InternalServerError,
}

impl ResponseCode {
    fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::BAD_REQUEST => ResponseCode::BadRequest,
            StatusCode::UNAUTHORIZED => ResponseCode::Unauthorized,
            _ => ResponseCode::InternalServerError,
        }
    }
}

/// Error response carrying the HTTP status it is sent with.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    #[serde(skip)]
    pub status: StatusCode,
    pub response_code: ResponseCode,
    pub error_message: String,
    pub error_details: Vec<String>,
    pub policy_name: String,
}

impl ErrorResponse {
    pub fn new(
        status: StatusCode,
        message: impl Into<String>,
        details: Vec<String>,
        policy_name: impl Into<String>,
    ) -> Self {
        Self {
            status,
            response_code: ResponseCode::from_status(status),
            error_message: message.into(),
            error_details: details,
            policy_name: policy_name.into(),
        }
    }

    pub fn bad_request(
        message: impl Into<String>,
        detail: impl Into<String>,
        policy_name: impl Into<String>,
    ) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, vec![detail.into()], policy_name)
    }

    pub fn internal_error(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message,
            vec![detail.into()],
            "",
        )
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_code_follows_status() {
        let err = ErrorResponse::bad_request("bad", "detail", "example.allow");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["responseCode"], "BAD_REQUEST");
        assert_eq!(value["errorDetails"][0], "detail");
        assert_eq!(value["policyName"], "example.allow");
        assert!(value.get("status").is_none());

        let err = ErrorResponse::new(StatusCode::METHOD_NOT_ALLOWED, "no", vec![], "");
        assert_eq!(err.response_code, ResponseCode::InternalServerError);
    }
}
