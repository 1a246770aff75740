//! Error types for the PDP agent.

use thiserror::Error;

/// Errors from the Kafka transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No record arrived within the read timeout. Not a failure.
    #[error("read timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),

    #[error("publish failed: {0}")]
    PublishFailed(String),

    #[error("read failed: {0}")]
    ReadFailed(String),

    /// The handle was already closed.
    #[error("transport closed")]
    Closed,

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TransportError {
    /// Whether this is an empty poll rather than a real failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}

/// Errors raised while handling an inbound PAP command.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("missing mandatory field(s): {}", .0.join(", "))]
    Validation(Vec<&'static str>),

    #[error("invalid PDP state: {0}")]
    InvalidState(String),

    #[error("failed to send PDP status: {0}")]
    Send(#[from] TransportError),
}

/// Errors from the policy evaluation engine.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// The engine has no result for the requested path and input.
    #[error("policy result is undefined: {0}")]
    Undefined(String),

    #[error("policy engine error: {0}")]
    Engine(String),
}

/// Invalid startup configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("SASL is enabled but {0} is not set")]
    MissingCredential(&'static str),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
