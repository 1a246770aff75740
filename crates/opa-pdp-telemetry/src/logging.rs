//! Structured logging on stdout.
//!
//! One subscriber per process: JSON lines in production, pretty output for
//! local runs. `RUST_LOG`, when set, replaces the configured directives.

use crate::{LogFormat, TelemetryConfig, TelemetryError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let output = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(output.with_filter(filter))
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

/// Values of the `event` field on lifecycle log lines.
pub mod events {
    pub const STARTUP: &str = "startup";
    pub const SHUTDOWN: &str = "shutdown";
    /// Registration status published to the PAP.
    pub const REGISTERED: &str = "registered";
    pub const HEARTBEAT_STARTED: &str = "heartbeat_started";
    /// Lifecycle state changed by the PAP.
    pub const STATE_CHANGED: &str = "state_changed";
    /// Subgroup and heartbeat interval assigned by the PAP.
    pub const ATTRIBUTES_UPDATED: &str = "attributes_updated";
    /// Inbound message dropped (foreign or malformed).
    pub const MESSAGE_DISCARDED: &str = "message_discarded";
}

/// `tracing::info!` tagged with `event = "startup"`.
#[macro_export]
macro_rules! log_startup {
    ($($field:tt)*) => {
        tracing::info!(event = $crate::logging::events::STARTUP, $($field)*)
    };
}

#[macro_export]
macro_rules! log_shutdown {
    ($($field:tt)*) => {
        tracing::info!(event = $crate::logging::events::SHUTDOWN, $($field)*)
    };
}

#[macro_export]
macro_rules! log_registered {
    ($($field:tt)*) => {
        tracing::info!(event = $crate::logging::events::REGISTERED, $($field)*)
    };
}

/// Debug level: fires on every interval change.
#[macro_export]
macro_rules! log_heartbeat_started {
    ($($field:tt)*) => {
        tracing::debug!(event = $crate::logging::events::HEARTBEAT_STARTED, $($field)*)
    };
}

#[macro_export]
macro_rules! log_state_changed {
    ($($field:tt)*) => {
        tracing::info!(event = $crate::logging::events::STATE_CHANGED, $($field)*)
    };
}

#[macro_export]
macro_rules! log_attributes_updated {
    ($($field:tt)*) => {
        tracing::info!(event = $crate::logging::events::ATTRIBUTES_UPDATED, $($field)*)
    };
}

#[macro_export]
macro_rules! log_message_discarded {
    ($($field:tt)*) => {
        tracing::warn!(event = $crate::logging::events::MESSAGE_DISCARDED, $($field)*)
    };
}
