//! OPA policy decision point agent.
//!
//! The agent registers with the PAP over Kafka, follows the PAP's update and
//! state-change commands, emits heartbeats at the interval the PAP assigns,
//! and serves policy decisions over HTTP while `ACTIVE`. The `opa-pdp` binary
//! wires these pieces together.

pub mod agent;
pub mod api;
pub mod config;
pub mod consumer;
pub mod error;
pub mod evaluator;
pub mod heartbeat;
pub mod identity;
pub mod lifecycle;
pub mod model;
pub mod publisher;
pub mod router;
pub mod server;
pub mod shutdown;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;

pub use agent::{Disposition, PdpAgent};
pub use config::AgentConfig;
pub use error::{ConfigError, EvaluationError, HandlerError, TransportError};
