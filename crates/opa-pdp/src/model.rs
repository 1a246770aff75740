//! Wire model for the PDP/PAP protocol.
//!
//! Every message on the PAP topic is a JSON object discriminated by its
//! `messageName` field. Inbound commands are decoded in two steps: the
//! addressing [`Envelope`] first, then the typed payload once the message is
//! known to target this PDP.

use crate::error::HandlerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// PDP type announced in every status message.
pub const PDP_TYPE: &str = "opa";

/// Operational state of the PDP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PdpState {
    #[default]
    Passive,
    Safe,
    Test,
    Active,
    Terminated,
}

impl PdpState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PdpState::Passive => "PASSIVE",
            PdpState::Safe => "SAFE",
            PdpState::Test => "TEST",
            PdpState::Active => "ACTIVE",
            PdpState::Terminated => "TERMINATED",
        }
    }
}

impl fmt::Display for PdpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact, case-sensitive parse.
impl FromStr for PdpState {
    type Err = HandlerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PASSIVE" => Ok(PdpState::Passive),
            "SAFE" => Ok(PdpState::Safe),
            "TEST" => Ok(PdpState::Test),
            "ACTIVE" => Ok(PdpState::Active),
            "TERMINATED" => Ok(PdpState::Terminated),
            other => Err(HandlerError::InvalidState(other.to_string())),
        }
    }
}

/// Health reported in status messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PdpHealthStatus {
    #[default]
    Healthy,
    NotHealthy,
    TestInProgress,
    Unknown,
}

/// Message types carried on the PAP topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PdpMessageType {
    PdpStatus,
    PdpUpdate,
    PdpStateChange,
    PdpHealthCheck,
    PdpTopicCheck,
}

impl PdpMessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PdpMessageType::PdpStatus => "PDP_STATUS",
            PdpMessageType::PdpUpdate => "PDP_UPDATE",
            PdpMessageType::PdpStateChange => "PDP_STATE_CHANGE",
            PdpMessageType::PdpHealthCheck => "PDP_HEALTH_CHECK",
            PdpMessageType::PdpTopicCheck => "PDP_TOPIC_CHECK",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PDP_STATUS" => Some(PdpMessageType::PdpStatus),
            "PDP_UPDATE" => Some(PdpMessageType::PdpUpdate),
            "PDP_STATE_CHANGE" => Some(PdpMessageType::PdpStateChange),
            "PDP_HEALTH_CHECK" => Some(PdpMessageType::PdpHealthCheck),
            "PDP_TOPIC_CHECK" => Some(PdpMessageType::PdpTopicCheck),
            _ => None,
        }
    }
}

/// What the agent does with an inbound message, decided once from its
/// discriminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Update,
    StateChange,
    /// Our own outbound type; never acted on.
    Status,
    /// Known to the protocol but not handled here, or not known at all.
    Unsupported(String),
}

impl MessageKind {
    pub fn from_name(name: Option<&str>) -> Self {
        match name.and_then(PdpMessageType::parse) {
            Some(PdpMessageType::PdpUpdate) => MessageKind::Update,
            Some(PdpMessageType::PdpStateChange) => MessageKind::StateChange,
            Some(PdpMessageType::PdpStatus) => MessageKind::Status,
            _ => MessageKind::Unsupported(name.unwrap_or_default().to_string()),
        }
    }
}

/// Addressing fields common to every inbound message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default, alias = "MessageName")]
    pub message_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pdp_group: Option<String>,
    #[serde(default)]
    pub pdp_subgroup: Option<String>,
}

impl Envelope {
    pub fn parse(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    pub fn kind(&self) -> MessageKind {
        MessageKind::from_name(self.message_name.as_deref())
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    pub fn pdp_group(&self) -> &str {
        self.pdp_group.as_deref().unwrap_or_default()
    }

    pub fn pdp_subgroup(&self) -> &str {
        self.pdp_subgroup.as_deref().unwrap_or_default()
    }
}

/// `PDP_UPDATE` command.
///
/// Fields are optional at the serde level so that validation can report every
/// missing field at once instead of failing on the first.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdpUpdate {
    pub source: Option<String>,
    pub pdp_heartbeat_interval_ms: Option<i64>,
    #[serde(alias = "MessageName")]
    pub message_name: Option<String>,
    pub policies_to_be_deployed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub policies_to_be_undeployed: Vec<serde_json::Value>,
    pub name: Option<String>,
    pub timestamp_ms: Option<i64>,
    pub pdp_group: Option<String>,
    pub pdp_subgroup: Option<String>,
    pub request_id: Option<String>,
}

/// A validated `PDP_UPDATE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidUpdate {
    pub pdp_subgroup: String,
    pub heartbeat_interval_ms: i64,
    pub request_id: String,
}

fn present(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|s| !s.is_empty())
}

impl PdpUpdate {
    /// Check every mandatory field. Empty strings count as absent.
    pub fn validate(self) -> Result<ValidUpdate, HandlerError> {
        let mut missing = Vec::new();
        if !present(&self.source) {
            missing.push("source");
        }
        if self.pdp_heartbeat_interval_ms.is_none() {
            missing.push("pdpHeartbeatIntervalMs");
        }
        if !present(&self.message_name) {
            missing.push("messageName");
        }
        if self.policies_to_be_deployed.is_none() {
            missing.push("policiesToBeDeployed");
        }
        if !present(&self.name) {
            missing.push("name");
        }
        if self.timestamp_ms.is_none() {
            missing.push("timestampMs");
        }
        if !present(&self.pdp_group) {
            missing.push("pdpGroup");
        }
        if !present(&self.pdp_subgroup) {
            missing.push("pdpSubgroup");
        }
        if !present(&self.request_id) {
            missing.push("requestId");
        }

        match (
            self.pdp_subgroup,
            self.pdp_heartbeat_interval_ms,
            self.request_id,
        ) {
            (Some(pdp_subgroup), Some(heartbeat_interval_ms), Some(request_id))
                if missing.is_empty() =>
            {
                Ok(ValidUpdate {
                    pdp_subgroup,
                    heartbeat_interval_ms,
                    request_id,
                })
            }
            _ => Err(HandlerError::Validation(missing)),
        }
    }
}

/// `PDP_STATE_CHANGE` command.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PdpStateChange {
    pub source: String,
    pub state: String,
    #[serde(alias = "MessageName")]
    pub message_name: String,
    pub name: String,
    pub timestamp_ms: i64,
    pub pdp_group: String,
    pub pdp_subgroup: String,
    pub request_id: String,
}

/// Outcome carried in a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PdpResponseStatus {
    Success,
    Failure,
}

/// Response sub-object linking a status to the command that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdpResponseDetails {
    pub response_to: String,
    pub response_status: PdpResponseStatus,
    pub response_message: String,
}

/// Outbound `PDP_STATUS` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdpStatus {
    pub message_name: PdpMessageType,
    pub pdp_type: String,
    pub state: PdpState,
    pub healthy: PdpHealthStatus,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<PdpResponseDetails>,
    pub policies: Vec<serde_json::Value>,
    pub name: String,
    pub request_id: String,
    pub pdp_group: String,
    pub pdp_subgroup: Option<String>,
    /// Epoch milliseconds, rendered as a string on the wire.
    pub timestamp_ms: String,
    pub deployment_instance_info: String,
}
