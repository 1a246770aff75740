//! Outbound `PDP_STATUS` messages.
//!
//! [`StatusPublisher`] builds every status this PDP emits (registration,
//! heartbeat, command responses) and hands it to a [`StatusSender`]. Each
//! status gets a fresh request id and timestamp.

use crate::error::TransportError;
use crate::identity::PdpIdentity;
use crate::lifecycle::Lifecycle;
use crate::model::{
    PdpHealthStatus, PdpMessageType, PdpResponseDetails, PdpResponseStatus, PdpState, PdpStatus,
    PDP_TYPE,
};
use crate::transport::MessageSink;
use chrono::Utc;
use futures_util::future::BoxFuture;
use opa_pdp_telemetry::MetricsRegistry;
use std::sync::Arc;
use uuid::Uuid;

pub const REGISTRATION_DESCRIPTION: &str = "Pdp Status Registration Message";
pub const HEARTBEAT_DESCRIPTION: &str = "Pdp heartbeat";
pub const UPDATE_RESPONSE_DESCRIPTION: &str = "Pdp Status Response Message For Pdp Update";
pub const STATE_CHANGE_RESPONSE_DESCRIPTION: &str =
    "Pdp Status Response Message to Pdp State Change";

pub const UPDATE_SUCCESS_MESSAGE: &str = "PDP Update was Successful";

/// Delivers a status message to the PAP.
pub trait StatusSender: Send + Sync {
    fn send_status(&self, status: PdpStatus) -> BoxFuture<'_, Result<(), TransportError>>;
}

/// Sends statuses as JSON over a [`MessageSink`].
pub struct KafkaStatusSender {
    sink: Arc<dyn MessageSink>,
    topic: String,
}

impl KafkaStatusSender {
    pub fn new(sink: Arc<dyn MessageSink>, topic: impl Into<String>) -> Self {
        Self {
            sink,
            topic: topic.into(),
        }
    }
}

impl StatusSender for KafkaStatusSender {
    fn send_status(&self, status: PdpStatus) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            let payload = serde_json::to_vec(&status)?;
            tracing::debug!(
                "[OUT|KAFKA|{}] {}",
                self.topic,
                String::from_utf8_lossy(&payload)
            );
            self.sink.produce(payload).await
        })
    }
}

/// Kind label used for metrics and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Registration,
    Heartbeat,
    Response,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::Registration => "registration",
            StatusKind::Heartbeat => "heartbeat",
            StatusKind::Response => "response",
        }
    }
}

/// Builds and sends status messages for one PDP.
pub struct StatusPublisher {
    identity: Arc<PdpIdentity>,
    lifecycle: Arc<Lifecycle>,
    sender: Arc<dyn StatusSender>,
    metrics: Arc<MetricsRegistry>,
}

impl StatusPublisher {
    pub fn new(
        identity: Arc<PdpIdentity>,
        lifecycle: Arc<Lifecycle>,
        sender: Arc<dyn StatusSender>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            identity,
            lifecycle,
            sender,
            metrics,
        }
    }

    fn build(
        &self,
        state: PdpState,
        description: &str,
        response: Option<PdpResponseDetails>,
    ) -> PdpStatus {
        PdpStatus {
            message_name: PdpMessageType::PdpStatus,
            pdp_type: PDP_TYPE.to_string(),
            state,
            healthy: PdpHealthStatus::Healthy,
            description: description.to_string(),
            response,
            policies: Vec::new(),
            name: self.identity.name().to_string(),
            request_id: Uuid::new_v4().to_string(),
            pdp_group: self.identity.group().to_string(),
            pdp_subgroup: self.identity.subgroup(),
            timestamp_ms: Utc::now().timestamp_millis().to_string(),
            deployment_instance_info: String::new(),
        }
    }

    async fn send(&self, kind: StatusKind, status: PdpStatus) -> Result<(), TransportError> {
        let result = self.sender.send_status(status).await;
        self.metrics.record_status(kind.as_str(), result.is_ok());
        if let Err(e) = &result {
            tracing::warn!(kind = kind.as_str(), error = %e, "failed to send PDP status");
        }
        result
    }

    /// Announce this PDP. Always reports `PASSIVE`.
    pub async fn send_registration(&self) -> Result<(), TransportError> {
        let status = self.build(PdpState::Passive, REGISTRATION_DESCRIPTION, None);
        self.send(StatusKind::Registration, status).await
    }

    pub async fn send_heartbeat(&self) -> Result<(), TransportError> {
        let status = self.build(self.lifecycle.current(), HEARTBEAT_DESCRIPTION, None);
        self.send(StatusKind::Heartbeat, status).await
    }

    pub async fn send_update_response(&self, request_id: &str) -> Result<(), TransportError> {
        let status = self.build(
            self.lifecycle.current(),
            UPDATE_RESPONSE_DESCRIPTION,
            Some(success(request_id, UPDATE_SUCCESS_MESSAGE)),
        );
        self.send(StatusKind::Response, status).await
    }

    /// Acknowledge a state change. The status reports `to`.
    pub async fn send_state_change_response(
        &self,
        request_id: &str,
        from: PdpState,
        to: PdpState,
    ) -> Result<(), TransportError> {
        let status = self.build(
            to,
            STATE_CHANGE_RESPONSE_DESCRIPTION,
            Some(success(request_id, &state_change_message(from, to))),
        );
        self.send(StatusKind::Response, status).await
    }
}

/// Response text for a state change, e.g. `PDP State Changed From SAFE TO TEST`.
pub fn state_change_message(from: PdpState, to: PdpState) -> String {
    format!("PDP State Changed From {from} TO {to}")
}

fn success(request_id: &str, message: &str) -> PdpResponseDetails {
    PdpResponseDetails {
        response_to: request_id.to_string(),
        response_status: PdpResponseStatus::Success,
        response_message: message.to_string(),
    }
}
