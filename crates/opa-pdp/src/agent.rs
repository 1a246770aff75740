//! The PDP agent: shared state plus the PAP protocol handlers.

use crate::error::HandlerError;
use crate::heartbeat::HeartbeatScheduler;
use crate::identity::PdpIdentity;
use crate::lifecycle::Lifecycle;
use crate::model::{Envelope, MessageKind, PdpState, PdpStateChange, PdpUpdate};
use crate::publisher::{StatusPublisher, StatusSender};
use crate::router::route_target;
use opa_pdp_telemetry::{
    log_attributes_updated, log_message_discarded, log_registered, log_state_changed,
    MetricsRegistry,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Not valid JSON, or not an object.
    Malformed,
    /// Addressed to another PDP.
    NotTargeted,
    Updated,
    StateChanged(PdpState),
    /// A `PDP_STATUS` from the topic; dropped.
    IgnoredStatus,
    Unsupported(String),
    /// A handler rejected the message or could not send its response.
    Rejected,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Malformed => "malformed",
            Disposition::NotTargeted => "not_targeted",
            Disposition::Updated => "updated",
            Disposition::StateChanged(_) => "state_changed",
            Disposition::IgnoredStatus => "ignored_status",
            Disposition::Unsupported(_) => "unsupported",
            Disposition::Rejected => "rejected",
        }
    }
}

/// One PDP instance.
///
/// Owns the identity, lifecycle state and heartbeat, and handles every
/// command the PAP sends.
pub struct PdpAgent {
    identity: Arc<PdpIdentity>,
    lifecycle: Arc<Lifecycle>,
    publisher: Arc<StatusPublisher>,
    heartbeat: HeartbeatScheduler,
    metrics: Arc<MetricsRegistry>,
    topic: String,
    shutting_down: AtomicBool,
}

impl PdpAgent {
    pub fn new(
        identity: Arc<PdpIdentity>,
        lifecycle: Arc<Lifecycle>,
        sender: Arc<dyn StatusSender>,
        metrics: Arc<MetricsRegistry>,
        topic: impl Into<String>,
    ) -> Self {
        let publisher = Arc::new(StatusPublisher::new(
            Arc::clone(&identity),
            Arc::clone(&lifecycle),
            sender,
            Arc::clone(&metrics),
        ));
        Self {
            identity,
            lifecycle,
            heartbeat: HeartbeatScheduler::new(Arc::clone(&publisher)),
            publisher,
            metrics,
            topic: topic.into(),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn identity(&self) -> &Arc<PdpIdentity> {
        &self.identity
    }

    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    pub fn heartbeat(&self) -> &HeartbeatScheduler {
        &self.heartbeat
    }

    pub fn current_state(&self) -> PdpState {
        self.lifecycle.current()
    }

    /// Flag the agent as shutting down. Updates handled afterwards no longer
    /// restart the heartbeat.
    pub fn mark_shutting_down(&self) {
        self.shutting_down.store(true, Ordering::Release);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Announce this PDP to the PAP. Returns whether the send succeeded.
    pub async fn register(&self) -> bool {
        match self.publisher.send_registration().await {
            Ok(()) => {
                log_registered!(
                    pdp_name = %self.identity.name(),
                    pdp_group = %self.identity.group(),
                    "PDP registered with PAP"
                );
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to send PDP registration");
                false
            }
        }
    }

    /// Route and dispatch one raw message from the PAP topic.
    ///
    /// Never fails: every problem is logged and reflected in the returned
    /// disposition.
    pub async fn handle_message(&self, raw: &[u8]) -> Disposition {
        tracing::debug!("[IN|KAFKA|{}] {}", self.topic, String::from_utf8_lossy(raw));

        let disposition = self.dispatch(raw).await;
        self.metrics.record_inbound(disposition.as_str());
        disposition
    }

    async fn dispatch(&self, raw: &[u8]) -> Disposition {
        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                log_message_discarded!(reason = "malformed", error = %e, "failed to parse message");
                return Disposition::Malformed;
            }
        };

        if !route_target(&envelope, &self.identity, self.identity.group()) {
            log_message_discarded!(
                reason = "not_targeted",
                target_name = %envelope.name(),
                target_group = %envelope.pdp_group(),
                target_subgroup = %envelope.pdp_subgroup(),
                "message not addressed to this PDP"
            );
            return Disposition::NotTargeted;
        }

        match envelope.kind() {
            MessageKind::Update => match self.handle_update(raw).await {
                Ok(()) => Disposition::Updated,
                Err(e) => {
                    tracing::warn!(error = %e, "error processing PDP_UPDATE");
                    Disposition::Rejected
                }
            },
            MessageKind::StateChange => match self.handle_state_change(raw).await {
                Ok(state) => Disposition::StateChanged(state),
                Err(e) => {
                    tracing::warn!(error = %e, "error processing PDP_STATE_CHANGE");
                    Disposition::Rejected
                }
            },
            MessageKind::Status => {
                tracing::debug!("discarding event of type PDP_STATUS");
                Disposition::IgnoredStatus
            }
            MessageKind::Unsupported(name) => {
                tracing::error!(message_name = %name, "unsupported message type");
                Disposition::Unsupported(name)
            }
        }
    }

    /// Handle `PDP_UPDATE`: apply subgroup and heartbeat interval, answer the
    /// PAP, then (re)start the heartbeat.
    ///
    /// Attributes stay applied even if the response cannot be sent.
    pub async fn handle_update(&self, raw: &[u8]) -> Result<(), HandlerError> {
        let update: PdpUpdate = serde_json::from_slice(raw)?;
        let update = update.validate()?;

        self.identity
            .assign(update.pdp_subgroup.clone(), update.heartbeat_interval_ms);
        log_attributes_updated!(
            pdp_subgroup = %update.pdp_subgroup,
            heartbeat_interval_ms = update.heartbeat_interval_ms,
            request_id = %update.request_id,
            "PDP attributes updated"
        );

        self.publisher.send_update_response(&update.request_id).await?;

        if self.is_shutting_down() {
            tracing::debug!("shutting down, heartbeat not restarted");
        } else {
            // Last write wins when updates race.
            self.heartbeat.start(self.identity.heartbeat_interval_ms());
        }
        Ok(())
    }

    /// Handle `PDP_STATE_CHANGE`. An unknown state leaves the current one in
    /// place.
    pub async fn handle_state_change(&self, raw: &[u8]) -> Result<PdpState, HandlerError> {
        let change: PdpStateChange = serde_json::from_slice(raw)?;

        let previous = self.lifecycle.current();
        let state = self.lifecycle.set_from_str(&change.state)?;
        log_state_changed!(
            from = %previous,
            to = %state,
            request_id = %change.request_id,
            "PDP state changed"
        );

        self.publisher
            .send_state_change_response(&change.request_id, previous, state)
            .await?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PdpResponseStatus;
    use crate::publisher::{STATE_CHANGE_RESPONSE_DESCRIPTION, UPDATE_RESPONSE_DESCRIPTION};
    use crate::testing::RecordingSender;
    use serde_json::json;

    fn agent() -> (PdpAgent, Arc<RecordingSender>) {
        let sender = Arc::new(RecordingSender::new());
        let agent = PdpAgent::new(
            Arc::new(PdpIdentity::with_name("opa-1", "defaultGroup")),
            Arc::new(Lifecycle::new()),
            sender.clone(),
            Arc::new(MetricsRegistry::new()),
            "policy-pdp-pap",
        );
        (agent, sender)
    }

    fn update(interval: i64) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "source": "pap-1",
            "pdpHeartbeatIntervalMs": interval,
            "messageName": "PDP_UPDATE",
            "policiesToBeDeployed": [],
            "policiesToBeUndeployed": [],
            "name": "opa-1",
            "timestampMs": 1724491628553_i64,
            "pdpGroup": "defaultGroup",
            "pdpSubgroup": "opa",
            "requestId": "req-update"
        }))
        .unwrap()
    }

    fn state_change(state: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "source": "pap-1",
            "state": state,
            "messageName": "PDP_STATE_CHANGE",
            "name": "opa-1",
            "timestampMs": 1724491628553_i64,
            "pdpGroup": "defaultGroup",
            "pdpSubgroup": "opa",
            "requestId": "req-state"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn register_sends_one_passive_status() {
        let (agent, sender) = agent();
        assert!(agent.register().await);
        assert_eq!(sender.count(), 1);
        assert_eq!(sender.sent()[0].state, PdpState::Passive);
    }

    #[tokio::test]
    async fn register_reports_failure() {
        let (agent, sender) = agent();
        sender.fail_sends(true);
        assert!(!agent.register().await);
    }

    #[tokio::test(start_paused = true)]
    async fn update_applies_attributes_and_responds() {
        let (agent, sender) = agent();
        agent.handle_update(&update(1000)).await.unwrap();

        assert_eq!(agent.identity().subgroup().as_deref(), Some("opa"));
        assert_eq!(agent.identity().heartbeat_interval_ms(), 1000);
        assert_eq!(agent.heartbeat().current_interval(), Some(1000));

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].description, UPDATE_RESPONSE_DESCRIPTION);
        let response = sent[0].response.as_ref().unwrap();
        assert_eq!(response.response_to, "req-update");
        assert_eq!(response.response_status, PdpResponseStatus::Success);
    }

    #[tokio::test]
    async fn invalid_update_changes_nothing() {
        let (agent, sender) = agent();
        let mut raw: serde_json::Value = serde_json::from_slice(&update(1000)).unwrap();
        raw.as_object_mut().unwrap().remove("requestId");

        let result = agent.handle_update(&serde_json::to_vec(&raw).unwrap()).await;

        assert!(matches!(result, Err(HandlerError::Validation(_))));
        assert_eq!(agent.identity().subgroup(), None);
        assert_eq!(agent.identity().heartbeat_interval_ms(), 0);
        assert_eq!(sender.count(), 0);
    }

    #[tokio::test]
    async fn malformed_update_is_an_error() {
        let (agent, _) = agent();
        let result = agent.handle_update(b"{\"pdpHeartbeatIntervalMs\": \"soon\"}").await;
        assert!(matches!(result, Err(HandlerError::Malformed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn update_returns_without_waiting_for_heartbeat() {
        let (agent, sender) = agent();
        let started = tokio::time::Instant::now();

        agent.handle_update(&update(60_000)).await.unwrap();

        assert_eq!(started.elapsed(), std::time::Duration::ZERO);
        assert!(agent.heartbeat().is_running());
        assert_eq!(agent.heartbeat().current_interval(), Some(60_000));
        // Only the update response; the first beat is a full interval away.
        assert_eq!(sender.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn update_send_failure_keeps_attributes() {
        let (agent, sender) = agent();
        sender.fail_sends(true);

        let result = agent.handle_update(&update(1000)).await;

        assert!(matches!(result, Err(HandlerError::Send(_))));
        assert_eq!(agent.identity().subgroup().as_deref(), Some("opa"));
        assert!(!agent.heartbeat().is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn update_during_shutdown_does_not_start_heartbeat() {
        let (agent, _) = agent();
        agent.mark_shutting_down();
        agent.handle_update(&update(1000)).await.unwrap();
        assert!(!agent.heartbeat().is_running());
    }

    #[tokio::test]
    async fn state_change_to_active() {
        let (agent, sender) = agent();
        let state = agent.handle_state_change(&state_change("ACTIVE")).await.unwrap();

        assert_eq!(state, PdpState::Active);
        assert_eq!(agent.current_state(), PdpState::Active);

        let sent = sender.sent();
        assert_eq!(sent[0].state, PdpState::Active);
        assert_eq!(sent[0].description, STATE_CHANGE_RESPONSE_DESCRIPTION);
        assert_eq!(sent[0].response.as_ref().unwrap().response_to, "req-state");
    }

    #[tokio::test]
    async fn state_change_response_names_actual_transition() {
        let (agent, sender) = agent();
        agent.handle_state_change(&state_change("SAFE")).await.unwrap();
        agent.handle_state_change(&state_change("TEST")).await.unwrap();

        let sent = sender.sent();
        assert_eq!(
            sent[0].response.as_ref().unwrap().response_message,
            "PDP State Changed From PASSIVE TO SAFE"
        );
        assert_eq!(
            sent[1].response.as_ref().unwrap().response_message,
            "PDP State Changed From SAFE TO TEST"
        );
        assert_eq!(sent[1].state, PdpState::Test);
    }

    #[tokio::test]
    async fn bogus_state_is_rejected() {
        let (agent, sender) = agent();
        let result = agent.handle_state_change(&state_change("BOGUS")).await;

        assert!(matches!(result, Err(HandlerError::InvalidState(_))));
        assert_eq!(agent.current_state(), PdpState::Passive);
        assert_eq!(sender.count(), 0);
    }

    #[tokio::test]
    async fn state_change_send_failure_keeps_state() {
        let (agent, sender) = agent();
        sender.fail_sends(true);
        let result = agent.handle_state_change(&state_change("SAFE")).await;
        assert!(matches!(result, Err(HandlerError::Send(_))));
        assert_eq!(agent.current_state(), PdpState::Safe);
    }

    #[tokio::test]
    async fn dispatch_outcomes() {
        let (agent, sender) = agent();

        assert_eq!(agent.handle_message(b"garbage").await, Disposition::Malformed);

        let foreign = json!({"messageName": "PDP_UPDATE", "name": "opa-2"});
        assert_eq!(
            agent.handle_message(foreign.to_string().as_bytes()).await,
            Disposition::NotTargeted
        );

        let status = json!({"messageName": "PDP_STATUS", "name": "opa-1"});
        assert_eq!(
            agent.handle_message(status.to_string().as_bytes()).await,
            Disposition::IgnoredStatus
        );

        let health = json!({"messageName": "PDP_HEALTH_CHECK", "name": "opa-1"});
        assert_eq!(
            agent.handle_message(health.to_string().as_bytes()).await,
            Disposition::Unsupported("PDP_HEALTH_CHECK".to_string())
        );

        assert_eq!(
            agent.handle_message(&state_change("BOGUS")).await,
            Disposition::Rejected
        );
        assert_eq!(
            agent.handle_message(&state_change("TEST")).await,
            Disposition::StateChanged(PdpState::Test)
        );
        assert_eq!(sender.count(), 1);
    }

    #[tokio::test]
    async fn group_broadcast_ignored_until_assigned() {
        let (agent, _) = agent();
        let broadcast = json!({
            "messageName": "PDP_STATE_CHANGE",
            "state": "ACTIVE",
            "pdpGroup": "defaultGroup",
            "requestId": "req-b"
        });
        let raw = broadcast.to_string();

        assert_eq!(
            agent.handle_message(raw.as_bytes()).await,
            Disposition::NotTargeted
        );

        agent.identity().assign("opa".to_string(), 0);
        assert_eq!(
            agent.handle_message(raw.as_bytes()).await,
            Disposition::StateChanged(PdpState::Active)
        );
    }
}
