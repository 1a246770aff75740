//! Full agent lifecycle against in-memory transports.
//!
//! Registration, a PAP update, heartbeats, activation, a served decision
//! and shutdown, driven through the same consumption loop the binary uses.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures_util::future::BoxFuture;
use http_body_util::BodyExt;
use opa_pdp::api::{auth::ApiCredentials, create_router, AppState};
use opa_pdp::consumer::run_consumer;
use opa_pdp::error::EvaluationError;
use opa_pdp::evaluator::PolicyEvaluator;
use opa_pdp::identity::PdpIdentity;
use opa_pdp::lifecycle::Lifecycle;
use opa_pdp::model::{PdpMessageType, PdpResponseStatus, PdpState};
use opa_pdp::shutdown::shutdown;
use opa_pdp::testing::{ChannelSource, RecordingSender};
use opa_pdp::transport::MessageSource;
use opa_pdp::PdpAgent;
use opa_pdp_telemetry::MetricsRegistry;
use serde_json::{json, Value};
use tokio::sync::watch;
use tower::ServiceExt;

const PDP_NAME: &str = "opa-3a1f4c2e";
const GROUP: &str = "defaultGroup";

struct AllowAlice;

impl PolicyEvaluator for AllowAlice {
    fn evaluate<'a>(
        &'a self,
        _policy_path: &'a str,
        input: Value,
    ) -> BoxFuture<'a, Result<Value, EvaluationError>> {
        Box::pin(async move { Ok(json!(input["user"] == "alice")) })
    }
}

fn decision_request() -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/policy/pdpx/v1/decision")
        .header(header::CONTENT_TYPE, "application/json")
        .header(
            header::AUTHORIZATION,
            format!("Basic {}", STANDARD.encode("policyadmin:secret")),
        )
        .body(Body::from(
            json!({"policyName": "example.allow", "input": {"user": "alice"}}).to_string(),
        ))
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn register_update_activate_decide_shutdown() {
    let identity = Arc::new(PdpIdentity::with_name(PDP_NAME, GROUP));
    let lifecycle = Arc::new(Lifecycle::new());
    let metrics = Arc::new(MetricsRegistry::new());
    let sender = Arc::new(RecordingSender::new());

    let agent = Arc::new(PdpAgent::new(
        Arc::clone(&identity),
        Arc::clone(&lifecycle),
        sender.clone(),
        Arc::clone(&metrics),
        "policy-pdp-pap",
    ));
    let app = create_router(AppState {
        identity: Arc::clone(&identity),
        lifecycle: Arc::clone(&lifecycle),
        evaluator: Arc::new(AllowAlice),
        metrics: Arc::clone(&metrics),
        credentials: ApiCredentials::new("policyadmin", "secret"),
    });

    // Registration.
    assert!(agent.register().await);
    let sent = sender.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].state, PdpState::Passive);
    assert_eq!(sent[0].pdp_subgroup, None);
    assert!(sent[0].response.is_none());

    let (source, tx) = ChannelSource::new();
    let source = Arc::new(source);
    let consumer: Arc<dyn MessageSource> = source.clone();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_task = tokio::spawn(run_consumer(
        Arc::clone(&consumer),
        Arc::clone(&agent),
        Duration::from_millis(100),
        shutdown_rx,
    ));

    // Decisions are refused while passive.
    let resp = app.clone().oneshot(decision_request()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // Unassigned PDPs ignore broadcasts, so the first update names this PDP.
    tx.send(
        json!({
            "source": "pap-6e46095a-3e63-4e49-8b5d-3c4a8e0a1c3f",
            "messageName": "PDP_UPDATE",
            "requestId": "req-update-1",
            "timestampMs": 1700000000000i64,
            "name": PDP_NAME,
            "pdpGroup": GROUP,
            "pdpSubgroup": "opa",
            "pdpHeartbeatIntervalMs": 1000,
            "policiesToBeDeployed": [],
            "policiesToBeUndeployed": []
        })
        .to_string()
        .into_bytes(),
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(metrics.inbound_count("rejected"), 0, "update was rejected");
    assert_eq!(metrics.inbound_count("updated"), 1, "update was not applied");
    assert_eq!(identity.subgroup().as_deref(), Some("opa"));
    assert_eq!(identity.heartbeat_interval_ms(), 1000);
    assert!(agent.heartbeat().is_running());

    let sent = sender.sent();
    assert_eq!(sent.len(), 2);
    let response = sent[1].response.as_ref().unwrap();
    assert_eq!(response.response_to, "req-update-1");
    assert_eq!(response.response_status, PdpResponseStatus::Success);
    assert_eq!(sent[1].pdp_subgroup.as_deref(), Some("opa"));

    // At least one heartbeat after a full interval.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let heartbeats: Vec<_> = sender
        .sent()
        .into_iter()
        .skip(2)
        .filter(|s| s.response.is_none())
        .collect();
    assert!(!heartbeats.is_empty());
    assert!(heartbeats
        .iter()
        .all(|s| s.message_name == PdpMessageType::PdpStatus && s.state == PdpState::Passive));

    // Now assigned, a subgroup broadcast reaches this PDP.
    tx.send(
        json!({
            "messageName": "PDP_STATE_CHANGE",
            "requestId": "req-state-1",
            "pdpGroup": GROUP,
            "pdpSubgroup": "opa",
            "state": "ACTIVE"
        })
        .to_string()
        .into_bytes(),
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(metrics.inbound_count("state_changed"), 1, "state change was not applied");
    assert_eq!(lifecycle.current(), PdpState::Active);
    let last = sender.sent().into_iter().last().unwrap();
    assert_eq!(last.state, PdpState::Active);
    let response = last.response.unwrap();
    assert_eq!(response.response_to, "req-state-1");
    assert_eq!(response.response_message, "PDP State Changed From PASSIVE TO ACTIVE");

    let resp = app.clone().oneshot(decision_request()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let decision: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(decision["decision"], "PERMIT");
    assert_eq!(metrics.snapshot().permit, 1);

    // Shutdown.
    shutdown(&shutdown_tx, Some(&consumer), &agent, Duration::from_secs(1)).await;
    loop_task.await.unwrap();

    assert!(source.is_closed());
    assert!(!source.is_subscribed());
    assert!(!agent.heartbeat().is_running());

    let sent_after_shutdown = sender.count();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(sender.count(), sent_after_shutdown);
}

#[tokio::test(start_paused = true)]
async fn update_for_another_pdp_is_ignored() {
    let identity = Arc::new(PdpIdentity::with_name(PDP_NAME, GROUP));
    let sender = Arc::new(RecordingSender::new());
    let agent_metrics = Arc::new(MetricsRegistry::new());
    let agent = Arc::new(PdpAgent::new(
        Arc::clone(&identity),
        Arc::new(Lifecycle::new()),
        sender.clone(),
        Arc::clone(&agent_metrics),
        "policy-pdp-pap",
    ));

    let (source, tx) = ChannelSource::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_task = tokio::spawn(run_consumer(
        Arc::new(source),
        Arc::clone(&agent),
        Duration::from_millis(100),
        shutdown_rx,
    ));

    tx.send(
        json!({
            "messageName": "PDP_UPDATE",
            "source": "pap-6e46095a-3e63-4e49-8b5d-3c4a8e0a1c3f",
            "requestId": "req-1",
            "timestampMs": 1,
            "name": "opa-someone-else",
            "pdpGroup": GROUP,
            "pdpSubgroup": "opa",
            "pdpHeartbeatIntervalMs": 1000,
            "policiesToBeDeployed": []
        })
        .to_string()
        .into_bytes(),
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(agent_metrics.inbound_count("not_targeted"), 1);
    assert_eq!(sender.count(), 0);
    assert_eq!(identity.subgroup(), None);
    assert!(!agent.heartbeat().is_running());

    shutdown_tx.send(true).unwrap();
    loop_task.await.unwrap();
}
