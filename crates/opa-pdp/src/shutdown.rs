//! Signal handling and ordered teardown.

use crate::agent::PdpAgent;
use crate::transport::MessageSource;
use opa_pdp_telemetry::log_shutdown;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Wait for SIGTERM, SIGINT or SIGHUP and return the signal's name.
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
        _ = sighup.recv() => "SIGHUP",
    })
}

/// Wait for Ctrl-C and return the signal's name.
#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("interrupt")
}

/// Tear the agent down.
///
/// Order: cancel the consumption loop, unsubscribe and close the consumer,
/// flag the agent as shutting down, stop the heartbeat, then wait `grace` for
/// in-flight sends. Consumer errors are logged and never abort the sequence.
/// A missing consumer is valid (it may have failed to connect at startup).
pub async fn shutdown(
    shutdown_tx: &watch::Sender<bool>,
    consumer: Option<&Arc<dyn MessageSource>>,
    agent: &PdpAgent,
    grace: Duration,
) {
    log_shutdown!(grace_secs = grace.as_secs(), "shutting down PDP agent");

    // Receivers may already be gone.
    let _ = shutdown_tx.send(true);

    match consumer {
        Some(consumer) => {
            if let Err(e) = consumer.unsubscribe().await {
                tracing::warn!(error = %e, "failed to unsubscribe consumer");
            }
            consumer.close().await;
        }
        None => tracing::debug!("no consumer to close"),
    }

    agent.mark_shutting_down();
    agent.heartbeat().close();

    tokio::time::sleep(grace).await;
    tracing::info!("PDP agent stopped");
}
