//! Consumption loop for the PAP topic.

use crate::agent::PdpAgent;
use crate::transport::MessageSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Read messages and hand them to the agent until shutdown is signalled.
///
/// A single bad message never ends the loop. After a transport failure the
/// loop pauses for one read timeout before polling again.
pub async fn run_consumer(
    source: Arc<dyn MessageSource>,
    agent: Arc<PdpAgent>,
    read_timeout: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tracing::debug!("starting PDP message listener");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            _ = shutdown_rx.changed() => break,
            result = source.read_next(read_timeout) => match result {
                Ok(raw) => {
                    agent.handle_message(&raw).await;
                }
                Err(e) if e.is_timeout() => {}
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read from PAP topic");
                    tokio::select! {
                        _ = shutdown_rx.changed() => break,
                        _ = tokio::time::sleep(read_timeout) => {}
                    }
                }
            },
        }
    }

    tracing::debug!("stopping PDP message listener");
}
