//! Cancelable periodic heartbeat.
//!
//! At most one ticker task runs at a time. Checking the current interval,
//! stopping the old ticker and spawning the new one all happen under a single
//! lock, so concurrent `start` calls cannot leave two tickers behind.

use crate::publisher::StatusPublisher;
use opa_pdp_telemetry::log_heartbeat_started;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Result of [`HeartbeatScheduler::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new ticker was spawned (replacing any previous one).
    Started,
    /// A ticker with the same interval was already running.
    AlreadyRunning,
    /// The interval was not positive; no ticker is running now.
    Disabled,
    /// The scheduler has been closed for shutdown.
    Closed,
}

struct Ticker {
    interval_ms: i64,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct State {
    ticker: Option<Ticker>,
    closed: bool,
}

pub struct HeartbeatScheduler {
    publisher: Arc<StatusPublisher>,
    state: Mutex<State>,
}

impl HeartbeatScheduler {
    pub fn new(publisher: Arc<StatusPublisher>) -> Self {
        Self {
            publisher,
            state: Mutex::new(State::default()),
        }
    }

    /// Run the heartbeat every `interval_ms`. The first beat fires one
    /// interval after the start.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, interval_ms: i64) -> StartOutcome {
        let mut state = self.state.lock();

        if state.closed {
            tracing::debug!(interval_ms, "heartbeat scheduler closed, not starting");
            return StartOutcome::Closed;
        }

        if interval_ms <= 0 {
            tracing::error!(
                interval_ms,
                "invalid heartbeat interval, must be greater than zero"
            );
            stop_ticker(&mut state);
            return StartOutcome::Disabled;
        }

        if let Some(ticker) = &state.ticker {
            if ticker.interval_ms == interval_ms && !ticker.handle.is_finished() {
                tracing::debug!(interval_ms, "heartbeat already running");
                return StartOutcome::AlreadyRunning;
            }
        }

        stop_ticker(&mut state);

        let (stop, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(run_ticker(
            Arc::clone(&self.publisher),
            interval_ms,
            stop_rx,
        ));
        state.ticker = Some(Ticker {
            interval_ms,
            stop,
            handle,
        });

        log_heartbeat_started!(interval_ms, "heartbeat ticker started");
        StartOutcome::Started
    }

    /// Stop the running ticker, if any.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if !stop_ticker(&mut state) {
            tracing::debug!("heartbeat ticker is not running");
        }
    }

    /// Stop the ticker and refuse any later `start`.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        stop_ticker(&mut state);
    }

    /// Interval of the live ticker.
    pub fn current_interval(&self) -> Option<i64> {
        self.state.lock().ticker.as_ref().map(|t| t.interval_ms)
    }

    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .ticker
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }
}

/// Returns whether a ticker was running.
fn stop_ticker(state: &mut State) -> bool {
    match state.ticker.take() {
        Some(ticker) => {
            // The task may already be gone; a failed send is fine.
            let _ = ticker.stop.send(());
            tracing::debug!(interval_ms = ticker.interval_ms, "heartbeat ticker stopped");
            true
        }
        None => false,
    }
}

async fn run_ticker(
    publisher: Arc<StatusPublisher>,
    interval_ms: i64,
    mut stop: oneshot::Receiver<()>,
) {
    let period = Duration::from_millis(interval_ms.unsigned_abs());
    let mut ticks = interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticks.tick() => {
                // Best effort; the publisher already logs and counts failures.
                let _ = publisher.send_heartbeat().await;
            }
        }
    }
}
