//! In-memory transport doubles for tests.

use crate::error::TransportError;
use crate::model::PdpStatus;
use crate::publisher::StatusSender;
use crate::transport::{MessageSink, MessageSource};
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Records every status it is asked to send.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<PdpStatus>>,
    fail: AtomicBool,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail with `PublishFailed`.
    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<PdpStatus> {
        self.sent.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl StatusSender for RecordingSender {
    fn send_status(&self, status: PdpStatus) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            if self.fail.load(Ordering::SeqCst) {
                return Err(TransportError::PublishFailed("send disabled".into()));
            }
            self.sent.lock().push(status);
            Ok(())
        })
    }
}

/// Records raw produced payloads.
#[derive(Default)]
pub struct RecordingSink {
    payloads: Mutex<Vec<Vec<u8>>>,
    closed: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.payloads.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl MessageSink for RecordingSink {
    fn produce(&self, payload: Vec<u8>) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            if self.is_closed() {
                return Err(TransportError::Closed);
            }
            self.payloads.lock().push(payload);
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
        })
    }
}

/// A message source fed through a channel.
pub struct ChannelSource {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    subscribed: AtomicBool,
    closed: AtomicBool,
    unsubscribe_calls: AtomicUsize,
    fail_unsubscribe: AtomicBool,
}

impl ChannelSource {
    /// Returns the source and the sender that feeds it.
    pub fn new() -> (Self, mpsc::UnboundedSender<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Self {
            rx: tokio::sync::Mutex::new(rx),
            subscribed: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            unsubscribe_calls: AtomicUsize::new(0),
            fail_unsubscribe: AtomicBool::new(false),
        };
        (source, tx)
    }

    /// Make `unsubscribe` return an error.
    pub fn fail_unsubscribe(&self, fail: bool) {
        self.fail_unsubscribe.store(fail, Ordering::SeqCst);
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }
}

impl MessageSource for ChannelSource {
    fn read_next(&self, timeout: Duration) -> BoxFuture<'_, Result<Vec<u8>, TransportError>> {
        Box::pin(async move {
            if self.is_closed() {
                return Err(TransportError::Closed);
            }
            let mut rx = self.rx.lock().await;
            match tokio::time::timeout(timeout, rx.recv()).await {
                Ok(Some(payload)) => Ok(payload),
                Ok(None) => Err(TransportError::Closed),
                Err(_) => Err(TransportError::Timeout),
            }
        })
    }

    fn unsubscribe(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_unsubscribe.load(Ordering::SeqCst) {
                return Err(TransportError::SubscribeFailed("unsubscribe refused".into()));
            }
            self.subscribed.store(false, Ordering::SeqCst);
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
        })
    }
}
