//! Kafka transport for the PAP topic.
//!
//! Both handles are built explicitly during startup and shared through `Arc`.
//! The consumer follows every partition of the topic from the latest offset
//! at connect time. Each partition keeps its own offset. The producer appends
//! to partition 0.

use crate::error::TransportError;
use chrono::Utc;
use futures_util::future::{join_all, BoxFuture};
use parking_lot::Mutex;
use rskafka::client::partition::{Compression, OffsetAt, PartitionClient, UnknownTopicHandling};
use rskafka::client::{Client, ClientBuilder, Credentials, SaslConfig};
use rskafka::record::Record;
use rskafka::BackoffConfig;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on the bytes returned by a single fetch.
const MAX_FETCH_BYTES: i32 = 1_048_576;

/// Partition the producer appends to.
const PRODUCE_PARTITION: i32 = 0;

/// SCRAM-SHA-512 credentials for SASL_PLAINTEXT brokers.
#[derive(Clone)]
pub struct SaslCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for SaslCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaslCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Connection settings shared by consumer and producer.
#[derive(Debug, Clone)]
pub struct KafkaSettings {
    pub brokers: Vec<String>,
    pub topic: String,
    pub group_id: String,
    pub sasl: Option<SaslCredentials>,
    /// How long connection attempts keep retrying before giving up.
    pub connect_deadline: Duration,
}

impl KafkaSettings {
    pub fn new(brokers: &str, topic: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            brokers: parse_brokers(brokers),
            topic: topic.into(),
            group_id: group_id.into(),
            sasl: None,
            connect_deadline: Duration::from_secs(10),
        }
    }

    pub fn with_sasl(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.sasl = Some(SaslCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_connect_deadline(mut self, deadline: Duration) -> Self {
        self.connect_deadline = deadline;
        self
    }
}

/// Split a comma-separated bootstrap list.
pub fn parse_brokers(brokers: &str) -> Vec<String> {
    brokers
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

async fn build_client(settings: &KafkaSettings) -> Result<Client, TransportError> {
    let backoff = BackoffConfig {
        deadline: Some(settings.connect_deadline),
        ..Default::default()
    };
    let mut builder = ClientBuilder::new(settings.brokers.clone()).backoff_config(backoff);
    if let Some(creds) = &settings.sasl {
        builder = builder.sasl_config(SaslConfig::ScramSha512(Credentials::new(
            creds.username.clone(),
            creds.password.clone(),
        )));
    }
    builder
        .build()
        .await
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))
}

async fn partition_client(
    client: &Client,
    topic: &str,
    partition: i32,
) -> Result<PartitionClient, TransportError> {
    client
        .partition_client(topic.to_string(), partition, UnknownTopicHandling::Retry)
        .await
        .map_err(|e| TransportError::SubscribeFailed(e.to_string()))
}

/// Inbound side of the transport.
pub trait MessageSource: Send + Sync {
    /// Next raw payload, or [`TransportError::Timeout`] when nothing arrived
    /// within `timeout`.
    fn read_next(&self, timeout: Duration) -> BoxFuture<'_, Result<Vec<u8>, TransportError>>;

    /// Stop receiving. Safe to call more than once.
    fn unsubscribe(&self) -> BoxFuture<'_, Result<(), TransportError>>;

    /// Release the handle. Safe to call more than once.
    fn close(&self) -> BoxFuture<'_, ()>;
}

/// Outbound side of the transport.
pub trait MessageSink: Send + Sync {
    fn produce(&self, payload: Vec<u8>) -> BoxFuture<'_, Result<(), TransportError>>;

    fn close(&self) -> BoxFuture<'_, ()>;
}

/// Partitions to follow for `topic`, sorted. An unknown or not yet
/// described topic falls back to partition 0.
pub fn topic_partitions<I>(topics: I, topic: &str) -> Vec<i32>
where
    I: IntoIterator<Item = (String, Vec<i32>)>,
{
    let mut partitions: Vec<i32> = topics
        .into_iter()
        .filter(|(name, _)| name == topic)
        .flat_map(|(_, partitions)| partitions)
        .collect();
    partitions.sort_unstable();
    partitions.dedup();
    if partitions.is_empty() {
        partitions.push(0);
    }
    partitions
}

struct PartitionCursor {
    partition: i32,
    client: Arc<PartitionClient>,
    offset: i64,
}

impl PartitionCursor {
    async fn fetch(&mut self, max_wait_ms: i32) -> Result<Vec<Vec<u8>>, TransportError> {
        let (records, _high_watermark) = self
            .client
            .fetch_records(self.offset, 1..MAX_FETCH_BYTES, max_wait_ms)
            .await
            .map_err(|e| {
                TransportError::ReadFailed(format!("partition {}: {e}", self.partition))
            })?;

        let mut payloads = Vec::with_capacity(records.len());
        for record in records {
            self.offset = record.offset + 1;
            if let Some(value) = record.record.value {
                payloads.push(value);
            }
        }
        Ok(payloads)
    }
}

struct Cursor {
    partitions: Vec<PartitionCursor>,
    pending: VecDeque<Vec<u8>>,
}

/// Kafka consumer following every partition of the PAP topic.
pub struct KafkaConsumer {
    topic: String,
    subscribed: AtomicBool,
    closed: AtomicBool,
    cursor: tokio::sync::Mutex<Cursor>,
}

impl KafkaConsumer {
    /// Connect, resolve the topic's partitions and start each at its latest
    /// offset.
    pub async fn connect(settings: &KafkaSettings) -> Result<Self, TransportError> {
        let client = build_client(settings).await?;
        let topics = client
            .list_topics()
            .await
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))?;
        let ids = topic_partitions(
            topics
                .into_iter()
                .map(|t| (t.name, t.partitions.into_iter().collect())),
            &settings.topic,
        );

        let mut partitions = Vec::with_capacity(ids.len());
        for id in ids {
            let client = partition_client(&client, &settings.topic, id).await?;
            let offset = client
                .get_offset(OffsetAt::Latest)
                .await
                .map_err(|e| TransportError::SubscribeFailed(e.to_string()))?;
            partitions.push(PartitionCursor {
                partition: id,
                client: Arc::new(client),
                offset,
            });
        }

        tracing::info!(
            brokers = ?settings.brokers,
            topic = %settings.topic,
            group_id = %settings.group_id,
            sasl = settings.sasl.is_some(),
            partitions = ?partitions.iter().map(|p| (p.partition, p.offset)).collect::<Vec<_>>(),
            "subscribed to PAP topic"
        );

        Ok(Self {
            topic: settings.topic.clone(),
            subscribed: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            cursor: tokio::sync::Mutex::new(Cursor {
                partitions,
                pending: VecDeque::new(),
            }),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Polls all partitions concurrently. A failing partition is logged and
    /// only surfaces as an error when no other partition delivered anything.
    async fn fetch(&self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let mut cursor = self.cursor.lock().await;
        if let Some(payload) = cursor.pending.pop_front() {
            return Ok(payload);
        }

        if !self.subscribed.load(Ordering::Acquire) || cursor.partitions.is_empty() {
            return Err(TransportError::Closed);
        }

        let max_wait_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let results = join_all(
            cursor
                .partitions
                .iter_mut()
                .map(|partition| partition.fetch(max_wait_ms)),
        )
        .await;

        let mut first_error = None;
        for result in results {
            match result {
                Ok(payloads) => cursor.pending.extend(payloads),
                Err(e) => {
                    tracing::warn!(topic = %self.topic, error = %e, "partition fetch failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match (cursor.pending.pop_front(), first_error) {
            (Some(payload), _) => Ok(payload),
            (None, Some(e)) => Err(e),
            (None, None) => Err(TransportError::Timeout),
        }
    }
}

impl MessageSource for KafkaConsumer {
    fn read_next(&self, timeout: Duration) -> BoxFuture<'_, Result<Vec<u8>, TransportError>> {
        Box::pin(self.fetch(timeout))
    }

    fn unsubscribe(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            if self.subscribed.swap(false, Ordering::AcqRel) {
                tracing::info!(topic = %self.topic, "unsubscribed from PAP topic");
            } else {
                tracing::debug!(topic = %self.topic, "consumer already unsubscribed");
            }
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.subscribed.store(false, Ordering::Release);
            if self.closed.swap(true, Ordering::AcqRel) {
                tracing::debug!(topic = %self.topic, "consumer already closed");
                return;
            }
            // Waits for an in-flight fetch; the loop is cancelled before close.
            self.cursor.lock().await.partitions.clear();
            tracing::info!(topic = %self.topic, "consumer closed");
        })
    }
}

/// Kafka producer for outbound status messages.
pub struct KafkaProducer {
    topic: String,
    client: Mutex<Option<Arc<PartitionClient>>>,
}

impl KafkaProducer {
    pub async fn connect(settings: &KafkaSettings) -> Result<Self, TransportError> {
        let client = build_client(settings).await?;
        let partition = partition_client(&client, &settings.topic, PRODUCE_PARTITION).await?;

        tracing::info!(
            brokers = ?settings.brokers,
            topic = %settings.topic,
            "producer connected"
        );

        Ok(Self {
            topic: settings.topic.clone(),
            client: Mutex::new(Some(Arc::new(partition))),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl MessageSink for KafkaProducer {
    fn produce(&self, payload: Vec<u8>) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            // Clone out of the lock; the guard must not live across the await.
            let client = self.client.lock().clone().ok_or(TransportError::Closed)?;
            let record = Record {
                key: None,
                value: Some(payload),
                headers: BTreeMap::new(),
                timestamp: Utc::now(),
            };
            client
                .produce(vec![record], Compression::NoCompression)
                .await
                .map_err(|e| TransportError::PublishFailed(e.to_string()))?;
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if self.client.lock().take().is_some() {
                tracing::info!(topic = %self.topic, "producer closed");
            } else {
                tracing::debug!(topic = %self.topic, "producer already closed");
            }
        })
    }
}
