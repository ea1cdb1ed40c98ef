//! Message broker client over Redis Streams.
//!
//! Durable transport between the scheduler (producer) and the fan-out hub
//! (consumer group). A stream entry carries the serialized `FlightEvent`
//! plus its message key (the flight id), so per-flight ordering holds for
//! a given consumer group. Delivery is at-least-once: an entry is acked
//! only after the handler ran, and consumers must tolerate duplicates.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use redis::streams::{StreamReadOptions, StreamReadReply};
use tokio::sync::mpsc;
use tokio::time::sleep;

use flightdeck_core::FlightEvent;

/// Initial backoff delay for connection retries.
const INITIAL_BACKOFF_MS: u64 = 100;
/// Backoff ceiling.
const MAX_BACKOFF_MS: u64 = 5_000;
/// Delay before a consumer loop reconnects after an error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
/// Bounded buffer between the stream reader and the handler dispatcher.
const SUBSCRIBE_BUFFER: usize = 256;
/// Entries fetched per XREADGROUP round-trip.
const READ_COUNT: usize = 16;
/// XREADGROUP block timeout in milliseconds.
const READ_BLOCK_MS: usize = 5_000;

/// Errors that can occur in the broker client.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Broker connection error: {0}")]
    Connection(String),

    #[error("Topic provisioning error: {0}")]
    Provisioning(String),

    #[error("Broker publish error: {0}")]
    Publish(String),

    #[error("Broker subscribe error: {0}")]
    Subscribe(String),

    #[error("Event serialization error: {0}")]
    Serialization(String),
}

/// Anything that can publish a flight event.
///
/// The scheduler depends on this trait rather than on the broker client
/// directly; tests inject a recorder, the broker-disabled mode injects
/// `NoopPublisher`.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &FlightEvent) -> Result<(), BrokerError>;
}

/// Publisher used when the broker is disabled: logs and drops every event.
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, event: &FlightEvent) -> Result<(), BrokerError> {
        tracing::debug!(
            flight_number = %event.flight_number,
            "Broker disabled, dropping event"
        );
        Ok(())
    }
}

/// Broker client backed by Redis Streams.
pub struct BrokerClient {
    pool: Pool,
    url: String,
    topic: String,
    connect_attempts: u32,
}

impl BrokerClient {
    pub fn new(pool: Pool, url: impl Into<String>, topic: impl Into<String>, connect_attempts: u32) -> Self {
        Self {
            pool,
            url: url.into(),
            topic: topic.into(),
            connect_attempts,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Establish connectivity with bounded exponential backoff.
    ///
    /// Idempotent: an already-healthy pool answers the first PING.
    pub async fn connect(&self) -> Result<(), BrokerError> {
        for attempt in 0..self.connect_attempts {
            match self.ping().await {
                Ok(()) => {
                    tracing::info!(topic = %self.topic, "Connected to broker");
                    return Ok(());
                }
                Err(e) if attempt + 1 == self.connect_attempts => {
                    tracing::warn!(
                        error = %e,
                        attempt = attempt + 1,
                        max_attempts = self.connect_attempts,
                        "Broker connection failed"
                    );
                }
                Err(e) => {
                    let delay = backoff_delay(attempt);
                    tracing::warn!(
                        error = %e,
                        attempt = attempt + 1,
                        max_attempts = self.connect_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Broker connection failed, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
        Err(BrokerError::Connection(format!(
            "broker unreachable after {} attempts",
            self.connect_attempts
        )))
    }

    /// Best-effort disconnect; never blocks shutdown.
    pub fn disconnect(&self) {
        // Pooled connections are closed when the pool drops; nothing to drain.
        tracing::info!("Disconnected from broker");
    }

    async fn ping(&self) -> Result<(), BrokerError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))
    }

    /// Idempotent topic provisioning.
    ///
    /// Creates the stream and the consumer group positioned at the end of
    /// the log, so subscriptions see new messages only. "Already exists"
    /// is success; any other provisioning error is fatal to startup.
    /// A stream is a single partition, so `partitions`/`replication` are
    /// recorded but do not change provisioning.
    pub async fn ensure_topic(
        &self,
        group: &str,
        partitions: u32,
        replication: u32,
    ) -> Result<(), BrokerError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        let result: Result<(), redis::RedisError> = conn
            .xgroup_create_mkstream(&self.topic, group, "$")
            .await;

        match result {
            Ok(()) => {
                tracing::info!(
                    topic = %self.topic,
                    group = group,
                    partitions = partitions,
                    replication = replication,
                    "Topic created"
                );
                Ok(())
            }
            Err(e) if provisioning_conflict(&e.to_string()) => {
                tracing::info!(topic = %self.topic, group = group, "Topic already exists");
                Ok(())
            }
            Err(e) => Err(BrokerError::Provisioning(e.to_string())),
        }
    }

    /// Publish an event, waiting for broker acknowledgement.
    ///
    /// The flight id travels as the message key; entries with the same key
    /// are delivered in order to a given consumer group.
    pub async fn publish(&self, event: &FlightEvent) -> Result<(), BrokerError> {
        let payload = serde_json::to_string(event)
            .map_err(|e| BrokerError::Serialization(e.to_string()))?;

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        let entry_id: String = conn
            .xadd(
                &self.topic,
                "*",
                &[("key", event.key().as_str()), ("payload", payload.as_str())],
            )
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;

        tracing::debug!(
            topic = %self.topic,
            entry_id = %entry_id,
            flight_number = %event.flight_number,
            "Published event"
        );

        Ok(())
    }

    /// Start a consumer-group subscription.
    ///
    /// One reader task fetches entries into a bounded channel (channel
    /// fullness is the backpressure signal); one dispatcher task invokes
    /// the handler strictly one message at a time and acks afterwards. A
    /// handler error is logged and the entry acked anyway: losing one
    /// message is preferred to blocking the group behind it.
    ///
    /// The reader reconnects with a fixed delay on connection errors, so a
    /// broker outage degrades to push-nothing instead of ending the
    /// subscription.
    pub fn subscribe<F, Fut>(
        self: &Arc<Self>,
        group: &str,
        consumer: &str,
        handler: F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: Fn(FlightEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BrokerError>> + Send,
    {
        let client = Arc::clone(self);
        let group = group.to_string();
        let consumer = consumer.to_string();

        let (tx, mut rx) = mpsc::channel::<Delivery>(SUBSCRIBE_BUFFER);

        // Dispatcher: sequential handling, ack after the handler returns.
        let dispatcher_client = Arc::clone(&client);
        let dispatcher_group = group.clone();
        tokio::spawn(async move {
            while let Some(delivery) = rx.recv().await {
                match parse_event(&delivery.payload) {
                    Ok(event) => {
                        if let Err(e) = handler(event).await {
                            tracing::warn!(
                                entry_id = %delivery.id,
                                error = %e,
                                "Event handler failed, skipping message"
                            );
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            entry_id = %delivery.id,
                            error = %e,
                            "Dropping malformed event payload"
                        );
                    }
                }

                dispatcher_client
                    .ack(&dispatcher_group, &delivery.id)
                    .await;
            }
        });

        tokio::spawn(async move {
            tracing::info!(topic = %client.topic, group = %group, "Starting consumer loop");
            loop {
                match client.read_loop(&group, &consumer, &tx).await {
                    Ok(()) => {
                        tracing::info!(topic = %client.topic, "Consumer loop stopped");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(
                            topic = %client.topic,
                            error = %e,
                            "Consumer loop error, reconnecting"
                        );
                        sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        })
    }

    async fn read_loop(
        &self,
        group: &str,
        consumer: &str,
        tx: &mpsc::Sender<Delivery>,
    ) -> Result<(), BrokerError> {
        // Dedicated connection: XREADGROUP blocks and must not hold up the pool.
        let client = redis::Client::open(self.url.as_str())
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        let options = StreamReadOptions::default()
            .group(group, consumer)
            .count(READ_COUNT)
            .block(READ_BLOCK_MS);

        loop {
            let reply: StreamReadReply = conn
                .xread_options(&[self.topic.as_str()], &[">"], &options)
                .await
                .map_err(|e| BrokerError::Subscribe(e.to_string()))?;

            for key in reply.keys {
                for entry in key.ids {
                    let Some(payload) = entry.get::<String>("payload") else {
                        tracing::warn!(entry_id = %entry.id, "Stream entry without payload, acking");
                        self.ack(group, &entry.id).await;
                        continue;
                    };

                    let delivery = Delivery {
                        id: entry.id,
                        payload,
                    };
                    if tx.send(delivery).await.is_err() {
                        // Dispatcher gone: subscription is over.
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn ack(&self, group: &str, entry_id: &str) {
        match self.pool.get().await {
            Ok(mut conn) => {
                let result: Result<i64, redis::RedisError> =
                    conn.xack(&self.topic, group, &[entry_id]).await;
                if let Err(e) = result {
                    // Unacked entries stay pending and may be redelivered;
                    // duplicates are tolerated downstream.
                    tracing::warn!(entry_id = %entry_id, error = %e, "XACK failed");
                }
            }
            Err(e) => {
                tracing::warn!(entry_id = %entry_id, error = %e, "No connection for XACK");
            }
        }
    }
}

#[async_trait]
impl EventPublisher for BrokerClient {
    async fn publish(&self, event: &FlightEvent) -> Result<(), BrokerError> {
        BrokerClient::publish(self, event).await
    }
}

struct Delivery {
    id: String,
    payload: String,
}

/// Exponential backoff with a ceiling: 100ms, 200ms, 400ms, ... 5s.
fn backoff_delay(attempt: u32) -> Duration {
    let ms = INITIAL_BACKOFF_MS
        .saturating_mul(1u64 << attempt.min(16))
        .min(MAX_BACKOFF_MS);
    Duration::from_millis(ms)
}

/// Whether a provisioning error means the group already exists.
fn provisioning_conflict(message: &str) -> bool {
    message.contains("BUSYGROUP")
}

fn parse_event(payload: &str) -> Result<FlightEvent, BrokerError> {
    serde_json::from_str(payload).map_err(|e| BrokerError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flightdeck_core::{Flight, FlightStatus};
    use time::OffsetDateTime;

    #[test]
    fn test_backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(0), Duration::from_millis(100));
        assert_eq!(backoff_delay(1), Duration::from_millis(200));
        assert_eq!(backoff_delay(2), Duration::from_millis(400));
        assert_eq!(backoff_delay(5), Duration::from_millis(3200));
        assert_eq!(backoff_delay(6), Duration::from_millis(5000));
        assert_eq!(backoff_delay(63), Duration::from_millis(5000));
    }

    #[test]
    fn test_provisioning_conflict_classification() {
        assert!(provisioning_conflict(
            "BUSYGROUP Consumer Group name already exists"
        ));
        assert!(!provisioning_conflict("NOAUTH Authentication required"));
        assert!(!provisioning_conflict("connection refused"));
    }

    #[test]
    fn test_parse_event_roundtrip() {
        let flight = Flight::new("BA2490", "London", OffsetDateTime::now_utc());
        let event = FlightEvent::status_updated(&flight, FlightStatus::Delayed);
        let payload = serde_json::to_string(&event).unwrap();

        let parsed = parse_event(&payload).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_parse_event_rejects_garbage() {
        let err = parse_event("{not json").unwrap_err();
        assert!(matches!(err, BrokerError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_connect_fails_without_trailing_backoff() {
        // Port 1 refuses immediately, so elapsed time is backoff sleeps
        // only: one 100ms delay between the two attempts, none after the
        // last.
        let url = "redis://127.0.0.1:1";
        let pool = deadpool_redis::Config::from_url(url)
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .unwrap();
        let client = BrokerClient::new(pool, url, "flight-status-updates", 2);

        let started = std::time::Instant::now();
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, BrokerError::Connection(_)));
        assert!(started.elapsed() < Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_noop_publisher_swallows_events() {
        let flight = Flight::new("LH441", "Frankfurt", OffsetDateTime::now_utc());
        let event = FlightEvent::created(&flight);
        assert!(NoopPublisher.publish(&event).await.is_ok());
    }
}
