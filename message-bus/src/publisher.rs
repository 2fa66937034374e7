//! Event publisher

use crate::{
    client::NatsClient,
    metrics::{MESSAGE_PUBLISH_DURATION, MESSAGE_PUBLISH_TOTAL},
    types::{OutboundEvent, KEY_HEADER},
    Error, Result,
};
use async_nats::HeaderMap;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Sends one event per accepted transaction
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a single keyed event. No retry is attempted.
    async fn publish(&self, event: &OutboundEvent) -> Result<()>;

    /// Release the producer side
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Publisher configuration
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Send timeout (covers the JetStream acknowledgment)
    pub publish_timeout: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            publish_timeout: Duration::from_secs(10),
        }
    }
}

/// JetStream-backed publisher
#[derive(Debug)]
pub struct NatsPublisher {
    client: Arc<NatsClient>,
    config: PublisherConfig,
}

impl NatsPublisher {
    /// Create new publisher
    pub fn new(client: Arc<NatsClient>, config: PublisherConfig) -> Self {
        Self { client, config }
    }

    async fn publish_acked(&self, event: &OutboundEvent) -> Result<()> {
        let subject = self.client.config().subject.clone();

        let mut headers = HeaderMap::new();
        headers.insert(KEY_HEADER, event.key.as_str());

        let ack = self
            .client
            .jetstream()
            .publish_with_headers(subject, headers, event.value.clone().into_bytes().into())
            .await
            .map_err(|e| Error::Publish(e.to_string()))?;

        ack.await
            .map_err(|e| Error::Publish(format!("Publish ack failed: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: &OutboundEvent) -> Result<()> {
        let start = Instant::now();
        let timeout = self.config.publish_timeout;

        debug!("Publishing event {} to {}", event.key, self.client.config().subject);

        let result = match tokio::time::timeout(timeout, self.publish_acked(event)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(timeout.as_millis() as u64)),
        };

        MESSAGE_PUBLISH_DURATION.observe(start.elapsed().as_secs_f64());
        let status = if result.is_ok() { "success" } else { "error" };
        MESSAGE_PUBLISH_TOTAL.with_label_values(&[status]).inc();

        if let Err(ref e) = result {
            error!("Failed to publish event {}: {}", event.key, e);
        }

        result
    }

    async fn close(&self) -> Result<()> {
        info!("Closing event producer");
        self.client.flush().await
    }
}
