//! Event consumer and the drain loop

use crate::{
    client::NatsClient,
    metrics::{DRAIN_CYCLES_TOTAL, MESSAGE_RECEIVE_TOTAL},
    types::{InboundEvent, KEY_HEADER},
    Error, Result,
};
use async_nats::jetstream::consumer::{self, pull};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Reads events back from the channel
#[async_trait]
pub trait EventConsumer: Send + Sync {
    /// Block until the next event is available
    async fn next_event(&self) -> Result<InboundEvent>;

    /// Release the consumer side
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Durable consumer name, shared by every instance of the service
    pub consumer_group: String,

    /// Acknowledgment wait time
    pub ack_wait: Duration,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            consumer_group: "ledger-drain".to_string(),
            ack_wait: Duration::from_secs(30),
        }
    }
}

/// JetStream durable pull consumer
pub struct NatsSubscriber {
    client: Arc<NatsClient>,
    config: SubscriberConfig,
    messages: Mutex<Option<pull::Stream>>,
    closed: CancellationToken,
}

impl std::fmt::Debug for NatsSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsSubscriber")
            .field("consumer_group", &self.config.consumer_group)
            .finish()
    }
}

impl NatsSubscriber {
    /// Create new subscriber; the consumer is attached lazily on first read
    pub fn new(client: Arc<NatsClient>, config: SubscriberConfig) -> Self {
        Self {
            client,
            config,
            messages: Mutex::new(None),
            closed: CancellationToken::new(),
        }
    }

    async fn open_stream(&self) -> Result<pull::Stream> {
        let stream_name = &self.client.config().stream_name;
        let stream = self
            .client
            .jetstream()
            .get_stream(stream_name)
            .await
            .map_err(|e| Error::Subscribe(e.to_string()))?;

        let consumer_config = pull::Config {
            durable_name: Some(self.config.consumer_group.clone()),
            filter_subject: self.client.config().subject.clone(),
            ack_policy: consumer::AckPolicy::Explicit,
            ack_wait: self.config.ack_wait,
            deliver_policy: consumer::DeliverPolicy::All,
            ..Default::default()
        };

        let consumer = stream
            .get_or_create_consumer(&self.config.consumer_group, consumer_config)
            .await
            .map_err(|e| Error::Subscribe(e.to_string()))?;

        info!(
            "Attached durable consumer {} to {}",
            self.config.consumer_group, stream_name
        );

        consumer
            .messages()
            .await
            .map_err(|e| Error::Subscribe(e.to_string()))
    }
}

#[async_trait]
impl EventConsumer for NatsSubscriber {
    async fn next_event(&self) -> Result<InboundEvent> {
        let mut guard = tokio::select! {
            guard = self.messages.lock() => guard,
            _ = self.closed.cancelled() => return Err(Error::Cancelled),
        };
        if guard.is_none() {
            *guard = Some(self.open_stream().await?);
        }

        // an idle stream never yields, so the read must give way to close()
        let next = match guard.as_mut() {
            Some(messages) => tokio::select! {
                next = messages.next() => next,
                _ = self.closed.cancelled() => return Err(Error::Cancelled),
            },
            None => None,
        };

        match next {
            Some(Ok(msg)) => {
                let key = msg
                    .headers
                    .as_ref()
                    .and_then(|headers| headers.get(KEY_HEADER))
                    .map(|value| value.as_str().to_string())
                    .unwrap_or_default();
                let value = String::from_utf8_lossy(&msg.payload).into_owned();

                if let Err(e) = msg.ack().await {
                    warn!("Failed to ack event {}: {}", key, e);
                }

                MESSAGE_RECEIVE_TOTAL.with_label_values(&["success"]).inc();
                Ok(InboundEvent::new(key, value))
            }
            Some(Err(e)) => {
                *guard = None;
                MESSAGE_RECEIVE_TOTAL.with_label_values(&["error"]).inc();
                Err(Error::Subscribe(e.to_string()))
            }
            None => {
                *guard = None;
                Err(Error::Subscribe("message stream closed".to_string()))
            }
        }
    }

    async fn close(&self) -> Result<()> {
        info!("Closing event consumer {}", self.config.consumer_group);
        self.closed.cancel();
        self.messages.lock().await.take();
        Ok(())
    }
}

/// Result of one drain cycle
#[derive(Debug)]
pub struct DrainReport {
    /// Events read and logged during the cycle
    pub drained: u64,

    /// The read error that ended the cycle
    pub error: Error,
}

/// Read and log events until the first read error or until `cancel`
/// fires, whichever comes first
pub async fn drain<C>(consumer: &C, cancel: &CancellationToken) -> DrainReport
where
    C: EventConsumer + ?Sized,
{
    let mut drained = 0u64;

    loop {
        let next = tokio::select! {
            next = consumer.next_event() => next,
            _ = cancel.cancelled() => Err(Error::Cancelled),
        };

        match next {
            Ok(event) => {
                drained += 1;
                info!(key = %event.key, value = %event.value, "Received event from channel");
            }
            Err(error) => {
                DRAIN_CYCLES_TOTAL.inc();
                return DrainReport { drained, error };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryChannel;
    use crate::publisher::EventPublisher;
    use crate::types::OutboundEvent;

    #[test]
    fn test_subscriber_config_default() {
        let config = SubscriberConfig::default();
        assert_eq!(config.consumer_group, "ledger-drain");
        assert_eq!(config.ack_wait, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_drain_stops_at_first_read_error() {
        let channel = InMemoryChannel::new();
        for key in ["1", "2", "3"] {
            channel.publish(&OutboundEvent::new(key, "{}")).await.unwrap();
        }

        let cancel = CancellationToken::new();
        let report = drain(&channel, &cancel).await;
        assert_eq!(report.drained, 3);
        assert!(matches!(report.error, Error::Subscribe(_)));

        // Next cycle starts from an empty channel
        let report = drain(&channel, &cancel).await;
        assert_eq!(report.drained, 0);
    }

    struct IdleConsumer;

    #[async_trait]
    impl EventConsumer for IdleConsumer {
        async fn next_event(&self) -> Result<InboundEvent> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_cancel_ends_blocked_drain() {
        let cancel = CancellationToken::new();
        let cycle = {
            let cancel = cancel.clone();
            tokio::spawn(async move { drain(&IdleConsumer, &cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!cycle.is_finished());

        cancel.cancel();
        let report = tokio::time::timeout(Duration::from_secs(1), cycle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.drained, 0);
        assert!(matches!(report.error, Error::Cancelled));
    }
}
