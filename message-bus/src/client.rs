//! NATS connection and JetStream stream management

use crate::{Error, Result};
use async_nats::jetstream::{
    self,
    stream::{Config as StreamConfig, RetentionPolicy, StorageType},
    Context as JetStreamContext,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

/// Connection and topic settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    /// Server URL
    pub url: String,

    /// JetStream stream backing the topic
    pub stream_name: String,

    /// The single subject (topic) transactions are published to
    pub subject: String,

    /// Connection name reported to the server
    pub connection_name: String,

    /// How long the stream retains events
    pub max_age_hours: u64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            stream_name: "LEDGER_TRANSACTIONS".to_string(),
            subject: "ledger.transactions".to_string(),
            connection_name: "ledger-core".to_string(),
            max_age_hours: 24 * 7,
        }
    }
}

/// Connected NATS client with a JetStream context
#[derive(Clone)]
pub struct NatsClient {
    client: async_nats::Client,
    context: JetStreamContext,
    config: NatsConfig,
}

impl std::fmt::Debug for NatsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsClient")
            .field("url", &self.config.url)
            .field("stream", &self.config.stream_name)
            .finish()
    }
}

impl NatsClient {
    /// Connect and make sure the stream exists
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        info!("Connecting to NATS at {}", config.url);

        let client = async_nats::ConnectOptions::new()
            .name(config.connection_name.clone())
            .connect(config.url.as_str())
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let context = jetstream::new(client.clone());
        let nats = Self {
            client,
            context,
            config,
        };
        nats.ensure_stream().await?;

        Ok(nats)
    }

    /// Create the stream if missing
    pub async fn ensure_stream(&self) -> Result<jetstream::stream::Stream> {
        let stream_config = StreamConfig {
            name: self.config.stream_name.clone(),
            description: Some("Ledger transaction events".to_string()),
            subjects: vec![self.config.subject.clone()],
            retention: RetentionPolicy::Limits,
            max_age: Duration::from_secs(self.config.max_age_hours * 3600),
            storage: StorageType::File,
            ..Default::default()
        };

        match self.context.get_or_create_stream(stream_config).await {
            Ok(stream) => {
                info!("Stream {} ready", self.config.stream_name);
                Ok(stream)
            }
            Err(e) => {
                error!("Failed to create stream {}: {}", self.config.stream_name, e);
                Err(Error::Connection(e.to_string()))
            }
        }
    }

    /// JetStream context
    pub fn jetstream(&self) -> &JetStreamContext {
        &self.context
    }

    /// Configuration in use
    pub fn config(&self) -> &NatsConfig {
        &self.config
    }

    /// Flush buffered writes to the server
    pub async fn flush(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .map_err(|e| Error::Connection(format!("Flush failed: {}", e)))
    }
}
