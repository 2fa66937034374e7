//! Configuration for the ledger service
//!
//! Layered: built-in defaults, then an optional file (`CONFIG_FILE` or
//! `config/<ENVIRONMENT>`), then `LEDGER__SECTION__KEY` environment
//! variables, then the conventional `DATABASE_URL` / `NATS_URL` /
//! `LEDGER_PORT` overrides.

use crate::{Error, Result};
use config::{builder::DefaultState, ConfigBuilder, Environment, File};
use message_bus::{NatsConfig, PublisherConfig, SubscriberConfig};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Service configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// HTTP server
    pub server: ServerConfig,

    /// PostgreSQL
    pub database: DatabaseConfig,

    /// Event channel
    pub nats: NatsSettings,

    /// Background tasks
    pub scheduler: SchedulerConfig,

    /// Write path behavior
    pub ledger: LedgerConfig,

    /// Logging
    pub logger: LoggerConfig,
}

/// HTTP server settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Worker threads
    pub workers: usize,
}

/// Database settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    /// Connection URL
    pub url: String,

    /// Pool upper bound
    pub max_connections: u32,

    /// Pool lower bound
    pub min_connections: u32,

    /// Connection acquire timeout
    pub acquire_timeout_secs: u64,

    /// Apply embedded migrations at startup
    pub run_migrations: bool,
}

/// Event channel settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NatsSettings {
    /// Server URL
    pub url: String,

    /// JetStream stream name
    pub stream_name: String,

    /// Topic transactions are published to
    pub subject: String,

    /// Durable consumer (group) used by the drain task
    pub consumer_group: String,

    /// Send timeout
    pub publish_timeout_secs: u64,

    /// Consumer ack wait
    pub ack_wait_secs: u64,

    /// Stream retention
    pub max_age_hours: u64,
}

impl NatsSettings {
    /// Connection settings for the event channel
    pub fn connection(&self) -> NatsConfig {
        NatsConfig {
            url: self.url.clone(),
            stream_name: self.stream_name.clone(),
            subject: self.subject.clone(),
            connection_name: "ledger-core".to_string(),
            max_age_hours: self.max_age_hours,
        }
    }

    /// Producer settings
    pub fn publisher(&self) -> PublisherConfig {
        PublisherConfig {
            publish_timeout: Duration::from_secs(self.publish_timeout_secs),
        }
    }

    /// Consumer settings
    pub fn subscriber(&self) -> SubscriberConfig {
        SubscriberConfig {
            consumer_group: self.consumer_group.clone(),
            ack_wait: Duration::from_secs(self.ack_wait_secs),
        }
    }
}

/// Background task settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SchedulerConfig {
    /// Promotion sweep period (seconds)
    pub promotion_interval_secs: u64,

    /// Event drain period (minutes)
    pub drain_interval_mins: u64,

    /// Only promote transactions at least this old; 0 sweeps everything
    pub promotion_min_age_secs: u64,

    /// Outbox relay period (seconds), outbox delivery only
    pub outbox_relay_interval_secs: u64,

    /// Outbox rows forwarded per relay tick
    pub outbox_batch_size: i64,
}

/// How accepted transactions reach the event channel
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Publish, then insert. A store fault after publish strands the event.
    Direct,
    /// Insert row and outbox entry atomically; a relay task publishes.
    Outbox,
}

/// Write path settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LedgerConfig {
    /// Event delivery mode
    pub delivery: DeliveryMode,

    /// Run credit/debit sequences for the same client one at a time
    pub serialize_client_writes: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            delivery: DeliveryMode::Direct,
            serialize_client_writes: true,
        }
    }
}

/// Log output format
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Structured JSON lines (production)
    Json,
    /// Human-readable (development)
    Pretty,
}

/// Logging settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggerConfig {
    /// Output format
    pub format: LogFormat,

    /// Default filter when `RUST_LOG` is unset
    pub level: String,

    /// Also write to a daily-rotated file in this directory
    pub directory: Option<String>,

    /// File name prefix for the file sink
    pub file_name: String,
}

impl Config {
    /// Built-in defaults
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", 4)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 1)?
            .set_default("database.acquire_timeout_secs", 5)?
            .set_default("database.run_migrations", true)?
            .set_default("nats.url", "nats://localhost:4222")?
            .set_default("nats.stream_name", "LEDGER_TRANSACTIONS")?
            .set_default("nats.subject", "ledger.transactions")?
            .set_default("nats.consumer_group", "ledger-drain")?
            .set_default("nats.publish_timeout_secs", 10)?
            .set_default("nats.ack_wait_secs", 30)?
            .set_default("nats.max_age_hours", 168)?
            .set_default("scheduler.promotion_interval_secs", 30)?
            .set_default("scheduler.drain_interval_mins", 1)?
            .set_default("scheduler.promotion_min_age_secs", 0)?
            .set_default("scheduler.outbox_relay_interval_secs", 5)?
            .set_default("scheduler.outbox_batch_size", 100)?
            .set_default("ledger.delivery", "direct")?
            .set_default("ledger.serialize_client_writes", true)?
            .set_default("logger.format", "json")?
            .set_default("logger.level", "info")?
            .set_default("logger.file_name", "ledger.log")?;

        Ok(builder)
    }

    /// Load from defaults, file and environment
    pub fn from_env() -> Result<Self> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut builder = Self::defaults()?;

        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false));
        } else {
            builder = builder
                .add_source(File::with_name(&format!("config/{}", environment)).required(false));
        }

        builder = builder.add_source(Environment::with_prefix("LEDGER").separator("__"));

        if let Ok(db_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", db_url)?;
        }

        if let Ok(nats_url) = env::var("NATS_URL") {
            builder = builder.set_override("nats.url", nats_url)?;
        }

        if let Ok(port) = env::var("LEDGER_PORT") {
            builder = builder.set_override("server.port", port)?;
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Reject configurations the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::Config("Server port cannot be 0".to_string()));
        }

        if self.database.url.is_empty() {
            return Err(Error::Config("Database URL is required".to_string()));
        }

        if self.nats.url.is_empty() {
            return Err(Error::Config("NATS URL is required".to_string()));
        }

        if self.scheduler.promotion_interval_secs == 0 || self.scheduler.drain_interval_mins == 0 {
            return Err(Error::Config("Scheduler intervals must be positive".to_string()));
        }

        if self.ledger.delivery == DeliveryMode::Outbox
            && (self.scheduler.outbox_relay_interval_secs == 0
                || self.scheduler.outbox_batch_size <= 0)
        {
            return Err(Error::Config(
                "Outbox delivery needs a positive relay interval and batch size".to_string(),
            ));
        }

        Ok(())
    }
}
