//! Event channel for ledger transactions
//!
//! Provides the outward mirror of the ledger:
//! - One keyed event per accepted transaction on a single topic
//! - JetStream persistence with a durable consumer group
//! - A drain loop that reads until the first read error
//! - An in-memory channel for tests and local runs
//!
//! Delivery is at-least-once. No retry, ordering or deduplication is added
//! on top of what the underlying channel provides.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod client;
pub mod error;
pub mod in_memory;
pub mod metrics;
pub mod publisher;
pub mod subscriber;
pub mod types;

pub use client::{NatsClient, NatsConfig};
pub use error::{Error, Result};
pub use in_memory::InMemoryChannel;
pub use publisher::{EventPublisher, NatsPublisher, PublisherConfig};
pub use subscriber::{drain, DrainReport, EventConsumer, NatsSubscriber, SubscriberConfig};
pub use types::{InboundEvent, OutboundEvent, KEY_HEADER};
