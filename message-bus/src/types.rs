//! Event records carried by the channel

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Header carrying the message key (the transaction identifier as text)
pub const KEY_HEADER: &str = "Ledger-Key";

/// Event handed to a publisher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEvent {
    /// Message key
    pub key: String,

    /// Opaque textual value
    pub value: String,
}

impl OutboundEvent {
    /// Create new event
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Build an event whose value is the JSON rendering of `record`
    pub fn json<T: Serialize>(key: impl Into<String>, record: &T) -> crate::Result<Self> {
        Ok(Self::new(key, serde_json::to_string(record)?))
    }
}

/// Event read back from the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Message key (empty when the publisher set none)
    pub key: String,

    /// Message value
    pub value: String,

    /// When the consumer received it
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    /// Create new inbound event stamped with the current time
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            received_at: Utc::now(),
        }
    }
}
