//! In-process channel for tests and local runs.
//!
//! Publisher and consumer share one FIFO queue. An empty queue is reported
//! as a read error, so a drain cycle ends once everything queued was read.

use crate::{
    publisher::EventPublisher,
    subscriber::EventConsumer,
    types::{InboundEvent, OutboundEvent},
    Error, Result,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-memory event channel
#[derive(Debug, Default)]
pub struct InMemoryChannel {
    queue: Mutex<VecDeque<OutboundEvent>>,
    history: Mutex<Vec<OutboundEvent>>,
    fail_publish: AtomicBool,
}

impl InMemoryChannel {
    /// Create an empty channel
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent publishes fail (or succeed again)
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Every event accepted so far, in publish order
    pub fn published(&self) -> Vec<OutboundEvent> {
        self.history.lock().clone()
    }

    /// Events not yet consumed
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

#[async_trait]
impl EventPublisher for InMemoryChannel {
    async fn publish(&self, event: &OutboundEvent) -> Result<()> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(Error::Publish("channel rejected the event".to_string()));
        }

        self.history.lock().push(event.clone());
        self.queue.lock().push_back(event.clone());
        Ok(())
    }
}

#[async_trait]
impl EventConsumer for InMemoryChannel {
    async fn next_event(&self) -> Result<InboundEvent> {
        match self.queue.lock().pop_front() {
            Some(event) => Ok(InboundEvent::new(event.key, event.value)),
            None => Err(Error::Subscribe("no pending events".to_string())),
        }
    }
}
