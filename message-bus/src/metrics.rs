//! Prometheus metrics for the event channel

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram, register_int_counter, CounterVec, Histogram,
    IntCounter,
};

lazy_static! {
    /// Total events published, by outcome
    pub static ref MESSAGE_PUBLISH_TOTAL: CounterVec = register_counter_vec!(
        "message_bus_publish_total",
        "Total events published",
        &["status"]
    )
    .unwrap();

    /// Event publish duration
    pub static ref MESSAGE_PUBLISH_DURATION: Histogram = register_histogram!(
        "message_bus_publish_duration_seconds",
        "Event publish duration in seconds",
        vec![0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.0, 5.0, 10.0]
    )
    .unwrap();

    /// Total events read, by outcome
    pub static ref MESSAGE_RECEIVE_TOTAL: CounterVec = register_counter_vec!(
        "message_bus_receive_total",
        "Total events read from the channel",
        &["status"]
    )
    .unwrap();

    /// Drain cycles that ended
    pub static ref DRAIN_CYCLES_TOTAL: IntCounter = register_int_counter!(
        "message_bus_drain_cycles_total",
        "Drain cycles ended by a read error"
    )
    .unwrap();
}
