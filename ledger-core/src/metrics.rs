//! Prometheus metrics for the ledger
//!
//! # Metrics
//!
//! - `ledger_transactions_total` - accepted/rejected writes by direction and outcome
//! - `ledger_write_duration_seconds` - credit/debit latency
//! - `ledger_balance_queries_total` - balance reads by kind
//! - `ledger_promoted_total` - transactions moved Pending→Finalized
//! - `ledger_scheduler_runs_total` - scheduler ticks by job and outcome
//! - `ledger_outbox_relayed_total` - outbox rows forwarded to the channel

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram, register_int_counter, register_int_counter_vec,
    CounterVec, Encoder, Histogram, IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    /// Credit/debit outcomes
    pub static ref TRANSACTIONS_TOTAL: CounterVec = register_counter_vec!(
        "ledger_transactions_total",
        "Credit and debit requests by outcome",
        &["direction", "status"]
    )
    .unwrap();

    /// Credit/debit latency
    pub static ref WRITE_DURATION: Histogram = register_histogram!(
        "ledger_write_duration_seconds",
        "Credit and debit duration in seconds",
        vec![0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.0, 5.0, 10.0]
    )
    .unwrap();

    /// Balance reads
    pub static ref BALANCE_QUERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ledger_balance_queries_total",
        "Balance queries by kind",
        &["kind"]
    )
    .unwrap();

    /// Promoted transactions
    pub static ref PROMOTED_TOTAL: IntCounter = register_int_counter!(
        "ledger_promoted_total",
        "Transactions promoted from Pending to Finalized"
    )
    .unwrap();

    /// Scheduler ticks
    pub static ref SCHEDULER_RUNS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ledger_scheduler_runs_total",
        "Scheduler ticks by job and outcome",
        &["job", "status"]
    )
    .unwrap();

    /// Outbox rows forwarded
    pub static ref OUTBOX_RELAYED_TOTAL: IntCounter = register_int_counter!(
        "ledger_outbox_relayed_total",
        "Outbox rows published to the event channel"
    )
    .unwrap();
}

/// Render every registered metric in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
