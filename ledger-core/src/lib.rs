//! Ledger core
//!
//! Per-client balances kept as signed transactions in a relational store,
//! each accepted transaction mirrored onto a durable event channel.
//!
//! # Architecture
//!
//! - **Repository**: resolves clients and currencies, writes transactions,
//!   aggregates balances ([`repository`])
//! - **Scheduler**: periodic Pending→Finalized promotion and event-channel
//!   drain ([`scheduler`])
//! - **Facade**: the four operations exposed over HTTP ([`service`],
//!   [`handlers`])
//!
//! # Invariants
//!
//! - Available balance = Σ amounts of the client's Finalized transactions
//! - Frozen balance = Σ amounts of the client's Pending transactions
//! - Status only moves forward: Pending→Finalized
//! - Transactions are never deleted

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod memory;
pub mod metrics;
pub mod repository;
pub mod runtime;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod types;

// Re-exports
pub use config::{Config, DeliveryMode};
pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use repository::{LedgerRepository, RepositoryOptions};
pub use service::LedgerService;
pub use store::LedgerStore;
pub use types::{
    Client, ClientId, Currency, CurrencyId, Direction, Requisites, Transaction, TransactionId,
    TransactionStatus,
};
