//! Store contract used by the ledger repository
//!
//! A deliberately narrow set of lookup, insert, aggregate and bulk-update
//! primitives. Implementations: [`crate::database::PgStore`] (PostgreSQL)
//! and [`crate::memory::MemoryStore`] (in-process).

use crate::{
    types::{Client, ClientId, Currency, Transaction, TransactionId, TransactionStatus},
    Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use message_bus::OutboundEvent;
use rust_decimal::Decimal;

/// Outbox row awaiting relay to the event channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    /// Outbox row ID
    pub id: i64,

    /// Transaction the event mirrors
    pub transaction_id: TransactionId,

    /// Event to forward
    pub event: OutboundEvent,

    /// When the row was written
    pub created_at: DateTime<Utc>,
}

/// Persistent ledger store
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Client owning the wallet number
    async fn find_client_by_wallet(&self, wallet_number: i64) -> Result<Option<Client>>;

    /// Client owning the card number
    async fn find_client_by_card(&self, card_number: i64) -> Result<Option<Client>>;

    /// Currency registered under the ISO numeric code
    async fn find_currency_by_code(&self, code: i32) -> Result<Option<Currency>>;

    /// Take the next transaction identifier from the store's sequence
    async fn reserve_transaction_id(&self) -> Result<TransactionId>;

    /// Insert a transaction whose identifier was reserved beforehand
    async fn insert_transaction(&self, transaction: &Transaction) -> Result<Transaction>;

    /// Insert a transaction and its outbox row atomically
    async fn insert_transaction_with_outbox(&self, transaction: &Transaction)
        -> Result<Transaction>;

    /// Sum of a client's amounts in `status`; zero when there are none
    async fn sum_amounts(&self, client_id: ClientId, status: TransactionStatus) -> Result<Decimal>;

    /// Move Pending rows to Finalized. `created_before` limits the sweep to
    /// rows at least that old; `None` sweeps every Pending row.
    async fn promote_pending(&self, created_before: Option<DateTime<Utc>>) -> Result<u64>;

    /// Oldest unsent outbox rows
    async fn pending_outbox(&self, limit: i64) -> Result<Vec<OutboxEntry>>;

    /// Mark an outbox row as forwarded
    async fn mark_outbox_sent(&self, outbox_id: i64) -> Result<()>;

    /// Release the store connection
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
