//! Ledger repository
//!
//! Resolves clients and currencies, writes transactions to the store and the
//! event channel, and aggregates balances.
//!
//! # Delivery
//!
//! In [`DeliveryMode::Direct`] a credit or debit publishes its event first
//! and inserts the row second. A publish failure aborts the write with
//! nothing persisted; an insert failure after a successful publish leaves an
//! orphaned event behind. In [`DeliveryMode::Outbox`] the row and an outbox
//! row are inserted atomically and [`LedgerRepository::relay_outbox`]
//! forwards them later, so neither failure mode exists.
//!
//! # Concurrency
//!
//! With client serialization on, credits and debits for one client run their
//! reserve/publish/insert sequence one at a time. Balance reads and the
//! promotion sweep take no lock and observe whatever the store shows.

use crate::{
    config::{Config, DeliveryMode},
    metrics::{
        BALANCE_QUERIES_TOTAL, OUTBOX_RELAYED_TOTAL, PROMOTED_TOTAL, TRANSACTIONS_TOTAL,
        WRITE_DURATION,
    },
    store::LedgerStore,
    types::{Client, ClientId, Direction, Requisites, Transaction, TransactionStatus},
    Error, Result,
};
use chrono::Utc;
use dashmap::DashMap;
use message_bus::EventPublisher;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, instrument, warn};

/// Per-client write locks
#[derive(Debug, Default)]
pub struct ClientLocks {
    locks: DashMap<ClientId, Arc<Mutex<()>>>,
}

impl ClientLocks {
    /// No locks held
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive write access to `client_id`
    pub async fn acquire(&self, client_id: ClientId) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(self.locks.entry(client_id).or_default().value());
        lock.lock_owned().await
    }
}

/// Repository behavior switches
#[derive(Debug, Clone)]
pub struct RepositoryOptions {
    /// How events reach the channel
    pub delivery: DeliveryMode,

    /// Serialize credit/debit per client
    pub serialize_client_writes: bool,

    /// Promotion only touches rows at least this old; 0 sweeps all
    pub promotion_min_age_secs: u64,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            delivery: DeliveryMode::Direct,
            serialize_client_writes: true,
            promotion_min_age_secs: 0,
        }
    }
}

impl From<&Config> for RepositoryOptions {
    fn from(config: &Config) -> Self {
        Self {
            delivery: config.ledger.delivery,
            serialize_client_writes: config.ledger.serialize_client_writes,
            promotion_min_age_secs: config.scheduler.promotion_min_age_secs,
        }
    }
}

/// Ledger repository
pub struct LedgerRepository {
    store: Arc<dyn LedgerStore>,
    publisher: Arc<dyn EventPublisher>,
    locks: Option<ClientLocks>,
    options: RepositoryOptions,
}

impl std::fmt::Debug for LedgerRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerRepository")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl LedgerRepository {
    /// Create a repository over a store and an event publisher
    pub fn new(
        store: Arc<dyn LedgerStore>,
        publisher: Arc<dyn EventPublisher>,
        options: RepositoryOptions,
    ) -> Self {
        let locks = options.serialize_client_writes.then(ClientLocks::new);
        Self {
            store,
            publisher,
            locks,
            options,
        }
    }

    /// Record an incoming amount for the client
    pub async fn credit(
        &self,
        currency_code: i32,
        amount: Decimal,
        requisites: Requisites,
    ) -> Result<Transaction> {
        self.record(Direction::Credit, currency_code, amount, requisites)
            .await
    }

    /// Record an outgoing amount for the client; the amount is negated
    pub async fn debit(
        &self,
        currency_code: i32,
        amount: Decimal,
        requisites: Requisites,
    ) -> Result<Transaction> {
        self.record(Direction::Debit, currency_code, amount, requisites)
            .await
    }

    /// Sum of the client's Finalized amounts
    #[instrument(skip(self))]
    pub async fn finalized_balance(&self, requisites: Requisites) -> Result<Decimal> {
        BALANCE_QUERIES_TOTAL.with_label_values(&["available"]).inc();
        let client = self.resolve_client(&requisites).await?;
        self.store
            .sum_amounts(client.id, TransactionStatus::Finalized)
            .await
    }

    /// Sum of the client's Pending amounts
    #[instrument(skip(self))]
    pub async fn frozen_balance(&self, requisites: Requisites) -> Result<Decimal> {
        BALANCE_QUERIES_TOTAL.with_label_values(&["frozen"]).inc();
        let client = self.resolve_client(&requisites).await?;
        self.store
            .sum_amounts(client.id, TransactionStatus::Pending)
            .await
    }

    /// Move Pending transactions to Finalized
    pub async fn promote_pending(&self) -> Result<u64> {
        let cutoff = match self.options.promotion_min_age_secs {
            0 => None,
            secs => {
                let age = chrono::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX));
                Utc::now().checked_sub_signed(age)
            }
        };

        let promoted = self.store.promote_pending(cutoff).await?;
        PROMOTED_TOTAL.inc_by(promoted);

        if promoted > 0 {
            info!(promoted, "Promoted pending transactions");
        } else {
            debug!("No pending transactions to promote");
        }

        Ok(promoted)
    }

    /// Publish up to `batch` unsent outbox rows, oldest first
    ///
    /// Stops at the first publish failure so later rows never overtake an
    /// earlier one; the remainder goes out on the next call.
    pub async fn relay_outbox(&self, batch: i64) -> Result<u64> {
        let entries = self.store.pending_outbox(batch).await?;
        let mut relayed = 0;

        for entry in entries {
            if let Err(e) = self.publisher.publish(&entry.event).await {
                warn!(
                    outbox_id = entry.id,
                    transaction_id = %entry.transaction_id,
                    "Outbox relay publish failed: {}",
                    e
                );
                return Err(Error::PublishFailure(e));
            }

            self.store.mark_outbox_sent(entry.id).await?;
            OUTBOX_RELAYED_TOTAL.inc();
            relayed += 1;
        }

        if relayed > 0 {
            info!(relayed, "Relayed outbox events");
        }

        Ok(relayed)
    }

    /// Resolve by wallet number first, then card number
    pub async fn resolve_client(&self, requisites: &Requisites) -> Result<Client> {
        if requisites.is_empty() {
            return Err(Error::ClientNotFound);
        }

        if let Some(wallet_number) = requisites.wallet_number {
            if let Some(client) = self.store.find_client_by_wallet(wallet_number).await? {
                return Ok(client);
            }
        }

        if let Some(card_number) = requisites.card_number {
            if let Some(client) = self.store.find_client_by_card(card_number).await? {
                return Ok(client);
            }
        }

        Err(Error::ClientNotFound)
    }

    #[instrument(skip(self, direction), fields(direction = direction.as_str()))]
    async fn record(
        &self,
        direction: Direction,
        currency_code: i32,
        amount: Decimal,
        requisites: Requisites,
    ) -> Result<Transaction> {
        let timer = WRITE_DURATION.start_timer();
        let result = self
            .write(direction, currency_code, amount, &requisites)
            .await;
        timer.observe_duration();

        let status = match &result {
            Ok(transaction) => {
                info!(
                    transaction_id = %transaction.id,
                    client_id = %transaction.client_id,
                    amount = %transaction.amount,
                    "Transaction recorded"
                );
                "success"
            }
            Err(e) => {
                warn!("Transaction rejected: {}", e);
                e.error_type()
            }
        };
        TRANSACTIONS_TOTAL
            .with_label_values(&[direction.as_str(), status])
            .inc();

        result
    }

    async fn write(
        &self,
        direction: Direction,
        currency_code: i32,
        amount: Decimal,
        requisites: &Requisites,
    ) -> Result<Transaction> {
        let client = self.resolve_client(requisites).await?;
        let currency = self
            .store
            .find_currency_by_code(currency_code)
            .await?
            .ok_or(Error::CurrencyNotFound(currency_code))?;

        let _guard = match &self.locks {
            Some(locks) => Some(locks.acquire(client.id).await),
            None => None,
        };

        let id = self.store.reserve_transaction_id().await?;
        let transaction = Transaction::pending(
            id,
            client.id,
            currency.id,
            direction.apply(amount),
            Utc::now(),
        );

        match self.options.delivery {
            DeliveryMode::Direct => {
                let event = transaction.to_event()?;
                self.publisher
                    .publish(&event)
                    .await
                    .map_err(Error::PublishFailure)?;

                self.store
                    .insert_transaction(&transaction)
                    .await
                    .map_err(|e| {
                        error!(
                            transaction_id = %transaction.id,
                            "Event published but insert failed, event is orphaned: {}",
                            e
                        );
                        match e {
                            Error::PersistFailure(_) => e,
                            other => Error::PersistFailure(other.to_string()),
                        }
                    })
            }
            DeliveryMode::Outbox => self
                .store
                .insert_transaction_with_outbox(&transaction)
                .await
                .map_err(|e| match e {
                    Error::PersistFailure(_) => e,
                    other => Error::PersistFailure(other.to_string()),
                }),
        }
    }
}
