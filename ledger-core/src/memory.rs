//! In-process store for tests and local runs

use crate::{
    store::{LedgerStore, OutboxEntry},
    types::{
        Client, ClientId, Currency, CurrencyId, Transaction, TransactionId, TransactionStatus,
    },
    Error, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Reference currencies loaded by [`MemoryStore::seeded`]
pub const REFERENCE_CURRENCIES: &[(i64, i32, &str)] = &[
    (1, 840, "USD"),
    (2, 978, "EUR"),
    (3, 643, "RUB"),
    (4, 156, "CNY"),
    (5, 826, "GBP"),
    (6, 392, "JPY"),
    (7, 124, "CAD"),
    (8, 756, "CHF"),
];

/// Demo clients loaded by [`MemoryStore::seeded`]: (id, wallet, card)
pub const DEMO_CLIENTS: &[(i64, i64, i64)] = &[
    (3456, 123456789, 5321300240335856),
    (2567, 234567890, 5478396041568712),
    (1254, 345678901, 5123876098751234),
    (8745, 456789012, 5256789012457890),
];

#[derive(Debug, Default)]
struct Inner {
    clients: Vec<Client>,
    currencies: Vec<Currency>,
    transactions: BTreeMap<TransactionId, Transaction>,
    outbox: Vec<(OutboxEntry, bool)>,
    next_transaction_id: i64,
    next_outbox_id: i64,
}

/// Store holding everything in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    fail_inserts: AtomicBool,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with reference currencies and demo clients
    pub fn seeded() -> Self {
        let store = Self::new();
        for &(id, code, name) in REFERENCE_CURRENCIES {
            store.add_currency(id, code, name);
        }
        for &(id, wallet, card) in DEMO_CLIENTS {
            store.add_client(id, wallet, card);
        }
        store
    }

    /// Register a client; zero numbers are stored as absent
    ///
    /// # Panics
    ///
    /// Panics if `id` is zero.
    pub fn add_client(&self, id: i64, wallet_number: i64, card_number: i64) -> Client {
        let client = Client {
            id: ClientId::new(id).expect("client id must be non-zero"),
            wallet_number: (wallet_number != 0).then_some(wallet_number),
            card_number: (card_number != 0).then_some(card_number),
        };
        self.inner.write().clients.push(client.clone());
        client
    }

    /// Register a currency
    ///
    /// # Panics
    ///
    /// Panics if `id` is zero.
    pub fn add_currency(&self, id: i64, code: i32, name: &str) -> Currency {
        let currency = Currency {
            id: CurrencyId::new(id).expect("currency id must be non-zero"),
            code,
            name: name.to_string(),
        };
        self.inner.write().currencies.push(currency.clone());
        currency
    }

    /// Make subsequent inserts fail (or succeed again)
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of every stored transaction, by id
    pub fn transactions(&self) -> Vec<Transaction> {
        self.inner.read().transactions.values().cloned().collect()
    }

    /// Number of outbox rows not yet forwarded
    pub fn unsent_outbox(&self) -> usize {
        self.inner.read().outbox.iter().filter(|(_, sent)| !sent).count()
    }

    fn check_insert(&self) -> Result<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(Error::PersistFailure("store rejected the insert".to_string()));
        }
        Ok(())
    }

    fn insert_locked(inner: &mut Inner, transaction: &Transaction) -> Result<Transaction> {
        if inner.transactions.contains_key(&transaction.id) {
            return Err(Error::PersistFailure(format!(
                "duplicate transaction id {}",
                transaction.id
            )));
        }
        if !inner.clients.iter().any(|c| c.id == transaction.client_id) {
            return Err(Error::PersistFailure(format!(
                "unknown client {}",
                transaction.client_id
            )));
        }
        if !inner.currencies.iter().any(|c| c.id == transaction.currency_id) {
            return Err(Error::PersistFailure("unknown currency".to_string()));
        }

        inner
            .transactions
            .insert(transaction.id, transaction.clone());
        Ok(transaction.clone())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn find_client_by_wallet(&self, wallet_number: i64) -> Result<Option<Client>> {
        Ok(self
            .inner
            .read()
            .clients
            .iter()
            .find(|c| c.wallet_number == Some(wallet_number))
            .cloned())
    }

    async fn find_client_by_card(&self, card_number: i64) -> Result<Option<Client>> {
        Ok(self
            .inner
            .read()
            .clients
            .iter()
            .find(|c| c.card_number == Some(card_number))
            .cloned())
    }

    async fn find_currency_by_code(&self, code: i32) -> Result<Option<Currency>> {
        Ok(self
            .inner
            .read()
            .currencies
            .iter()
            .find(|c| c.code == code)
            .cloned())
    }

    async fn reserve_transaction_id(&self) -> Result<TransactionId> {
        let mut inner = self.inner.write();
        inner.next_transaction_id += 1;
        TransactionId::new(inner.next_transaction_id)
    }

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<Transaction> {
        self.check_insert()?;
        let mut inner = self.inner.write();
        Self::insert_locked(&mut inner, transaction)
    }

    async fn insert_transaction_with_outbox(
        &self,
        transaction: &Transaction,
    ) -> Result<Transaction> {
        self.check_insert()?;
        let event = transaction.to_event()?;

        // one write guard covers both rows
        let mut inner = self.inner.write();
        let persisted = Self::insert_locked(&mut inner, transaction)?;

        inner.next_outbox_id += 1;
        let entry = OutboxEntry {
            id: inner.next_outbox_id,
            transaction_id: persisted.id,
            event,
            created_at: persisted.created_at,
        };
        inner.outbox.push((entry, false));

        Ok(persisted)
    }

    async fn sum_amounts(&self, client_id: ClientId, status: TransactionStatus) -> Result<Decimal> {
        self.inner
            .read()
            .transactions
            .values()
            .filter(|t| t.client_id == client_id && t.status == status)
            .try_fold(Decimal::ZERO, |total, t| total.checked_add(t.amount))
            .ok_or_else(|| Error::Storage(format!("Balance overflow for client {}", client_id)))
    }

    async fn promote_pending(&self, created_before: Option<DateTime<Utc>>) -> Result<u64> {
        let now = Utc::now();
        let mut promoted = 0;

        for tx in self.inner.write().transactions.values_mut() {
            let old_enough = created_before.map_or(true, |cutoff| tx.created_at <= cutoff);
            if tx.status.can_transition_to(TransactionStatus::Finalized) && old_enough {
                tx.status = TransactionStatus::Finalized;
                tx.updated_at = now;
                promoted += 1;
            }
        }

        Ok(promoted)
    }

    async fn pending_outbox(&self, limit: i64) -> Result<Vec<OutboxEntry>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .inner
            .read()
            .outbox
            .iter()
            .filter(|(_, sent)| !sent)
            .take(limit)
            .map(|(entry, _)| entry.clone())
            .collect())
    }

    async fn mark_outbox_sent(&self, outbox_id: i64) -> Result<()> {
        let mut inner = self.inner.write();
        match inner.outbox.iter_mut().find(|(entry, _)| entry.id == outbox_id) {
            Some((_, sent)) => {
                *sent = true;
                Ok(())
            }
            None => Err(Error::Storage(format!("Outbox row {} not found", outbox_id))),
        }
    }
}
