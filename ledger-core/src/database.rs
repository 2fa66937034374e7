//! PostgreSQL store

use crate::{
    config::DatabaseConfig,
    store::{LedgerStore, OutboxEntry},
    types::{
        Client, ClientId, Currency, CurrencyId, Transaction, TransactionId, TransactionStatus,
    },
    Error, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use message_bus::OutboundEvent;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use tracing::{debug, info};

/// A row that fails domain validation is a store fault, not bad input
fn corrupt_row(err: Error) -> Error {
    match err {
        Error::Storage(_) => err,
        other => Error::Storage(format!("Corrupt row: {}", other)),
    }
}

const TRANSACTION_COLUMNS: &str =
    "id, client_id, currency_id, amount, status, created_at, updated_at";

#[derive(Debug, FromRow)]
struct ClientRow {
    id: i64,
    wallet_number: Option<i64>,
    card_number: Option<i64>,
}

impl TryFrom<ClientRow> for Client {
    type Error = Error;

    fn try_from(row: ClientRow) -> Result<Self> {
        Ok(Client {
            id: ClientId::new(row.id).map_err(corrupt_row)?,
            wallet_number: row.wallet_number,
            card_number: row.card_number,
        })
    }
}

#[derive(Debug, FromRow)]
struct CurrencyRow {
    id: i64,
    currency_code: i32,
    currency_name: String,
}

impl TryFrom<CurrencyRow> for Currency {
    type Error = Error;

    fn try_from(row: CurrencyRow) -> Result<Self> {
        Ok(Currency {
            id: CurrencyId::new(row.id).map_err(corrupt_row)?,
            code: row.currency_code,
            name: row.currency_name,
        })
    }
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: i64,
    client_id: i64,
    currency_id: i64,
    amount: Decimal,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = Error;

    fn try_from(row: TransactionRow) -> Result<Self> {
        Ok(Transaction {
            id: TransactionId::new(row.id).map_err(corrupt_row)?,
            client_id: ClientId::new(row.client_id).map_err(corrupt_row)?,
            currency_id: CurrencyId::new(row.currency_id).map_err(corrupt_row)?,
            amount: row.amount,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct OutboxRow {
    id: i64,
    transaction_id: i64,
    event_key: String,
    event_value: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<OutboxRow> for OutboxEntry {
    type Error = Error;

    fn try_from(row: OutboxRow) -> Result<Self> {
        Ok(OutboxEntry {
            id: row.id,
            transaction_id: TransactionId::new(row.transaction_id).map_err(corrupt_row)?,
            event: OutboundEvent::new(row.event_key, row.event_value),
            created_at: row.created_at,
        })
    }
}

fn persist_failure(err: sqlx::Error) -> Error {
    Error::PersistFailure(err.to_string())
}

/// Store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect the pool and verify the connection
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;
        info!("Database connection successful");

        Ok(Self { pool })
    }

    /// Apply embedded schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    fn insert_sql() -> String {
        format!(
            "INSERT INTO transactions ({cols}) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {cols}",
            cols = TRANSACTION_COLUMNS
        )
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn find_client_by_wallet(&self, wallet_number: i64) -> Result<Option<Client>> {
        let row = sqlx::query_as::<_, ClientRow>(
            "SELECT id, wallet_number, card_number FROM clients WHERE wallet_number = $1",
        )
        .bind(wallet_number)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Client::try_from).transpose()
    }

    async fn find_client_by_card(&self, card_number: i64) -> Result<Option<Client>> {
        let row = sqlx::query_as::<_, ClientRow>(
            "SELECT id, wallet_number, card_number FROM clients WHERE card_number = $1",
        )
        .bind(card_number)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Client::try_from).transpose()
    }

    async fn find_currency_by_code(&self, code: i32) -> Result<Option<Currency>> {
        let row = sqlx::query_as::<_, CurrencyRow>(
            "SELECT id, currency_code, currency_name FROM currencies WHERE currency_code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Currency::try_from).transpose()
    }

    async fn reserve_transaction_id(&self) -> Result<TransactionId> {
        let id: i64 =
            sqlx::query_scalar("SELECT nextval(pg_get_serial_sequence('transactions', 'id'))")
                .fetch_one(&self.pool)
                .await?;

        TransactionId::new(id)
    }

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&Self::insert_sql())
            .bind(transaction.id.get())
            .bind(transaction.client_id.get())
            .bind(transaction.currency_id.get())
            .bind(transaction.amount)
            .bind(transaction.status.as_str())
            .bind(transaction.created_at)
            .bind(transaction.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(persist_failure)?;

        Transaction::try_from(row)
    }

    async fn insert_transaction_with_outbox(
        &self,
        transaction: &Transaction,
    ) -> Result<Transaction> {
        let mut tx = self.pool.begin().await.map_err(persist_failure)?;

        let row = sqlx::query_as::<_, TransactionRow>(&Self::insert_sql())
            .bind(transaction.id.get())
            .bind(transaction.client_id.get())
            .bind(transaction.currency_id.get())
            .bind(transaction.amount)
            .bind(transaction.status.as_str())
            .bind(transaction.created_at)
            .bind(transaction.updated_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(persist_failure)?;

        let persisted = Transaction::try_from(row)?;
        let event = persisted.to_event()?;

        sqlx::query(
            r#"
            INSERT INTO ledger_outbox (transaction_id, event_key, event_value, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(persisted.id.get())
        .bind(&event.key)
        .bind(&event.value)
        .bind(persisted.created_at)
        .execute(&mut *tx)
        .await
        .map_err(persist_failure)?;

        tx.commit().await.map_err(persist_failure)?;

        Ok(persisted)
    }

    async fn sum_amounts(&self, client_id: ClientId, status: TransactionStatus) -> Result<Decimal> {
        let total: Decimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount), 0)
            FROM transactions
            WHERE client_id = $1 AND status = $2
            "#,
        )
        .bind(client_id.get())
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    async fn promote_pending(&self, created_before: Option<DateTime<Utc>>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $1, updated_at = NOW()
            WHERE status = $2
              AND ($3::timestamptz IS NULL OR created_at <= $3)
            "#,
        )
        .bind(TransactionStatus::Finalized.as_str())
        .bind(TransactionStatus::Pending.as_str())
        .bind(created_before)
        .execute(&self.pool)
        .await?;

        debug!("Promoted {} transactions", result.rows_affected());
        Ok(result.rows_affected())
    }

    async fn pending_outbox(&self, limit: i64) -> Result<Vec<OutboxEntry>> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT id, transaction_id, event_key, event_value, created_at
            FROM ledger_outbox
            WHERE sent_at IS NULL
            ORDER BY id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OutboxEntry::try_from).collect()
    }

    async fn mark_outbox_sent(&self, outbox_id: i64) -> Result<()> {
        sqlx::query("UPDATE ledger_outbox SET sent_at = NOW() WHERE id = $1")
            .bind(outbox_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        info!("Closing database pool");
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_client_row_mapping() {
        let client = Client::try_from(ClientRow {
            id: 3456,
            wallet_number: Some(123456789),
            card_number: None,
        })
        .unwrap();

        assert_eq!(client.id.get(), 3456);
        assert_eq!(client.wallet_number, Some(123456789));
        assert_eq!(client.card_number, None);
    }

    #[test]
    fn test_transaction_row_mapping() {
        let now = Utc::now();
        let tx = Transaction::try_from(TransactionRow {
            id: 1,
            client_id: 3456,
            currency_id: 1,
            amount: dec!(-30),
            status: "FINALIZED".to_string(),
            created_at: now,
            updated_at: now,
        })
        .unwrap();

        assert_eq!(tx.status, TransactionStatus::Finalized);
        assert_eq!(tx.amount, dec!(-30));
    }

    #[test]
    fn test_unknown_status_rejected() {
        let now = Utc::now();
        let result = Transaction::try_from(TransactionRow {
            id: 1,
            client_id: 3456,
            currency_id: 1,
            amount: dec!(1),
            status: "Created".to_string(),
            created_at: now,
            updated_at: now,
        });

        assert!(matches!(result, Err(Error::Storage(_))));
    }

    #[test]
    fn test_zero_id_row_is_storage_error() {
        let result = Client::try_from(ClientRow {
            id: 0,
            wallet_number: Some(123456789),
            card_number: None,
        });
        assert!(matches!(result, Err(Error::Storage(_))));

        let now = Utc::now();
        let result = Transaction::try_from(TransactionRow {
            id: 1,
            client_id: 0,
            currency_id: 1,
            amount: dec!(1),
            status: "PENDING".to_string(),
            created_at: now,
            updated_at: now,
        });
        assert!(matches!(result, Err(Error::Storage(_))));
    }

    #[test]
    fn test_insert_sql_lists_all_columns() {
        let sql = PgStore::insert_sql();
        assert!(sql.starts_with("INSERT INTO transactions (id, client_id"));
        assert!(sql.ends_with("RETURNING id, client_id, currency_id, amount, status, created_at, updated_at"));
    }
}
