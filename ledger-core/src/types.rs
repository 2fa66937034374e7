//! Core types for the ledger
//!
//! Clients and currencies are reference data owned outside the ledger and
//! only ever read here. Transactions are append-only; the single mutation is
//! the Pending → Finalized promotion.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use message_bus::OutboundEvent;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Client identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(i64);

impl ClientId {
    /// Create new client ID (must be non-zero)
    pub fn new(id: i64) -> Result<Self> {
        non_zero("client id", id).map(Self)
    }

    /// Raw value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Currency identifier (row id, not the ISO code)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyId(i64);

impl CurrencyId {
    /// Create new currency ID (must be non-zero)
    pub fn new(id: i64) -> Result<Self> {
        non_zero("currency id", id).map(Self)
    }

    /// Raw value
    pub fn get(&self) -> i64 {
        self.0
    }
}

/// Transaction identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(i64);

impl TransactionId {
    /// Create new transaction ID (must be non-zero)
    pub fn new(id: i64) -> Result<Self> {
        non_zero("transaction id", id).map(Self)
    }

    /// Raw value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn non_zero(what: &str, id: i64) -> Result<i64> {
    if id == 0 {
        return Err(Error::Validation(format!("{} must be non-zero", what)));
    }
    Ok(id)
}

/// Account holder, resolvable by wallet or card number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Client ID
    pub id: ClientId,

    /// Wallet number, if the client has one
    pub wallet_number: Option<i64>,

    /// Card number, if the client has one
    pub card_number: Option<i64>,
}

/// Reference currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    /// Row ID
    pub id: CurrencyId,

    /// ISO 4217 numeric code
    pub code: i32,

    /// Display name
    pub name: String,
}

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Accepted, not yet settled (counts toward the frozen balance)
    Pending,
    /// Settled (counts toward the available balance)
    Finalized,
    /// Reserved; no flow produces it yet
    Failed,
}

impl TransactionStatus {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Finalized => "FINALIZED",
            TransactionStatus::Failed => "FAILED",
        }
    }

    /// Whether moving from `self` to `next` is allowed. Statuses never revert.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (TransactionStatus::Pending, TransactionStatus::Finalized)
                | (TransactionStatus::Pending, TransactionStatus::Failed)
        )
    }
}

impl FromStr for TransactionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(TransactionStatus::Pending),
            "FINALIZED" => Ok(TransactionStatus::Finalized),
            "FAILED" => Ok(TransactionStatus::Failed),
            other => Err(Error::Storage(format!("Unknown transaction status: {}", other))),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Money movement direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Amount is recorded as given
    Credit,
    /// Amount is recorded negated
    Debit,
}

impl Direction {
    /// Signed ledger amount for a requested amount
    pub fn apply(&self, amount: Decimal) -> Decimal {
        match self {
            Direction::Credit => amount,
            Direction::Debit => -amount,
        }
    }

    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Credit => "credit",
            Direction::Debit => "debit",
        }
    }
}

/// Client lookup keys as supplied by a caller. Zero means "not supplied".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Requisites {
    /// Wallet number (checked first)
    pub wallet_number: Option<i64>,

    /// Card number
    pub card_number: Option<i64>,
}

impl Requisites {
    /// Build from raw boundary integers
    pub fn new(wallet_number: i64, card_number: i64) -> Self {
        Self {
            wallet_number: (wallet_number != 0).then_some(wallet_number),
            card_number: (card_number != 0).then_some(card_number),
        }
    }

    /// Lookup by wallet only
    pub fn wallet(wallet_number: i64) -> Self {
        Self::new(wallet_number, 0)
    }

    /// Lookup by card only
    pub fn card(card_number: i64) -> Self {
        Self::new(0, card_number)
    }

    /// Neither key supplied
    pub fn is_empty(&self) -> bool {
        self.wallet_number.is_none() && self.card_number.is_none()
    }
}

/// Ledger transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction ID
    pub id: TransactionId,

    /// Owning client
    pub client_id: ClientId,

    /// Currency the amount is denominated in
    pub currency_id: CurrencyId,

    /// Signed amount (positive = credit, negative = debit)
    pub amount: Decimal,

    /// Current status
    pub status: TransactionStatus,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// New Pending transaction stamped with `now`
    pub fn pending(
        id: TransactionId,
        client_id: ClientId,
        currency_id: CurrencyId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            client_id,
            currency_id,
            amount,
            status: TransactionStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Event mirroring this transaction: keyed by the identifier, valued
    /// with the JSON rendering of the whole record
    pub fn to_event(&self) -> Result<OutboundEvent> {
        OutboundEvent::json(self.id.to_string(), self)
            .map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_zero_ids_rejected() {
        assert!(matches!(ClientId::new(0), Err(Error::Validation(_))));
        assert!(matches!(CurrencyId::new(0), Err(Error::Validation(_))));
        assert!(matches!(TransactionId::new(0), Err(Error::Validation(_))));
        assert_eq!(ClientId::new(3456).unwrap().get(), 3456);
    }

    #[test]
    fn test_requisites_zero_is_absent() {
        let requisites = Requisites::new(123456789, 0);
        assert_eq!(requisites.wallet_number, Some(123456789));
        assert_eq!(requisites.card_number, None);
        assert!(Requisites::new(0, 0).is_empty());
    }

    #[test]
    fn test_direction_signs_amount() {
        assert_eq!(Direction::Credit.apply(dec!(100)), dec!(100));
        assert_eq!(Direction::Debit.apply(dec!(30)), dec!(-30));
        // sign of the request is not second-guessed
        assert_eq!(Direction::Debit.apply(dec!(-5)), dec!(5));
    }

    #[test]
    fn test_status_transitions_are_monotonic() {
        use TransactionStatus::*;
        assert!(Pending.can_transition_to(Finalized));
        assert!(!Finalized.can_transition_to(Pending));
        assert!(!Finalized.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn test_status_storage_names() {
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Finalized,
            TransactionStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<TransactionStatus>().unwrap(), status);
        }
        assert!("Created".parse::<TransactionStatus>().is_err());
    }

    #[test]
    fn test_event_carries_id_key_and_record() {
        let tx = Transaction::pending(
            TransactionId::new(17).unwrap(),
            ClientId::new(3456).unwrap(),
            CurrencyId::new(1).unwrap(),
            dec!(100),
            Utc::now(),
        );

        let event = tx.to_event().unwrap();
        assert_eq!(event.key, "17");

        let value: serde_json::Value = serde_json::from_str(&event.value).unwrap();
        assert_eq!(value["id"], 17);
        assert_eq!(value["client_id"], 3456);
        assert_eq!(value["status"], "PENDING");
        assert_eq!(value["amount"], 100.0);
    }
}
