//! Ledger facade exposed to the request boundary

use crate::{
    repository::LedgerRepository,
    types::{Requisites, Transaction},
    Result,
};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Pass-through to the repository's four public operations
#[derive(Debug, Clone)]
pub struct LedgerService {
    repository: Arc<LedgerRepository>,
}

impl LedgerService {
    /// Wrap a repository
    pub fn new(repository: Arc<LedgerRepository>) -> Self {
        Self { repository }
    }

    /// Credit the client
    pub async fn credit(
        &self,
        currency_code: i32,
        amount: Decimal,
        requisites: Requisites,
    ) -> Result<Transaction> {
        self.repository.credit(currency_code, amount, requisites).await
    }

    /// Debit the client
    pub async fn debit(
        &self,
        currency_code: i32,
        amount: Decimal,
        requisites: Requisites,
    ) -> Result<Transaction> {
        self.repository.debit(currency_code, amount, requisites).await
    }

    /// Finalized balance
    pub async fn available_balance(&self, requisites: Requisites) -> Result<Decimal> {
        self.repository.finalized_balance(requisites).await
    }

    /// Pending balance
    pub async fn frozen_balance(&self, requisites: Requisites) -> Result<Decimal> {
        self.repository.frozen_balance(requisites).await
    }
}
