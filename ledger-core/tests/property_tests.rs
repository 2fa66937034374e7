//! Property-based tests for balance invariants
//!
//! - Frozen balance equals the sum of the client's Pending amounts
//! - Available balance equals the sum of the client's Finalized amounts
//! - A second promotion sweep changes nothing
//! - No transaction leaves Finalized

use ledger_core::{
    LedgerRepository, MemoryStore, RepositoryOptions, Requisites, TransactionId,
    TransactionStatus,
};
use message_bus::InMemoryChannel;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;

const WALLETS: [i64; 4] = [123456789, 234567890, 345678901, 456789012];

#[derive(Debug, Clone)]
enum Op {
    Credit { client: usize, cents: i64 },
    Debit { client: usize, cents: i64 },
    Promote,
}

/// Strategy for generating amounts in cents
fn cents_strategy() -> impl Strategy<Value = i64> {
    1i64..1_000_000_00i64
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..WALLETS.len(), cents_strategy()).prop_map(|(client, cents)| Op::Credit { client, cents }),
        3 => (0..WALLETS.len(), cents_strategy()).prop_map(|(client, cents)| Op::Debit { client, cents }),
        1 => Just(Op::Promote),
    ]
}

fn repository() -> (Arc<MemoryStore>, LedgerRepository) {
    let store = Arc::new(MemoryStore::seeded());
    let repository = LedgerRepository::new(
        store.clone(),
        Arc::new(InMemoryChannel::new()),
        RepositoryOptions::default(),
    );
    (store, repository)
}

fn expected_sum(store: &MemoryStore, wallet: i64, status: TransactionStatus) -> Decimal {
    store
        .transactions()
        .iter()
        .filter(|t| owner_wallet(t.client_id.get()) == Some(wallet) && t.status == status)
        .map(|t| t.amount)
        .sum()
}

fn owner_wallet(client_id: i64) -> Option<i64> {
    ledger_core::memory::DEMO_CLIENTS
        .iter()
        .find(|(id, _, _)| *id == client_id)
        .map(|(_, wallet, _)| *wallet)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Balances always match the stored rows
    #[test]
    fn prop_balances_match_rows(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (store, repository) = repository();
            let mut finalized: HashSet<TransactionId> = HashSet::new();

            for op in ops {
                match op {
                    Op::Credit { client, cents } => {
                        repository
                            .credit(643, Decimal::new(cents, 2), Requisites::wallet(WALLETS[client]))
                            .await
                            .unwrap();
                    }
                    Op::Debit { client, cents } => {
                        repository
                            .debit(643, Decimal::new(cents, 2), Requisites::wallet(WALLETS[client]))
                            .await
                            .unwrap();
                    }
                    Op::Promote => {
                        repository.promote_pending().await.unwrap();
                    }
                }

                for tx in store.transactions() {
                    if finalized.contains(&tx.id) {
                        prop_assert_eq!(tx.status, TransactionStatus::Finalized);
                    }
                    if tx.status == TransactionStatus::Finalized {
                        finalized.insert(tx.id);
                    }
                }
            }

            for wallet in WALLETS {
                let requisites = Requisites::wallet(wallet);
                prop_assert_eq!(
                    repository.frozen_balance(requisites).await.unwrap(),
                    expected_sum(&store, wallet, TransactionStatus::Pending)
                );
                prop_assert_eq!(
                    repository.finalized_balance(requisites).await.unwrap(),
                    expected_sum(&store, wallet, TransactionStatus::Finalized)
                );
            }

            Ok(())
        })?;
    }

    /// Promoting twice equals promoting once
    #[test]
    fn prop_promotion_idempotent(amounts in prop::collection::vec(cents_strategy(), 0..20)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (_store, repository) = repository();
            let requisites = Requisites::wallet(WALLETS[0]);
            let total: Decimal = amounts.iter().map(|c| Decimal::new(*c, 2)).sum();

            for cents in &amounts {
                repository
                    .credit(643, Decimal::new(*cents, 2), requisites)
                    .await
                    .unwrap();
            }

            let promoted = repository.promote_pending().await.unwrap();
            prop_assert_eq!(promoted as usize, amounts.len());
            let after_first = repository.finalized_balance(requisites).await.unwrap();

            prop_assert_eq!(repository.promote_pending().await.unwrap(), 0);
            prop_assert_eq!(repository.finalized_balance(requisites).await.unwrap(), after_first);
            prop_assert_eq!(after_first, total);
            prop_assert_eq!(repository.frozen_balance(requisites).await.unwrap(), Decimal::ZERO);

            Ok(())
        })?;
    }
}
