//! Wallet ledger operations.

use common::{AggregateId, UserId};
use event_store::EventStore;

use crate::config::LifecycleConfig;
use crate::error::DomainError;
use crate::unit_of_work::{UnitOfWork, retry_on_conflict};
use crate::value_objects::Money;
use crate::wallet::Wallet;

use super::note_wallet_entry;

/// Credits and debits customer wallets.
///
/// A wallet springs into existence with its first entry. Debits are checked
/// against the balance at the version they were computed from, so two
/// concurrent debits can never overdraw it.
pub struct WalletService<S: EventStore> {
    store: S,
    max_commit_attempts: u32,
}

impl<S: EventStore> WalletService<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, &LifecycleConfig::default())
    }

    pub fn with_config(store: S, config: &LifecycleConfig) -> Self {
        Self {
            store,
            max_commit_attempts: config.max_commit_attempts,
        }
    }

    /// Returns the user's wallet. Users without entries get an empty one.
    #[tracing::instrument(skip(self))]
    pub async fn get_wallet(&self, user_id: UserId) -> Result<Wallet, DomainError> {
        UnitOfWork::new(&self.store).load(user_id.into()).await
    }

    pub async fn balance(&self, user_id: UserId) -> Result<Money, DomainError> {
        Ok(self.get_wallet(user_id).await?.balance())
    }

    /// Adds money to a wallet.
    #[tracing::instrument(skip(self))]
    pub async fn add_credit(
        &self,
        user_id: UserId,
        amount: Money,
        description: &str,
        order_id: Option<AggregateId>,
        return_id: Option<AggregateId>,
    ) -> Result<Wallet, DomainError> {
        let wallet = retry_on_conflict("add_credit", self.max_commit_attempts, || async move {
            let mut uow = UnitOfWork::new(&self.store);
            let mut wallet: Wallet = uow.load(user_id.into()).await?;
            let events = wallet.credit(user_id, amount, description, order_id, return_id)?;
            uow.record(&mut wallet, user_id.into(), events)?;
            uow.commit().await?;
            Ok::<_, DomainError>(wallet)
        })
        .await?;

        note_wallet_entry("credit", amount);
        tracing::info!(%user_id, %amount, balance = %wallet.balance(), "wallet credited");
        Ok(wallet)
    }

    /// Takes money from a wallet, failing with `InsufficientBalance` rather
    /// than overdrawing.
    #[tracing::instrument(skip(self))]
    pub async fn debit_amount(
        &self,
        user_id: UserId,
        amount: Money,
        description: &str,
        order_id: Option<AggregateId>,
    ) -> Result<Wallet, DomainError> {
        let wallet = retry_on_conflict("debit_amount", self.max_commit_attempts, || async move {
            let mut uow = UnitOfWork::new(&self.store);
            let mut wallet: Wallet = uow.load(user_id.into()).await?;
            let events = wallet.debit(user_id, amount, description, order_id)?;
            uow.record(&mut wallet, user_id.into(), events)?;
            uow.commit().await?;
            Ok::<_, DomainError>(wallet)
        })
        .await?;

        note_wallet_entry("debit", amount);
        tracing::info!(%user_id, %amount, balance = %wallet.balance(), "wallet debited");
        Ok(wallet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::wallet::{TransactionKind, WalletError};
    use event_store::InMemoryEventStore;

    #[tokio::test]
    async fn test_wallet_is_created_lazily() {
        let service = WalletService::new(InMemoryEventStore::new());
        let user = UserId::new();
        assert_eq!(service.balance(user).await.unwrap(), Money::zero());

        let wallet = service
            .add_credit(user, Money::from_cents(1200), "Welcome bonus", None, None)
            .await
            .unwrap();
        assert_eq!(wallet.balance(), Money::from_cents(1200));
        assert_eq!(wallet.transactions()[0].kind, TransactionKind::Credit);
    }

    #[tokio::test]
    async fn test_failed_debit_leaves_balance() {
        let store = InMemoryEventStore::new();
        let service = WalletService::new(store.clone());
        let user = UserId::new();
        service
            .add_credit(user, Money::from_cents(500), "Top up", None, None)
            .await
            .unwrap();

        let err = service
            .debit_amount(user, Money::from_cents(501), "Checkout", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
        assert!(matches!(
            err,
            DomainError::Wallet(WalletError::InsufficientBalance { .. })
        ));
        assert_eq!(service.balance(user).await.unwrap(), Money::from_cents(500));
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_debits_never_overdraw() {
        let store = InMemoryEventStore::new();
        let service = WalletService::new(store);
        let user = UserId::new();
        service
            .add_credit(user, Money::from_cents(1000), "Top up", None, None)
            .await
            .unwrap();

        let amount = Money::from_cents(600);
        let (a, b) = tokio::join!(
            service.debit_amount(user, amount, "first", None),
            service.debit_amount(user, amount, "second", None),
        );

        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        assert_eq!(service.balance(user).await.unwrap(), Money::from_cents(400));
    }
}
