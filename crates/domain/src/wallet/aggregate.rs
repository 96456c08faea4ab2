//! Wallet aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use event_store::Version;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::value_objects::Money;

use super::{WalletEntryData, WalletError, WalletEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Credit,
    Debit,
}

/// Settlement state of a ledger entry. Only completed entries count
/// towards the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

/// A row of the wallet ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub amount: Money,
    pub description: String,
    pub order_id: Option<AggregateId>,
    pub return_id: Option<AggregateId>,
    pub balance_after: Money,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

/// Per-user wallet. The stream is keyed by the user's id and starts with the
/// first credit or debit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Wallet {
    user_id: Option<UserId>,

    #[serde(default)]
    version: Version,

    balance: Money,
    transactions: Vec<WalletTransaction>,
}

impl Aggregate for Wallet {
    type Event = WalletEvent;
    type Error = WalletError;

    fn aggregate_type() -> &'static str {
        "Wallet"
    }

    fn id(&self) -> Option<AggregateId> {
        self.user_id.map(AggregateId::from)
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        let (kind, data) = match event {
            WalletEvent::WalletCredited(data) => (TransactionKind::Credit, data),
            WalletEvent::WalletDebited(data) => (TransactionKind::Debit, data),
        };

        self.user_id = Some(data.user_id);
        match kind {
            TransactionKind::Credit => self.balance += data.amount,
            TransactionKind::Debit => self.balance -= data.amount,
        }
        self.transactions.push(WalletTransaction {
            id: data.entry_id,
            kind,
            amount: data.amount,
            description: data.description,
            order_id: data.order_id,
            return_id: data.return_id,
            balance_after: data.balance_after,
            status: TransactionStatus::Completed,
            created_at: data.recorded_at,
        });
    }
}

impl Wallet {
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    /// Returns the ledger, oldest entry first.
    pub fn transactions(&self) -> &[WalletTransaction] {
        &self.transactions
    }

    /// Adds money to the wallet.
    pub fn credit(
        &self,
        user_id: UserId,
        amount: Money,
        description: &str,
        order_id: Option<AggregateId>,
        return_id: Option<AggregateId>,
    ) -> Result<Vec<WalletEvent>, WalletError> {
        if !amount.is_positive() {
            return Err(WalletError::InvalidAmount { amount });
        }

        Ok(vec![WalletEvent::WalletCredited(WalletEntryData::new(
            user_id,
            amount,
            description,
            order_id,
            return_id,
            self.balance + amount,
        ))])
    }

    /// Takes money from the wallet. Never overdraws.
    pub fn debit(
        &self,
        user_id: UserId,
        amount: Money,
        description: &str,
        order_id: Option<AggregateId>,
    ) -> Result<Vec<WalletEvent>, WalletError> {
        if !amount.is_positive() {
            return Err(WalletError::InvalidAmount { amount });
        }
        if amount > self.balance {
            return Err(WalletError::InsufficientBalance {
                required: amount,
                available: self.balance,
            });
        }

        Ok(vec![WalletEvent::WalletDebited(WalletEntryData::new(
            user_id,
            amount,
            description,
            order_id,
            None,
            self.balance - amount,
        ))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded(user: UserId, cents: i64) -> Wallet {
        let mut wallet = Wallet::default();
        wallet.apply_events(
            wallet
                .credit(user, Money::from_cents(cents), "Top up", None, None)
                .unwrap(),
        );
        wallet
    }

    #[test]
    fn test_first_credit_opens_wallet() {
        let user = UserId::new();
        let wallet = funded(user, 5000);
        assert_eq!(wallet.id(), Some(AggregateId::from(user)));
        assert_eq!(wallet.balance(), Money::from_cents(5000));
        assert_eq!(wallet.transactions()[0].balance_after, Money::from_cents(5000));
        assert_eq!(wallet.transactions()[0].status, TransactionStatus::Completed);
    }

    #[test]
    fn test_overdraft_rejected() {
        let user = UserId::new();
        let wallet = funded(user, 1000);
        let result = wallet.debit(user, Money::from_cents(1001), "Checkout", None);
        let Err(WalletError::InsufficientBalance { required, available }) = result else {
            panic!("expected InsufficientBalance");
        };
        assert_eq!(required, Money::from_cents(1001));
        assert_eq!(available, Money::from_cents(1000));
        assert_eq!(wallet.balance(), Money::from_cents(1000));
    }

    #[test]
    fn test_credit_then_debit_round_trips() {
        let user = UserId::new();
        let mut wallet = funded(user, 700);
        let amount = Money::from_cents(250);

        wallet.apply_events(wallet.credit(user, amount, "Refund", None, None).unwrap());
        wallet.apply_events(wallet.debit(user, amount, "Checkout", None).unwrap());

        assert_eq!(wallet.balance(), Money::from_cents(700));
        let last = wallet.transactions().last().unwrap();
        assert_eq!(last.kind, TransactionKind::Debit);
        assert_eq!(last.balance_after, Money::from_cents(700));
    }

    #[test]
    fn test_balance_matches_ledger() {
        let user = UserId::new();
        let mut wallet = Wallet::default();
        let steps = [(true, 400), (true, 300), (false, 500), (false, 900), (true, 50)];
        for (is_credit, cents) in steps {
            let amount = Money::from_cents(cents);
            let result = if is_credit {
                wallet.credit(user, amount, "credit", None, None)
            } else {
                wallet.debit(user, amount, "debit", None)
            };
            if let Ok(events) = result {
                wallet.apply_events(events);
            }
            assert!(!wallet.balance().is_negative());
        }

        let replayed: Money = wallet
            .transactions()
            .iter()
            .map(|t| match t.kind {
                TransactionKind::Credit => t.amount,
                TransactionKind::Debit => Money::zero() - t.amount,
            })
            .sum();
        assert_eq!(replayed, wallet.balance());
        assert_eq!(wallet.balance(), Money::from_cents(250));
    }

    #[test]
    fn test_non_positive_amounts_rejected() {
        let wallet = Wallet::default();
        assert!(matches!(
            wallet.credit(UserId::new(), Money::zero(), "x", None, None),
            Err(WalletError::InvalidAmount { .. })
        ));
        assert!(matches!(
            wallet.debit(UserId::new(), Money::from_cents(-5), "x", None),
            Err(WalletError::InvalidAmount { .. })
        ));
    }
}
