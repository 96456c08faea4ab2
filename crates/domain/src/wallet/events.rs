//! Wallet domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::DomainEvent;
use crate::value_objects::Money;

/// Events that can occur on a wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WalletEvent {
    WalletCredited(WalletEntryData),
    WalletDebited(WalletEntryData),
}

impl DomainEvent for WalletEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WalletEvent::WalletCredited(_) => "WalletCredited",
            WalletEvent::WalletDebited(_) => "WalletDebited",
        }
    }
}

/// One ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletEntryData {
    pub entry_id: Uuid,
    pub user_id: UserId,
    pub amount: Money,
    pub description: String,
    pub order_id: Option<AggregateId>,
    pub return_id: Option<AggregateId>,

    /// Balance immediately after this entry.
    pub balance_after: Money,

    pub recorded_at: DateTime<Utc>,
}

impl WalletEntryData {
    pub fn new(
        user_id: UserId,
        amount: Money,
        description: impl Into<String>,
        order_id: Option<AggregateId>,
        return_id: Option<AggregateId>,
        balance_after: Money,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            user_id,
            amount,
            description: description.into(),
            order_id,
            return_id,
            balance_after,
            recorded_at: Utc::now(),
        }
    }
}
