//! Return request domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, ItemId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::value_objects::Money;

use super::ReturnReason;

/// Events that can occur on a return request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ReturnEvent {
    ReturnRequested(ReturnRequestedData),
    ReturnApproved(ReturnApprovedData),
    ReturnRejected(ReturnRejectedData),
    ReturnCompleted(ReturnCompletedData),
}

impl DomainEvent for ReturnEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReturnEvent::ReturnRequested(_) => "ReturnRequested",
            ReturnEvent::ReturnApproved(_) => "ReturnApproved",
            ReturnEvent::ReturnRejected(_) => "ReturnRejected",
            ReturnEvent::ReturnCompleted(_) => "ReturnCompleted",
        }
    }
}

/// Data for ReturnRequested event.
///
/// Carries a copy of the item's product coordinates so approval can restock
/// without trusting later order state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnRequestedData {
    pub return_id: AggregateId,
    pub order_id: AggregateId,
    pub order_number: String,
    pub item_id: ItemId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub size: String,
    pub quantity: u32,

    /// What the customer paid for the item.
    pub item_total: Money,

    pub reason: ReturnReason,
    pub requested_at: DateTime<Utc>,
}

/// Data for ReturnApproved event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnApprovedData {
    pub approved_by: String,
    pub refund_amount: Money,
    pub approved_at: DateTime<Utc>,
}

/// Data for ReturnRejected event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnRejectedData {
    pub rejected_by: String,
    pub reason: String,
    pub rejected_at: DateTime<Utc>,
}

/// Data for ReturnCompleted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnCompletedData {
    pub completed_at: DateTime<Utc>,
}

impl ReturnEvent {
    pub fn approved(approved_by: impl Into<String>, refund_amount: Money) -> Self {
        ReturnEvent::ReturnApproved(ReturnApprovedData {
            approved_by: approved_by.into(),
            refund_amount,
            approved_at: Utc::now(),
        })
    }

    pub fn rejected(rejected_by: impl Into<String>, reason: impl Into<String>) -> Self {
        ReturnEvent::ReturnRejected(ReturnRejectedData {
            rejected_by: rejected_by.into(),
            reason: reason.into(),
            rejected_at: Utc::now(),
        })
    }

    pub fn completed() -> Self {
        ReturnEvent::ReturnCompleted(ReturnCompletedData {
            completed_at: Utc::now(),
        })
    }
}
