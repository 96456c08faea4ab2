//! Line items embedded in an order.

use chrono::{DateTime, Utc};
use common::{AggregateId, ItemId, ProductId};
use serde::{Deserialize, Serialize};

use crate::status::{OrderStatus, PaymentStatus};
use crate::value_objects::{Money, OrderLine};

/// One audit log row. Rows are only ever appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl StatusHistoryEntry {
    pub fn new(status: OrderStatus, notes: Option<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            status,
            notes,
            updated_at,
        }
    }
}

/// A product-variant line within an order, with its own fulfillment and
/// payment state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: ItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub size: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub cancellation_reason: Option<String>,
    pub cancellation_date: Option<DateTime<Utc>>,
    pub return_reason: Option<String>,
    pub return_request_date: Option<DateTime<Utc>>,
    /// The return request currently holding this item, if any.
    pub active_return: Option<AggregateId>,
    pub status_history: Vec<StatusHistoryEntry>,
}

impl OrderItem {
    pub(crate) fn placed(
        id: ItemId,
        line: OrderLine,
        payment_status: PaymentStatus,
        placed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            product_id: line.product_id,
            product_name: line.product_name,
            size: line.size,
            quantity: line.quantity,
            unit_price: line.unit_price,
            status: OrderStatus::Pending,
            payment_status,
            cancellation_reason: None,
            cancellation_date: None,
            return_reason: None,
            return_request_date: None,
            active_return: None,
            status_history: vec![StatusHistoryEntry::new(
                OrderStatus::Pending,
                Some("Order placed".to_string()),
                placed_at,
            )],
        }
    }

    /// Returns quantity times unit price.
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }

    /// Returns true while the item may still be cancelled.
    pub fn can_cancel(&self) -> bool {
        self.status.is_cancellable()
    }

    /// Returns true once the item is delivered and not yet under return.
    pub fn can_return(&self) -> bool {
        self.status == OrderStatus::Delivered && self.active_return.is_none()
    }

    pub(crate) fn set_status(
        &mut self,
        status: OrderStatus,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.status = status;
        self.status_history
            .push(StatusHistoryEntry::new(status, notes, at));
    }
}
