//! Order domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, ItemId, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::status::{OrderStatus, PaymentMethod, PaymentStatus};
use crate::value_objects::OrderLine;

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was placed with its initial items.
    OrderPlaced(OrderPlacedData),

    /// Order and its live items were moved together to a new status.
    OrderStatusUpdated(OrderStatusUpdatedData),

    /// One item moved to a new status.
    ItemStatusUpdated(ItemStatusUpdatedData),

    /// One item was cancelled.
    ItemCancelled(ItemCancelledData),

    /// A return request was opened for one item.
    ItemReturnRequested(ItemReturnRequestedData),

    /// One item was returned.
    ItemReturned(ItemReturnedData),

    /// A return request was rejected and the item handed back.
    ItemReturnRejected(ItemReturnRejectedData),

    /// The order status was re-derived from its items.
    OrderStatusDerived(OrderStatusDerivedData),

    /// The order-level payment status changed.
    PaymentStatusChanged(PaymentStatusChangedData),

    /// A payment gateway reported the outcome of a charge.
    PaymentRecorded(PaymentRecordedData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::OrderStatusUpdated(_) => "OrderStatusUpdated",
            OrderEvent::ItemStatusUpdated(_) => "ItemStatusUpdated",
            OrderEvent::ItemCancelled(_) => "ItemCancelled",
            OrderEvent::ItemReturnRequested(_) => "ItemReturnRequested",
            OrderEvent::ItemReturned(_) => "ItemReturned",
            OrderEvent::ItemReturnRejected(_) => "ItemReturnRejected",
            OrderEvent::OrderStatusDerived(_) => "OrderStatusDerived",
            OrderEvent::PaymentStatusChanged(_) => "PaymentStatusChanged",
            OrderEvent::PaymentRecorded(_) => "PaymentRecorded",
        }
    }
}

/// An item as it was placed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacedItem {
    pub item_id: ItemId,
    #[serde(flatten)]
    pub line: OrderLine,
}

/// Data for OrderPlaced event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: AggregateId,

    /// Human-readable order number shown to customers.
    pub order_number: String,

    pub user_id: UserId,
    pub payment_method: PaymentMethod,

    /// Initial payment status of the order and every item.
    pub payment_status: PaymentStatus,

    pub items: Vec<PlacedItem>,
    pub placed_at: DateTime<Utc>,
}

/// Data for OrderStatusUpdated event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusUpdatedData {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub notes: Option<String>,
    pub actor: String,

    /// Items moved along with the order. Cancelled and returned items are left out.
    pub item_ids: Vec<ItemId>,

    /// Set when delivery of a cash-on-delivery order collects the payment.
    pub payment_collected: bool,

    pub updated_at: DateTime<Utc>,
}

/// Data for ItemStatusUpdated event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemStatusUpdatedData {
    pub item_id: ItemId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub notes: Option<String>,
    pub actor: String,

    /// Item payment status after the change.
    pub payment_status: PaymentStatus,

    pub updated_at: DateTime<Utc>,
}

/// Data for ItemCancelled event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemCancelledData {
    pub item_id: ItemId,
    pub reason: String,
    pub actor: String,

    /// Item payment status after cancellation.
    pub payment_status: PaymentStatus,

    pub cancelled_at: DateTime<Utc>,
}

/// Data for ItemReturnRequested event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemReturnRequestedData {
    pub item_id: ItemId,
    pub return_id: AggregateId,
    pub reason: String,
    pub requested_at: DateTime<Utc>,
}

/// Data for ItemReturned event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemReturnedData {
    pub item_id: ItemId,

    /// The approved return request, when the return went through review.
    pub return_id: Option<AggregateId>,

    pub reason: String,
    pub actor: String,

    /// Item payment status after the return.
    pub payment_status: PaymentStatus,

    pub returned_at: DateTime<Utc>,
}

/// Data for ItemReturnRejected event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemReturnRejectedData {
    pub item_id: ItemId,
    pub return_id: AggregateId,
    pub reason: String,
    pub rejected_at: DateTime<Utc>,
}

/// Data for OrderStatusDerived event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusDerivedData {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub notes: Option<String>,
    pub derived_at: DateTime<Utc>,
}

/// Data for PaymentStatusChanged event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentStatusChangedData {
    pub from: PaymentStatus,
    pub to: PaymentStatus,
    pub changed_at: DateTime<Utc>,
}

/// Data for PaymentRecorded event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecordedData {
    /// `Completed` or `Failed`.
    pub status: PaymentStatus,

    /// Gateway transaction reference.
    pub reference: Option<String>,

    pub recorded_at: DateTime<Utc>,
}

// Convenience constructors for events
impl OrderEvent {
    pub fn order_placed(
        order_id: AggregateId,
        order_number: impl Into<String>,
        user_id: UserId,
        payment_method: PaymentMethod,
        payment_status: PaymentStatus,
        items: Vec<PlacedItem>,
    ) -> Self {
        OrderEvent::OrderPlaced(OrderPlacedData {
            order_id,
            order_number: order_number.into(),
            user_id,
            payment_method,
            payment_status,
            items,
            placed_at: Utc::now(),
        })
    }

    pub fn order_status_updated(
        from: OrderStatus,
        to: OrderStatus,
        notes: Option<String>,
        actor: impl Into<String>,
        item_ids: Vec<ItemId>,
        payment_collected: bool,
    ) -> Self {
        OrderEvent::OrderStatusUpdated(OrderStatusUpdatedData {
            from,
            to,
            notes,
            actor: actor.into(),
            item_ids,
            payment_collected,
            updated_at: Utc::now(),
        })
    }

    pub fn item_status_updated(
        item_id: ItemId,
        from: OrderStatus,
        to: OrderStatus,
        notes: Option<String>,
        actor: impl Into<String>,
        payment_status: PaymentStatus,
    ) -> Self {
        OrderEvent::ItemStatusUpdated(ItemStatusUpdatedData {
            item_id,
            from,
            to,
            notes,
            actor: actor.into(),
            payment_status,
            updated_at: Utc::now(),
        })
    }

    pub fn item_cancelled(
        item_id: ItemId,
        reason: impl Into<String>,
        actor: impl Into<String>,
        payment_status: PaymentStatus,
    ) -> Self {
        OrderEvent::ItemCancelled(ItemCancelledData {
            item_id,
            reason: reason.into(),
            actor: actor.into(),
            payment_status,
            cancelled_at: Utc::now(),
        })
    }

    pub fn item_return_requested(
        item_id: ItemId,
        return_id: AggregateId,
        reason: impl Into<String>,
    ) -> Self {
        OrderEvent::ItemReturnRequested(ItemReturnRequestedData {
            item_id,
            return_id,
            reason: reason.into(),
            requested_at: Utc::now(),
        })
    }

    pub fn item_returned(
        item_id: ItemId,
        return_id: Option<AggregateId>,
        reason: impl Into<String>,
        actor: impl Into<String>,
        payment_status: PaymentStatus,
    ) -> Self {
        OrderEvent::ItemReturned(ItemReturnedData {
            item_id,
            return_id,
            reason: reason.into(),
            actor: actor.into(),
            payment_status,
            returned_at: Utc::now(),
        })
    }

    pub fn item_return_rejected(
        item_id: ItemId,
        return_id: AggregateId,
        reason: impl Into<String>,
    ) -> Self {
        OrderEvent::ItemReturnRejected(ItemReturnRejectedData {
            item_id,
            return_id,
            reason: reason.into(),
            rejected_at: Utc::now(),
        })
    }

    pub fn order_status_derived(from: OrderStatus, to: OrderStatus, notes: Option<String>) -> Self {
        OrderEvent::OrderStatusDerived(OrderStatusDerivedData {
            from,
            to,
            notes,
            derived_at: Utc::now(),
        })
    }

    pub fn payment_status_changed(from: PaymentStatus, to: PaymentStatus) -> Self {
        OrderEvent::PaymentStatusChanged(PaymentStatusChangedData {
            from,
            to,
            changed_at: Utc::now(),
        })
    }

    pub fn payment_recorded(status: PaymentStatus, reference: Option<String>) -> Self {
        OrderEvent::PaymentRecorded(PaymentRecordedData {
            status,
            reference,
            recorded_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::Money;
    use common::ProductId;

    #[test]
    fn test_event_types() {
        let item = ItemId::new();
        let ret = AggregateId::new();
        let cases = [
            (
                OrderEvent::item_cancelled(item, "changed mind", "user", PaymentStatus::Pending),
                "ItemCancelled",
            ),
            (OrderEvent::item_return_requested(item, ret, "Wrong size"), "ItemReturnRequested"),
            (OrderEvent::item_return_rejected(item, ret, "worn"), "ItemReturnRejected"),
            (
                OrderEvent::order_status_derived(OrderStatus::Pending, OrderStatus::Shipped, None),
                "OrderStatusDerived",
            ),
            (
                OrderEvent::payment_recorded(PaymentStatus::Completed, None),
                "PaymentRecorded",
            ),
        ];
        for (event, expected) in cases {
            assert_eq!(event.event_type(), expected);
        }
    }

    #[test]
    fn test_order_placed_serialization() {
        let order_id = AggregateId::new();
        let line = OrderLine::new(ProductId::new(), "Tee", "L", 2, Money::from_cents(1500));
        let event = OrderEvent::order_placed(
            order_id,
            "ORD-0000CAFE",
            UserId::new(),
            PaymentMethod::Upi,
            PaymentStatus::Pending,
            vec![PlacedItem {
                item_id: ItemId::new(),
                line: line.clone(),
            }],
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "OrderPlaced");
        assert_eq!(json["data"]["payment_method"], "upi");
        assert_eq!(json["data"]["items"][0]["size"], "L");

        let OrderEvent::OrderPlaced(data) = serde_json::from_value(json).unwrap() else {
            panic!("Expected OrderPlaced event");
        };
        assert_eq!(data.order_id, order_id);
        assert_eq!(data.items[0].line, line);
    }
}
