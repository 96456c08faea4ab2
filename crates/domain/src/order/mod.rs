//! Order aggregate and related types.

mod aggregate;
mod events;
mod item;

pub use aggregate::{Order, cancelled_payment_status, returned_payment_status};
pub use events::{
    ItemCancelledData, ItemReturnRejectedData, ItemReturnRequestedData, ItemReturnedData,
    ItemStatusUpdatedData, OrderEvent, OrderPlacedData, OrderStatusDerivedData,
    OrderStatusUpdatedData, PaymentRecordedData, PaymentStatusChangedData, PlacedItem,
};
pub use item::{OrderItem, StatusHistoryEntry};

use common::{AggregateId, ItemId};
use thiserror::Error;

use crate::status::{OrderStatus, PaymentMethod, PaymentStatus, format_status_list};
use crate::value_objects::Money;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Command targets an order that was never placed.
    #[error("Order has not been placed")]
    NotPlaced,

    #[error("Order already placed")]
    AlreadyPlaced,

    #[error("Order has no items")]
    NoItems,

    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    #[error("Invalid price: {price} (must be greater than 0)")]
    InvalidPrice { price: Money },

    #[error("Item not found: {item_id}")]
    ItemNotFound { item_id: ItemId },

    /// Target status is not reachable from the current one.
    #[error(
        "Invalid status transition from {from} to {to}. Valid transitions: {}",
        format_status_list(.valid)
    )]
    InvalidTransition {
        from: OrderStatus,
        to: OrderStatus,
        valid: Vec<OrderStatus>,
    },

    #[error("Order cannot be cancelled in {status} status")]
    NotCancellable { status: OrderStatus },

    #[error("Item {item_id} cannot be cancelled in {status} status")]
    ItemNotCancellable { item_id: ItemId, status: OrderStatus },

    #[error("Only delivered orders can be returned (current status: {status})")]
    NotReturnable { status: OrderStatus },

    #[error("Only delivered items can be returned (item {item_id} is {status})")]
    ItemNotReturnable { item_id: ItemId, status: OrderStatus },

    /// Nothing in the order qualifies for the requested action.
    #[error("No items eligible to {action}")]
    NoEligibleItems { action: &'static str },

    #[error("Returns must be requested item by item and reviewed")]
    ReturnNeedsRequest,

    #[error("A return request is already open for item {item_id}")]
    ReturnAlreadyOpen { item_id: ItemId },

    /// The item is not held by the given return request.
    #[error("Item {item_id} is not under return request {return_id}")]
    ReturnMismatch {
        item_id: ItemId,
        return_id: AggregateId,
    },

    #[error("Payment for {method} orders is not settled by a gateway")]
    NotGatewayPayment { method: PaymentMethod },

    #[error("Payment already settled (status: {status})")]
    PaymentNotPending { status: PaymentStatus },

    /// A payment outcome must be either collected or failed.
    #[error("Invalid payment outcome: {status}")]
    InvalidPaymentOutcome { status: PaymentStatus },
}

impl OrderError {
    pub(crate) fn invalid_transition(from: OrderStatus, to: OrderStatus) -> Self {
        OrderError::InvalidTransition {
            from,
            to,
            valid: from.valid_transitions().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_lists_valid_targets() {
        let err = OrderError::invalid_transition(OrderStatus::Shipped, OrderStatus::Cancelled);
        assert_eq!(
            err.to_string(),
            "Invalid status transition from Shipped to Cancelled. Valid transitions: Delivered"
        );

        let err = OrderError::invalid_transition(OrderStatus::Returned, OrderStatus::Pending);
        assert_eq!(
            err.to_string(),
            "Invalid status transition from Returned to Pending. Valid transitions: none (terminal status)"
        );
    }
}
