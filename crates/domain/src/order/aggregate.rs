//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AggregateId, ItemId, UserId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::aggregation::{aggregate_order_status, aggregate_payment_status};
use crate::status::{OrderStatus, PaymentMethod, PaymentStatus};
use crate::value_objects::{Money, OrderLine};

use super::{
    OrderError, OrderEvent, OrderItem, PlacedItem, StatusHistoryEntry,
    events::{
        ItemCancelledData, ItemReturnRequestedData, ItemReturnedData, ItemStatusUpdatedData,
        OrderPlacedData, OrderStatusUpdatedData,
    },
};

/// Payment status of an item or order after cancellation.
///
/// Collected money is refunded. Otherwise cash-on-delivery falls back to
/// `Pending` since nothing was taken, and other methods are unchanged.
pub fn cancelled_payment_status(method: PaymentMethod, current: PaymentStatus) -> PaymentStatus {
    match current {
        PaymentStatus::Completed => PaymentStatus::Refunded,
        _ if method.is_cod() => PaymentStatus::Pending,
        other => other,
    }
}

/// Payment status of an item after it is returned.
///
/// Cash-on-delivery items are refunded only if the cash was collected.
/// Prepaid methods are always marked refunded.
pub fn returned_payment_status(method: PaymentMethod, current: PaymentStatus) -> PaymentStatus {
    if method.is_cod() && current != PaymentStatus::Completed {
        PaymentStatus::Pending
    } else {
        PaymentStatus::Refunded
    }
}

/// Order aggregate root.
///
/// Owns its items. The order status is derived from the item statuses after
/// every item-level change; the derivation is recorded as its own event so
/// the audit log shows when the overall status moved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    order_number: String,
    user_id: Option<UserId>,
    payment_method: PaymentMethod,
    payment_status: PaymentStatus,
    status: OrderStatus,

    /// Items in placement order.
    items: Vec<OrderItem>,

    status_history: Vec<StatusHistoryEntry>,
    total_amount: Money,
    placed_at: Option<DateTime<Utc>>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrderEvent::OrderPlaced(data) => self.apply_order_placed(data),
            OrderEvent::OrderStatusUpdated(data) => self.apply_order_status_updated(data),
            OrderEvent::ItemStatusUpdated(data) => self.apply_item_status_updated(data),
            OrderEvent::ItemCancelled(data) => self.apply_item_cancelled(data),
            OrderEvent::ItemReturnRequested(data) => self.apply_item_return_requested(data),
            OrderEvent::ItemReturned(data) => self.apply_item_returned(data),
            OrderEvent::ItemReturnRejected(data) => {
                if let Some(item) = self.item_mut(data.item_id) {
                    item.set_status(
                        OrderStatus::Delivered,
                        Some(format!("Return rejected: {}", data.reason)),
                        data.rejected_at,
                    );
                    item.active_return = None;
                }
            }
            OrderEvent::OrderStatusDerived(data) => {
                self.status = data.to;
                self.status_history
                    .push(StatusHistoryEntry::new(data.to, data.notes, data.derived_at));
            }
            OrderEvent::PaymentStatusChanged(data) => {
                self.payment_status = data.to;
            }
            OrderEvent::PaymentRecorded(data) => {
                self.payment_status = data.status;
                for item in &mut self.items {
                    item.payment_status = data.status;
                }
            }
        }
    }
}

// Query methods
impl Order {
    /// Returns the human-readable order number.
    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    /// Returns the items in placement order.
    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn item(&self, item_id: ItemId) -> Option<&OrderItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    /// Returns the order-level audit log.
    pub fn status_history(&self) -> &[StatusHistoryEntry] {
        &self.status_history
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn placed_at(&self) -> Option<DateTime<Utc>> {
        self.placed_at
    }

    pub fn item_statuses(&self) -> Vec<OrderStatus> {
        self.items.iter().map(|item| item.status).collect()
    }

    /// Returns true while the order as a whole may be cancelled.
    pub fn can_cancel_order(&self) -> bool {
        self.status.is_cancellable()
    }

    /// Returns true if the item exists and may be cancelled.
    pub fn can_cancel_item(&self, item_id: ItemId) -> bool {
        self.item(item_id).is_some_and(OrderItem::can_cancel)
    }

    /// Returns true only for delivered orders.
    pub fn can_return_order(&self) -> bool {
        self.status == OrderStatus::Delivered
    }

    /// Returns true if the item exists and is delivered.
    pub fn can_return_item(&self, item_id: ItemId) -> bool {
        self.item(item_id)
            .is_some_and(|item| item.status == OrderStatus::Delivered)
    }

    /// Returns the delivered items with no open return request.
    pub fn returnable_items(&self) -> impl Iterator<Item = &OrderItem> {
        self.items.iter().filter(|item| item.can_return())
    }

    /// Sums the money to hand back for item events that turn a collected
    /// payment into a refund.
    pub fn refund_due(&self, events: &[OrderEvent]) -> Money {
        events
            .iter()
            .filter_map(|event| match event {
                OrderEvent::ItemCancelled(ItemCancelledData {
                    item_id,
                    payment_status,
                    ..
                })
                | OrderEvent::ItemReturned(ItemReturnedData {
                    item_id,
                    payment_status,
                    ..
                }) if *payment_status == PaymentStatus::Refunded => self.item(*item_id),
                _ => None,
            })
            .filter(|item| item.payment_status == PaymentStatus::Completed)
            .map(OrderItem::total_price)
            .sum()
    }

    fn require_placed(&self) -> Result<(), OrderError> {
        if self.exists() {
            Ok(())
        } else {
            Err(OrderError::NotPlaced)
        }
    }

    fn find_item(&self, item_id: ItemId) -> Result<&OrderItem, OrderError> {
        self.require_placed()?;
        self.item(item_id)
            .ok_or(OrderError::ItemNotFound { item_id })
    }

    fn item_mut(&mut self, item_id: ItemId) -> Option<&mut OrderItem> {
        self.items.iter_mut().find(|item| item.id == item_id)
    }
}

// Command methods (return events)
impl Order {
    /// Places a new order. Every item starts `Pending`; wallet orders are
    /// paid up front.
    pub fn place(
        &self,
        order_id: AggregateId,
        order_number: impl Into<String>,
        user_id: UserId,
        payment_method: PaymentMethod,
        lines: &[OrderLine],
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.exists() {
            return Err(OrderError::AlreadyPlaced);
        }
        if lines.is_empty() {
            return Err(OrderError::NoItems);
        }
        for line in lines {
            if line.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    quantity: line.quantity,
                });
            }
            if !line.unit_price.is_positive() {
                return Err(OrderError::InvalidPrice {
                    price: line.unit_price,
                });
            }
        }
        lines
            .iter()
            .try_fold(Money::zero(), |total, line| {
                line.checked_total()
                    .and_then(|line_total| total.checked_add(line_total))
                    .ok_or(line)
            })
            .map_err(|line| OrderError::InvalidPrice {
                price: line.unit_price,
            })?;

        let payment_status = match payment_method {
            PaymentMethod::Wallet => PaymentStatus::Completed,
            _ => PaymentStatus::Pending,
        };
        let items = lines
            .iter()
            .map(|line| PlacedItem {
                item_id: ItemId::new(),
                line: line.clone(),
            })
            .collect();

        Ok(vec![OrderEvent::order_placed(
            order_id,
            order_number,
            user_id,
            payment_method,
            payment_status,
            items,
        )])
    }

    /// Moves the order and every live item to `to` together.
    ///
    /// Validated against the order's own status. Cancelled and returned
    /// items are left where they are. Delivering a cash-on-delivery order
    /// collects its payment.
    ///
    /// `Cancelled` and `Returned` go through [`Order::cancel`] and
    /// [`Order::return_order`], so payment is resolved the same way. A bulk
    /// move into `ProcessingReturn` is refused: returns need a request.
    pub fn update_status(
        &self,
        to: OrderStatus,
        notes: Option<String>,
        actor: &str,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_placed()?;
        if !self.status.can_transition_to(to) {
            return Err(OrderError::invalid_transition(self.status, to));
        }

        let reason = || notes.clone().unwrap_or_else(|| format!("Marked {to}"));
        match to {
            OrderStatus::Cancelled => return self.cancel(&reason(), actor),
            OrderStatus::Returned => return self.return_order(&reason(), actor),
            OrderStatus::ProcessingReturn => return Err(OrderError::ReturnNeedsRequest),
            _ => {}
        }

        let moving: Vec<&OrderItem> = self
            .items
            .iter()
            .filter(|item| !item.status.is_terminal())
            .collect();
        if let Some(item) = moving.iter().find(|item| item.active_return.is_some()) {
            return Err(OrderError::ReturnAlreadyOpen { item_id: item.id });
        }

        let payment_collected = to == OrderStatus::Delivered && self.payment_method.is_cod();
        let events = vec![OrderEvent::order_status_updated(
            self.status,
            to,
            notes,
            actor,
            moving.iter().map(|item| item.id).collect(),
            payment_collected,
        )];
        Ok(self.with_derived(events, None, None))
    }

    /// Moves one item to `to`, validated against the item's own status.
    ///
    /// Cancelling and returning through here resolve payment exactly like
    /// [`Order::cancel_item`] and [`Order::return_item`].
    pub fn update_item_status(
        &self,
        item_id: ItemId,
        to: OrderStatus,
        notes: Option<String>,
        actor: &str,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let item = self.find_item(item_id)?;
        if item.active_return.is_some() {
            return Err(OrderError::ReturnAlreadyOpen { item_id });
        }
        if !item.status.can_transition_to(to) {
            return Err(OrderError::invalid_transition(item.status, to));
        }

        let reason = notes.clone().unwrap_or_else(|| format!("Marked {to}"));
        let event = match to {
            OrderStatus::Cancelled => OrderEvent::item_cancelled(
                item_id,
                reason,
                actor,
                cancelled_payment_status(self.payment_method, item.payment_status),
            ),
            OrderStatus::Returned => OrderEvent::item_returned(
                item_id,
                None,
                reason,
                actor,
                returned_payment_status(self.payment_method, item.payment_status),
            ),
            _ => {
                let payment_status = if to == OrderStatus::Delivered && self.payment_method.is_cod()
                {
                    PaymentStatus::Completed
                } else {
                    item.payment_status
                };
                OrderEvent::item_status_updated(item_id, item.status, to, notes, actor, payment_status)
            }
        };

        Ok(self.with_derived(
            vec![event],
            Some(format!("Item {} moved to {to}", item.product_name)),
            None,
        ))
    }

    /// Cancels every item still in `Pending` or `Processing`.
    ///
    /// Items already shipped or delivered are skipped, so the order may end
    /// up `PartiallyCancelled`.
    pub fn cancel(&self, reason: &str, actor: &str) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_placed()?;
        if !self.can_cancel_order() {
            return Err(OrderError::NotCancellable {
                status: self.status,
            });
        }

        let events: Vec<OrderEvent> = self
            .items
            .iter()
            .filter(|item| item.can_cancel())
            .map(|item| {
                OrderEvent::item_cancelled(
                    item.id,
                    reason,
                    actor,
                    cancelled_payment_status(self.payment_method, item.payment_status),
                )
            })
            .collect();
        if events.is_empty() {
            return Err(OrderError::NoEligibleItems { action: "cancel" });
        }

        let fully_cancelled = self
            .items
            .iter()
            .all(|item| item.can_cancel() || item.status == OrderStatus::Cancelled);
        let order_payment = fully_cancelled
            .then(|| cancelled_payment_status(self.payment_method, self.payment_status));

        Ok(self.with_derived(
            events,
            Some(format!("Order cancelled: {reason}")),
            order_payment,
        ))
    }

    /// Cancels one item.
    pub fn cancel_item(
        &self,
        item_id: ItemId,
        reason: &str,
        actor: &str,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let item = self.find_item(item_id)?;
        if !item.can_cancel() {
            return Err(OrderError::ItemNotCancellable {
                item_id,
                status: item.status,
            });
        }

        let events = vec![OrderEvent::item_cancelled(
            item_id,
            reason,
            actor,
            cancelled_payment_status(self.payment_method, item.payment_status),
        )];
        Ok(self.with_derived(events, Some(format!("Item cancelled: {reason}")), None))
    }

    /// Returns every item of a delivered order at once.
    pub fn return_order(&self, reason: &str, actor: &str) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_placed()?;
        if !self.can_return_order() {
            return Err(OrderError::NotReturnable {
                status: self.status,
            });
        }

        let events: Vec<OrderEvent> = self
            .items
            .iter()
            .filter(|item| item.status == OrderStatus::Delivered)
            .map(|item| self.returned_event(item, None, reason, actor))
            .collect();
        if events.is_empty() {
            return Err(OrderError::NoEligibleItems { action: "return" });
        }
        Ok(self.with_derived(events, Some(format!("Order returned: {reason}")), None))
    }

    /// Returns one delivered item without review.
    pub fn return_item(
        &self,
        item_id: ItemId,
        reason: &str,
        actor: &str,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let item = self.find_item(item_id)?;
        if item.status != OrderStatus::Delivered {
            return Err(OrderError::ItemNotReturnable {
                item_id,
                status: item.status,
            });
        }

        let events = vec![self.returned_event(item, None, reason, actor)];
        Ok(self.with_derived(events, Some(format!("Item returned: {reason}")), None))
    }

    /// Puts items under review, one return request each.
    ///
    /// An item already held by a return request is reported as a duplicate
    /// before its status is considered.
    pub fn request_returns(
        &self,
        requests: &[(ItemId, AggregateId)],
        reason: &str,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_placed()?;
        if requests.is_empty() {
            return Err(OrderError::NoEligibleItems { action: "return" });
        }

        let mut events = Vec::with_capacity(requests.len());
        for &(item_id, return_id) in requests {
            let item = self.find_item(item_id)?;
            if item.active_return.is_some() {
                return Err(OrderError::ReturnAlreadyOpen { item_id });
            }
            if item.status != OrderStatus::Delivered {
                return Err(OrderError::ItemNotReturnable {
                    item_id,
                    status: item.status,
                });
            }
            events.push(OrderEvent::item_return_requested(item_id, return_id, reason));
        }
        Ok(self.with_derived(
            events,
            Some(format!("Return requested: {reason}")),
            None,
        ))
    }

    /// Completes an approved return for an item under review.
    pub fn complete_item_return(
        &self,
        item_id: ItemId,
        return_id: AggregateId,
        reason: &str,
        actor: &str,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let item = self.held_by(item_id, return_id)?;
        if !item.status.can_transition_to(OrderStatus::Returned) {
            return Err(OrderError::invalid_transition(item.status, OrderStatus::Returned));
        }

        let events = vec![self.returned_event(item, Some(return_id), reason, actor)];
        Ok(self.with_derived(events, Some(format!("Return approved: {reason}")), None))
    }

    /// Hands an item under review back to the customer as delivered.
    pub fn reject_item_return(
        &self,
        item_id: ItemId,
        return_id: AggregateId,
        reason: &str,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.held_by(item_id, return_id)?;
        let events = vec![OrderEvent::item_return_rejected(item_id, return_id, reason)];
        Ok(self.with_derived(events, Some(format!("Return rejected: {reason}")), None))
    }

    /// Records a gateway's verdict on a pending prepaid charge.
    pub fn record_payment(
        &self,
        outcome: PaymentStatus,
        reference: Option<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_placed()?;
        if !self.payment_method.is_gateway() {
            return Err(OrderError::NotGatewayPayment {
                method: self.payment_method,
            });
        }
        if self.payment_status != PaymentStatus::Pending {
            return Err(OrderError::PaymentNotPending {
                status: self.payment_status,
            });
        }
        if !matches!(outcome, PaymentStatus::Completed | PaymentStatus::Failed) {
            return Err(OrderError::InvalidPaymentOutcome { status: outcome });
        }

        Ok(vec![OrderEvent::payment_recorded(outcome, reference)])
    }

    fn held_by(&self, item_id: ItemId, return_id: AggregateId) -> Result<&OrderItem, OrderError> {
        let item = self.find_item(item_id)?;
        if item.active_return != Some(return_id) {
            return Err(OrderError::ReturnMismatch { item_id, return_id });
        }
        Ok(item)
    }

    fn returned_event(
        &self,
        item: &OrderItem,
        return_id: Option<AggregateId>,
        reason: &str,
        actor: &str,
    ) -> OrderEvent {
        OrderEvent::item_returned(
            item.id,
            return_id,
            reason,
            actor,
            returned_payment_status(self.payment_method, item.payment_status),
        )
    }

    /// Appends the events that re-derive order and payment status once
    /// `events` are applied. `order_payment` replaces the aggregated payment
    /// status when given.
    fn with_derived(
        &self,
        mut events: Vec<OrderEvent>,
        notes: Option<String>,
        order_payment: Option<PaymentStatus>,
    ) -> Vec<OrderEvent> {
        let mut preview = self.clone();
        preview.apply_events(events.iter().cloned());

        let derived = aggregate_order_status(&preview.item_statuses());
        if derived != preview.status {
            events.push(OrderEvent::order_status_derived(preview.status, derived, notes));
        }

        let payment = order_payment.unwrap_or_else(|| {
            let item_payments: Vec<PaymentStatus> =
                preview.items.iter().map(|item| item.payment_status).collect();
            aggregate_payment_status(&item_payments, preview.payment_status)
        });
        if payment != preview.payment_status {
            events.push(OrderEvent::payment_status_changed(preview.payment_status, payment));
        }

        events
    }
}

// Apply event helpers
impl Order {
    fn apply_order_placed(&mut self, data: OrderPlacedData) {
        self.id = Some(data.order_id);
        self.order_number = data.order_number;
        self.user_id = Some(data.user_id);
        self.payment_method = data.payment_method;
        self.payment_status = data.payment_status;
        self.status = OrderStatus::Pending;
        self.placed_at = Some(data.placed_at);
        self.items = data
            .items
            .into_iter()
            .map(|placed| {
                OrderItem::placed(placed.item_id, placed.line, data.payment_status, data.placed_at)
            })
            .collect();
        self.total_amount = self.items.iter().map(OrderItem::total_price).sum();
        self.status_history.push(StatusHistoryEntry::new(
            OrderStatus::Pending,
            Some("Order placed".to_string()),
            data.placed_at,
        ));
    }

    fn apply_order_status_updated(&mut self, data: OrderStatusUpdatedData) {
        self.status = data.to;
        self.status_history.push(StatusHistoryEntry::new(
            data.to,
            data.notes.clone(),
            data.updated_at,
        ));
        if data.payment_collected {
            self.payment_status = PaymentStatus::Completed;
        }
        for item_id in data.item_ids {
            if let Some(item) = self.item_mut(item_id) {
                item.set_status(data.to, data.notes.clone(), data.updated_at);
                if data.payment_collected {
                    item.payment_status = PaymentStatus::Completed;
                }
            }
        }
    }

    fn apply_item_status_updated(&mut self, data: ItemStatusUpdatedData) {
        if let Some(item) = self.item_mut(data.item_id) {
            if data.to == OrderStatus::ProcessingReturn {
                item.return_reason = data.notes.clone();
                item.return_request_date = Some(data.updated_at);
            }
            item.set_status(data.to, data.notes, data.updated_at);
            item.payment_status = data.payment_status;
        }
    }

    fn apply_item_cancelled(&mut self, data: ItemCancelledData) {
        if let Some(item) = self.item_mut(data.item_id) {
            item.set_status(
                OrderStatus::Cancelled,
                Some(data.reason.clone()),
                data.cancelled_at,
            );
            item.cancellation_reason = Some(data.reason);
            item.cancellation_date = Some(data.cancelled_at);
            item.payment_status = data.payment_status;
        }
    }

    fn apply_item_return_requested(&mut self, data: ItemReturnRequestedData) {
        if let Some(item) = self.item_mut(data.item_id) {
            item.set_status(
                OrderStatus::ProcessingReturn,
                Some(data.reason.clone()),
                data.requested_at,
            );
            item.return_reason = Some(data.reason);
            item.return_request_date = Some(data.requested_at);
            item.active_return = Some(data.return_id);
        }
    }

    fn apply_item_returned(&mut self, data: ItemReturnedData) {
        if let Some(item) = self.item_mut(data.item_id) {
            item.set_status(
                OrderStatus::Returned,
                Some(data.reason.clone()),
                data.returned_at,
            );
            item.return_reason = Some(data.reason);
            item.payment_status = data.payment_status;
            item.active_return = None;
        }
    }
}
