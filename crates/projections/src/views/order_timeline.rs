//! Order timeline view.
//!
//! Merges the order-level and item-level status history of each order into
//! one chronological feed, the shape an order detail page renders.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AggregateId, ItemId, UserId};
use domain::{Money, OrderEvent, OrderStatus, PaymentMethod, PaymentStatus};
use event_store::EventEnvelope;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;

/// What a timeline entry is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum TimelineScope {
    Order,
    Item { item_id: ItemId, product_name: String },
}

/// One status change shown on the timeline.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub scope: TimelineScope,
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub at: DateTime<Utc>,
}

/// Latest known state of one line item.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineItem {
    pub item_id: ItemId,
    pub product_name: String,
    pub size: String,
    pub quantity: u32,
    pub total: Money,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
}

/// Denormalized order with its merged history.
#[derive(Debug, Clone, Serialize)]
pub struct OrderTimeline {
    pub order_id: AggregateId,
    pub order_number: String,
    pub user_id: UserId,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_reference: Option<String>,
    pub items: Vec<TimelineItem>,
    pub entries: Vec<TimelineEntry>,
    pub placed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderTimeline {
    /// Sum of every line's total, as placed.
    pub fn total_amount(&self) -> Money {
        self.items.iter().map(|i| i.total).sum()
    }

    /// Entries for one item only.
    pub fn item_entries(&self, item_id: ItemId) -> impl Iterator<Item = &TimelineEntry> {
        self.entries.iter().filter(move |e| {
            matches!(&e.scope, TimelineScope::Item { item_id: id, .. } if *id == item_id)
        })
    }

    fn item_mut(&mut self, item_id: ItemId) -> Option<&mut TimelineItem> {
        self.items.iter_mut().find(|i| i.item_id == item_id)
    }

    fn push_item_entry(
        &mut self,
        item_id: ItemId,
        status: OrderStatus,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) {
        let product_name = match self.item_mut(item_id) {
            Some(item) => {
                item.status = status;
                item.product_name.clone()
            }
            None => return,
        };
        self.entries.push(TimelineEntry {
            scope: TimelineScope::Item {
                item_id,
                product_name,
            },
            status,
            notes,
            at,
        });
        self.updated_at = at;
    }

    fn push_order_entry(&mut self, status: OrderStatus, notes: Option<String>, at: DateTime<Utc>) {
        self.status = status;
        self.entries.push(TimelineEntry {
            scope: TimelineScope::Order,
            status,
            notes,
            at,
        });
        self.updated_at = at;
    }

    fn set_item_payment(&mut self, item_id: ItemId, payment_status: PaymentStatus) {
        if let Some(item) = self.item_mut(item_id) {
            item.payment_status = payment_status;
        }
    }
}

#[derive(Debug, Default)]
struct State {
    orders: HashMap<AggregateId, OrderTimeline>,
    by_number: HashMap<String, AggregateId>,
    position: ProjectionPosition,
}

/// Read model holding one [`OrderTimeline`] per order.
#[derive(Debug, Clone)]
pub struct OrderTimelineView {
    state: Arc<RwLock<State>>,
}

impl OrderTimelineView {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
        }
    }

    pub async fn get(&self, order_id: AggregateId) -> Option<OrderTimeline> {
        self.state.read().await.orders.get(&order_id).cloned()
    }

    /// Looks an order up by its human-readable number.
    pub async fn find_by_number(&self, order_number: &str) -> Option<OrderTimeline> {
        let state = self.state.read().await;
        state
            .by_number
            .get(order_number)
            .and_then(|id| state.orders.get(id))
            .cloned()
    }

    /// A customer's orders, newest first.
    pub async fn orders_for_user(&self, user_id: UserId) -> Vec<OrderTimeline> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));
        orders
    }

    pub async fn orders_with_status(&self, status: OrderStatus) -> Vec<OrderTimeline> {
        self.state
            .read()
            .await
            .orders
            .values()
            .filter(|o| o.status == status)
            .cloned()
            .collect()
    }

    fn apply(state: &mut State, order_id: AggregateId, event: OrderEvent) {
        if let OrderEvent::OrderPlaced(data) = &event {
            let items = data
                .items
                .iter()
                .map(|placed| TimelineItem {
                    item_id: placed.item_id,
                    product_name: placed.line.product_name.clone(),
                    size: placed.line.size.clone(),
                    quantity: placed.line.quantity,
                    total: placed.line.total_price(),
                    status: OrderStatus::Pending,
                    payment_status: data.payment_status,
                })
                .collect();
            let timeline = OrderTimeline {
                order_id,
                order_number: data.order_number.clone(),
                user_id: data.user_id,
                payment_method: data.payment_method,
                status: OrderStatus::Pending,
                payment_status: data.payment_status,
                payment_reference: None,
                items,
                entries: vec![TimelineEntry {
                    scope: TimelineScope::Order,
                    status: OrderStatus::Pending,
                    notes: Some("Order placed".to_string()),
                    at: data.placed_at,
                }],
                placed_at: data.placed_at,
                updated_at: data.placed_at,
            };
            state.by_number.insert(data.order_number.clone(), order_id);
            state.orders.insert(order_id, timeline);
            return;
        }

        let Some(timeline) = state.orders.get_mut(&order_id) else {
            tracing::warn!(%order_id, "event for unknown order skipped");
            return;
        };

        match event {
            OrderEvent::OrderPlaced(_) => {}
            OrderEvent::OrderStatusUpdated(data) => {
                if data.payment_collected {
                    timeline.payment_status = PaymentStatus::Completed;
                }
                for item_id in &data.item_ids {
                    if let Some(item) = timeline.item_mut(*item_id) {
                        item.status = data.to;
                        if data.payment_collected {
                            item.payment_status = PaymentStatus::Completed;
                        }
                    }
                }
                timeline.push_order_entry(data.to, data.notes, data.updated_at);
            }
            OrderEvent::ItemStatusUpdated(data) => {
                timeline.set_item_payment(data.item_id, data.payment_status);
                timeline.push_item_entry(data.item_id, data.to, data.notes, data.updated_at);
            }
            OrderEvent::ItemCancelled(data) => {
                timeline.set_item_payment(data.item_id, data.payment_status);
                timeline.push_item_entry(
                    data.item_id,
                    OrderStatus::Cancelled,
                    Some(data.reason),
                    data.cancelled_at,
                );
            }
            OrderEvent::ItemReturnRequested(data) => {
                timeline.push_item_entry(
                    data.item_id,
                    OrderStatus::ProcessingReturn,
                    Some(format!("Return requested: {}", data.reason)),
                    data.requested_at,
                );
            }
            OrderEvent::ItemReturned(data) => {
                timeline.set_item_payment(data.item_id, data.payment_status);
                timeline.push_item_entry(
                    data.item_id,
                    OrderStatus::Returned,
                    Some(data.reason),
                    data.returned_at,
                );
            }
            OrderEvent::ItemReturnRejected(data) => {
                timeline.push_item_entry(
                    data.item_id,
                    OrderStatus::Delivered,
                    Some(format!("Return rejected: {}", data.reason)),
                    data.rejected_at,
                );
            }
            OrderEvent::OrderStatusDerived(data) => {
                timeline.push_order_entry(data.to, data.notes, data.derived_at);
            }
            OrderEvent::PaymentStatusChanged(data) => {
                timeline.payment_status = data.to;
                timeline.updated_at = data.changed_at;
            }
            OrderEvent::PaymentRecorded(data) => {
                timeline.payment_status = data.status;
                for item in &mut timeline.items {
                    item.payment_status = data.status;
                }
                timeline.payment_reference = data.reference;
                timeline.updated_at = data.recorded_at;
            }
        }
    }
}

impl Default for OrderTimelineView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Projection for OrderTimelineView {
    fn name(&self) -> &'static str {
        "OrderTimelineView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().await;

        if event.aggregate_type == "Order" {
            let order_event: OrderEvent = event.decode()?;
            Self::apply(&mut state, event.aggregate_id, order_event);
        }

        state.position = state.position.advance();
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.orders.clear();
        state.by_number.clear();
        state.position = ProjectionPosition::zero();
        Ok(())
    }
}

impl ReadModel for OrderTimelineView {
    fn name(&self) -> &'static str {
        "OrderTimelineView"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.orders.len()).unwrap_or(0)
    }
}
