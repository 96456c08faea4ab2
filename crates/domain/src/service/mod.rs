//! Services that run lifecycle operations against an event store.
//!
//! Every operation loads the aggregates it needs, stages all resulting
//! events in one [`UnitOfWork`](crate::unit_of_work::UnitOfWork) and commits
//! once, retrying from a fresh load when a concurrent writer got there first.

mod inventory;
mod lifecycle;
mod returns;
mod wallet;

pub use inventory::InventoryService;
pub use lifecycle::OrderLifecycleService;
pub use wallet::WalletService;

use std::collections::BTreeMap;

use common::{AggregateId, ProductId, UserId};
use event_store::EventStore;

use crate::error::DomainError;
use crate::inventory::{ProductStock, StockChangeReason};
use crate::order::{Order, OrderEvent};
use crate::status::OrderStatus;
use crate::unit_of_work::UnitOfWork;
use crate::value_objects::Money;
use crate::wallet::Wallet;

/// Result of a lifecycle operation.
#[derive(Debug, Clone)]
pub struct LifecycleOutcome {
    /// The order as committed.
    pub order: Order,

    /// Human-readable summary for the caller to show.
    pub message: String,

    /// Number of items the operation changed.
    pub affected_items: usize,

    /// Return requests created or resolved by the operation.
    pub return_ids: Vec<AggregateId>,

    /// Amount credited to the customer's wallet.
    pub refunded: Money,
}

impl LifecycleOutcome {
    fn new(order: Order, message: impl Into<String>, affected_items: usize) -> Self {
        Self {
            order,
            message: message.into(),
            affected_items,
            return_ids: Vec::new(),
            refunded: Money::zero(),
        }
    }

    fn with_returns(mut self, return_ids: Vec<AggregateId>) -> Self {
        self.return_ids = return_ids;
        self
    }

    fn with_refund(mut self, refunded: Money) -> Self {
        self.refunded = refunded;
        self
    }
}

/// Units of one size variant moving in or out of stock.
#[derive(Debug, Clone)]
struct StockMove {
    product_id: ProductId,
    size: String,
    quantity: u32,
}

/// Stages stock changes, loading each product stream once.
///
/// `reason` of `None` deducts sold units; anything else puts units back.
async fn stage_stock<S: EventStore + ?Sized>(
    uow: &mut UnitOfWork<'_, S>,
    order_id: AggregateId,
    moves: Vec<StockMove>,
    reason: Option<StockChangeReason>,
) -> Result<(), DomainError> {
    let mut by_product: BTreeMap<ProductId, Vec<StockMove>> = BTreeMap::new();
    for m in moves {
        by_product.entry(m.product_id).or_default().push(m);
    }

    for (product_id, moves) in by_product {
        let mut stock: ProductStock = uow.load(product_id.into()).await?;
        for m in moves {
            let events = match reason {
                None => stock.deduct(product_id, &m.size, m.quantity, order_id)?,
                Some(reason) => {
                    stock.restore(product_id, &m.size, m.quantity, reason, Some(order_id))?
                }
            };
            uow.record(&mut stock, product_id.into(), events)?;
        }
    }
    Ok(())
}

/// Stages one wallet credit. Zero amounts stage nothing.
async fn stage_credit<S: EventStore + ?Sized>(
    uow: &mut UnitOfWork<'_, S>,
    user_id: UserId,
    amount: Money,
    description: &str,
    order_id: Option<AggregateId>,
    return_id: Option<AggregateId>,
) -> Result<(), DomainError> {
    if amount.is_zero() {
        return Ok(());
    }
    let mut wallet: Wallet = uow.load(user_id.into()).await?;
    let events = wallet.credit(user_id, amount, description, order_id, return_id)?;
    uow.record(&mut wallet, user_id.into(), events)?;
    Ok(())
}

/// Stages order events and the stock and wallet effects of any item
/// cancellations among them.
///
/// Cancelled units go back on the shelf and money already collected for
/// them is credited to the customer's wallet as one entry. Returns the amount
/// credited.
async fn stage_order_change<S: EventStore + ?Sized>(
    uow: &mut UnitOfWork<'_, S>,
    order: &mut Order,
    order_id: AggregateId,
    events: Vec<OrderEvent>,
) -> Result<Money, DomainError> {
    let cancellations: Vec<OrderEvent> = events
        .iter()
        .filter(|e| matches!(e, OrderEvent::ItemCancelled(_)))
        .cloned()
        .collect();
    let refund = order.refund_due(&cancellations);
    let restock: Vec<StockMove> = cancellations
        .iter()
        .filter_map(|e| match e {
            OrderEvent::ItemCancelled(data) => order.item(data.item_id),
            _ => None,
        })
        .map(|item| StockMove {
            product_id: item.product_id,
            size: item.size.clone(),
            quantity: item.quantity,
        })
        .collect();

    uow.record(order, order_id, events)?;

    if !restock.is_empty() {
        stage_stock(uow, order_id, restock, Some(StockChangeReason::Cancelled)).await?;
    }
    if let Some(user_id) = order.user_id() {
        let description = format!("Refund for cancelled items in order {}", order.order_number());
        stage_credit(uow, user_id, refund, &description, Some(order_id), None).await?;
    }
    Ok(refund)
}

/// Counts a committed move of the order's overall status.
fn note_transition(before: OrderStatus, order: &Order) {
    if before != order.status() {
        metrics::counter!("order_status_transitions_total", "to" => order.status().as_str())
            .increment(1);
    }
}

/// Counts committed wallet entries.
fn note_wallet_entry(kind: &'static str, amount: Money) {
    if amount.is_positive() {
        metrics::counter!("wallet_entries_total", "kind" => kind).increment(1);
    }
}
