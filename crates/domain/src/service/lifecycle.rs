//! Order placement, status updates, cancellation and immediate returns.

use common::{AggregateId, ItemId, UserId};
use event_store::EventStore;

use crate::config::LifecycleConfig;
use crate::error::DomainError;
use crate::order::{Order, OrderEvent};
use crate::status::{OrderStatus, PaymentMethod, PaymentStatus};
use crate::unit_of_work::{UnitOfWork, retry_on_conflict};
use crate::value_objects::OrderLine;
use crate::wallet::Wallet;

use super::{
    LifecycleOutcome, StockMove, note_transition, note_wallet_entry, stage_order_change, stage_stock,
};

/// Runs the order lifecycle: every operation that changes an order, its
/// return requests and the stock and wallet entries they drag along.
pub struct OrderLifecycleService<S: EventStore> {
    pub(super) store: S,
    pub(super) config: LifecycleConfig,
}

impl<S: EventStore> OrderLifecycleService<S> {
    /// Creates a service with default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, LifecycleConfig::default())
    }

    pub fn with_config(store: S, config: LifecycleConfig) -> Self {
        Self { store, config }
    }

    /// Returns the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Loads an order by ID.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: AggregateId) -> Result<Order, DomainError> {
        UnitOfWork::new(&self.store).load_existing(order_id).await
    }

    /// Places an order, taking its units out of stock and, for wallet
    /// payment, charging the wallet in the same commit.
    #[tracing::instrument(skip(self, lines), fields(items = lines.len()))]
    pub async fn place_order(
        &self,
        user_id: UserId,
        payment_method: PaymentMethod,
        lines: Vec<OrderLine>,
    ) -> Result<LifecycleOutcome, DomainError> {
        let order_id = AggregateId::new();
        let order_number = self.order_number(order_id);

        let outcome = retry_on_conflict("place_order", self.config.max_commit_attempts, || {
            self.try_place_order(order_id, &order_number, user_id, payment_method, &lines)
        })
        .await?;

        if payment_method == PaymentMethod::Wallet {
            note_wallet_entry("debit", outcome.order.total_amount());
        }
        metrics::counter!("order_status_transitions_total", "to" => OrderStatus::Pending.as_str())
            .increment(1);
        tracing::info!(%order_id, %order_number, %payment_method, "order placed");
        Ok(outcome)
    }

    /// Records a payment gateway's verdict on a pending charge.
    #[tracing::instrument(skip(self))]
    pub async fn record_payment(
        &self,
        order_id: AggregateId,
        outcome: PaymentStatus,
        reference: Option<String>,
    ) -> Result<LifecycleOutcome, DomainError> {
        let result = retry_on_conflict("record_payment", self.config.max_commit_attempts, || {
            self.try_record_payment(order_id, outcome, reference.clone())
        })
        .await?;

        tracing::info!(%order_id, payment_status = %outcome, "payment recorded");
        Ok(result)
    }

    /// Moves the whole order forward, carrying every live item with it.
    #[tracing::instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        order_id: AggregateId,
        status: OrderStatus,
        notes: Option<String>,
        actor: &str,
    ) -> Result<LifecycleOutcome, DomainError> {
        let outcome = retry_on_conflict("update_order_status", self.config.max_commit_attempts, || {
            self.try_update_order_status(order_id, status, notes.clone(), actor)
        })
        .await?;

        if status == OrderStatus::Cancelled {
            metrics::counter!("order_cancellations_total").increment(1);
        }
        note_wallet_entry("credit", outcome.refunded);
        tracing::info!(%order_id, %status, items = outcome.affected_items, "order status updated");
        Ok(outcome)
    }

    /// Moves a single item. Cancelling an item this way has the same stock
    /// and refund effects as [`cancel_item`](Self::cancel_item).
    #[tracing::instrument(skip(self))]
    pub async fn update_item_status(
        &self,
        order_id: AggregateId,
        item_id: ItemId,
        status: OrderStatus,
        notes: Option<String>,
        actor: &str,
    ) -> Result<LifecycleOutcome, DomainError> {
        let outcome = retry_on_conflict("update_item_status", self.config.max_commit_attempts, || {
            self.try_update_item_status(order_id, item_id, status, notes.clone(), actor)
        })
        .await?;

        if status == OrderStatus::Cancelled {
            metrics::counter!("order_cancellations_total").increment(1);
        }
        note_wallet_entry("credit", outcome.refunded);
        tracing::info!(%order_id, %item_id, %status, "item status updated");
        Ok(outcome)
    }

    /// Cancels every item that has not shipped yet.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: AggregateId,
        reason: &str,
        actor: &str,
    ) -> Result<LifecycleOutcome, DomainError> {
        let outcome = retry_on_conflict("cancel_order", self.config.max_commit_attempts, || {
            self.try_cancel(order_id, None, reason, actor)
        })
        .await?;

        metrics::counter!("order_cancellations_total").increment(outcome.affected_items as u64);
        note_wallet_entry("credit", outcome.refunded);
        tracing::info!(
            %order_id,
            items = outcome.affected_items,
            refunded = %outcome.refunded,
            "order cancelled"
        );
        Ok(outcome)
    }

    /// Cancels one item that has not shipped yet.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_item(
        &self,
        order_id: AggregateId,
        item_id: ItemId,
        reason: &str,
        actor: &str,
    ) -> Result<LifecycleOutcome, DomainError> {
        let outcome = retry_on_conflict("cancel_item", self.config.max_commit_attempts, || {
            self.try_cancel(order_id, Some(item_id), reason, actor)
        })
        .await?;

        metrics::counter!("order_cancellations_total").increment(1);
        note_wallet_entry("credit", outcome.refunded);
        tracing::info!(%order_id, %item_id, refunded = %outcome.refunded, "item cancelled");
        Ok(outcome)
    }

    /// Returns every delivered item at once, without review.
    #[tracing::instrument(skip(self))]
    pub async fn return_order(
        &self,
        order_id: AggregateId,
        reason: &str,
        actor: &str,
    ) -> Result<LifecycleOutcome, DomainError> {
        let outcome = retry_on_conflict("return_order", self.config.max_commit_attempts, || {
            self.try_return(order_id, None, reason, actor)
        })
        .await?;

        tracing::info!(%order_id, items = outcome.affected_items, "order returned");
        Ok(outcome)
    }

    /// Returns one delivered item, without review.
    #[tracing::instrument(skip(self))]
    pub async fn return_item(
        &self,
        order_id: AggregateId,
        item_id: ItemId,
        reason: &str,
        actor: &str,
    ) -> Result<LifecycleOutcome, DomainError> {
        let outcome = retry_on_conflict("return_item", self.config.max_commit_attempts, || {
            self.try_return(order_id, Some(item_id), reason, actor)
        })
        .await?;

        tracing::info!(%order_id, %item_id, "item returned");
        Ok(outcome)
    }

    fn order_number(&self, order_id: AggregateId) -> String {
        format!(
            "{}-{:08X}",
            self.config.order_number_prefix,
            order_id.as_uuid().as_u128() as u32
        )
    }

    async fn try_place_order(
        &self,
        order_id: AggregateId,
        order_number: &str,
        user_id: UserId,
        payment_method: PaymentMethod,
        lines: &[OrderLine],
    ) -> Result<LifecycleOutcome, DomainError> {
        let mut uow = UnitOfWork::new(&self.store);

        let mut order = Order::default();
        let events = order.place(order_id, order_number, user_id, payment_method, lines)?;
        uow.record(&mut order, order_id, events)?;

        let sold = lines
            .iter()
            .map(|line| StockMove {
                product_id: line.product_id,
                size: line.size.clone(),
                quantity: line.quantity,
            })
            .collect();
        stage_stock(&mut uow, order_id, sold, None).await?;

        if payment_method == PaymentMethod::Wallet {
            let mut wallet: Wallet = uow.load(user_id.into()).await?;
            let description = format!("Payment for order {order_number}");
            let events =
                wallet.debit(user_id, order.total_amount(), &description, Some(order_id))?;
            uow.record(&mut wallet, user_id.into(), events)?;
        }

        uow.commit().await?;
        Ok(LifecycleOutcome::new(
            order,
            format!("Order {order_number} placed"),
            lines.len(),
        ))
    }

    async fn try_record_payment(
        &self,
        order_id: AggregateId,
        outcome: PaymentStatus,
        reference: Option<String>,
    ) -> Result<LifecycleOutcome, DomainError> {
        let mut uow = UnitOfWork::new(&self.store);
        let mut order: Order = uow.load_existing(order_id).await?;

        let events = order.record_payment(outcome, reference)?;
        uow.record(&mut order, order_id, events)?;
        uow.commit().await?;

        let affected = order.items().len();
        Ok(LifecycleOutcome::new(
            order,
            format!("Payment marked {outcome}"),
            affected,
        ))
    }

    async fn try_update_order_status(
        &self,
        order_id: AggregateId,
        status: OrderStatus,
        notes: Option<String>,
        actor: &str,
    ) -> Result<LifecycleOutcome, DomainError> {
        let mut uow = UnitOfWork::new(&self.store);
        let mut order: Order = uow.load_existing(order_id).await?;
        let before = order.status();

        let events = order.update_status(status, notes, actor)?;
        let moved = events
            .iter()
            .map(|event| match event {
                OrderEvent::OrderStatusUpdated(data) => data.item_ids.len(),
                OrderEvent::ItemCancelled(_) | OrderEvent::ItemReturned(_) => 1,
                _ => 0,
            })
            .sum();
        let refunded = stage_order_change(&mut uow, &mut order, order_id, events).await?;
        uow.commit().await?;

        note_transition(before, &order);
        Ok(LifecycleOutcome::new(
            order,
            format!("Order status updated to {status}"),
            moved,
        )
        .with_refund(refunded))
    }

    async fn try_update_item_status(
        &self,
        order_id: AggregateId,
        item_id: ItemId,
        status: OrderStatus,
        notes: Option<String>,
        actor: &str,
    ) -> Result<LifecycleOutcome, DomainError> {
        let mut uow = UnitOfWork::new(&self.store);
        let mut order: Order = uow.load_existing(order_id).await?;
        let before = order.status();

        let events = order.update_item_status(item_id, status, notes, actor)?;
        let refunded = stage_order_change(&mut uow, &mut order, order_id, events).await?;
        uow.commit().await?;

        note_transition(before, &order);
        Ok(LifecycleOutcome::new(order, format!("Item status updated to {status}"), 1)
            .with_refund(refunded))
    }

    async fn try_cancel(
        &self,
        order_id: AggregateId,
        item_id: Option<ItemId>,
        reason: &str,
        actor: &str,
    ) -> Result<LifecycleOutcome, DomainError> {
        let mut uow = UnitOfWork::new(&self.store);
        let mut order: Order = uow.load_existing(order_id).await?;
        let before = order.status();

        let events = match item_id {
            Some(item_id) => order.cancel_item(item_id, reason, actor)?,
            None => order.cancel(reason, actor)?,
        };
        let cancelled = count(&events, |e| matches!(e, OrderEvent::ItemCancelled(_)));
        let refunded = stage_order_change(&mut uow, &mut order, order_id, events).await?;
        uow.commit().await?;

        note_transition(before, &order);
        let message = match item_id {
            Some(_) => "Item cancelled successfully".to_string(),
            None => format!("Order cancelled, {cancelled} item(s) affected"),
        };
        Ok(LifecycleOutcome::new(order, message, cancelled).with_refund(refunded))
    }

    async fn try_return(
        &self,
        order_id: AggregateId,
        item_id: Option<ItemId>,
        reason: &str,
        actor: &str,
    ) -> Result<LifecycleOutcome, DomainError> {
        let mut uow = UnitOfWork::new(&self.store);
        let mut order: Order = uow.load_existing(order_id).await?;
        let before = order.status();

        let events = match item_id {
            Some(item_id) => order.return_item(item_id, reason, actor)?,
            None => order.return_order(reason, actor)?,
        };
        let returned = count(&events, |e| matches!(e, OrderEvent::ItemReturned(_)));
        uow.record(&mut order, order_id, events)?;
        uow.commit().await?;

        note_transition(before, &order);
        let message = match item_id {
            Some(_) => "Item returned successfully".to_string(),
            None => format!("Order returned, {returned} item(s) affected"),
        };
        Ok(LifecycleOutcome::new(order, message, returned))
    }
}

fn count(events: &[OrderEvent], pred: impl Fn(&OrderEvent) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}
