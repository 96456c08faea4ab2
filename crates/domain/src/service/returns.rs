//! Return requests: items go under review and an admin approves or rejects.

use common::{AggregateId, ItemId, UserId};
use event_store::EventStore;

use crate::aggregate::Aggregate;
use crate::error::DomainError;
use crate::inventory::StockChangeReason;
use crate::order::{Order, OrderItem};
use crate::returns::{ReturnError, ReturnReason, ReturnReasonCode, ReturnRequest};
use crate::status::OrderStatus;
use crate::unit_of_work::{UnitOfWork, retry_on_conflict};
use crate::value_objects::Money;

use super::{
    LifecycleOutcome, OrderLifecycleService, StockMove, note_transition, note_wallet_entry,
    stage_credit, stage_stock,
};

impl<S: EventStore> OrderLifecycleService<S> {
    /// Loads a return request by ID.
    #[tracing::instrument(skip(self))]
    pub async fn get_return_request(
        &self,
        return_id: AggregateId,
    ) -> Result<ReturnRequest, DomainError> {
        UnitOfWork::new(&self.store).load_existing(return_id).await
    }

    /// Puts one delivered item under review.
    ///
    /// Customers pick a reason from the closed code set.
    #[tracing::instrument(skip(self))]
    pub async fn request_item_return(
        &self,
        order_id: AggregateId,
        item_id: ItemId,
        reason: ReturnReasonCode,
        user_id: UserId,
    ) -> Result<LifecycleOutcome, DomainError> {
        let reason = ReturnReason::from(reason);
        let outcome = retry_on_conflict("request_item_return", self.config.max_commit_attempts, || {
            self.try_request_returns(order_id, Some(item_id), &reason, user_id)
        })
        .await?;

        metrics::counter!("return_requests_total", "outcome" => "requested").increment(1);
        tracing::info!(%order_id, %item_id, %reason, "return requested");
        Ok(outcome)
    }

    /// Puts every delivered item of the order under review, one request per
    /// item.
    #[tracing::instrument(skip(self))]
    pub async fn request_order_return(
        &self,
        order_id: AggregateId,
        reason: ReturnReasonCode,
        user_id: UserId,
    ) -> Result<LifecycleOutcome, DomainError> {
        let reason = ReturnReason::from(reason);
        let outcome = retry_on_conflict("request_order_return", self.config.max_commit_attempts, || {
            self.try_request_returns(order_id, None, &reason, user_id)
        })
        .await?;

        metrics::counter!("return_requests_total", "outcome" => "requested")
            .increment(outcome.return_ids.len() as u64);
        tracing::info!(%order_id, requests = outcome.return_ids.len(), %reason, "order return requested");
        Ok(outcome)
    }

    /// Approves one pending request.
    ///
    /// The item is returned, its units restocked and the refund credited to
    /// the customer's wallet in one commit. Without `custom_refund` the
    /// refund is the item total.
    #[tracing::instrument(skip(self))]
    pub async fn approve_item_return(
        &self,
        return_id: AggregateId,
        approved_by: &str,
        custom_refund: Option<Money>,
    ) -> Result<LifecycleOutcome, DomainError> {
        let outcome = retry_on_conflict("approve_item_return", self.config.max_commit_attempts, || {
            self.try_approve(Target::Request(return_id), approved_by, custom_refund)
        })
        .await?;

        metrics::counter!("return_requests_total", "outcome" => "approved").increment(1);
        note_wallet_entry("credit", outcome.refunded);
        tracing::info!(%return_id, refunded = %outcome.refunded, "return approved");
        Ok(outcome)
    }

    /// Approves every pending request of the order together, crediting the
    /// summed refund as a single wallet entry.
    #[tracing::instrument(skip(self))]
    pub async fn approve_order_return(
        &self,
        order_id: AggregateId,
        approved_by: &str,
    ) -> Result<LifecycleOutcome, DomainError> {
        let outcome = retry_on_conflict("approve_order_return", self.config.max_commit_attempts, || {
            self.try_approve(Target::Order(order_id), approved_by, None)
        })
        .await?;

        metrics::counter!("return_requests_total", "outcome" => "approved")
            .increment(outcome.return_ids.len() as u64);
        note_wallet_entry("credit", outcome.refunded);
        tracing::info!(
            %order_id,
            requests = outcome.return_ids.len(),
            refunded = %outcome.refunded,
            "order return approved"
        );
        Ok(outcome)
    }

    /// Rejects one pending request; the item goes back to `Delivered`.
    #[tracing::instrument(skip(self))]
    pub async fn reject_item_return(
        &self,
        return_id: AggregateId,
        rejected_by: &str,
        reason: &str,
    ) -> Result<LifecycleOutcome, DomainError> {
        let outcome = retry_on_conflict("reject_item_return", self.config.max_commit_attempts, || {
            self.try_reject(Target::Request(return_id), rejected_by, reason)
        })
        .await?;

        metrics::counter!("return_requests_total", "outcome" => "rejected").increment(1);
        tracing::info!(%return_id, "return rejected");
        Ok(outcome)
    }

    /// Rejects every pending request of the order.
    #[tracing::instrument(skip(self))]
    pub async fn reject_order_return(
        &self,
        order_id: AggregateId,
        rejected_by: &str,
        reason: &str,
    ) -> Result<LifecycleOutcome, DomainError> {
        let outcome = retry_on_conflict("reject_order_return", self.config.max_commit_attempts, || {
            self.try_reject(Target::Order(order_id), rejected_by, reason)
        })
        .await?;

        metrics::counter!("return_requests_total", "outcome" => "rejected")
            .increment(outcome.return_ids.len() as u64);
        tracing::info!(%order_id, requests = outcome.return_ids.len(), "order return rejected");
        Ok(outcome)
    }

    /// Marks the goods of an approved request as received back.
    #[tracing::instrument(skip(self))]
    pub async fn complete_return(
        &self,
        return_id: AggregateId,
    ) -> Result<ReturnRequest, DomainError> {
        let request = retry_on_conflict("complete_return", self.config.max_commit_attempts, || {
            self.try_complete_return(return_id)
        })
        .await?;

        metrics::counter!("return_requests_total", "outcome" => "completed").increment(1);
        tracing::info!(%return_id, "return completed");
        Ok(request)
    }

    async fn try_request_returns(
        &self,
        order_id: AggregateId,
        item_id: Option<ItemId>,
        reason: &ReturnReason,
        user_id: UserId,
    ) -> Result<LifecycleOutcome, DomainError> {
        let mut uow = UnitOfWork::new(&self.store);
        let mut order: Order = uow.load_existing(order_id).await?;
        if order.user_id() != Some(user_id) {
            return Err(DomainError::not_found(Order::aggregate_type(), order_id));
        }
        let before = order.status();

        let requests: Vec<(ItemId, AggregateId)> = match item_id {
            Some(item_id) => vec![(item_id, AggregateId::new())],
            None => order
                .items()
                .iter()
                .filter(|item| item.status == OrderStatus::Delivered)
                .map(|item| (item.id, AggregateId::new()))
                .collect(),
        };
        let events = order.request_returns(&requests, reason.as_str())?;
        let items: Vec<OrderItem> = requests
            .iter()
            .filter_map(|&(item_id, _)| order.item(item_id).cloned())
            .collect();
        uow.record(&mut order, order_id, events)?;

        for (&(_, return_id), item) in requests.iter().zip(&items) {
            let mut request = ReturnRequest::default();
            let events = request.request(
                return_id,
                order_id,
                order.order_number(),
                user_id,
                item,
                reason.clone(),
            )?;
            uow.record(&mut request, return_id, events)?;
        }
        uow.commit().await?;

        note_transition(before, &order);
        let return_ids: Vec<AggregateId> = requests.into_iter().map(|(_, id)| id).collect();
        let message = format!("Return requested for {} item(s)", return_ids.len());
        Ok(LifecycleOutcome::new(order, message, return_ids.len()).with_returns(return_ids))
    }

    async fn try_approve(
        &self,
        target: Target,
        approved_by: &str,
        custom_refund: Option<Money>,
    ) -> Result<LifecycleOutcome, DomainError> {
        let mut uow = UnitOfWork::new(&self.store);
        let (order_id, mut order, mut requests) = pending_requests(&uow, target).await?;
        let before = order.status();

        let mut refunded = Money::zero();
        let mut restock = Vec::with_capacity(requests.len());
        for (return_id, request) in &mut requests {
            let item_id = request_item(request, *return_id)?;
            let reason = request.reason().map(ToString::to_string).unwrap_or_default();

            let events = order.complete_item_return(item_id, *return_id, &reason, approved_by)?;
            let refund = match custom_refund {
                Some(amount) => request.validate_refund(amount)?,
                None => request.item_total(),
            };
            let approval = request.approve(approved_by, refund)?;

            if let Some(product_id) = request.product_id() {
                restock.push(StockMove {
                    product_id,
                    size: request.size().to_string(),
                    quantity: request.quantity(),
                });
            }
            uow.record(&mut order, order_id, events)?;
            uow.record(request, *return_id, approval)?;
            refunded += refund;
        }

        stage_stock(&mut uow, order_id, restock, Some(StockChangeReason::Returned)).await?;
        if let Some(user_id) = order.user_id() {
            let (description, return_id) = match target {
                Target::Request(return_id) => (
                    format!("Refund for return in order {}", order.order_number()),
                    Some(return_id),
                ),
                Target::Order(_) => (
                    format!("Refund for returned items in order {}", order.order_number()),
                    None,
                ),
            };
            stage_credit(&mut uow, user_id, refunded, &description, Some(order_id), return_id)
                .await?;
        }
        uow.commit().await?;

        note_transition(before, &order);
        let return_ids: Vec<AggregateId> = requests.iter().map(|(id, _)| *id).collect();
        let message = format!(
            "Return approved for {} item(s), {refunded} refunded to wallet",
            return_ids.len()
        );
        Ok(LifecycleOutcome::new(order, message, return_ids.len())
            .with_returns(return_ids)
            .with_refund(refunded))
    }

    async fn try_reject(
        &self,
        target: Target,
        rejected_by: &str,
        reason: &str,
    ) -> Result<LifecycleOutcome, DomainError> {
        let mut uow = UnitOfWork::new(&self.store);
        let (order_id, mut order, mut requests) = pending_requests(&uow, target).await?;
        let before = order.status();

        for (return_id, request) in &mut requests {
            let item_id = request_item(request, *return_id)?;
            let events = order.reject_item_return(item_id, *return_id, reason)?;
            let rejection = request.reject(rejected_by, reason)?;
            uow.record(&mut order, order_id, events)?;
            uow.record(request, *return_id, rejection)?;
        }
        uow.commit().await?;

        note_transition(before, &order);
        let return_ids: Vec<AggregateId> = requests.iter().map(|(id, _)| *id).collect();
        let message = format!("Return rejected for {} item(s)", return_ids.len());
        Ok(LifecycleOutcome::new(order, message, return_ids.len()).with_returns(return_ids))
    }

    async fn try_complete_return(
        &self,
        return_id: AggregateId,
    ) -> Result<ReturnRequest, DomainError> {
        let mut uow = UnitOfWork::new(&self.store);
        let mut request: ReturnRequest = uow.load_existing(return_id).await?;
        let events = request.complete()?;
        uow.record(&mut request, return_id, events)?;
        uow.commit().await?;
        Ok(request)
    }
}

/// What an approval or rejection acts on.
#[derive(Debug, Clone, Copy)]
enum Target {
    Request(AggregateId),
    Order(AggregateId),
}

/// Loads the order and the pending requests a decision applies to.
///
/// A single request must still be pending. An order must have at least one
/// pending request.
async fn pending_requests<S: EventStore + ?Sized>(
    uow: &UnitOfWork<'_, S>,
    target: Target,
) -> Result<(AggregateId, Order, Vec<(AggregateId, ReturnRequest)>), DomainError> {
    match target {
        Target::Request(return_id) => {
            let request: ReturnRequest = uow.load_existing(return_id).await?;
            if !request.status().is_open() {
                return Err(ReturnError::NotPending {
                    status: request.status(),
                }
                .into());
            }
            let order_id = request
                .order_id()
                .ok_or_else(|| DomainError::not_found(ReturnRequest::aggregate_type(), return_id))?;
            let order: Order = uow.load_existing(order_id).await?;
            Ok((order_id, order, vec![(return_id, request)]))
        }
        Target::Order(order_id) => {
            let order: Order = uow.load_existing(order_id).await?;
            let mut requests = Vec::new();
            for return_id in order.items().iter().filter_map(|item| item.active_return) {
                let request: ReturnRequest = uow.load_existing(return_id).await?;
                if request.status().is_open() {
                    requests.push((return_id, request));
                }
            }
            if requests.is_empty() {
                return Err(ReturnError::NothingPending.into());
            }
            Ok((order_id, order, requests))
        }
    }
}

fn request_item(request: &ReturnRequest, return_id: AggregateId) -> Result<ItemId, DomainError> {
    request
        .item_id()
        .ok_or_else(|| DomainError::not_found(ReturnRequest::aggregate_type(), return_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::inventory::ProductStock;
    use crate::returns::ReturnStatus;
    use crate::status::{PaymentMethod, PaymentStatus};
    use crate::unit_of_work::load;
    use crate::value_objects::OrderLine;
    use crate::wallet::Wallet;
    use common::ProductId;
    use event_store::InMemoryEventStore;

    struct Fixture {
        service: OrderLifecycleService<InMemoryEventStore>,
        store: InMemoryEventStore,
        user: UserId,
        product: ProductId,
        order_id: AggregateId,
        items: Vec<ItemId>,
    }

    /// Places a two-item card order, pays for it and delivers it.
    async fn delivered_order() -> Fixture {
        let store = InMemoryEventStore::new();
        let service = OrderLifecycleService::new(store.clone());
        let user = UserId::new();
        let product = ProductId::new();

        let mut uow = UnitOfWork::new(&store);
        let mut stock = ProductStock::default();
        let events = stock.receive(product, "M", 10).unwrap();
        uow.record(&mut stock, product.into(), events).unwrap();
        uow.commit().await.unwrap();

        let lines = vec![
            OrderLine::new(product, "Denim Jacket", "M", 1, Money::from_cents(4000)),
            OrderLine::new(product, "Denim Jacket", "M", 2, Money::from_cents(2500)),
        ];
        let placed = service
            .place_order(user, PaymentMethod::Card, lines)
            .await
            .unwrap();
        let order_id = placed.order.id().unwrap();
        service
            .record_payment(order_id, PaymentStatus::Completed, None)
            .await
            .unwrap();
        for status in [OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered] {
            service
                .update_order_status(order_id, status, None, "admin")
                .await
                .unwrap();
        }

        let items = placed.order.items().iter().map(|item| item.id).collect();
        Fixture {
            service,
            store,
            user,
            product,
            order_id,
            items,
        }
    }

    fn wrong_size() -> ReturnReasonCode {
        ReturnReasonCode::WrongSize
    }

    #[tokio::test]
    async fn test_request_puts_item_under_review() {
        let f = delivered_order().await;
        let outcome = f
            .service
            .request_item_return(f.order_id, f.items[0], wrong_size(), f.user)
            .await
            .unwrap();

        assert_eq!(outcome.return_ids.len(), 1);
        let item = outcome.order.item(f.items[0]).unwrap();
        assert_eq!(item.status, OrderStatus::ProcessingReturn);
        assert_eq!(item.active_return, Some(outcome.return_ids[0]));
        assert_eq!(outcome.order.status(), OrderStatus::ProcessingReturn);

        let request = f
            .service
            .get_return_request(outcome.return_ids[0])
            .await
            .unwrap();
        assert_eq!(request.status(), ReturnStatus::Pending);
        assert_eq!(request.item_total(), Money::from_cents(4000));
        assert_eq!(
            request.reason(),
            Some(&ReturnReason::Code(ReturnReasonCode::WrongSize))
        );
    }

    #[tokio::test]
    async fn test_request_by_another_user_is_not_found() {
        let f = delivered_order().await;
        let err = f
            .service
            .request_item_return(f.order_id, f.items[0], wrong_size(), UserId::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_custom_refund_is_capped_at_item_total() {
        let f = delivered_order().await;
        let requested = f
            .service
            .request_item_return(f.order_id, f.items[0], wrong_size(), f.user)
            .await
            .unwrap();
        let return_id = requested.return_ids[0];

        let err = f
            .service
            .approve_item_return(return_id, "admin", Some(Money::from_cents(4001)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        let approved = f
            .service
            .approve_item_return(return_id, "admin", Some(Money::from_cents(3000)))
            .await
            .unwrap();
        assert_eq!(approved.refunded, Money::from_cents(3000));

        let wallet: Wallet = load(&f.store, f.user.into()).await.unwrap();
        assert_eq!(wallet.balance(), Money::from_cents(3000));
        assert_eq!(wallet.transactions()[0].return_id, Some(return_id));
    }

    #[tokio::test]
    async fn test_approve_order_return_credits_once() {
        let f = delivered_order().await;
        f.service
            .request_order_return(f.order_id, wrong_size(), f.user)
            .await
            .unwrap();

        let approved = f
            .service
            .approve_order_return(f.order_id, "admin")
            .await
            .unwrap();
        assert_eq!(approved.return_ids.len(), 2);
        assert_eq!(approved.refunded, Money::from_cents(9000));
        assert_eq!(approved.order.status(), OrderStatus::Returned);
        assert_eq!(approved.order.payment_status(), PaymentStatus::Refunded);

        let wallet: Wallet = load(&f.store, f.user.into()).await.unwrap();
        assert_eq!(wallet.transactions().len(), 1);
        assert_eq!(wallet.balance(), Money::from_cents(9000));

        let stock: ProductStock = load(&f.store, f.product.into()).await.unwrap();
        assert_eq!(stock.available("M"), 10);

        let again = f.service.approve_order_return(f.order_id, "admin").await;
        assert!(matches!(
            again,
            Err(DomainError::Return(ReturnError::NothingPending))
        ));
    }

    #[tokio::test]
    async fn test_reject_order_return_restores_delivery() {
        let f = delivered_order().await;
        let requested = f
            .service
            .request_order_return(f.order_id, wrong_size(), f.user)
            .await
            .unwrap();

        let rejected = f
            .service
            .reject_order_return(f.order_id, "admin", "Worn items")
            .await
            .unwrap();
        assert_eq!(rejected.order.status(), OrderStatus::Delivered);
        assert!(rejected.order.items().iter().all(|item| item.can_return()));

        for return_id in requested.return_ids {
            let request = f.service.get_return_request(return_id).await.unwrap();
            assert_eq!(request.status(), ReturnStatus::Rejected);
            assert_eq!(request.rejection_reason(), Some("Worn items"));
        }
    }

    #[tokio::test]
    async fn test_complete_requires_approval() {
        let f = delivered_order().await;
        let requested = f
            .service
            .request_item_return(f.order_id, f.items[1], wrong_size(), f.user)
            .await
            .unwrap();
        let return_id = requested.return_ids[0];

        assert!(f.service.complete_return(return_id).await.is_err());

        f.service
            .approve_item_return(return_id, "admin", None)
            .await
            .unwrap();
        let completed = f.service.complete_return(return_id).await.unwrap();
        assert_eq!(completed.status(), ReturnStatus::Completed);
    }
}
