//! Lifecycle operations committed through the services, read back through
//! the projections.

use common::{AggregateId, ItemId, ProductId, UserId};
use domain::{
    Aggregate, InventoryService, Money, OrderLifecycleService, OrderLine, OrderStatus,
    PaymentMethod, PaymentStatus, ReturnReasonCode, ReturnStatus,
};
use event_store::InMemoryEventStore;
use projections::{
    OrderTimelineView, ProjectionProcessor, ReadModel, ReturnRequestsView, TimelineScope,
};

struct Harness {
    store: InMemoryEventStore,
    lifecycle: OrderLifecycleService<InMemoryEventStore>,
    processor: ProjectionProcessor<InMemoryEventStore>,
    timelines: OrderTimelineView,
    returns: ReturnRequestsView,
    user: UserId,
    product: ProductId,
}

impl Harness {
    async fn new() -> Self {
        let store = InMemoryEventStore::new();
        let product = ProductId::new();
        InventoryService::new(store.clone())
            .receive_stock(product, "M", 10)
            .await
            .unwrap();

        let timelines = OrderTimelineView::new();
        let returns = ReturnRequestsView::new();
        let mut processor = ProjectionProcessor::new(store.clone());
        processor.register(timelines.clone());
        processor.register(returns.clone());

        Self {
            lifecycle: OrderLifecycleService::new(store.clone()),
            store,
            processor,
            timelines,
            returns,
            user: UserId::new(),
            product,
        }
    }

    /// Card order for a tee and two caps, paid but not yet shipped.
    async fn paid_order(&self) -> AggregateId {
        let lines = vec![
            OrderLine::new(self.product, "Tee", "M", 1, Money::from_cents(4000)),
            OrderLine::new(self.product, "Cap", "M", 2, Money::from_cents(2500)),
        ];
        let placed = self
            .lifecycle
            .place_order(self.user, PaymentMethod::Card, lines)
            .await
            .unwrap();
        let order_id = placed.order.id().unwrap();
        self.lifecycle
            .record_payment(order_id, PaymentStatus::Completed, Some("pay_123".into()))
            .await
            .unwrap();
        order_id
    }

    async fn delivered_order(&self) -> AggregateId {
        let order_id = self.paid_order().await;
        for status in [OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered] {
            self.lifecycle
                .update_order_status(order_id, status, None, "admin")
                .await
                .unwrap();
        }
        order_id
    }

    async fn request_all(&self, order_id: AggregateId) -> Vec<AggregateId> {
        self.lifecycle
            .request_order_return(order_id, ReturnReasonCode::WrongSize, self.user)
            .await
            .unwrap()
            .return_ids
    }

    async fn item_of(&self, return_id: AggregateId) -> ItemId {
        self.returns.get(return_id).await.unwrap().item_id
    }
}

#[tokio::test]
async fn test_return_review_flows_into_both_views() {
    let h = Harness::new().await;
    let order_id = h.delivered_order().await;
    let ids = h.request_all(order_id).await;
    assert_eq!(ids.len(), 2);

    h.processor.run_catch_up().await.unwrap();
    assert_eq!(h.returns.pending().await.len(), 2);

    let (approved, rejected) = (ids[0], ids[1]);
    h.lifecycle
        .approve_item_return(approved, "admin", None)
        .await
        .unwrap();
    h.lifecycle
        .reject_item_return(rejected, "admin", "Worn")
        .await
        .unwrap();
    h.lifecycle.complete_return(approved).await.unwrap();
    h.processor.run_catch_up().await.unwrap();

    assert!(h.returns.pending().await.is_empty());
    assert_eq!(h.returns.for_order(order_id).await.len(), 2);
    assert_eq!(h.returns.for_user(h.user).await.len(), 2);
    assert_eq!(
        h.returns.get(approved).await.unwrap().status,
        ReturnStatus::Completed
    );
    let rejected_summary = h.returns.get(rejected).await.unwrap();
    assert_eq!(rejected_summary.status, ReturnStatus::Rejected);
    assert_eq!(rejected_summary.decided_by.as_deref(), Some("admin"));

    let approved_item = h.item_of(approved).await;
    let refunded = h.returns.get(approved).await.unwrap().item_total;
    assert_eq!(h.returns.total_refunded().await, refunded);

    let order = h.lifecycle.get_order(order_id).await.unwrap();
    let timeline = h.timelines.get(order_id).await.unwrap();
    assert_eq!(timeline.status, order.status());
    assert_eq!(timeline.status, OrderStatus::PartiallyReturned);
    assert_eq!(timeline.payment_status, order.payment_status());
    assert_eq!(timeline.payment_reference.as_deref(), Some("pay_123"));

    let approved_history: Vec<_> = timeline.item_entries(approved_item).collect();
    assert_eq!(
        approved_history.last().map(|e| e.status),
        Some(OrderStatus::Returned)
    );
    let rejected_item = h.item_of(rejected).await;
    let last = timeline.item_entries(rejected_item).last().unwrap();
    assert_eq!(last.status, OrderStatus::Delivered);
    assert_eq!(last.notes.as_deref(), Some("Return rejected: Worn"));
}

#[tokio::test]
async fn test_timeline_mirrors_order_history() {
    let h = Harness::new().await;
    let order_id = h.paid_order().await;
    h.lifecycle
        .update_order_status(order_id, OrderStatus::Processing, Some("Packed".into()), "admin")
        .await
        .unwrap();
    let order = h.lifecycle.get_order(order_id).await.unwrap();
    let cap = order.items()[1].id;
    h.lifecycle
        .cancel_item(order_id, cap, "Changed mind", "customer")
        .await
        .unwrap();
    h.processor.run_catch_up().await.unwrap();

    let order = h.lifecycle.get_order(order_id).await.unwrap();
    let timeline = h.timelines.find_by_number(order.order_number()).await.unwrap();
    assert_eq!(timeline.order_id, order_id);
    assert_eq!(timeline.status, OrderStatus::PartiallyCancelled);
    assert_eq!(timeline.total_amount(), Money::from_cents(9000));

    for item in order.items() {
        let projected = timeline.items.iter().find(|i| i.item_id == item.id).unwrap();
        assert_eq!(projected.status, item.status);
        assert_eq!(projected.payment_status, item.payment_status);
    }

    let order_entries: Vec<_> = timeline
        .entries
        .iter()
        .filter(|e| e.scope == TimelineScope::Order)
        .map(|e| e.status)
        .collect();
    assert_eq!(order_entries[0], OrderStatus::Pending);
    assert!(order_entries.contains(&OrderStatus::Processing));
    assert_eq!(order_entries.last(), Some(&OrderStatus::PartiallyCancelled));
}

#[tokio::test]
async fn test_aborted_commit_leaves_views_unchanged() {
    let h = Harness::new().await;
    let order_id = h.delivered_order().await;
    let ids = h.request_all(order_id).await;

    h.store.fail_commits_touching("Wallet").await;
    assert!(
        h.lifecycle
            .approve_item_return(ids[0], "admin", None)
            .await
            .is_err()
    );
    h.processor.run_catch_up().await.unwrap();

    assert_eq!(h.returns.pending().await.len(), 2);
    assert_eq!(
        h.timelines.get(order_id).await.unwrap().status,
        OrderStatus::ProcessingReturn
    );

    h.store.clear_commit_failures().await;
    h.lifecycle
        .approve_item_return(ids[0], "admin", None)
        .await
        .unwrap();
    h.processor.run_catch_up().await.unwrap();
    assert_eq!(h.returns.pending().await.len(), 1);
}

#[tokio::test]
async fn test_rebuild_reproduces_state() {
    let h = Harness::new().await;
    let order_id = h.delivered_order().await;
    h.request_all(order_id).await;
    let events = h.processor.run_catch_up().await.unwrap();

    let before = h.timelines.get(order_id).await.unwrap();
    assert_eq!(h.processor.rebuild_all().await.unwrap(), events);
    let after = h.timelines.get(order_id).await.unwrap();

    assert_eq!(before.entries.len(), after.entries.len());
    assert_eq!(before.status, after.status);
    assert_eq!(h.timelines.count(), 1);
    assert_eq!(h.returns.count(), 2);
}
