//! Return requests view.
//!
//! Indexes return requests by status, order and customer. The pending queue
//! is what an admin works through when approving or rejecting returns.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AggregateId, ItemId, ProductId, UserId};
use domain::{Money, ReturnEvent, ReturnReason, ReturnStatus};
use event_store::EventEnvelope;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;

/// Denormalized return request.
#[derive(Debug, Clone, Serialize)]
pub struct ReturnRequestSummary {
    pub return_id: AggregateId,
    pub order_id: AggregateId,
    pub order_number: String,
    pub item_id: ItemId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub size: String,
    pub quantity: u32,
    pub item_total: Money,
    pub reason: ReturnReason,
    pub status: ReturnStatus,
    pub refund_amount: Money,
    pub requested_at: DateTime<Utc>,

    /// Admin who approved or rejected the request.
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct State {
    requests: HashMap<AggregateId, ReturnRequestSummary>,
    position: ProjectionPosition,
}

impl State {
    fn select(&self, pred: impl Fn(&ReturnRequestSummary) -> bool) -> Vec<ReturnRequestSummary> {
        let mut found: Vec<_> = self.requests.values().filter(|r| pred(r)).cloned().collect();
        found.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        found
    }
}

/// Read model over every return request.
#[derive(Debug, Clone)]
pub struct ReturnRequestsView {
    state: Arc<RwLock<State>>,
}

impl ReturnRequestsView {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
        }
    }

    pub async fn get(&self, return_id: AggregateId) -> Option<ReturnRequestSummary> {
        self.state.read().await.requests.get(&return_id).cloned()
    }

    /// Requests awaiting review, oldest first.
    pub async fn pending(&self) -> Vec<ReturnRequestSummary> {
        self.with_status(ReturnStatus::Pending).await
    }

    pub async fn with_status(&self, status: ReturnStatus) -> Vec<ReturnRequestSummary> {
        self.state.read().await.select(|r| r.status == status)
    }

    pub async fn for_order(&self, order_id: AggregateId) -> Vec<ReturnRequestSummary> {
        self.state.read().await.select(|r| r.order_id == order_id)
    }

    pub async fn for_user(&self, user_id: UserId) -> Vec<ReturnRequestSummary> {
        self.state.read().await.select(|r| r.user_id == user_id)
    }

    /// Number of requests in each status.
    pub async fn status_counts(&self) -> HashMap<ReturnStatus, usize> {
        let state = self.state.read().await;
        let mut counts = HashMap::new();
        for request in state.requests.values() {
            *counts.entry(request.status).or_insert(0) += 1;
        }
        counts
    }

    /// Total refunded across approved and completed requests.
    pub async fn total_refunded(&self) -> Money {
        self.state
            .read()
            .await
            .requests
            .values()
            .filter(|r| matches!(r.status, ReturnStatus::Approved | ReturnStatus::Completed))
            .map(|r| r.refund_amount)
            .sum()
    }

    fn apply(state: &mut State, return_id: AggregateId, event: ReturnEvent) {
        if let ReturnEvent::ReturnRequested(data) = event {
            state.requests.insert(
                return_id,
                ReturnRequestSummary {
                    return_id,
                    order_id: data.order_id,
                    order_number: data.order_number,
                    item_id: data.item_id,
                    user_id: data.user_id,
                    product_id: data.product_id,
                    size: data.size,
                    quantity: data.quantity,
                    item_total: data.item_total,
                    reason: data.reason,
                    status: ReturnStatus::Pending,
                    refund_amount: Money::zero(),
                    requested_at: data.requested_at,
                    decided_by: None,
                    decided_at: None,
                    rejection_reason: None,
                    completed_at: None,
                },
            );
            return;
        }

        let Some(request) = state.requests.get_mut(&return_id) else {
            tracing::warn!(%return_id, "event for unknown return request skipped");
            return;
        };

        match event {
            ReturnEvent::ReturnRequested(_) => {}
            ReturnEvent::ReturnApproved(data) => {
                request.status = ReturnStatus::Approved;
                request.refund_amount = data.refund_amount;
                request.decided_by = Some(data.approved_by);
                request.decided_at = Some(data.approved_at);
            }
            ReturnEvent::ReturnRejected(data) => {
                request.status = ReturnStatus::Rejected;
                request.decided_by = Some(data.rejected_by);
                request.decided_at = Some(data.rejected_at);
                request.rejection_reason = Some(data.reason);
            }
            ReturnEvent::ReturnCompleted(data) => {
                request.status = ReturnStatus::Completed;
                request.completed_at = Some(data.completed_at);
            }
        }
    }
}

impl Default for ReturnRequestsView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Projection for ReturnRequestsView {
    fn name(&self) -> &'static str {
        "ReturnRequestsView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().await;

        if event.aggregate_type == "ReturnRequest" {
            let return_event: ReturnEvent = event.decode()?;
            Self::apply(&mut state, event.aggregate_id, return_event);
        }

        state.position = state.position.advance();
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.requests.clear();
        state.position = ProjectionPosition::zero();
        Ok(())
    }
}

impl ReadModel for ReturnRequestsView {
    fn name(&self) -> &'static str {
        "ReturnRequestsView"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.requests.len()).unwrap_or(0)
    }
}
