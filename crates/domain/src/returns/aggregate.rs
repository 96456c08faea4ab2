//! Return request aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AggregateId, ItemId, ProductId, UserId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::order::OrderItem;
use crate::value_objects::Money;

use super::{
    RefundStatus, ReturnError, ReturnEvent, ReturnReason, ReturnStatus,
    events::ReturnRequestedData,
};

/// A customer's or admin's request to send one delivered item back.
///
/// The order stays authoritative for the item's live status; the request only
/// records the review and the refund decision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReturnRequest {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    order_id: Option<AggregateId>,
    order_number: String,
    item_id: Option<ItemId>,
    user_id: Option<UserId>,
    product_id: Option<ProductId>,
    size: String,
    quantity: u32,
    item_total: Money,
    reason: Option<ReturnReason>,
    status: ReturnStatus,
    refund_amount: Money,
    refund_status: RefundStatus,
    requested_at: Option<DateTime<Utc>>,
    approved_by: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    rejected_by: Option<String>,
    rejection_reason: Option<String>,
    rejected_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl Aggregate for ReturnRequest {
    type Event = ReturnEvent;
    type Error = ReturnError;

    fn aggregate_type() -> &'static str {
        "ReturnRequest"
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
            ReturnEvent::ReturnRequested(data) => {
                self.id = Some(data.return_id);
                self.order_id = Some(data.order_id);
                self.order_number = data.order_number;
                self.item_id = Some(data.item_id);
                self.user_id = Some(data.user_id);
                self.product_id = Some(data.product_id);
                self.size = data.size;
                self.quantity = data.quantity;
                self.item_total = data.item_total;
                self.reason = Some(data.reason);
                self.status = ReturnStatus::Pending;
                self.refund_status = RefundStatus::Pending;
                self.requested_at = Some(data.requested_at);
            }
            ReturnEvent::ReturnApproved(data) => {
                self.status = ReturnStatus::Approved;
                self.refund_amount = data.refund_amount;
                self.refund_status = RefundStatus::Processed;
                self.approved_by = Some(data.approved_by);
                self.approved_at = Some(data.approved_at);
            }
            ReturnEvent::ReturnRejected(data) => {
                self.status = ReturnStatus::Rejected;
                self.rejected_by = Some(data.rejected_by);
                self.rejection_reason = Some(data.reason);
                self.rejected_at = Some(data.rejected_at);
            }
            ReturnEvent::ReturnCompleted(data) => {
                self.status = ReturnStatus::Completed;
                self.completed_at = Some(data.completed_at);
            }
        }
    }
}

// Query methods
impl ReturnRequest {
    pub fn order_id(&self) -> Option<AggregateId> {
        self.order_id
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn item_id(&self) -> Option<ItemId> {
        self.item_id
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn size(&self) -> &str {
        &self.size
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn item_total(&self) -> Money {
        self.item_total
    }

    pub fn reason(&self) -> Option<&ReturnReason> {
        self.reason.as_ref()
    }

    pub fn status(&self) -> ReturnStatus {
        self.status
    }

    pub fn refund_amount(&self) -> Money {
        self.refund_amount
    }

    pub fn refund_status(&self) -> RefundStatus {
        self.refund_status
    }

    pub fn requested_at(&self) -> Option<DateTime<Utc>> {
        self.requested_at
    }

    pub fn approved_by(&self) -> Option<&str> {
        self.approved_by.as_deref()
    }

    pub fn rejected_by(&self) -> Option<&str> {
        self.rejected_by.as_deref()
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }
}

// Command methods (return events)
impl ReturnRequest {
    /// Opens a request for one item of an order.
    pub fn request(
        &self,
        return_id: AggregateId,
        order_id: AggregateId,
        order_number: &str,
        user_id: UserId,
        item: &OrderItem,
        reason: ReturnReason,
    ) -> Result<Vec<ReturnEvent>, ReturnError> {
        if self.exists() {
            return Err(ReturnError::AlreadyRequested);
        }

        Ok(vec![ReturnEvent::ReturnRequested(ReturnRequestedData {
            return_id,
            order_id,
            order_number: order_number.to_string(),
            item_id: item.id,
            user_id,
            product_id: item.product_id,
            size: item.size.clone(),
            quantity: item.quantity,
            item_total: item.total_price(),
            reason,
            requested_at: Utc::now(),
        })])
    }

    /// Approves the request with the refund that will be credited.
    pub fn approve(
        &self,
        approved_by: &str,
        refund_amount: Money,
    ) -> Result<Vec<ReturnEvent>, ReturnError> {
        self.require_pending()?;
        Ok(vec![ReturnEvent::approved(approved_by, refund_amount)])
    }

    /// Rejects the request.
    pub fn reject(&self, rejected_by: &str, reason: &str) -> Result<Vec<ReturnEvent>, ReturnError> {
        self.require_pending()?;
        Ok(vec![ReturnEvent::rejected(rejected_by, reason)])
    }

    /// Marks approved goods as received back.
    pub fn complete(&self) -> Result<Vec<ReturnEvent>, ReturnError> {
        if self.status != ReturnStatus::Approved {
            return Err(ReturnError::NotApproved {
                status: self.status,
            });
        }
        Ok(vec![ReturnEvent::completed()])
    }

    /// Checks an admin's refund override against the item total.
    pub fn validate_refund(&self, requested: Money) -> Result<Money, ReturnError> {
        if !requested.is_positive() || requested > self.item_total {
            return Err(ReturnError::InvalidRefundAmount {
                requested,
                max: self.item_total,
            });
        }
        Ok(requested)
    }

    fn require_pending(&self) -> Result<(), ReturnError> {
        if self.status != ReturnStatus::Pending {
            return Err(ReturnError::NotPending {
                status: self.status,
            });
        }
        Ok(())
    }
}
