//! Return requests: the review gate in front of item returns.

mod aggregate;
mod events;

pub use aggregate::ReturnRequest;
pub use events::{
    ReturnApprovedData, ReturnCompletedData, ReturnEvent, ReturnRejectedData, ReturnRequestedData,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value_objects::Money;

/// Review state of a return request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ReturnStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    /// Goods received back after approval.
    Completed,
}

impl ReturnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnStatus::Pending => "Pending",
            ReturnStatus::Approved => "Approved",
            ReturnStatus::Rejected => "Rejected",
            ReturnStatus::Completed => "Completed",
        }
    }

    /// Returns true while the request still holds its item.
    pub fn is_open(&self) -> bool {
        matches!(self, ReturnStatus::Pending)
    }
}

impl std::fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Refund progress of a return request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RefundStatus {
    #[default]
    Pending,
    Processed,
    Failed,
}

/// Reasons a customer may pick when asking for a return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnReasonCode {
    WrongSize,
    DefectiveOrDamaged,
    NotAsDescribed,
    WrongItem,
    NoLongerNeeded,
    Other,
}

impl ReturnReasonCode {
    pub const ALL: [ReturnReasonCode; 6] = [
        ReturnReasonCode::WrongSize,
        ReturnReasonCode::DefectiveOrDamaged,
        ReturnReasonCode::NotAsDescribed,
        ReturnReasonCode::WrongItem,
        ReturnReasonCode::NoLongerNeeded,
        ReturnReasonCode::Other,
    ];

    /// Returns the label shown to customers.
    pub fn label(&self) -> &'static str {
        match self {
            ReturnReasonCode::WrongSize => "Wrong size",
            ReturnReasonCode::DefectiveOrDamaged => "Defective or damaged",
            ReturnReasonCode::NotAsDescribed => "Not as described",
            ReturnReasonCode::WrongItem => "Wrong item received",
            ReturnReasonCode::NoLongerNeeded => "No longer needed",
            ReturnReasonCode::Other => "Other",
        }
    }
}

impl std::str::FromStr for ReturnReasonCode {
    type Err = ReturnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReturnReasonCode::ALL
            .into_iter()
            .find(|code| code.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ReturnError::UnknownReason(s.to_string()))
    }
}

/// Why an item is coming back.
///
/// Customers choose from the closed code set; admins may write free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum ReturnReason {
    Code(ReturnReasonCode),
    Custom(String),
}

impl ReturnReason {
    pub fn as_str(&self) -> &str {
        match self {
            ReturnReason::Code(code) => code.label(),
            ReturnReason::Custom(text) => text,
        }
    }
}

impl std::fmt::Display for ReturnReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ReturnReasonCode> for ReturnReason {
    fn from(code: ReturnReasonCode) -> Self {
        ReturnReason::Code(code)
    }
}

/// Errors that can occur during return request operations.
#[derive(Debug, Error)]
pub enum ReturnError {
    #[error("Return request already exists")]
    AlreadyRequested,

    #[error("Return request is {status}, expected Pending")]
    NotPending { status: ReturnStatus },

    #[error("Return request is {status}, expected Approved")]
    NotApproved { status: ReturnStatus },

    #[error("Unknown return reason: {0}")]
    UnknownReason(String),

    /// Custom refunds must be positive and no more than the item paid.
    #[error("Invalid refund amount {requested} (maximum {max})")]
    InvalidRefundAmount { requested: Money, max: Money },

    #[error("No pending return requests for this order")]
    NothingPending,
}
