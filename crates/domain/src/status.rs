//! Status vocabularies and the transition table.
//!
//! The same table governs orders and their items. Transitions are checked
//! against the closed enum, so a missing row is a compile error rather than
//! a silent fallthrough.
//!
//! ```text
//! Pending ──► Processing ──► Shipped ──► Delivered ──► ProcessingReturn ──► Returned
//!    │             │                         │                                 ▲
//!    └─────────────┴──► Cancelled            └─────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

/// Fulfillment status of an order or an order item.
///
/// The `Partially*` members are derived labels produced by the aggregator;
/// they are never the target of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    PartiallyCancelled,
    Returned,
    PartiallyReturned,
    PartiallyDelivered,
    ProcessingReturn,
}

impl OrderStatus {
    /// Every member of the enum, in declaration order.
    pub const ALL: [OrderStatus; 10] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::PartiallyCancelled,
        OrderStatus::Returned,
        OrderStatus::PartiallyReturned,
        OrderStatus::PartiallyDelivered,
        OrderStatus::ProcessingReturn,
    ];

    /// Statuses an item can actually hold. Composite labels are excluded.
    pub const ITEM_STATUSES: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::ProcessingReturn,
        OrderStatus::Returned,
        OrderStatus::Cancelled,
    ];

    /// Returns the statuses reachable from this one.
    pub fn valid_transitions(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Processing, Cancelled],
            Processing => &[Shipped, Cancelled],
            Shipped => &[Delivered],
            Delivered => &[ProcessingReturn, Returned],
            ProcessingReturn => &[Returned],
            Cancelled | Returned => &[],
            PartiallyCancelled | PartiallyReturned | PartiallyDelivered => &[],
        }
    }

    /// Returns true if `target` is in this status's row of the table.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        self.valid_transitions().contains(&target)
    }

    /// Returns true for statuses no operation ever leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Returned)
    }

    /// Returns true for labels that only the aggregator produces.
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            OrderStatus::PartiallyCancelled
                | OrderStatus::PartiallyReturned
                | OrderStatus::PartiallyDelivered
        )
    }

    /// Returns true while cancellation is still allowed by business policy.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }

    /// Rank used to resolve mixed item statuses.
    ///
    /// Composite labels never appear on items and rank zero.
    pub fn priority(&self) -> u8 {
        match self {
            OrderStatus::Pending => 1,
            OrderStatus::Processing => 2,
            OrderStatus::Shipped => 3,
            OrderStatus::Delivered => 4,
            OrderStatus::ProcessingReturn => 5,
            OrderStatus::Returned => 6,
            OrderStatus::Cancelled => 7,
            OrderStatus::PartiallyCancelled
            | OrderStatus::PartiallyReturned
            | OrderStatus::PartiallyDelivered => 0,
        }
    }

    /// Returns the status name as stored and displayed.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::PartiallyCancelled => "PartiallyCancelled",
            OrderStatus::Returned => "Returned",
            OrderStatus::PartiallyReturned => "PartiallyReturned",
            OrderStatus::PartiallyDelivered => "PartiallyDelivered",
            OrderStatus::ProcessingReturn => "ProcessingReturn",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// A status string outside the closed vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown status: {0}")]
pub struct UnknownStatus(pub String);

/// Returns true if `to` is reachable from `from` in one step.
pub fn is_valid_status_transition(from: OrderStatus, to: OrderStatus) -> bool {
    from.can_transition_to(to)
}

/// Returns the row of the transition table for `from`.
pub fn get_valid_transitions(from: OrderStatus) -> &'static [OrderStatus] {
    from.valid_transitions()
}

/// Renders a status list for user-facing messages.
pub fn format_status_list(statuses: &[OrderStatus]) -> String {
    if statuses.is_empty() {
        return "none (terminal status)".to_string();
    }
    statuses
        .iter()
        .map(OrderStatus::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Money movement state of an order or an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Refunded,
    PartiallyCompleted,
    PartiallyRefunded,
}

impl PaymentStatus {
    /// Returns the status name as stored and displayed.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Completed => "Completed",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Refunded => "Refunded",
            PaymentStatus::PartiallyCompleted => "PartiallyCompleted",
            PaymentStatus::PartiallyRefunded => "PartiallyRefunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the customer pays for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Cod,
    Card,
    Upi,
    Netbanking,
    Wallet,
    Paypal,
}

impl PaymentMethod {
    /// Cash on delivery: nothing is collected before the parcel arrives.
    pub fn is_cod(&self) -> bool {
        matches!(self, PaymentMethod::Cod)
    }

    /// Methods settled by an external gateway callback.
    pub fn is_gateway(&self) -> bool {
        matches!(
            self,
            PaymentMethod::Card | PaymentMethod::Upi | PaymentMethod::Netbanking | PaymentMethod::Paypal
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "cod",
            PaymentMethod::Card => "card",
            PaymentMethod::Upi => "upi",
            PaymentMethod::Netbanking => "netbanking",
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::Paypal => "paypal",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
