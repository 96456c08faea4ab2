//! Wallet ledger: one append-only balance account per user.

mod aggregate;
mod events;

pub use aggregate::{TransactionKind, TransactionStatus, Wallet, WalletTransaction};
pub use events::{WalletEntryData, WalletEvent};

use thiserror::Error;

use crate::value_objects::Money;

/// Errors that can occur during wallet operations.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Invalid amount: {amount} (must be greater than 0)")]
    InvalidAmount { amount: Money },

    /// A debit would take the balance below zero.
    #[error("Insufficient wallet balance: required {required}, available {available}")]
    InsufficientBalance { required: Money, available: Money },
}
