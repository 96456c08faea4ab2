//! Domain error types.

use event_store::EventStoreError;
use thiserror::Error;

use crate::inventory::StockError;
use crate::order::OrderError;
use crate::returns::ReturnError;
use crate::wallet::WalletError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Return(#[from] ReturnError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Stock(#[from] StockError),

    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// Aggregate not found.
    #[error("{aggregate_type} not found: {aggregate_id}")]
    NotFound {
        aggregate_type: &'static str,
        aggregate_id: String,
    },

    /// Every optimistic commit attempt hit a concurrent writer.
    #[error("Operation abandoned after {attempts} conflicting commit attempts")]
    Conflict { attempts: u32 },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification callers use to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidTransition,
    PreconditionFailed,
    InsufficientBalance,
    TransactionAborted,
    Conflict,
    Internal,
}

impl DomainError {
    pub(crate) fn not_found(aggregate_type: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            aggregate_type,
            aggregate_id: id.to_string(),
        }
    }

    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::NotFound { .. } => ErrorKind::NotFound,
            DomainError::Order(OrderError::NotPlaced | OrderError::ItemNotFound { .. }) => {
                ErrorKind::NotFound
            }
            DomainError::Order(OrderError::InvalidTransition { .. }) => {
                ErrorKind::InvalidTransition
            }
            DomainError::Order(_) | DomainError::Return(_) | DomainError::Stock(_) => {
                ErrorKind::PreconditionFailed
            }
            DomainError::Wallet(WalletError::InsufficientBalance { .. }) => {
                ErrorKind::InsufficientBalance
            }
            DomainError::Wallet(WalletError::InvalidAmount { .. }) => {
                ErrorKind::PreconditionFailed
            }
            DomainError::EventStore(EventStoreError::TransactionAborted { .. }) => {
                ErrorKind::TransactionAborted
            }
            DomainError::EventStore(EventStoreError::ConcurrencyConflict { .. })
            | DomainError::Conflict { .. } => ErrorKind::Conflict,
            DomainError::EventStore(_) | DomainError::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if reloading and retrying may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            DomainError::EventStore(EventStoreError::ConcurrencyConflict { .. })
        )
    }
}
