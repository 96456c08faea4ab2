//! Domain layer of the order lifecycle engine.
//!
//! This crate provides:
//! - The order status transition table and the item-to-order status aggregator
//! - Event-sourced aggregates for orders, return requests, wallets and stock
//! - A unit of work that commits several aggregates atomically
//! - Services exposing the lifecycle operations to callers

pub mod aggregate;
pub mod aggregation;
pub mod config;
pub mod error;
pub mod inventory;
pub mod order;
pub mod returns;
pub mod service;
pub mod status;
pub mod unit_of_work;
pub mod value_objects;
pub mod wallet;

pub use aggregate::{Aggregate, DomainEvent};
pub use aggregation::{aggregate_order_status, aggregate_payment_status};
pub use config::LifecycleConfig;
pub use error::{DomainError, ErrorKind};
pub use inventory::{ProductStock, StockChangeReason, StockError, StockEvent};
pub use order::{Order, OrderError, OrderEvent, OrderItem, StatusHistoryEntry};
pub use returns::{
    RefundStatus, ReturnError, ReturnEvent, ReturnReason, ReturnReasonCode, ReturnRequest,
    ReturnStatus,
};
pub use service::{InventoryService, LifecycleOutcome, OrderLifecycleService, WalletService};
pub use status::{
    OrderStatus, PaymentMethod, PaymentStatus, format_status_list, get_valid_transitions,
    is_valid_status_transition,
};
pub use unit_of_work::UnitOfWork;
pub use value_objects::{Money, OrderLine};
pub use wallet::{
    TransactionKind, TransactionStatus, Wallet, WalletError, WalletEvent, WalletTransaction,
};
