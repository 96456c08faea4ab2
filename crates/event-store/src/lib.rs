//! Event storage for the order lifecycle engine.
//!
//! Aggregates persist as ordered event streams. A [`Transaction`] groups
//! appends to several streams and commits them all-or-nothing, each stream
//! guarded by the version it was computed from.

pub mod error;
pub mod event;
pub mod memory;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventId, Version};
pub use memory::InMemoryEventStore;
pub use store::{AppendOptions, EventStore, EventStoreExt, EventStream, StreamAppend, Transaction};
