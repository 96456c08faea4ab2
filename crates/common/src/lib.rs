//! Identifier types shared by the store, the domain and the read models.

mod types;

pub use types::{AggregateId, ItemId, ProductId, UserId};
