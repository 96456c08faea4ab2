//! Read models fed from the event store.
//!
//! - [`Projection`] turns stored events into read model state
//! - [`ReadModel`] gives query access to that state
//! - [`ProjectionProcessor`] replays the store into registered projections
//! - [`OrderTimelineView`] and [`ReturnRequestsView`] back the order detail
//!   page and the admin return queue

pub mod error;
pub mod processor;
pub mod projection;
pub mod read_model;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition};
pub use read_model::ReadModel;
pub use views::{
    OrderTimeline, OrderTimelineView, ReturnRequestSummary, ReturnRequestsView, TimelineEntry,
    TimelineItem, TimelineScope,
};
