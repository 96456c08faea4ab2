//! Read model views for the query side.

pub mod order_timeline;
pub mod return_requests;

pub use order_timeline::{
    OrderTimeline, OrderTimelineView, TimelineEntry, TimelineItem, TimelineScope,
};
pub use return_requests::{ReturnRequestSummary, ReturnRequestsView};
