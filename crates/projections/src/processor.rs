//! Feeds stored events to projections.

use event_store::{EventEnvelope, EventStore};
use futures_util::StreamExt;

use crate::Result;
use crate::projection::Projection;

/// Delivers events from an event store to registered projections.
///
/// Catch-up replays the whole store in commit order; a projection only sees
/// events past its own position, so repeated catch-ups are idempotent.
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    projections: Vec<Box<dyn Projection>>,
}

impl<S: EventStore> ProjectionProcessor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
        }
    }

    /// Registers a projection. Views are cheap handles over shared state, so
    /// callers usually register a clone and keep querying the original.
    pub fn register(&mut self, projection: impl Projection + 'static) {
        self.projections.push(Box::new(projection));
    }

    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Streams every stored event to each projection that has not seen it yet.
    ///
    /// Returns the number of events in the store.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<u64> {
        let mut stream = self.store.stream_all_events().await?;
        let mut event_index: u64 = 0;

        while let Some(result) = stream.next().await {
            let event = result?;
            event_index += 1;

            for projection in &self.projections {
                if projection.position().await.has_seen(event_index) {
                    continue;
                }
                if let Err(err) = projection.handle(&event).await {
                    tracing::error!(
                        projection = projection.name(),
                        event_type = %event.event_type,
                        error = %err,
                        "projection failed"
                    );
                    return Err(err);
                }
                metrics::counter!("projections_events_processed", "projection" => projection.name())
                    .increment(1);
            }
        }

        tracing::info!(events = event_index, "catch-up complete");
        Ok(event_index)
    }

    /// Delivers one freshly committed event to every projection.
    #[tracing::instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub async fn process_event(&self, event: &EventEnvelope) -> Result<()> {
        for projection in &self.projections {
            projection.handle(event).await?;
        }
        Ok(())
    }

    /// Resets every projection and replays the store from the start.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<u64> {
        for projection in &self.projections {
            projection.reset().await?;
        }
        self.run_catch_up().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::ProjectionPosition;
    use async_trait::async_trait;
    use common::AggregateId;
    use event_store::{AppendOptions, EventStoreExt, InMemoryEventStore, Version};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    /// Counts every event it is handed.
    #[derive(Clone)]
    struct CountingProjection {
        count: Arc<RwLock<u64>>,
        position: Arc<RwLock<ProjectionPosition>>,
    }

    impl CountingProjection {
        fn new() -> Self {
            Self {
                count: Arc::new(RwLock::new(0)),
                position: Arc::new(RwLock::new(ProjectionPosition::zero())),
            }
        }

        async fn count(&self) -> u64 {
            *self.count.read().await
        }
    }

    #[async_trait]
    impl Projection for CountingProjection {
        fn name(&self) -> &'static str {
            "CountingProjection"
        }

        async fn handle(&self, _event: &EventEnvelope) -> Result<()> {
            *self.count.write().await += 1;
            let mut pos = self.position.write().await;
            *pos = pos.advance();
            Ok(())
        }

        async fn position(&self) -> ProjectionPosition {
            *self.position.read().await
        }

        async fn reset(&self) -> Result<()> {
            *self.count.write().await = 0;
            *self.position.write().await = ProjectionPosition::zero();
            Ok(())
        }
    }

    async fn seed(store: &InMemoryEventStore, events: i64) {
        let aggregate_id = AggregateId::new();
        let envelopes = (1..=events)
            .map(|v| {
                EventEnvelope::new(
                    aggregate_id,
                    "Wallet",
                    "WalletCredited",
                    Version::new(v),
                    &serde_json::json!({"seq": v}),
                )
                .unwrap()
            })
            .collect();
        store
            .append(envelopes, AppendOptions::expect_new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_catch_up_processes_all_events() {
        let store = InMemoryEventStore::new();
        seed(&store, 3).await;

        let projection = CountingProjection::new();
        let mut processor = ProjectionProcessor::new(store);
        processor.register(projection.clone());

        assert_eq!(processor.run_catch_up().await.unwrap(), 3);
        assert_eq!(projection.count().await, 3);
    }

    #[tokio::test]
    async fn test_catch_up_skips_already_processed() {
        let store = InMemoryEventStore::new();
        seed(&store, 3).await;

        let projection = CountingProjection::new();
        let mut processor = ProjectionProcessor::new(store.clone());
        processor.register(projection.clone());

        processor.run_catch_up().await.unwrap();
        seed(&store, 2).await;
        processor.run_catch_up().await.unwrap();

        assert_eq!(projection.count().await, 5);
        assert_eq!(projection.position().await.events_processed, 5);
    }

    #[tokio::test]
    async fn test_process_single_event() {
        let projection = CountingProjection::new();
        let mut processor = ProjectionProcessor::new(InMemoryEventStore::new());
        processor.register(projection.clone());

        let event = EventEnvelope::new(
            AggregateId::new(),
            "Order",
            "OrderPlaced",
            Version::first(),
            &serde_json::json!({}),
        )
        .unwrap();
        processor.process_event(&event).await.unwrap();

        assert_eq!(projection.count().await, 1);
    }

    #[tokio::test]
    async fn test_rebuild_resets_and_replays() {
        let store = InMemoryEventStore::new();
        seed(&store, 2).await;

        let projection = CountingProjection::new();
        let mut processor = ProjectionProcessor::new(store);
        processor.register(projection.clone());

        processor.run_catch_up().await.unwrap();
        processor.rebuild_all().await.unwrap();

        assert_eq!(projection.count().await, 2);
        assert_eq!(projection.position().await.events_processed, 2);
    }

    #[tokio::test]
    async fn test_empty_store_catch_up() {
        let projection = CountingProjection::new();
        let mut processor = ProjectionProcessor::new(InMemoryEventStore::new());
        processor.register(projection.clone());

        assert_eq!(processor.run_catch_up().await.unwrap(), 0);
        assert_eq!(projection.count().await, 0);
    }

    #[tokio::test]
    async fn test_late_projection_catches_up_alone() {
        let store = InMemoryEventStore::new();
        seed(&store, 2).await;

        let early = CountingProjection::new();
        let late = CountingProjection::new();
        let mut processor = ProjectionProcessor::new(store);
        processor.register(early.clone());
        processor.run_catch_up().await.unwrap();

        processor.register(late.clone());
        processor.run_catch_up().await.unwrap();

        assert_eq!(processor.projection_count(), 2);
        assert_eq!(early.count().await, 2);
        assert_eq!(late.count().await, 2);
    }
}
