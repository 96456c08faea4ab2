use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, Result, Version,
    store::{EventStore, EventStream, Transaction},
};

/// In-memory event store.
///
/// A single write lock covers the whole commit, so every stream in a
/// transaction is checked and written as one step. Commits touching a
/// configured aggregate type can be made to fail, which lets tests observe
/// that an aborted transaction leaves no trace.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    events: Arc<RwLock<Vec<EventEnvelope>>>,
    failing_types: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }

    /// Makes every commit that writes to the given aggregate type abort.
    pub async fn fail_commits_touching(&self, aggregate_type: impl Into<String>) {
        self.failing_types
            .write()
            .await
            .insert(aggregate_type.into());
    }

    /// Removes all injected commit failures.
    pub async fn clear_commit_failures(&self) {
        self.failing_types.write().await.clear();
    }

    fn current_version(store: &[EventEnvelope], aggregate_id: AggregateId) -> Version {
        store
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .map(|e| e.version)
            .max()
            .unwrap_or(Version::initial())
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn commit(&self, transaction: Transaction) -> Result<Vec<Version>> {
        transaction.validate()?;

        {
            let failing = self.failing_types.read().await;
            if let Some(kind) = failing.iter().find(|kind| transaction.touches(kind)) {
                metrics::counter!("event_store_commits_aborted").increment(1);
                return Err(EventStoreError::TransactionAborted {
                    reason: format!("storage refused write to {kind} stream"),
                });
            }
        }

        let mut store = self.events.write().await;

        for append in transaction.appends() {
            let current = Self::current_version(&store, append.aggregate_id);

            if let Some(expected) = append.options.expected_version
                && current != expected
            {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id: append.aggregate_id,
                    expected,
                    actual: current,
                });
            }

            // Simulates the unique (aggregate_id, version) constraint.
            let first_new = append.events[0].version;
            if first_new != current.next() {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id: append.aggregate_id,
                    expected: append.options.expected_version.unwrap_or(current),
                    actual: current,
                });
            }
        }

        let streams = transaction.appends().len();
        let mut versions = Vec::with_capacity(streams);
        for append in transaction.into_appends() {
            versions.push(
                append
                    .events
                    .last()
                    .map(|e| e.version)
                    .unwrap_or(Version::initial()),
            );
            store.extend(append.events);
        }

        tracing::trace!(streams, "transaction committed");
        Ok(versions)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let store = self.events.read().await;
        let mut events: Vec<_> = store
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let store = self.events.read().await;
        Ok(store
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .map(|e| e.version)
            .max())
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::stream;

        // Commit order is insertion order; no re-sorting by timestamp.
        let events = self.events.read().await.clone();
        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AppendOptions, EventStoreExt};

    fn event(aggregate_id: AggregateId, aggregate_type: &str, version: i64) -> EventEnvelope {
        EventEnvelope::new(
            aggregate_id,
            aggregate_type,
            "TestEvent",
            Version::new(version),
            &serde_json::json!({"test": true}),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn append_single_stream() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        let version = store
            .append(
                vec![event(id, "Order", 1), event(id, "Order", 2)],
                AppendOptions::expect_new(),
            )
            .await
            .unwrap();

        assert_eq!(version, Version::new(2));
        assert_eq!(store.get_events_for_aggregate(id).await.unwrap().len(), 2);
        assert_eq!(
            store.get_aggregate_version(id).await.unwrap(),
            Some(Version::new(2))
        );
    }

    #[tokio::test]
    async fn stale_expected_version_conflicts() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .append(vec![event(id, "Wallet", 1)], AppendOptions::expect_new())
            .await
            .unwrap();

        let result = store
            .append(vec![event(id, "Wallet", 1)], AppendOptions::expect_new())
            .await;

        assert!(matches!(
            result,
            Err(EventStoreError::ConcurrencyConflict { .. })
        ));
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn conflict_in_one_stream_writes_nothing() {
        let store = InMemoryEventStore::new();
        let wallet = AggregateId::new();
        let order = AggregateId::new();
        store
            .append(vec![event(wallet, "Wallet", 1)], AppendOptions::expect_new())
            .await
            .unwrap();

        let mut tx = Transaction::new();
        tx.append(vec![event(order, "Order", 1)], AppendOptions::expect_new());
        // Wallet was loaded at version 0 but is now at 1.
        tx.append(vec![event(wallet, "Wallet", 1)], AppendOptions::expect_new());

        assert!(store.commit(tx).await.is_err());
        assert!(!store.aggregate_exists(order).await.unwrap());
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn multi_stream_commit_returns_versions_in_order() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();

        let mut tx = Transaction::new();
        tx.append(
            vec![event(a, "Order", 1), event(a, "Order", 2)],
            AppendOptions::expect_new(),
        );
        tx.append(vec![event(b, "ProductStock", 1)], AppendOptions::expect_new());

        let versions = store.commit(tx).await.unwrap();
        assert_eq!(versions, vec![Version::new(2), Version::first()]);
    }

    #[tokio::test]
    async fn injected_failure_aborts_whole_transaction() {
        let store = InMemoryEventStore::new();
        store.fail_commits_touching("Wallet").await;

        let mut tx = Transaction::new();
        tx.append(
            vec![event(AggregateId::new(), "ProductStock", 1)],
            AppendOptions::expect_new(),
        );
        tx.append(
            vec![event(AggregateId::new(), "Wallet", 1)],
            AppendOptions::expect_new(),
        );

        let result = store.commit(tx.clone()).await;
        assert!(matches!(
            result,
            Err(EventStoreError::TransactionAborted { .. })
        ));
        assert_eq!(store.event_count().await, 0);

        store.clear_commit_failures().await;
        assert!(store.commit(tx).await.is_ok());
        assert_eq!(store.event_count().await, 2);
    }

    #[tokio::test]
    async fn stream_all_events_in_commit_order() {
        use futures_util::StreamExt;

        let store = InMemoryEventStore::new();
        let first = AggregateId::new();
        let second = AggregateId::new();
        store
            .append(vec![event(first, "Order", 1)], AppendOptions::new())
            .await
            .unwrap();
        store
            .append(vec![event(second, "Order", 1)], AppendOptions::new())
            .await
            .unwrap();

        let events: Vec<_> = store.stream_all_events().await.unwrap().collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().aggregate_id, first);
    }
}
