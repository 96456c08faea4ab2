use std::collections::HashSet;
use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{AggregateId, EventEnvelope, EventStoreError, Result, Version};

/// Concurrency expectations for one stream in a commit.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppendOptions {
    /// Version the stream must be at for the append to succeed.
    /// If None, no version check is performed.
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    /// Creates options with no version check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expects the stream to be at a specific version.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Expects the stream to not exist yet.
    pub fn expect_new() -> Self {
        Self::expect_version(Version::initial())
    }
}

/// Events destined for a single stream within a [`Transaction`].
#[derive(Debug, Clone)]
pub struct StreamAppend {
    pub aggregate_id: AggregateId,
    pub options: AppendOptions,
    pub events: Vec<EventEnvelope>,
}

/// A set of stream appends committed all-or-nothing.
///
/// Every stream's expectation is checked before anything is written; a single
/// conflict or a storage fault leaves every stream untouched.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    appends: Vec<StreamAppend>,
}

impl Transaction {
    /// Creates an empty transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds events for one stream.
    pub fn append(&mut self, events: Vec<EventEnvelope>, options: AppendOptions) {
        if let Some(first) = events.first() {
            self.appends.push(StreamAppend {
                aggregate_id: first.aggregate_id,
                options,
                events,
            });
        }
    }

    /// Returns the staged stream appends.
    pub fn appends(&self) -> &[StreamAppend] {
        &self.appends
    }

    /// Consumes the transaction, returning its stream appends.
    pub fn into_appends(self) -> Vec<StreamAppend> {
        self.appends
    }

    /// Returns true when nothing was staged.
    pub fn is_empty(&self) -> bool {
        self.appends.is_empty()
    }

    /// Total number of events across all streams.
    pub fn event_count(&self) -> usize {
        self.appends.iter().map(|a| a.events.len()).sum()
    }

    /// Returns true if any stream in the transaction belongs to the given aggregate type.
    pub fn touches(&self, aggregate_type: &str) -> bool {
        self.appends
            .iter()
            .flat_map(|a| a.events.iter())
            .any(|e| e.aggregate_type == aggregate_type)
    }

    /// Checks the transaction's structure before it reaches storage.
    pub fn validate(&self) -> Result<()> {
        if self.appends.is_empty() {
            return Err(EventStoreError::InvalidAppend(
                "Cannot commit an empty transaction".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for append in &self.appends {
            if !seen.insert(append.aggregate_id) {
                return Err(EventStoreError::InvalidAppend(format!(
                    "Aggregate {} appears twice in one transaction",
                    append.aggregate_id
                )));
            }
            validate_stream(append)?;
        }
        Ok(())
    }
}

fn validate_stream(append: &StreamAppend) -> Result<()> {
    let Some(first) = append.events.first() else {
        return Err(EventStoreError::InvalidAppend(format!(
            "Empty event list for aggregate {}",
            append.aggregate_id
        )));
    };

    let mut expected_version = first.version;
    for (index, event) in append.events.iter().enumerate() {
        if event.aggregate_id != append.aggregate_id || event.aggregate_type != first.aggregate_type
        {
            return Err(EventStoreError::InvalidAppend(format!(
                "Mixed aggregates in stream append for {}",
                append.aggregate_id
            )));
        }
        if index > 0 {
            expected_version = expected_version.next();
            if event.version != expected_version {
                return Err(EventStoreError::InvalidAppend(format!(
                    "Event versions must be sequential. Expected {}, got {}",
                    expected_version, event.version
                )));
            }
        }
    }
    Ok(())
}

/// A stream of events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Core trait for event store implementations.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Commits every stream append in the transaction atomically.
    ///
    /// Returns the new version of each stream, in the order they were staged.
    async fn commit(&self, transaction: Transaction) -> Result<Vec<Version>>;

    /// Retrieves all events for a specific aggregate in version order.
    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>>;

    /// Gets the current version of an aggregate, or None if it has no events.
    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;

    /// Streams every stored event in commit order.
    async fn stream_all_events(&self) -> Result<EventStream>;
}

/// Convenience methods available on every event store.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Appends events to a single stream.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        let mut transaction = Transaction::new();
        transaction.append(events, options);
        let versions = self.commit(transaction).await?;
        Ok(versions.first().copied().unwrap_or_default())
    }

    /// Checks if an aggregate has any events.
    async fn aggregate_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.get_aggregate_version(aggregate_id).await?.is_some())
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}
