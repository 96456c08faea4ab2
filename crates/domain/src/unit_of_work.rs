//! Loading aggregates and committing their events across streams.

use std::future::Future;
use std::time::Instant;

use common::AggregateId;
use event_store::{AppendOptions, EventEnvelope, EventStore, Transaction, Version};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::error::DomainError;

/// Rebuilds an aggregate from its stream.
///
/// A stream with no events yields `A::default()`.
pub async fn load<S, A>(store: &S, aggregate_id: AggregateId) -> Result<A, DomainError>
where
    S: EventStore + ?Sized,
    A: Aggregate,
{
    let mut aggregate = A::default();
    for envelope in store.get_events_for_aggregate(aggregate_id).await? {
        let event: A::Event = envelope.decode()?;
        aggregate.apply(event);
        aggregate.set_version(envelope.version);
    }
    Ok(aggregate)
}

/// Loads an aggregate that must already exist.
pub async fn load_existing<S, A>(store: &S, aggregate_id: AggregateId) -> Result<A, DomainError>
where
    S: EventStore + ?Sized,
    A: Aggregate,
{
    let aggregate: A = load(store, aggregate_id).await?;
    if !aggregate.exists() {
        return Err(DomainError::not_found(A::aggregate_type(), aggregate_id));
    }
    Ok(aggregate)
}

struct StagedStream {
    aggregate_id: AggregateId,
    expected: Version,
    envelopes: Vec<EventEnvelope>,
}

/// Collects events for several aggregates and commits them as one
/// transaction.
///
/// Each stream is guarded by the version its aggregate had when it was first
/// recorded here. Dropping the unit of work without committing discards
/// everything staged.
pub struct UnitOfWork<'a, S: EventStore + ?Sized> {
    store: &'a S,
    streams: Vec<StagedStream>,
}

impl<'a, S: EventStore + ?Sized> UnitOfWork<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            streams: Vec::new(),
        }
    }

    /// Rebuilds an aggregate from the store this unit of work commits to.
    pub async fn load<A: Aggregate>(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        load(self.store, aggregate_id).await
    }

    /// Loads an aggregate that must already exist.
    pub async fn load_existing<A: Aggregate>(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<A, DomainError> {
        load_existing(self.store, aggregate_id).await
    }

    /// Applies `events` to `aggregate` and stages them for its stream.
    ///
    /// Recording the same aggregate again continues its stream, so the caller
    /// must keep using the instance it recorded with.
    pub fn record<A: Aggregate>(
        &mut self,
        aggregate: &mut A,
        aggregate_id: AggregateId,
        events: Vec<A::Event>,
    ) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }

        let start = aggregate.version();
        let mut version = start;
        let mut envelopes = Vec::with_capacity(events.len());
        for event in &events {
            version = version.next();
            envelopes.push(EventEnvelope::new(
                aggregate_id,
                A::aggregate_type(),
                event.event_type(),
                version,
                event,
            )?);
        }

        aggregate.apply_events(events);
        aggregate.set_version(version);

        match self
            .streams
            .iter_mut()
            .find(|s| s.aggregate_id == aggregate_id)
        {
            Some(stream) => stream.envelopes.extend(envelopes),
            None => self.streams.push(StagedStream {
                aggregate_id,
                expected: start,
                envelopes,
            }),
        }
        Ok(())
    }

    /// Returns the number of events staged across all streams.
    pub fn staged_events(&self) -> usize {
        self.streams.iter().map(|s| s.envelopes.len()).sum()
    }

    /// Commits every staged stream atomically.
    pub async fn commit(self) -> Result<(), DomainError> {
        if self.streams.is_empty() {
            return Ok(());
        }

        let mut transaction = Transaction::new();
        for stream in self.streams {
            transaction.append(stream.envelopes, AppendOptions::expect_version(stream.expected));
        }

        let started = Instant::now();
        let result = self.store.commit(transaction).await;
        metrics::histogram!("unit_of_work_commit_seconds").record(started.elapsed().as_secs_f64());

        result?;
        Ok(())
    }
}

/// Runs `attempt` until it stops hitting concurrency conflicts.
///
/// Each attempt must reload its aggregates. After `max_attempts` conflicts the
/// operation fails with [`DomainError::Conflict`].
pub async fn retry_on_conflict<T, F, Fut>(
    operation: &'static str,
    max_attempts: u32,
    mut attempt: F,
) -> Result<T, DomainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DomainError>>,
{
    let max_attempts = max_attempts.max(1);
    for n in 1..=max_attempts {
        match attempt().await {
            Err(e) if e.is_conflict() => {
                metrics::counter!("unit_of_work_conflicts_total", "operation" => operation)
                    .increment(1);
                tracing::warn!(operation, attempt = n, error = %e, "commit conflict, retrying");
            }
            other => return other,
        }
    }
    Err(DomainError::Conflict {
        attempts: max_attempts,
    })
}
