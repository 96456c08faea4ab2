//! Query-side access to projected state.

/// A queryable view kept current by a [`Projection`](crate::Projection).
pub trait ReadModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Number of top-level records (orders, return requests) held.
    fn count(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.count() == 0
    }
}
