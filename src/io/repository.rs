//! Repository interface for stores, geofences, orders and raw events

use crate::domain::types::{Geofence, IncomingEvent, Order, Store};
use crate::io::jsonl::JsonlError;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("event log write failed: {0}")]
    EventLog(#[from] JsonlError),

    #[error("Repository backend error: {0}")]
    Backend(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Persistence for order geofence state
///
/// Orders are keyed by `(order_id, store_name)`.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_store(&self, store_name: &str) -> RepositoryResult<Option<Store>>;

    /// Geofences for a store, in the backend's stable order
    async fn get_geofences_by_store(&self, store_name: &str) -> RepositoryResult<Vec<Geofence>>;

    async fn get_order(&self, order_id: &str, store_name: &str)
        -> RepositoryResult<Option<Order>>;

    /// Unconditional full upsert of the order document
    async fn save_order(&self, order: &Order) -> RepositoryResult<()>;

    /// Write `order` only if the stored revision still equals
    /// `expected_revision` (`None` = no stored order).
    ///
    /// Returns `false` on a revision mismatch without writing. Backends that
    /// cannot compare-and-swap fall back to a plain upsert, which restores
    /// last-write-wins semantics.
    async fn compare_and_save_order(
        &self,
        order: &Order,
        expected_revision: Option<u64>,
    ) -> RepositoryResult<bool> {
        let _ = expected_revision;
        self.save_order(order).await?;
        Ok(true)
    }

    /// Append the raw event to the audit history
    async fn insert_event(&self, event: &IncomingEvent) -> RepositoryResult<()>;
}
