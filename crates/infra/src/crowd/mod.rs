//! Shared live-task counter store.
//!
//! Crowd counters are shelf-scoped tallies of in-flight human work. They are
//! kept in an externally shared, atomically-incrementable store so that
//! horizontally scaled instances see the same congestion signal — and they
//! are explicitly **advisory**: eventually consistent, reset-tolerant, and
//! never allowed to gate a weight/state transaction.

use thiserror::Error;

use harvesthub_core::ShelfId;
use harvesthub_warehouse::{CrowdCounters, CrowdKind};

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis_counters;

pub use in_memory::InMemoryCrowdStore;
#[cfg(feature = "redis")]
pub use redis_counters::RedisCrowdStore;

#[derive(Debug, Error)]
pub enum CrowdStoreError {
    #[error("counter store connection error: {0}")]
    Connection(String),

    #[error("counter store command error: {0}")]
    Command(String),
}

/// Shelf-scoped live-task counters with atomic increments.
///
/// Implementations must saturate at zero rather than go negative, and may
/// lose counts on restart; consumers treat the data as best-effort.
pub trait CrowdStore: Send + Sync {
    /// Apply a delta to one counter and return the shelf's counters after.
    fn bump(
        &self,
        shelf_id: ShelfId,
        kind: CrowdKind,
        delta: i32,
    ) -> Result<CrowdCounters, CrowdStoreError>;

    /// Read the shelf's counters (zeroes when nothing was recorded).
    fn counters(&self, shelf_id: ShelfId) -> Result<CrowdCounters, CrowdStoreError>;
}

impl<C> CrowdStore for std::sync::Arc<C>
where
    C: CrowdStore + ?Sized,
{
    fn bump(
        &self,
        shelf_id: ShelfId,
        kind: CrowdKind,
        delta: i32,
    ) -> Result<CrowdCounters, CrowdStoreError> {
        (**self).bump(shelf_id, kind, delta)
    }

    fn counters(&self, shelf_id: ShelfId) -> Result<CrowdCounters, CrowdStoreError> {
        (**self).counters(shelf_id)
    }
}
