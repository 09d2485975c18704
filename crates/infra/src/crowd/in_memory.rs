//! In-memory crowd counter store for tests/dev and single-instance runs.

use std::collections::HashMap;
use std::sync::Mutex;

use harvesthub_core::ShelfId;
use harvesthub_warehouse::{CrowdCounters, CrowdKind};

use super::{CrowdStore, CrowdStoreError};

/// Process-local counters. Lost on restart, which the callers tolerate: the
/// signal is advisory.
#[derive(Debug, Default)]
pub struct InMemoryCrowdStore {
    counters: Mutex<HashMap<ShelfId, CrowdCounters>>,
}

impl InMemoryCrowdStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CrowdStore for InMemoryCrowdStore {
    fn bump(
        &self,
        shelf_id: ShelfId,
        kind: CrowdKind,
        delta: i32,
    ) -> Result<CrowdCounters, CrowdStoreError> {
        let mut map = self
            .counters
            .lock()
            .map_err(|_| CrowdStoreError::Command("lock poisoned".to_string()))?;
        let entry = map.entry(shelf_id).or_default();
        entry.bump(kind, delta);
        Ok(*entry)
    }

    fn counters(&self, shelf_id: ShelfId) -> Result<CrowdCounters, CrowdStoreError> {
        let map = self
            .counters
            .lock()
            .map_err(|_| CrowdStoreError::Command("lock poisoned".to_string()))?;
        Ok(map.get(&shelf_id).copied().unwrap_or_default())
    }
}
