use std::collections::HashMap;
use std::sync::RwLock;

use harvesthub_core::{CenterId, ContainerCode, ShelfId, VersionedRecord};
use harvesthub_warehouse::{ContainerRecord, ShelfRecord, ShelfType};

use super::r#trait::{
    OccupancyQuery, ShelfOccupancySummary, StoreError, WarehouseStore, WriteSet,
};

#[derive(Debug, Default)]
struct Inner {
    containers: HashMap<(CenterId, ContainerCode), ContainerRecord>,
    shelves: HashMap<(CenterId, ShelfId), ShelfRecord>,
    /// Registration order, the allocator's final tie-break.
    shelf_order: Vec<(CenterId, ShelfId)>,
}

/// In-memory warehouse store.
///
/// Intended for tests/dev. A single `RwLock` over all records gives write
/// sets true all-or-nothing semantics: versions are verified for every
/// record before anything is applied.
#[derive(Debug, Default)]
pub struct InMemoryWarehouseStore {
    inner: RwLock<Inner>,
}

impl InMemoryWarehouseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

impl WarehouseStore for InMemoryWarehouseStore {
    fn insert_container(&self, record: ContainerRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        let key = (record.center_id(), record.code());
        if inner.containers.contains_key(&key) {
            return Err(StoreError::Duplicate(format!(
                "container {} already registered",
                record.code()
            )));
        }
        inner.containers.insert(key, record);
        Ok(())
    }

    fn insert_shelf(&self, record: ShelfRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        let key = (record.center_id(), record.shelf_id());
        if inner.shelves.contains_key(&key) {
            return Err(StoreError::Duplicate(format!(
                "shelf {} already registered",
                record.shelf_id()
            )));
        }
        inner.shelf_order.push(key);
        inner.shelves.insert(key, record);
        Ok(())
    }

    fn container(
        &self,
        center_id: CenterId,
        code: ContainerCode,
    ) -> Result<Option<ContainerRecord>, StoreError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.containers.get(&(center_id, code)).cloned())
    }

    fn find_container(&self, code: ContainerCode) -> Result<Option<ContainerRecord>, StoreError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner
            .containers
            .values()
            .find(|c| c.code() == code)
            .cloned())
    }

    fn shelf(
        &self,
        center_id: CenterId,
        shelf_id: ShelfId,
    ) -> Result<Option<ShelfRecord>, StoreError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.shelves.get(&(center_id, shelf_id)).cloned())
    }

    fn shelves_by_type(
        &self,
        center_id: CenterId,
        shelf_type: ShelfType,
    ) -> Result<Vec<ShelfRecord>, StoreError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner
            .shelf_order
            .iter()
            .filter(|(center, _)| *center == center_id)
            .filter_map(|key| inner.shelves.get(key))
            .filter(|shelf| shelf.shelf_type() == shelf_type)
            .cloned()
            .collect())
    }

    fn commit(&self, write_set: WriteSet) -> Result<(), StoreError> {
        if write_set.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.write().map_err(|_| poisoned())?;

        // Verify every expectation before applying anything.
        for (record, expected) in write_set.containers() {
            let key = (record.center_id(), record.code());
            let stored = inner.containers.get(&key).ok_or_else(|| {
                StoreError::NotFound(format!("container {} is not registered", record.code()))
            })?;
            if !expected.matches(stored.version()) {
                return Err(StoreError::Concurrency(format!(
                    "container {}: expected {:?}, found {}",
                    record.code(),
                    expected,
                    stored.version()
                )));
            }
        }
        for (record, expected) in write_set.shelves() {
            let key = (record.center_id(), record.shelf_id());
            let stored = inner.shelves.get(&key).ok_or_else(|| {
                StoreError::NotFound(format!("shelf {} is not registered", record.shelf_id()))
            })?;
            if !expected.matches(stored.version()) {
                return Err(StoreError::Concurrency(format!(
                    "shelf {}: expected {:?}, found {}",
                    record.shelf_id(),
                    expected,
                    stored.version()
                )));
            }
        }

        // All checks passed: apply the whole set under the same write lock.
        let (containers, shelves) = write_set.into_parts();
        for (mut record, _) in containers {
            record.touch();
            inner
                .containers
                .insert((record.center_id(), record.code()), record);
        }
        for (mut record, _) in shelves {
            record.touch();
            inner
                .shelves
                .insert((record.center_id(), record.shelf_id()), record);
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl OccupancyQuery for InMemoryWarehouseStore {
    async fn shelf_occupancy(
        &self,
        center_id: CenterId,
    ) -> Result<Vec<ShelfOccupancySummary>, StoreError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner
            .shelf_order
            .iter()
            .filter(|(center, _)| *center == center_id)
            .filter_map(|key| inner.shelves.get(key))
            .map(ShelfOccupancySummary::from)
            .collect())
    }
}
