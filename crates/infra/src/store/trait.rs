use serde::{Deserialize, Serialize};
use thiserror::Error;

use harvesthub_core::{CenterId, ContainerCode, ExpectedVersion, ShelfId, Weight};
use harvesthub_warehouse::{ContainerRecord, ShelfRecord, ShelfType};

/// Warehouse store operation error.
///
/// These are **infrastructure errors** (storage, concurrency) as opposed to
/// domain errors (invalid state, capacity). A `Concurrency` error means the
/// whole write set was discarded; the engine retries the operation from a
/// fresh load.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("record serialization failed: {0}")]
    Serialization(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// The records one atomic operation intends to persist, each paired with the
/// version it was loaded at.
///
/// A write set commits **all or nothing**: if any record's stored version no
/// longer matches its expectation, nothing in the set is applied and the
/// commit fails with [`StoreError::Concurrency`]. This is what makes a
/// placement or consumption — one container plus one or more shelves — a
/// single atomic transaction regardless of the backing store.
#[derive(Debug, Clone, Default)]
pub struct WriteSet {
    containers: Vec<(ContainerRecord, ExpectedVersion)>,
    shelves: Vec<(ShelfRecord, ExpectedVersion)>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a container snapshot, expected at the version it was loaded at.
    pub fn with_container(mut self, record: ContainerRecord, expected: ExpectedVersion) -> Self {
        self.containers.push((record, expected));
        self
    }

    /// Stage a shelf snapshot, expected at the version it was loaded at.
    pub fn with_shelf(mut self, record: ShelfRecord, expected: ExpectedVersion) -> Self {
        self.shelves.push((record, expected));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty() && self.shelves.is_empty()
    }

    pub fn containers(&self) -> &[(ContainerRecord, ExpectedVersion)] {
        &self.containers
    }

    pub fn shelves(&self) -> &[(ShelfRecord, ExpectedVersion)] {
        &self.shelves
    }

    pub fn into_parts(
        self,
    ) -> (
        Vec<(ContainerRecord, ExpectedVersion)>,
        Vec<(ShelfRecord, ExpectedVersion)>,
    ) {
        (self.containers, self.shelves)
    }
}

/// Transactional multi-record warehouse store.
///
/// ## Design Principles
///
/// - **No storage assumptions**: works with the in-memory implementation
///   (tests/dev) and the Postgres backend (production)
/// - **Snapshot reads**: loads return owned record clones; mutations happen
///   on the clones and come back through [`WarehouseStore::commit`]
/// - **Optimistic locking**: every committed record carries an
///   [`ExpectedVersion`]; a mismatch anywhere aborts the whole write set
/// - **Stable shelf order**: `shelves_by_type` returns registration order,
///   which the placement allocator uses as its final tie-break
///
/// ## Implementation Requirements
///
/// Implementations must:
/// - apply a write set atomically (all records or none)
/// - bump each committed record's version by exactly one
/// - serialize concurrent commits touching the same record (version check)
/// - reject duplicate inserts with [`StoreError::Duplicate`]
pub trait WarehouseStore: Send + Sync {
    /// Insert a newly registered container. Fails on duplicate `(center,
    /// code)`.
    fn insert_container(&self, record: ContainerRecord) -> Result<(), StoreError>;

    /// Insert an administratively created shelf. Fails on duplicate
    /// `(center, shelf_id)`.
    fn insert_shelf(&self, record: ShelfRecord) -> Result<(), StoreError>;

    /// Load one container by center + code.
    fn container(
        &self,
        center_id: CenterId,
        code: ContainerCode,
    ) -> Result<Option<ContainerRecord>, StoreError>;

    /// Load one container by code alone (the code is globally unique).
    fn find_container(&self, code: ContainerCode) -> Result<Option<ContainerRecord>, StoreError>;

    /// Load one shelf by center + id.
    fn shelf(
        &self,
        center_id: CenterId,
        shelf_id: ShelfId,
    ) -> Result<Option<ShelfRecord>, StoreError>;

    /// Load all shelves of one type in a center, in registration order.
    fn shelves_by_type(
        &self,
        center_id: CenterId,
        shelf_type: ShelfType,
    ) -> Result<Vec<ShelfRecord>, StoreError>;

    /// Atomically apply a write set (all records or none), bumping each
    /// record's version.
    fn commit(&self, write_set: WriteSet) -> Result<(), StoreError>;
}

impl<S> WarehouseStore for std::sync::Arc<S>
where
    S: WarehouseStore + ?Sized,
{
    fn insert_container(&self, record: ContainerRecord) -> Result<(), StoreError> {
        (**self).insert_container(record)
    }

    fn insert_shelf(&self, record: ShelfRecord) -> Result<(), StoreError> {
        (**self).insert_shelf(record)
    }

    fn container(
        &self,
        center_id: CenterId,
        code: ContainerCode,
    ) -> Result<Option<ContainerRecord>, StoreError> {
        (**self).container(center_id, code)
    }

    fn find_container(&self, code: ContainerCode) -> Result<Option<ContainerRecord>, StoreError> {
        (**self).find_container(code)
    }

    fn shelf(
        &self,
        center_id: CenterId,
        shelf_id: ShelfId,
    ) -> Result<Option<ShelfRecord>, StoreError> {
        (**self).shelf(center_id, shelf_id)
    }

    fn shelves_by_type(
        &self,
        center_id: CenterId,
        shelf_type: ShelfType,
    ) -> Result<Vec<ShelfRecord>, StoreError> {
        (**self).shelves_by_type(center_id, shelf_type)
    }

    fn commit(&self, write_set: WriteSet) -> Result<(), StoreError> {
        (**self).commit(write_set)
    }
}

/// Occupancy summary of one shelf, for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelfOccupancySummary {
    pub shelf_id: ShelfId,
    pub shelf_type: ShelfType,
    pub occupied_slots: u32,
    pub total_slots: u32,
    pub current_weight: Weight,
    pub max_weight: Weight,
}

impl From<&ShelfRecord> for ShelfOccupancySummary {
    fn from(shelf: &ShelfRecord) -> Self {
        Self {
            shelf_id: shelf.shelf_id(),
            shelf_type: shelf.shelf_type(),
            occupied_slots: shelf.occupied_slots(),
            total_slots: shelf.total_slots(),
            current_weight: shelf.current_weight(),
            max_weight: shelf.max_weight(),
        }
    }
}

/// Read-side occupancy query, for dashboard endpoints.
#[async_trait::async_trait]
pub trait OccupancyQuery {
    async fn shelf_occupancy(
        &self,
        center_id: CenterId,
    ) -> Result<Vec<ShelfOccupancySummary>, StoreError>;
}
