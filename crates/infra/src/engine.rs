//! Warehouse operation engine (application-level orchestration).
//!
//! This module implements the **operation execution pattern** for the
//! warehouse records. It orchestrates the full lifecycle of each operation:
//! loading snapshots, applying the pure domain mutation, committing the
//! write set, and publishing events.
//!
//! ## Operation Execution Flow
//!
//! Every state-changing operation runs this pipeline:
//!
//! ```text
//! Operation request
//!   ↓
//! 1. Load record snapshots from the store (container + shelves)
//!   ↓
//! 2. Apply the pure domain mutation to the clones (warehouse crate)
//!   ↓
//! 3. Commit the write set (all records or none, version-guarded)
//!   ↓
//! 4. On optimistic conflict: retry the whole operation (bounded)
//!   ↓
//! 5. Publish operation events to the bus (advisory, best-effort)
//! ```
//!
//! ## Why This Orchestration?
//!
//! - **Atomicity**: a placement touches one container and up to several
//!   shelves; the write-set commit applies them together or not at all
//! - **Serialization**: two operations overlapping on a slot race on the
//!   shelf version; the loser reloads and retries, so last-committer-wins
//!   can never silently drop weight
//! - **Advisory side channels stay outside**: crowd counters are read
//!   before and bumped outside the transaction; the event bus is told only
//!   after commit, and a publish failure is logged and swallowed
//!
//! ## Error Semantics
//!
//! Domain rejections map 1:1 onto `EngineError` variants; store concurrency
//! failures surface as `Conflict` only after the retry budget is exhausted.
//! Every error means the operation left no partial writes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use harvesthub_core::{
    CenterId, ContainerCode, DomainError, ExpectedVersion, ShelfId, SlotId, UserId, VersionedRecord,
    Weight,
};
use harvesthub_events::{Event, EventBus, EventEnvelope, InMemoryEventBus};
use harvesthub_warehouse::{
    ConsumeOutcome, ContainerRecord, ContainerState, CrowdCounters, CrowdKind, CrowdReport,
    LocationFilters, LocationRanking, MoveOutcome, PlacementOutcome, RefillOutcome, ShelfRecord,
    ShelfType, WarehouseEvent, compute_crowd, event, ops, place_remaining, rank_locations,
};

use crate::config::EngineConfig;
use crate::crowd::{CrowdStore, CrowdStoreError, InMemoryCrowdStore};
use crate::store::{InMemoryWarehouseStore, StoreError, WarehouseStore, WriteSet};

#[derive(Debug)]
pub enum EngineError {
    /// Unknown container/shelf/slot id.
    NotFound,
    /// Operation attempted from a state that disallows it.
    InvalidState(String),
    /// Slot or shelf would exceed capacity.
    CapacityExceeded(String),
    /// Consumption/move amount exceeds the weight available.
    InsufficientWeight(String),
    /// Operation spans two different logistics centers.
    CrossCenterMismatch(String),
    /// Malformed/missing required argument.
    BadRequest(String),
    /// Optimistic concurrency conflict (after the retry budget).
    Conflict(String),
    /// Crowd counter store failure (only surfaced by the crowd operations).
    Crowd(String),
    /// Storage backend failure.
    Store(StoreError),
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::NotFound => EngineError::NotFound,
            DomainError::InvalidState(msg) => EngineError::InvalidState(msg),
            DomainError::CapacityExceeded(msg) => EngineError::CapacityExceeded(msg),
            DomainError::InsufficientWeight(msg) => EngineError::InsufficientWeight(msg),
            DomainError::CrossCenterMismatch(msg) => EngineError::CrossCenterMismatch(msg),
            DomainError::BadRequest(msg) => EngineError::BadRequest(msg),
            DomainError::InvalidId(msg) => EngineError::BadRequest(msg),
            DomainError::Conflict(msg) => EngineError::Conflict(msg),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => EngineError::Conflict(msg),
            StoreError::Duplicate(msg) => EngineError::Conflict(msg),
            other => EngineError::Store(other),
        }
    }
}

impl From<CrowdStoreError> for EngineError {
    fn from(value: CrowdStoreError) -> Self {
        EngineError::Crowd(value.to_string())
    }
}

/// All-in-memory engine, for tests/dev wiring.
pub type InMemoryEngine = WarehouseEngine<
    Arc<InMemoryWarehouseStore>,
    Arc<InMemoryEventBus<EventEnvelope<WarehouseEvent>>>,
    Arc<InMemoryCrowdStore>,
>;

/// The warehouse slot-allocation and container-lifecycle engine.
///
/// Generic over the store, event bus and crowd counter implementations so
/// the same operation logic runs against the in-memory wiring (tests/dev)
/// and the Postgres/Redis wiring (production).
#[derive(Debug)]
pub struct WarehouseEngine<S, B, C> {
    store: S,
    bus: B,
    crowd: C,
    config: EngineConfig,
}

impl<S, B, C> WarehouseEngine<S, B, C> {
    pub fn new(store: S, bus: B, crowd: C, config: EngineConfig) -> Self {
        Self {
            store,
            bus,
            crowd,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl<S, B, C> WarehouseEngine<S, B, C>
where
    S: WarehouseStore,
    B: EventBus<EventEnvelope<WarehouseEvent>>,
    C: CrowdStore,
{
    // ---- intake & lifecycle -------------------------------------------------

    /// Create a container record on intake scan (`Arrived`).
    pub fn register_container(
        &self,
        code: ContainerCode,
        center_id: CenterId,
        actor: UserId,
    ) -> Result<ContainerRecord, EngineError> {
        let now = Utc::now();
        let record = ContainerRecord::register(code, center_id, actor, now);
        self.store.insert_container(record.clone())?;

        tracing::info!(code = %code, center_id = %center_id, "container registered");
        self.publish(
            center_id,
            code.to_string(),
            WarehouseEvent::ContainerRegistered(event::ContainerRegistered {
                code,
                center_id,
                occurred_at: now,
            }),
        );
        Ok(record)
    }

    /// Register an administratively created shelf.
    pub fn register_shelf(&self, shelf: ShelfRecord) -> Result<(), EngineError> {
        self.store.insert_shelf(shelf)?;
        Ok(())
    }

    /// Validated single-step lifecycle transition for the non-placement
    /// steps (cleaning, weighing, rejection, packaging, dispatch, ...).
    pub fn advance_container(
        &self,
        code: ContainerCode,
        target: ContainerState,
    ) -> Result<ContainerRecord, EngineError> {
        self.with_retries("advance_container", || {
            let mut container = self.load_container(code)?;
            let from = container.state();
            container.transition_to(target)?;

            let expected = ExpectedVersion::Exact(container.version());
            self.store
                .commit(WriteSet::new().with_container(container.clone(), expected))?;
            container.touch();

            self.publish(
                container.center_id(),
                code.to_string(),
                WarehouseEvent::ContainerStateChanged(event::ContainerStateChanged {
                    code,
                    from,
                    to: target,
                    occurred_at: Utc::now(),
                }),
            );
            Ok(container)
        })
    }

    /// Fix the container's declared weight during weighing and advance it to
    /// `Weighed`.
    pub fn record_weighing(
        &self,
        code: ContainerCode,
        intended: Weight,
    ) -> Result<ContainerRecord, EngineError> {
        self.with_retries("record_weighing", || {
            let mut container = self.load_container(code)?;
            let from = container.state();
            container.record_weighing(intended)?;

            let expected = ExpectedVersion::Exact(container.version());
            self.store
                .commit(WriteSet::new().with_container(container.clone(), expected))?;
            container.touch();

            tracing::info!(code = %code, intended = %intended, "container weighed");
            self.publish(
                container.center_id(),
                code.to_string(),
                WarehouseEvent::ContainerStateChanged(event::ContainerStateChanged {
                    code,
                    from,
                    to: container.state(),
                    occurred_at: Utc::now(),
                }),
            );
            Ok(container)
        })
    }

    // ---- placement ----------------------------------------------------------

    /// Distribute the container's remaining weight across the
    /// least-congested shelves of `shelf_type` in its center.
    ///
    /// `center_id`, when given, must match the container's center; the
    /// record is authoritative.
    pub fn place_remaining_weight(
        &self,
        code: ContainerCode,
        center_id: Option<CenterId>,
        shelf_type: ShelfType,
    ) -> Result<PlacementOutcome, EngineError> {
        self.with_retries("place_remaining_weight", || {
            let now = Utc::now();
            let mut container = self.load_container(code)?;
            if let Some(requested) = center_id {
                if requested != container.center_id() {
                    return Err(EngineError::CrossCenterMismatch(format!(
                        "container {} belongs to another logistics center",
                        code
                    )));
                }
            }
            let center = container.center_id();

            let mut shelves = self.store.shelves_by_type(center, shelf_type)?;
            let congestion = self.congestion_snapshot(&shelves);
            let container_expected = ExpectedVersion::Exact(container.version());

            let outcome =
                place_remaining(&mut container, &mut shelves, shelf_type, &congestion, now)?;

            if outcome.placements.is_empty() {
                // Nothing fit anywhere; nothing to persist. The caller can
                // retry against overflow (warehouse) shelving.
                tracing::info!(code = %code, leftover = %outcome.leftover, "placement found no capacity");
                return Ok(outcome);
            }

            self.reconcile_location(&mut container, &shelves)?;

            let touched: HashSet<ShelfId> =
                outcome.placements.iter().map(|p| p.shelf_id).collect();
            let mut write_set = WriteSet::new().with_container(container, container_expected);
            for shelf in shelves
                .into_iter()
                .filter(|s| touched.contains(&s.shelf_id()))
            {
                let expected = ExpectedVersion::Exact(shelf.version());
                write_set = write_set.with_shelf(shelf, expected);
            }
            self.store.commit(write_set)?;

            tracing::info!(
                code = %code,
                placed = %outcome.placed,
                leftover = %outcome.leftover,
                slots = outcome.placements.len(),
                "weight placed"
            );
            self.publish(
                center,
                code.to_string(),
                WarehouseEvent::WeightPlaced(event::WeightPlaced {
                    code,
                    placed: outcome.placed,
                    leftover: outcome.leftover,
                    placements: outcome.placements.clone(),
                    occurred_at: now,
                }),
            );
            Ok(outcome)
        })
    }

    // ---- consumption / move / refill ---------------------------------------

    /// Record picked weight against one slot.
    pub fn consume_weight(
        &self,
        code: ContainerCode,
        shelf_id: ShelfId,
        slot_id: SlotId,
        amount: Weight,
    ) -> Result<ConsumeOutcome, EngineError> {
        self.with_retries("consume_weight", || {
            let now = Utc::now();
            let mut container = self.load_container(code)?;
            let center = container.center_id();
            let mut shelf = self
                .store
                .shelf(center, shelf_id)?
                .ok_or(EngineError::NotFound)?;

            let container_expected = ExpectedVersion::Exact(container.version());
            let shelf_expected = ExpectedVersion::Exact(shelf.version());

            let outcome = ops::consume_weight(&mut container, &mut shelf, slot_id, amount, now)?;
            self.reconcile_location(&mut container, std::slice::from_ref(&shelf))?;

            self.store.commit(
                WriteSet::new()
                    .with_container(container, container_expected)
                    .with_shelf(shelf, shelf_expected),
            )?;

            tracing::info!(
                code = %code,
                shelf_id = %shelf_id,
                amount = %amount,
                new_total = %outcome.new_total,
                state = %outcome.state,
                "weight consumed"
            );
            self.publish(
                center,
                code.to_string(),
                WarehouseEvent::WeightConsumed(event::WeightConsumed {
                    code,
                    shelf_id,
                    slot_id,
                    amount,
                    new_total: outcome.new_total,
                    occurred_at: now,
                }),
            );
            Ok(outcome)
        })
    }

    /// Relocate the container bound at `from_shelf`/`from_slot` into a free
    /// slot, moving its full weight.
    pub fn move_container(
        &self,
        center_id: CenterId,
        from_shelf: ShelfId,
        from_slot: SlotId,
        to_shelf: ShelfId,
        to_slot: SlotId,
    ) -> Result<MoveOutcome, EngineError> {
        self.with_retries("move_container", || {
            let now = Utc::now();
            let mut source = self
                .store
                .shelf(center_id, from_shelf)?
                .ok_or(EngineError::NotFound)?;
            let code = source
                .slot(from_slot)
                .map_err(EngineError::from)?
                .container()
                .ok_or_else(|| EngineError::InvalidState("source slot is empty".to_string()))?;
            let mut container = self
                .store
                .container(center_id, code)?
                .ok_or(EngineError::NotFound)?;

            let container_expected = ExpectedVersion::Exact(container.version());
            let source_expected = ExpectedVersion::Exact(source.version());

            let mut write_set = WriteSet::new();
            let outcome = if from_shelf == to_shelf {
                let outcome = ops::move_container_within(
                    &mut container,
                    &mut source,
                    from_slot,
                    to_slot,
                    now,
                )?;
                write_set = write_set
                    .with_container(container, container_expected)
                    .with_shelf(source, source_expected);
                outcome
            } else {
                let mut dest = self
                    .store
                    .shelf(center_id, to_shelf)?
                    .ok_or(EngineError::NotFound)?;
                let dest_expected = ExpectedVersion::Exact(dest.version());
                let outcome = ops::move_container(
                    &mut container,
                    &mut source,
                    from_slot,
                    &mut dest,
                    to_slot,
                    now,
                )?;
                write_set = write_set
                    .with_container(container, container_expected)
                    .with_shelf(source, source_expected)
                    .with_shelf(dest, dest_expected);
                outcome
            };
            self.store.commit(write_set)?;

            tracing::info!(
                code = %code,
                from = %from_shelf,
                to = %to_shelf,
                moved = %outcome.moved,
                "container moved"
            );
            self.publish(
                center_id,
                code.to_string(),
                WarehouseEvent::ContainerMoved(event::ContainerMoved {
                    code,
                    from_shelf,
                    from_slot,
                    to_shelf,
                    to_slot,
                    moved: outcome.moved,
                    occurred_at: now,
                }),
            );
            Ok(outcome)
        })
    }

    /// Top up a picker slot from warehouse stock; bindings stay untouched
    /// and any bound container receives an informational audit note.
    #[allow(clippy::too_many_arguments)]
    pub fn refill_from_warehouse(
        &self,
        center_id: CenterId,
        picker_shelf: ShelfId,
        picker_slot: SlotId,
        warehouse_shelf: ShelfId,
        warehouse_slot: SlotId,
        target_fill: Weight,
        actor: UserId,
    ) -> Result<RefillOutcome, EngineError> {
        if picker_shelf == warehouse_shelf {
            return Err(EngineError::BadRequest(
                "picker and warehouse slots must be on different shelves".to_string(),
            ));
        }

        self.with_retries("refill_from_warehouse", || {
            let now = Utc::now();
            let mut picker = self
                .store
                .shelf(center_id, picker_shelf)?
                .ok_or(EngineError::NotFound)?;
            let mut warehouse = self
                .store
                .shelf(center_id, warehouse_shelf)?
                .ok_or(EngineError::NotFound)?;

            let picker_expected = ExpectedVersion::Exact(picker.version());
            let warehouse_expected = ExpectedVersion::Exact(warehouse.version());

            let outcome = ops::refill_from_warehouse(
                &mut picker,
                picker_slot,
                &mut warehouse,
                warehouse_slot,
                target_fill,
            )?;

            if outcome.moved.is_zero() {
                return Ok(outcome);
            }

            let mut write_set = WriteSet::new();
            let mut noted: Vec<ContainerCode> = Vec::new();
            for (shelf, slot_id) in [(&picker, picker_slot), (&warehouse, warehouse_slot)] {
                let Some(bound) = shelf.slot(slot_id).map_err(EngineError::from)?.container()
                else {
                    continue;
                };
                if noted.contains(&bound) {
                    continue;
                }
                noted.push(bound);
                if let Some(mut bound_container) = self.store.container(center_id, bound)? {
                    let expected = ExpectedVersion::Exact(bound_container.version());
                    bound_container.push_audit(
                        actor,
                        format!(
                            "refill moved {} from {}/{} to {}/{}",
                            outcome.moved,
                            warehouse_shelf,
                            warehouse_slot,
                            picker_shelf,
                            picker_slot
                        ),
                        now,
                    );
                    write_set = write_set.with_container(bound_container, expected);
                }
            }
            write_set = write_set
                .with_shelf(picker, picker_expected)
                .with_shelf(warehouse, warehouse_expected);
            self.store.commit(write_set)?;

            tracing::info!(
                picker_shelf = %picker_shelf,
                warehouse_shelf = %warehouse_shelf,
                moved = %outcome.moved,
                "picker slot refilled"
            );
            self.publish(
                center_id,
                picker_shelf.to_string(),
                WarehouseEvent::SlotRefilled(event::SlotRefilled {
                    picker_shelf,
                    picker_slot,
                    warehouse_shelf,
                    warehouse_slot,
                    moved: outcome.moved,
                    occurred_at: now,
                }),
            );
            Ok(outcome)
        })
    }

    // ---- ranking & crowd ----------------------------------------------------

    /// Rank the slots already holding this container by where work should
    /// happen next.
    pub fn find_best_location(
        &self,
        code: ContainerCode,
        filters: &LocationFilters,
    ) -> Result<LocationRanking, EngineError> {
        let container = self.load_container(code)?;
        let center = container.center_id();

        let shelf_ids: HashSet<ShelfId> = container
            .distributed_weights()
            .iter()
            .map(|e| e.shelf_id)
            .collect();
        let mut shelves = Vec::with_capacity(shelf_ids.len());
        for shelf_id in shelf_ids {
            if let Some(shelf) = self.store.shelf(center, shelf_id)? {
                shelves.push(shelf);
            }
        }

        let congestion = self.congestion_snapshot(&shelves);
        Ok(rank_locations(
            &container,
            &shelves,
            &congestion,
            filters,
            &self.config.scoring,
        ))
    }

    /// Adjust a shelf's live-task counter (outside any transaction).
    pub fn bump_crowd(
        &self,
        shelf_id: ShelfId,
        kind: CrowdKind,
        delta: i32,
    ) -> Result<CrowdCounters, EngineError> {
        Ok(self.crowd.bump(shelf_id, kind, delta)?)
    }

    /// Compute a shelf's advisory congestion report.
    pub fn compute_crowd(
        &self,
        center_id: CenterId,
        shelf_id: ShelfId,
    ) -> Result<CrowdReport, EngineError> {
        let shelf = self
            .store
            .shelf(center_id, shelf_id)?
            .ok_or(EngineError::NotFound)?;
        let counters = self.crowd.counters(shelf_id)?;
        Ok(compute_crowd(
            &counters,
            shelf.occupied_slots(),
            shelf.total_slots(),
            self.config.crowded_threshold,
        ))
    }

    // ---- read-backs ---------------------------------------------------------

    pub fn container(
        &self,
        center_id: CenterId,
        code: ContainerCode,
    ) -> Result<Option<ContainerRecord>, EngineError> {
        Ok(self.store.container(center_id, code)?)
    }

    pub fn shelf(
        &self,
        center_id: CenterId,
        shelf_id: ShelfId,
    ) -> Result<Option<ShelfRecord>, EngineError> {
        Ok(self.store.shelf(center_id, shelf_id)?)
    }

    // ---- internals ----------------------------------------------------------

    fn load_container(&self, code: ContainerCode) -> Result<ContainerRecord, EngineError> {
        self.store
            .find_container(code)?
            .ok_or(EngineError::NotFound)
    }

    /// Retry the whole operation on optimistic commit conflicts, up to the
    /// configured budget. Every attempt reloads from the store.
    fn with_retries<T>(
        &self,
        operation: &str,
        mut attempt_fn: impl FnMut() -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match attempt_fn() {
                Err(EngineError::Conflict(reason)) if attempt <= self.config.max_commit_retries => {
                    tracing::debug!(operation, attempt, %reason, "optimistic conflict, retrying");
                }
                other => return other,
            }
        }
    }

    /// Live-task snapshot for the allocator/scorer. Advisory: a failing
    /// counter store degrades to "idle", it never blocks the operation.
    fn congestion_snapshot(&self, shelves: &[ShelfRecord]) -> HashMap<ShelfId, u32> {
        let mut snapshot = HashMap::with_capacity(shelves.len());
        for shelf in shelves {
            match self.crowd.counters(shelf.shelf_id()) {
                Ok(counters) => {
                    snapshot.insert(shelf.shelf_id(), counters.total());
                }
                Err(e) => {
                    tracing::warn!(
                        shelf_id = %shelf.shelf_id(),
                        error = %e,
                        "crowd counters unavailable, treating shelf as idle"
                    );
                }
            }
        }
        snapshot
    }

    /// Rebuild the denormalized location pointer when the primary entry
    /// lives on a shelf outside the operation's scope.
    fn reconcile_location(
        &self,
        container: &mut ContainerRecord,
        in_scope: &[ShelfRecord],
    ) -> Result<(), EngineError> {
        if container.location_matches_primary() {
            return Ok(());
        }
        let Some(primary) = container.primary_entry().copied() else {
            container.set_location(None);
            return Ok(());
        };
        if let Some(shelf) = in_scope.iter().find(|s| s.shelf_id() == primary.shelf_id) {
            container.set_location(Some(shelf.location_of(primary.slot_id)));
            return Ok(());
        }
        let location = self
            .store
            .shelf(container.center_id(), primary.shelf_id)?
            .map(|shelf| shelf.location_of(primary.slot_id));
        container.set_location(location);
        Ok(())
    }

    /// Publish an operation event. Advisory: a bus failure is logged and
    /// swallowed, never rolled back into the operation.
    fn publish(&self, center_id: CenterId, subject: String, event: WarehouseEvent) {
        let envelope = EventEnvelope::new(
            Uuid::now_v7(),
            center_id,
            subject,
            event.event_type(),
            event.occurred_at(),
            event,
        );
        if let Err(e) = self.bus.publish(envelope) {
            tracing::warn!(error = ?e, "operation event publish failed (advisory)");
        }
    }
}
