//! Integration tests for the full operation pipeline.
//!
//! Tests: Engine → WarehouseStore → commit → EventBus
//!
//! Verifies:
//! - The intake-to-dispatch scenarios from the operational playbook
//! - Atomicity: a rejected operation leaves no partial writes
//! - Optimistic concurrency: overlapping operations serialize via retries

use std::sync::Arc;

use harvesthub_core::{
    CenterId, ContainerCode, ExpectedVersion, ShelfId, SlotId, UserId, Weight,
};
use harvesthub_events::{EventBus, EventEnvelope, InMemoryEventBus};
use harvesthub_warehouse::{
    ContainerState, CrowdKind, LocationFilters, ShelfRecord, ShelfType, WarehouseEvent,
};

use crate::config::EngineConfig;
use crate::crowd::InMemoryCrowdStore;
use crate::engine::{EngineError, InMemoryEngine, WarehouseEngine};
use crate::store::{InMemoryWarehouseStore, WarehouseStore, WriteSet};

fn kg(v: i64) -> Weight {
    Weight::from_kg(v).unwrap()
}

fn setup() -> (
    InMemoryEngine,
    Arc<InMemoryWarehouseStore>,
    Arc<InMemoryEventBus<EventEnvelope<WarehouseEvent>>>,
) {
    let store = Arc::new(InMemoryWarehouseStore::new());
    let bus = Arc::new(InMemoryEventBus::new());
    let crowd = Arc::new(InMemoryCrowdStore::new());
    let engine = WarehouseEngine::new(
        store.clone(),
        bus.clone(),
        crowd,
        EngineConfig::default(),
    );
    (engine, store, bus)
}

fn picker_shelf(center: CenterId, slot_caps_kg: &[i64], max_kg: i64) -> ShelfRecord {
    shelf_of_type(center, ShelfType::Picker, slot_caps_kg, max_kg)
}

fn shelf_of_type(
    center: CenterId,
    shelf_type: ShelfType,
    slot_caps_kg: &[i64],
    max_kg: i64,
) -> ShelfRecord {
    let caps: Vec<Weight> = slot_caps_kg.iter().map(|v| kg(*v)).collect();
    ShelfRecord::new(
        center,
        ShelfId::new(),
        shelf_type,
        "A",
        "fresh",
        "aisle-1",
        kg(max_kg),
        &caps,
    )
    .unwrap()
}

/// Walk a freshly registered container to `Sorted` with 100kg intended.
fn intake_to_sorted(engine: &InMemoryEngine, center: CenterId, intended_kg: i64) -> ContainerCode {
    let code = ContainerCode::new();
    engine
        .register_container(code, center, UserId::new())
        .unwrap();
    for state in [
        ContainerState::Cleaning,
        ContainerState::Cleaned,
        ContainerState::Weighing,
    ] {
        engine.advance_container(code, state).unwrap();
    }
    engine.record_weighing(code, kg(intended_kg)).unwrap();
    for state in [ContainerState::Sorting, ContainerState::Sorted] {
        engine.advance_container(code, state).unwrap();
    }
    code
}

#[test]
fn intake_flow_drives_the_state_machine() {
    let (engine, _, _) = setup();
    let center = CenterId::new();
    let code = intake_to_sorted(&engine, center, 100);

    let container = engine.container(center, code).unwrap().unwrap();
    assert_eq!(container.state(), ContainerState::Sorted);
    assert_eq!(container.intended_weight(), kg(100));

    // Skipping ahead is rejected and changes nothing.
    let err = engine
        .advance_container(code, ContainerState::Dispatched)
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
    let container = engine.container(center, code).unwrap().unwrap();
    assert_eq!(container.state(), ContainerState::Sorted);
}

#[test]
fn placement_splits_across_two_shelves_over_two_calls() {
    let (engine, _, _) = setup();
    let center = CenterId::new();

    // Scenario: intended 100kg, one empty 60kg slot on a 60kg shelf.
    let first = picker_shelf(center, &[60], 60);
    engine.register_shelf(first.clone()).unwrap();
    let code = intake_to_sorted(&engine, center, 100);

    let outcome = engine
        .place_remaining_weight(code, Some(center), ShelfType::Picker)
        .unwrap();
    assert_eq!(outcome.placed, kg(60));
    assert_eq!(outcome.leftover, kg(40));
    assert_eq!(outcome.state, ContainerState::Sorted);

    // Second shelf appears; the leftover 40kg fits into its 50kg slot.
    let second = picker_shelf(center, &[50], 50);
    engine.register_shelf(second.clone()).unwrap();

    let outcome = engine
        .place_remaining_weight(code, Some(center), ShelfType::Picker)
        .unwrap();
    assert_eq!(outcome.placed, kg(40));
    assert!(outcome.leftover.is_zero());
    assert_eq!(outcome.state, ContainerState::Shelved);

    let container = engine.container(center, code).unwrap().unwrap();
    assert_eq!(container.distributed_weights().len(), 2);
    assert_eq!(container.total_weight(), kg(100));
    assert_eq!(container.distributed_total(), kg(100));

    // Shelf aggregates committed consistently.
    let first = engine.shelf(center, first.shelf_id()).unwrap().unwrap();
    let second = engine.shelf(center, second.shelf_id()).unwrap().unwrap();
    assert_eq!(first.current_weight(), kg(60));
    assert_eq!(second.current_weight(), kg(40));
    assert_eq!(first.occupied_slots(), 1);
}

#[test]
fn consume_scenarios_free_slots_and_deplete() {
    let (engine, _, _) = setup();
    let center = CenterId::new();
    let first = picker_shelf(center, &[60], 60);
    let second = picker_shelf(center, &[50], 50);
    engine.register_shelf(first.clone()).unwrap();
    engine.register_shelf(second.clone()).unwrap();

    let code = intake_to_sorted(&engine, center, 100);
    engine
        .place_remaining_weight(code, None, ShelfType::Picker)
        .unwrap();

    // Over-consumption is rejected with no state change.
    let err = engine
        .consume_weight(code, first.shelf_id(), SlotId(0), kg(100))
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientWeight(_)));
    let container = engine.container(center, code).unwrap().unwrap();
    assert_eq!(container.total_weight(), kg(100));
    assert_eq!(container.state(), ContainerState::Shelved);

    // Exact consumption frees the slot and marks the container picked.
    let outcome = engine
        .consume_weight(code, first.shelf_id(), SlotId(0), kg(60))
        .unwrap();
    assert_eq!(outcome.new_total, kg(40));
    assert!(outcome.new_slot_weight.is_zero());
    assert_eq!(outcome.state, ContainerState::Picked);

    let first_after = engine.shelf(center, first.shelf_id()).unwrap().unwrap();
    assert_eq!(first_after.occupied_slots(), 0);
    assert!(first_after.slot(SlotId(0)).unwrap().is_free());

    // Draining the rest depletes the container and prunes every entry.
    let outcome = engine
        .consume_weight(code, second.shelf_id(), SlotId(0), kg(40))
        .unwrap();
    assert!(outcome.new_total.is_zero());
    assert_eq!(outcome.state, ContainerState::Depleted);
    let container = engine.container(center, code).unwrap().unwrap();
    assert!(container.distributed_weights().is_empty());
    assert!(container.location().is_none());
}

#[test]
fn move_relocates_and_makes_stored_stock_pickable() {
    let (engine, _, _) = setup();
    let center = CenterId::new();
    let warehouse = shelf_of_type(center, ShelfType::Warehouse, &[80], 80);
    let picker = picker_shelf(center, &[80], 80);
    engine.register_shelf(warehouse.clone()).unwrap();
    engine.register_shelf(picker.clone()).unwrap();

    let code = intake_to_sorted(&engine, center, 70);
    let outcome = engine
        .place_remaining_weight(code, None, ShelfType::Warehouse)
        .unwrap();
    assert_eq!(outcome.state, ContainerState::Stored);

    let moved = engine
        .move_container(
            center,
            warehouse.shelf_id(),
            SlotId(0),
            picker.shelf_id(),
            SlotId(0),
        )
        .unwrap();
    assert_eq!(moved.moved, kg(70));

    let container = engine.container(center, code).unwrap().unwrap();
    assert_eq!(container.state(), ContainerState::Shelved);
    assert_eq!(container.location().unwrap().shelf_id, picker.shelf_id());

    let warehouse_after = engine.shelf(center, warehouse.shelf_id()).unwrap().unwrap();
    let picker_after = engine.shelf(center, picker.shelf_id()).unwrap().unwrap();
    assert!(warehouse_after.current_weight().is_zero());
    assert_eq!(picker_after.current_weight(), kg(70));
}

#[test]
fn refill_moves_stock_and_leaves_audit_notes() {
    let (engine, _, _) = setup();
    let center = CenterId::new();
    let picker = picker_shelf(center, &[25], 25);
    let warehouse = shelf_of_type(center, ShelfType::Warehouse, &[40], 40);
    engine.register_shelf(picker.clone()).unwrap();
    engine.register_shelf(warehouse.clone()).unwrap();

    // A 5kg picker slot and a 30kg warehouse slot, each bound to stock.
    let picker_stock = intake_to_sorted(&engine, center, 5);
    engine
        .place_remaining_weight(picker_stock, None, ShelfType::Picker)
        .unwrap();
    let warehouse_stock = intake_to_sorted(&engine, center, 30);
    engine
        .place_remaining_weight(warehouse_stock, None, ShelfType::Warehouse)
        .unwrap();

    let actor = UserId::new();
    let outcome = engine
        .refill_from_warehouse(
            center,
            picker.shelf_id(),
            SlotId(0),
            warehouse.shelf_id(),
            SlotId(0),
            kg(20),
            actor,
        )
        .unwrap();

    // Scenario: target 20, picker at 5, warehouse at 30 → 15 moves.
    assert_eq!(outcome.moved, kg(15));
    assert_eq!(outcome.picker_slot_weight, kg(20));
    assert_eq!(outcome.warehouse_slot_weight, kg(15));

    // Bindings untouched, audit notes on both bound containers.
    let picker_after = engine.shelf(center, picker.shelf_id()).unwrap().unwrap();
    assert_eq!(
        picker_after.slot(SlotId(0)).unwrap().container(),
        Some(picker_stock)
    );
    let picker_container = engine.container(center, picker_stock).unwrap().unwrap();
    let warehouse_container = engine.container(center, warehouse_stock).unwrap().unwrap();
    assert!(
        picker_container
            .audit()
            .iter()
            .any(|note| note.actor == actor && note.note.contains("refill moved"))
    );
    assert!(
        warehouse_container
            .audit()
            .iter()
            .any(|note| note.note.contains("refill moved"))
    );
    // No container state changed and distributions are untouched.
    assert_eq!(picker_container.state(), ContainerState::Shelved);
    assert_eq!(picker_container.total_weight(), kg(5));
}

#[test]
fn crowd_counters_bias_placement_but_never_block_it() {
    let (engine, _, _) = setup();
    let center = CenterId::new();
    let busy = picker_shelf(center, &[100], 100);
    let quiet = picker_shelf(center, &[100], 100);
    engine.register_shelf(busy.clone()).unwrap();
    engine.register_shelf(quiet.clone()).unwrap();

    engine.bump_crowd(busy.shelf_id(), CrowdKind::Pick, 3).unwrap();
    engine.bump_crowd(busy.shelf_id(), CrowdKind::Sort, 2).unwrap();

    let code = intake_to_sorted(&engine, center, 10);
    let outcome = engine
        .place_remaining_weight(code, None, ShelfType::Picker)
        .unwrap();
    assert_eq!(outcome.placements[0].shelf_id, quiet.shelf_id());

    let report = engine.compute_crowd(center, busy.shelf_id()).unwrap();
    assert!(report.score > 0);
    assert_eq!(report.breakdown.pick, 3);
    assert_eq!(report.breakdown.sort, 2);
}

#[test]
fn find_best_location_prefers_the_heavier_calm_slot() {
    let (engine, _, _) = setup();
    let center = CenterId::new();
    let first = picker_shelf(center, &[60], 60);
    let second = picker_shelf(center, &[50], 50);
    engine.register_shelf(first.clone()).unwrap();
    engine.register_shelf(second.clone()).unwrap();

    let code = intake_to_sorted(&engine, center, 100);
    engine
        .place_remaining_weight(code, None, ShelfType::Picker)
        .unwrap();

    let ranking = engine
        .find_best_location(code, &LocationFilters::default())
        .unwrap();
    assert_eq!(ranking.candidates.len(), 2);
    // 60kg on the first shelf outranks 40kg on the second.
    assert_eq!(ranking.best.as_ref().unwrap().shelf_id, first.shelf_id());

    // Swamp the first shelf with live tasks and the ranking flips.
    engine.bump_crowd(first.shelf_id(), CrowdKind::Pick, 5).unwrap();
    let ranking = engine
        .find_best_location(code, &LocationFilters::default())
        .unwrap();
    assert_eq!(ranking.best.unwrap().shelf_id, second.shelf_id());
}

#[test]
fn operations_publish_advisory_events_after_commit() {
    let (engine, _, bus) = setup();
    let center = CenterId::new();
    let shelf = picker_shelf(center, &[60], 60);
    engine.register_shelf(shelf.clone()).unwrap();

    let subscription = bus.subscribe();
    let code = intake_to_sorted(&engine, center, 50);
    engine
        .place_remaining_weight(code, None, ShelfType::Picker)
        .unwrap();
    engine
        .consume_weight(code, shelf.shelf_id(), SlotId(0), kg(50))
        .unwrap();

    let types: Vec<String> = subscription
        .drain()
        .iter()
        .map(|envelope| envelope.event_type().to_string())
        .collect();
    assert!(types.contains(&"warehouse.container.registered".to_string()));
    assert!(types.contains(&"warehouse.container.state_changed".to_string()));
    assert!(types.contains(&"warehouse.container.placed".to_string()));
    assert!(types.contains(&"warehouse.container.consumed".to_string()));
}

#[test]
fn stale_write_sets_are_rejected_by_the_store() {
    let (engine, store, _) = setup();
    let center = CenterId::new();
    let shelf = picker_shelf(center, &[60], 60);
    engine.register_shelf(shelf.clone()).unwrap();

    let stale = store.shelf(center, shelf.shelf_id()).unwrap().unwrap();

    // A commit behind the stale snapshot's back...
    let mut fresh = stale.clone();
    fresh.set_busy_score(10);
    store
        .commit(WriteSet::new().with_shelf(fresh, ExpectedVersion::Exact(0)))
        .unwrap();

    // ...makes the stale expectation fail wholesale.
    let result = store.commit(WriteSet::new().with_shelf(stale, ExpectedVersion::Exact(0)));
    assert!(matches!(
        result,
        Err(crate::store::StoreError::Concurrency(_))
    ));
}

#[test]
fn concurrent_consumers_serialize_through_retries() {
    let (engine, _, _) = setup();
    let center = CenterId::new();
    let shelf = picker_shelf(center, &[100], 100);
    engine.register_shelf(shelf.clone()).unwrap();

    let code = intake_to_sorted(&engine, center, 100);
    engine
        .place_remaining_weight(code, None, ShelfType::Picker)
        .unwrap();

    let engine = Arc::new(engine);
    let shelf_id = shelf.shelf_id();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                engine.consume_weight(code, shelf_id, SlotId(0), kg(10)).unwrap()
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let container = engine.container(center, code).unwrap().unwrap();
    assert_eq!(container.total_weight(), kg(60));
    let shelf_after = engine.shelf(center, shelf_id).unwrap().unwrap();
    assert_eq!(shelf_after.current_weight(), kg(60));
    assert_eq!(container.total_weight(), container.distributed_total());
}

#[test]
fn unknown_container_is_not_found() {
    let (engine, _, _) = setup();
    let err = engine
        .place_remaining_weight(ContainerCode::new(), None, ShelfType::Picker)
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound));
}
