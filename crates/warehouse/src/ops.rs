//! Consumption, relocation and refill: pure multi-record mutations.
//!
//! Each function here mutates the record clones it is handed and returns a
//! typed outcome; the engine commits every touched record in one write set,
//! so a returned error means nothing was persisted.

use chrono::{DateTime, Utc};

use harvesthub_core::{DomainError, DomainResult, SlotId, Weight};

use crate::container::{ContainerRecord, ContainerState};
use crate::shelf::{ShelfRecord, ShelfType};

/// Outcome of a pick confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumeOutcome {
    pub new_total: Weight,
    pub new_slot_weight: Weight,
    pub state: ContainerState,
}

/// Outcome of a whole-slot relocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    pub moved: Weight,
}

/// Outcome of topping up a picker slot from warehouse stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefillOutcome {
    pub moved: Weight,
    pub picker_slot_weight: Weight,
    pub warehouse_slot_weight: Weight,
}

/// Decrement a container's weight in one slot (a pick).
///
/// The container's distributed entry is the authoritative precondition: a
/// missing entry or one smaller than `amount` rejects with
/// insufficient-weight before anything mutates. Depleting the container's
/// last weight ends it `Depleted`; the first pick off a `Shelved` container
/// marks it `Picked`.
pub fn consume_weight(
    container: &mut ContainerRecord,
    shelf: &mut ShelfRecord,
    slot_id: SlotId,
    amount: Weight,
    now: DateTime<Utc>,
) -> DomainResult<ConsumeOutcome> {
    if amount.is_zero() {
        return Err(DomainError::bad_request("consume amount must be positive"));
    }
    if container.center_id() != shelf.center_id() {
        return Err(DomainError::cross_center(
            "container and shelf belong to different logistics centers",
        ));
    }
    if !matches!(
        container.state(),
        ContainerState::Shelved | ContainerState::Picked
    ) {
        return Err(DomainError::invalid_state(format!(
            "consumption requires a shelved or picked container, found {}",
            container.state()
        )));
    }

    let entry = container
        .entry(shelf.shelf_id(), slot_id)
        .ok_or_else(|| {
            DomainError::insufficient_weight(format!(
                "container {} holds no weight at {}/{}",
                container.code(),
                shelf.shelf_id(),
                slot_id
            ))
        })?;
    if entry.weight < amount {
        return Err(DomainError::insufficient_weight(format!(
            "consume of {} exceeds the {} tracked at {}/{}",
            amount,
            entry.weight,
            shelf.shelf_id(),
            slot_id
        )));
    }

    let new_slot_weight = shelf.take(slot_id, container.code(), amount, now)?;
    container.consume_from_slot(shelf.shelf_id(), slot_id, amount)?;

    // The consumed slot may have been the primary location. Re-point at the
    // new primary when it lives on this shelf; otherwise clear it and let
    // the engine rebuild it from the owning shelf.
    if !container.location_matches_primary() {
        let next = container
            .primary_entry()
            .filter(|p| p.shelf_id == shelf.shelf_id())
            .map(|p| shelf.location_of(p.slot_id));
        container.set_location(next);
    }

    Ok(ConsumeOutcome {
        new_total: container.total_weight(),
        new_slot_weight,
        state: container.state(),
    })
}

/// Relocate the full weight a container holds in one slot to a free slot on
/// another shelf of the same center.
pub fn move_container(
    container: &mut ContainerRecord,
    source: &mut ShelfRecord,
    from_slot: SlotId,
    dest: &mut ShelfRecord,
    to_slot: SlotId,
    now: DateTime<Utc>,
) -> DomainResult<MoveOutcome> {
    if source.center_id() != dest.center_id() {
        return Err(DomainError::cross_center(
            "source and destination shelves belong to different logistics centers",
        ));
    }

    let (code, weight) = source.vacate(from_slot, now)?;
    if code != container.code() {
        return Err(DomainError::invalid_state(
            "source slot is held by another container",
        ));
    }

    dest.occupy(to_slot, code, weight, now)?;
    container.relocate(source.shelf_id(), from_slot, dest.shelf_id(), to_slot)?;
    container.set_location(Some(dest.location_of(to_slot)));

    // Warehouse-stored stock becomes pickable once it lands on picker or
    // delivery shelving.
    if container.state() == ContainerState::Stored
        && matches!(dest.shelf_type(), ShelfType::Picker | ShelfType::Delivery)
    {
        container.transition_to(ContainerState::Shelved)?;
    }

    Ok(MoveOutcome { moved: weight })
}

/// Same-shelf variant of [`move_container`], for reorganizing within one
/// physical unit without aliasing two mutable borrows of the shelf.
pub fn move_container_within(
    container: &mut ContainerRecord,
    shelf: &mut ShelfRecord,
    from_slot: SlotId,
    to_slot: SlotId,
    now: DateTime<Utc>,
) -> DomainResult<MoveOutcome> {
    if from_slot == to_slot {
        return Err(DomainError::bad_request(
            "source and destination slots are the same",
        ));
    }

    let (code, weight) = shelf.vacate(from_slot, now)?;
    if code != container.code() {
        return Err(DomainError::invalid_state(
            "source slot is held by another container",
        ));
    }

    shelf.occupy(to_slot, code, weight, now)?;
    container.relocate(shelf.shelf_id(), from_slot, shelf.shelf_id(), to_slot)?;
    container.set_location(Some(shelf.location_of(to_slot)));

    Ok(MoveOutcome { moved: weight })
}

/// Top up a picker slot from a warehouse slot.
///
/// Moves `min(target_fill − picker_current, warehouse_current)`, clamped at
/// zero. Neither slot's container binding changes, and no container state
/// transitions: the engine appends informational audit notes to any bound
/// containers after the fact.
pub fn refill_from_warehouse(
    picker: &mut ShelfRecord,
    picker_slot: SlotId,
    warehouse: &mut ShelfRecord,
    warehouse_slot: SlotId,
    target_fill: Weight,
) -> DomainResult<RefillOutcome> {
    if picker.center_id() != warehouse.center_id() {
        return Err(DomainError::cross_center(
            "picker and warehouse shelves belong to different logistics centers",
        ));
    }

    let picker_current = picker.slot(picker_slot)?.current_weight();
    let warehouse_current = warehouse.slot(warehouse_slot)?.current_weight();

    if target_fill > picker.slot(picker_slot)?.capacity() {
        return Err(DomainError::capacity_exceeded(format!(
            "target fill {} exceeds picker slot capacity {}",
            target_fill,
            picker.slot(picker_slot)?.capacity()
        )));
    }

    let moved = target_fill
        .saturating_sub(picker_current)
        .min(warehouse_current);

    if moved.is_zero() {
        return Ok(RefillOutcome {
            moved: Weight::ZERO,
            picker_slot_weight: picker_current,
            warehouse_slot_weight: warehouse_current,
        });
    }

    let warehouse_slot_weight = warehouse.drain_keeping_binding(warehouse_slot, moved)?;
    let picker_slot_weight = picker.fill_keeping_binding(picker_slot, moved)?;

    Ok(RefillOutcome {
        moved,
        picker_slot_weight,
        warehouse_slot_weight,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use harvesthub_core::{CenterId, ContainerCode, ShelfId, UserId};

    use crate::placement::place_remaining;

    fn kg(v: i64) -> Weight {
        Weight::from_kg(v).unwrap()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn sorted_container(center: CenterId, intended_kg: i64) -> ContainerRecord {
        let mut c = ContainerRecord::register(
            ContainerCode::new(),
            center,
            UserId::new(),
            test_time(),
        );
        for next in [
            ContainerState::Cleaning,
            ContainerState::Cleaned,
            ContainerState::Weighing,
        ] {
            c.transition_to(next).unwrap();
        }
        c.record_weighing(kg(intended_kg)).unwrap();
        for next in [ContainerState::Sorting, ContainerState::Sorted] {
            c.transition_to(next).unwrap();
        }
        c
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

    /// 100kg container with 60kg placed into slot 0 of the returned shelf.
    fn shelved_fixture(center: CenterId) -> (ContainerRecord, ShelfRecord) {
        let mut container = sorted_container(center, 100);
        let mut shelves = vec![shelf_of_type(center, ShelfType::Picker, &[60, 50], 110)];
        place_remaining(
            &mut container,
            &mut shelves,
            ShelfType::Picker,
            &HashMap::new(),
            test_time(),
        )
        .unwrap();
        let shelf = shelves.pop().unwrap();
        (container, shelf)
    }

    #[test]
    fn consume_beyond_slot_weight_is_rejected_without_mutation() {
        let center = CenterId::new();
        let (mut container, mut shelf) = shelved_fixture(center);
        // Only 60 of the intended 100 are in slot 0; total placed is 100
        // across two slots, slot 0 tracks 60.
        let before_container = container.clone();
        let before_shelf = shelf.clone();

        let err = consume_weight(
            &mut container,
            &mut shelf,
            SlotId(0),
            kg(100),
            test_time(),
        )
        .unwrap_err();

        assert!(matches!(err, DomainError::InsufficientWeight(_)));
        assert_eq!(container, before_container);
        assert_eq!(shelf, before_shelf);
    }

    #[test]
    fn consuming_a_full_slot_frees_it_and_marks_picked() {
        let center = CenterId::new();
        let (mut container, mut shelf) = shelved_fixture(center);
        assert_eq!(shelf.occupied_slots(), 2);

        let outcome = consume_weight(
            &mut container,
            &mut shelf,
            SlotId(0),
            kg(60),
            test_time(),
        )
        .unwrap();

        assert_eq!(outcome.new_total, kg(40));
        assert!(outcome.new_slot_weight.is_zero());
        assert_eq!(outcome.state, ContainerState::Picked);
        assert_eq!(shelf.occupied_slots(), 1);
        assert!(shelf.slot(SlotId(0)).unwrap().is_free());
        assert_eq!(container.total_weight(), container.distributed_total());
    }

    #[test]
    fn consuming_everything_depletes_the_container() {
        let center = CenterId::new();
        let (mut container, mut shelf) = shelved_fixture(center);

        consume_weight(&mut container, &mut shelf, SlotId(0), kg(60), test_time()).unwrap();
        let outcome =
            consume_weight(&mut container, &mut shelf, SlotId(1), kg(40), test_time()).unwrap();

        assert!(outcome.new_total.is_zero());
        assert_eq!(outcome.state, ContainerState::Depleted);
        assert!(container.distributed_weights().is_empty());
        assert!(container.location().is_none());
        assert_eq!(shelf.occupied_slots(), 0);
    }

    #[test]
    fn consume_from_unplaced_slot_is_insufficient_weight() {
        let center = CenterId::new();
        let (mut container, _) = shelved_fixture(center);
        let mut other = shelf_of_type(center, ShelfType::Picker, &[50], 50);

        let err = consume_weight(
            &mut container,
            &mut other,
            SlotId(0),
            kg(10),
            test_time(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientWeight(_)));
    }

    #[test]
    fn consume_requires_matching_center() {
        let center = CenterId::new();
        let (mut container, _) = shelved_fixture(center);
        let mut foreign = shelf_of_type(CenterId::new(), ShelfType::Picker, &[50], 50);

        let err = consume_weight(
            &mut container,
            &mut foreign,
            SlotId(0),
            kg(10),
            test_time(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::CrossCenterMismatch(_)));
    }

    #[test]
    fn move_relocates_whole_slot_and_updates_location() {
        let center = CenterId::new();
        let (mut container, mut source) = shelved_fixture(center);
        let mut dest = shelf_of_type(center, ShelfType::Picker, &[80], 80);
        let dest_id = dest.shelf_id();

        let outcome = move_container(
            &mut container,
            &mut source,
            SlotId(0),
            &mut dest,
            SlotId(0),
            test_time(),
        )
        .unwrap();

        assert_eq!(outcome.moved, kg(60));
        assert!(source.slot(SlotId(0)).unwrap().is_free());
        assert_eq!(dest.current_weight(), kg(60));
        assert_eq!(container.location().unwrap().shelf_id, dest_id);
        assert_eq!(container.total_weight(), kg(100));
        assert_eq!(container.total_weight(), container.distributed_total());
    }

    #[test]
    fn move_to_occupied_slot_is_rejected() {
        let center = CenterId::new();
        let (mut container, mut source) = shelved_fixture(center);
        let mut dest = shelf_of_type(center, ShelfType::Picker, &[80], 80);
        dest.place(SlotId(0), ContainerCode::new(), kg(5), test_time())
            .unwrap();

        let err = move_container(
            &mut container,
            &mut source,
            SlotId(0),
            &mut dest,
            SlotId(0),
            test_time(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn move_exceeding_destination_capacity_is_rejected() {
        let center = CenterId::new();
        let (mut container, mut source) = shelved_fixture(center);
        let mut dest = shelf_of_type(center, ShelfType::Picker, &[40], 40);

        let err = move_container(
            &mut container,
            &mut source,
            SlotId(0),
            &mut dest,
            SlotId(0),
            test_time(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::CapacityExceeded(_)));
    }

    #[test]
    fn move_across_centers_is_rejected() {
        let center = CenterId::new();
        let (mut container, mut source) = shelved_fixture(center);
        let mut dest = shelf_of_type(CenterId::new(), ShelfType::Picker, &[80], 80);

        let err = move_container(
            &mut container,
            &mut source,
            SlotId(0),
            &mut dest,
            SlotId(0),
            test_time(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::CrossCenterMismatch(_)));
    }

    #[test]
    fn move_out_of_warehouse_shelving_makes_stored_stock_pickable() {
        let center = CenterId::new();
        let mut container = sorted_container(center, 40);
        let mut warehouse =
            vec![shelf_of_type(center, ShelfType::Warehouse, &[50], 50)];
        place_remaining(
            &mut container,
            &mut warehouse,
            ShelfType::Warehouse,
            &HashMap::new(),
            test_time(),
        )
        .unwrap();
        assert_eq!(container.state(), ContainerState::Stored);

        let mut source = warehouse.pop().unwrap();
        let mut picker = shelf_of_type(center, ShelfType::Picker, &[60], 60);

        move_container(
            &mut container,
            &mut source,
            SlotId(0),
            &mut picker,
            SlotId(0),
            test_time(),
        )
        .unwrap();

        assert_eq!(container.state(), ContainerState::Shelved);
    }

    #[test]
    fn refill_tops_up_from_warehouse_stock() {
        let center = CenterId::new();
        let mut picker = shelf_of_type(center, ShelfType::Picker, &[25], 25);
        let mut warehouse = shelf_of_type(center, ShelfType::Warehouse, &[40], 40);
        picker
            .place(SlotId(0), ContainerCode::new(), kg(5), test_time())
            .unwrap();
        warehouse
            .place(SlotId(0), ContainerCode::new(), kg(30), test_time())
            .unwrap();

        let outcome =
            refill_from_warehouse(&mut picker, SlotId(0), &mut warehouse, SlotId(0), kg(20))
                .unwrap();

        assert_eq!(outcome.moved, kg(15));
        assert_eq!(outcome.picker_slot_weight, kg(20));
        assert_eq!(outcome.warehouse_slot_weight, kg(15));
        assert_eq!(picker.current_weight(), kg(20));
        assert_eq!(warehouse.current_weight(), kg(15));
    }

    #[test]
    fn refill_is_a_noop_when_picker_is_already_at_target() {
        let center = CenterId::new();
        let mut picker = shelf_of_type(center, ShelfType::Picker, &[25], 25);
        let mut warehouse = shelf_of_type(center, ShelfType::Warehouse, &[40], 40);
        picker
            .place(SlotId(0), ContainerCode::new(), kg(22), test_time())
            .unwrap();
        warehouse
            .place(SlotId(0), ContainerCode::new(), kg(30), test_time())
            .unwrap();

        let outcome =
            refill_from_warehouse(&mut picker, SlotId(0), &mut warehouse, SlotId(0), kg(20))
                .unwrap();

        assert!(outcome.moved.is_zero());
        assert_eq!(outcome.picker_slot_weight, kg(22));
        assert_eq!(outcome.warehouse_slot_weight, kg(30));
    }

    #[test]
    fn refill_target_beyond_slot_capacity_is_rejected() {
        let center = CenterId::new();
        let mut picker = shelf_of_type(center, ShelfType::Picker, &[25], 25);
        let mut warehouse = shelf_of_type(center, ShelfType::Warehouse, &[40], 40);
        picker
            .place(SlotId(0), ContainerCode::new(), kg(5), test_time())
            .unwrap();
        warehouse
            .place(SlotId(0), ContainerCode::new(), kg(30), test_time())
            .unwrap();

        let err =
            refill_from_warehouse(&mut picker, SlotId(0), &mut warehouse, SlotId(0), kg(30))
                .unwrap_err();
        assert!(matches!(err, DomainError::CapacityExceeded(_)));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: any sequence of valid partial picks keeps the
            /// container total equal to the sum of its entries and the shelf
            /// aggregate equal to the sum of its slots, and never drives
            /// either negative.
            #[test]
            fn consumption_conserves_weight(
                picks in prop::collection::vec((0usize..2, 1i64..30), 1..12)
            ) {
                let center = CenterId::new();
                let (mut container, mut shelf) = shelved_fixture(center);

                for (slot, amount_kg) in picks {
                    let slot_id = SlotId(slot as u16);
                    let amount = kg(amount_kg);
                    let tracked = container
                        .entry(shelf.shelf_id(), slot_id)
                        .map(|e| e.weight)
                        .unwrap_or(Weight::ZERO);

                    let result = consume_weight(
                        &mut container,
                        &mut shelf,
                        slot_id,
                        amount,
                        test_time(),
                    );

                    if amount > tracked {
                        prop_assert!(result.is_err());
                    } else {
                        prop_assert!(result.is_ok());
                    }

                    prop_assert_eq!(
                        container.total_weight(),
                        container.distributed_total()
                    );
                    prop_assert_eq!(shelf.current_weight(), shelf.slots_weight_total());
                    prop_assert!(container.total_weight() >= Weight::ZERO);

                    if container.state().is_terminal() {
                        break;
                    }
                }
            }
        }
    }
}
