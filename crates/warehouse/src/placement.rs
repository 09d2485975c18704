//! Greedy placement of a container's remaining weight across shelving.
//!
//! Pure planning + mutation over record clones: the caller (engine) loads
//! the candidate shelves, runs [`place_remaining`], and commits every
//! touched record in one write set.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use harvesthub_core::{DomainError, DomainResult, ShelfId, SlotId, Weight};

use crate::container::{ContainerRecord, ContainerState};
use crate::shelf::{ShelfRecord, ShelfType};

/// One slice of weight that went into one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementSlice {
    pub shelf_id: ShelfId,
    pub slot_id: SlotId,
    pub weight: Weight,
}

/// Result of one allocation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementOutcome {
    pub placed: Weight,
    pub leftover: Weight,
    pub placements: Vec<PlacementSlice>,
    pub state: ContainerState,
}

/// Distribute the container's remaining weight greedily across the given
/// shelves of `target` type.
///
/// Shelves are ranked least-congested first: temporarily-avoided shelves
/// last, then ascending live tasks, busy score and occupied slots, with the
/// caller's input order breaking the final tie. Within a shelf, slots fill
/// in slot order with `min(slot_avail, shelf_avail, remaining)`.
///
/// A fully placed container ends `Shelved` (picker/delivery target) or
/// `Stored` (warehouse target); with leftover it keeps its entry state as a
/// signal to retry against overflow shelving later.
pub fn place_remaining(
    container: &mut ContainerRecord,
    shelves: &mut [ShelfRecord],
    target: ShelfType,
    congestion: &HashMap<ShelfId, u32>,
    now: DateTime<Utc>,
) -> DomainResult<PlacementOutcome> {
    let entry_state = container.state();
    if !matches!(entry_state, ContainerState::Sorted | ContainerState::Shelved) {
        return Err(DomainError::invalid_state(format!(
            "placement requires a sorted or shelved container, found {entry_state}"
        )));
    }

    let mut remaining = container.remaining_to_place();
    if remaining.is_zero() {
        return Err(DomainError::bad_request(
            "container has no remaining weight to place",
        ));
    }

    // Defense in depth: the engine loads by center + type, but a mixed batch
    // here would silently cross centers.
    for shelf in shelves.iter() {
        if shelf.center_id() != container.center_id() {
            return Err(DomainError::cross_center(format!(
                "shelf {} belongs to another logistics center",
                shelf.shelf_id()
            )));
        }
    }

    let mut ranked: Vec<usize> = (0..shelves.len())
        .filter(|&i| shelves[i].shelf_type() == target)
        .collect();
    // Stable sort: ties at every criterion fall through to input order.
    ranked.sort_by_key(|&i| {
        let shelf = &shelves[i];
        let live_tasks = congestion.get(&shelf.shelf_id()).copied().unwrap_or(0);
        (
            shelf.is_temporarily_avoid(),
            live_tasks,
            shelf.busy_score(),
            shelf.occupied_slots(),
        )
    });

    let code = container.code();
    let to_place = remaining;
    let mut placements = Vec::new();

    'shelves: for &i in &ranked {
        let shelf = &mut shelves[i];
        for slot_index in 0..shelf.slots().len() {
            if remaining.is_zero() {
                break 'shelves;
            }
            let slot = &shelf.slots()[slot_index];
            let slot_id = slot.id();

            // A slot holding another container is off limits regardless of
            // spare capacity.
            if slot.container().is_some_and(|c| c != code) {
                continue;
            }

            let placeable = slot.available().min(shelf.available()).min(remaining);
            if placeable.is_zero() {
                continue;
            }

            shelf.place(slot_id, code, placeable, now)?;
            container.merge_placement(shelf.shelf_id(), slot_id, placeable)?;
            placements.push(PlacementSlice {
                shelf_id: shelf.shelf_id(),
                slot_id,
                weight: placeable,
            });
            remaining = remaining.saturating_sub(placeable);
        }
    }

    let placed = to_place.saturating_sub(remaining);

    if remaining.is_zero() {
        match (entry_state, target) {
            (ContainerState::Sorted, ShelfType::Picker | ShelfType::Delivery) => {
                container.transition_to(ContainerState::Shelved)?;
            }
            (ContainerState::Sorted, ShelfType::Warehouse) => {
                container.transition_to(ContainerState::Stored)?;
            }
            // An already shelved container stays shelved on a top-up.
            (ContainerState::Shelved, _) => {}
            _ => {}
        }
    }

    // Keep the denormalized pointer honest when the primary entry sits on
    // one of the shelves in scope.
    if let Some(primary) = container.primary_entry().copied() {
        if let Some(shelf) = shelves.iter().find(|s| s.shelf_id() == primary.shelf_id) {
            container.set_location(Some(shelf.location_of(primary.slot_id)));
        }
    }

    Ok(PlacementOutcome {
        placed,
        leftover: remaining,
        placements,
        state: container.state(),
    })
}
