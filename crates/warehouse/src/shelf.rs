use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use harvesthub_core::{
    CenterId, ContainerCode, DomainError, DomainResult, Entity, ShelfId, SlotId, VersionedRecord,
    Weight,
};

use crate::container::StorageLocation;

/// Role of a physical storage unit on the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShelfType {
    Warehouse,
    Picker,
    Delivery,
}

impl core::fmt::Display for ShelfType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            ShelfType::Warehouse => "warehouse",
            ShelfType::Picker => "picker",
            ShelfType::Delivery => "delivery",
        };
        f.write_str(name)
    }
}

/// Floor-grid position, when the shelf has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridPos {
    pub row: u32,
    pub col: u32,
}

impl GridPos {
    pub fn manhattan_distance(self, other: GridPos) -> u32 {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }
}

/// One capacity-bounded subdivision of a shelf.
///
/// Invariants: `0 ≤ current_weight ≤ capacity`; an unbound slot carries zero
/// weight (a bound slot may sit at zero, e.g. a drained picker slot awaiting
/// refill).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    id: SlotId,
    capacity: Weight,
    current_weight: Weight,
    container: Option<ContainerCode>,
    occupied_at: Option<DateTime<Utc>>,
    emptied_at: Option<DateTime<Utc>>,
}

impl Slot {
    fn new(id: SlotId, capacity: Weight) -> Self {
        Self {
            id,
            capacity,
            current_weight: Weight::ZERO,
            container: None,
            occupied_at: None,
            emptied_at: None,
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn capacity(&self) -> Weight {
        self.capacity
    }

    pub fn current_weight(&self) -> Weight {
        self.current_weight
    }

    pub fn container(&self) -> Option<ContainerCode> {
        self.container
    }

    pub fn occupied_at(&self) -> Option<DateTime<Utc>> {
        self.occupied_at
    }

    pub fn emptied_at(&self) -> Option<DateTime<Utc>> {
        self.emptied_at
    }

    pub fn is_free(&self) -> bool {
        self.container.is_none()
    }

    pub fn available(&self) -> Weight {
        self.capacity.saturating_sub(self.current_weight)
    }
}

/// One physical storage unit with a fixed, ordered list of slots.
///
/// Slots are mutated only through the methods here, which keep the shelf
/// aggregates (`current_weight`, `occupied_slots`) consistent with the slot
/// list after every change. Shelves are created administratively; the engine
/// never builds them as part of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelfRecord {
    center_id: CenterId,
    shelf_id: ShelfId,
    shelf_type: ShelfType,
    area: String,
    zone: String,
    aisle: String,
    grid: Option<GridPos>,
    max_weight: Weight,
    slots: Vec<Slot>,
    current_weight: Weight,
    occupied_slots: u32,
    busy_score: u8,
    is_temporarily_avoid: bool,
    version: u64,
}

impl ShelfRecord {
    pub fn new(
        center_id: CenterId,
        shelf_id: ShelfId,
        shelf_type: ShelfType,
        area: impl Into<String>,
        zone: impl Into<String>,
        aisle: impl Into<String>,
        max_weight: Weight,
        slot_capacities: &[Weight],
    ) -> DomainResult<Self> {
        if slot_capacities.is_empty() {
            return Err(DomainError::bad_request("a shelf needs at least one slot"));
        }
        if max_weight.is_zero() {
            return Err(DomainError::bad_request("shelf max weight must be positive"));
        }
        let slots = slot_capacities
            .iter()
            .enumerate()
            .map(|(i, cap)| Slot::new(SlotId(i as u16), *cap))
            .collect();

        Ok(Self {
            center_id,
            shelf_id,
            shelf_type,
            area: area.into(),
            zone: zone.into(),
            aisle: aisle.into(),
            grid: None,
            max_weight,
            slots,
            current_weight: Weight::ZERO,
            occupied_slots: 0,
            busy_score: 0,
            is_temporarily_avoid: false,
            version: 0,
        })
    }

    pub fn with_grid(mut self, row: u32, col: u32) -> Self {
        self.grid = Some(GridPos { row, col });
        self
    }

    pub fn center_id(&self) -> CenterId {
        self.center_id
    }

    pub fn shelf_id(&self) -> ShelfId {
        self.shelf_id
    }

    pub fn shelf_type(&self) -> ShelfType {
        self.shelf_type
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub fn grid(&self) -> Option<GridPos> {
        self.grid
    }

    pub fn max_weight(&self) -> Weight {
        self.max_weight
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn current_weight(&self) -> Weight {
        self.current_weight
    }

    pub fn occupied_slots(&self) -> u32 {
        self.occupied_slots
    }

    pub fn total_slots(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn busy_score(&self) -> u8 {
        self.busy_score
    }

    pub fn is_temporarily_avoid(&self) -> bool {
        self.is_temporarily_avoid
    }

    pub fn set_busy_score(&mut self, score: u8) {
        self.busy_score = score.min(100);
    }

    pub fn set_temporarily_avoid(&mut self, avoid: bool) {
        self.is_temporarily_avoid = avoid;
    }

    /// Shelf-level spare capacity.
    pub fn available(&self) -> Weight {
        self.max_weight.saturating_sub(self.current_weight)
    }

    pub fn slot(&self, slot_id: SlotId) -> DomainResult<&Slot> {
        self.slots
            .iter()
            .find(|s| s.id == slot_id)
            .ok_or(DomainError::NotFound)
    }

    fn slot_mut(&mut self, slot_id: SlotId) -> DomainResult<&mut Slot> {
        self.slots
            .iter_mut()
            .find(|s| s.id == slot_id)
            .ok_or(DomainError::NotFound)
    }

    /// Full physical address of one slot, for the container's denormalized
    /// location pointer.
    pub fn location_of(&self, slot_id: SlotId) -> StorageLocation {
        StorageLocation {
            area: self.area.clone(),
            zone: self.zone.clone(),
            aisle: self.aisle.clone(),
            shelf_id: self.shelf_id,
            slot_id,
        }
    }

    /// Add weight of `code` into a slot that is free or already bound to it.
    pub fn place(
        &mut self,
        slot_id: SlotId,
        code: ContainerCode,
        amount: Weight,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        if amount.is_zero() {
            return Err(DomainError::bad_request("placement amount must be positive"));
        }
        if amount > self.available() {
            return Err(DomainError::capacity_exceeded(format!(
                "shelf {} has {} available, cannot take {}",
                self.shelf_id,
                self.available(),
                amount
            )));
        }

        let shelf_id = self.shelf_id;
        let slot = self.slot_mut(slot_id)?;

        if let Some(bound) = slot.container {
            if bound != code {
                return Err(DomainError::invalid_state(format!(
                    "slot {}/{} is held by another container",
                    shelf_id, slot_id
                )));
            }
        }
        if amount > slot.available() {
            return Err(DomainError::capacity_exceeded(format!(
                "slot {}/{} has {} available, cannot take {}",
                shelf_id,
                slot_id,
                slot.available(),
                amount
            )));
        }

        let newly_occupied = slot.container.is_none();
        slot.current_weight = slot.current_weight.checked_add(amount)?;
        if newly_occupied {
            slot.container = Some(code);
            slot.occupied_at = Some(at);
            slot.emptied_at = None;
        }

        self.current_weight = self.current_weight.checked_add(amount)?;
        if newly_occupied {
            self.occupied_slots += 1;
        }
        Ok(())
    }

    /// Remove weight of `code` from its slot; frees the slot at zero.
    ///
    /// Returns the slot's weight after the take.
    pub fn take(
        &mut self,
        slot_id: SlotId,
        code: ContainerCode,
        amount: Weight,
        at: DateTime<Utc>,
    ) -> DomainResult<Weight> {
        if amount.is_zero() {
            return Err(DomainError::bad_request("take amount must be positive"));
        }

        let shelf_id = self.shelf_id;
        let slot = self.slot_mut(slot_id)?;

        if slot.container != Some(code) {
            return Err(DomainError::invalid_state(format!(
                "slot {}/{} is not held by the requested container",
                shelf_id, slot_id
            )));
        }

        let left = slot.current_weight.checked_sub(amount).ok_or_else(|| {
            DomainError::insufficient_weight(format!(
                "slot {}/{} holds {}, cannot take {}",
                shelf_id, slot_id, slot.current_weight, amount
            ))
        })?;

        slot.current_weight = left;
        let freed = left.is_zero();
        if freed {
            slot.container = None;
            slot.emptied_at = Some(at);
        }

        self.current_weight = self
            .current_weight
            .checked_sub(amount)
            .ok_or_else(|| DomainError::insufficient_weight("shelf total would go negative"))?;
        if freed {
            self.occupied_slots -= 1;
        }
        Ok(left)
    }

    /// Empty an occupied slot entirely (move source).
    pub fn vacate(
        &mut self,
        slot_id: SlotId,
        at: DateTime<Utc>,
    ) -> DomainResult<(ContainerCode, Weight)> {
        let code = self
            .slot(slot_id)?
            .container
            .ok_or_else(|| DomainError::invalid_state("source slot is empty"))?;
        let weight = self.slot(slot_id)?.current_weight;

        if weight.is_zero() {
            // A bound slot at zero weight has nothing to move.
            return Err(DomainError::insufficient_weight("source slot holds no weight"));
        }

        self.take(slot_id, code, weight, at)?;
        Ok((code, weight))
    }

    /// Bind a free slot to `code` with `amount` of weight (move destination).
    pub fn occupy(
        &mut self,
        slot_id: SlotId,
        code: ContainerCode,
        amount: Weight,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        if !self.slot(slot_id)?.is_free() {
            return Err(DomainError::invalid_state("destination slot is occupied"));
        }
        self.place(slot_id, code, amount, at)
    }

    /// Add weight to a slot without touching its container binding (refill
    /// target). Rejected on an unbound slot: that would break the
    /// unbound-implies-empty invariant.
    pub fn fill_keeping_binding(&mut self, slot_id: SlotId, amount: Weight) -> DomainResult<Weight> {
        if amount.is_zero() {
            return Ok(self.slot(slot_id)?.current_weight);
        }
        if amount > self.available() {
            return Err(DomainError::capacity_exceeded(format!(
                "shelf {} has {} available, cannot take {}",
                self.shelf_id,
                self.available(),
                amount
            )));
        }

        let shelf_id = self.shelf_id;
        let slot = self.slot_mut(slot_id)?;
        if slot.container.is_none() {
            return Err(DomainError::invalid_state(format!(
                "slot {}/{} is unbound and cannot be refilled",
                shelf_id, slot_id
            )));
        }
        if amount > slot.available() {
            return Err(DomainError::capacity_exceeded(format!(
                "slot {}/{} has {} available, cannot take {}",
                shelf_id,
                slot_id,
                slot.available(),
                amount
            )));
        }

        slot.current_weight = slot.current_weight.checked_add(amount)?;
        let after = slot.current_weight;
        self.current_weight = self.current_weight.checked_add(amount)?;
        Ok(after)
    }

    /// Remove weight from a slot without touching its container binding
    /// (refill source). The slot may legitimately end at zero while bound.
    pub fn drain_keeping_binding(
        &mut self,
        slot_id: SlotId,
        amount: Weight,
    ) -> DomainResult<Weight> {
        if amount.is_zero() {
            return Ok(self.slot(slot_id)?.current_weight);
        }

        let shelf_id = self.shelf_id;
        let slot = self.slot_mut(slot_id)?;
        let left = slot.current_weight.checked_sub(amount).ok_or_else(|| {
            DomainError::insufficient_weight(format!(
                "slot {}/{} holds {}, cannot drain {}",
                shelf_id, slot_id, slot.current_weight, amount
            ))
        })?;

        slot.current_weight = left;
        self.current_weight = self
            .current_weight
            .checked_sub(amount)
            .ok_or_else(|| DomainError::insufficient_weight("shelf total would go negative"))?;
        Ok(left)
    }

    /// Sum of slot weights; must always equal `current_weight`.
    pub fn slots_weight_total(&self) -> Weight {
        let grams: i64 = self.slots.iter().map(|s| s.current_weight.grams()).sum();
        Weight::from_grams(grams).unwrap_or(Weight::ZERO)
    }
}

impl Entity for ShelfRecord {
    type Id = ShelfId;

    fn id(&self) -> &Self::Id {
        &self.shelf_id
    }
}

impl VersionedRecord for ShelfRecord {
    fn version(&self) -> u64 {
        self.version
    }

    fn touch(&mut self) {
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kg(v: i64) -> Weight {
        Weight::from_kg(v).unwrap()
    }

    fn test_shelf(slot_caps_kg: &[i64], max_kg: i64) -> ShelfRecord {
        let caps: Vec<Weight> = slot_caps_kg.iter().map(|v| kg(*v)).collect();
        ShelfRecord::new(
            CenterId::new(),
            ShelfId::new(),
            ShelfType::Picker,
            "A",
            "fresh",
            "aisle-1",
            kg(max_kg),
            &caps,
        )
        .unwrap()
    }

    #[test]
    fn place_binds_and_tracks_aggregates() {
        let mut shelf = test_shelf(&[60, 50], 110);
        let code = ContainerCode::new();

        shelf.place(SlotId(0), code, kg(40), Utc::now()).unwrap();

        assert_eq!(shelf.current_weight(), kg(40));
        assert_eq!(shelf.occupied_slots(), 1);
        let slot = shelf.slot(SlotId(0)).unwrap();
        assert_eq!(slot.container(), Some(code));
        assert!(slot.occupied_at().is_some());
        assert_eq!(shelf.slots_weight_total(), shelf.current_weight());
    }

    #[test]
    fn place_rejects_slot_overflow() {
        let mut shelf = test_shelf(&[60], 100);
        let code = ContainerCode::new();

        let err = shelf.place(SlotId(0), code, kg(61), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::CapacityExceeded(_)));
        assert_eq!(shelf.current_weight(), Weight::ZERO);
        assert_eq!(shelf.occupied_slots(), 0);
    }

    #[test]
    fn place_respects_shelf_max_weight() {
        let mut shelf = test_shelf(&[60, 60], 80);
        let code = ContainerCode::new();

        shelf.place(SlotId(0), code, kg(60), Utc::now()).unwrap();
        let err = shelf
            .place(SlotId(1), code, kg(30), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::CapacityExceeded(_)));
        assert_eq!(shelf.current_weight(), kg(60));
    }

    #[test]
    fn place_rejects_foreign_bound_slot() {
        let mut shelf = test_shelf(&[60], 100);
        shelf
            .place(SlotId(0), ContainerCode::new(), kg(10), Utc::now())
            .unwrap();

        let err = shelf
            .place(SlotId(0), ContainerCode::new(), kg(10), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn take_to_zero_frees_the_slot() {
        let mut shelf = test_shelf(&[60], 100);
        let code = ContainerCode::new();
        shelf.place(SlotId(0), code, kg(60), Utc::now()).unwrap();

        let left = shelf.take(SlotId(0), code, kg(60), Utc::now()).unwrap();
        assert!(left.is_zero());

        let slot = shelf.slot(SlotId(0)).unwrap();
        assert!(slot.is_free());
        assert!(slot.emptied_at().is_some());
        assert_eq!(shelf.occupied_slots(), 0);
        assert_eq!(shelf.current_weight(), Weight::ZERO);
    }

    #[test]
    fn take_more_than_held_is_rejected_without_mutation() {
        let mut shelf = test_shelf(&[60], 100);
        let code = ContainerCode::new();
        shelf.place(SlotId(0), code, kg(30), Utc::now()).unwrap();

        let err = shelf.take(SlotId(0), code, kg(40), Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientWeight(_)));
        assert_eq!(shelf.slot(SlotId(0)).unwrap().current_weight(), kg(30));
        assert_eq!(shelf.current_weight(), kg(30));
    }

    #[test]
    fn unknown_slot_is_not_found() {
        let shelf = test_shelf(&[60], 100);
        assert!(matches!(
            shelf.slot(SlotId(9)).unwrap_err(),
            DomainError::NotFound
        ));
    }

    #[test]
    fn refill_keeps_binding_even_at_zero() {
        let mut shelf = test_shelf(&[30], 100);
        let code = ContainerCode::new();
        shelf.place(SlotId(0), code, kg(20), Utc::now()).unwrap();

        let left = shelf.drain_keeping_binding(SlotId(0), kg(20)).unwrap();
        assert!(left.is_zero());
        // Drained, but still bound: awaiting refill.
        assert_eq!(shelf.slot(SlotId(0)).unwrap().container(), Some(code));

        let after = shelf.fill_keeping_binding(SlotId(0), kg(25)).unwrap();
        assert_eq!(after, kg(25));
        assert_eq!(shelf.current_weight(), kg(25));
    }

    #[test]
    fn refill_into_unbound_slot_is_rejected() {
        let mut shelf = test_shelf(&[30], 100);
        let err = shelf.fill_keeping_binding(SlotId(0), kg(5)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn manhattan_distance_is_symmetric() {
        let a = GridPos { row: 2, col: 7 };
        let b = GridPos { row: 5, col: 3 };
        assert_eq!(a.manhattan_distance(b), 7);
        assert_eq!(b.manhattan_distance(a), 7);
    }
}
