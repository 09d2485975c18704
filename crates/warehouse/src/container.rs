use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use harvesthub_core::{
    CenterId, ContainerCode, DomainError, DomainResult, Entity, ShelfId, SlotId, UserId,
    VersionedRecord, Weight,
};

/// Operational lifecycle of a container, from intake scan to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Arrived,
    Rejected,
    Cleaning,
    Cleaned,
    Weighing,
    Weighed,
    Sorting,
    Sorted,
    Stored,
    Shelved,
    Picked,
    Packaged,
    Dispatched,
    Depleted,
}

impl ContainerState {
    /// Whether `next` is a legal single-step transition from `self`.
    ///
    /// `Stored → Shelved` happens when a warehouse-stored container is moved
    /// onto picker/delivery shelving; `Picked → Shelved` resumes a container
    /// that still has weight left after picking paused.
    pub fn can_transition_to(self, next: ContainerState) -> bool {
        use ContainerState::*;
        matches!(
            (self, next),
            (Arrived, Cleaning)
                | (Arrived, Rejected)
                | (Cleaning, Cleaned)
                | (Cleaned, Weighing)
                | (Weighing, Weighed)
                | (Weighed, Sorting)
                | (Sorting, Sorted)
                | (Sorted, Stored)
                | (Sorted, Shelved)
                | (Stored, Shelved)
                | (Shelved, Picked)
                | (Shelved, Depleted)
                | (Picked, Shelved)
                | (Picked, Packaged)
                | (Picked, Depleted)
                | (Packaged, Dispatched)
        )
    }

    /// Terminal states never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ContainerState::Rejected | ContainerState::Dispatched | ContainerState::Depleted
        )
    }
}

impl core::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            ContainerState::Arrived => "arrived",
            ContainerState::Rejected => "rejected",
            ContainerState::Cleaning => "cleaning",
            ContainerState::Cleaned => "cleaned",
            ContainerState::Weighing => "weighing",
            ContainerState::Weighed => "weighed",
            ContainerState::Sorting => "sorting",
            ContainerState::Sorted => "sorted",
            ContainerState::Stored => "stored",
            ContainerState::Shelved => "shelved",
            ContainerState::Picked => "picked",
            ContainerState::Packaged => "packaged",
            ContainerState::Dispatched => "dispatched",
            ContainerState::Depleted => "depleted",
        };
        f.write_str(name)
    }
}

/// The portion of one container's weight located in one specific slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributedWeight {
    pub shelf_id: ShelfId,
    pub slot_id: SlotId,
    pub weight: Weight,
}

/// Denormalized pointer to a container's primary physical location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocation {
    pub area: String,
    pub zone: String,
    pub aisle: String,
    pub shelf_id: ShelfId,
    pub slot_id: SlotId,
}

/// Informational audit entry. Appended by operations, never read back by the
/// engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditNote {
    pub actor: UserId,
    pub at: DateTime<Utc>,
    pub note: String,
}

/// One physical container: lifecycle state plus the distribution of its
/// weight across shelf slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRecord {
    code: ContainerCode,
    center_id: CenterId,
    state: ContainerState,
    intended_weight: Weight,
    total_weight: Weight,
    distributed_weights: Vec<DistributedWeight>,
    location: Option<StorageLocation>,
    audit: Vec<AuditNote>,
    version: u64,
}

impl ContainerRecord {
    /// Create a freshly scanned container in `Arrived`.
    pub fn register(
        code: ContainerCode,
        center_id: CenterId,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Self {
        let mut record = Self {
            code,
            center_id,
            state: ContainerState::Arrived,
            intended_weight: Weight::ZERO,
            total_weight: Weight::ZERO,
            distributed_weights: Vec::new(),
            location: None,
            audit: Vec::new(),
            version: 0,
        };
        record.push_audit(actor, "registered at intake scan", at);
        record
    }

    pub fn code(&self) -> ContainerCode {
        self.code
    }

    pub fn center_id(&self) -> CenterId {
        self.center_id
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    pub fn intended_weight(&self) -> Weight {
        self.intended_weight
    }

    pub fn total_weight(&self) -> Weight {
        self.total_weight
    }

    pub fn distributed_weights(&self) -> &[DistributedWeight] {
        &self.distributed_weights
    }

    pub fn location(&self) -> Option<&StorageLocation> {
        self.location.as_ref()
    }

    pub fn audit(&self) -> &[AuditNote] {
        &self.audit
    }

    /// Weight still waiting to be placed into slots.
    pub fn remaining_to_place(&self) -> Weight {
        self.intended_weight.saturating_sub(self.total_weight)
    }

    /// The distributed entry for one `(shelf, slot)` pair, if any.
    pub fn entry(&self, shelf_id: ShelfId, slot_id: SlotId) -> Option<&DistributedWeight> {
        self.distributed_weights
            .iter()
            .find(|e| e.shelf_id == shelf_id && e.slot_id == slot_id)
    }

    /// The primary entry: the oldest surviving placement.
    pub fn primary_entry(&self) -> Option<&DistributedWeight> {
        self.distributed_weights.first()
    }

    /// Whether the denormalized location still points at a live entry.
    pub fn location_matches_primary(&self) -> bool {
        match (self.location.as_ref(), self.primary_entry()) {
            (Some(loc), Some(primary)) => {
                loc.shelf_id == primary.shelf_id && loc.slot_id == primary.slot_id
            }
            (None, None) => true,
            _ => false,
        }
    }

    pub fn set_location(&mut self, location: Option<StorageLocation>) {
        self.location = location;
    }

    pub fn push_audit(&mut self, actor: UserId, note: impl Into<String>, at: DateTime<Utc>) {
        self.audit.push(AuditNote {
            actor,
            at,
            note: note.into(),
        });
    }

    /// Single-step lifecycle transition; anything not in the table is an
    /// invalid-state error.
    pub fn transition_to(&mut self, next: ContainerState) -> DomainResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(DomainError::invalid_state(format!(
                "cannot transition container from {} to {}",
                self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Fix the declared weight during the weighing phase and advance to
    /// `Weighed`. Re-weighing is rejected.
    pub fn record_weighing(&mut self, intended: Weight) -> DomainResult<()> {
        if self.state != ContainerState::Weighing {
            return Err(DomainError::invalid_state(format!(
                "weighing requires a container in weighing, found {}",
                self.state
            )));
        }
        if intended.is_zero() {
            return Err(DomainError::bad_request("intended weight must be positive"));
        }
        if !self.intended_weight.is_zero() {
            return Err(DomainError::invalid_state(
                "intended weight has already been recorded",
            ));
        }
        self.intended_weight = intended;
        self.transition_to(ContainerState::Weighed)
    }

    /// Merge newly placed weight into the distribution.
    ///
    /// Invariant: the total may never exceed the intended weight.
    pub fn merge_placement(
        &mut self,
        shelf_id: ShelfId,
        slot_id: SlotId,
        amount: Weight,
    ) -> DomainResult<()> {
        if amount.is_zero() {
            return Err(DomainError::bad_request("placement amount must be positive"));
        }

        let new_total = self.total_weight.checked_add(amount)?;
        if new_total > self.intended_weight {
            return Err(DomainError::capacity_exceeded(format!(
                "placement would exceed intended weight ({} > {})",
                new_total, self.intended_weight
            )));
        }

        match self
            .distributed_weights
            .iter_mut()
            .find(|e| e.shelf_id == shelf_id && e.slot_id == slot_id)
        {
            Some(entry) => entry.weight = entry.weight.checked_add(amount)?,
            None => self.distributed_weights.push(DistributedWeight {
                shelf_id,
                slot_id,
                weight: amount,
            }),
        }

        self.total_weight = new_total;
        Ok(())
    }

    /// Consume weight from one slot's entry; prunes the entry at zero and
    /// applies the shelved/picked/depleted transition.
    ///
    /// Returns the weight left in that entry after consumption.
    pub fn consume_from_slot(
        &mut self,
        shelf_id: ShelfId,
        slot_id: SlotId,
        amount: Weight,
    ) -> DomainResult<Weight> {
        if amount.is_zero() {
            return Err(DomainError::bad_request("consume amount must be positive"));
        }

        let idx = self
            .distributed_weights
            .iter()
            .position(|e| e.shelf_id == shelf_id && e.slot_id == slot_id)
            .ok_or_else(|| {
                DomainError::insufficient_weight(format!(
                    "container {} holds no weight at {}/{}",
                    self.code, shelf_id, slot_id
                ))
            })?;

        let entry_weight = self.distributed_weights[idx].weight;
        let left = entry_weight.checked_sub(amount).ok_or_else(|| {
            DomainError::insufficient_weight(format!(
                "consume of {} exceeds the {} tracked at {}/{}",
                amount, entry_weight, shelf_id, slot_id
            ))
        })?;

        // Total going negative would be an invariant violation; the entry
        // check above already rules it out, but abort rather than wrap.
        let new_total = self.total_weight.checked_sub(amount).ok_or_else(|| {
            DomainError::insufficient_weight("container total would go negative")
        })?;

        if left.is_zero() {
            self.distributed_weights.remove(idx);
        } else {
            self.distributed_weights[idx].weight = left;
        }
        self.total_weight = new_total;

        if self.total_weight.is_zero() {
            self.transition_to(ContainerState::Depleted)?;
        } else if self.state == ContainerState::Shelved {
            self.transition_to(ContainerState::Picked)?;
        }

        Ok(left)
    }

    /// Replace the entry for the source slot with one for the destination
    /// slot (whole-entry relocation).
    pub fn relocate(
        &mut self,
        from_shelf: ShelfId,
        from_slot: SlotId,
        to_shelf: ShelfId,
        to_slot: SlotId,
    ) -> DomainResult<Weight> {
        if self.entry(to_shelf, to_slot).is_some() {
            return Err(DomainError::invalid_state(format!(
                "container {} already holds weight at {}/{}",
                self.code, to_shelf, to_slot
            )));
        }

        let entry = self
            .distributed_weights
            .iter_mut()
            .find(|e| e.shelf_id == from_shelf && e.slot_id == from_slot)
            .ok_or_else(|| {
                DomainError::invalid_state(format!(
                    "container {} holds no weight at {}/{}",
                    self.code, from_shelf, from_slot
                ))
            })?;

        entry.shelf_id = to_shelf;
        entry.slot_id = to_slot;
        Ok(entry.weight)
    }

    /// Sum of all distributed entries; must always equal `total_weight`.
    pub fn distributed_total(&self) -> Weight {
        let grams: i64 = self.distributed_weights.iter().map(|e| e.weight.grams()).sum();
        Weight::from_grams(grams).unwrap_or(Weight::ZERO)
    }
}

impl Entity for ContainerRecord {
    type Id = ContainerCode;

    fn id(&self) -> &Self::Id {
        &self.code
    }
}

impl VersionedRecord for ContainerRecord {
    fn version(&self) -> u64 {
        self.version
    }

    fn touch(&mut self) {
        self.version += 1;
    }
}
