use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use harvesthub_core::{CenterId, ContainerCode, ShelfId, SlotId, Weight};
use harvesthub_events::Event;

use crate::container::ContainerState;
use crate::placement::PlacementSlice;

/// Event: ContainerRegistered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRegistered {
    pub code: ContainerCode,
    pub center_id: CenterId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ContainerStateChanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerStateChanged {
    pub code: ContainerCode,
    pub from: ContainerState,
    pub to: ContainerState,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WeightPlaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightPlaced {
    pub code: ContainerCode,
    pub placed: Weight,
    pub leftover: Weight,
    pub placements: Vec<PlacementSlice>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WeightConsumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightConsumed {
    pub code: ContainerCode,
    pub shelf_id: ShelfId,
    pub slot_id: SlotId,
    pub amount: Weight,
    pub new_total: Weight,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ContainerMoved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerMoved {
    pub code: ContainerCode,
    pub from_shelf: ShelfId,
    pub from_slot: SlotId,
    pub to_shelf: ShelfId,
    pub to_slot: SlotId,
    pub moved: Weight,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SlotRefilled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotRefilled {
    pub picker_shelf: ShelfId,
    pub picker_slot: SlotId,
    pub warehouse_shelf: ShelfId,
    pub warehouse_slot: SlotId,
    pub moved: Weight,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WarehouseEvent {
    ContainerRegistered(ContainerRegistered),
    ContainerStateChanged(ContainerStateChanged),
    WeightPlaced(WeightPlaced),
    WeightConsumed(WeightConsumed),
    ContainerMoved(ContainerMoved),
    SlotRefilled(SlotRefilled),
}

impl Event for WarehouseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WarehouseEvent::ContainerRegistered(_) => "warehouse.container.registered",
            WarehouseEvent::ContainerStateChanged(_) => "warehouse.container.state_changed",
            WarehouseEvent::WeightPlaced(_) => "warehouse.container.placed",
            WarehouseEvent::WeightConsumed(_) => "warehouse.container.consumed",
            WarehouseEvent::ContainerMoved(_) => "warehouse.container.moved",
            WarehouseEvent::SlotRefilled(_) => "warehouse.slot.refilled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WarehouseEvent::ContainerRegistered(e) => e.occurred_at,
            WarehouseEvent::ContainerStateChanged(e) => e.occurred_at,
            WarehouseEvent::WeightPlaced(e) => e.occurred_at,
            WarehouseEvent::WeightConsumed(e) => e.occurred_at,
            WarehouseEvent::ContainerMoved(e) => e.occurred_at,
            WarehouseEvent::SlotRefilled(e) => e.occurred_at,
        }
    }
}
