//! `harvesthub-warehouse` — warehouse domain records and pure operation
//! logic: container lifecycle, shelving, placement, consumption and
//! congestion scoring.
//!
//! Nothing here performs IO. Operations mutate record clones and the infra
//! layer commits them atomically.

pub mod container;
pub mod crowd;
pub mod event;
pub mod ops;
pub mod placement;
pub mod scoring;
pub mod shelf;

pub use container::{
    AuditNote, ContainerRecord, ContainerState, DistributedWeight, StorageLocation,
};
pub use crowd::{CrowdBreakdown, CrowdCounters, CrowdKind, CrowdReport, compute_crowd};
pub use event::WarehouseEvent;
pub use ops::{ConsumeOutcome, MoveOutcome, RefillOutcome};
pub use placement::{PlacementOutcome, PlacementSlice, place_remaining};
pub use scoring::{
    LocationCandidate, LocationFilters, LocationRanking, ScoringConfig, rank_locations,
};
pub use shelf::{GridPos, ShelfRecord, ShelfType, Slot};
