//! Infrastructure layer: warehouse store, operation engine, crowd counters,
//! configuration.

pub mod config;
pub mod crowd;
pub mod engine;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use config::EngineConfig;
pub use crowd::{CrowdStore, CrowdStoreError, InMemoryCrowdStore};
pub use engine::{EngineError, InMemoryEngine, WarehouseEngine};
pub use store::{
    InMemoryWarehouseStore, OccupancyQuery, PostgresWarehouseStore, ShelfOccupancySummary,
    StoreError, WarehouseStore, WriteSet,
};
