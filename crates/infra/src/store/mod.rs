pub mod in_memory;
pub mod postgres;
mod r#trait;

pub use in_memory::InMemoryWarehouseStore;
pub use postgres::PostgresWarehouseStore;
pub use r#trait::{
    OccupancyQuery, ShelfOccupancySummary, StoreError, WarehouseStore, WriteSet,
};
