//! `harvesthub-events` — operation event distribution (mechanics only).
//!
//! Events here are **advisory**: they fan out committed warehouse operations
//! to dashboards and congestion displays. The warehouse store is the source
//! of truth; a lost event never corrupts state.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::InMemoryEventBus;
