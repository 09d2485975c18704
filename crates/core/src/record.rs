//! Record identity and optimistic-concurrency primitives.

use crate::error::{DomainError, DomainResult};

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// A record whose persisted state is guarded by a monotonically increasing
/// version.
///
/// The store bumps the version once per committed write set; two operations
/// touching the same record serialize through the version check.
pub trait VersionedRecord: Entity {
    fn version(&self) -> u64;

    /// Advance the version by one. Called by the store on commit, never by
    /// domain code.
    fn touch(&mut self);
}

/// Optimistic concurrency expectation for a record in a write set.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (useful for administrative inserts, migrations).
    Any,
    /// Require the record to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}
