//! Fixed-point weight value object.
//!
//! Weights are stored as whole grams in an `i64`. All bookkeeping arithmetic
//! is integer and checked; floating point appears only in advisory scoring,
//! never in slot/container accounting.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

const GRAMS_PER_KG: i64 = 1_000;

/// A non-negative weight with gram precision.
///
/// Compared by value; immutable (arithmetic returns new values).
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Weight(i64);

impl Weight {
    pub const ZERO: Weight = Weight(0);

    pub fn from_grams(grams: i64) -> DomainResult<Self> {
        if grams < 0 {
            return Err(DomainError::bad_request("weight cannot be negative"));
        }
        Ok(Self(grams))
    }

    /// Whole kilograms (convenience for configuration and tests).
    pub fn from_kg(kg: i64) -> DomainResult<Self> {
        let grams = kg
            .checked_mul(GRAMS_PER_KG)
            .ok_or_else(|| DomainError::bad_request("weight out of range"))?;
        Self::from_grams(grams)
    }

    pub fn grams(self) -> i64 {
        self.0
    }

    /// Kilograms as a float, for advisory scoring only.
    pub fn as_kg_f64(self) -> f64 {
        self.0 as f64 / GRAMS_PER_KG as f64
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Weight) -> DomainResult<Weight> {
        self.0
            .checked_add(other.0)
            .map(Weight)
            .ok_or_else(|| DomainError::bad_request("weight overflow"))
    }

    /// `None` when the result would be negative.
    pub fn checked_sub(self, other: Weight) -> Option<Weight> {
        let grams = self.0 - other.0;
        (grams >= 0).then_some(Weight(grams))
    }

    /// Difference clamped at zero.
    pub fn saturating_sub(self, other: Weight) -> Weight {
        Weight((self.0 - other.0).max(0))
    }

    pub fn min(self, other: Weight) -> Weight {
        Weight(self.0.min(other.0))
    }
}

impl core::fmt::Display for Weight {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:03}kg", self.0 / GRAMS_PER_KG, self.0 % GRAMS_PER_KG)
    }
}
