//! Advisory congestion scoring for one shelf.
//!
//! Counters are shelf-scoped tallies of in-flight human tasks. They live in
//! a shared counter store (see infra) and are allowed to be stale or lost;
//! nothing here gates a correctness-critical decision.

use serde::{Deserialize, Serialize};

/// Kind of in-flight human task at a shelf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrowdKind {
    Pick,
    Sort,
    Audit,
}

impl core::fmt::Display for CrowdKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            CrowdKind::Pick => "pick",
            CrowdKind::Sort => "sort",
            CrowdKind::Audit => "audit",
        };
        f.write_str(name)
    }
}

/// Live task tallies for one shelf. Deltas saturate at zero: a stray
/// decrement never produces a negative counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrowdCounters {
    pub pick: u32,
    pub sort: u32,
    pub audit: u32,
}

impl CrowdCounters {
    pub fn get(&self, kind: CrowdKind) -> u32 {
        match kind {
            CrowdKind::Pick => self.pick,
            CrowdKind::Sort => self.sort,
            CrowdKind::Audit => self.audit,
        }
    }

    pub fn bump(&mut self, kind: CrowdKind, delta: i32) {
        let slot = match kind {
            CrowdKind::Pick => &mut self.pick,
            CrowdKind::Sort => &mut self.sort,
            CrowdKind::Audit => &mut self.audit,
        };
        *slot = slot.saturating_add_signed(delta);
    }

    /// Total in-flight tasks across all kinds.
    pub fn total(&self) -> u32 {
        self.pick + self.sort + self.audit
    }
}

/// Inputs the crowd score was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrowdBreakdown {
    pub pick: u32,
    pub sort: u32,
    pub audit: u32,
    pub occupancy_pct: u8,
}

/// Advisory congestion signal for one shelf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrowdReport {
    /// 0–100; higher means busier.
    pub score: u8,
    pub crowded: bool,
    pub breakdown: CrowdBreakdown,
}

// Picks dominate: they put a person in the aisle for the longest.
const PICK_LOAD: u32 = 10;
const SORT_LOAD: u32 = 6;
const AUDIT_LOAD: u32 = 4;

/// Combine live task counts with slot occupancy into a 0–100 score.
///
/// Integer arithmetic throughout, so two instances reading the same
/// counters always report the same score.
pub fn compute_crowd(
    counters: &CrowdCounters,
    occupied_slots: u32,
    total_slots: u32,
    crowded_threshold: u8,
) -> CrowdReport {
    let task_load = (PICK_LOAD * counters.pick
        + SORT_LOAD * counters.sort
        + AUDIT_LOAD * counters.audit)
        .min(100);

    let occupancy_pct = if total_slots == 0 {
        0
    } else {
        ((occupied_slots * 100) / total_slots).min(100) as u8
    };

    let score = ((6 * task_load + 4 * u32::from(occupancy_pct)) / 10).min(100) as u8;

    CrowdReport {
        score,
        crowded: score >= crowded_threshold,
        breakdown: CrowdBreakdown {
            pick: counters.pick,
            sort: counters.sort,
            audit: counters.audit,
            occupancy_pct,
        },
    }
}
