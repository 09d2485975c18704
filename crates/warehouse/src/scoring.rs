//! Best-location scoring: where should work on a container happen next.
//!
//! Candidates are the slots already holding the container's weight. Hard
//! filters exclude; everything else is a weighted score. Float math is fine
//! here — the ranking is advisory and never feeds back into weight
//! bookkeeping.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use harvesthub_core::{ShelfId, SlotId, Weight};

use crate::container::ContainerRecord;
use crate::shelf::{GridPos, ShelfRecord, ShelfType};

const LOG_WEIGHT_FACTOR: f64 = 1.25;
const AVOID_PENALTY: f64 = -5.0;
const BUSY_SCORE_FACTOR: f64 = 0.04;
const LIVE_TASK_FACTOR: f64 = 0.5;

/// Boosts by preference rank: most preferred type first.
const TYPE_BOOSTS: [f64; 3] = [3.0, 1.5, 0.0];

/// Shelf-type preference ordering for the scorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub type_preference: [ShelfType; 3],
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            type_preference: [ShelfType::Picker, ShelfType::Delivery, ShelfType::Warehouse],
        }
    }
}

impl ScoringConfig {
    fn type_boost(&self, shelf_type: ShelfType) -> f64 {
        self.type_preference
            .iter()
            .position(|t| *t == shelf_type)
            .map(|rank| TYPE_BOOSTS[rank])
            .unwrap_or(0.0)
    }
}

/// Hard filters and scoring inputs for one ranking request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationFilters {
    /// Only consider shelves of this type.
    pub shelf_type: Option<ShelfType>,
    /// Only consider shelves in this zone.
    pub zone: Option<String>,
    /// Exclude temporarily-avoided shelves entirely instead of penalizing.
    pub exclude_avoided: bool,
    /// Exclude shelves whose busy score is above this ceiling.
    pub max_busy_score: Option<u8>,
    /// Minimum slot weight worth walking to.
    pub min_weight: Option<Weight>,
    /// Demand: how much the caller needs to pick.
    pub required_weight: Option<Weight>,
    /// Where the worker currently is, for proximity scoring.
    pub origin: Option<GridPos>,
}

/// One scored candidate slot.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationCandidate {
    pub shelf_id: ShelfId,
    pub slot_id: SlotId,
    pub weight: Weight,
    pub score: f64,
    pub busy_score: u8,
    pub live_tasks: u32,
}

/// Ranked answer: `best` is the head of `candidates`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationRanking {
    pub best: Option<LocationCandidate>,
    pub candidates: Vec<LocationCandidate>,
}

fn proximity_boost(distance: f64) -> f64 {
    2.5 / (1.0 + distance / 4.0)
}

fn demand_fit_boost(slot_kg: f64, required_kg: f64) -> f64 {
    if required_kg <= 0.0 {
        return 0.0;
    }
    let coverage = (slot_kg / required_kg).min(1.0);
    let excess = ((slot_kg - required_kg) / required_kg).clamp(0.0, 1.0);
    2.2 * coverage.sqrt() - 0.3 * excess
}

/// Score every slot currently holding the container's weight.
///
/// Ordering is fully deterministic: score descending, then weight
/// descending, busy score ascending, live tasks ascending, and finally
/// shelf/slot id ascending.
pub fn rank_locations(
    container: &ContainerRecord,
    shelves: &[ShelfRecord],
    congestion: &HashMap<ShelfId, u32>,
    filters: &LocationFilters,
    config: &ScoringConfig,
) -> LocationRanking {
    let threshold = match (filters.min_weight, filters.required_weight) {
        (Some(min), Some(required)) => Some(min.max(required)),
        (Some(min), None) => Some(min),
        (None, Some(required)) => Some(required),
        (None, None) => None,
    };

    let mut candidates = Vec::new();

    for entry in container.distributed_weights() {
        let Some(shelf) = shelves.iter().find(|s| s.shelf_id() == entry.shelf_id) else {
            continue;
        };

        // Hard filters: excluded, not penalized.
        if shelf.center_id() != container.center_id() {
            continue;
        }
        if filters.shelf_type.is_some_and(|t| shelf.shelf_type() != t) {
            continue;
        }
        if filters.zone.as_deref().is_some_and(|z| shelf.zone() != z) {
            continue;
        }
        if filters.exclude_avoided && shelf.is_temporarily_avoid() {
            continue;
        }
        if filters
            .max_busy_score
            .is_some_and(|ceiling| shelf.busy_score() > ceiling)
        {
            continue;
        }
        if threshold.is_some_and(|t| entry.weight < t) {
            continue;
        }

        let live_tasks = congestion.get(&shelf.shelf_id()).copied().unwrap_or(0);
        let slot_kg = entry.weight.as_kg_f64();

        let mut score = LOG_WEIGHT_FACTOR * (1.0 + slot_kg).ln();
        score += config.type_boost(shelf.shelf_type());
        if let (Some(origin), Some(grid)) = (filters.origin, shelf.grid()) {
            score += proximity_boost(f64::from(origin.manhattan_distance(grid)));
        }
        if let Some(required) = filters.required_weight {
            score += demand_fit_boost(slot_kg, required.as_kg_f64());
        }
        if shelf.is_temporarily_avoid() {
            score += AVOID_PENALTY;
        }
        score -= BUSY_SCORE_FACTOR * f64::from(shelf.busy_score());
        score -= LIVE_TASK_FACTOR * f64::from(live_tasks);

        candidates.push(LocationCandidate {
            shelf_id: shelf.shelf_id(),
            slot_id: entry.slot_id,
            weight: entry.weight,
            score,
            busy_score: shelf.busy_score(),
            live_tasks,
        });
    }

    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(core::cmp::Ordering::Equal)
            .then_with(|| b.weight.cmp(&a.weight))
            .then_with(|| a.busy_score.cmp(&b.busy_score))
            .then_with(|| a.live_tasks.cmp(&b.live_tasks))
            .then_with(|| a.shelf_id.cmp(&b.shelf_id))
            .then_with(|| a.slot_id.cmp(&b.slot_id))
    });

    LocationRanking {
        best: candidates.first().cloned(),
        candidates,
    }
}
