//! Engine configuration from environment variables.

use anyhow::Context;

use harvesthub_warehouse::{ScoringConfig, ShelfType};

/// Tunables for the warehouse engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// How many times an operation is retried after an optimistic commit
    /// conflict before the conflict is surfaced to the caller.
    pub max_commit_retries: u32,
    /// Crowd score at or above which a shelf reports `crowded`.
    pub crowded_threshold: u8,
    /// Shelf-type preference for the best-location scorer.
    pub scoring: ScoringConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_commit_retries: 4,
            crowded_threshold: 70,
            scoring: ScoringConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from the environment, falling back to defaults per variable.
    ///
    /// - `HARVESTHUB_MAX_COMMIT_RETRIES` — non-negative integer
    /// - `HARVESTHUB_CROWDED_THRESHOLD` — 0..=100
    /// - `HARVESTHUB_TYPE_PREFERENCE` — comma-separated shelf types, most
    ///   preferred first (e.g. "picker,delivery,warehouse")
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("HARVESTHUB_MAX_COMMIT_RETRIES") {
            config.max_commit_retries = raw
                .parse()
                .context("HARVESTHUB_MAX_COMMIT_RETRIES must be a non-negative integer")?;
        }

        if let Ok(raw) = std::env::var("HARVESTHUB_CROWDED_THRESHOLD") {
            let threshold: u8 = raw
                .parse()
                .context("HARVESTHUB_CROWDED_THRESHOLD must be an integer in 0..=100")?;
            anyhow::ensure!(
                threshold <= 100,
                "HARVESTHUB_CROWDED_THRESHOLD must be at most 100, got {threshold}"
            );
            config.crowded_threshold = threshold;
        }

        if let Ok(raw) = std::env::var("HARVESTHUB_TYPE_PREFERENCE") {
            config.scoring.type_preference = parse_type_preference(&raw)
                .context("HARVESTHUB_TYPE_PREFERENCE must list picker, delivery and warehouse once each")?;
        }

        Ok(config)
    }
}

fn parse_shelf_type(raw: &str) -> anyhow::Result<ShelfType> {
    match raw.trim() {
        "warehouse" => Ok(ShelfType::Warehouse),
        "picker" => Ok(ShelfType::Picker),
        "delivery" => Ok(ShelfType::Delivery),
        other => anyhow::bail!("unknown shelf type '{other}'"),
    }
}

fn parse_type_preference(raw: &str) -> anyhow::Result<[ShelfType; 3]> {
    let types: Vec<ShelfType> = raw
        .split(',')
        .map(parse_shelf_type)
        .collect::<anyhow::Result<_>>()?;

    let [a, b, c] = types.as_slice() else {
        anyhow::bail!("expected exactly three shelf types, got {}", types.len());
    };
    anyhow::ensure!(
        a != b && b != c && a != c,
        "shelf types must be distinct"
    );
    Ok([*a, *b, *c])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_prefer_picker_shelving() {
        let config = EngineConfig::default();
        assert_eq!(config.max_commit_retries, 4);
        assert_eq!(config.crowded_threshold, 70);
        assert_eq!(
            config.scoring.type_preference,
            [ShelfType::Picker, ShelfType::Delivery, ShelfType::Warehouse]
        );
    }

    #[test]
    fn parses_a_full_preference_list() {
        let pref = parse_type_preference("delivery, picker, warehouse").unwrap();
        assert_eq!(
            pref,
            [ShelfType::Delivery, ShelfType::Picker, ShelfType::Warehouse]
        );
    }

    #[test]
    fn rejects_duplicate_or_short_preference_lists() {
        assert!(parse_type_preference("picker,picker,warehouse").is_err());
        assert!(parse_type_preference("picker,delivery").is_err());
        assert!(parse_type_preference("picker,delivery,loading-dock").is_err());
    }
}
