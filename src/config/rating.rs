//! Rating and vote workflow configuration

use crate::rating::elo::{DEFAULT_INITIAL_RATING, DEFAULT_K_FACTOR};
use crate::rating::ExtendedEloConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the two rows of a comparison are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsistencyMode {
    /// Two independent writes, one per entity. Concurrent votes on the
    /// same entity can overwrite each other.
    Independent,
    /// One compare-and-swap covering both rows, re-read on conflict
    Atomic,
}

impl fmt::Display for ConsistencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyMode::Independent => write!(f, "independent"),
            ConsistencyMode::Atomic => write!(f, "atomic"),
        }
    }
}

impl FromStr for ConsistencyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "independent" => Ok(ConsistencyMode::Independent),
            "atomic" => Ok(ConsistencyMode::Atomic),
            other => Err(format!("unknown consistency mode '{other}'")),
        }
    }
}

/// Rating settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingSettings {
    /// Maximum rating swing per comparison
    pub k_factor: f64,
    /// Baseline rating for newly registered entities
    pub initial_rating: f64,
    /// Persistence strategy for the two updated rows
    pub consistency: ConsistencyMode,
    /// Re-read attempts after a compare-and-swap conflict (atomic mode)
    pub max_conflict_retries: u32,
    /// Number of recent submission ids remembered for deduplication
    pub idempotency_window: usize,
    /// Leaderboard size when the caller does not ask for one
    pub leaderboard_default_limit: usize,
    /// Largest leaderboard a caller may request
    pub leaderboard_max_limit: usize,
}

impl Default for RatingSettings {
    fn default() -> Self {
        Self {
            k_factor: DEFAULT_K_FACTOR,
            initial_rating: DEFAULT_INITIAL_RATING,
            consistency: ConsistencyMode::Atomic,
            max_conflict_retries: 5,
            idempotency_window: 10_000,
            leaderboard_default_limit: 50,
            leaderboard_max_limit: 100,
        }
    }
}

impl RatingSettings {
    pub fn elo_config(&self) -> ExtendedEloConfig {
        ExtendedEloConfig::new(self.k_factor, self.initial_rating)
    }
}
