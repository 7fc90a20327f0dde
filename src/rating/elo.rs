//! Elo rating system implementation
//!
//! Classic two-player Elo with a fixed K-factor. Expected scores for both
//! sides are computed independently and new ratings are rounded to the
//! nearest integer, half away from zero (`f64::round`). For non-negative
//! ratings this agrees with JavaScript's `Math.round`.

use crate::error::WarsError;
use crate::rating::calculator::{RatingCalculator, RatingUpdate};
use serde::{Deserialize, Serialize};
use skillratings::elo::EloConfig;

/// Default baseline rating for newly registered entities
pub const DEFAULT_INITIAL_RATING: f64 = 1200.0;

/// Default K-factor
pub const DEFAULT_K_FACTOR: f64 = 32.0;

/// Rating gap that corresponds to 10:1 odds
const ELO_SCALE: f64 = 400.0;

/// Extended configuration for the Elo rating system
/// This wraps the skillratings EloConfig with the baseline rating
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendedEloConfig {
    /// Core Elo parameters (K-factor)
    pub elo_config: EloConfig,
    /// Initial rating for new entities
    pub initial_rating: f64,
}

impl Default for ExtendedEloConfig {
    fn default() -> Self {
        Self {
            elo_config: EloConfig {
                k: DEFAULT_K_FACTOR,
            },
            initial_rating: DEFAULT_INITIAL_RATING,
        }
    }
}

impl ExtendedEloConfig {
    pub fn new(k_factor: f64, initial_rating: f64) -> Self {
        Self {
            elo_config: EloConfig { k: k_factor },
            initial_rating,
        }
    }

    pub fn k_factor(&self) -> f64 {
        self.elo_config.k
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> crate::error::Result<()> {
        if !self.elo_config.k.is_finite() || self.elo_config.k <= 0.0 {
            return Err(WarsError::ConfigurationError {
                message: "K-factor must be a positive finite number".to_string(),
            }
            .into());
        }

        if !self.initial_rating.is_finite() {
            return Err(WarsError::ConfigurationError {
                message: "Initial rating must be finite".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Elo rating calculator implementation
#[derive(Debug, Clone)]
pub struct EloRatingCalculator {
    config: ExtendedEloConfig,
}

impl EloRatingCalculator {
    /// Create a new Elo rating calculator
    pub fn new(config: ExtendedEloConfig) -> crate::error::Result<Self> {
        config.validate()?;

        Ok(Self { config })
    }

    pub fn k_factor(&self) -> f64 {
        self.config.k_factor()
    }

    /// Unrounded rating gain of a winner rated `winner_rating` over `loser_rating`
    pub fn winner_gain(&self, winner_rating: f64, loser_rating: f64) -> f64 {
        self.k_factor() * (1.0 - expected_score(winner_rating, loser_rating))
    }
}

impl Default for EloRatingCalculator {
    fn default() -> Self {
        Self {
            config: ExtendedEloConfig::default(),
        }
    }
}

/// `1 / (1 + 10^((opponent - rating) / 400))`
pub fn expected_score(rating: f64, opponent_rating: f64) -> f64 {
    1.0 / (1.0 + 10_f64.powf((opponent_rating - rating) / ELO_SCALE))
}

fn ensure_finite(name: &str, value: f64) -> crate::error::Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(WarsError::invalid_input(format!("{name} must be a finite number, got {value}")).into())
    }
}

impl RatingCalculator for EloRatingCalculator {
    fn compute_updated_ratings(
        &self,
        winner_rating: f64,
        loser_rating: f64,
    ) -> crate::error::Result<RatingUpdate> {
        ensure_finite("winner rating", winner_rating)?;
        ensure_finite("loser rating", loser_rating)?;

        let k = self.k_factor();
        let expected_winner = expected_score(winner_rating, loser_rating);
        let expected_loser = expected_score(loser_rating, winner_rating);

        Ok(RatingUpdate {
            new_winner_rating: (winner_rating + k * (1.0 - expected_winner)).round(),
            new_loser_rating: (loser_rating + k * (0.0 - expected_loser)).round(),
        })
    }

    fn expected_score(&self, rating: f64, opponent_rating: f64) -> f64 {
        expected_score(rating, opponent_rating)
    }

    fn initial_rating(&self) -> f64 {
        self.config.initial_rating
    }

    fn config(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null)
    }
}
