//! Rating calculator trait and test implementation
//!
//! This module defines the interface the vote workflow uses to turn a
//! comparison outcome into new ratings.

use serde::{Deserialize, Serialize};

/// New ratings for both sides of a single comparison
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingUpdate {
    pub new_winner_rating: f64,
    pub new_loser_rating: f64,
}

impl RatingUpdate {
    pub fn winner_delta(&self, old_winner_rating: f64) -> f64 {
        self.new_winner_rating - old_winner_rating
    }

    pub fn loser_delta(&self, old_loser_rating: f64) -> f64 {
        self.new_loser_rating - old_loser_rating
    }
}

/// Trait for calculating rating changes after a pairwise comparison
pub trait RatingCalculator: Send + Sync {
    /// Calculate new ratings for the winner and the loser of a comparison
    ///
    /// # Arguments
    /// * `winner_rating` - current rating of the entity the voter picked
    /// * `loser_rating` - current rating of the other entity
    ///
    /// # Returns
    /// The two new ratings, or `InvalidInput` for non-finite inputs
    fn compute_updated_ratings(
        &self,
        winner_rating: f64,
        loser_rating: f64,
    ) -> crate::error::Result<RatingUpdate>;

    /// Probability that an entity rated `rating` beats one rated `opponent_rating`
    fn expected_score(&self, rating: f64, opponent_rating: f64) -> f64;

    /// Get the initial rating for new entities
    fn initial_rating(&self) -> f64;

    /// Get current configuration as JSON
    fn config(&self) -> serde_json::Value;
}

/// Mock rating calculator for testing
#[derive(Debug)]
pub struct MockRatingCalculator {
    calculation_calls: std::sync::Mutex<Vec<(f64, f64)>>,
    fixed_delta: f64,
    initial_rating: f64,
}

impl MockRatingCalculator {
    /// Calculator that moves the winner up and the loser down by `fixed_delta`
    pub fn new(fixed_delta: f64) -> Self {
        Self {
            calculation_calls: std::sync::Mutex::new(Vec::new()),
            fixed_delta,
            initial_rating: 1200.0,
        }
    }

    /// Get all calculation calls made (for testing)
    pub fn get_calculation_calls(&self) -> Vec<(f64, f64)> {
        self.calculation_calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Clear recorded calls
    pub fn clear_calls(&self) {
        if let Ok(mut calls) = self.calculation_calls.lock() {
            calls.clear();
        }
    }
}

impl Default for MockRatingCalculator {
    fn default() -> Self {
        Self::new(10.0)
    }
}

impl RatingCalculator for MockRatingCalculator {
    fn compute_updated_ratings(
        &self,
        winner_rating: f64,
        loser_rating: f64,
    ) -> crate::error::Result<RatingUpdate> {
        if let Ok(mut calls) = self.calculation_calls.lock() {
            calls.push((winner_rating, loser_rating));
        }

        Ok(RatingUpdate {
            new_winner_rating: winner_rating + self.fixed_delta,
            new_loser_rating: loser_rating - self.fixed_delta,
        })
    }

    fn expected_score(&self, _rating: f64, _opponent_rating: f64) -> f64 {
        0.5
    }

    fn initial_rating(&self) -> f64 {
        self.initial_rating
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "mock",
            "fixed_delta": self.fixed_delta,
            "initial_rating": self.initial_rating
        })
    }
}
