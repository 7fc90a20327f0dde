//! Rating system using the Elo algorithm
//!
//! This module provides the rating calculator, the Elo implementation and
//! the storage interface for rated entities.

pub mod calculator;
pub mod elo;
pub mod storage;

// Re-export commonly used types
pub use calculator::{RatingCalculator, RatingUpdate};
pub use elo::{EloRatingCalculator, ExtendedEloConfig};
pub use storage::{InMemoryRatingStore, PairWriteResult, RatingEntry, RatingStore};
