//! Repo Wars - Head-to-head Elo rating service for repositories
//!
//! This crate provides the Elo rating engine, the comparison submission
//! workflow with its consistency modes, pair selection, the leaderboard and
//! an axum HTTP API with health and Prometheus endpoints.

pub mod config;
pub mod error;
pub mod metrics;
pub mod rating;
pub mod service;
pub mod types;
pub mod utils;
pub mod wars;

// Re-export commonly used types and traits
pub use error::{Result, WarsError};
pub use types::*;

// Re-export key components
pub use rating::{EloRatingCalculator, InMemoryRatingStore, RatingCalculator, RatingStore};
pub use wars::{PairSelector, VoteWorkflow};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
