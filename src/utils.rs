//! Utility functions for the rating service

use crate::types::SubmissionId;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique submission ID
pub fn generate_submission_id() -> SubmissionId {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Calculate the absolute difference between two ratings
pub fn rating_difference(rating1: f64, rating2: f64) -> f64 {
    (rating1 - rating2).abs()
}

/// Descending rating order with ties broken by matches played, then id
pub fn leaderboard_order(
    a: (f64, u64, &str),
    b: (f64, u64, &str),
) -> std::cmp::Ordering {
    b.0.partial_cmp(&a.0)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| b.1.cmp(&a.1))
        .then_with(|| a.2.cmp(b.2))
}
