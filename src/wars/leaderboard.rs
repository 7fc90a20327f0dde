//! Ranked view of the rated entities

use crate::config::RatingSettings;
use crate::error::{Result, WarsError};
use crate::rating::storage::RatingStore;
use crate::types::LeaderboardEntry;
use std::sync::Arc;

pub struct Leaderboard {
    store: Arc<dyn RatingStore>,
    default_limit: usize,
    max_limit: usize,
}

impl Leaderboard {
    pub fn new(store: Arc<dyn RatingStore>, settings: &RatingSettings) -> Self {
        Self {
            store,
            default_limit: settings.leaderboard_default_limit,
            max_limit: settings.leaderboard_max_limit,
        }
    }

    /// Highest rated entities with 1-based ranks. Requests above the
    /// configured maximum are capped.
    pub async fn top(&self, limit: Option<usize>) -> Result<Vec<LeaderboardEntry>> {
        let limit = limit.unwrap_or(self.default_limit);
        if limit == 0 {
            return Err(WarsError::invalid_input("limit must be at least 1").into());
        }

        let entries = self.store.top_rated(limit.min(self.max_limit)).await?;

        Ok(entries
            .iter()
            .enumerate()
            .map(|(index, entry)| LeaderboardEntry {
                rank: index + 1,
                contender: entry.to_contender(),
            })
            .collect())
    }
}
