//! Test fixtures shared by the integration tests

#![allow(dead_code)]

use repo_wars::config::ConsistencyMode;
use repo_wars::rating::storage::TestRatingStore;
use repo_wars::rating::{EloRatingCalculator, InMemoryRatingStore, RatingEntry, RatingStore};
use repo_wars::types::EntitySummary;
use repo_wars::wars::{VoteWorkflow, WorkflowSettings};
use std::sync::Arc;
use std::time::Duration;

/// Build a stored entity with a given rating and match count
pub fn entry(id: &str, rating: f64, matches_played: u64) -> RatingEntry {
    let mut entity = EntitySummary::new(id, id.rsplit('/').next().unwrap_or(id));
    entity.owner = id.split('/').next().map(str::to_string);
    entity.stars = 100;

    let mut entry = RatingEntry::new(entity, rating);
    entry.matches_played = matches_played;
    entry
}

/// In-memory store seeded with `(id, rating, matches_played)` rows
pub fn seeded_store(rows: &[(&str, f64, u64)]) -> Arc<InMemoryRatingStore> {
    Arc::new(InMemoryRatingStore::with_entries(
        rows.iter()
            .map(|(id, rating, matches)| entry(id, *rating, *matches)),
    ))
}

/// Instrumented store seeded with `(id, rating, matches_played)` rows
pub fn instrumented_store(rows: &[(&str, f64, u64)]) -> Arc<TestRatingStore> {
    Arc::new(TestRatingStore::with_entries(
        rows.iter()
            .map(|(id, rating, matches)| entry(id, *rating, *matches)),
    ))
}

/// `count` repositories at the baseline rating
pub fn baseline_store(count: usize) -> Arc<InMemoryRatingStore> {
    Arc::new(InMemoryRatingStore::with_entries((0..count).map(|i| {
        entry(&format!("owner-{}/repo-{}", i % 3, i), 1200.0, 0)
    })))
}

/// Workflow settings without retry back-off
pub fn fast_settings(mode: ConsistencyMode) -> WorkflowSettings {
    WorkflowSettings::default()
        .with_mode(mode)
        .with_retry_delay(Duration::ZERO)
}

/// Default Elo workflow over `store`
pub fn workflow(store: Arc<dyn RatingStore>, mode: ConsistencyMode) -> VoteWorkflow {
    VoteWorkflow::new(
        store,
        Arc::new(EloRatingCalculator::default()),
        fast_settings(mode),
    )
}

/// Current `(rating, matches_played)` of a row
pub async fn snapshot(store: &dyn RatingStore, id: &str) -> (f64, u64) {
    let rows = store
        .fetch_entries(&[id.to_string()])
        .await
        .expect("fetch should succeed");
    let row = rows.first().expect("row should exist");
    (row.rating, row.matches_played)
}
