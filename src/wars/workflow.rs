//! Comparison submission workflow
//!
//! Takes a vote between two entities, reads both current ratings, runs the
//! rating calculator and persists both new ratings. Persistence follows the
//! configured [`ConsistencyMode`]:
//!
//! - `Independent` writes the two rows one after the other. Two votes that
//!   touch the same entity at the same time can overwrite each other.
//! - `Atomic` writes both rows with one compare-and-swap on the versions
//!   that were read, re-reading and recomputing when another vote won.

use crate::config::{AppConfig, ConsistencyMode};
use crate::error::{is_transient, wars_error, Result, WarsError};
use crate::metrics::MetricsCollector;
use crate::rating::calculator::RatingCalculator;
use crate::rating::storage::{PairWriteResult, RatingEntry, RatingStore};
use crate::rating::RatingUpdate;
use crate::types::{
    ComparisonResult, ConditionalUpdate, Contender, EntityId, EntitySummary, EntityUpdate,
    RatingChange, SubmissionId, VoteOutcome, VoteSubmission,
};
use crate::utils::{current_timestamp, rating_difference};
use crate::wars::ledger::{Reservation, SubmissionLedger};
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tunables for vote processing
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// How the two updated rows are persisted
    pub mode: ConsistencyMode,
    /// Attempts at the compare-and-swap write before giving up (atomic mode)
    pub max_conflict_retries: u32,
    /// Attempts for a store call failing with a transient error
    pub max_store_attempts: u32,
    /// Pause between transient store retries
    pub retry_delay: Duration,
    /// Submission ids remembered for deduplication
    pub idempotency_window: usize,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl WorkflowSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            mode: config.rating.consistency,
            max_conflict_retries: config.rating.max_conflict_retries,
            max_store_attempts: config.store.max_retry_attempts,
            retry_delay: config.store_retry_delay(),
            idempotency_window: config.rating.idempotency_window,
        }
    }

    pub fn with_mode(mut self, mode: ConsistencyMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }
}

/// Statistics about vote processing
#[derive(Debug, Clone, Default)]
pub struct WorkflowStats {
    /// Votes whose rating changes were persisted
    pub votes_applied: u64,
    /// Votes acknowledged as repeats of an earlier submission id
    pub duplicate_votes: u64,
    /// Votes rejected or failed
    pub votes_failed: u64,
    /// Compare-and-swap conflicts that forced a re-read
    pub conflicts: u64,
    /// Votes that left only the winner updated
    pub partial_updates: u64,
    /// Entities registered through the workflow
    pub entities_registered: u64,
}

/// The vote workflow
#[derive(Clone)]
pub struct VoteWorkflow {
    /// Persistent ratings
    store: Arc<dyn RatingStore>,
    /// Rating calculator for the update math
    calculator: Arc<dyn RatingCalculator>,
    /// Processing settings
    settings: WorkflowSettings,
    /// Recently seen submission ids
    ledger: Arc<SubmissionLedger>,
    /// Workflow statistics
    stats: Arc<RwLock<WorkflowStats>>,
    /// Metrics collector for recording performance data
    metrics_collector: Arc<MetricsCollector>,
}

impl VoteWorkflow {
    /// Create a new workflow with its own metrics collector
    pub fn new(
        store: Arc<dyn RatingStore>,
        calculator: Arc<dyn RatingCalculator>,
        settings: WorkflowSettings,
    ) -> Self {
        let metrics_collector = Arc::new(MetricsCollector::new().unwrap_or_else(|_| {
            warn!("Failed to create metrics collector, using default");
            MetricsCollector::default()
        }));

        Self::with_metrics(store, calculator, settings, metrics_collector)
    }

    /// Create a new workflow with metrics collector
    pub fn with_metrics(
        store: Arc<dyn RatingStore>,
        calculator: Arc<dyn RatingCalculator>,
        settings: WorkflowSettings,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            store,
            calculator,
            ledger: Arc::new(SubmissionLedger::new(settings.idempotency_window)),
            settings,
            stats: Arc::new(RwLock::new(WorkflowStats::default())),
            metrics_collector,
        }
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    /// Get a snapshot of the workflow statistics
    pub fn stats(&self) -> WorkflowStats {
        self.stats
            .read()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }

    /// Record the outcome of a head-to-head vote
    ///
    /// # Errors
    /// - `InvalidInput` for empty or identical ids, before the store is touched
    /// - `NotFound` if either entity does not exist (nothing is written)
    /// - `Conflict` if the compare-and-swap kept losing (atomic mode)
    /// - `StoreUnavailable` if reading kept failing transiently
    /// - `StoreWriteFailure` if a write kept failing, or the loser vanished
    ///   after the winner's row was written; `partial` is set in that case
    /// - `SubmissionInProgress` while an earlier request with the same
    ///   submission id is still running
    pub async fn submit_comparison(&self, vote: VoteSubmission) -> Result<VoteOutcome> {
        let timer = self.metrics_collector.start_timer();
        let result = self.process_vote(&vote).await;
        let duration = timer.stop();

        match &result {
            Ok(VoteOutcome::Applied(applied)) => {
                self.metrics_collector.record_vote("applied", duration);
                self.metrics_collector
                    .record_rating_delta(applied.winner.delta);
                self.bump_stats(|stats| stats.votes_applied += 1);
            }
            Ok(VoteOutcome::Duplicate { .. }) => {
                self.metrics_collector.record_vote("duplicate", duration);
                self.bump_stats(|stats| stats.duplicate_votes += 1);
            }
            Err(e) => {
                self.metrics_collector
                    .record_vote(outcome_label(e), duration);
                self.bump_stats(|stats| stats.votes_failed += 1);
                if is_partial(e) {
                    self.metrics_collector.record_partial_update();
                    self.bump_stats(|stats| stats.partial_updates += 1);
                }
                debug!(
                    "Vote {} over {} rejected: {}",
                    vote.winner_id, vote.loser_id, e
                );
            }
        }

        result
    }

    async fn process_vote(&self, vote: &VoteSubmission) -> Result<VoteOutcome> {
        validate_ids(&vote.winner_id, &vote.loser_id)?;

        let claim = match vote.submission_id {
            Some(submission_id) => match self.ledger.try_reserve(submission_id) {
                Reservation::Claimed => Some(ClaimGuard::new(&self.ledger, submission_id)),
                Reservation::Completed => {
                    info!("Ignoring repeated submission {}", submission_id);
                    return Ok(VoteOutcome::Duplicate { submission_id });
                }
                Reservation::InFlight => {
                    debug!("Submission {} is still in flight", submission_id);
                    return Err(WarsError::SubmissionInProgress { submission_id }.into());
                }
            },
            None => None,
        };

        let result = match self.settings.mode {
            ConsistencyMode::Independent => self.apply_independent(vote).await,
            ConsistencyMode::Atomic => self.apply_atomic(vote).await,
        };

        // A half-applied vote stays claimed so a retry cannot apply the
        // winner's side twice. Any other failure drops the claim.
        if let Some(claim) = claim {
            match &result {
                Ok(_) => claim.complete(),
                Err(e) if is_partial(e) => claim.complete(),
                Err(_) => {}
            }
        }

        let applied = result?;
        info!(
            "Vote applied: {} {} -> {}, {} {} -> {}",
            applied.winner.entity_id,
            applied.winner.old_rating,
            applied.winner.new_rating,
            applied.loser.entity_id,
            applied.loser.old_rating,
            applied.loser.new_rating
        );
        Ok(VoteOutcome::Applied(applied))
    }

    /// Two separate writes, winner first
    async fn apply_independent(&self, vote: &VoteSubmission) -> Result<ComparisonResult> {
        let (winner, loser) = self.fetch_pair(&vote.winner_id, &vote.loser_id).await?;
        let update = self
            .calculator
            .compute_updated_ratings(winner.rating, loser.rating)?;
        let applied = comparison_result(&winner, &loser, &update);

        self.write_entry(&applied.winner, false).await?;
        self.write_entry(&applied.loser, true).await?;

        Ok(applied)
    }

    /// One conditional write covering both rows, retried on conflict
    async fn apply_atomic(&self, vote: &VoteSubmission) -> Result<ComparisonResult> {
        let max_attempts = self.settings.max_conflict_retries.max(1);

        for attempt in 1..=max_attempts {
            let (winner, loser) = self.fetch_pair(&vote.winner_id, &vote.loser_id).await?;
            let update = self
                .calculator
                .compute_updated_ratings(winner.rating, loser.rating)?;
            let applied = comparison_result(&winner, &loser, &update);

            let updates = [
                ConditionalUpdate {
                    entity_id: winner.id().clone(),
                    expected_version: winner.version,
                    update: entity_update(&applied.winner),
                },
                ConditionalUpdate {
                    entity_id: loser.id().clone(),
                    expected_version: loser.version,
                    update: entity_update(&applied.loser),
                },
            ];

            let written = self
                .with_store_retry("pair_update", || {
                    self.store.update_pair_if_unchanged(updates.clone())
                })
                .await
                .map_err(|e| write_failure(winner.id(), e, false))?;

            match written {
                PairWriteResult::Applied => return Ok(applied),
                PairWriteResult::Conflict => {
                    self.metrics_collector.record_conflict();
                    self.bump_stats(|stats| stats.conflicts += 1);
                    debug!(
                        "Conflict writing {} vs {} (attempt {}/{})",
                        winner.id(),
                        loser.id(),
                        attempt,
                        max_attempts
                    );
                }
                PairWriteResult::Missing(ids) => {
                    warn!("Entities {:?} disappeared before the write", ids);
                    return Err(WarsError::NotFound { ids }.into());
                }
            }
        }

        Err(WarsError::Conflict {
            attempts: max_attempts,
        }
        .into())
    }

    /// Read both rows in one query; `NotFound` unless both come back
    async fn fetch_pair(
        &self,
        winner_id: &EntityId,
        loser_id: &EntityId,
    ) -> Result<(RatingEntry, RatingEntry)> {
        let ids = [winner_id.clone(), loser_id.clone()];
        let entries = self
            .with_store_retry("fetch", || self.store.fetch_entries(&ids))
            .await?;

        let winner = entries.iter().find(|e| e.id() == winner_id).cloned();
        let loser = entries.iter().find(|e| e.id() == loser_id).cloned();

        match (winner, loser) {
            (Some(winner), Some(loser)) => {
                debug!(
                    "Read {} ({}) and {} ({}), gap {}",
                    winner_id,
                    winner.rating,
                    loser_id,
                    loser.rating,
                    rating_difference(winner.rating, loser.rating)
                );
                Ok((winner, loser))
            }
            (winner, loser) => {
                let mut missing = Vec::new();
                if winner.is_none() {
                    missing.push(winner_id.clone());
                }
                if loser.is_none() {
                    missing.push(loser_id.clone());
                }
                Err(WarsError::NotFound { ids: missing }.into())
            }
        }
    }

    /// Persist one side of a comparison
    async fn write_entry(&self, change: &RatingChange, already_wrote_other: bool) -> Result<()> {
        let update = entity_update(change);
        let written = self
            .with_store_retry("update", || {
                self.store.update_entry(&change.entity_id, update.clone())
            })
            .await
            .map_err(|e| write_failure(&change.entity_id, e, already_wrote_other))?;

        if !written {
            if already_wrote_other {
                warn!(
                    "Entity {} disappeared after the other side was written",
                    change.entity_id
                );
                return Err(WarsError::StoreWriteFailure {
                    entity_id: change.entity_id.clone(),
                    message: "entity no longer exists".to_string(),
                    partial: true,
                }
                .into());
            }
            return Err(WarsError::NotFound {
                ids: vec![change.entity_id.clone()],
            }
            .into());
        }

        Ok(())
    }

    /// Run a store call, retrying transient failures with a fixed delay
    async fn with_store_retry<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.settings.max_store_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) => {
                    self.metrics_collector.record_store_error(operation);
                    if attempt >= max_attempts {
                        warn!(
                            "Store {} failed after {} attempts: {}",
                            operation, attempt, e
                        );
                        return Err(e);
                    }
                    debug!(
                        "Store {} failed (attempt {}/{}), retrying: {}",
                        operation, attempt, max_attempts, e
                    );
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Add a new entity at the calculator's baseline rating
    pub async fn register_entity(&self, entity: EntitySummary) -> Result<Contender> {
        if entity.id.trim().is_empty() {
            return Err(WarsError::invalid_input("entity id must not be empty").into());
        }

        let entry = RatingEntry::new(entity, self.calculator.initial_rating());
        let contender = entry.to_contender();
        self.store.insert_entry(entry).await?;

        self.metrics_collector.record_entity_registered();
        self.bump_stats(|stats| stats.entities_registered += 1);
        info!(
            "Registered entity {} at rating {}",
            contender.entity.id, contender.rating
        );

        Ok(contender)
    }

    fn bump_stats(&self, apply: impl FnOnce(&mut WorkflowStats)) {
        if let Ok(mut stats) = self.stats.write() {
            apply(&mut stats);
        }
    }
}

/// Claimed submission id, handed back to the ledger on drop unless completed
struct ClaimGuard<'a> {
    ledger: &'a SubmissionLedger,
    submission_id: Option<SubmissionId>,
}

impl<'a> ClaimGuard<'a> {
    fn new(ledger: &'a SubmissionLedger, submission_id: SubmissionId) -> Self {
        Self {
            ledger,
            submission_id: Some(submission_id),
        }
    }

    fn complete(mut self) {
        if let Some(submission_id) = self.submission_id.take() {
            self.ledger.complete(submission_id);
        }
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if let Some(submission_id) = self.submission_id.take() {
            self.ledger.release(submission_id);
        }
    }
}

fn validate_ids(winner_id: &EntityId, loser_id: &EntityId) -> Result<()> {
    if winner_id.trim().is_empty() || loser_id.trim().is_empty() {
        return Err(WarsError::invalid_input("winner and loser ids are required").into());
    }
    if winner_id == loser_id {
        return Err(WarsError::invalid_input("an entity cannot be compared with itself").into());
    }
    Ok(())
}

fn comparison_result(
    winner: &RatingEntry,
    loser: &RatingEntry,
    update: &RatingUpdate,
) -> ComparisonResult {
    ComparisonResult {
        winner: RatingChange {
            entity_id: winner.id().clone(),
            old_rating: winner.rating,
            new_rating: update.new_winner_rating,
            delta: update.winner_delta(winner.rating),
            matches_played: winner.matches_played + 1,
        },
        loser: RatingChange {
            entity_id: loser.id().clone(),
            old_rating: loser.rating,
            new_rating: update.new_loser_rating,
            delta: update.loser_delta(loser.rating),
            matches_played: loser.matches_played + 1,
        },
        timestamp: current_timestamp(),
    }
}

fn entity_update(change: &RatingChange) -> EntityUpdate {
    EntityUpdate {
        rating: Some(change.new_rating),
        matches_played: Some(change.matches_played),
    }
}

fn write_failure(entity_id: &EntityId, error: anyhow::Error, partial: bool) -> anyhow::Error {
    WarsError::StoreWriteFailure {
        entity_id: entity_id.clone(),
        message: error.to_string(),
        partial,
    }
    .into()
}

fn is_partial(error: &anyhow::Error) -> bool {
    matches!(
        wars_error(error),
        Some(WarsError::StoreWriteFailure { partial: true, .. })
    )
}

/// Metric label for a failed vote
fn outcome_label(error: &anyhow::Error) -> &'static str {
    match wars_error(error) {
        Some(WarsError::InvalidInput { .. }) => "invalid",
        Some(WarsError::NotFound { .. }) => "not_found",
        Some(WarsError::Conflict { .. }) => "conflict",
        Some(WarsError::SubmissionInProgress { .. }) => "in_progress",
        Some(WarsError::StoreUnavailable { .. }) => "unavailable",
        Some(WarsError::StoreWriteFailure { .. }) => "write_failure",
        _ => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rating::calculator::MockRatingCalculator;
    use crate::rating::storage::{InMemoryRatingStore, MockRatingStore, TestRatingStore};
    use crate::rating::EloRatingCalculator;
    use crate::utils::generate_submission_id;

    fn entry(id: &str, rating: f64, matches_played: u64) -> RatingEntry {
        let mut entry = RatingEntry::new(EntitySummary::new(id, format!("repo-{id}")), rating);
        entry.matches_played = matches_played;
        entry
    }

    fn settings(mode: ConsistencyMode) -> WorkflowSettings {
        WorkflowSettings::default()
            .with_mode(mode)
            .with_retry_delay(Duration::ZERO)
    }

    fn workflow(store: Arc<dyn RatingStore>, mode: ConsistencyMode) -> VoteWorkflow {
        VoteWorkflow::new(
            store,
            Arc::new(EloRatingCalculator::default()),
            settings(mode),
        )
    }

    fn error_of<T: std::fmt::Debug>(result: Result<T>) -> WarsError {
        let err = result.unwrap_err();
        wars_error(&err).cloned().expect("expected a WarsError")
    }

    #[tokio::test]
    async fn test_upset_scenario_both_modes() {
        for mode in [ConsistencyMode::Independent, ConsistencyMode::Atomic] {
            let store = Arc::new(InMemoryRatingStore::with_entries(vec![
                entry("a", 1200.0, 10),
                entry("b", 1400.0, 5),
            ]));
            let workflow = workflow(store.clone(), mode);

            let outcome = workflow
                .submit_comparison(VoteSubmission::new("a", "b"))
                .await
                .unwrap();
            let applied = outcome.applied().unwrap();
            assert_eq!(applied.winner.new_rating, 1224.0);
            assert_eq!(applied.winner.delta, 24.0);
            assert_eq!(applied.loser.new_rating, 1376.0);
            assert_eq!(applied.loser.delta, -24.0);

            let rows = store
                .fetch_entries(&["a".to_string(), "b".to_string()])
                .await
                .unwrap();
            assert_eq!((rows[0].rating, rows[0].matches_played), (1224.0, 11));
            assert_eq!((rows[1].rating, rows[1].matches_played), (1376.0, 6));
        }
    }

    #[tokio::test]
    async fn test_invalid_ids_never_reach_store() {
        // No expectations: any store call fails the test
        let store = Arc::new(MockRatingStore::new());
        let workflow = workflow(store, ConsistencyMode::Atomic);

        for (winner, loser) in [("a", "a"), ("", "b"), ("a", "  ")] {
            let err = error_of(
                workflow
                    .submit_comparison(VoteSubmission::new(winner, loser))
                    .await,
            );
            assert!(matches!(err, WarsError::InvalidInput { .. }));
        }
        assert_eq!(workflow.stats().votes_failed, 3);
    }

    #[tokio::test]
    async fn test_not_found_writes_nothing() {
        let mut store = MockRatingStore::new();
        store
            .expect_fetch_entries()
            .times(1)
            .returning(|_| Ok(vec![entry("a", 1200.0, 0)]));
        store.expect_update_entry().never();
        store.expect_update_pair_if_unchanged().never();

        let workflow = workflow(Arc::new(store), ConsistencyMode::Independent);
        let err = error_of(
            workflow
                .submit_comparison(VoteSubmission::new("a", "ghost"))
                .await,
        );
        assert_eq!(
            err,
            WarsError::NotFound {
                ids: vec!["ghost".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_resubmission_without_id_applies_again() {
        let store = Arc::new(InMemoryRatingStore::with_entries(vec![
            entry("a", 1500.0, 0),
            entry("b", 1500.0, 0),
        ]));
        let workflow = workflow(store.clone(), ConsistencyMode::Atomic);

        let vote = VoteSubmission::new("a", "b");
        workflow.submit_comparison(vote.clone()).await.unwrap();
        workflow.submit_comparison(vote).await.unwrap();

        let rows = store.fetch_entries(&["a".to_string()]).await.unwrap();
        assert_eq!(rows[0].matches_played, 2);
        assert!(rows[0].rating > 1516.0);
    }

    #[tokio::test]
    async fn test_repeated_submission_id_applies_once() {
        let store = Arc::new(InMemoryRatingStore::with_entries(vec![
            entry("a", 1500.0, 0),
            entry("b", 1500.0, 0),
        ]));
        let workflow = workflow(store.clone(), ConsistencyMode::Atomic);

        let submission_id = generate_submission_id();
        let vote = VoteSubmission::new("a", "b").with_submission_id(submission_id);

        let first = workflow.submit_comparison(vote.clone()).await.unwrap();
        assert!(first.applied().is_some());

        let second = workflow.submit_comparison(vote).await.unwrap();
        assert_eq!(second, VoteOutcome::Duplicate { submission_id });

        let rows = store.fetch_entries(&["a".to_string()]).await.unwrap();
        assert_eq!(rows[0].rating, 1516.0);
        assert_eq!(rows[0].matches_played, 1);
        assert_eq!(workflow.stats().duplicate_votes, 1);
    }

    #[tokio::test]
    async fn test_failed_vote_releases_submission_id() {
        let store = Arc::new(InMemoryRatingStore::with_entries(vec![entry(
            "a", 1500.0, 0,
        )]));
        let workflow = workflow(store.clone(), ConsistencyMode::Atomic);

        let vote = VoteSubmission::new("a", "b").with_submission_id(generate_submission_id());
        assert!(workflow.submit_comparison(vote.clone()).await.is_err());

        store
            .insert_entry(entry("b", 1500.0, 0))
            .await
            .unwrap();
        let outcome = workflow.submit_comparison(vote).await.unwrap();
        assert!(outcome.applied().is_some());
    }

    #[tokio::test]
    async fn test_repeat_while_in_flight_is_not_acknowledged() {
        let store = Arc::new(TestRatingStore::with_entries(vec![
            entry("a", 1500.0, 0),
            entry("b", 1500.0, 0),
        ]));
        // Every read of the first attempt fails, with a pause between tries
        store.fail_next_reads(3);
        let workflow = VoteWorkflow::new(
            store.clone(),
            Arc::new(EloRatingCalculator::default()),
            settings(ConsistencyMode::Atomic).with_retry_delay(Duration::from_millis(10)),
        );

        let submission_id = generate_submission_id();
        let vote = VoteSubmission::new("a", "b").with_submission_id(submission_id);

        // The repeat is polled while the first attempt waits to retry
        let (first, second) = futures::join!(
            workflow.submit_comparison(vote.clone()),
            workflow.submit_comparison(vote.clone()),
        );
        assert!(matches!(error_of(first), WarsError::StoreUnavailable { .. }));
        assert_eq!(
            error_of(second),
            WarsError::SubmissionInProgress { submission_id }
        );
        assert_eq!(store.entry("a").await.unwrap().matches_played, 0);

        // The failed attempt handed the id back, so the retry applies
        let retry = workflow.submit_comparison(vote.clone()).await.unwrap();
        assert!(retry.applied().is_some());
        assert_eq!(
            workflow.submit_comparison(vote).await.unwrap(),
            VoteOutcome::Duplicate { submission_id }
        );
        assert_eq!(store.entry("a").await.unwrap().rating, 1516.0);
        assert_eq!(store.entry("a").await.unwrap().matches_played, 1);
    }

    #[tokio::test]
    async fn test_abandoned_submission_releases_its_id() {
        let store = Arc::new(TestRatingStore::with_entries(vec![
            entry("a", 1500.0, 0),
            entry("b", 1500.0, 0),
        ]));
        store.fail_next_reads(1);
        let workflow = VoteWorkflow::new(
            store.clone(),
            Arc::new(EloRatingCalculator::default()),
            settings(ConsistencyMode::Atomic).with_retry_delay(Duration::from_secs(60)),
        );

        let vote = VoteSubmission::new("a", "b").with_submission_id(generate_submission_id());
        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            workflow.submit_comparison(vote.clone()),
        )
        .await;
        assert!(abandoned.is_err());

        let outcome = workflow.submit_comparison(vote).await.unwrap();
        assert!(outcome.applied().is_some());
    }

    #[tokio::test]
    async fn test_transient_write_failures_are_retried() {
        for mode in [ConsistencyMode::Independent, ConsistencyMode::Atomic] {
            let store = Arc::new(TestRatingStore::with_entries(vec![
                entry("a", 1500.0, 0),
                entry("b", 1500.0, 0),
            ]));
            store.fail_next_updates("b", 2);
            let workflow = workflow(store.clone(), mode);

            let outcome = workflow
                .submit_comparison(VoteSubmission::new("a", "b"))
                .await
                .unwrap();
            assert!(outcome.applied().is_some());

            let a = store.entry("a").await.unwrap();
            let b = store.entry("b").await.unwrap();
            assert_eq!((a.rating, a.matches_played), (1516.0, 1));
            assert_eq!((b.rating, b.matches_played), (1484.0, 1));

            match mode {
                // One write for the winner, three for the loser
                ConsistencyMode::Independent => assert_eq!(store.get_update_calls().len(), 4),
                ConsistencyMode::Atomic => assert_eq!(store.pair_update_count(), 3),
            }
            assert_eq!(workflow.stats().partial_updates, 0);
        }
    }

    #[tokio::test]
    async fn test_loser_vanishing_after_winner_write_is_partial() {
        let mut store = MockRatingStore::new();
        store
            .expect_fetch_entries()
            .times(1)
            .returning(|_| Ok(vec![entry("a", 1500.0, 0), entry("b", 1500.0, 0)]));
        store
            .expect_update_entry()
            .withf(|entity_id, _| entity_id == "a")
            .times(1)
            .returning(|_, _| Ok(true));
        store
            .expect_update_entry()
            .withf(|entity_id, _| entity_id == "b")
            .times(1)
            .returning(|_, _| Ok(false));

        let workflow = workflow(Arc::new(store), ConsistencyMode::Independent);
        let submission_id = generate_submission_id();
        let vote = VoteSubmission::new("a", "b").with_submission_id(submission_id);

        let err = error_of(workflow.submit_comparison(vote.clone()).await);
        assert!(matches!(
            err,
            WarsError::StoreWriteFailure { ref entity_id, partial: true, .. } if entity_id == "b"
        ));
        assert_eq!(workflow.stats().partial_updates, 1);

        // The id stays claimed; the store is not touched again
        let retry = workflow.submit_comparison(vote).await.unwrap();
        assert_eq!(retry, VoteOutcome::Duplicate { submission_id });
    }

    #[tokio::test]
    async fn test_transient_read_failures_are_retried() {
        let store = Arc::new(TestRatingStore::with_entries(vec![
            entry("a", 1500.0, 0),
            entry("b", 1500.0, 0),
        ]));
        store.fail_next_reads(2);
        let workflow = workflow(store.clone(), ConsistencyMode::Atomic);

        workflow
            .submit_comparison(VoteSubmission::new("a", "b"))
            .await
            .unwrap();
        assert_eq!(store.entry("a").await.unwrap().rating, 1516.0);
    }

    #[tokio::test]
    async fn test_persistent_read_failure_surfaces() {
        let store = Arc::new(TestRatingStore::with_entries(vec![
            entry("a", 1500.0, 0),
            entry("b", 1500.0, 0),
        ]));
        store.fail_next_reads(10);
        let workflow = workflow(store, ConsistencyMode::Atomic);

        let err = error_of(
            workflow
                .submit_comparison(VoteSubmission::new("a", "b"))
                .await,
        );
        assert!(matches!(err, WarsError::StoreUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_second_write_failure_is_partial() {
        let store = Arc::new(TestRatingStore::with_entries(vec![
            entry("a", 1500.0, 0),
            entry("b", 1500.0, 0),
        ]));
        store.fail_next_updates("b", 10);
        let workflow = workflow(store.clone(), ConsistencyMode::Independent);

        let submission_id = generate_submission_id();
        let vote = VoteSubmission::new("a", "b").with_submission_id(submission_id);
        let err = error_of(workflow.submit_comparison(vote.clone()).await);
        assert!(matches!(
            err,
            WarsError::StoreWriteFailure { ref entity_id, partial: true, .. } if entity_id == "b"
        ));

        // Winner applied, loser untouched
        assert_eq!(store.entry("a").await.unwrap().rating, 1516.0);
        assert_eq!(store.entry("b").await.unwrap().rating, 1500.0);
        assert_eq!(workflow.stats().partial_updates, 1);

        // Retrying the same submission cannot apply the winner twice
        let retry = workflow.submit_comparison(vote).await.unwrap();
        assert_eq!(retry, VoteOutcome::Duplicate { submission_id });
    }

    #[tokio::test]
    async fn test_first_write_failure_is_not_partial() {
        let store = Arc::new(TestRatingStore::with_entries(vec![
            entry("a", 1500.0, 0),
            entry("b", 1500.0, 0),
        ]));
        store.fail_next_updates("a", 10);
        let workflow = workflow(store.clone(), ConsistencyMode::Independent);

        let err = error_of(
            workflow
                .submit_comparison(VoteSubmission::new("a", "b"))
                .await,
        );
        assert!(matches!(
            err,
            WarsError::StoreWriteFailure { partial: false, .. }
        ));
        assert_eq!(store.entry("b").await.unwrap().rating, 1500.0);
    }

    #[tokio::test]
    async fn test_conflicts_exhaust_attempts() {
        let mut store = MockRatingStore::new();
        store
            .expect_fetch_entries()
            .times(3)
            .returning(|_| Ok(vec![entry("a", 1500.0, 0), entry("b", 1500.0, 0)]));
        store
            .expect_update_pair_if_unchanged()
            .times(3)
            .returning(|_| Ok(PairWriteResult::Conflict));

        let mut settings = settings(ConsistencyMode::Atomic);
        settings.max_conflict_retries = 3;
        let workflow = VoteWorkflow::new(
            Arc::new(store),
            Arc::new(EloRatingCalculator::default()),
            settings,
        );

        let err = error_of(
            workflow
                .submit_comparison(VoteSubmission::new("a", "b"))
                .await,
        );
        assert_eq!(err, WarsError::Conflict { attempts: 3 });
        assert_eq!(workflow.stats().conflicts, 3);
    }

    #[tokio::test]
    async fn test_entity_vanishing_before_write_is_not_found() {
        let mut store = MockRatingStore::new();
        store
            .expect_fetch_entries()
            .times(1)
            .returning(|_| Ok(vec![entry("a", 1500.0, 0), entry("b", 1500.0, 0)]));
        store
            .expect_update_pair_if_unchanged()
            .times(1)
            .returning(|_| Ok(PairWriteResult::Missing(vec!["b".to_string()])));

        let workflow = workflow(Arc::new(store), ConsistencyMode::Atomic);
        let err = error_of(
            workflow
                .submit_comparison(VoteSubmission::new("a", "b"))
                .await,
        );
        assert_eq!(
            err,
            WarsError::NotFound {
                ids: vec!["b".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_uses_injected_calculator() {
        let store = Arc::new(InMemoryRatingStore::with_entries(vec![
            entry("a", 1000.0, 0),
            entry("b", 1000.0, 0),
        ]));
        let calculator = Arc::new(MockRatingCalculator::new(5.0));
        let workflow = VoteWorkflow::new(
            store.clone(),
            calculator.clone(),
            settings(ConsistencyMode::Independent),
        );

        workflow
            .submit_comparison(VoteSubmission::new("b", "a"))
            .await
            .unwrap();

        assert_eq!(calculator.get_calculation_calls(), vec![(1000.0, 1000.0)]);
        let rows = store
            .fetch_entries(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(rows[0].rating, 995.0);
        assert_eq!(rows[1].rating, 1005.0);
    }

    #[tokio::test]
    async fn test_register_entity() {
        let store = Arc::new(InMemoryRatingStore::new());
        let workflow = workflow(store.clone(), ConsistencyMode::Atomic);

        let contender = workflow
            .register_entity(EntitySummary::new("rust-lang/rust", "rust"))
            .await
            .unwrap();
        assert_eq!(contender.rating, 1200.0);
        assert_eq!(contender.matches_played, 0);

        let err = error_of(
            workflow
                .register_entity(EntitySummary::new("rust-lang/rust", "rust"))
                .await,
        );
        assert!(matches!(err, WarsError::AlreadyExists { .. }));

        let err = error_of(workflow.register_entity(EntitySummary::new("", "x")).await);
        assert!(matches!(err, WarsError::InvalidInput { .. }));
        assert_eq!(store.entry_count().await.unwrap(), 1);
    }
}
