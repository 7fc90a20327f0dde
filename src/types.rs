//! Common types used throughout the rating service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for rated entities (repositories)
pub type EntityId = String;

/// Client-generated identifier for a single vote submission
pub type SubmissionId = Uuid;

/// Display fields of a rated repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stars: u64,
    #[serde(default)]
    pub forks: u64,
    #[serde(default)]
    pub languages: Vec<String>,
}

impl EntitySummary {
    /// Minimal summary with only an id and a name
    pub fn new(id: impl Into<EntityId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            owner: None,
            description: None,
            stars: 0,
            forks: 0,
            languages: Vec::new(),
        }
    }
}

/// Partial field set accepted by the store's update-by-id operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityUpdate {
    pub rating: Option<f64>,
    pub matches_played: Option<u64>,
}

/// Update applied only if the stored row still has `expected_version`
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalUpdate {
    pub entity_id: EntityId,
    pub expected_version: u64,
    pub update: EntityUpdate,
}

/// A vote as submitted by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteSubmission {
    pub winner_id: EntityId,
    pub loser_id: EntityId,
    /// Optional idempotency token; repeated tokens are applied once
    #[serde(default)]
    pub submission_id: Option<SubmissionId>,
}

impl VoteSubmission {
    pub fn new(winner_id: impl Into<EntityId>, loser_id: impl Into<EntityId>) -> Self {
        Self {
            winner_id: winner_id.into(),
            loser_id: loser_id.into(),
            submission_id: None,
        }
    }

    pub fn with_submission_id(mut self, submission_id: SubmissionId) -> Self {
        self.submission_id = Some(submission_id);
        self
    }
}

/// Rating change information for one side of a comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingChange {
    pub entity_id: EntityId,
    pub old_rating: f64,
    pub new_rating: f64,
    pub delta: f64,
    pub matches_played: u64,
}

/// Both sides of an applied comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub winner: RatingChange,
    pub loser: RatingChange,
    pub timestamp: DateTime<Utc>,
}

/// What happened to a vote submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VoteOutcome {
    Applied(ComparisonResult),
    Duplicate { submission_id: SubmissionId },
}

impl VoteOutcome {
    /// The applied result, if this vote changed any ratings
    pub fn applied(&self) -> Option<&ComparisonResult> {
        match self {
            VoteOutcome::Applied(result) => Some(result),
            VoteOutcome::Duplicate { .. } => None,
        }
    }
}

/// Entity as presented to a voter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contender {
    #[serde(flatten)]
    pub entity: EntitySummary,
    pub rating: f64,
    pub matches_played: u64,
}

/// Two distinct contenders for a head-to-head vote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarPair {
    pub left: Contender,
    pub right: Contender,
}

/// One row of the leaderboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    #[serde(flatten)]
    pub contender: Contender,
}
