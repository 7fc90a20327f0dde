//! Head-to-head repository voting
//!
//! This module provides the vote workflow, the submission ledger used for
//! deduplication, pair selection, the leaderboard and their HTTP routes.

pub mod leaderboard;
pub mod ledger;
pub mod pairing;
pub mod routes;
pub mod workflow;

// Re-export commonly used types
pub use leaderboard::Leaderboard;
pub use ledger::SubmissionLedger;
pub use pairing::{PairSelector, RandomPairSelector};
pub use routes::{router, WarsState};
pub use workflow::{VoteWorkflow, WorkflowSettings, WorkflowStats};
