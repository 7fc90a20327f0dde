//! Wars Simulator CLI Tool
//!
//! Seeds an in-memory store with synthetic repositories, each with a hidden
//! "true strength", and drives random votes through the vote workflow. A
//! simulated voter prefers the stronger repository with Elo probability.
//! Prints the resulting leaderboard and how well it recovers the hidden order.
//!
//! Usage:
//!   cargo run --bin wars-sim -- --repos 50 --votes 5000
//!   cargo run --bin wars-sim -- --mode independent --concurrency 8

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use repo_wars::config::{AppConfig, ConsistencyMode};
use repo_wars::rating::elo::expected_score;
use repo_wars::rating::{EloRatingCalculator, InMemoryRatingStore, RatingStore};
use repo_wars::types::{EntitySummary, VoteSubmission};
use repo_wars::wars::{
    Leaderboard, PairSelector, RandomPairSelector, VoteWorkflow, WorkflowSettings,
};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "wars-sim")]
#[command(about = "Simulate head-to-head voting and report how well Elo recovers true strength")]
struct Cli {
    /// Number of synthetic repositories
    #[arg(short, long, default_value = "30")]
    repos: usize,

    /// Total number of votes to cast
    #[arg(short, long, default_value = "3000")]
    votes: usize,

    /// Concurrent voters
    #[arg(short, long, default_value = "4")]
    concurrency: usize,

    /// Consistency mode (independent or atomic)
    #[arg(short, long, default_value = "atomic")]
    mode: ConsistencyMode,

    /// Elo K-factor
    #[arg(short, long, default_value = "32.0")]
    k_factor: f64,

    /// Seed for the synthetic strengths and voter choices
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Leaderboard rows to print
    #[arg(short, long, default_value = "15")]
    top: usize,
}

/// Hidden strength of every synthetic repository, on the Elo scale
type Strengths = HashMap<String, f64>;

async fn seed_store(store: &InMemoryRatingStore, cli: &Cli) -> Result<Strengths> {
    let mut rng = StdRng::seed_from_u64(cli.seed);
    let mut strengths = HashMap::with_capacity(cli.repos);

    for i in 0..cli.repos {
        let id = format!("sim/repo-{:03}", i);
        let strength = rng.gen_range(800.0..1600.0);

        let mut entity = EntitySummary::new(id.clone(), format!("repo-{:03}", i));
        entity.stars = rng.gen_range(0..50_000);
        store
            .insert_entry(repo_wars::rating::RatingEntry::new(entity, 1200.0))
            .await?;

        strengths.insert(id, strength);
    }

    Ok(strengths)
}

/// One simulated voter casting `votes` votes
async fn run_voter(
    voter: usize,
    votes: usize,
    seed: u64,
    workflow: Arc<VoteWorkflow>,
    selector: Arc<dyn PairSelector>,
    strengths: Arc<Strengths>,
) -> (usize, usize) {
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(voter as u64 + 1));
    let mut applied = 0;
    let mut failed = 0;

    for _ in 0..votes {
        let pair = match selector.select_pair().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Voter {} could not get a pair: {}", voter, e);
                failed += 1;
                continue;
            }
        };

        let left = strengths.get(&pair.left.entity.id).copied().unwrap_or(1200.0);
        let right = strengths.get(&pair.right.entity.id).copied().unwrap_or(1200.0);
        let left_wins = rng.gen_bool(expected_score(left, right));

        let vote = if left_wins {
            VoteSubmission::new(pair.left.entity.id, pair.right.entity.id)
        } else {
            VoteSubmission::new(pair.right.entity.id, pair.left.entity.id)
        };

        match workflow.submit_comparison(vote).await {
            Ok(_) => applied += 1,
            Err(e) => {
                warn!("Voter {} vote failed: {}", voter, e);
                failed += 1;
            }
        }
    }

    (applied, failed)
}

/// Fraction of listed pairs whose rating order matches their strength order
fn concordance(ranked: &[(String, f64)], strengths: &Strengths) -> f64 {
    let mut agree = 0usize;
    let mut total = 0usize;

    for (i, (id_a, rating_a)) in ranked.iter().enumerate() {
        for (id_b, rating_b) in &ranked[i + 1..] {
            if rating_a == rating_b {
                continue;
            }
            let strength_a = strengths.get(id_a).copied().unwrap_or_default();
            let strength_b = strengths.get(id_b).copied().unwrap_or_default();
            total += 1;
            if (rating_a > rating_b) == (strength_a > strength_b) {
                agree += 1;
            }
        }
    }

    if total == 0 {
        0.0
    } else {
        agree as f64 / total as f64
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    if cli.repos < 2 {
        return Err(anyhow::anyhow!("Need at least 2 repositories"));
    }

    let mut config = AppConfig::default();
    config.rating.consistency = cli.mode;
    config.rating.k_factor = cli.k_factor;
    repo_wars::config::validate_config(&config)?;

    let store = Arc::new(InMemoryRatingStore::new());
    let strengths = Arc::new(seed_store(&store, &cli).await?);
    info!("Seeded {} repositories", strengths.len());

    let calculator = Arc::new(EloRatingCalculator::new(config.rating.elo_config())?);
    let workflow = Arc::new(VoteWorkflow::new(
        store.clone(),
        calculator,
        WorkflowSettings::from_config(&config),
    ));
    let selector: Arc<dyn PairSelector> = Arc::new(RandomPairSelector::new(store.clone()));

    println!(
        "🎲 Simulating {} votes over {} repositories ({} voters, {} mode, K={})",
        cli.votes, cli.repos, cli.concurrency, cli.mode, cli.k_factor
    );

    let concurrency = cli.concurrency.max(1);
    let started = Instant::now();
    let mut handles = Vec::with_capacity(concurrency);
    for voter in 0..concurrency {
        let share = cli.votes / concurrency + usize::from(voter < cli.votes % concurrency);
        handles.push(tokio::spawn(run_voter(
            voter,
            share,
            cli.seed,
            workflow.clone(),
            selector.clone(),
            strengths.clone(),
        )));
    }

    let mut applied = 0;
    let mut failed = 0;
    for handle in handles {
        let (voter_applied, voter_failed) = handle.await?;
        applied += voter_applied;
        failed += voter_failed;
    }
    let elapsed = started.elapsed();

    // Every applied vote adds two matches
    let total_matches: u64 = store
        .top_rated(cli.repos)
        .await?
        .iter()
        .map(|entry| entry.matches_played)
        .sum();

    println!(
        "✅ {} votes applied, {} failed in {:.2}s",
        applied,
        failed,
        elapsed.as_secs_f64()
    );
    println!(
        "   Recorded matches: {} (expected {}{})",
        total_matches,
        applied * 2,
        if total_matches < applied as u64 * 2 {
            ", lost updates"
        } else {
            ""
        }
    );

    let mut rating_settings = config.rating.clone();
    rating_settings.leaderboard_max_limit = rating_settings.leaderboard_max_limit.max(cli.repos);
    let leaderboard = Leaderboard::new(store.clone(), &rating_settings);
    let ranked = leaderboard.top(Some(cli.repos)).await?;

    println!();
    println!("{:>4}  {:<16} {:>7} {:>8} {:>9}", "rank", "repository", "rating", "matches", "strength");
    for entry in ranked.iter().take(cli.top) {
        let contender = &entry.contender;
        println!(
            "{:>4}  {:<16} {:>7.0} {:>8} {:>9.0}",
            entry.rank,
            contender.entity.name,
            contender.rating,
            contender.matches_played,
            strengths.get(&contender.entity.id).copied().unwrap_or_default()
        );
    }

    let ordered: Vec<(String, f64)> = ranked
        .iter()
        .map(|entry| (entry.contender.entity.id.clone(), entry.contender.rating))
        .collect();
    println!();
    println!(
        "📈 Rank concordance with true strength: {:.1}%",
        concordance(&ordered, &strengths) * 100.0
    );

    Ok(())
}
