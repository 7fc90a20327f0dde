//! Performance benchmarks for rating calculations and vote processing

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use repo_wars::config::ConsistencyMode;
use repo_wars::rating::{
    EloRatingCalculator, InMemoryRatingStore, RatingCalculator, RatingEntry,
};
use repo_wars::types::{EntitySummary, VoteSubmission};
use repo_wars::wars::{Leaderboard, VoteWorkflow, WorkflowSettings};
use std::sync::Arc;

fn create_bench_store(size: usize) -> Arc<InMemoryRatingStore> {
    Arc::new(InMemoryRatingStore::with_entries((0..size).map(|i| {
        RatingEntry::new(
            EntitySummary::new(format!("bench/repo-{}", i), format!("repo-{}", i)),
            1000.0 + (i % 500) as f64,
        )
    })))
}

fn create_bench_workflow(store: Arc<InMemoryRatingStore>, mode: ConsistencyMode) -> VoteWorkflow {
    VoteWorkflow::new(
        store,
        Arc::new(EloRatingCalculator::default()),
        WorkflowSettings::default().with_mode(mode),
    )
}

fn bench_rating_calculations(c: &mut Criterion) {
    let calculator = EloRatingCalculator::default();

    c.bench_function("elo_compute_updated_ratings", |b| {
        b.iter(|| {
            black_box(
                calculator.compute_updated_ratings(black_box(1200.0), black_box(1400.0)),
            )
        })
    });

    c.bench_function("elo_expected_score", |b| {
        b.iter(|| black_box(calculator.expected_score(black_box(1532.0), black_box(1468.0))))
    });
}

fn bench_vote_submission(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("submit_comparison");

    for mode in [ConsistencyMode::Independent, ConsistencyMode::Atomic] {
        let workflow = create_bench_workflow(create_bench_store(100), mode);
        let mut round = 0usize;

        group.bench_with_input(BenchmarkId::from_parameter(mode), &mode, |b, _| {
            b.iter(|| {
                round += 1;
                let winner = format!("bench/repo-{}", round % 100);
                let loser = format!("bench/repo-{}", (round + 37) % 100);
                rt.block_on(async {
                    black_box(
                        workflow
                            .submit_comparison(VoteSubmission::new(winner, loser))
                            .await,
                    )
                })
            })
        });
    }

    group.finish();
}

fn bench_leaderboard(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = create_bench_store(1_000);
    let leaderboard = Leaderboard::new(store, &Default::default());

    c.bench_function("leaderboard_top_50_of_1000", |b| {
        b.iter(|| rt.block_on(async { black_box(leaderboard.top(None).await) }))
    });
}

criterion_group!(
    benches,
    bench_rating_calculations,
    bench_vote_submission,
    bench_leaderboard
);
criterion_main!(benches);
