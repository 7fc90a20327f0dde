//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the repo-wars service using
//! Prometheus metrics.

use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the rating service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Vote processing metrics
    vote_metrics: VoteMetrics,

    /// Rated entity metrics
    entity_metrics: EntityMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,

    /// HTTP requests by route and status class
    pub http_requests_total: IntCounterVec,
}

/// Vote processing metrics
#[derive(Clone)]
pub struct VoteMetrics {
    /// Votes by outcome (applied, duplicate, not_found, invalid, conflict, error)
    pub votes_total: IntCounterVec,

    /// Time to process a vote end to end
    pub vote_duration: Histogram,

    /// Winner rating gain per applied vote
    pub rating_delta: Histogram,

    /// Compare-and-swap conflicts that forced a re-read
    pub conflicts_total: IntCounter,

    /// Store errors by operation
    pub store_errors_total: IntCounterVec,

    /// Votes that left only one entity updated
    pub partial_updates_total: IntCounter,
}

/// Rated entity metrics
#[derive(Clone)]
pub struct EntityMetrics {
    /// Number of rated entities
    pub entities_total: IntGauge,

    /// Pairs handed out to voters
    pub pairs_served_total: IntCounter,

    /// Entities registered through the API
    pub entities_registered_total: IntCounter,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let vote_metrics = VoteMetrics::new(&registry)?;
        let entity_metrics = EntityMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            vote_metrics,
            entity_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get vote metrics
    pub fn votes(&self) -> &VoteMetrics {
        &self.vote_metrics
    }

    /// Get entity metrics
    pub fn entities(&self) -> &EntityMetrics {
        &self.entity_metrics
    }

    /// Record a processed vote
    pub fn record_vote(&self, outcome: &str, duration: Duration) {
        self.vote_metrics
            .votes_total
            .with_label_values(&[outcome])
            .inc();

        self.vote_metrics
            .vote_duration
            .observe(duration.as_secs_f64());
    }

    /// Record the winner's rating gain of an applied vote
    pub fn record_rating_delta(&self, delta: f64) {
        self.vote_metrics.rating_delta.observe(delta);
    }

    pub fn record_conflict(&self) {
        self.vote_metrics.conflicts_total.inc();
    }

    pub fn record_store_error(&self, operation: &str) {
        self.vote_metrics
            .store_errors_total
            .with_label_values(&[operation])
            .inc();
    }

    pub fn record_partial_update(&self) {
        self.vote_metrics.partial_updates_total.inc();
    }

    pub fn record_pair_served(&self) {
        self.entity_metrics.pairs_served_total.inc();
    }

    pub fn record_entity_registered(&self) {
        self.entity_metrics.entities_registered_total.inc();
    }

    pub fn set_entity_count(&self, count: usize) {
        self.entity_metrics.entities_total.set(count as i64);
    }

    /// Total votes recorded with the given outcome
    pub fn vote_count(&self, outcome: &str) -> u64 {
        self.vote_metrics
            .votes_total
            .with_label_values(&[outcome])
            .get()
    }

    /// Record an HTTP request
    pub fn record_http_request(&self, route: &str, status: u16) {
        let class = match status {
            200..=299 => "2xx",
            400..=499 => "4xx",
            500..=599 => "5xx",
            _ => "other",
        };

        self.service_metrics
            .http_requests_total
            .with_label_values(&[route, class])
            .inc();
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("repo_wars_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "repo_wars_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("repo_wars_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        let http_requests_total = IntCounterVec::new(
            Opts::new("repo_wars_http_requests_total", "HTTP requests handled"),
            &["route", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            component_health,
            http_requests_total,
        })
    }
}

impl VoteMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let votes_total = IntCounterVec::new(
            Opts::new("repo_wars_votes_total", "Votes processed by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(votes_total.clone()))?;

        let vote_duration = Histogram::with_opts(
            HistogramOpts::new(
                "repo_wars_vote_duration_seconds",
                "Vote processing time",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        registry.register(Box::new(vote_duration.clone()))?;

        let rating_delta = Histogram::with_opts(
            HistogramOpts::new(
                "repo_wars_rating_delta",
                "Winner rating gain per applied vote",
            )
            .buckets(vec![1.0, 2.0, 4.0, 8.0, 12.0, 16.0, 20.0, 24.0, 28.0, 32.0]),
        )?;
        registry.register(Box::new(rating_delta.clone()))?;

        let conflicts_total = IntCounter::new(
            "repo_wars_vote_conflicts_total",
            "Compare-and-swap conflicts during vote persistence",
        )?;
        registry.register(Box::new(conflicts_total.clone()))?;

        let store_errors_total = IntCounterVec::new(
            Opts::new("repo_wars_store_errors_total", "Rating store errors"),
            &["operation"],
        )?;
        registry.register(Box::new(store_errors_total.clone()))?;

        let partial_updates_total = IntCounter::new(
            "repo_wars_partial_updates_total",
            "Votes that updated only one entity",
        )?;
        registry.register(Box::new(partial_updates_total.clone()))?;

        Ok(Self {
            votes_total,
            vote_duration,
            rating_delta,
            conflicts_total,
            store_errors_total,
            partial_updates_total,
        })
    }
}

impl EntityMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let entities_total = IntGauge::new("repo_wars_entities", "Number of rated entities")?;
        registry.register(Box::new(entities_total.clone()))?;

        let pairs_served_total = IntCounter::new(
            "repo_wars_pairs_served_total",
            "Pairs handed out to voters",
        )?;
        registry.register(Box::new(pairs_served_total.clone()))?;

        let entities_registered_total = IntCounter::new(
            "repo_wars_entities_registered_total",
            "Entities registered through the API",
        )?;
        registry.register(Box::new(entities_registered_total.clone()))?;

        Ok(Self {
            entities_total,
            pairs_served_total,
            entities_registered_total,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}
