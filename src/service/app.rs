//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the rating store,
//! the rating calculator and the vote workflow together and owns the
//! background tasks.

use crate::config::AppConfig;
use crate::metrics::MetricsCollector;
use crate::rating::calculator::RatingCalculator;
use crate::rating::storage::{InMemoryRatingStore, RatingEntry, RatingStore};
use crate::rating::EloRatingCalculator;
use crate::service::health::HealthStatus;
use crate::types::EntitySummary;
use crate::wars::{
    Leaderboard, PairSelector, RandomPairSelector, VoteWorkflow, WarsState, WorkflowSettings,
};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// One record of the seed file
#[derive(Debug, Deserialize)]
struct SeedRecord {
    #[serde(flatten)]
    entity: EntitySummary,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    matches_played: u64,
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Persistent ratings
    store: Arc<dyn RatingStore>,

    /// Rating calculator shared by all votes
    calculator: Arc<dyn RatingCalculator>,

    /// Core vote processing
    workflow: Arc<VoteWorkflow>,

    /// Pair selection for voters
    pair_selector: Arc<dyn PairSelector>,

    /// Ranked view of the store
    leaderboard: Arc<Leaderboard>,

    /// Metrics collector for monitoring
    metrics_collector: Arc<MetricsCollector>,

    /// Background task handles
    background_tasks: Mutex<Vec<JoinHandle<()>>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,

    /// When the state was built
    started_at: Instant,
}

impl AppState {
    /// Initialize the application, loading the seed file if one is configured
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing repo-wars rating service");
        info!(
            "Configuration: service={}, consistency={}, k_factor={}",
            config.service.name, config.rating.consistency, config.rating.k_factor
        );

        let store = Arc::new(InMemoryRatingStore::new());
        if let Some(seed_path) = &config.store.seed_path {
            let loaded = Self::load_seed(seed_path, config.rating.initial_rating, store.as_ref())
                .await?;
            info!("✅ Loaded {} entities from {}", loaded, seed_path.display());
        }

        Self::with_store(config, store).await
    }

    /// Initialize the application around an existing store
    pub async fn with_store(
        config: AppConfig,
        store: Arc<dyn RatingStore>,
    ) -> Result<Self, ServiceError> {
        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let calculator: Arc<dyn RatingCalculator> = Arc::new(
            EloRatingCalculator::new(config.rating.elo_config()).map_err(|e| {
                ServiceError::Configuration {
                    message: format!("Failed to initialize rating calculator: {}", e),
                }
            })?,
        );

        let workflow = Arc::new(VoteWorkflow::with_metrics(
            store.clone(),
            calculator.clone(),
            WorkflowSettings::from_config(&config),
            metrics_collector.clone(),
        ));
        let pair_selector = Arc::new(RandomPairSelector::new(store.clone()));
        let leaderboard = Arc::new(Leaderboard::new(store.clone(), &config.rating));

        Ok(Self {
            config,
            store,
            calculator,
            workflow,
            pair_selector,
            leaderboard,
            metrics_collector,
            background_tasks: Mutex::new(Vec::new()),
            is_running: Arc::new(RwLock::new(false)),
            started_at: Instant::now(),
        })
    }

    /// Load a JSON array of entities into the store
    async fn load_seed(
        path: &Path,
        initial_rating: f64,
        store: &dyn RatingStore,
    ) -> Result<usize, ServiceError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ServiceError::Initialization {
                message: format!("Failed to read seed file {}: {}", path.display(), e),
            })?;
        let records: Vec<SeedRecord> =
            serde_json::from_str(&contents).map_err(|e| ServiceError::Initialization {
                message: format!("Failed to parse seed file {}: {}", path.display(), e),
            })?;

        let mut loaded = 0;
        for record in records {
            let mut entry = RatingEntry::new(record.entity, record.rating.unwrap_or(initial_rating));
            entry.matches_played = record.matches_played;

            let entity_id = entry.id().clone();
            match store.insert_entry(entry).await {
                Ok(()) => loaded += 1,
                Err(e) => warn!("Skipping seed entity {}: {}", entity_id, e),
            }
        }

        Ok(loaded)
    }

    /// Start background tasks and mark the service as running
    pub async fn start(&self) -> Result<(), ServiceError> {
        info!("Starting repo-wars rating service");

        // Mark as running
        *self.is_running.write().await = true;

        self.start_background_tasks().await?;

        info!("✅ Repo-wars rating service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of repo-wars service");

        // Mark as not running
        *self.is_running.write().await = false;

        self.stop_background_tasks().await;

        info!("Final vote statistics: {:?}", self.workflow.stats());
        info!("✅ Repo-wars service shutdown completed");

        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn store(&self) -> Arc<dyn RatingStore> {
        self.store.clone()
    }

    pub fn calculator(&self) -> Arc<dyn RatingCalculator> {
        self.calculator.clone()
    }

    pub fn workflow(&self) -> Arc<VoteWorkflow> {
        self.workflow.clone()
    }

    pub fn metrics_collector(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    /// Time since the state was built
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// State handed to the `/wars` routes
    pub fn wars_state(&self) -> WarsState {
        WarsState {
            workflow: self.workflow.clone(),
            pair_selector: self.pair_selector.clone(),
            leaderboard: self.leaderboard.clone(),
            metrics_collector: self.metrics_collector.clone(),
        }
    }

    /// Start background maintenance tasks
    async fn start_background_tasks(&self) -> Result<(), ServiceError> {
        let refresh_interval = self.config.stats_refresh_interval();
        info!(
            "Starting stats refresh task ({}s interval)...",
            refresh_interval.as_secs()
        );

        let stats_task = {
            let store = self.store.clone();
            let metrics_collector = self.metrics_collector.clone();
            let is_running = self.is_running.clone();
            let started_at = self.started_at;

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(refresh_interval);
                info!("Stats refresh task started");

                while *is_running.read().await {
                    interval.tick().await;

                    metrics_collector
                        .service()
                        .uptime_seconds
                        .set(started_at.elapsed().as_secs() as i64);

                    let status = match store.entry_count().await {
                        Ok(count) => {
                            debug!("Updating metrics - entities: {}", count);
                            metrics_collector.set_entity_count(count);
                            metrics_collector.update_component_health("rating_store", true);
                            if count >= 2 {
                                HealthStatus::Healthy
                            } else {
                                HealthStatus::Degraded
                            }
                        }
                        Err(e) => {
                            warn!("Failed to count entities for metrics update: {}", e);
                            metrics_collector.update_component_health("rating_store", false);
                            HealthStatus::Unhealthy
                        }
                    };
                    metrics_collector.update_health_status(status.as_metric());
                }

                info!("Stats refresh task stopped");
            })
        };

        let mut tasks = self.background_tasks.lock().await;
        if !tasks.is_empty() {
            stats_task.abort();
            return Err(ServiceError::BackgroundTask {
                message: "Background tasks already running".to_string(),
            });
        }
        tasks.push(stats_task);

        info!("{} background tasks started successfully", tasks.len());
        Ok(())
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&self) {
        let tasks: Vec<JoinHandle<()>> = self.background_tasks.lock().await.drain(..).collect();
        let task_count = tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);

        for (i, task) in tasks.into_iter().enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
            let _ = task.await;
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}
