//! Main application configuration
//!
//! This module defines the primary configuration structures for the repo-wars
//! service, including environment variable and TOML file loading and validation.

use crate::config::rating::{ConsistencyMode, RatingSettings};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub rating: RatingSettings,
    pub store: StoreSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Interface the HTTP server binds to
    pub host: String,
    /// Port for the wars API, health and metrics endpoints
    pub http_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
    /// How often entity gauges are refreshed, in seconds
    pub stats_refresh_seconds: u64,
}

/// Rating store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// JSON file of entities loaded at startup
    pub seed_path: Option<PathBuf>,
    /// Maximum attempts for a store operation failing transiently
    pub max_retry_attempts: u32,
    /// Delay between attempts in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "repo-wars".to_string(),
            log_level: "info".to_string(),
            host: "0.0.0.0".to_string(),
            http_port: 8080,
            shutdown_timeout_seconds: 30,
            stats_refresh_seconds: 30,
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            seed_path: None,
            max_retry_attempts: 3,
            retry_delay_ms: 100,
        }
    }
}

/// Parse an environment variable if it is set
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|e| anyhow!("Invalid {} value '{}': {}", key, value, e)),
        Err(_) => Ok(None),
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file; environment variables still win
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;

        validate_config(&config)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Some(name) = env_parse("SERVICE_NAME")? {
            self.service.name = name;
        }
        if let Some(log_level) = env_parse("LOG_LEVEL")? {
            self.service.log_level = log_level;
        }
        if let Some(host) = env_parse("HTTP_HOST")? {
            self.service.host = host;
        }
        if let Some(port) = env_parse("HTTP_PORT")? {
            self.service.http_port = port;
        }
        if let Some(timeout) = env_parse("SHUTDOWN_TIMEOUT_SECONDS")? {
            self.service.shutdown_timeout_seconds = timeout;
        }
        if let Some(refresh) = env_parse("STATS_REFRESH_SECONDS")? {
            self.service.stats_refresh_seconds = refresh;
        }

        // Rating settings
        if let Some(k_factor) = env_parse("ELO_K_FACTOR")? {
            self.rating.k_factor = k_factor;
        }
        if let Some(initial_rating) = env_parse("ELO_INITIAL_RATING")? {
            self.rating.initial_rating = initial_rating;
        }
        if let Some(mode) = env_parse::<ConsistencyMode>("CONSISTENCY_MODE")? {
            self.rating.consistency = mode;
        }
        if let Some(retries) = env_parse("MAX_CONFLICT_RETRIES")? {
            self.rating.max_conflict_retries = retries;
        }
        if let Some(window) = env_parse("IDEMPOTENCY_WINDOW")? {
            self.rating.idempotency_window = window;
        }

        // Store settings
        if let Some(seed_path) = env_parse("STORE_SEED_PATH")? {
            self.store.seed_path = Some(seed_path);
        }
        if let Some(retries) = env_parse("STORE_MAX_RETRY_ATTEMPTS")? {
            self.store.max_retry_attempts = retries;
        }
        if let Some(delay) = env_parse("STORE_RETRY_DELAY_MS")? {
            self.store.retry_delay_ms = delay;
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get stats refresh interval as Duration
    pub fn stats_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.service.stats_refresh_seconds)
    }

    /// Get store retry delay as Duration
    pub fn store_retry_delay(&self) -> Duration {
        Duration::from_millis(self.store.retry_delay_ms)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.http_port == 0 {
        return Err(anyhow!("HTTP port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.service.stats_refresh_seconds == 0 {
        return Err(anyhow!("Stats refresh interval must be greater than 0"));
    }

    // Validate rating settings
    config.rating.elo_config().validate()?;
    if config.rating.max_conflict_retries == 0 {
        return Err(anyhow!("Max conflict retries must be greater than 0"));
    }
    if config.rating.leaderboard_default_limit == 0
        || config.rating.leaderboard_default_limit > config.rating.leaderboard_max_limit
    {
        return Err(anyhow!(
            "Leaderboard default limit must be between 1 and {}",
            config.rating.leaderboard_max_limit
        ));
    }

    // Validate store settings
    if config.store.max_retry_attempts == 0 {
        return Err(anyhow!("Store max retry attempts must be greater than 0"));
    }

    Ok(())
}
