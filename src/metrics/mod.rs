//! Metrics and monitoring for the repo-wars rating service
//!
//! This module provides metrics collection and the HTTP server exposing the
//! wars API next to the health and Prometheus endpoints.

pub mod collector;
pub mod health;

pub use collector::{EntityMetrics, MetricsCollector, MetricsTimer, ServiceMetrics, VoteMetrics};
pub use health::{HealthEndpoints, HealthServer, HealthServerConfig};
