//! Health check module
//! Provides health status for the service and the stores it depends on

use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info};

#[cfg(feature = "cache")]
use crate::cache::RedisPool;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }

    fn record(&mut self, component: &str, result: Result<u128, String>) {
        let health = match result {
            Ok(response_time) => {
                info!("{} health check: OK ({}ms)", component, response_time);
                ComponentHealth::up(Some(response_time))
            }
            Err(e) => {
                error!("{} health check failed: {}", component, e);
                self.status = HealthState::Unhealthy;
                ComponentHealth::down(Some(e))
            }
        };
        self.checks.insert(component.to_string(), health);
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }
}

/// Checks the components the running service was built with; absent ones are skipped
#[derive(Clone, Default)]
pub struct HealthChecker {
    db_pool: Option<PgPool>,
    #[cfg(feature = "cache")]
    cache: Option<RedisPool>,
}

impl HealthChecker {
    pub fn new(db_pool: Option<PgPool>) -> Self {
        Self {
            db_pool,
            #[cfg(feature = "cache")]
            cache: None,
        }
    }

    #[cfg(feature = "cache")]
    pub fn with_cache(mut self, cache: RedisPool) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();

        if let Some(pool) = &self.db_pool {
            let result = match timeout(Duration::from_secs(5), check_database_health(pool)).await {
                Ok(result) => result,
                Err(_) => Err("Timeout".to_string()),
            };
            health_status.record("database", result);
        }

        #[cfg(feature = "cache")]
        if let Some(cache) = &self.cache {
            let result = match timeout(Duration::from_secs(5), check_cache_health(cache)).await {
                Ok(result) => result,
                Err(_) => Err("Timeout".to_string()),
            };
            health_status.record("cache", result);
        }

        health_status
    }
}

pub async fn check_database_health(pool: &PgPool) -> Result<u128, String> {
    let start = Instant::now();
    crate::database::health_check(pool)
        .await
        .map(|_| start.elapsed().as_millis())
        .map_err(|e| e.to_string())
}

#[cfg(feature = "cache")]
pub async fn check_cache_health(pool: &RedisPool) -> Result<u128, String> {
    let start = Instant::now();
    crate::cache::health_check(pool)
        .await
        .map(|_| start.elapsed().as_millis())
        .map_err(|e| e.to_string())
}
