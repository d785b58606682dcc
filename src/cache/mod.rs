//! Redis connection pool backing the broadcast notification channel

pub mod error;

use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use std::time::Duration;
use tracing::{error, info, warn};

pub use error::CacheError;

/// Redis connection pool type alias
pub type RedisPool = Pool<RedisConnectionManager>;

/// Redis pool configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Redis connection URL
    pub redis_url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum idle connections
    pub min_idle: u32,
    /// Connection timeout
    pub connection_timeout: Duration,
    /// Maximum lifetime of a connection
    pub max_lifetime: Duration,
    /// Idle timeout before closing connection
    pub idle_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            max_connections: 10,
            min_idle: 1,
            connection_timeout: Duration::from_secs(5),
            max_lifetime: Duration::from_secs(300),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Initialize Redis connection pool
pub async fn init_cache_pool(config: CacheConfig) -> Result<RedisPool, CacheError> {
    info!(
        "Initializing Redis pool: max_connections={}",
        config.max_connections
    );

    let manager = RedisConnectionManager::new(config.redis_url.as_str()).map_err(|e| {
        error!("Failed to create Redis connection manager: {}", e);
        CacheError::ConnectionError(e.to_string())
    })?;

    let pool = Pool::builder()
        .max_size(config.max_connections)
        .min_idle(config.min_idle)
        .connection_timeout(config.connection_timeout)
        .max_lifetime(config.max_lifetime)
        .idle_timeout(config.idle_timeout)
        .test_on_check_out(false)
        .build(manager)
        .await
        .map_err(|e| {
            error!("Failed to build Redis connection pool: {}", e);
            CacheError::ConnectionError(e.to_string())
        })?;

    // Publishing degrades to a logged failure, so a cold Redis is not fatal at boot
    if let Err(e) = test_connection(&pool).await {
        warn!("Initial Redis connection test failed, but continuing: {}", e);
    }

    info!("Redis pool initialized successfully");
    Ok(pool)
}

async fn test_connection(pool: &RedisPool) -> Result<(), CacheError> {
    let mut conn = pool.get().await.map_err(|e| {
        error!("Failed to get Redis connection for test: {}", e);
        CacheError::ConnectionError(e.to_string())
    })?;

    let _: String = redis::cmd("PING")
        .query_async(&mut *conn)
        .await
        .map_err(|e| {
            error!("Redis PING failed: {}", e);
            CacheError::ConnectionError(e.to_string())
        })?;

    Ok(())
}

/// Health check for Redis connection pool
pub async fn health_check(pool: &RedisPool) -> Result<(), CacheError> {
    test_connection(pool).await
}
