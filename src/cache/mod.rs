//! Redis connection layer backing the webhook replay-dedup cache.
//!
//! The pool degrades gracefully: a failed initial PING only warns, and
//! consumers decide what an unavailable cache means for them (the replay
//! guard admits the delivery and lets the event ledger arbitrate).

pub mod error;

use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use std::time::Duration;
use tracing::{error, info, warn};

use error::CacheError;

/// Redis connection pool type alias
pub type RedisPool = Pool<RedisConnectionManager>;

/// Redis cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub redis_url: String,
    pub max_connections: u32,
    pub min_idle: u32,
    pub connection_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            max_connections: 10,
            min_idle: 2,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

/// Initialize the Redis connection pool with fault tolerance
pub async fn init_cache_pool(config: CacheConfig) -> Result<RedisPool, CacheError> {
    info!(
        max_connections = config.max_connections,
        "initializing Redis cache pool"
    );

    let manager = RedisConnectionManager::new(config.redis_url.clone()).map_err(|e| {
        error!("failed to create Redis connection manager: {}", e);
        CacheError::ConnectionError(e.to_string())
    })?;

    let pool = Pool::builder()
        .max_size(config.max_connections)
        .min_idle(Some(config.min_idle))
        .connection_timeout(config.connection_timeout)
        .build(manager)
        .await
        .map_err(|e| {
            error!("failed to build Redis connection pool: {}", e);
            CacheError::ConnectionError(e.to_string())
        })?;

    // A failed test connection is not fatal; consumers degrade gracefully.
    if let Err(e) = test_connection(&pool).await {
        warn!("initial Redis connection test failed, continuing: {}", e);
    }

    info!("Redis cache pool initialized");
    Ok(pool)
}

/// Test Redis connection
async fn test_connection(pool: &RedisPool) -> Result<(), CacheError> {
    let mut conn = pool.get().await.map_err(CacheError::from)?;

    let _: String = redis::cmd("PING")
        .query_async(&mut *conn)
        .await
        .map_err(CacheError::from)?;

    Ok(())
}

/// Health check for the Redis connection pool
pub async fn health_check(pool: &RedisPool) -> Result<(), CacheError> {
    test_connection(pool).await
}
