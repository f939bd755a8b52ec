//! Health probes: liveness is static, readiness checks the dependencies.

use serde::Serialize;
use sqlx::PgPool;

use crate::cache::RedisPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: &'static str,
    pub healthy: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: HealthState,
    pub components: Vec<ComponentHealth>,
}

#[derive(Clone)]
pub struct HealthChecker {
    db_pool: PgPool,
    cache_pool: Option<RedisPool>,
}

impl HealthChecker {
    pub fn new(db_pool: PgPool, cache_pool: Option<RedisPool>) -> Self {
        Self {
            db_pool,
            cache_pool,
        }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let mut components = Vec::new();

        let db_result = crate::database::health_check(&self.db_pool).await;
        components.push(ComponentHealth {
            name: "database",
            healthy: db_result.is_ok(),
            detail: db_result.err().map(|e| e.to_string()),
        });

        if let Some(cache) = &self.cache_pool {
            let cache_result = crate::cache::health_check(cache).await;
            components.push(ComponentHealth {
                name: "cache",
                healthy: cache_result.is_ok(),
                detail: cache_result.err().map(|e| e.to_string()),
            });
        }

        // The database is load-bearing; the replay cache only degrades.
        let db_healthy = components
            .iter()
            .find(|c| c.name == "database")
            .map(|c| c.healthy)
            .unwrap_or(false);
        let all_healthy = components.iter().all(|c| c.healthy);

        let status = if all_healthy {
            HealthState::Healthy
        } else if db_healthy {
            HealthState::Degraded
        } else {
            HealthState::Unhealthy
        };

        HealthStatus { status, components }
    }
}
