//! TTL-bounded replay dedup for webhook deliveries.
//!
//! This is a coarser-grained guard than the PaymentEvent ledger: it exists to
//! shed duplicate floods before they reach Postgres, not to provide the
//! at-most-once property (the event row's primary key does that). When Redis
//! is unavailable the guard admits the delivery and lets the ledger arbitrate.

use crate::cache::error::CacheResult;
use crate::cache::RedisPool;
use tracing::warn;

const KEY_VERSION: &str = "v1";
const KEY_NAMESPACE: &str = "webhook";

/// Dedup key for one delivery identity.
pub fn replay_key(request_id: &str, data_id: &str) -> String {
    format!(
        "{}:{}:replay:{}:{}",
        KEY_VERSION, KEY_NAMESPACE, request_id, data_id
    )
}

#[derive(Clone)]
pub struct ReplayGuard {
    pool: Option<RedisPool>,
    ttl_ms: u64,
}

impl ReplayGuard {
    pub fn new(pool: Option<RedisPool>, ttl_ms: u64) -> Self {
        Self { pool, ttl_ms }
    }

    /// Record the delivery identity and report whether it was seen within the
    /// TTL window. `SET NX PX` makes check-and-record one round trip; an
    /// already-present key means a replay.
    pub async fn check_and_record(&self, request_id: &str, data_id: &str) -> bool {
        let Some(pool) = &self.pool else {
            return false;
        };

        match self.try_record(pool, request_id, data_id).await {
            Ok(freshly_recorded) => !freshly_recorded,
            Err(e) => {
                // Fail open: the event ledger remains the authoritative
                // at-most-once guard.
                warn!(error = %e, "replay cache unavailable, admitting delivery");
                false
            }
        }
    }

    async fn try_record(
        &self,
        pool: &RedisPool,
        request_id: &str,
        data_id: &str,
    ) -> CacheResult<bool> {
        let mut conn = pool.get().await?;
        let key = replay_key(request_id, data_id);

        let outcome: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg("1")
            .arg("NX")
            .arg("PX")
            .arg(self.ttl_ms)
            .query_async(&mut *conn)
            .await?;

        // SET NX returns OK when the key was written, nil when it existed.
        Ok(outcome.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_keys_are_namespaced_and_versioned() {
        assert_eq!(
            replay_key("req-1", "pay-1"),
            "v1:webhook:replay:req-1:pay-1"
        );
    }

    #[test]
    fn distinct_deliveries_get_distinct_keys() {
        assert_ne!(replay_key("req-1", "pay-1"), replay_key("req-2", "pay-1"));
        assert_ne!(replay_key("req-1", "pay-1"), replay_key("req-1", "pay-2"));
    }

    #[tokio::test]
    async fn guard_without_pool_never_reports_replay() {
        let guard = ReplayGuard::new(None, 60_000);
        assert!(!guard.check_and_record("req-1", "pay-1").await);
        assert!(!guard.check_and_record("req-1", "pay-1").await);
    }
}
