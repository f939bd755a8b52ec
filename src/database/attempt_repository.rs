use crate::database::error::DatabaseError;
use crate::domain::PaymentAttempt;
use sqlx::PgPool;
use uuid::Uuid;

/// Tenant-scoped reads over payment attempts, plus the cross-tenant stale
/// scan the reconciliation sweeper runs (each returned row still carries its
/// own tenant id, so downstream writes stay tenant-scoped).
pub struct AttemptRepository {
    pool: PgPool,
}

impl AttemptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(
        &self,
        tenant_id: &str,
        attempt_id: Uuid,
    ) -> Result<Option<PaymentAttempt>, DatabaseError> {
        sqlx::query_as::<_, PaymentAttempt>(
            "SELECT tenant_id, id, intent_id, provider, status, provider_preference_id,
                    provider_payment_id, last_error, created_at, updated_at
             FROM payment_attempts
             WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(attempt_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Most recent attempt for an intent. Used by the webhook path when a
    /// provider payload carries the intent correlation but no attempt id.
    pub async fn find_latest_for_intent(
        &self,
        tenant_id: &str,
        intent_id: Uuid,
    ) -> Result<Option<PaymentAttempt>, DatabaseError> {
        sqlx::query_as::<_, PaymentAttempt>(
            "SELECT tenant_id, id, intent_id, provider, status, provider_preference_id,
                    provider_payment_id, last_error, created_at, updated_at
             FROM payment_attempts
             WHERE tenant_id = $1 AND intent_id = $2
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(tenant_id)
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Attempts stuck in a provider-pending state whose last update is older
    /// than `pending_minutes`, oldest first, bounded by `batch_size`.
    pub async fn find_stale_pending(
        &self,
        pending_minutes: i64,
        batch_size: i64,
    ) -> Result<Vec<PaymentAttempt>, DatabaseError> {
        sqlx::query_as::<_, PaymentAttempt>(
            "SELECT tenant_id, id, intent_id, provider, status, provider_preference_id,
                    provider_payment_id, last_error, created_at, updated_at
             FROM payment_attempts
             WHERE status IN ('PENDING_PROVIDER', 'AUTHORIZED')
               AND updated_at < NOW() - INTERVAL '1 minute' * $1
             ORDER BY updated_at ASC
             LIMIT $2",
        )
        .bind(pending_minutes)
        .bind(batch_size)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
