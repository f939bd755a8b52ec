use crate::database::error::DatabaseError;
use crate::domain::PaymentIntent;
use sqlx::PgPool;
use uuid::Uuid;

/// Tenant-scoped reads over payment intents. All mutation of intents goes
/// through the core service's transactional workflows; this repository is the
/// read side consumed by the API and the tests.
pub struct IntentRepository {
    pool: PgPool,
}

impl IntentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(
        &self,
        tenant_id: &str,
        intent_id: Uuid,
    ) -> Result<Option<PaymentIntent>, DatabaseError> {
        sqlx::query_as::<_, PaymentIntent>(
            "SELECT tenant_id, id, order_id, amount, currency, provider, status, metadata,
                    provider_preference_id, created_at, updated_at
             FROM payment_intents
             WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Read-only status projection consumed by the ordering/UI collaborators.
    pub async fn get_status(
        &self,
        tenant_id: &str,
        intent_id: Uuid,
    ) -> Result<Option<String>, DatabaseError> {
        sqlx::query_scalar::<_, String>(
            "SELECT status FROM payment_intents WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_by_order(
        &self,
        tenant_id: &str,
        order_id: &str,
    ) -> Result<Vec<PaymentIntent>, DatabaseError> {
        sqlx::query_as::<_, PaymentIntent>(
            "SELECT tenant_id, id, order_id, amount, currency, provider, status, metadata,
                    provider_preference_id, created_at, updated_at
             FROM payment_intents
             WHERE tenant_id = $1 AND order_id = $2
             ORDER BY created_at DESC",
        )
        .bind(tenant_id)
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
