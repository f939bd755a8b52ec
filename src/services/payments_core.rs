//! Payments core service: intent creation, provider linkage, and the
//! idempotent confirmation path shared by webhooks and reconciliation.
//!
//! Every workflow here is one Postgres transaction. The confirmation path
//! keys its event row by the idempotency key, so for a given key exactly one
//! application ever commits; a concurrent webhook and reconciliation sweep
//! racing on the same provider event converge deterministically, with the
//! loser observing `transition_applied = false`.

use bigdecimal::BigDecimal;
use serde_json::{json, Value as JsonValue};
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::domain::{
    derive_idempotency_key, normalize_provider_status, resolve_transition, should_transition,
    AttemptStatus, ConfirmationSource, EventType, IntentStatus,
};

#[derive(Debug, Error)]
pub enum PaymentsCoreError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

impl PaymentsCoreError {
    fn validation(message: impl Into<String>, field: &str) -> Self {
        PaymentsCoreError::Validation {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateIntentInput {
    pub tenant_id: String,
    pub order_id: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub provider: String,
    pub metadata: Option<JsonValue>,
    pub actor_uid: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreatedIntent {
    pub intent_id: Uuid,
    pub attempt_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct ConfirmationInput {
    pub tenant_id: String,
    pub intent_id: Uuid,
    pub attempt_id: Uuid,
    pub provider_payment_id: String,
    pub provider_status: String,
    pub provider_event_id: Option<String>,
    pub request_id: Option<String>,
    pub amount: Option<BigDecimal>,
    pub currency: Option<String>,
    pub raw_provider_payload: JsonValue,
    pub source: ConfirmationSource,
    pub actor_uid: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationOutcome {
    pub transition_applied: bool,
}

#[derive(Clone)]
pub struct PaymentsCoreService {
    pool: PgPool,
}

impl PaymentsCoreService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn validate_create(input: &CreateIntentInput) -> Result<(), PaymentsCoreError> {
        if input.tenant_id.trim().is_empty() {
            return Err(PaymentsCoreError::validation(
                "tenant_id is required",
                "tenant_id",
            ));
        }
        if input.order_id.trim().is_empty() {
            return Err(PaymentsCoreError::validation(
                "order_id is required",
                "order_id",
            ));
        }
        if input.amount <= BigDecimal::from(0) {
            return Err(PaymentsCoreError::validation(
                "amount must be a positive number",
                "amount",
            ));
        }
        if input.currency.trim().is_empty() {
            return Err(PaymentsCoreError::validation(
                "currency is required",
                "currency",
            ));
        }
        if input.provider.trim().is_empty() {
            return Err(PaymentsCoreError::validation(
                "provider is required",
                "provider",
            ));
        }
        Ok(())
    }

    /// Create an intent and its first attempt atomically, together with the
    /// INTENT_CREATED ledger event. No external network call happens inside
    /// this transaction; provider linkage comes later via
    /// [`register_provider_attempt`](Self::register_provider_attempt).
    pub async fn create_payment_intent(
        &self,
        input: CreateIntentInput,
    ) -> Result<CreatedIntent, PaymentsCoreError> {
        Self::validate_create(&input)?;

        let intent_id = Uuid::new_v4();
        let attempt_id = Uuid::new_v4();
        let event_id = Uuid::new_v4().to_string();
        let metadata = input.metadata.clone().unwrap_or_else(|| json!({}));

        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        sqlx::query(
            "INSERT INTO payment_intents
             (tenant_id, id, order_id, amount, currency, provider, status, metadata, provider_preference_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NULL)",
        )
        .bind(&input.tenant_id)
        .bind(intent_id)
        .bind(&input.order_id)
        .bind(&input.amount)
        .bind(&input.currency)
        .bind(&input.provider)
        .bind(IntentStatus::RequiresConfirmation.as_str())
        .bind(&metadata)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        sqlx::query(
            "INSERT INTO payment_attempts
             (tenant_id, id, intent_id, provider, status, provider_preference_id, provider_payment_id, last_error)
             VALUES ($1, $2, $3, $4, $5, NULL, NULL, NULL)",
        )
        .bind(&input.tenant_id)
        .bind(attempt_id)
        .bind(intent_id)
        .bind(&input.provider)
        .bind(AttemptStatus::Initiated.as_str())
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        sqlx::query(
            "INSERT INTO payment_events
             (tenant_id, id, intent_id, attempt_id, type, from_status, to_status, source,
              actor_uid, provider_event_id, request_id, payload)
             VALUES ($1, $2, $3, $4, $5, NULL, $6, $7, $8, NULL, NULL, $9)",
        )
        .bind(&input.tenant_id)
        .bind(&event_id)
        .bind(intent_id)
        .bind(attempt_id)
        .bind(EventType::IntentCreated.as_str())
        .bind(IntentStatus::RequiresConfirmation.as_str())
        .bind(ConfirmationSource::System.as_str())
        .bind(&input.actor_uid)
        .bind(json!({
            "order_id": input.order_id,
            "amount": input.amount.to_string(),
            "currency": input.currency,
            "provider": input.provider,
        }))
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;

        info!(
            tenant_id = %input.tenant_id,
            intent_id = %intent_id,
            attempt_id = %attempt_id,
            order_id = %input.order_id,
            "payment intent created"
        );

        Ok(CreatedIntent {
            intent_id,
            attempt_id,
        })
    }

    /// Link the provider-side preference to the intent and attempt, moving
    /// the attempt to PENDING_PROVIDER. Pure metadata update; re-setting the
    /// same preference id is a no-op in effect.
    pub async fn register_provider_attempt(
        &self,
        tenant_id: &str,
        intent_id: Uuid,
        attempt_id: Uuid,
        provider_preference_id: &str,
    ) -> Result<(), PaymentsCoreError> {
        if provider_preference_id.trim().is_empty() {
            return Err(PaymentsCoreError::validation(
                "provider_preference_id is required",
                "provider_preference_id",
            ));
        }

        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        sqlx::query(
            "UPDATE payment_intents
             SET provider_preference_id = $3, updated_at = NOW()
             WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(intent_id)
        .bind(provider_preference_id)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        sqlx::query(
            "UPDATE payment_attempts
             SET provider_preference_id = $3, status = $4, updated_at = NOW()
             WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(attempt_id)
        .bind(provider_preference_id)
        .bind(AttemptStatus::PendingProvider.as_str())
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;

        info!(
            tenant_id = %tenant_id,
            intent_id = %intent_id,
            attempt_id = %attempt_id,
            preference_id = %provider_preference_id,
            "provider attempt registered"
        );

        Ok(())
    }

    /// Apply a provider confirmation — from a webhook or a reconciliation
    /// sweep — exactly once per idempotency key.
    ///
    /// The intent status only moves when the candidate's priority is at least
    /// the current one's, but the attempt and transaction rows are always
    /// refreshed to the provider's latest reported sub-state, even when the
    /// intent-level transition is blocked. That asymmetry preserves the full
    /// provider history and is a deliberate contract.
    pub async fn confirm(
        &self,
        input: ConfirmationInput,
    ) -> Result<ConfirmationOutcome, PaymentsCoreError> {
        if input.provider_payment_id.trim().is_empty() {
            return Err(PaymentsCoreError::validation(
                "provider_payment_id is required",
                "provider_payment_id",
            ));
        }

        let idempotency_key = derive_idempotency_key(
            input.provider_event_id.as_deref(),
            &input.provider_payment_id,
            &input.provider_status,
        );
        let transition = resolve_transition(&input.provider_status);

        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        // At-most-once guard: the event row at the idempotency key.
        let already_applied: Option<String> = sqlx::query_scalar(
            "SELECT id FROM payment_events WHERE tenant_id = $1 AND id = $2",
        )
        .bind(&input.tenant_id)
        .bind(&idempotency_key)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if already_applied.is_some() {
            return Ok(ConfirmationOutcome {
                transition_applied: false,
            });
        }

        // Lock the intent row so concurrent confirms for the same intent
        // serialize. A missing row reads as CREATED, mirroring the original
        // merge-set tolerance for partially materialized documents.
        let current_status: Option<String> = sqlx::query_scalar(
            "SELECT status FROM payment_intents WHERE tenant_id = $1 AND id = $2 FOR UPDATE",
        )
        .bind(&input.tenant_id)
        .bind(input.intent_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let current = current_status
            .as_deref()
            .and_then(IntentStatus::parse)
            .unwrap_or(IntentStatus::Created);

        let transition_applied = should_transition(current, transition.intent_status);

        if transition_applied {
            sqlx::query(
                "UPDATE payment_intents SET status = $3, updated_at = NOW()
                 WHERE tenant_id = $1 AND id = $2",
            )
            .bind(&input.tenant_id)
            .bind(input.intent_id)
            .bind(transition.intent_status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        }

        let last_error = if transition.attempt_status == AttemptStatus::Failed {
            Some(format!(
                "provider_status:{}",
                normalize_provider_status(&input.provider_status)
            ))
        } else {
            None
        };

        sqlx::query(
            "UPDATE payment_attempts
             SET provider_payment_id = $3, status = $4, last_error = $5, updated_at = NOW()
             WHERE tenant_id = $1 AND id = $2",
        )
        .bind(&input.tenant_id)
        .bind(input.attempt_id)
        .bind(&input.provider_payment_id)
        .bind(transition.attempt_status.as_str())
        .bind(&last_error)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        sqlx::query(
            "INSERT INTO payment_transactions
             (tenant_id, id, intent_id, attempt_id, provider, status, amount, currency, raw_provider_payload)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (tenant_id, id) DO UPDATE SET
                 intent_id = EXCLUDED.intent_id,
                 attempt_id = EXCLUDED.attempt_id,
                 status = EXCLUDED.status,
                 amount = EXCLUDED.amount,
                 currency = EXCLUDED.currency,
                 raw_provider_payload = EXCLUDED.raw_provider_payload,
                 updated_at = NOW()",
        )
        .bind(&input.tenant_id)
        .bind(&input.provider_payment_id)
        .bind(input.intent_id)
        .bind(input.attempt_id)
        .bind("mercado_pago")
        .bind(transition.transaction_status.as_str())
        .bind(&input.amount)
        .bind(&input.currency)
        .bind(&input.raw_provider_payload)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let event_insert = sqlx::query(
            "INSERT INTO payment_events
             (tenant_id, id, intent_id, attempt_id, type, from_status, to_status, source,
              actor_uid, provider_event_id, request_id, payload)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(&input.tenant_id)
        .bind(&idempotency_key)
        .bind(input.intent_id)
        .bind(input.attempt_id)
        .bind(input.source.event_type().as_str())
        .bind(current.as_str())
        .bind(transition.intent_status.as_str())
        .bind(input.source.as_str())
        .bind(&input.actor_uid)
        .bind(&input.provider_event_id)
        .bind(&input.request_id)
        .bind(json!({
            "provider_status": input.provider_status,
            "provider_payment_id": input.provider_payment_id,
        }))
        .execute(&mut *tx)
        .await;

        if let Err(e) = event_insert {
            let db_err = DatabaseError::from_sqlx(e);
            if db_err.is_unique_violation() {
                // A concurrent application of the same event committed first;
                // this transaction loses and reports a no-op.
                tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
                return Ok(ConfirmationOutcome {
                    transition_applied: false,
                });
            }
            return Err(db_err.into());
        }

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;

        info!(
            tenant_id = %input.tenant_id,
            intent_id = %input.intent_id,
            provider_payment_id = %input.provider_payment_id,
            provider_status = %normalize_provider_status(&input.provider_status),
            source = %input.source,
            from_status = %current,
            to_status = %transition.intent_status,
            transition_applied,
            "payment confirmation applied"
        );

        Ok(ConfirmationOutcome { transition_applied })
    }
}
