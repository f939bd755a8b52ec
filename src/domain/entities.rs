//! Ledger row types. All entities are scoped under a tenant; the composite
//! `(tenant_id, id)` key in the schema is what enforces that no read or write
//! ever crosses a tenant boundary.

use bigdecimal::BigDecimal;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// One payable obligation for one order, and its canonical outcome.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PaymentIntent {
    pub tenant_id: String,
    pub id: Uuid,
    pub order_id: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub provider: String,
    pub status: String,
    pub metadata: serde_json::Value,
    pub provider_preference_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// One concrete attempt to collect an intent via a provider. The modeled
/// flow creates exactly one at intent creation, but an intent may accumulate
/// more over its life.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PaymentAttempt {
    pub tenant_id: String,
    pub id: Uuid,
    pub intent_id: Uuid,
    pub provider: String,
    pub status: String,
    pub provider_preference_id: Option<String>,
    pub provider_payment_id: Option<String>,
    pub last_error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// The provider's authoritative record of a single payment, keyed by the
/// provider's own payment id so repeated updates overwrite the same row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PaymentTransaction {
    pub tenant_id: String,
    pub id: String,
    pub intent_id: Uuid,
    pub attempt_id: Uuid,
    pub provider: String,
    pub status: String,
    pub amount: Option<BigDecimal>,
    pub currency: Option<String>,
    pub raw_provider_payload: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Append-only audit record of every confirmation application. The row id is
/// the idempotency key, which is what makes re-application safe.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PaymentEvent {
    pub tenant_id: String,
    pub id: String,
    pub intent_id: Uuid,
    pub attempt_id: Option<Uuid>,
    pub r#type: String,
    pub from_status: Option<String>,
    pub to_status: String,
    pub source: String,
    pub actor_uid: Option<String>,
    pub provider_event_id: Option<String>,
    pub request_id: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
