//! Intent creation and canonical status read, the only two surfaces the
//! ordering/checkout collaborators consume.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::intent_repository::IntentRepository;
use crate::error::{AppError, AppErrorKind, DomainError, ValidationError};
use crate::middleware::error::get_request_id_from_headers;
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{PreferenceItemInput, PreferenceRequest};
use crate::services::{CreateIntentInput, PaymentsCoreService};

#[derive(Clone)]
pub struct PaymentsState {
    pub core: PaymentsCoreService,
    pub intents: Arc<IntentRepository>,
    pub provider: Arc<dyn PaymentProvider>,
}

#[derive(Debug, Deserialize)]
pub struct CreateIntentApiRequest {
    pub tenant_id: String,
    pub order_id: String,
    pub amount: String,
    pub currency: String,
    pub provider: Option<String>,
    pub description: Option<String>,
    pub payer_email: Option<String>,
    #[serde(default)]
    pub items: Vec<PreferenceItemInput>,
    pub metadata: Option<serde_json::Value>,
    pub actor_uid: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateIntentApiResponse {
    pub intent_id: Uuid,
    pub attempt_id: Uuid,
    pub preference_id: String,
    pub init_point: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox_init_point: Option<String>,
}

/// POST /api/payments/intents
///
/// Creates the intent and attempt atomically, then creates the provider-side
/// checkout preference and links it. The provider call deliberately happens
/// outside the creation transaction; if it fails the intent stays behind in
/// REQUIRES_CONFIRMATION and the caller retries.
pub async fn create_intent(
    State(state): State<PaymentsState>,
    headers: HeaderMap,
    Json(payload): Json<CreateIntentApiRequest>,
) -> Result<Json<CreateIntentApiResponse>, AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let attach = |err: AppError| match &request_id {
        Some(id) => err.with_request_id(id.clone()),
        None => err,
    };

    let amount = BigDecimal::from_str(payload.amount.trim()).map_err(|_| {
        attach(AppError::new(AppErrorKind::Validation(
            ValidationError::InvalidAmount {
                amount: payload.amount.clone(),
                reason: "not a decimal number".to_string(),
            },
        )))
    })?;

    let provider_name = payload
        .provider
        .clone()
        .unwrap_or_else(|| state.provider.name().as_str().to_string());

    let created = state
        .core
        .create_payment_intent(CreateIntentInput {
            tenant_id: payload.tenant_id.clone(),
            order_id: payload.order_id.clone(),
            amount: amount.clone(),
            currency: payload.currency.clone(),
            provider: provider_name,
            metadata: payload.metadata.clone(),
            actor_uid: payload.actor_uid.clone(),
        })
        .await
        .map_err(|e| attach(e.into()))?;

    let preference = state
        .provider
        .create_preference(PreferenceRequest {
            tenant_id: payload.tenant_id.clone(),
            order_id: payload.order_id.clone(),
            intent_id: created.intent_id.to_string(),
            attempt_id: created.attempt_id.to_string(),
            amount,
            currency: payload.currency.clone(),
            description: payload.description.clone(),
            payer_email: payload.payer_email.clone(),
            items: payload.items.clone(),
            metadata: payload.metadata.clone(),
        })
        .await
        .map_err(|e| {
            warn!(
                tenant_id = %payload.tenant_id,
                intent_id = %created.intent_id,
                error = %e,
                "preference creation failed after intent creation"
            );
            attach(e.into())
        })?;

    state
        .core
        .register_provider_attempt(
            &payload.tenant_id,
            created.intent_id,
            created.attempt_id,
            &preference.preference_id,
        )
        .await
        .map_err(|e| attach(e.into()))?;

    info!(
        tenant_id = %payload.tenant_id,
        intent_id = %created.intent_id,
        preference_id = %preference.preference_id,
        "payment intent ready for checkout"
    );

    Ok(Json(CreateIntentApiResponse {
        intent_id: created.intent_id,
        attempt_id: created.attempt_id,
        preference_id: preference.preference_id,
        init_point: preference.init_point,
        sandbox_init_point: preference.sandbox_init_point,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub tenant_id: String,
}

#[derive(Debug, Serialize)]
pub struct IntentStatusResponse {
    pub intent_id: Uuid,
    pub status: String,
}

/// GET /api/payments/intents/{id}/status?tenant_id=...
pub async fn get_intent_status(
    State(state): State<PaymentsState>,
    Path(intent_id): Path<Uuid>,
    Query(query): Query<StatusQuery>,
    headers: HeaderMap,
) -> Result<Json<IntentStatusResponse>, AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let attach = |err: AppError| match &request_id {
        Some(id) => err.with_request_id(id.clone()),
        None => err,
    };

    if query.tenant_id.trim().is_empty() {
        return Err(attach(AppError::new(AppErrorKind::Validation(
            ValidationError::MissingField {
                field: "tenant_id".to_string(),
            },
        ))));
    }

    let status = state
        .intents
        .get_status(&query.tenant_id, intent_id)
        .await
        .map_err(|e| attach(e.into()))?;

    match status {
        Some(status) => Ok(Json(IntentStatusResponse { intent_id, status })),
        None => Err(attach(AppError::new(AppErrorKind::Domain(
            DomainError::IntentNotFound {
                tenant_id: query.tenant_id,
                intent_id: intent_id.to_string(),
            },
        )))),
    }
}
