//! Webhook endpoint for provider payment notifications.
//!
//! The pushed body is never trusted for payment state: after the ingestion
//! guard passes, the payment is re-fetched from the provider by id and that
//! authoritative record drives the confirmation.

use axum::{
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::attempt_repository::AttemptRepository;
use crate::domain::ConfirmationSource;
use crate::payments::provider::PaymentProvider;
use crate::services::{ConfirmationInput, PaymentsCoreService};
use crate::webhook::{GuardContext, GuardRejection, WebhookGuard};

#[derive(Clone)]
pub struct WebhookState {
    pub guard: Arc<WebhookGuard>,
    pub core: PaymentsCoreService,
    pub attempts: Arc<AttemptRepository>,
    pub provider: Arc<dyn PaymentProvider>,
}

/// POST /webhooks/mercadopago
pub async fn handle_webhook(
    State(state): State<WebhookState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    let signature_header = header_value(&headers, "x-signature");
    let request_id = header_value(&headers, "x-request-id");
    let payload: JsonValue = serde_json::from_str(&body).unwrap_or(JsonValue::Null);

    let data_id = extract_data_id(&payload, &query);
    let ctx = GuardContext {
        actor_uid: None,
        request_id: request_id.clone(),
        source_ip: Some(source_ip(&headers, peer)),
    };

    if let Err(rejection) = state.guard.check(&ctx, &signature_header, &data_id).await {
        return match rejection {
            GuardRejection::Replayed => {
                // Already seen within the TTL window; acknowledge so the
                // provider stops redelivering.
                (StatusCode::OK, Json(json!({"status": "duplicate"}))).into_response()
            }
            GuardRejection::IpBlocked => {
                (StatusCode::FORBIDDEN, "Forbidden").into_response()
            }
            GuardRejection::Signature(_) => {
                (StatusCode::UNAUTHORIZED, "Invalid signature").into_response()
            }
        };
    }

    // The authoritative record comes from the provider, not the pushed body.
    let payment = match state.provider.fetch_payment(&data_id).await {
        Ok(payment) => payment,
        Err(e) if e.is_retryable() => {
            warn!(data_id = %data_id, error = %e, "provider fetch failed, asking for redelivery");
            return (StatusCode::SERVICE_UNAVAILABLE, "Provider unavailable").into_response();
        }
        Err(e) => {
            warn!(data_id = %data_id, error = %e, "provider fetch failed permanently");
            return (StatusCode::OK, Json(json!({"status": "ignored"}))).into_response();
        }
    };

    let Some((tenant_id, intent_id)) = correlation(&payment.tenant_id, &payment.intent_id) else {
        warn!(
            data_id = %data_id,
            "payment carries no tenant/intent correlation; reconciliation cannot recover it either"
        );
        return (StatusCode::OK, Json(json!({"status": "unmatched"}))).into_response();
    };

    // The preference metadata carries the attempt id; older preferences fall
    // back to the latest attempt for the intent.
    let attempt_id = match resolve_attempt_id(&state, &tenant_id, intent_id, &payment.attempt_id).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            warn!(tenant_id = %tenant_id, intent_id = %intent_id, "no attempt found for intent");
            return (StatusCode::OK, Json(json!({"status": "unmatched"}))).into_response();
        }
        Err(e) => {
            warn!(error = %e, "attempt lookup failed");
            return (StatusCode::SERVICE_UNAVAILABLE, "Storage unavailable").into_response();
        }
    };

    let provider_event_id = extract_event_id(&payload);

    let outcome = state
        .core
        .confirm(ConfirmationInput {
            tenant_id: tenant_id.clone(),
            intent_id,
            attempt_id,
            provider_payment_id: payment.provider_payment_id.clone(),
            provider_status: payment.provider_status.clone(),
            provider_event_id,
            request_id: Some(request_id.clone()),
            amount: payment.amount.clone(),
            currency: payment.currency.clone(),
            raw_provider_payload: payment.raw_payload.clone(),
            source: ConfirmationSource::Webhook,
            actor_uid: None,
        })
        .await;

    match outcome {
        Ok(result) => {
            info!(
                tenant_id = %tenant_id,
                intent_id = %intent_id,
                provider_payment_id = %payment.provider_payment_id,
                transition_applied = result.transition_applied,
                "webhook processed"
            );
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "transition_applied": result.transition_applied,
                })),
            )
                .into_response()
        }
        Err(e) => {
            // Transient storage failure: non-2xx so the provider redelivers.
            warn!(error = %e, "webhook confirmation failed");
            (StatusCode::SERVICE_UNAVAILABLE, "error").into_response()
        }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

/// Resolve the notifying payment id from the body or the query string.
/// Mercado Pago sends `data.id` in the body for payment topics, and as
/// `data.id` (or `id` on test calls) in the query string.
fn extract_data_id(payload: &JsonValue, query: &HashMap<String, String>) -> String {
    if let Some(id) = payload.get("data").and_then(|d| d.get("id")) {
        match id {
            JsonValue::String(s) if !s.trim().is_empty() => return s.trim().to_string(),
            JsonValue::Number(n) => return n.to_string(),
            _ => {}
        }
    }

    for key in ["data.id", "data[id]", "id"] {
        if let Some(value) = query.get(key) {
            let value = value.trim();
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }

    String::new()
}

/// The delivery's own event id, distinct from the payment id it points at.
fn extract_event_id(payload: &JsonValue) -> Option<String> {
    match payload.get("id") {
        Some(JsonValue::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Client address, honoring the first hop recorded by the load balancer.
fn source_ip(headers: &HeaderMap, peer: SocketAddr) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
        .unwrap_or_else(|| peer.ip())
}

fn correlation(tenant_id: &str, intent_id: &str) -> Option<(String, Uuid)> {
    if tenant_id.trim().is_empty() {
        return None;
    }
    let intent = Uuid::parse_str(intent_id.trim()).ok()?;
    Some((tenant_id.trim().to_string(), intent))
}

async fn resolve_attempt_id(
    state: &WebhookState,
    tenant_id: &str,
    intent_id: Uuid,
    payload_attempt_id: &Option<String>,
) -> Result<Option<Uuid>, crate::database::error::DatabaseError> {
    if let Some(id) = payload_attempt_id
        .as_deref()
        .and_then(|id| Uuid::parse_str(id.trim()).ok())
    {
        return Ok(Some(id));
    }

    let latest = state
        .attempts
        .find_latest_for_intent(tenant_id, intent_id)
        .await?;
    Ok(latest.map(|attempt| attempt.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_id_prefers_body_over_query() {
        let payload = json!({"data": {"id": 12345}});
        let mut query = HashMap::new();
        query.insert("data.id".to_string(), "999".to_string());
        assert_eq!(extract_data_id(&payload, &query), "12345");
    }

    #[test]
    fn data_id_falls_back_to_query_keys() {
        let mut query = HashMap::new();
        query.insert("id".to_string(), "777".to_string());
        assert_eq!(extract_data_id(&JsonValue::Null, &query), "777");

        let mut query = HashMap::new();
        query.insert("data.id".to_string(), "888".to_string());
        assert_eq!(extract_data_id(&JsonValue::Null, &query), "888");
    }

    #[test]
    fn missing_data_id_is_empty() {
        assert_eq!(extract_data_id(&JsonValue::Null, &HashMap::new()), "");
    }

    #[test]
    fn event_id_reads_string_or_number() {
        assert_eq!(
            extract_event_id(&json!({"id": "evt_1"})),
            Some("evt_1".to_string())
        );
        assert_eq!(extract_event_id(&json!({"id": 42})), Some("42".to_string()));
        assert_eq!(extract_event_id(&json!({})), None);
    }

    #[test]
    fn forwarded_for_wins_over_peer_address() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "34.195.82.184, 10.0.0.1".parse().unwrap());
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert_eq!(
            source_ip(&headers, peer),
            "34.195.82.184".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn unparseable_forwarded_for_falls_back_to_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "not-an-ip".parse().unwrap());
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert_eq!(source_ip(&headers, peer), "127.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn correlation_requires_tenant_and_uuid_intent() {
        assert!(correlation("", "5ba7e383-3d4b-4a6f-9301-8a4e1a1e0f5e").is_none());
        assert!(correlation("t1", "not-a-uuid").is_none());
        let (tenant, intent) = correlation("t1", "5ba7e383-3d4b-4a6f-9301-8a4e1a1e0f5e").unwrap();
        assert_eq!(tenant, "t1");
        assert_eq!(intent.to_string(), "5ba7e383-3d4b-4a6f-9301-8a4e1a1e0f5e");
    }
}
