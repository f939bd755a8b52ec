use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{
    build_external_reference, parse_external_reference, CreatedPreference, PreferenceRequest,
    ProviderName, ProviderPayment,
};
use crate::payments::utils::ProviderHttpClient;
use async_trait::async_trait;
use bigdecimal::{BigDecimal, FromPrimitive};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct MercadoPagoConfig {
    pub access_token: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for MercadoPagoConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            base_url: "https://api.mercadopago.com".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl MercadoPagoConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let access_token =
            std::env::var("MP_ACCESS_TOKEN").map_err(|_| PaymentError::ValidationError {
                message: "MP_ACCESS_TOKEN environment variable is required".to_string(),
                field: Some("MP_ACCESS_TOKEN".to_string()),
            })?;

        Ok(Self {
            access_token,
            base_url: std::env::var("MP_BASE_URL")
                .unwrap_or_else(|_| "https://api.mercadopago.com".to_string()),
            timeout_secs: std::env::var("MP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            max_retries: std::env::var("MP_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
        })
    }
}

pub struct MercadoPagoProvider {
    config: MercadoPagoConfig,
    http: ProviderHttpClient,
}

impl MercadoPagoProvider {
    pub fn new(config: MercadoPagoConfig) -> PaymentResult<Self> {
        let http =
            ProviderHttpClient::new(Duration::from_secs(config.timeout_secs), config.max_retries)?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(MercadoPagoConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }
}

#[derive(Debug, Deserialize)]
struct MpPreferenceResponse {
    id: String,
    init_point: Option<String>,
    sandbox_init_point: Option<String>,
    #[serde(flatten)]
    rest: JsonValue,
}

#[async_trait]
impl PaymentProvider for MercadoPagoProvider {
    async fn create_preference(
        &self,
        request: PreferenceRequest,
    ) -> PaymentResult<CreatedPreference> {
        if request.amount <= BigDecimal::from(0) {
            return Err(PaymentError::ValidationError {
                message: "amount must be greater than zero".to_string(),
                field: Some("amount".to_string()),
            });
        }

        let external_reference =
            build_external_reference(&request.tenant_id, &request.order_id, &request.intent_id);

        // The tenant/order/intent/attempt correlation rides in the metadata
        // next to the external reference; fetch_payment recovers it from
        // whichever survives.
        let mut metadata = request
            .metadata
            .clone()
            .unwrap_or_else(|| json!({}));
        if let Some(map) = metadata.as_object_mut() {
            map.insert("tenant_id".to_string(), json!(request.tenant_id));
            map.insert("order_id".to_string(), json!(request.order_id));
            map.insert("intent_id".to_string(), json!(request.intent_id));
            map.insert("attempt_id".to_string(), json!(request.attempt_id));
        }

        let mut payload = json!({
            "items": request.normalized_items(),
            "external_reference": external_reference,
            "metadata": metadata,
        });
        if let Some(email) = request.payer_email.as_deref().filter(|e| !e.trim().is_empty()) {
            payload["payer"] = json!({ "email": email });
        }

        let raw: MpPreferenceResponse = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/checkout/preferences"),
                &self.config.access_token,
                Some(&payload),
            )
            .await?;

        let init_point = raw
            .init_point
            .clone()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| PaymentError::ProviderError {
                provider: "mercado_pago".to_string(),
                message: "preference response missing init_point".to_string(),
                provider_code: None,
                retryable: false,
            })?;

        info!(preference_id = %raw.id, intent_id = %request.intent_id, "mercado pago preference created");

        Ok(CreatedPreference {
            preference_id: raw.id.clone(),
            init_point,
            sandbox_init_point: raw.sandbox_init_point.clone(),
            raw: json!({
                "id": raw.id,
                "init_point": raw.init_point,
                "sandbox_init_point": raw.sandbox_init_point,
                "rest": raw.rest,
            }),
        })
    }

    async fn fetch_payment(&self, provider_payment_id: &str) -> PaymentResult<ProviderPayment> {
        if provider_payment_id.trim().is_empty() {
            return Err(PaymentError::ValidationError {
                message: "provider payment id is required".to_string(),
                field: Some("provider_payment_id".to_string()),
            });
        }

        let payment: JsonValue = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!("/v1/payments/{}", provider_payment_id)),
                &self.config.access_token,
                None,
            )
            .await?;

        Ok(normalize_payment(provider_payment_id, payment))
    }

    fn name(&self) -> ProviderName {
        ProviderName::MercadoPago
    }
}

/// Normalize a raw Mercado Pago payment payload into the canonical shape.
/// Metadata correlation wins over the external reference when both are
/// present. Mercado Pago rewrites metadata keys to snake_case, but payloads
/// seen in the wild also carry camelCase, so both spellings are read.
pub fn normalize_payment(provider_payment_id: &str, payment: JsonValue) -> ProviderPayment {
    let reference = payment
        .get("external_reference")
        .and_then(|v| v.as_str())
        .map(parse_external_reference)
        .unwrap_or_default();

    let metadata = payment.get("metadata").cloned().unwrap_or(json!({}));
    let meta_str = |keys: &[&str]| -> Option<String> {
        keys.iter()
            .filter_map(|key| metadata.get(*key))
            .filter_map(|v| match v {
                JsonValue::String(s) => Some(s.trim().to_string()),
                JsonValue::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .find(|s| !s.is_empty())
    };

    let provider_status = payment
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_lowercase();

    let amount = payment
        .get("transaction_amount")
        .and_then(|v| v.as_f64())
        .and_then(BigDecimal::from_f64);

    let currency = payment
        .get("currency_id")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    ProviderPayment {
        provider_payment_id: provider_payment_id.to_string(),
        provider_status,
        amount,
        currency,
        tenant_id: meta_str(&["tenant_id", "tenantId"]).unwrap_or(reference.tenant_id),
        order_id: meta_str(&["order_id", "orderId"]).unwrap_or(reference.order_id),
        intent_id: meta_str(&["intent_id", "intentId"]).unwrap_or(reference.intent_id),
        attempt_id: meta_str(&["attempt_id", "attemptId"]),
        raw_payload: payment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_prefers_metadata_correlation() {
        let payment = json!({
            "status": " Approved ",
            "transaction_amount": 500.0,
            "currency_id": "ARS",
            "external_reference": "ref-tenant::ref-order::ref-intent",
            "metadata": {
                "tenant_id": "meta-tenant",
                "order_id": "meta-order",
                "intent_id": "meta-intent",
                "attempt_id": "meta-attempt"
            }
        });

        let normalized = normalize_payment("pay_1", payment);
        assert_eq!(normalized.provider_status, "approved");
        assert_eq!(normalized.tenant_id, "meta-tenant");
        assert_eq!(normalized.order_id, "meta-order");
        assert_eq!(normalized.intent_id, "meta-intent");
        assert_eq!(normalized.attempt_id.as_deref(), Some("meta-attempt"));
        assert_eq!(normalized.amount, BigDecimal::from_f64(500.0));
        assert_eq!(normalized.currency.as_deref(), Some("ARS"));
    }

    #[test]
    fn normalization_falls_back_to_external_reference() {
        let payment = json!({
            "status": "pending",
            "external_reference": "t1::o1::i1",
            "metadata": {}
        });

        let normalized = normalize_payment("pay_2", payment);
        assert_eq!(normalized.tenant_id, "t1");
        assert_eq!(normalized.order_id, "o1");
        assert_eq!(normalized.intent_id, "i1");
        assert!(normalized.attempt_id.is_none());
        assert!(normalized.amount.is_none());
        assert!(normalized.currency.is_none());
    }

    #[test]
    fn normalization_reads_camel_case_metadata() {
        let payment = json!({
            "status": "approved",
            "metadata": {
                "tenantId": "t9",
                "orderId": "o9",
                "intentId": "i9"
            }
        });

        let normalized = normalize_payment("pay_3", payment);
        assert_eq!(normalized.tenant_id, "t9");
        assert_eq!(normalized.order_id, "o9");
        assert_eq!(normalized.intent_id, "i9");
    }

    #[test]
    fn normalization_keeps_raw_payload_verbatim() {
        let payment = json!({
            "status": "rejected",
            "status_detail": "cc_rejected_other_reason",
            "metadata": { "tenant_id": "t1" }
        });

        let normalized = normalize_payment("pay_4", payment.clone());
        assert_eq!(normalized.raw_payload, payment);
        assert_eq!(normalized.provider_status, "rejected");
    }
}
