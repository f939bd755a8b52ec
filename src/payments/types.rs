use crate::payments::error::PaymentError;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderName {
    MercadoPago,
}

impl ProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::MercadoPago => "mercado_pago",
        }
    }
}

impl std::fmt::Display for ProviderName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "mercado_pago" | "mercadopago" => Ok(ProviderName::MercadoPago),
            _ => Err(PaymentError::ValidationError {
                message: format!("unsupported provider: {}", value),
                field: Some("provider".to_string()),
            }),
        }
    }
}

/// A line item as supplied by the checkout collaborator. Fields are loose on
/// purpose; [`PreferenceRequest::normalized_items`] fills the gaps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreferenceItemInput {
    pub title: Option<String>,
    pub quantity: Option<i64>,
    pub unit_price: Option<BigDecimal>,
    pub currency_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreferenceItem {
    pub title: String,
    pub quantity: i64,
    pub unit_price: BigDecimal,
    pub currency_id: String,
}

/// Request to create a provider-side checkout preference for an intent.
#[derive(Debug, Clone)]
pub struct PreferenceRequest {
    pub tenant_id: String,
    pub order_id: String,
    pub intent_id: String,
    pub attempt_id: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub description: Option<String>,
    pub payer_email: Option<String>,
    pub items: Vec<PreferenceItemInput>,
    pub metadata: Option<JsonValue>,
}

impl PreferenceRequest {
    /// Normalize client-supplied items: quantity defaults to 1, unit price
    /// falls back to the intent amount, title falls back to the description,
    /// currency falls back to the intent currency. An empty item list yields
    /// a single item covering the whole amount.
    pub fn normalized_items(&self) -> Vec<PreferenceItem> {
        let fallback_title = self
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or("Item");

        let normalize = |item: &PreferenceItemInput| PreferenceItem {
            title: item
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(fallback_title)
                .to_string(),
            quantity: match item.quantity {
                Some(q) if q > 0 => q,
                _ => 1,
            },
            unit_price: match &item.unit_price {
                Some(p) if p > &BigDecimal::from(0) => p.clone(),
                _ => self.amount.clone(),
            },
            currency_id: item
                .currency_id
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or(&self.currency)
                .to_string(),
        };

        if self.items.is_empty() {
            vec![normalize(&PreferenceItemInput::default())]
        } else {
            self.items.iter().map(normalize).collect()
        }
    }
}

/// Provider-side checkout preference created for an attempt.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedPreference {
    pub preference_id: String,
    pub init_point: String,
    pub sandbox_init_point: Option<String>,
    pub raw: JsonValue,
}

/// A provider payment record normalized into the canonical shape the core
/// consumes. The tenant/order/intent correlation is recovered from the
/// external-reference token or the metadata mirror embedded at
/// preference-creation time.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderPayment {
    pub provider_payment_id: String,
    pub provider_status: String,
    pub amount: Option<BigDecimal>,
    pub currency: Option<String>,
    pub tenant_id: String,
    pub order_id: String,
    pub intent_id: String,
    pub attempt_id: Option<String>,
    pub raw_payload: JsonValue,
}

/// Correlation token embedded in the preference's external reference:
/// `tenant::order::intent`, each segment escaped so ids containing the
/// separator cannot corrupt the token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationRef {
    pub tenant_id: String,
    pub order_id: String,
    pub intent_id: String,
}

pub fn build_external_reference(tenant_id: &str, order_id: &str, intent_id: &str) -> String {
    [tenant_id, order_id, intent_id]
        .iter()
        .map(|part| encode_segment(part))
        .collect::<Vec<_>>()
        .join("::")
}

pub fn parse_external_reference(value: &str) -> CorrelationRef {
    let raw = value.trim();
    if raw.is_empty() {
        return CorrelationRef::default();
    }

    let mut parts = raw.split("::");
    CorrelationRef {
        tenant_id: decode_segment(parts.next().unwrap_or("")),
        order_id: decode_segment(parts.next().unwrap_or("")),
        intent_id: decode_segment(parts.next().unwrap_or("")),
    }
}

// Minimal percent-escaping: only '%' and ':' can corrupt the token, so only
// those are escaped. Segments are internal ids, not arbitrary user text.
fn encode_segment(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            _ => out.push(c),
        }
    }
    out
}

fn decode_segment(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' {
            let rest: String = chars.clone().take(2).collect();
            match rest.as_str() {
                "25" => {
                    out.push('%');
                    chars.next();
                    chars.next();
                    continue;
                }
                "3A" | "3a" => {
                    out.push(':');
                    chars.next();
                    chars.next();
                    continue;
                }
                _ => {}
            }
        }
        out.push(c);
    }
    out
}
