use crate::payments::error::PaymentResult;
use crate::payments::types::{CreatedPreference, PreferenceRequest, ProviderName, ProviderPayment};
use async_trait::async_trait;

/// Capability set every payment provider adapter implements. The core
/// service depends only on this trait, so additional providers can be added
/// without touching the confirmation path.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a provider-side checkout preference for an intent. The
    /// tenant/order/intent/attempt correlation is embedded in the preference
    /// so it can be recovered from later payment fetches.
    async fn create_preference(&self, request: PreferenceRequest)
        -> PaymentResult<CreatedPreference>;

    /// Fetch the provider's payment record by the provider's own payment id,
    /// normalized into the canonical shape.
    async fn fetch_payment(&self, provider_payment_id: &str) -> PaymentResult<ProviderPayment>;

    fn name(&self) -> ProviderName;
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use serde_json::json;

    struct MockProvider;

    #[async_trait]
    impl PaymentProvider for MockProvider {
        async fn create_preference(
            &self,
            request: PreferenceRequest,
        ) -> PaymentResult<CreatedPreference> {
            Ok(CreatedPreference {
                preference_id: format!("pref_{}", request.intent_id),
                init_point: "https://example.com/checkout".to_string(),
                sandbox_init_point: None,
                raw: json!({}),
            })
        }

        async fn fetch_payment(
            &self,
            provider_payment_id: &str,
        ) -> PaymentResult<ProviderPayment> {
            Ok(ProviderPayment {
                provider_payment_id: provider_payment_id.to_string(),
                provider_status: "approved".to_string(),
                amount: Some(BigDecimal::from(500)),
                currency: Some("ARS".to_string()),
                tenant_id: "t1".to_string(),
                order_id: "o1".to_string(),
                intent_id: "i1".to_string(),
                attempt_id: Some("a1".to_string()),
                raw_payload: json!({"status": "approved"}),
            })
        }

        fn name(&self) -> ProviderName {
            ProviderName::MercadoPago
        }
    }

    #[tokio::test]
    async fn trait_can_be_implemented_by_mock_provider() {
        let provider: Box<dyn PaymentProvider> = Box::new(MockProvider);

        let preference = provider
            .create_preference(PreferenceRequest {
                tenant_id: "t1".to_string(),
                order_id: "o1".to_string(),
                intent_id: "i1".to_string(),
                attempt_id: "a1".to_string(),
                amount: BigDecimal::from(500),
                currency: "ARS".to_string(),
                description: None,
                payer_email: None,
                items: vec![],
                metadata: None,
            })
            .await
            .expect("preference creation should succeed");
        assert_eq!(preference.preference_id, "pref_i1");

        let payment = provider
            .fetch_payment("pay_1")
            .await
            .expect("payment fetch should succeed");
        assert_eq!(payment.provider_status, "approved");
        assert_eq!(payment.tenant_id, "t1");
    }
}
