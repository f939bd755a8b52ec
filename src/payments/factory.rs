use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentProvider;
use crate::payments::providers::MercadoPagoProvider;
use crate::payments::types::ProviderName;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct PaymentFactoryConfig {
    pub default_provider: ProviderName,
    pub enabled_providers: Vec<ProviderName>,
}

impl PaymentFactoryConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let default_provider =
            std::env::var("DEFAULT_PAYMENT_PROVIDER").unwrap_or_else(|_| "mercado_pago".to_string());
        let default_provider = ProviderName::from_str(&default_provider)?;

        let enabled_raw = std::env::var("ENABLED_PAYMENT_PROVIDERS")
            .unwrap_or_else(|_| "mercado_pago".to_string());
        let mut enabled_providers = Vec::new();
        for part in enabled_raw.split(',') {
            let value = part.trim();
            if value.is_empty() {
                continue;
            }
            enabled_providers.push(ProviderName::from_str(value)?);
        }

        if !enabled_providers.contains(&default_provider) {
            return Err(PaymentError::ValidationError {
                message: "default provider must be enabled".to_string(),
                field: Some("DEFAULT_PAYMENT_PROVIDER".to_string()),
            });
        }

        Ok(Self {
            default_provider,
            enabled_providers,
        })
    }
}

/// Constructs provider adapters by name. Only Mercado Pago ships today; the
/// registry keeps the seam so further providers slot in without touching the
/// core service.
pub struct PaymentProviderFactory {
    config: PaymentFactoryConfig,
}

impl PaymentProviderFactory {
    pub fn from_env() -> PaymentResult<Self> {
        let config = PaymentFactoryConfig::from_env()?;
        Ok(Self { config })
    }

    pub fn with_config(config: PaymentFactoryConfig) -> Self {
        Self { config }
    }

    pub fn get_provider(&self, provider: ProviderName) -> PaymentResult<Box<dyn PaymentProvider>> {
        if !self.config.enabled_providers.contains(&provider) {
            return Err(PaymentError::ValidationError {
                message: format!("provider {} is disabled", provider),
                field: Some("provider".to_string()),
            });
        }

        match provider {
            ProviderName::MercadoPago => Ok(Box::new(MercadoPagoProvider::from_env()?)),
        }
    }

    pub fn get_default_provider(&self) -> PaymentResult<Box<dyn PaymentProvider>> {
        self.get_provider(self.config.default_provider.clone())
    }

    pub fn list_available_providers(&self) -> Vec<ProviderName> {
        self.config.enabled_providers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_name_parsing_works() {
        assert!(matches!(
            ProviderName::from_str("mercado_pago"),
            Ok(ProviderName::MercadoPago)
        ));
        assert!(ProviderName::from_str("unknown").is_err());
    }

    #[test]
    fn list_available_providers_returns_enabled() {
        let factory = PaymentProviderFactory::with_config(PaymentFactoryConfig {
            default_provider: ProviderName::MercadoPago,
            enabled_providers: vec![ProviderName::MercadoPago],
        });
        let providers = factory.list_available_providers();
        assert_eq!(providers, vec![ProviderName::MercadoPago]);
    }

    #[test]
    fn disabled_provider_is_rejected() {
        let factory = PaymentProviderFactory::with_config(PaymentFactoryConfig {
            default_provider: ProviderName::MercadoPago,
            enabled_providers: vec![],
        });
        assert!(factory.get_provider(ProviderName::MercadoPago).is_err());
    }
}
