//! # checkout-gateways
//!
//! Concrete payment providers for the settle-cart checkout pipeline.
//!
//! | key      | provider            | settlement path                    |
//! |----------|---------------------|------------------------------------|
//! | `stripe` | `StripeCardMethod`  | Stripe Payment Intents (card)      |
//! | `debit`  | `DebitCardMethod`   | same path, `payment_type=debit`    |
//! | `paypal` | `PayPalMethod`      | PayPal Orders v2 capture           |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use checkout_gateways::{build_factory, GatewayConfig};
//!
//! let factory = build_factory(GatewayConfig::from_env())?;
//! let processor = PaymentProcessor::new(Arc::new(factory), logger);
//! ```

pub mod card;
pub mod config;
pub mod error;
pub mod paypal;
pub mod stripe;

pub use config::{PayPalConfig, StripeConfig};
pub use error::GatewayError;
pub use paypal::PayPalMethod;
pub use stripe::{DebitCardMethod, StripeCardMethod, StripeGateway};

use checkout_core::{CheckoutResult, PaymentMethodFactory};
use std::sync::Arc;
use tracing::{info, warn};

/// Which providers to wire up. A `None` entry leaves that provider out.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub stripe: Option<StripeConfig>,
    pub paypal: Option<PayPalConfig>,
}

impl GatewayConfig {
    /// Load every provider whose credentials are present in the environment
    pub fn from_env() -> Self {
        let stripe = StripeConfig::from_env()
            .map_err(|e| warn!("Card providers disabled: {}", e))
            .ok();
        let paypal = PayPalConfig::from_env()
            .map_err(|e| warn!("PayPal disabled: {}", e))
            .ok();
        Self { stripe, paypal }
    }
}

/// Register the configured providers in a fresh factory
pub fn build_factory(config: GatewayConfig) -> CheckoutResult<PaymentMethodFactory> {
    let mut factory = PaymentMethodFactory::new();

    if let Some(stripe) = config.stripe {
        if stripe.is_live_mode() {
            info!("Stripe running in live mode");
        }
        let gateway = Arc::new(StripeGateway::new(stripe)?);
        factory.register(Arc::new(StripeCardMethod::new(gateway.clone())));
        factory.register(Arc::new(DebitCardMethod::new(gateway)));
    }

    if let Some(paypal) = config.paypal {
        factory.register(Arc::new(PayPalMethod::new(paypal)?));
    }

    info!("Payment providers registered: {:?}", factory.supported());
    Ok(factory)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_factory_registers_configured_providers() {
        let factory = build_factory(GatewayConfig {
            stripe: Some(StripeConfig::new("sk_test_abc")),
            paypal: Some(PayPalConfig::new("id", "secret")),
        })
        .unwrap();

        assert_eq!(factory.supported(), vec!["debit", "paypal", "stripe"]);
        assert!(factory.create("PayPal").is_ok());
        assert!(factory.create("DEBIT").is_ok());
    }

    #[test]
    fn test_build_factory_skips_missing_providers() {
        let factory = build_factory(GatewayConfig {
            stripe: None,
            paypal: Some(PayPalConfig::new("id", "secret")),
        })
        .unwrap();

        assert!(!factory.has_provider("stripe"));
        let err = factory.create("stripe").err().unwrap();
        assert!(err.to_string().contains("paypal"));
    }
}
