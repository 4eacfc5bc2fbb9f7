//! Gateway-side failures, folded into `CheckoutError` at the provider boundary.

use checkout_core::CheckoutError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Connection, TLS or timeout failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Credentials rejected
    #[error("authentication rejected (HTTP {status})")]
    Unauthorized { status: u16 },

    /// Any other non-success answer that is not a payment decline
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Body did not match the expected shape
    #[error("unreadable response: {0}")]
    Decode(String),

    /// Amount does not fit the currency's minor units
    #[error("amount {0} cannot be charged")]
    Amount(String),

    #[error("{0}")]
    Config(String),
}

impl GatewayError {
    /// Everything except local misconfiguration is a payment-infrastructure error.
    pub fn into_checkout(self, provider: &str) -> CheckoutError {
        match self {
            GatewayError::Config(message) => CheckoutError::Configuration(message),
            other => CheckoutError::PaymentInfrastructure {
                provider: provider.to_string(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infrastructure_mapping() {
        let err = GatewayError::Http {
            status: 503,
            message: "unavailable".into(),
        }
        .into_checkout("stripe");
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), 502);

        let err = GatewayError::Config("bad client".into()).into_checkout("paypal");
        assert!(matches!(err, CheckoutError::Configuration(_)));
    }
}
