//! # Checkout Error Types
//!
//! Typed error handling for the settlement pipeline.
//! Every fallible operation returns `Result<T, CheckoutError>`.
//!
//! Business outcomes that the caller is expected to display (validation
//! problems, gateway declines) are usually carried inside a
//! [`CheckoutOutcome`](crate::checkout::CheckoutOutcome) instead. The
//! variants here are what propagates to the caller's error boundary.

use rust_decimal::Decimal;
use thiserror::Error;

/// Core error type for all checkout operations
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Configuration errors (missing keys, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// One or more validation problems, collected together
    #[error("Validation failed: {}", errors.join("; "))]
    Validation { errors: Vec<String> },

    /// Product not found in catalog
    #[error("Product not found: {product_id}")]
    ProductNotFound { product_id: String },

    /// Requested quantity exceeds stock on hand
    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: String,
        requested: u32,
        available: u32,
    },

    /// Shipping method is not registered
    #[error("Unsupported shipping method '{method}' (supported: {})", supported.join(", "))]
    UnsupportedShippingMethod {
        method: String,
        supported: Vec<String>,
    },

    /// Shipping method exists but its minimum subtotal is not met
    #[error("Shipping method '{method}' requires a subtotal of at least {minimum}, got {subtotal}")]
    ShippingNotAvailableForSubtotal {
        method: String,
        subtotal: Decimal,
        minimum: Decimal,
    },

    /// Payment provider key is not registered
    #[error("Unsupported payment method '{requested}' (supported: {})", supported.join(", "))]
    UnsupportedPaymentMethod {
        requested: String,
        supported: Vec<String>,
    },

    /// Payment data failed the provider's shape checks
    #[error("Invalid payment data for provider {provider}")]
    InvalidPaymentData { provider: String },

    /// Gateway reported a business failure
    #[error("Payment declined: {reason}")]
    PaymentDeclined { reason: String },

    /// Gateway unreachable, misconfigured, or answering garbage
    #[error("Payment infrastructure error [{provider}]: {message}")]
    PaymentInfrastructure { provider: String, message: String },

    /// Order write failed after a successful charge
    #[error("Order persistence failed after settlement (transaction {transaction_id}): {message}")]
    PersistenceFailed {
        transaction_id: String,
        message: String,
    },

    /// Coupon rejected before payment
    #[error("Coupon {code} rejected: {reason}")]
    CouponInvalid { code: String, reason: String },

    /// Coupon usage could not be recorded (logged, never fatal)
    #[error("Coupon {code} redemption failed: {message}")]
    CouponRedemptionFailed { code: String, message: String },

    /// Order status change not allowed by the lifecycle
    #[error("Invalid order status transition: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },

    /// Entity missing
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Datastore failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CheckoutError {
    /// Returns true if this error is retryable
    ///
    /// Only infrastructure trouble *before* money moved qualifies.
    /// `PersistenceFailed` is never retryable: a retry could double-charge.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CheckoutError::PaymentInfrastructure { .. } | CheckoutError::Storage(_)
        )
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            CheckoutError::Configuration(_) => 500,
            CheckoutError::InvalidRequest(_) => 400,
            CheckoutError::Validation { .. } => 422,
            CheckoutError::ProductNotFound { .. } => 404,
            CheckoutError::InsufficientStock { .. } => 409,
            CheckoutError::UnsupportedShippingMethod { .. } => 400,
            CheckoutError::ShippingNotAvailableForSubtotal { .. } => 400,
            CheckoutError::UnsupportedPaymentMethod { .. } => 400,
            CheckoutError::InvalidPaymentData { .. } => 400,
            CheckoutError::PaymentDeclined { .. } => 402,
            CheckoutError::PaymentInfrastructure { .. } => 502,
            CheckoutError::PersistenceFailed { .. } => 500,
            CheckoutError::CouponInvalid { .. } => 400,
            CheckoutError::CouponRedemptionFailed { .. } => 500,
            CheckoutError::InvalidStatusTransition { .. } => 409,
            CheckoutError::NotFound { .. } => 404,
            CheckoutError::Storage(_) => 500,
            CheckoutError::Serialization(_) => 500,
            CheckoutError::Internal(_) => 500,
        }
    }

    /// Message safe to show a shopper
    pub fn user_message(&self) -> String {
        match self {
            CheckoutError::PaymentDeclined { .. } => {
                "Your payment could not be processed".to_string()
            }
            CheckoutError::PersistenceFailed { transaction_id, .. } => format!(
                "Something went wrong, please contact support with reference {}",
                transaction_id
            ),
            CheckoutError::PaymentInfrastructure { .. }
            | CheckoutError::Storage(_)
            | CheckoutError::Configuration(_)
            | CheckoutError::Serialization(_)
            | CheckoutError::Internal(_) => {
                "Something went wrong, please try again later".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for CheckoutError {
    fn from(err: serde_json::Error) -> Self {
        CheckoutError::Serialization(err.to_string())
    }
}

/// Result type alias for checkout operations
pub type CheckoutResult<T> = Result<T, CheckoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(CheckoutError::PaymentInfrastructure {
            provider: "stripe".into(),
            message: "timeout".into()
        }
        .is_retryable());
        assert!(!CheckoutError::PersistenceFailed {
            transaction_id: "pi_1".into(),
            message: "disk full".into()
        }
        .is_retryable());
        assert!(!CheckoutError::InvalidRequest("bad data".into()).is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(CheckoutError::InvalidRequest("test".into()).status_code(), 400);
        assert_eq!(
            CheckoutError::PaymentDeclined {
                reason: "insufficient funds".into()
            }
            .status_code(),
            402
        );
        assert_eq!(
            CheckoutError::Validation { errors: vec![] }.status_code(),
            422
        );
    }

    #[test]
    fn test_unsupported_payment_lists_supported_set() {
        let err = CheckoutError::UnsupportedPaymentMethod {
            requested: "bitcoin".into(),
            supported: vec!["debit".into(), "paypal".into(), "stripe".into()],
        };
        assert_eq!(
            err.to_string(),
            "Unsupported payment method 'bitcoin' (supported: debit, paypal, stripe)"
        );
    }

    #[test]
    fn test_user_messages_distinguish_decline_from_persistence() {
        let decline = CheckoutError::PaymentDeclined {
            reason: "card_declined".into(),
        };
        let persistence = CheckoutError::PersistenceFailed {
            transaction_id: "pi_123".into(),
            message: "constraint".into(),
        };

        assert_eq!(decline.user_message(), "Your payment could not be processed");
        assert!(persistence.user_message().contains("pi_123"));
        assert!(persistence.user_message().contains("contact support"));
    }
}
