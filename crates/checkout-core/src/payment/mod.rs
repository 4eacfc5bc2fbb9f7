//! # Payment Settlement
//!
//! Provider-neutral settlement abstraction.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PaymentMethod (trait)                    │
//! │  ├── validate(data)       shape checks, no network          │
//! │  ├── settle(attempt)      one charge against the gateway    │
//! │  └── provider_info()                                        │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!          ┌─────────────────┼─────────────────┐
//!   StripeCardMethod    PayPalMethod     DebitCardMethod
//!      (checkout-gateways, one per provider)
//! ```
//!
//! `settle` reports gateway rejections as `PaymentResult { success: false }`
//! and returns `Err` only when the gateway could not be reached or is
//! misconfigured. The orchestrator branches on exactly that distinction.

pub mod processor;
pub mod registry;
pub mod saved;

pub use processor::PaymentProcessor;
pub use registry::PaymentMethodFactory;
pub use saved::{SavedPaymentMethod, SavedPaymentMethodPatch, SavedPaymentMethodRepository};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::CheckoutResult;
use crate::money::Currency;

/// Caller-supplied payment payload. Which fields matter depends on the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_number: Option<String>,
    /// `MM/YY` or `MM/YYYY`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cardholder_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Wallet approval token or gateway payment-method token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_method_id: Option<String>,
}

fn present(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl PaymentData {
    /// Card payload (number, expiry, CVV)
    pub fn card(
        number: impl Into<String>,
        expiry: impl Into<String>,
        cvv: impl Into<String>,
    ) -> Self {
        Self {
            card_number: Some(number.into()),
            expiry: Some(expiry.into()),
            cvv: Some(cvv.into()),
            ..Default::default()
        }
    }

    /// Wallet payload (payer email and approval token)
    pub fn wallet(email: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            token: Some(token.into()),
            ..Default::default()
        }
    }

    /// True when no field carries a value
    pub fn is_empty(&self) -> bool {
        !self.has_card_fields()
            && !present(&self.cardholder_name)
            && !present(&self.email)
            && !present(&self.token)
            && !present(&self.saved_method_id)
    }

    /// Any of the raw card fields is set
    pub fn has_card_fields(&self) -> bool {
        present(&self.card_number) || present(&self.expiry) || present(&self.cvv)
    }

    pub fn has_token(&self) -> bool {
        present(&self.token) || present(&self.saved_method_id)
    }

    /// Card number with spaces and dashes removed
    pub fn card_digits(&self) -> Option<String> {
        self.card_number
            .as_deref()
            .map(|n| n.chars().filter(|c| !matches!(c, ' ' | '-')).collect())
    }

    /// Last four card digits, for display and logs
    pub fn last4(&self) -> Option<String> {
        let digits: Vec<char> = self.card_digits()?.chars().collect();
        (digits.len() >= 4).then(|| digits[digits.len() - 4..].iter().collect())
    }
}

/// One settlement request. Built per checkout call and never persisted.
#[derive(Debug, Clone)]
pub struct PaymentAttempt {
    /// Registry key of the provider
    pub provider: String,
    /// Amount to charge, major units
    pub amount: Decimal,
    pub currency: Currency,
    /// Order draft id
    pub order_ref: String,
    /// Forwarded to the gateway so a resubmitted request is not charged twice
    pub idempotency_key: String,
    pub data: PaymentData,
    pub customer_email: Option<String>,
}

impl PaymentAttempt {
    pub fn new(
        provider: impl Into<String>,
        amount: Decimal,
        currency: Currency,
        order_ref: impl Into<String>,
    ) -> Self {
        let order_ref = order_ref.into();
        Self {
            provider: provider.into(),
            amount,
            currency,
            idempotency_key: order_ref.clone(),
            order_ref,
            data: PaymentData::default(),
            customer_email: None,
        }
    }

    pub fn with_data(mut self, data: PaymentData) -> Self {
        self.data = data;
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = key.into();
        self
    }

    pub fn with_customer_email(mut self, email: impl Into<String>) -> Self {
        self.customer_email = Some(email.into());
        self
    }
}

/// Normalized settlement outcome.
///
/// `transaction_id` is present iff `success`; `error` is present iff not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Provider response body, as received
    #[serde(default)]
    pub raw: Value,
}

impl PaymentResult {
    pub fn succeeded(transaction_id: impl Into<String>, raw: Value) -> Self {
        Self {
            success: true,
            transaction_id: Some(transaction_id.into()),
            error: None,
            raw,
        }
    }

    pub fn declined(error: impl Into<String>, raw: Value) -> Self {
        Self {
            success: false,
            transaction_id: None,
            error: Some(error.into()),
            raw,
        }
    }
}

/// Display metadata for a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Registry key
    pub key: String,
    pub display_name: String,
    pub supported_currencies: Vec<Currency>,
    /// Processing fee, percent of the charged amount
    pub fee_percentage: Decimal,
}

impl ProviderInfo {
    pub fn supports(&self, currency: Currency) -> bool {
        self.supported_currencies.contains(&currency)
    }
}

/// A payment provider.
#[async_trait]
pub trait PaymentMethod: Send + Sync {
    /// Registry key (e.g. "stripe")
    fn name(&self) -> &str;

    /// Provider-specific shape checks. Never touches the network.
    fn validate(&self, data: &PaymentData) -> bool;

    /// Charge the attempt's amount once.
    ///
    /// Gateway rejections come back as `Ok` with `success == false`.
    async fn settle(&self, attempt: &PaymentAttempt) -> CheckoutResult<PaymentResult>;

    fn provider_info(&self) -> ProviderInfo;
}

/// Shared provider handle (dynamic dispatch)
pub type BoxedPaymentMethod = Arc<dyn PaymentMethod>;
