//! # Checkout
//!
//! Turns a validated cart into a paid, persisted order.
//!
//! ```text
//! Validating ─▶ ShippingSelected ─▶ PaymentPending ─▶ PaymentSettled
//!     │                                   │                 │
//!     ▼                                   ▼                 ▼
//! ValidationFailed                  PaymentFailed     OrderPersisted ──▶ PersistenceFailed
//!                                                           │
//!                                               CouponApplied (optional)
//!                                                           │
//!                                                        Complete
//! ```
//!
//! Money movement is irreversible from here, database writes are not, so
//! the steps run strictly in order: nothing is written before the gateway
//! says yes, and nothing after the order write can unwind it.

pub mod collaborators;
pub mod orchestrator;

pub use collaborators::{
    InMemoryReconciliationQueue, LoggingNotifier, Notifier, ReconciliationAlert,
    ReconciliationQueue, SharedNotifier, SharedReconciliationQueue,
};
pub use orchestrator::CheckoutOrchestrator;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::catalog::CartItem;
use crate::money::Currency;
use crate::order::ShippingAddress;
use crate::payment::PaymentData;

/// Pipeline position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutState {
    Validating,
    ShippingSelected,
    PaymentPending,
    PaymentSettled,
    OrderPersisted,
    CouponApplied,
    Complete,
    ValidationFailed,
    PaymentFailed,
    PersistenceFailed,
}

impl CheckoutState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutState::Validating => "validating",
            CheckoutState::ShippingSelected => "shipping_selected",
            CheckoutState::PaymentPending => "payment_pending",
            CheckoutState::PaymentSettled => "payment_settled",
            CheckoutState::OrderPersisted => "order_persisted",
            CheckoutState::CouponApplied => "coupon_applied",
            CheckoutState::Complete => "complete",
            CheckoutState::ValidationFailed => "validation_failed",
            CheckoutState::PaymentFailed => "payment_failed",
            CheckoutState::PersistenceFailed => "persistence_failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            CheckoutState::ValidationFailed
                | CheckoutState::PaymentFailed
                | CheckoutState::PersistenceFailed
        )
    }

    /// Whether the pipeline may move from `self` to `next`
    pub fn can_transition_to(&self, next: CheckoutState) -> bool {
        use CheckoutState::*;
        matches!(
            (self, next),
            (Validating, ShippingSelected | ValidationFailed)
                | (ShippingSelected, PaymentPending)
                | (PaymentPending, PaymentSettled | PaymentFailed)
                | (PaymentSettled, OrderPersisted | PersistenceFailed)
                | (OrderPersisted, CouponApplied | Complete)
                | (CouponApplied, Complete)
        )
    }
}

impl fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checkout invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: String,
    pub items: Vec<CartItem>,
    pub shipping_address: ShippingAddress,
    /// Shipping strategy key; the cheapest available is chosen when absent
    #[serde(default)]
    pub shipping_method: Option<String>,
    /// Payment provider key
    pub payment_method: String,
    #[serde(default)]
    pub payment_data: Option<PaymentData>,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub shipping_distance_km: Option<Decimal>,
    /// Forwarded to the gateway; defaults to the order draft id
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub currency: Option<Currency>,
}

impl CheckoutRequest {
    pub fn new(
        user_id: impl Into<String>,
        items: Vec<CartItem>,
        shipping_address: ShippingAddress,
        payment_method: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            items,
            shipping_address,
            shipping_method: None,
            payment_method: payment_method.into(),
            payment_data: None,
            coupon_code: None,
            customer_email: None,
            shipping_distance_km: None,
            idempotency_key: None,
            notes: None,
            currency: None,
        }
    }

    pub fn with_shipping_method(mut self, method: impl Into<String>) -> Self {
        self.shipping_method = Some(method.into());
        self
    }

    pub fn with_payment_data(mut self, data: PaymentData) -> Self {
        self.payment_data = Some(data);
        self
    }

    pub fn with_coupon(mut self, code: impl Into<String>) -> Self {
        self.coupon_code = Some(code.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.customer_email = Some(email.into());
        self
    }

    pub fn with_distance(mut self, distance_km: Decimal) -> Self {
        self.shipping_distance_km = Some(distance_km);
        self
    }

    /// Customer email, falling back to the wallet payer email
    pub fn contact_email(&self) -> Option<&str> {
        self.customer_email
            .as_deref()
            .or_else(|| self.payment_data.as_ref().and_then(|d| d.email.as_deref()))
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

/// What the caller gets back
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_cost: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Every validation problem found
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub state: CheckoutState,
    /// States visited, in order
    pub trail: Vec<CheckoutState>,
}

impl CheckoutOutcome {
    pub(crate) fn failed(trail: Vec<CheckoutState>, error: String, errors: Vec<String>) -> Self {
        Self {
            success: false,
            order_id: None,
            order_number: None,
            transaction_id: None,
            shipping_method: None,
            shipping_cost: None,
            discount: None,
            tax: None,
            total: None,
            error: Some(error),
            errors,
            state: trail.last().copied().unwrap_or(CheckoutState::Validating),
            trail,
        }
    }
}

/// Basic email shape: `local@domain.tld`, no whitespace
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}
