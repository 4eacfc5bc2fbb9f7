//! # Gateway Configuration
//!
//! Configuration management for the payment gateways.
//! All secrets are loaded from environment variables.

use checkout_core::CheckoutError;
use std::env;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Stripe API configuration
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Secret API key (sk_test_... or sk_live_...)
    pub secret_key: String,

    /// API base URL (for testing/mocking)
    pub api_base_url: String,

    /// API version
    pub api_version: String,

    /// Per-request timeout
    pub timeout: Duration,
}

impl StripeConfig {
    /// Load configuration from environment variables.
    ///
    /// Required: `STRIPE_SECRET_KEY`. Optional: `STRIPE_API_BASE_URL`.
    pub fn from_env() -> Result<Self, CheckoutError> {
        dotenvy::dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CheckoutError> {
        let secret_key = lookup("STRIPE_SECRET_KEY")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| CheckoutError::Configuration("STRIPE_SECRET_KEY not set".to_string()))?;

        // Validate key format
        if !secret_key.starts_with("sk_test_") && !secret_key.starts_with("sk_live_") {
            return Err(CheckoutError::Configuration(
                "STRIPE_SECRET_KEY must start with sk_test_ or sk_live_".to_string(),
            ));
        }

        let mut config = Self::new(secret_key);
        if let Some(url) = lookup("STRIPE_API_BASE_URL").filter(|v| !v.trim().is_empty()) {
            config = config.with_api_base_url(url);
        }
        Ok(config)
    }

    /// Create config with explicit values (for testing)
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            api_base_url: "https://api.stripe.com".to_string(),
            api_version: "2024-12-18.acacia".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Check if using test keys
    pub fn is_test_mode(&self) -> bool {
        self.secret_key.starts_with("sk_test_")
    }

    /// Check if using live keys
    pub fn is_live_mode(&self) -> bool {
        self.secret_key.starts_with("sk_live_")
    }

    /// Get authorization header value
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.secret_key)
    }

    /// Builder: set custom API base URL (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// PayPal REST configuration
#[derive(Debug, Clone)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Sandbox by default; live is `https://api-m.paypal.com`
    pub api_base_url: String,
    pub timeout: Duration,
}

impl PayPalConfig {
    /// Load configuration from environment variables.
    ///
    /// Required: `PAYPAL_CLIENT_ID`, `PAYPAL_CLIENT_SECRET`.
    /// Optional: `PAYPAL_API_BASE_URL`.
    pub fn from_env() -> Result<Self, CheckoutError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CheckoutError> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| CheckoutError::Configuration(format!("{} not set", key)))
        };

        let mut config = Self::new(required("PAYPAL_CLIENT_ID")?, required("PAYPAL_CLIENT_SECRET")?);
        if let Some(url) = lookup("PAYPAL_API_BASE_URL").filter(|v| !v.trim().is_empty()) {
            config = config.with_api_base_url(url);
        }
        Ok(config)
    }

    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            api_base_url: "https://api-m.sandbox.paypal.com".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn is_sandbox(&self) -> bool {
        self.api_base_url.contains("sandbox")
    }

    /// Builder: set custom API base URL (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}
