//! # Stripe Payment Intents
//!
//! Card-network settlement through Stripe's Payment Intents API.
//! One confirmed intent is created per settlement attempt; the debit
//! provider shares the same path and only changes the `payment_type` tag.

use crate::card::{card_brand, card_payload_valid};
use crate::config::StripeConfig;
use crate::error::GatewayError;
use async_trait::async_trait;
use checkout_core::{
    CheckoutError, CheckoutResult, Currency, PaymentAttempt, PaymentData, PaymentMethod,
    PaymentResult, ProviderInfo,
};
use chrono::Utc;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Intent states Stripe considers funds-secured
const SETTLED_STATUSES: [&str; 3] = ["succeeded", "processing", "requires_capture"];

/// Shared HTTP client + config for the card-network providers
pub struct StripeGateway {
    config: StripeConfig,
    client: Client,
}

impl StripeGateway {
    /// Create a new gateway client
    pub fn new(config: StripeConfig) -> CheckoutResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CheckoutError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env() -> CheckoutResult<Self> {
        Self::new(StripeConfig::from_env()?)
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    /// Form parameters for a confirmed payment intent
    fn intent_params(
        attempt: &PaymentAttempt,
        payment_type: &str,
    ) -> Result<Vec<(String, String)>, GatewayError> {
        let amount = attempt
            .currency
            .to_minor_units(attempt.amount)
            .filter(|minor| *minor > 0)
            .ok_or_else(|| GatewayError::Amount(attempt.amount.to_string()))?;

        let mut params: Vec<(String, String)> = vec![
            ("amount".to_string(), amount.to_string()),
            ("currency".to_string(), attempt.currency.as_str().to_string()),
            ("confirm".to_string(), "true".to_string()),
            ("metadata[order_id]".to_string(), attempt.order_ref.clone()),
            ("metadata[payment_type]".to_string(), payment_type.to_string()),
        ];

        let data = &attempt.data;
        if let Some(token) = data
            .token
            .as_deref()
            .or(data.saved_method_id.as_deref())
            .filter(|t| !t.trim().is_empty())
        {
            params.push(("payment_method".to_string(), token.trim().to_string()));
        } else {
            params.push(("payment_method_data[type]".to_string(), "card".to_string()));
            if let Some(number) = data.card_digits() {
                params.push(("payment_method_data[card][number]".to_string(), number));
            }
            if let Some((month, year)) = data.expiry.as_deref().and_then(crate::card::parse_expiry) {
                params.push(("payment_method_data[card][exp_month]".to_string(), month.to_string()));
                params.push(("payment_method_data[card][exp_year]".to_string(), year.to_string()));
            }
            if let Some(cvv) = &data.cvv {
                params.push(("payment_method_data[card][cvc]".to_string(), cvv.trim().to_string()));
            }
            if let Some(name) = &data.cardholder_name {
                params.push((
                    "payment_method_data[billing_details][name]".to_string(),
                    name.clone(),
                ));
            }
        }

        if let Some(email) = attempt.customer_email.as_ref().or(data.email.as_ref()) {
            params.push(("receipt_email".to_string(), email.clone()));
        }

        Ok(params)
    }

    /// Create and confirm one payment intent.
    ///
    /// Card rejections come back as a declined `PaymentResult`; everything
    /// else that is not a settled intent is a `GatewayError`.
    #[instrument(skip(self, attempt), fields(order_ref = %attempt.order_ref))]
    pub async fn create_payment_intent(
        &self,
        attempt: &PaymentAttempt,
        payment_type: &str,
    ) -> Result<PaymentResult, GatewayError> {
        let params = Self::intent_params(attempt, payment_type)?;
        let url = format!("{}/v1/payment_intents", self.config.api_base_url);

        debug!(
            "Creating payment intent: amount={} {}, type={}",
            attempt.amount, attempt.currency, payment_type
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.config.auth_header())
            .header("Stripe-Version", &self.config.api_version)
            .header("Idempotency-Key", &attempt.idempotency_key)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let raw: Value = serde_json::from_str(&body).unwrap_or_else(|_| json!({ "body": body }));

        if status.is_success() {
            let intent: StripePaymentIntent = serde_json::from_value(raw.clone())
                .map_err(|e| GatewayError::Decode(format!("payment intent: {}", e)))?;

            if SETTLED_STATUSES.contains(&intent.status.as_str()) {
                info!("Payment intent settled: id={}, status={}", intent.id, intent.status);
                return Ok(PaymentResult::succeeded(intent.id, raw));
            }

            let reason = intent
                .last_payment_error
                .map(|e| e.message)
                .unwrap_or_else(|| format!("Payment {}", intent.status.replace('_', " ")));
            warn!("Payment intent not settled: id={}, status={}", intent.id, intent.status);
            return Ok(PaymentResult::declined(reason, raw));
        }

        let stripe_error = serde_json::from_value::<StripeErrorResponse>(raw.clone())
            .ok()
            .map(|r| r.error);

        let is_card_error = stripe_error
            .as_ref()
            .is_some_and(|e| e.error_type.as_deref() == Some("card_error"));

        if status == StatusCode::PAYMENT_REQUIRED || is_card_error {
            let reason = stripe_error
                .map(|e| e.message)
                .unwrap_or_else(|| "Your card was declined".to_string());
            warn!("Stripe declined payment: {}", reason);
            return Ok(PaymentResult::declined(reason, raw));
        }

        error!("Stripe API error: status={}, body={}", status, body);

        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(GatewayError::Unauthorized {
                status: status.as_u16(),
            });
        }

        Err(GatewayError::Http {
            status: status.as_u16(),
            message: stripe_error.map(|e| e.message).unwrap_or(body),
        })
    }

    /// Shared settle path for the card-network providers
    async fn settle_card(
        &self,
        provider: &str,
        payment_type: &str,
        attempt: &PaymentAttempt,
    ) -> CheckoutResult<PaymentResult> {
        let data = &attempt.data;
        if !data.has_card_fields() && !data.has_token() {
            return Ok(PaymentResult::declined(
                "Card details or a saved payment method are required",
                Value::Null,
            ));
        }

        self.create_payment_intent(attempt, payment_type)
            .await
            .map_err(|e| e.into_checkout(provider))
    }
}

fn validate_card_payload(data: &PaymentData) -> bool {
    card_payload_valid(data, Utc::now().date_naive())
}

/// Credit card provider, registry key `stripe`
pub struct StripeCardMethod {
    gateway: Arc<StripeGateway>,
}

impl StripeCardMethod {
    pub const KEY: &'static str = "stripe";

    pub fn new(gateway: Arc<StripeGateway>) -> Self {
        Self { gateway }
    }

    /// Brand label for a card payload, used when saving methods
    pub fn brand_of(data: &PaymentData) -> Option<&'static str> {
        data.card_digits().map(|d| card_brand(&d))
    }
}

#[async_trait]
impl PaymentMethod for StripeCardMethod {
    fn name(&self) -> &str {
        Self::KEY
    }

    fn validate(&self, data: &PaymentData) -> bool {
        validate_card_payload(data)
    }

    async fn settle(&self, attempt: &PaymentAttempt) -> CheckoutResult<PaymentResult> {
        self.gateway.settle_card(Self::KEY, "card", attempt).await
    }

    fn provider_info(&self) -> ProviderInfo {
        ProviderInfo {
            key: Self::KEY.to_string(),
            display_name: "Credit Card (Stripe)".to_string(),
            supported_currencies: vec![
                Currency::IDR,
                Currency::USD,
                Currency::EUR,
                Currency::GBP,
                Currency::SGD,
                Currency::JPY,
            ],
            fee_percentage: Decimal::new(29, 1),
        }
    }
}

/// Debit card provider, registry key `debit`
pub struct DebitCardMethod {
    gateway: Arc<StripeGateway>,
}

impl DebitCardMethod {
    pub const KEY: &'static str = "debit";

    pub fn new(gateway: Arc<StripeGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl PaymentMethod for DebitCardMethod {
    fn name(&self) -> &str {
        Self::KEY
    }

    fn validate(&self, data: &PaymentData) -> bool {
        validate_card_payload(data)
    }

    async fn settle(&self, attempt: &PaymentAttempt) -> CheckoutResult<PaymentResult> {
        self.gateway.settle_card(Self::KEY, "debit", attempt).await
    }

    fn provider_info(&self) -> ProviderInfo {
        ProviderInfo {
            key: Self::KEY.to_string(),
            display_name: "Debit Card".to_string(),
            supported_currencies: vec![Currency::IDR, Currency::USD, Currency::SGD],
            fee_percentage: Decimal::new(15, 1),
        }
    }
}

// =============================================================================
// Stripe API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct StripePaymentIntent {
    id: String,
    status: String,
    #[serde(default)]
    last_payment_error: Option<StripeError>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    #[serde(default = "default_error_message")]
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
}

fn default_error_message() -> String {
    "Payment failed".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn gateway(server: &MockServer) -> Arc<StripeGateway> {
        let config = StripeConfig::new("sk_test_abc").with_api_base_url(server.uri());
        Arc::new(StripeGateway::new(config).unwrap())
    }

    fn card_attempt(number: &str) -> PaymentAttempt {
        PaymentAttempt::new("stripe", Decimal::new(22375000, 2), Currency::IDR, "draft-1")
            .with_data(PaymentData::card(number, "12/30", "123"))
            .with_customer_email("buyer@example.com")
    }

    #[test]
    fn test_intent_params_for_card() {
        let params = StripeGateway::intent_params(&card_attempt("4242 4242 4242 4242"), "card").unwrap();
        let get = |k: &str| params.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());

        assert_eq!(get("amount"), Some("22375000"));
        assert_eq!(get("currency"), Some("idr"));
        assert_eq!(get("confirm"), Some("true"));
        assert_eq!(get("metadata[order_id]"), Some("draft-1"));
        assert_eq!(get("payment_method_data[card][number]"), Some("4242424242424242"));
        assert_eq!(get("payment_method_data[card][exp_year]"), Some("2030"));
        assert_eq!(get("receipt_email"), Some("buyer@example.com"));
        assert_eq!(get("payment_method"), None);
    }

    #[test]
    fn test_intent_params_prefer_token() {
        let attempt = PaymentAttempt::new("stripe", Decimal::from(10), Currency::USD, "d")
            .with_data(PaymentData {
                saved_method_id: Some("pm_saved".into()),
                ..Default::default()
            });
        let params = StripeGateway::intent_params(&attempt, "debit").unwrap();
        assert!(params.contains(&("payment_method".to_string(), "pm_saved".to_string())));
        assert!(params.contains(&("amount".to_string(), "1000".to_string())));
        assert!(params.contains(&("metadata[payment_type]".to_string(), "debit".to_string())));
    }

    #[test]
    fn test_zero_amount_rejected() {
        let attempt = PaymentAttempt::new("stripe", Decimal::ZERO, Currency::IDR, "d");
        assert!(matches!(
            StripeGateway::intent_params(&attempt, "card"),
            Err(GatewayError::Amount(_))
        ));
    }

    #[tokio::test]
    async fn test_settle_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents"))
            .and(header("Idempotency-Key", "draft-1"))
            .and(header("Authorization", "Bearer sk_test_abc"))
            .and(body_string_contains("confirm=true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "pi_123",
                "status": "succeeded"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let method = StripeCardMethod::new(gateway(&server).await);
        let result = method.settle(&card_attempt("4242424242424242")).await.unwrap();

        assert!(result.success);
        assert_eq!(result.transaction_id.as_deref(), Some("pi_123"));
    }

    #[tokio::test]
    async fn test_card_error_is_decline() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents"))
            .respond_with(ResponseTemplate::new(402).set_body_json(json!({
                "error": {
                    "type": "card_error",
                    "code": "card_declined",
                    "message": "Your card was declined."
                }
            })))
            .mount(&server)
            .await;

        let method = StripeCardMethod::new(gateway(&server).await);
        let result = method.settle(&card_attempt("4000000000000002")).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Your card was declined."));
        assert!(result.transaction_id.is_none());
    }

    #[tokio::test]
    async fn test_requires_action_is_decline() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "pi_456",
                "status": "requires_action"
            })))
            .mount(&server)
            .await;

        let method = StripeCardMethod::new(gateway(&server).await);
        let result = method.settle(&card_attempt("4242424242424242")).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Payment requires action"));
    }

    #[tokio::test]
    async fn test_server_error_is_infrastructure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let method = StripeCardMethod::new(gateway(&server).await);
        let err = method.settle(&card_attempt("4242424242424242")).await.unwrap_err();
        assert!(matches!(err, CheckoutError::PaymentInfrastructure { ref provider, .. } if provider == "stripe"));
    }

    #[tokio::test]
    async fn test_bad_key_is_infrastructure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "type": "invalid_request_error", "message": "Invalid API Key provided" }
            })))
            .mount(&server)
            .await;

        let method = DebitCardMethod::new(gateway(&server).await);
        let err = method.settle(&card_attempt("4242424242424242")).await.unwrap_err();
        assert!(matches!(err, CheckoutError::PaymentInfrastructure { ref provider, .. } if provider == "debit"));
    }

    #[tokio::test]
    async fn test_missing_payload_declines_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let method = StripeCardMethod::new(gateway(&server).await);
        let attempt = PaymentAttempt::new("stripe", Decimal::from(1000), Currency::IDR, "d");
        let result = method.settle(&attempt).await.unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_debit_tags_payment_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents"))
            .and(body_string_contains("metadata%5Bpayment_type%5D=debit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "pi_debit",
                "status": "processing"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let method = DebitCardMethod::new(gateway(&server).await);
        let result = method.settle(&card_attempt("4242424242424242")).await.unwrap();
        assert!(result.success);
        assert_eq!(method.provider_info().fee_percentage, Decimal::new(15, 1));
    }

    #[test]
    fn test_validate_rules() {
        let method = StripeCardMethod::new(Arc::new(
            StripeGateway::new(StripeConfig::new("sk_test_abc")).unwrap(),
        ));
        assert!(method.validate(&PaymentData::card("4242424242424242", "12/30", "123")));
        assert!(!method.validate(&PaymentData::card("4242424242424241", "12/30", "123")));
        assert!(!method.validate(&PaymentData::card("4242424242424242", "01/20", "123")));
        assert_eq!(
            StripeCardMethod::brand_of(&PaymentData::card("5555555555554444", "12/30", "1")),
            Some("mastercard")
        );
    }
}
