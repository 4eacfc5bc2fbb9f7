//! # PayPal Wallet Capture
//!
//! Wallet-redirect settlement. The buyer approves a PayPal order on the
//! PayPal side; the approval token is the order id, which we capture here.

use crate::config::PayPalConfig;
use crate::error::GatewayError;
use async_trait::async_trait;
use checkout_core::{
    is_valid_email, CheckoutError, CheckoutResult, Currency, PaymentAttempt, PaymentData,
    PaymentMethod, PaymentResult, ProviderInfo,
};
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Refresh the OAuth token this long before PayPal expires it
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Wallet provider, registry key `paypal`
pub struct PayPalMethod {
    config: PayPalConfig,
    client: Client,
    token: Mutex<Option<AccessToken>>,
}

impl PayPalMethod {
    pub const KEY: &'static str = "paypal";

    pub fn new(config: PayPalConfig) -> CheckoutResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CheckoutError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            token: Mutex::new(None),
        })
    }

    /// Create from environment variables
    pub fn from_env() -> CheckoutResult<Self> {
        Self::new(PayPalConfig::from_env()?)
    }

    /// Client-credentials access token, cached until shortly before expiry
    async fn access_token(&self) -> Result<String, GatewayError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.expires_at > Utc::now()) {
            return Ok(token.value.clone());
        }

        let url = format!("{}/v1/oauth2/token", self.config.api_base_url);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            error!("PayPal token request failed: status={}", status);
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Unauthorized {
                    status: status.as_u16(),
                },
                _ => GatewayError::Http {
                    status: status.as_u16(),
                    message: response.text().await.unwrap_or_default(),
                },
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(format!("token: {}", e)))?;

        debug!("Obtained PayPal access token, expires_in={}s", body.expires_in);

        let lifetime = (body.expires_in - TOKEN_EXPIRY_MARGIN_SECS).max(0);
        let token = AccessToken {
            value: body.access_token,
            expires_at: Utc::now() + Duration::seconds(lifetime),
        };
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    /// Capture an approved PayPal order
    #[instrument(skip(self, attempt), fields(order_ref = %attempt.order_ref))]
    pub async fn capture_order(
        &self,
        order_token: &str,
        attempt: &PaymentAttempt,
    ) -> Result<PaymentResult, GatewayError> {
        let access_token = self.access_token().await?;
        let url = format!(
            "{}/v2/checkout/orders/{}/capture",
            self.config.api_base_url, order_token
        );

        debug!(
            "Capturing PayPal order {}: amount={} {}",
            order_token, attempt.amount, attempt.currency
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&access_token)
            .header("PayPal-Request-Id", &attempt.idempotency_key)
            .json(&json!({}))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let raw: Value = serde_json::from_str(&body).unwrap_or_else(|_| json!({ "body": body }));

        if status.is_success() {
            let order: PayPalOrder = serde_json::from_value(raw.clone())
                .map_err(|e| GatewayError::Decode(format!("capture: {}", e)))?;

            if order.status == "COMPLETED" {
                let transaction_id = order.capture_id().unwrap_or_else(|| order.id.clone());
                info!("PayPal order captured: order={}, capture={}", order.id, transaction_id);
                return Ok(PaymentResult::succeeded(transaction_id, raw));
            }

            warn!("PayPal order not completed: order={}, status={}", order.id, order.status);
            return Ok(PaymentResult::declined(
                format!("PayPal order {}", order.status.to_lowercase().replace('_', " ")),
                raw,
            ));
        }

        let issue = serde_json::from_value::<PayPalErrorResponse>(raw.clone()).ok();

        match status {
            StatusCode::UNPROCESSABLE_ENTITY | StatusCode::NOT_FOUND => {
                let reason = issue
                    .map(|e| e.reason())
                    .unwrap_or_else(|| "PayPal could not capture the order".to_string());
                warn!("PayPal declined capture: {}", reason);
                Ok(PaymentResult::declined(reason, raw))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                // Force a fresh token on the next call
                *self.token.lock().await = None;
                error!("PayPal rejected credentials: status={}", status);
                Err(GatewayError::Unauthorized {
                    status: status.as_u16(),
                })
            }
            _ => {
                error!("PayPal API error: status={}, body={}", status, body);
                Err(GatewayError::Http {
                    status: status.as_u16(),
                    message: issue.map(|e| e.reason()).unwrap_or(body),
                })
            }
        }
    }
}

#[async_trait]
impl PaymentMethod for PayPalMethod {
    fn name(&self) -> &str {
        Self::KEY
    }

    fn validate(&self, data: &PaymentData) -> bool {
        data.email.as_deref().is_some_and(is_valid_email)
            && data.token.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    async fn settle(&self, attempt: &PaymentAttempt) -> CheckoutResult<PaymentResult> {
        let Some(token) = attempt
            .data
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        else {
            return Ok(PaymentResult::declined(
                "PayPal approval token is required",
                Value::Null,
            ));
        };

        self.capture_order(token, attempt)
            .await
            .map_err(|e| e.into_checkout(Self::KEY))
    }

    fn provider_info(&self) -> ProviderInfo {
        ProviderInfo {
            key: Self::KEY.to_string(),
            display_name: "PayPal".to_string(),
            supported_currencies: vec![
                Currency::USD,
                Currency::EUR,
                Currency::GBP,
                Currency::SGD,
                Currency::JPY,
            ],
            fee_percentage: Decimal::new(34, 1),
        }
    }
}

// =============================================================================
// PayPal API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    300
}

#[derive(Debug, Deserialize)]
struct PayPalOrder {
    id: String,
    status: String,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
}

impl PayPalOrder {
    fn capture_id(&self) -> Option<String> {
        self.purchase_units
            .iter()
            .filter_map(|unit| unit.payments.as_ref())
            .flat_map(|payments| payments.captures.iter())
            .map(|capture| capture.id.clone())
            .next()
    }
}

#[derive(Debug, Deserialize)]
struct PurchaseUnit {
    #[serde(default)]
    payments: Option<Payments>,
}

#[derive(Debug, Deserialize)]
struct Payments {
    #[serde(default)]
    captures: Vec<Capture>,
}

#[derive(Debug, Deserialize)]
struct Capture {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PayPalErrorResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Vec<PayPalIssue>,
}

#[derive(Debug, Deserialize)]
struct PayPalIssue {
    issue: String,
    #[serde(default)]
    description: Option<String>,
}

impl PayPalErrorResponse {
    /// Most specific human-readable reason available
    fn reason(&self) -> String {
        if let Some(detail) = self.details.first() {
            return match &detail.description {
                Some(description) => format!("{}: {}", detail.issue, description),
                None => detail.issue.clone(),
            };
        }
        self.message
            .clone()
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| "PayPal error".to_string())
    }
}
