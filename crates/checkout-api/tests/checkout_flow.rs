//! End-to-end checkout over HTTP with a mocked card gateway.

mod common;

use async_trait::async_trait;
use axum::http::StatusCode;
use checkout_core::{
    CheckoutError, CheckoutResult, CouponService, CouponValidation, LogLevel,
    RepositoryCouponService, SharedCouponService,
};
use common::{address, card, money, shirt_checkout, spawn, spawn_with};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

fn intent_succeeded(id: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "id": id, "status": "succeeded" }))
}

#[tokio::test]
async fn express_checkout_settles_once_and_confirms_order() {
    let app = spawn().await;
    // 175,000 + express (25,000 + 2.5 kg * 3,500 + 15 km * 1,000) = 223,750 IDR
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .and(body_string_contains("amount=22375000"))
        .and(body_string_contains("currency=idr"))
        .respond_with(intent_succeeded("pi_express"))
        .expect(1)
        .mount(&app.stripe)
        .await;

    let response = app
        .server
        .post("/api/v1/checkout")
        .json(&shirt_checkout("express", "4242 4242 4242 4242"))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["transaction_id"], json!("pi_express"));
    assert_eq!(body["shipping_method"], json!("express"));
    assert_eq!(money(&body["shipping_cost"]), Decimal::from(48_750));
    assert_eq!(money(&body["total"]), Decimal::from(223_750));
    assert_eq!(body["state"], json!("complete"));

    let order_id = body["order_id"].as_str().unwrap();
    let order = app.state.orders().get(order_id).await.unwrap();
    assert_eq!(order.status, checkout_core::OrderStatus::Confirmed);
    assert_eq!(order.total, Decimal::from(223_750));
    assert_eq!(order.transaction_id.as_deref(), Some("pi_express"));

    // stock is taken off the shelf after the order lands
    let shirt = app.state.products().get("batik-shirt").await.unwrap();
    assert_eq!(shirt.stock, 8);
}

#[tokio::test]
async fn declined_card_creates_no_order() {
    let app = spawn().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .and(body_string_contains("4000000000000002"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({
            "error": {
                "type": "card_error",
                "code": "card_declined",
                "message": "Your card was declined."
            }
        })))
        .expect(1)
        .mount(&app.stripe)
        .await;

    let response = app
        .server
        .post("/api/v1/checkout")
        .json(&shirt_checkout("express", "4000 0000 0000 0002"))
        .await;

    response.assert_status(StatusCode::PAYMENT_REQUIRED);
    let body: Value = response.json();
    assert_eq!(body["error"], json!("Your payment could not be processed"));
    assert_eq!(body["details"], json!("Your card was declined."));

    assert_eq!(app.state.orders().count(&[]).await.unwrap(), 0);
    assert_eq!(app.state.products().get("batik-shirt").await.unwrap().stock, 10);
}

#[tokio::test]
async fn standard_shipping_is_free_above_threshold() {
    let app = spawn().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .and(body_string_contains("amount=16000000"))
        .respond_with(intent_succeeded("pi_standard"))
        .expect(1)
        .mount(&app.stripe)
        .await;

    let request = json!({
        "user_id": "u2",
        "items": [{ "product_id": "tote-bag", "quantity": 2 }],
        "shipping_address": address(),
        "shipping_method": "standard",
        "payment_method": "stripe",
        "payment_data": card("4242424242424242"),
        "customer_email": "sari@example.com",
        "shipping_distance_km": "40"
    });
    let response = app.server.post("/api/v1/checkout").json(&request).await;

    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(money(&body["shipping_cost"]), Decimal::ZERO);
    assert_eq!(money(&body["total"]), Decimal::from(160_000));
}

/// Validates against the real coupon store but cannot record usage
struct ReadOnlyCoupons(RepositoryCouponService);

#[async_trait]
impl CouponService for ReadOnlyCoupons {
    async fn validate(&self, code: &str, subtotal: Decimal) -> CheckoutResult<CouponValidation> {
        self.0.validate(code, subtotal).await
    }

    async fn record_usage(&self, code: &str, _order_id: &str) -> CheckoutResult<()> {
        Err(CheckoutError::CouponRedemptionFailed {
            code: code.to_string(),
            message: "coupon store is read-only".into(),
        })
    }
}

#[tokio::test]
async fn coupon_recording_failure_does_not_fail_checkout() {
    let app = spawn_with(|repositories| {
        let logger = checkout_core::Logger::new(LogLevel::Debug, 16);
        let service = RepositoryCouponService::new(repositories.repository(), logger);
        Some(Arc::new(ReadOnlyCoupons(service)) as SharedCouponService)
    })
    .await;

    // 175,000 - 17,500 discount + 48,750 express
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .and(body_string_contains("amount=20625000"))
        .respond_with(intent_succeeded("pi_coupon"))
        .expect(1)
        .mount(&app.stripe)
        .await;

    let mut request = shirt_checkout("express", "4242424242424242");
    request["coupon_code"] = json!("hemat10");
    let response = app.server.post("/api/v1/checkout").json(&request).await;

    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["success"], json!(true));
    assert_eq!(money(&body["discount"]), Decimal::from(17_500));
    let order_id = body["order_id"].as_str().unwrap();
    assert!(app.state.orders().exists(order_id).await.unwrap());
    assert!(!body["trail"]
        .as_array()
        .unwrap()
        .contains(&json!("coupon_applied")));

    let warnings = app.state.logger.entries_at(LogLevel::Warn);
    assert!(warnings
        .iter()
        .any(|entry| entry.message == "coupon redemption failed"));
}

#[tokio::test]
async fn validation_reports_every_problem() {
    let app = spawn().await;

    let request = json!({
        "user_id": "u1",
        "items": [
            { "product_id": "no-such-thing", "quantity": 1 },
            { "product_id": "songket-scarf", "quantity": 1 }
        ],
        "shipping_address": address(),
        "payment_method": "stripe",
        "payment_data": card("4242424242424242"),
        "customer_email": "not-an-email"
    });
    let response = app.server.post("/api/v1/checkout").json(&request).await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    let errors = body["errors"].as_array().unwrap();
    assert!(errors.len() >= 3, "expected every problem, got {:?}", errors);
    assert!(body["error"].as_str().unwrap().starts_with("Validation failed"));
}

#[tokio::test]
async fn unknown_provider_is_rejected_before_settlement() {
    let app = spawn().await;
    let mut request = shirt_checkout("express", "4242424242424242");
    request["payment_method"] = json!("bitcoin");

    let response = app.server.post("/api/v1/checkout").json(&request).await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.state.orders().count(&[]).await.unwrap(), 0);
}

#[tokio::test]
async fn gateway_outage_is_bad_gateway() {
    let app = spawn().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&app.stripe)
        .await;

    let response = app
        .server
        .post("/api/v1/checkout")
        .json(&shirt_checkout("express", "4242424242424242"))
        .await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert_eq!(body["error"], json!("Something went wrong, please try again later"));
    assert_eq!(app.state.orders().count(&[]).await.unwrap(), 0);
}
