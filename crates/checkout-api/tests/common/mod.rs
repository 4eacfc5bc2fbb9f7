#![allow(dead_code)]

use axum_test::TestServer;
use checkout_api::{create_router, AppConfig, AppState};
use checkout_core::{
    Coupon, LogLevel, Logger, MemoryDatastore, Product, RepositoryFactory, SharedCouponService,
};
use checkout_gateways::{build_factory, GatewayConfig, StripeConfig};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use wiremock::MockServer;

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub stripe: MockServer,
}

/// Router over an in-memory store, with the card providers pointed at a
/// mock gateway.
pub async fn spawn() -> TestApp {
    spawn_with(|_| None).await
}

pub async fn spawn_with(
    coupons: impl FnOnce(&RepositoryFactory) -> Option<SharedCouponService>,
) -> TestApp {
    let stripe = MockServer::start().await;
    let gateways = GatewayConfig {
        stripe: Some(StripeConfig::new("sk_test_settle").with_api_base_url(stripe.uri())),
        paypal: None,
    };
    let payment_methods = build_factory(gateways).unwrap();
    let repositories = RepositoryFactory::new(Arc::new(MemoryDatastore::new()));
    let logger = Logger::new(LogLevel::Debug, 512);

    let state = match coupons(&repositories) {
        Some(service) => AppState::with_coupon_service(
            AppConfig::default(),
            repositories,
            payment_methods,
            service,
            logger,
        ),
        None => AppState::new(AppConfig::default(), repositories, payment_methods, logger),
    };
    seed(&state).await;

    let server = TestServer::new(create_router(state.clone())).unwrap();
    TestApp {
        server,
        state,
        stripe,
    }
}

async fn seed(state: &AppState) {
    let products = state.products();
    for product in [
        Product::new("batik-shirt", "Batik Shirt", Decimal::from(87_500), 10)
            .with_weight(Decimal::new(125, 2))
            .with_category("apparel"),
        Product::new("tote-bag", "Canvas Tote Bag", Decimal::from(80_000), 5)
            .with_weight(Decimal::new(5, 1))
            .with_category("accessories"),
        Product::new("songket-scarf", "Songket Scarf", Decimal::from(150_000), 0)
            .with_category("accessories"),
        Product::new("old-hat", "Old Hat", Decimal::from(40_000), 3).inactive(),
    ] {
        products.create(&product).await.unwrap();
    }

    state
        .coupons()
        .create(&Coupon::percentage("HEMAT10", Decimal::from(10)).with_max_discount(Decimal::from(50_000)))
        .await
        .unwrap();
}

pub fn address() -> Value {
    json!({
        "recipient": "Budi Santoso",
        "phone": "+62 811 1111 1111",
        "line1": "Jl. Sudirman 1",
        "city": "Jakarta",
        "province": "DKI Jakarta",
        "postal_code": "10220"
    })
}

pub fn card(number: &str) -> Value {
    json!({
        "card_number": number,
        "expiry": "12/30",
        "cvv": "123",
        "cardholder_name": "Budi Santoso"
    })
}

/// Two shirts: subtotal 175,000 and 2.5 kg
pub fn shirt_checkout(shipping_method: &str, card_number: &str) -> Value {
    json!({
        "user_id": "u1",
        "items": [{ "product_id": "batik-shirt", "quantity": 2 }],
        "shipping_address": address(),
        "shipping_method": shipping_method,
        "payment_method": "stripe",
        "payment_data": card(card_number),
        "customer_email": "budi@example.com",
        "shipping_distance_km": "15"
    })
}

/// Decimal from a JSON string or number
pub fn money(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}
