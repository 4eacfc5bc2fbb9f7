//! # Routes
//!
//! Axum router configuration for the checkout API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, patch, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - GET  /health
/// - POST /api/v1/checkout
/// - GET  /api/v1/shipping/options
/// - GET  /api/v1/payments/providers
/// - GET/POST /api/v1/payments/methods, PATCH/DELETE /api/v1/payments/methods/{id}
/// - GET  /api/v1/orders, GET /api/v1/orders/{id}, PATCH /api/v1/orders/{id}/status
/// - GET  /api/v1/products, GET /api/v1/products/{id}
/// - GET  /api/v1/admin/reconciliation, GET /api/v1/admin/logs
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let payment_routes = Router::new()
        .route("/providers", get(handlers::list_providers))
        .route(
            "/methods",
            get(handlers::list_payment_methods).post(handlers::create_payment_method),
        )
        .route(
            "/methods/{method_id}",
            patch(handlers::update_payment_method).delete(handlers::delete_payment_method),
        );

    let admin_routes = Router::new()
        .route("/reconciliation", get(handlers::list_reconciliation))
        .route("/logs", get(handlers::recent_logs));

    let api_routes = Router::new()
        .route("/checkout", post(handlers::checkout))
        .route("/shipping/options", get(handlers::shipping_options))
        .route("/products", get(handlers::list_products))
        .route("/products/{product_id}", get(handlers::get_product))
        .route("/orders", get(handlers::list_orders))
        .route("/orders/{order_id}", get(handlers::get_order))
        .route("/orders/{order_id}/status", patch(handlers::update_order_status))
        .nest("/payments", payment_routes)
        .nest("/admin", admin_routes);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .nest("/api/v1", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
