//! # checkout-api
//!
//! HTTP API layer for settle-cart-rs.
//!
//! This crate provides:
//! - Axum-based HTTP server around the checkout orchestrator
//! - Configuration loading and catalog seeding
//! - Read/admin endpoints for orders, products and saved payment methods
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | POST | `/api/v1/checkout` | Run a checkout |
//! | GET | `/api/v1/shipping/options` | Shipping quotes (`subtotal`, `weight`, `distance`) |
//! | GET | `/api/v1/payments/providers` | Registered payment providers |
//! | GET, POST | `/api/v1/payments/methods` | List / save payment methods |
//! | PATCH, DELETE | `/api/v1/payments/methods/{id}` | Update / remove a saved method |
//! | GET | `/api/v1/orders?user_id=` | A user's orders, paged |
//! | GET | `/api/v1/orders/{id}` | Single order |
//! | PATCH | `/api/v1/orders/{id}/status` | Status transition |
//! | GET | `/api/v1/products` | Product search |
//! | GET | `/api/v1/products/{id}` | Single product |
//! | GET | `/api/v1/admin/reconciliation` | Charges without an order |
//! | GET | `/api/v1/admin/logs` | Recent log entries |

pub mod error;
pub mod handlers;
pub mod routes;
pub mod seed;
pub mod state;

pub use error::{ApiError, ErrorResponse};
pub use routes::create_router;
pub use state::{AppConfig, AppState, LogFormat};
