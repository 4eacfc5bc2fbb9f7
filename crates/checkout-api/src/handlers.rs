//! # HTTP Handlers
//!
//! Request handlers for the checkout API.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use checkout_core::repository::criteria::DEFAULT_PER_PAGE;
use checkout_core::{
    CheckoutError, CheckoutOutcome, CheckoutRequest, CheckoutState, Criteria, Filter, LogLevel,
    Order, OrderStatus, Page, PaymentData, Product, SavedPaymentMethod, SavedPaymentMethodPatch,
    ShippingQuery, Sort,
};
use checkout_gateways::card::card_brand;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{info, instrument, warn};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Query for `GET /shipping/options`
#[derive(Debug, Deserialize)]
pub struct ShippingOptionsParams {
    pub subtotal: Decimal,
    /// Cart weight in kg
    #[serde(default)]
    pub weight: Option<Decimal>,
    /// Delivery distance in km
    #[serde(default)]
    pub distance: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct UserParams {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderListParams {
    pub user_id: String,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: OrderStatus,
}

/// Query for `GET /products`
#[derive(Debug, Default, Deserialize)]
pub struct ProductSearchParams {
    #[serde(default)]
    pub category: Option<String>,
    /// Case-insensitive substring of the product name
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub min_price: Option<Decimal>,
    #[serde(default)]
    pub max_price: Option<Decimal>,
    #[serde(default)]
    pub in_stock: Option<bool>,
    /// `name`, `price`, `stock` or `created_at`
    #[serde(default)]
    pub sort: Option<String>,
    /// `asc` (default) or `desc`
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
}

/// Body for `POST /payments/methods`
#[derive(Debug, Deserialize)]
pub struct CreatePaymentMethodRequest {
    pub user_id: String,
    pub provider: String,
    /// Only the last four digits and the brand are kept
    #[serde(default)]
    pub card_number: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Deserialize)]
pub struct LogParams {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ShippingOptionsResponse {
    pub subtotal: Decimal,
    pub options: Vec<checkout_core::ShippingQuote>,
    /// Cheapest available option
    pub best: Option<checkout_core::ShippingQuote>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "settle-cart",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Run a checkout.
///
/// 201 with the outcome on success. Validation failures and declines come
/// back from the orchestrator as outcomes and are turned into 422 / 402 here.
#[instrument(skip(state, request), fields(user_id = %request.user_id, items = request.items.len()))]
pub async fn checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> ApiResult<(StatusCode, Json<CheckoutOutcome>)> {
    let outcome = state.orchestrator.checkout(request).await?;

    match outcome.state {
        CheckoutState::ValidationFailed => Err(CheckoutError::Validation {
            errors: outcome.errors,
        }
        .into()),
        CheckoutState::PaymentFailed => Err(CheckoutError::PaymentDeclined {
            reason: outcome
                .error
                .unwrap_or_else(|| "Payment declined".to_string()),
        }
        .into()),
        _ if outcome.success => {
            info!(
                "Checkout complete: order={:?}, total={:?}",
                outcome.order_number, outcome.total
            );
            Ok((StatusCode::CREATED, Json(outcome)))
        }
        other => Err(CheckoutError::Internal(format!(
            "checkout ended in unexpected state {}",
            other.as_str()
        ))
        .into()),
    }
}

/// Quotes from every available strategy plus the cheapest
pub async fn shipping_options(
    State(state): State<AppState>,
    Query(params): Query<ShippingOptionsParams>,
) -> ApiResult<Json<ShippingOptionsResponse>> {
    if params.subtotal.is_sign_negative() {
        return Err(ApiError::bad_request("subtotal must not be negative"));
    }

    let mut query = ShippingQuery::new(params.subtotal);
    if let Some(weight) = params.weight {
        query = query.with_weight(weight);
    }
    if let Some(distance) = params.distance {
        query = query.with_distance(distance);
    }

    Ok(Json(ShippingOptionsResponse {
        subtotal: params.subtotal,
        options: state.shipping.options(&query),
        best: state.shipping.best_strategy(&query),
    }))
}

/// Registered payment providers
pub async fn list_providers(State(state): State<AppState>) -> impl IntoResponse {
    let providers = state.payments.providers();
    Json(serde_json::json!({
        "providers": providers,
        "count": providers.len()
    }))
}

/// A user's active saved payment methods, default first
pub async fn list_payment_methods(
    State(state): State<AppState>,
    Query(params): Query<UserParams>,
) -> ApiResult<Json<Vec<SavedPaymentMethod>>> {
    let methods = state.payment_methods().list_for_user(&params.user_id).await?;
    Ok(Json(methods))
}

#[instrument(skip(state, request), fields(user_id = %request.user_id, provider = %request.provider))]
pub async fn create_payment_method(
    State(state): State<AppState>,
    Json(request): Json<CreatePaymentMethodRequest>,
) -> ApiResult<(StatusCode, Json<SavedPaymentMethod>)> {
    if request.user_id.trim().is_empty() {
        return Err(ApiError::bad_request("user_id is required"));
    }

    let factory = state.payments.factory();
    let provider = factory.create(&request.provider)?;
    let info = provider.provider_info();

    let card = PaymentData {
        card_number: request.card_number.clone(),
        ..Default::default()
    };
    let last4 = card.last4();
    let brand = card.card_digits().map(|digits| card_brand(&digits).to_string());

    let label = match (&request.label, &brand, &last4) {
        (Some(label), _, _) if !label.trim().is_empty() => label.trim().to_string(),
        (_, Some(brand), Some(last4)) => format!("{} ending {}", capitalize(brand), last4),
        _ => info.display_name.clone(),
    };

    let mut method = SavedPaymentMethod::new(request.user_id.trim(), info.key, label);
    method.last4 = last4;
    method.brand = brand;
    method.nickname = request.nickname;
    method.is_default = request.is_default;

    let created = state.payment_methods().add(&method).await?;
    info!("Saved payment method {} for {}", created.id, created.user_id);
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_payment_method(
    State(state): State<AppState>,
    Path(method_id): Path<String>,
    Json(patch): Json<SavedPaymentMethodPatch>,
) -> ApiResult<Json<SavedPaymentMethod>> {
    let updated = state.payment_methods().apply(&method_id, &patch).await?;
    Ok(Json(updated))
}

/// Soft delete
pub async fn delete_payment_method(
    State(state): State<AppState>,
    Path(method_id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.payment_methods().deactivate(&method_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(CheckoutError::NotFound {
            entity: "Payment method",
            id: method_id,
        }
        .into())
    }
}

/// A user's orders, newest first
pub async fn list_orders(
    State(state): State<AppState>,
    Query(params): Query<OrderListParams>,
) -> ApiResult<Json<Page<Order>>> {
    let pagination = checkout_core::Pagination::new(
        params.page.unwrap_or(1),
        params.per_page.unwrap_or(DEFAULT_PER_PAGE),
    );
    let page = state.orders().find_by_user(&params.user_id, pagination).await?;
    Ok(Json(page))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> ApiResult<Json<Order>> {
    Ok(Json(state.orders().get(&order_id).await?))
}

#[instrument(skip_all, fields(order_id = %order_id, status = %request.status))]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Json(request): Json<StatusUpdateRequest>,
) -> ApiResult<Json<Order>> {
    let order = state.orders().update_status(&order_id, request.status).await?;
    info!("Order {} is now {}", order.order_number, order.status);
    Ok(Json(order))
}

/// Criteria search over active products
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ProductSearchParams>,
) -> ApiResult<Json<Page<Product>>> {
    let criteria = product_criteria(&params)?;
    Ok(Json(state.products().find_by_criteria(&criteria).await?))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> ApiResult<Json<Product>> {
    match state.products().find_by_id(&product_id).await? {
        Some(product) if product.active => Ok(Json(product)),
        _ => Err(CheckoutError::ProductNotFound { product_id }.into()),
    }
}

/// Charges waiting for manual reconciliation
pub async fn list_reconciliation(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let alerts = state.orchestrator.reconciliation_queue().pending().await?;
    if !alerts.is_empty() {
        warn!("{} charge(s) awaiting reconciliation", alerts.len());
    }
    Ok(Json(serde_json::json!({
        "alerts": alerts,
        "count": alerts.len()
    })))
}

/// Tail of the in-process log buffer
pub async fn recent_logs(
    State(state): State<AppState>,
    Query(params): Query<LogParams>,
) -> ApiResult<impl IntoResponse> {
    let limit = params.limit.unwrap_or(100);
    let entries = match params.level.as_deref() {
        Some(level) => {
            let level = LogLevel::from_str(level).map_err(ApiError::bad_request)?;
            let mut entries = state.logger.entries_at(level);
            let skip = entries.len().saturating_sub(limit);
            entries.drain(..skip);
            entries
        }
        None => state.logger.recent(limit),
    };

    Ok(Json(serde_json::json!({
        "entries": entries,
        "count": entries.len(),
        "buffered": state.logger.len()
    })))
}

// =============================================================================
// Helpers
// =============================================================================

fn product_criteria(params: &ProductSearchParams) -> ApiResult<Criteria> {
    let mut criteria = Criteria::new().filter(Filter::eq("active", true));

    if let Some(category) = params.category.as_deref().filter(|c| !c.is_empty()) {
        criteria = criteria.filter(Filter::eq("category", category));
    }
    if let Some(search) = params.search.as_deref().filter(|s| !s.trim().is_empty()) {
        criteria = criteria.filter(Filter::contains("name", search.trim()));
    }
    if let Some(min) = params.min_price {
        criteria = criteria.filter(Filter::gte("price", price_value(min)?));
    }
    if let Some(max) = params.max_price {
        criteria = criteria.filter(Filter::lte("price", price_value(max)?));
    }
    if params.in_stock == Some(true) {
        criteria = criteria.filter(Filter::gte("stock", 1));
    }

    if let Some(field) = params.sort.as_deref() {
        let sort = match field {
            "name" | "created_at" => Sort::asc(field),
            "price" | "stock" => Sort::asc(field).numeric(),
            other => return Err(ApiError::bad_request(format!("cannot sort by {:?}", other))),
        };
        let sort = match params.order.as_deref() {
            None | Some("asc") => sort,
            Some("desc") => Sort {
                direction: checkout_core::SortDirection::Desc,
                ..sort
            },
            Some(other) => {
                return Err(ApiError::bad_request(format!("unknown sort order {:?}", other)))
            }
        };
        criteria = criteria.sort(sort);
    }

    Ok(criteria.page(
        params.page.unwrap_or(1),
        params.per_page.unwrap_or(DEFAULT_PER_PAGE),
    ))
}

/// Prices are stored as decimal strings; numeric filters compare as floats.
fn price_value(price: Decimal) -> ApiResult<f64> {
    price
        .to_f64()
        .ok_or_else(|| ApiError::bad_request(format!("price out of range: {}", price)))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkout_core::FilterOp;

    #[test]
    fn test_product_criteria_defaults_to_active() {
        let criteria = product_criteria(&ProductSearchParams::default()).unwrap();
        assert_eq!(criteria.filters, vec![Filter::eq("active", true)]);
        assert!(criteria.sort.is_none());
        assert_eq!(criteria.pagination.per_page(), DEFAULT_PER_PAGE);
    }

    #[test]
    fn test_product_criteria_price_range_and_sort() {
        let params = ProductSearchParams {
            min_price: Some(Decimal::from(50_000)),
            max_price: Some(Decimal::from(100_000)),
            sort: Some("price".into()),
            order: Some("desc".into()),
            ..Default::default()
        };
        let criteria = product_criteria(&params).unwrap();

        let ops: Vec<_> = criteria.filters.iter().map(|f| f.op).collect();
        assert_eq!(ops, vec![FilterOp::Eq, FilterOp::Gte, FilterOp::Lte]);
        let sort = criteria.sort.unwrap();
        assert!(sort.numeric);
        assert_eq!(sort.direction, checkout_core::SortDirection::Desc);
    }

    #[test]
    fn test_product_criteria_rejects_unknown_sort() {
        let params = ProductSearchParams {
            sort: Some("secret".into()),
            ..Default::default()
        };
        assert!(product_criteria(&params).is_err());
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("visa"), "Visa");
        assert_eq!(capitalize(""), "");
    }
}
