//! The settlement pipeline.

use rust_decimal::Decimal;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::collaborators::{
    InMemoryReconciliationQueue, LoggingNotifier, ReconciliationAlert, SharedNotifier,
    SharedReconciliationQueue,
};
use super::{is_valid_email, CheckoutOutcome, CheckoutRequest, CheckoutState};
use crate::catalog::{CartItem, Product, ProductRepository};
use crate::coupon::{CouponValidation, SharedCouponService};
use crate::error::{CheckoutError, CheckoutResult};
use crate::logger::Logger;
use crate::money::{non_negative, Currency};
use crate::order::{Order, OrderItem, OrderRepository, OrderStatus};
use crate::payment::{PaymentAttempt, PaymentProcessor, PaymentResult};
use crate::repository::row::timestamp_now;
use crate::repository::RepositoryFactory;
use crate::shipping::{ShippingCalculator, ShippingQuery, ShippingQuote};

/// Records visited states and logs each transition.
struct Trail<'a> {
    states: Vec<CheckoutState>,
    draft_id: &'a str,
    logger: &'a Logger,
}

impl<'a> Trail<'a> {
    fn start(draft_id: &'a str, logger: &'a Logger) -> Self {
        let mut trail = Self {
            states: Vec::new(),
            draft_id,
            logger,
        };
        trail.enter(CheckoutState::Validating);
        trail
    }

    fn enter(&mut self, state: CheckoutState) {
        let from = self.states.last().copied();
        debug_assert!(from.map_or(true, |f| f.can_transition_to(state)));
        self.logger.debug_with(
            "checkout state",
            json!({
                "draft_id": self.draft_id,
                "from": from.map(|s| s.as_str()),
                "to": state.as_str(),
            }),
        );
        self.states.push(state);
    }

    fn into_states(self) -> Vec<CheckoutState> {
        self.states
    }
}

/// The cart after every item resolved against the catalog
struct PricedCart {
    items: Vec<OrderItem>,
    subtotal: Decimal,
    weight_kg: Decimal,
}

/// Everything decided before money moves
struct Quote {
    cart: PricedCart,
    shipping: ShippingQuote,
    coupon: Option<CouponValidation>,
    discount: Decimal,
    tax: Decimal,
    total: Decimal,
}

/// Sequences validation, shipping, payment, persistence and coupon
/// redemption for one checkout call.
///
/// Each call settles at most once and never retries. Validation problems
/// and gateway declines come back as an unsuccessful [`CheckoutOutcome`];
/// infrastructure failures and `PersistenceFailed` are returned as `Err`.
pub struct CheckoutOrchestrator {
    shipping: Arc<ShippingCalculator>,
    payments: Arc<PaymentProcessor>,
    orders: Arc<OrderRepository>,
    products: Arc<ProductRepository>,
    coupons: SharedCouponService,
    notifier: SharedNotifier,
    reconciliation: SharedReconciliationQueue,
    tax_rate: Decimal,
    default_currency: Currency,
    logger: Logger,
}

impl CheckoutOrchestrator {
    pub fn new(
        shipping: Arc<ShippingCalculator>,
        payments: Arc<PaymentProcessor>,
        repositories: &RepositoryFactory,
        coupons: SharedCouponService,
        logger: Logger,
    ) -> Self {
        Self {
            shipping,
            payments,
            orders: repositories.repository::<Order>(),
            products: repositories.repository::<Product>(),
            coupons,
            notifier: Arc::new(LoggingNotifier::new(logger.clone())),
            reconciliation: Arc::new(InMemoryReconciliationQueue::new()),
            tax_rate: Decimal::ZERO,
            default_currency: Currency::default(),
            logger: logger.for_component("checkout"),
        }
    }

    pub fn with_notifier(mut self, notifier: SharedNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_reconciliation_queue(mut self, queue: SharedReconciliationQueue) -> Self {
        self.reconciliation = queue;
        self
    }

    /// Tax applied to `subtotal - discount`, e.g. `0.11`
    pub fn with_tax_rate(mut self, tax_rate: Decimal) -> Self {
        self.tax_rate = non_negative(tax_rate);
        self
    }

    pub fn with_default_currency(mut self, currency: Currency) -> Self {
        self.default_currency = currency;
        self
    }

    pub fn reconciliation_queue(&self) -> &SharedReconciliationQueue {
        &self.reconciliation
    }

    /// Run the pipeline for one request.
    pub async fn checkout(&self, request: CheckoutRequest) -> CheckoutResult<CheckoutOutcome> {
        let draft_id = Order::draft_id();
        let mut trail = Trail::start(&draft_id, &self.logger);

        self.logger.info_with(
            "checkout started",
            json!({
                "draft_id": draft_id,
                "user_id": request.user_id,
                "items": request.items.len(),
                "payment_method": request.payment_method,
            }),
        );

        let currency = request.currency.unwrap_or(self.default_currency);
        let quote = match self.validate(&request, currency).await? {
            Ok(quote) => quote,
            Err(errors) => {
                trail.enter(CheckoutState::ValidationFailed);
                self.logger.warn_with(
                    "checkout validation failed",
                    json!({ "draft_id": draft_id, "errors": errors }),
                );
                let summary = format!("Validation failed: {}", errors.join("; "));
                return Ok(CheckoutOutcome::failed(trail.into_states(), summary, errors));
            }
        };
        trail.enter(CheckoutState::ShippingSelected);

        let mut attempt =
            PaymentAttempt::new(&request.payment_method, quote.total, currency, &draft_id)
                .with_data(request.payment_data.clone().unwrap_or_default());
        if let Some(key) = request.idempotency_key.as_deref().filter(|k| !k.trim().is_empty()) {
            attempt = attempt.with_idempotency_key(key);
        }
        if let Some(email) = request.contact_email() {
            attempt = attempt.with_customer_email(email);
        }

        trail.enter(CheckoutState::PaymentPending);
        let result = match self.payments.process(&attempt).await {
            Ok(result) => result,
            Err(e) => {
                trail.enter(CheckoutState::PaymentFailed);
                return Err(e);
            }
        };

        if !result.success {
            trail.enter(CheckoutState::PaymentFailed);
            let reason = result
                .error
                .clone()
                .unwrap_or_else(|| "payment was not approved".to_string());
            return Ok(CheckoutOutcome::failed(trail.into_states(), reason, Vec::new()));
        }
        trail.enter(CheckoutState::PaymentSettled);

        let order = self.build_order(&draft_id, &request, &quote, currency, &result);
        let transaction_id = order.transaction_id.clone().unwrap_or_default();

        let order = match self.orders.create(&order).await {
            Ok(order) => order,
            Err(e) => {
                trail.enter(CheckoutState::PersistenceFailed);
                self.escalate(&attempt, &request, &transaction_id, &e).await;
                return Err(CheckoutError::PersistenceFailed {
                    transaction_id,
                    message: e.to_string(),
                });
            }
        };
        trail.enter(CheckoutState::OrderPersisted);

        self.decrement_stock(&order).await;

        if let Some(coupon) = &quote.coupon {
            match self.coupons.record_usage(&coupon.code, &order.id).await {
                Ok(()) => trail.enter(CheckoutState::CouponApplied),
                Err(e) => self.logger.warn_with(
                    "coupon redemption failed",
                    json!({
                        "order_id": order.id,
                        "code": coupon.code,
                        "error": e.to_string(),
                    }),
                ),
            }
        }

        self.notify(order.clone());

        trail.enter(CheckoutState::Complete);
        self.logger.info_with(
            "checkout complete",
            json!({
                "order_id": order.id,
                "order_number": order.order_number,
                "transaction_id": transaction_id,
                "total": order.total.to_string(),
            }),
        );

        let trail = trail.into_states();
        Ok(CheckoutOutcome {
            success: true,
            order_id: Some(order.id),
            order_number: Some(order.order_number),
            transaction_id: Some(transaction_id),
            shipping_method: Some(order.shipping_method),
            shipping_cost: Some(order.shipping_cost),
            discount: Some(order.discount),
            tax: Some(order.tax),
            total: Some(order.total),
            error: None,
            errors: Vec::new(),
            state: CheckoutState::Complete,
            trail,
        })
    }

    /// Collect every problem with the request. The outer `Result` carries
    /// datastore and collaborator failures; the inner one the verdict.
    ///
    /// Shipping, discount and tax are rounded to `currency`, so the quoted
    /// total is exactly what the gateway is asked to charge.
    async fn validate(
        &self,
        request: &CheckoutRequest,
        currency: Currency,
    ) -> CheckoutResult<Result<Quote, Vec<String>>> {
        let mut errors = Vec::new();

        let cart = self.price_cart(&request.items, &mut errors).await?;

        let missing = request.shipping_address.missing_fields();
        if !missing.is_empty() {
            errors.push(format!(
                "shipping address is incomplete: missing {}",
                missing.join(", ")
            ));
        }

        match request.contact_email() {
            Some(email) if is_valid_email(email) => {}
            Some(email) => errors.push(format!("email address '{}' is not valid", email)),
            None => errors.push("email address is required".to_string()),
        }

        let payment_data = request.payment_data.clone().unwrap_or_default();
        match self.payments.validate(&request.payment_method, &payment_data) {
            Err(e) => errors.push(e.to_string()),
            // no data at all is left to the provider, which declines without a network call
            Ok(false) if !payment_data.is_empty() => {
                errors.push(format!(
                    "payment details are not valid for {}",
                    request.payment_method
                ));
            }
            Ok(_) => {}
        }

        let coupon = match request.coupon_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => {
                let validation = self.coupons.validate(code, cart.subtotal).await?;
                if validation.valid {
                    Some(validation)
                } else {
                    errors.push(format!(
                        "coupon {} cannot be applied: {}",
                        validation.code,
                        validation.reason.as_deref().unwrap_or("invalid")
                    ));
                    None
                }
            }
            _ => None,
        };
        let discount = coupon
            .as_ref()
            .map_or(Decimal::ZERO, |c| currency.round(c.discount));

        let query = ShippingQuery {
            subtotal: cart.subtotal,
            weight_kg: Some(cart.weight_kg),
            distance_km: request.shipping_distance_km,
        };
        let shipping = match request.shipping_method.as_deref().map(str::trim) {
            Some(method) if !method.is_empty() => match self.shipping.calculate(method, &query) {
                Ok(quote) => Some(quote),
                Err(e) => {
                    errors.push(e.to_string());
                    None
                }
            },
            _ => {
                let best = self.shipping.best_strategy(&query);
                if best.is_none() {
                    errors.push("no shipping method is available for this order".to_string());
                }
                best
            }
        };

        let shipping = shipping.map(|mut quote| {
            quote.cost = currency.round(quote.cost);
            quote
        });
        let shipping_cost = shipping.as_ref().map_or(Decimal::ZERO, |s| s.cost);
        let tax = currency.round(non_negative(cart.subtotal - discount) * self.tax_rate);
        let total = cart.subtotal + shipping_cost + tax - discount;
        if total <= Decimal::ZERO {
            errors.push("order total must be greater than zero".to_string());
        }

        match shipping {
            Some(shipping) if errors.is_empty() => Ok(Ok(Quote {
                cart,
                shipping,
                coupon,
                discount,
                tax,
                total,
            })),
            _ => Ok(Err(errors)),
        }
    }

    /// Resolve items against the catalog, pushing a message per problem.
    async fn price_cart(
        &self,
        items: &[CartItem],
        errors: &mut Vec<String>,
    ) -> CheckoutResult<PricedCart> {
        let mut cart = PricedCart {
            items: Vec::with_capacity(items.len()),
            subtotal: Decimal::ZERO,
            weight_kg: Decimal::ZERO,
        };

        if items.is_empty() {
            errors.push("cart is empty".to_string());
            return Ok(cart);
        }

        // the same product may appear once per variant
        let mut requested: BTreeMap<&str, u32> = BTreeMap::new();
        let mut products: BTreeMap<&str, Product> = BTreeMap::new();

        for item in items {
            if item.quantity == 0 {
                errors.push(format!("quantity for {} must be at least 1", item.product_id));
                continue;
            }

            let product = match products.get(item.product_id.as_str()) {
                Some(product) => product.clone(),
                None => match self.products.find_by_id(&item.product_id).await? {
                    Some(product) => {
                        products.insert(item.product_id.as_str(), product.clone());
                        product
                    }
                    None => {
                        errors.push(
                            CheckoutError::ProductNotFound {
                                product_id: item.product_id.clone(),
                            }
                            .to_string(),
                        );
                        continue;
                    }
                },
            };

            if !product.active {
                errors.push(format!("product {} is not available", product.id));
                continue;
            }

            *requested.entry(item.product_id.as_str()).or_default() += item.quantity;

            let quantity = Decimal::from(item.quantity);
            cart.subtotal += product.price * quantity;
            cart.weight_kg += product.weight_kg * quantity;
            cart.items.push(OrderItem {
                product_id: product.id.clone(),
                product_name: product.name.clone(),
                quantity: item.quantity,
                unit_price: product.price,
                size: item.size.clone(),
                color: item.color.clone(),
            });
        }

        for (product_id, quantity) in requested {
            if let Some(product) = products.get(product_id) {
                if product.stock < quantity {
                    errors.push(
                        CheckoutError::InsufficientStock {
                            product_id: product_id.to_string(),
                            requested: quantity,
                            available: product.stock,
                        }
                        .to_string(),
                    );
                }
            }
        }

        Ok(cart)
    }

    fn build_order(
        &self,
        draft_id: &str,
        request: &CheckoutRequest,
        quote: &Quote,
        currency: Currency,
        result: &PaymentResult,
    ) -> Order {
        let now = timestamp_now();
        Order {
            id: draft_id.to_string(),
            order_number: Order::order_number_for(draft_id, now),
            user_id: request.user_id.clone(),
            items: quote.cart.items.clone(),
            shipping_method: quote.shipping.method.clone(),
            shipping_cost: quote.shipping.cost,
            shipping_address: request.shipping_address.clone(),
            payment_method: request.payment_method.trim().to_ascii_lowercase(),
            // gateways always set it on success; the draft id keeps the order traceable otherwise
            transaction_id: Some(
                result
                    .transaction_id
                    .clone()
                    .unwrap_or_else(|| draft_id.to_string()),
            ),
            currency,
            subtotal: quote.cart.subtotal,
            tax: quote.tax,
            discount: quote.discount,
            total: quote.total,
            coupon_code: quote.coupon.as_ref().map(|c| c.code.clone()),
            customer_email: request.contact_email().map(String::from),
            notes: request.notes.clone(),
            status: OrderStatus::Confirmed,
            created_at: now,
            updated_at: now,
        }
    }

    /// Money moved but no order exists: log loudly and hand to an operator.
    async fn escalate(
        &self,
        attempt: &PaymentAttempt,
        request: &CheckoutRequest,
        transaction_id: &str,
        cause: &CheckoutError,
    ) {
        self.logger.error_with(
            "order persistence failed after successful payment",
            json!({
                "transaction_id": transaction_id,
                "draft_id": attempt.order_ref,
                "provider": attempt.provider,
                "amount": attempt.amount.to_string(),
                "user_id": request.user_id,
                "error": cause.to_string(),
            }),
        );

        let alert = ReconciliationAlert {
            transaction_id: transaction_id.to_string(),
            provider: attempt.provider.clone(),
            amount: attempt.amount,
            currency: attempt.currency,
            user_id: request.user_id.clone(),
            draft_id: attempt.order_ref.clone(),
            reason: cause.to_string(),
            raised_at: timestamp_now(),
        };
        if let Err(e) = self.reconciliation.push(alert).await {
            self.logger.error_with(
                "reconciliation queue rejected alert",
                json!({ "transaction_id": transaction_id, "error": e.to_string() }),
            );
        }
    }

    /// Best-effort: the order already stands, so failures are only logged.
    async fn decrement_stock(&self, order: &Order) {
        for item in &order.items {
            if let Err(e) = self
                .products
                .decrement_stock(&item.product_id, item.quantity)
                .await
            {
                self.logger.warn_with(
                    "stock decrement failed",
                    json!({
                        "order_id": order.id,
                        "product_id": item.product_id,
                        "quantity": item.quantity,
                        "error": e.to_string(),
                    }),
                );
            }
        }
    }

    fn notify(&self, order: Order) {
        let notifier = Arc::clone(&self.notifier);
        let logger = self.logger.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.order_confirmed(&order).await {
                logger.warn_with(
                    "order notification failed",
                    json!({ "order_id": order.id, "error": e.to_string() }),
                );
            }
        });
    }
}
