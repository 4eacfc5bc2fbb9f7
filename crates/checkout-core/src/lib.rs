//! # checkout-core
//!
//! Core types and traits for the settle-cart checkout pipeline.
//!
//! This crate provides:
//! - `ShippingStrategy` trait and `ShippingCalculator` registry for shipping costs
//! - `PaymentMethod` trait, `PaymentMethodFactory` and `PaymentProcessor` for settlement
//! - `CheckoutOrchestrator` sequencing validation → payment → persistence → coupon
//! - `Repository<E>` over a pluggable `Datastore`, with `MemoryDatastore` built in
//! - `Order`, `Product`, `Coupon` and `SavedPaymentMethod` entities
//! - `Logger` for structured, capped in-process logging
//! - `CheckoutError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use checkout_core::*;
//!
//! let logger = Logger::global();
//! let repos = RepositoryFactory::new(Arc::new(MemoryDatastore::new()));
//!
//! let orchestrator = CheckoutOrchestrator::new(
//!     Arc::new(ShippingCalculator::with_defaults(logger.clone())),
//!     Arc::new(PaymentProcessor::new(Arc::new(factory), logger.clone())),
//!     &repos,
//!     Arc::new(RepositoryCouponService::new(repos.repository::<Coupon>(), logger.clone())),
//!     logger,
//! );
//!
//! let outcome = orchestrator.checkout(request).await?;
//! ```

pub mod catalog;
pub mod checkout;
pub mod coupon;
pub mod error;
pub mod logger;
pub mod money;
pub mod order;
pub mod payment;
pub mod repository;
pub mod shipping;

// Re-exports for convenience
pub use catalog::{CartItem, Product, ProductCatalog, ProductPatch, ProductRepository};
pub use checkout::{
    is_valid_email, CheckoutOrchestrator, CheckoutOutcome, CheckoutRequest, CheckoutState,
    InMemoryReconciliationQueue, LoggingNotifier, Notifier, ReconciliationAlert,
    ReconciliationQueue, SharedNotifier, SharedReconciliationQueue,
};
pub use coupon::{
    Coupon, CouponCatalog, CouponRepository, CouponService, CouponValidation, DiscountType,
    RepositoryCouponService, SharedCouponService,
};
pub use error::{CheckoutError, CheckoutResult};
pub use logger::{LogEntry, LogLevel, Logger, DEFAULT_LOG_CAPACITY};
pub use money::{round_money, Currency};
pub use order::{Order, OrderItem, OrderPatch, OrderRepository, OrderStatus, ShippingAddress};
pub use payment::{
    BoxedPaymentMethod, PaymentAttempt, PaymentData, PaymentMethod, PaymentMethodFactory,
    PaymentProcessor, PaymentResult, ProviderInfo, SavedPaymentMethod, SavedPaymentMethodPatch,
    SavedPaymentMethodRepository,
};
pub use repository::{
    Criteria, Datastore, Entity, Filter, FilterOp, MemoryDatastore, Page, Pagination,
    Repository, RepositoryFactory, Row, RowUpdate, SharedDatastore, Sort, SortDirection,
};
pub use shipping::{
    BoxedShippingStrategy, DeliveryEstimate, ShippingCalculator, ShippingMethod, ShippingQuery,
    ShippingQuote, ShippingStrategy,
};
