//! # Application State
//!
//! Shared state for the Axum application.
//! Contains configuration, repositories, and the checkout services built on them.

use checkout_core::{
    CheckoutError, CheckoutOrchestrator, CheckoutResult, CouponRepository, Currency, LogLevel,
    Logger, MemoryDatastore, OrderRepository, PaymentMethodFactory, PaymentProcessor,
    ProductRepository, RepositoryCouponService, RepositoryFactory, SavedPaymentMethodRepository,
    SharedCouponService, SharedDatastore, ShippingCalculator, DEFAULT_LOG_CAPACITY,
};
use checkout_gateways::GatewayConfig;
use checkout_store::SqliteDatastore;
use rust_decimal::Decimal;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::seed;

/// Output format of the `tracing` subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Environment (development, staging, production)
    pub environment: String,
    /// `memory`, or a sqlite URL such as `sqlite://settle.db`
    pub database_url: String,
    /// Applied to `subtotal - discount`
    pub tax_rate: Decimal,
    pub default_currency: Currency,
    pub log_min_level: LogLevel,
    pub log_buffer_size: usize,
    pub log_format: LogFormat,
    /// Directory holding `products.toml` and `coupons.toml`
    pub config_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> CheckoutResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys fall back to defaults; set but
    /// unparseable keys are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CheckoutResult<Self> {
        let port = match lookup("PORT") {
            Some(p) => p.trim().parse().map_err(|_| invalid("PORT", &p))?,
            None => 8080,
        };

        let tax_rate = match lookup("TAX_RATE") {
            Some(raw) => {
                let rate = Decimal::from_str(raw.trim()).map_err(|_| invalid("TAX_RATE", &raw))?;
                if rate.is_sign_negative() || rate >= Decimal::ONE {
                    return Err(invalid("TAX_RATE", &raw));
                }
                rate
            }
            None => Decimal::ZERO,
        };

        let default_currency = match lookup("DEFAULT_CURRENCY") {
            Some(raw) => Currency::from_str(raw.trim()).map_err(CheckoutError::Configuration)?,
            None => Currency::default(),
        };

        let log_min_level = match lookup("LOG_MIN_LEVEL") {
            Some(raw) => LogLevel::from_str(raw.trim()).map_err(CheckoutError::Configuration)?,
            None => LogLevel::Info,
        };

        let log_buffer_size = match lookup("LOG_BUFFER_SIZE") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| invalid("LOG_BUFFER_SIZE", &raw))?,
            None => DEFAULT_LOG_CAPACITY,
        };

        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| "memory".to_string()),
            tax_rate,
            default_currency,
            log_min_level,
            log_buffer_size,
            log_format,
            config_dir: lookup("CONFIG_DIR")
                .map(PathBuf::from)
                .or_else(seed::locate_config_dir),
        })
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> CheckoutResult<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| invalid("HOST", &self.host))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url.trim().eq_ignore_ascii_case("memory")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            environment: "development".to_string(),
            database_url: "memory".to_string(),
            tax_rate: Decimal::ZERO,
            default_currency: Currency::default(),
            log_min_level: LogLevel::Info,
            log_buffer_size: DEFAULT_LOG_CAPACITY,
            log_format: LogFormat::Text,
            config_dir: None,
        }
    }
}

fn invalid(key: &str, value: &str) -> CheckoutError {
    CheckoutError::Configuration(format!("invalid {}: {:?}", key, value))
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    pub logger: Logger,
    pub repositories: Arc<RepositoryFactory>,
    pub shipping: Arc<ShippingCalculator>,
    pub payments: Arc<PaymentProcessor>,
    pub orchestrator: Arc<CheckoutOrchestrator>,
}

impl AppState {
    /// Connect the datastore, register the configured gateways and seed the
    /// catalog.
    pub async fn from_config(config: AppConfig, logger: Logger) -> CheckoutResult<Self> {
        let store: SharedDatastore = if config.uses_memory_store() {
            Arc::new(MemoryDatastore::new())
        } else {
            Arc::new(SqliteDatastore::connect(&config.database_url).await?)
        };
        let repositories = RepositoryFactory::new(store);

        let payment_methods = checkout_gateways::build_factory(GatewayConfig::from_env())?;

        if let Some(dir) = &config.config_dir {
            let catalogs = seed::load_catalogs(dir)?;
            seed::seed_repositories(&repositories, &catalogs, &logger).await?;
        } else {
            tracing::warn!("No config directory found, starting with an empty catalog");
        }

        Ok(Self::new(config, repositories, payment_methods, logger))
    }

    /// Wire services over existing repositories, with coupons served from
    /// the coupon repository.
    pub fn new(
        config: AppConfig,
        repositories: RepositoryFactory,
        payment_methods: PaymentMethodFactory,
        logger: Logger,
    ) -> Self {
        let coupons: SharedCouponService = Arc::new(RepositoryCouponService::new(
            repositories.repository(),
            logger.clone(),
        ));
        Self::with_coupon_service(config, repositories, payment_methods, coupons, logger)
    }

    pub fn with_coupon_service(
        config: AppConfig,
        repositories: RepositoryFactory,
        payment_methods: PaymentMethodFactory,
        coupons: SharedCouponService,
        logger: Logger,
    ) -> Self {
        let shipping = Arc::new(ShippingCalculator::with_defaults(logger.clone()));
        let payments = Arc::new(PaymentProcessor::new(
            Arc::new(payment_methods),
            logger.clone(),
        ));
        let orchestrator = CheckoutOrchestrator::new(
            shipping.clone(),
            payments.clone(),
            &repositories,
            coupons,
            logger.clone(),
        )
        .with_tax_rate(config.tax_rate)
        .with_default_currency(config.default_currency);

        Self {
            config,
            logger,
            repositories: Arc::new(repositories),
            shipping,
            payments,
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub fn orders(&self) -> Arc<OrderRepository> {
        self.repositories.repository()
    }

    pub fn products(&self) -> Arc<ProductRepository> {
        self.repositories.repository()
    }

    pub fn coupons(&self) -> Arc<CouponRepository> {
        self.repositories.repository()
    }

    pub fn payment_methods(&self) -> Arc<SavedPaymentMethodRepository> {
        self.repositories.repository()
    }
}
