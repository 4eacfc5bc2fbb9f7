//! Ordered shipping strategy registry.

use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;

use super::{
    BoxedShippingStrategy, ExpressShipping, OvernightShipping, PickupShipping, ShippingQuery,
    ShippingQuote, ShippingStrategy, StandardShipping,
};
use crate::error::{CheckoutError, CheckoutResult};
use crate::logger::Logger;

/// Selects and runs shipping strategies by name.
///
/// Registration order is significant: it is the order options are listed in
/// and the tie-breaker for [`ShippingCalculator::best_strategy`].
///
/// Strategies can be registered through a shared handle while requests are
/// being priced; each query sees a consistent snapshot of the list.
pub struct ShippingCalculator {
    strategies: RwLock<Vec<BoxedShippingStrategy>>,
    logger: Logger,
}

impl Clone for ShippingCalculator {
    fn clone(&self) -> Self {
        Self {
            strategies: RwLock::new(self.snapshot()),
            logger: self.logger.clone(),
        }
    }
}

impl ShippingCalculator {
    /// Create an empty calculator
    pub fn new(logger: Logger) -> Self {
        Self {
            strategies: RwLock::new(Vec::new()),
            logger: logger.for_component("shipping"),
        }
    }

    /// Calculator with standard, express, overnight and pickup registered
    pub fn with_defaults(logger: Logger) -> Self {
        Self::new(logger)
            .with_strategy(Arc::new(StandardShipping::default()))
            .with_strategy(Arc::new(ExpressShipping::default()))
            .with_strategy(Arc::new(OvernightShipping::default()))
            .with_strategy(Arc::new(PickupShipping::default()))
    }

    /// Register a strategy. A strategy already registered under the same
    /// name is replaced in place, keeping its position.
    pub fn register(&self, strategy: BoxedShippingStrategy) {
        let name = strategy.name().to_ascii_lowercase();
        let mut strategies = self.strategies.write();
        match strategies
            .iter()
            .position(|s| s.name().eq_ignore_ascii_case(&name))
        {
            Some(index) => {
                self.logger.warn_with(
                    "shipping strategy re-registered, replacing previous",
                    json!({ "strategy": name }),
                );
                strategies[index] = strategy;
            }
            None => {
                self.logger
                    .debug_with("shipping strategy registered", json!({ "strategy": name }));
                strategies.push(strategy);
            }
        }
    }

    /// Register with builder pattern
    pub fn with_strategy(self, strategy: BoxedShippingStrategy) -> Self {
        self.register(strategy);
        self
    }

    fn snapshot(&self) -> Vec<BoxedShippingStrategy> {
        self.strategies.read().clone()
    }

    /// Get a strategy by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<BoxedShippingStrategy> {
        self.strategies
            .read()
            .iter()
            .find(|s| s.name().eq_ignore_ascii_case(name.trim()))
            .cloned()
    }

    /// Registered names in registration order
    pub fn names(&self) -> Vec<String> {
        self.strategies
            .read()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Price the named strategy. Unknown and gated strategies are errors.
    pub fn calculate(&self, name: &str, query: &ShippingQuery) -> CheckoutResult<ShippingQuote> {
        let strategy = self
            .get(name)
            .ok_or_else(|| CheckoutError::UnsupportedShippingMethod {
                method: name.to_string(),
                supported: self.names(),
            })?;

        if !strategy.is_available(query.subtotal) {
            return Err(CheckoutError::ShippingNotAvailableForSubtotal {
                method: strategy.name().to_string(),
                subtotal: query.subtotal,
                minimum: strategy.min_order(),
            });
        }

        Ok(strategy.quote(query))
    }

    /// Strategies whose gate admits `subtotal`, in registration order
    pub fn available_strategies(&self, subtotal: Decimal) -> Vec<BoxedShippingStrategy> {
        self.snapshot()
            .into_iter()
            .filter(|s| s.is_available(subtotal))
            .collect()
    }

    /// Quotes for every available strategy, in registration order
    pub fn options(&self, query: &ShippingQuery) -> Vec<ShippingQuote> {
        self.available_strategies(query.subtotal)
            .into_iter()
            .map(|s| s.quote(query))
            .collect()
    }

    /// Cheapest available option; the first registered wins a tie.
    pub fn best_strategy(&self, query: &ShippingQuery) -> Option<ShippingQuote> {
        self.options(query)
            .into_iter()
            .fold(None, |best: Option<ShippingQuote>, quote| match best {
                Some(current) if current.cost <= quote.cost => Some(current),
                _ => Some(quote),
            })
    }

    pub fn len(&self) -> usize {
        self.strategies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.read().is_empty()
    }
}
