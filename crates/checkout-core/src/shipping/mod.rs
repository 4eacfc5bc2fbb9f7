//! # Shipping Cost Engine
//!
//! Shipping is priced by interchangeable strategies, each a pure function of
//! the cart subtotal and optional weight/distance.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  ShippingStrategy (trait)                   │
//! │  ├── calculate(query)                                       │
//! │  ├── is_available(subtotal)                                 │
//! │  └── estimated_days() / icon() / method()                   │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!     ┌──────────────┬───────┴──────┬──────────────┐
//!  Standard       Express       Overnight       Pickup
//!
//!  ShippingCalculator: ordered name → strategy registry
//! ```
//!
//! New strategies are added by registering them with the
//! [`ShippingCalculator`]; existing strategy code never changes.

pub mod calculator;
pub mod strategies;

pub use calculator::ShippingCalculator;
pub use strategies::{
    ExpressShipping, LinearRate, OvernightShipping, PickupShipping, StandardShipping,
};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::money::non_negative;

/// Inputs to a shipping price calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShippingQuery {
    pub subtotal: Decimal,
    #[serde(default)]
    pub weight_kg: Option<Decimal>,
    #[serde(default)]
    pub distance_km: Option<Decimal>,
}

impl ShippingQuery {
    pub fn new(subtotal: Decimal) -> Self {
        Self {
            subtotal,
            weight_kg: None,
            distance_km: None,
        }
    }

    pub fn with_weight(mut self, weight_kg: Decimal) -> Self {
        self.weight_kg = Some(weight_kg);
        self
    }

    pub fn with_distance(mut self, distance_km: Decimal) -> Self {
        self.distance_km = Some(distance_km);
        self
    }

    /// Weight with missing or negative values treated as zero
    pub fn weight(&self) -> Decimal {
        non_negative(self.weight_kg.unwrap_or_default())
    }

    /// Distance with missing or negative values treated as zero
    pub fn distance(&self) -> Decimal {
        non_negative(self.distance_km.unwrap_or_default())
    }
}

/// Delivery window in days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryEstimate {
    pub min_days: u32,
    pub max_days: u32,
}

impl DeliveryEstimate {
    pub const fn new(min_days: u32, max_days: u32) -> Self {
        Self { min_days, max_days }
    }

    pub const fn same_day() -> Self {
        Self::new(0, 0)
    }
}

impl fmt::Display for DeliveryEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min_days, self.max_days) {
            (0, 0) => write!(f, "Same day"),
            (1, 1) => write!(f, "1 day"),
            (min, max) if min == max => write!(f, "{} days", min),
            (min, max) => write!(f, "{}-{} days", min, max),
        }
    }
}

/// Immutable reference record describing a shipping method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingMethod {
    pub id: String,
    pub name: String,
    pub base_cost: Decimal,
    /// Subtotal at which shipping becomes free, if ever
    pub free_threshold: Option<Decimal>,
    pub estimated_delivery: String,
}

/// A priced option returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShippingQuote {
    /// Registry key (e.g. "express")
    pub method: String,
    pub name: String,
    pub cost: Decimal,
    pub estimated_days: DeliveryEstimate,
    pub estimated_delivery: String,
    pub icon: String,
    pub min_order: Decimal,
}

impl ShippingQuote {
    pub fn is_free(&self) -> bool {
        self.cost.is_zero()
    }
}

/// A shipping pricing strategy.
///
/// `calculate` must return a non-negative amount rounded to two decimal
/// places. Availability is a gate, not a surcharge: callers never offer a
/// strategy whose `is_available` is false.
pub trait ShippingStrategy: Send + Sync {
    /// Registry key, lowercase (e.g. "standard")
    fn name(&self) -> &str;

    fn display_name(&self) -> &str;

    fn calculate(&self, query: &ShippingQuery) -> Decimal;

    fn estimated_days(&self) -> DeliveryEstimate;

    fn icon(&self) -> &str;

    /// Minimum subtotal for this strategy to be offered
    fn min_order(&self) -> Decimal;

    fn is_available(&self, subtotal: Decimal) -> bool {
        subtotal >= self.min_order()
    }

    /// Reference record for display and persistence
    fn method(&self) -> ShippingMethod;

    fn quote(&self, query: &ShippingQuery) -> ShippingQuote {
        let estimate = self.estimated_days();
        ShippingQuote {
            method: self.name().to_string(),
            name: self.display_name().to_string(),
            cost: self.calculate(query),
            estimated_days: estimate,
            estimated_delivery: estimate.to_string(),
            icon: self.icon().to_string(),
            min_order: self.min_order(),
        }
    }
}

/// Shared strategy handle (dynamic dispatch)
pub type BoxedShippingStrategy = Arc<dyn ShippingStrategy>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_clamps_inputs() {
        let query = ShippingQuery::new(Decimal::from(1000))
            .with_weight(Decimal::from(-3))
            .with_distance(Decimal::new(125, 1));

        assert_eq!(query.weight(), Decimal::ZERO);
        assert_eq!(query.distance(), Decimal::new(125, 1));
        assert_eq!(ShippingQuery::default().distance(), Decimal::ZERO);
    }

    #[test]
    fn test_delivery_estimate_display() {
        assert_eq!(DeliveryEstimate::new(3, 5).to_string(), "3-5 days");
        assert_eq!(DeliveryEstimate::new(1, 1).to_string(), "1 day");
        assert_eq!(DeliveryEstimate::same_day().to_string(), "Same day");
    }
}
