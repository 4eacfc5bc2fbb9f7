//! Built-in shipping strategies.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{DeliveryEstimate, ShippingMethod, ShippingQuery, ShippingStrategy};
use crate::money::{non_negative, round_money};

/// `base + per_kg * weight + per_km * distance`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearRate {
    pub base: Decimal,
    pub per_kg: Decimal,
    pub per_km: Decimal,
}

impl LinearRate {
    pub const fn new(base: Decimal, per_kg: Decimal, per_km: Decimal) -> Self {
        Self {
            base,
            per_kg,
            per_km,
        }
    }

    pub fn cost(&self, query: &ShippingQuery) -> Decimal {
        self.base + self.per_kg * query.weight() + self.per_km * query.distance()
    }
}

/// Apply `percent` off when `subtotal >= threshold`
fn discounted(cost: Decimal, subtotal: Decimal, threshold: Decimal, percent: Decimal) -> Decimal {
    if subtotal >= threshold {
        cost - cost * percent / Decimal::ONE_HUNDRED
    } else {
        cost
    }
}

fn finish(cost: Decimal) -> Decimal {
    round_money(non_negative(cost))
}

/// Free above a threshold, otherwise linear
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardShipping {
    pub rate: LinearRate,
    pub free_threshold: Decimal,
    pub min_order: Decimal,
}

impl Default for StandardShipping {
    fn default() -> Self {
        Self {
            rate: LinearRate::new(
                Decimal::from(10_000),
                Decimal::from(2_000),
                Decimal::from(500),
            ),
            free_threshold: Decimal::from(150_000),
            min_order: Decimal::ZERO,
        }
    }
}

impl ShippingStrategy for StandardShipping {
    fn name(&self) -> &str {
        "standard"
    }

    fn display_name(&self) -> &str {
        "Standard Shipping"
    }

    fn calculate(&self, query: &ShippingQuery) -> Decimal {
        if query.subtotal >= self.free_threshold {
            return Decimal::ZERO;
        }
        finish(self.rate.cost(query))
    }

    fn estimated_days(&self) -> DeliveryEstimate {
        DeliveryEstimate::new(3, 5)
    }

    fn icon(&self) -> &str {
        "truck"
    }

    fn min_order(&self) -> Decimal {
        self.min_order
    }

    fn method(&self) -> ShippingMethod {
        ShippingMethod {
            id: self.name().to_string(),
            name: self.display_name().to_string(),
            base_cost: self.rate.base,
            free_threshold: Some(self.free_threshold),
            estimated_delivery: self.estimated_days().to_string(),
        }
    }
}

/// Faster linear rate with a percentage discount on large orders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpressShipping {
    pub rate: LinearRate,
    pub discount_threshold: Decimal,
    pub discount_percent: Decimal,
    pub min_order: Decimal,
}

impl Default for ExpressShipping {
    fn default() -> Self {
        Self {
            rate: LinearRate::new(
                Decimal::from(25_000),
                Decimal::from(3_500),
                Decimal::from(1_000),
            ),
            discount_threshold: Decimal::from(300_000),
            discount_percent: Decimal::from(10),
            min_order: Decimal::from(20_000),
        }
    }
}

impl ShippingStrategy for ExpressShipping {
    fn name(&self) -> &str {
        "express"
    }

    fn display_name(&self) -> &str {
        "Express Shipping"
    }

    fn calculate(&self, query: &ShippingQuery) -> Decimal {
        let cost = discounted(
            self.rate.cost(query),
            query.subtotal,
            self.discount_threshold,
            self.discount_percent,
        );
        finish(cost)
    }

    fn estimated_days(&self) -> DeliveryEstimate {
        DeliveryEstimate::new(1, 2)
    }

    fn icon(&self) -> &str {
        "zap"
    }

    fn min_order(&self) -> Decimal {
        self.min_order
    }

    fn method(&self) -> ShippingMethod {
        ShippingMethod {
            id: self.name().to_string(),
            name: self.display_name().to_string(),
            base_cost: self.rate.base,
            free_threshold: None,
            estimated_delivery: self.estimated_days().to_string(),
        }
    }
}

/// Premium next-day rate with a small discount on very large orders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OvernightShipping {
    pub rate: LinearRate,
    pub discount_threshold: Decimal,
    pub discount_percent: Decimal,
    pub min_order: Decimal,
}

impl Default for OvernightShipping {
    fn default() -> Self {
        Self {
            rate: LinearRate::new(
                Decimal::from(50_000),
                Decimal::from(5_000),
                Decimal::from(2_000),
            ),
            discount_threshold: Decimal::from(1_000_000),
            discount_percent: Decimal::from(5),
            min_order: Decimal::from(50_000),
        }
    }
}

impl ShippingStrategy for OvernightShipping {
    fn name(&self) -> &str {
        "overnight"
    }

    fn display_name(&self) -> &str {
        "Overnight Shipping"
    }

    fn calculate(&self, query: &ShippingQuery) -> Decimal {
        let cost = discounted(
            self.rate.cost(query),
            query.subtotal,
            self.discount_threshold,
            self.discount_percent,
        );
        finish(cost)
    }

    fn estimated_days(&self) -> DeliveryEstimate {
        DeliveryEstimate::new(1, 1)
    }

    fn icon(&self) -> &str {
        "moon"
    }

    fn min_order(&self) -> Decimal {
        self.min_order
    }

    fn method(&self) -> ShippingMethod {
        ShippingMethod {
            id: self.name().to_string(),
            name: self.display_name().to_string(),
            base_cost: self.rate.base,
            free_threshold: None,
            estimated_delivery: self.estimated_days().to_string(),
        }
    }
}

/// In-store pickup. Always free; only the minimum order applies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickupShipping {
    pub min_order: Decimal,
}

impl Default for PickupShipping {
    fn default() -> Self {
        Self {
            min_order: Decimal::from(10_000),
        }
    }
}

impl ShippingStrategy for PickupShipping {
    fn name(&self) -> &str {
        "pickup"
    }

    fn display_name(&self) -> &str {
        "Store Pickup"
    }

    fn calculate(&self, _query: &ShippingQuery) -> Decimal {
        Decimal::ZERO
    }

    fn estimated_days(&self) -> DeliveryEstimate {
        DeliveryEstimate::same_day()
    }

    fn icon(&self) -> &str {
        "store"
    }

    fn min_order(&self) -> Decimal {
        self.min_order
    }

    fn method(&self) -> ShippingMethod {
        ShippingMethod {
            id: self.name().to_string(),
            name: self.display_name().to_string(),
            base_cost: Decimal::ZERO,
            free_threshold: Some(Decimal::ZERO),
            estimated_delivery: self.estimated_days().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(subtotal: i64, weight: Decimal, distance: i64) -> ShippingQuery {
        ShippingQuery::new(Decimal::from(subtotal))
            .with_weight(weight)
            .with_distance(Decimal::from(distance))
    }

    #[test]
    fn test_standard_free_at_threshold() {
        let standard = StandardShipping::default();
        for subtotal in [150_000, 160_000, 5_000_000] {
            assert_eq!(
                standard.calculate(&query(subtotal, Decimal::from(40), 900)),
                Decimal::ZERO
            );
        }
    }

    #[test]
    fn test_standard_below_threshold_is_positive_and_non_increasing() {
        let standard = StandardShipping::default();
        let weight = Decimal::new(25, 1);

        let mut previous = None;
        for subtotal in [100_000, 120_000, 140_000, 149_999] {
            let cost = standard.calculate(&query(subtotal, weight, 15));
            assert!(cost > Decimal::ZERO);
            if let Some(prev) = previous {
                assert!(cost <= prev);
            }
            previous = Some(cost);
        }
        // 10,000 + 2,000 * 2.5 + 500 * 15
        assert_eq!(previous, Some(Decimal::from(22_500)));
    }

    #[test]
    fn test_express_formula_and_discount() {
        let express = ExpressShipping::default();
        let weight = Decimal::new(25, 1);

        assert_eq!(
            express.calculate(&query(175_000, weight, 15)),
            Decimal::from(48_750)
        );
        // 10% off at 300,000 and above
        assert_eq!(
            express.calculate(&query(300_000, weight, 15)),
            Decimal::new(4_387_500, 2)
        );
    }

    #[test]
    fn test_overnight_discount() {
        let overnight = OvernightShipping::default();
        let cost = overnight.calculate(&query(1_000_000, Decimal::from(1), 10));
        // (50,000 + 5,000 + 20,000) * 0.95
        assert_eq!(cost, Decimal::from(71_250));
    }

    #[test]
    fn test_missing_weight_and_distance_are_zero() {
        let standard = StandardShipping::default();
        assert_eq!(
            standard.calculate(&ShippingQuery::new(Decimal::from(50_000))),
            Decimal::from(10_000)
        );
    }

    #[test]
    fn test_pickup_gate() {
        let pickup = PickupShipping::default();
        assert!(!pickup.is_available(Decimal::from(9_999)));
        assert!(pickup.is_available(Decimal::from(10_000)));
        assert_eq!(
            pickup.calculate(&query(50_000, Decimal::from(10), 100)),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_costs_round_to_cents() {
        let standard = StandardShipping::default();
        // 10,000 + 500 * 0.00111 = 10,000.555
        let cost = standard.calculate(
            &ShippingQuery::new(Decimal::from(1_000)).with_distance(Decimal::new(111, 5)),
        );
        assert_eq!(cost, Decimal::new(1_000_056, 2));
    }

    #[test]
    fn test_method_reference_record() {
        let method = StandardShipping::default().method();
        assert_eq!(method.id, "standard");
        assert_eq!(method.free_threshold, Some(Decimal::from(150_000)));
        assert_eq!(method.estimated_delivery, "3-5 days");
    }
}
