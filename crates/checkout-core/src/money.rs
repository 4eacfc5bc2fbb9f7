//! # Money
//!
//! Currency codes and decimal helpers. Amounts are `Decimal` in major units
//! everywhere inside the core; gateways convert to minor units at the edge.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported currencies (ISO 4217)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    #[default]
    IDR,
    USD,
    EUR,
    GBP,
    SGD,
    JPY,
}

impl Currency {
    /// Returns the ISO 4217 currency code
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::IDR => "idr",
            Currency::USD => "usd",
            Currency::EUR => "eur",
            Currency::GBP => "gbp",
            Currency::SGD => "sgd",
            Currency::JPY => "jpy",
        }
    }

    /// Returns the number of decimal places for this currency
    /// (JPY has 0 decimals, the others have 2)
    pub fn decimal_places(&self) -> u32 {
        match self {
            Currency::JPY => 0,
            _ => 2,
        }
    }

    /// Round to this currency's precision, midpoint away from zero
    pub fn round(&self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.decimal_places(), RoundingStrategy::MidpointAwayFromZero)
    }

    /// Convert a major-unit amount to the smallest currency unit
    pub fn to_minor_units(&self, amount: Decimal) -> Option<i64> {
        (amount * Decimal::from(10_i64.pow(self.decimal_places())))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
    }

    /// Convert from smallest unit back to major units
    pub fn from_minor_units(&self, amount: i64) -> Decimal {
        Decimal::new(amount, self.decimal_places())
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "idr" => Ok(Currency::IDR),
            "usd" => Ok(Currency::USD),
            "eur" => Ok(Currency::EUR),
            "gbp" => Ok(Currency::GBP),
            "sgd" => Ok(Currency::SGD),
            "jpy" => Ok(Currency::JPY),
            other => Err(format!("unsupported currency: {}", other)),
        }
    }
}

/// Round a monetary amount to two decimal places, midpoint away from zero.
/// Use [`Currency::round`] once the currency is known.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Clamp negative amounts to zero.
pub fn non_negative(amount: Decimal) -> Decimal {
    amount.max(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minor_unit_conversion() {
        let usd = Currency::USD;
        assert_eq!(usd.to_minor_units(Decimal::new(1099, 2)), Some(1099));
        assert_eq!(usd.from_minor_units(1099), Decimal::new(1099, 2));
        assert_eq!(Currency::IDR.to_minor_units(Decimal::from(223_750)), Some(22_375_000));

        let jpy = Currency::JPY;
        assert_eq!(jpy.to_minor_units(Decimal::from(1000)), Some(1000));
        assert_eq!(jpy.from_minor_units(1000), Decimal::from(1000));
    }

    #[test]
    fn test_round_money() {
        assert_eq!(round_money(Decimal::new(12345, 3)), Decimal::new(1235, 2));
        assert_eq!(round_money(Decimal::new(-12345, 3)), Decimal::new(-1235, 2));
        assert_eq!(round_money(Decimal::from(7)), Decimal::from(7));
    }

    #[test]
    fn test_round_to_currency_precision() {
        let amount = Decimal::new(28875, 1); // 2887.5
        assert_eq!(Currency::JPY.round(amount), Decimal::from(2888));
        assert_eq!(Currency::IDR.round(amount), amount);
        assert_eq!(Currency::USD.round(Decimal::new(10995, 3)), Decimal::new(1100, 2));

        // whatever is rounded this way converts to minor units exactly
        let jpy = Currency::JPY.round(amount);
        assert_eq!(Currency::JPY.from_minor_units(Currency::JPY.to_minor_units(jpy).unwrap()), jpy);
    }

    #[test]
    fn test_currency_parse_is_case_insensitive() {
        assert_eq!("IDR".parse::<Currency>(), Ok(Currency::IDR));
        assert_eq!("usd".parse::<Currency>(), Ok(Currency::USD));
        assert!("xyz".parse::<Currency>().is_err());
    }
}
