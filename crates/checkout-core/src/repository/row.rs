//! Typed accessors for storage rows.
//!
//! Decimals are stored as strings so no backend rounds them through f64.
//! Timestamps are RFC 3339 UTC with microseconds, which sorts correctly as text.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;

use super::Row;
use crate::error::{CheckoutError, CheckoutResult};

fn corrupt(key: &str, expected: &str) -> CheckoutError {
    CheckoutError::Serialization(format!("row field '{}' is missing or not {}", key, expected))
}

/// Current time at the precision rows keep, so stored entities compare equal
/// to what was written.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub fn decimal_value(amount: Decimal) -> Value {
    Value::String(amount.to_string())
}

pub fn datetime_value(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::Micros, true))
}

pub fn json_value<T: Serialize>(value: &T) -> CheckoutResult<Value> {
    Ok(serde_json::to_value(value)?)
}

pub fn get_str(row: &Row, key: &str) -> CheckoutResult<String> {
    get_opt_str(row, key).ok_or_else(|| corrupt(key, "a string"))
}

pub fn get_opt_str(row: &Row, key: &str) -> Option<String> {
    row.get(key).and_then(Value::as_str).map(String::from)
}

pub fn get_decimal(row: &Row, key: &str) -> CheckoutResult<Decimal> {
    get_opt_decimal(row, key)?.ok_or_else(|| corrupt(key, "a decimal"))
}

pub fn get_opt_decimal(row: &Row, key: &str) -> CheckoutResult<Option<Decimal>> {
    match row.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Decimal::from_str(s)
            .map(Some)
            .map_err(|_| corrupt(key, "a decimal")),
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string())
            .map(Some)
            .map_err(|_| corrupt(key, "a decimal")),
        Some(_) => Err(corrupt(key, "a decimal")),
    }
}

pub fn get_u32(row: &Row, key: &str) -> CheckoutResult<u32> {
    row.get(key)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| corrupt(key, "an unsigned integer"))
}

pub fn get_opt_u32(row: &Row, key: &str) -> CheckoutResult<Option<u32>> {
    match row.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => get_u32(row, key).map(Some),
    }
}

pub fn get_bool(row: &Row, key: &str) -> CheckoutResult<bool> {
    row.get(key)
        .and_then(Value::as_bool)
        .ok_or_else(|| corrupt(key, "a boolean"))
}

pub fn get_datetime(row: &Row, key: &str) -> CheckoutResult<DateTime<Utc>> {
    get_opt_datetime(row, key)?.ok_or_else(|| corrupt(key, "a timestamp"))
}

pub fn get_opt_datetime(row: &Row, key: &str) -> CheckoutResult<Option<DateTime<Utc>>> {
    match row.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| corrupt(key, "a timestamp")),
        Some(_) => Err(corrupt(key, "a timestamp")),
    }
}

/// Deserialize a nested JSON field (item lists, addresses, enums)
pub fn get_json<T: DeserializeOwned>(row: &Row, key: &str) -> CheckoutResult<T> {
    let value = row.get(key).cloned().unwrap_or(Value::Null);
    serde_json::from_value(value)
        .map_err(|e| CheckoutError::Serialization(format!("row field '{}': {}", key, e)))
}

/// Insert only when `value` is `Some`; this is how patches skip unset fields.
pub fn put_opt(row: &mut Row, key: &str, value: Option<Value>) {
    if let Some(v) = value {
        row.insert(key.to_string(), v);
    }
}
