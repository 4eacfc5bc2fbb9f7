//! # Coupons
//!
//! The orchestrator only sees [`CouponService`]: validate a code against a
//! subtotal before payment, and record usage once an order exists.
//! [`RepositoryCouponService`] is the stock implementation over
//! `Repository<Coupon>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::error::{CheckoutError, CheckoutResult};
use crate::logger::Logger;
use crate::money::round_money;
use crate::repository::row::{
    datetime_value, decimal_value, get_bool, get_datetime, get_decimal, get_json,
    get_opt_datetime, get_opt_decimal, get_opt_u32, get_str, get_u32, json_value, put_opt,
    timestamp_now,
};
use crate::repository::{Entity, Repository, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::Fixed => "fixed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    /// Normalized (uppercase) code; doubles as the row id
    pub code: String,
    pub discount_type: DiscountType,
    /// Percent for `Percentage`, amount for `Fixed`
    pub value: Decimal,
    #[serde(default)]
    pub max_discount: Option<Decimal>,
    #[serde(default)]
    pub min_order: Decimal,
    #[serde(default)]
    pub usage_limit: Option<u32>,
    #[serde(default)]
    pub usage_count: u32,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Orders that already consumed this coupon
    #[serde(default)]
    pub redeemed_orders: Vec<String>,
    #[serde(default = "timestamp_now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "timestamp_now")]
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

/// Codes are case-insensitive
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

impl Coupon {
    pub fn percentage(code: &str, percent: Decimal) -> Self {
        Self::new(code, DiscountType::Percentage, percent)
    }

    pub fn fixed(code: &str, amount: Decimal) -> Self {
        Self::new(code, DiscountType::Fixed, amount)
    }

    fn new(code: &str, discount_type: DiscountType, value: Decimal) -> Self {
        let now = timestamp_now();
        Self {
            code: normalize_code(code),
            discount_type,
            value,
            max_discount: None,
            min_order: Decimal::ZERO,
            usage_limit: None,
            usage_count: 0,
            expires_at: None,
            active: true,
            redeemed_orders: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_max_discount(mut self, cap: Decimal) -> Self {
        self.max_discount = Some(cap);
        self
    }

    pub fn with_min_order(mut self, min_order: Decimal) -> Self {
        self.min_order = min_order;
        self
    }

    pub fn with_usage_limit(mut self, limit: u32) -> Self {
        self.usage_limit = Some(limit);
        self
    }

    pub fn expiring_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Why this coupon cannot be used on `subtotal` at `now`, if it can't
    pub fn rejection(&self, subtotal: Decimal, now: DateTime<Utc>) -> Option<String> {
        if !self.active {
            return Some("coupon is not active".to_string());
        }
        if self.expires_at.is_some_and(|at| at < now) {
            return Some("coupon has expired".to_string());
        }
        if self.usage_limit.is_some_and(|limit| self.usage_count >= limit) {
            return Some("coupon usage limit reached".to_string());
        }
        if subtotal < self.min_order {
            return Some(format!("minimum order of {} not met", self.min_order));
        }
        None
    }

    /// Discount on `subtotal`, never more than the subtotal itself
    pub fn discount_for(&self, subtotal: Decimal) -> Decimal {
        let raw = match self.discount_type {
            DiscountType::Percentage => {
                let amount = subtotal * self.value / Decimal::ONE_HUNDRED;
                self.max_discount.map_or(amount, |cap| amount.min(cap))
            }
            DiscountType::Fixed => self.value,
        };
        round_money(raw.min(subtotal).max(Decimal::ZERO))
    }
}

#[derive(Debug, Clone, Default)]
pub struct CouponPatch {
    pub usage_count: Option<u32>,
    pub redeemed_orders: Option<Vec<String>>,
    pub active: Option<bool>,
}

impl Entity for Coupon {
    type Patch = CouponPatch;
    const TABLE: &'static str = "coupons";
    const NAME: &'static str = "Coupon";

    fn id(&self) -> &str {
        &self.code
    }

    fn to_row(&self) -> CheckoutResult<Row> {
        let mut row = Row::new();
        row.insert("id".into(), json!(self.code));
        row.insert("code".into(), json!(self.code));
        row.insert("discount_type".into(), json!(self.discount_type.as_str()));
        row.insert("value".into(), decimal_value(self.value));
        row.insert("max_discount".into(), json!(self.max_discount.map(|d| d.to_string())));
        row.insert("min_order".into(), decimal_value(self.min_order));
        row.insert("usage_limit".into(), json!(self.usage_limit));
        row.insert("usage_count".into(), json!(self.usage_count));
        row.insert(
            "expires_at".into(),
            self.expires_at.map(datetime_value).unwrap_or_default(),
        );
        row.insert("active".into(), json!(self.active));
        row.insert("redeemed_orders".into(), json_value(&self.redeemed_orders)?);
        row.insert("created_at".into(), datetime_value(self.created_at));
        row.insert("updated_at".into(), datetime_value(self.updated_at));
        Ok(row)
    }

    fn from_row(row: &Row) -> CheckoutResult<Self> {
        Ok(Self {
            code: get_str(row, "code")?,
            discount_type: get_json(row, "discount_type")?,
            value: get_decimal(row, "value")?,
            max_discount: get_opt_decimal(row, "max_discount")?,
            min_order: get_decimal(row, "min_order")?,
            usage_limit: get_opt_u32(row, "usage_limit")?,
            usage_count: get_u32(row, "usage_count")?,
            expires_at: get_opt_datetime(row, "expires_at")?,
            active: get_bool(row, "active")?,
            redeemed_orders: get_json(row, "redeemed_orders")?,
            created_at: get_datetime(row, "created_at")?,
            updated_at: get_datetime(row, "updated_at")?,
        })
    }

    fn patch_row(patch: &CouponPatch) -> CheckoutResult<Row> {
        let mut row = Row::new();
        put_opt(&mut row, "usage_count", patch.usage_count.map(|v| json!(v)));
        put_opt(
            &mut row,
            "redeemed_orders",
            patch.redeemed_orders.as_ref().map(json_value).transpose()?,
        );
        put_opt(&mut row, "active", patch.active.map(|v| json!(v)));
        Ok(row)
    }

    fn stamp_patch(row: &mut Row) {
        row.insert("updated_at".into(), datetime_value(timestamp_now()));
    }
}

pub type CouponRepository = Repository<Coupon>;

impl Repository<Coupon> {
    pub async fn find_by_code(&self, code: &str) -> CheckoutResult<Option<Coupon>> {
        self.find_by_id(&normalize_code(code)).await
    }

    pub async fn seed(&self, catalog: &CouponCatalog) -> CheckoutResult<usize> {
        let mut inserted = 0;
        for coupon in &catalog.coupons {
            let mut coupon = coupon.clone();
            coupon.code = normalize_code(&coupon.code);
            if !self.exists(&coupon.code).await? {
                self.create(&coupon).await?;
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

/// Seed coupons (loaded from config)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CouponCatalog {
    #[serde(default)]
    pub coupons: Vec<Coupon>,
}

impl CouponCatalog {
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}

/// Result of checking a code against a subtotal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CouponValidation {
    pub code: String,
    pub valid: bool,
    pub discount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CouponValidation {
    pub fn accepted(code: impl Into<String>, discount: Decimal) -> Self {
        Self {
            code: code.into(),
            valid: true,
            discount,
            reason: None,
        }
    }

    pub fn rejected(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            valid: false,
            discount: Decimal::ZERO,
            reason: Some(reason.into()),
        }
    }
}

/// Coupon collaborator used by the orchestrator
#[async_trait]
pub trait CouponService: Send + Sync {
    /// Check `code` against `subtotal` and compute its discount
    async fn validate(&self, code: &str, subtotal: Decimal) -> CheckoutResult<CouponValidation>;

    /// Count one use against `order_id`. Repeating an order id is a no-op.
    async fn record_usage(&self, code: &str, order_id: &str) -> CheckoutResult<()>;
}

pub type SharedCouponService = Arc<dyn CouponService>;

pub struct RepositoryCouponService {
    coupons: Arc<CouponRepository>,
    logger: Logger,
}

impl RepositoryCouponService {
    pub fn new(coupons: Arc<CouponRepository>, logger: Logger) -> Self {
        Self {
            coupons,
            logger: logger.for_component("coupon"),
        }
    }
}

#[async_trait]
impl CouponService for RepositoryCouponService {
    async fn validate(&self, code: &str, subtotal: Decimal) -> CheckoutResult<CouponValidation> {
        let normalized = normalize_code(code);
        let Some(coupon) = self.coupons.find_by_code(&normalized).await? else {
            return Ok(CouponValidation::rejected(normalized, "unknown coupon code"));
        };

        if let Some(reason) = coupon.rejection(subtotal, Utc::now()) {
            self.logger.debug_with(
                "coupon rejected",
                json!({ "code": normalized, "reason": reason }),
            );
            return Ok(CouponValidation::rejected(normalized, reason));
        }

        Ok(CouponValidation::accepted(normalized, coupon.discount_for(subtotal)))
    }

    async fn record_usage(&self, code: &str, order_id: &str) -> CheckoutResult<()> {
        let normalized = normalize_code(code);
        let redemption_failed = |message: &str| CheckoutError::CouponRedemptionFailed {
            code: normalized.clone(),
            message: message.to_string(),
        };

        let coupon = self
            .coupons
            .modify(&normalized, |coupon| {
                if coupon.redeemed_orders.iter().any(|o| o == order_id) {
                    return Ok(CouponPatch::default());
                }
                if coupon.usage_limit.is_some_and(|limit| coupon.usage_count >= limit) {
                    return Err(redemption_failed("usage limit reached"));
                }

                let mut redeemed = coupon.redeemed_orders.clone();
                redeemed.push(order_id.to_string());
                Ok(CouponPatch {
                    usage_count: Some(coupon.usage_count + 1),
                    redeemed_orders: Some(redeemed),
                    active: None,
                })
            })
            .await?
            .ok_or_else(|| redemption_failed("coupon no longer exists"))?;

        self.logger.info_with(
            "coupon usage recorded",
            json!({ "code": normalized, "order_id": order_id, "usage_count": coupon.usage_count }),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::LogLevel;
    use crate::repository::MemoryDatastore;
    use chrono::Duration;

    async fn service(coupons: &[Coupon]) -> (RepositoryCouponService, Arc<CouponRepository>) {
        let repo = Arc::new(Repository::new(Arc::new(MemoryDatastore::new())));
        for c in coupons {
            repo.create(c).await.unwrap();
        }
        (
            RepositoryCouponService::new(Arc::clone(&repo), Logger::new(LogLevel::Debug, 50)),
            repo,
        )
    }

    #[test]
    fn test_percentage_discount_is_capped() {
        let coupon = Coupon::percentage("save20", Decimal::from(20))
            .with_max_discount(Decimal::from(25_000));
        assert_eq!(coupon.discount_for(Decimal::from(100_000)), Decimal::from(20_000));
        assert_eq!(coupon.discount_for(Decimal::from(500_000)), Decimal::from(25_000));
    }

    #[test]
    fn test_fixed_discount_never_exceeds_subtotal() {
        let coupon = Coupon::fixed("flat50k", Decimal::from(50_000));
        assert_eq!(coupon.discount_for(Decimal::from(30_000)), Decimal::from(30_000));
        assert_eq!(coupon.discount_for(Decimal::from(80_000)), Decimal::from(50_000));
    }

    #[tokio::test]
    async fn test_validate_rules() {
        let now = Utc::now();
        let (svc, _) = service(&[
            Coupon::percentage("WELCOME10", Decimal::from(10)).with_min_order(Decimal::from(100_000)),
            Coupon::fixed("OLD", Decimal::from(5_000)).expiring_at(now - Duration::days(1)),
            Coupon::fixed("USEDUP", Decimal::from(5_000)).with_usage_limit(0),
        ])
        .await;

        let ok = svc.validate("welcome10", Decimal::from(175_000)).await.unwrap();
        assert!(ok.valid);
        assert_eq!(ok.code, "WELCOME10");
        assert_eq!(ok.discount, Decimal::from(17_500));

        let low = svc.validate("WELCOME10", Decimal::from(50_000)).await.unwrap();
        assert!(!low.valid);
        assert!(low.reason.unwrap().contains("minimum order"));

        assert!(!svc.validate("OLD", Decimal::from(50_000)).await.unwrap().valid);
        assert!(!svc.validate("USEDUP", Decimal::from(50_000)).await.unwrap().valid);
        assert!(!svc.validate("NOPE", Decimal::from(50_000)).await.unwrap().valid);
    }

    #[tokio::test]
    async fn test_record_usage_is_idempotent_per_order() {
        let (svc, repo) = service(&[Coupon::fixed("ONCE", Decimal::from(5_000)).with_usage_limit(2)]).await;

        svc.record_usage("once", "order-1").await.unwrap();
        svc.record_usage("ONCE", "order-1").await.unwrap();

        let coupon = repo.find_by_code("once").await.unwrap().unwrap();
        assert_eq!(coupon.usage_count, 1);
        assert_eq!(coupon.redeemed_orders, vec!["order-1"]);

        svc.record_usage("ONCE", "order-2").await.unwrap();
        let validation = svc.validate("ONCE", Decimal::from(10_000)).await.unwrap();
        assert!(!validation.valid);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_redemptions_are_all_counted() {
        let (svc, repo) = service(&[Coupon::fixed("RACE", Decimal::from(1_000))]).await;
        let svc = Arc::new(svc);

        let tasks: Vec<_> = (0..200)
            .map(|i| {
                let svc = Arc::clone(&svc);
                tokio::spawn(async move { svc.record_usage("race", &format!("order-{}", i)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let coupon = repo.find_by_code("RACE").await.unwrap().unwrap();
        assert_eq!(coupon.usage_count, 200);
        assert_eq!(coupon.redeemed_orders.len(), 200);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_redemptions_respect_usage_limit() {
        let (svc, repo) =
            service(&[Coupon::fixed("FEW", Decimal::from(1_000)).with_usage_limit(5)]).await;
        let svc = Arc::new(svc);

        let tasks: Vec<_> = (0..40)
            .map(|i| {
                let svc = Arc::clone(&svc);
                tokio::spawn(async move { svc.record_usage("FEW", &format!("order-{}", i)).await })
            })
            .collect();

        let mut refused = 0;
        for task in tasks {
            if let Err(e) = task.await.unwrap() {
                assert!(matches!(e, CheckoutError::CouponRedemptionFailed { .. }));
                refused += 1;
            }
        }

        assert_eq!(refused, 35);
        assert_eq!(repo.find_by_code("FEW").await.unwrap().unwrap().usage_count, 5);
    }

    #[tokio::test]
    async fn test_coupon_round_trip_and_seed() {
        let catalog = CouponCatalog::from_toml(
            r#"
            [[coupons]]
            code = "welcome10"
            discount_type = "percentage"
            value = "10"
            max_discount = "50000"
            min_order = "100000"
            usage_limit = 500
            expires_at = "2030-01-01T00:00:00Z"
            "#,
        )
        .unwrap();

        let repo: CouponRepository = Repository::new(Arc::new(MemoryDatastore::new()));
        assert_eq!(repo.seed(&catalog).await.unwrap(), 1);
        assert_eq!(repo.seed(&catalog).await.unwrap(), 0);

        let stored = repo.find_by_code("WELCOME10").await.unwrap().unwrap();
        let mut expected = catalog.coupons[0].clone();
        expected.code = "WELCOME10".into();
        assert_eq!(stored.max_discount, Some(Decimal::from(50_000)));
        assert_eq!(stored.usage_limit, Some(500));
        assert_eq!(stored.code, expected.code);
        assert_eq!(stored.expires_at, expected.expires_at);
    }
}
