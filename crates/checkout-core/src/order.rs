//! # Order Types
//!
//! Persisted orders and their status lifecycle.
//!
//! ```text
//! pending ─▶ confirmed ─▶ processing ─▶ shipped ─▶ delivered
//!    │           │             │
//!    └───────────┴─────────────┴──▶ cancelled
//! ```
//!
//! Line items keep the unit price paid at checkout; they are never
//! recomputed from the current catalog.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{CheckoutError, CheckoutResult};
use crate::money::Currency;
use crate::repository::row::{
    datetime_value, decimal_value, get_datetime, get_decimal, get_json, get_opt_str, get_str,
    json_value, put_opt, timestamp_now,
};
use crate::repository::{Criteria, Entity, Filter, Page, Pagination, Repository, Row, Sort};

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Delivered and cancelled orders never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Forward one step along the lifecycle, or cancel before shipping.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Confirmed, Processing)
                | (Processing, Shipped)
                | (Shipped, Delivered)
                | (Pending | Confirmed | Processing, Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = CheckoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(CheckoutError::InvalidRequest(format!(
                "unknown order status: {}",
                other
            ))),
        }
    }
}

/// Where the parcel goes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ShippingAddress {
    pub recipient: String,
    pub phone: String,
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub province: String,
    pub postal_code: String,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "ID".to_string()
}

impl ShippingAddress {
    /// Names of required fields that are blank
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("recipient", &self.recipient),
            ("phone", &self.phone),
            ("line1", &self.line1),
            ("city", &self.city),
            ("postal_code", &self.postal_code),
            ("country", &self.country),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

/// A purchased line, priced at checkout time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    /// Denormalized for display
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// A paid, persisted order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Order id; equal to the draft id used as the payment idempotency context
    pub id: String,
    pub order_number: String,
    pub user_id: String,
    pub items: Vec<OrderItem>,
    pub shipping_method: String,
    pub shipping_cost: Decimal,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub transaction_id: Option<String>,
    pub currency: Currency,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub coupon_code: Option<String>,
    pub customer_email: Option<String>,
    pub notes: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Generate a fresh draft id
    pub fn draft_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Human-facing order number, e.g. `ORD-20261019-1A2B3C4D`
    pub fn order_number_for(id: &str, at: DateTime<Utc>) -> String {
        let suffix: String = id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(8)
            .collect::<String>()
            .to_uppercase();
        format!("ORD-{}-{}", at.format("%Y%m%d"), suffix)
    }

    pub fn items_subtotal(&self) -> Decimal {
        self.items.iter().map(OrderItem::line_total).sum()
    }

    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// `subtotal + shipping + tax - discount`
    pub fn expected_total(&self) -> Decimal {
        self.subtotal + self.shipping_cost + self.tax - self.discount
    }
}

/// Partial order update
#[derive(Debug, Clone, Default)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub transaction_id: Option<String>,
    pub notes: Option<String>,
}

impl Entity for Order {
    type Patch = OrderPatch;
    const TABLE: &'static str = "orders";
    const NAME: &'static str = "Order";

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> CheckoutResult<Row> {
        let mut row = Row::new();
        row.insert("id".into(), json!(self.id));
        row.insert("order_number".into(), json!(self.order_number));
        row.insert("user_id".into(), json!(self.user_id));
        row.insert("items".into(), json_value(&self.items)?);
        row.insert("shipping_method".into(), json!(self.shipping_method));
        row.insert("shipping_cost".into(), decimal_value(self.shipping_cost));
        row.insert("shipping_address".into(), json_value(&self.shipping_address)?);
        row.insert("payment_method".into(), json!(self.payment_method));
        row.insert("transaction_id".into(), json!(self.transaction_id));
        row.insert("currency".into(), json!(self.currency.as_str()));
        row.insert("subtotal".into(), decimal_value(self.subtotal));
        row.insert("tax".into(), decimal_value(self.tax));
        row.insert("discount".into(), decimal_value(self.discount));
        row.insert("total".into(), decimal_value(self.total));
        row.insert("coupon_code".into(), json!(self.coupon_code));
        row.insert("customer_email".into(), json!(self.customer_email));
        row.insert("notes".into(), json!(self.notes));
        row.insert("status".into(), json!(self.status.as_str()));
        row.insert("created_at".into(), datetime_value(self.created_at));
        row.insert("updated_at".into(), datetime_value(self.updated_at));
        Ok(row)
    }

    fn from_row(row: &Row) -> CheckoutResult<Self> {
        let currency = get_str(row, "currency")?
            .parse::<Currency>()
            .map_err(CheckoutError::Serialization)?;

        Ok(Self {
            id: get_str(row, "id")?,
            order_number: get_str(row, "order_number")?,
            user_id: get_str(row, "user_id")?,
            items: get_json(row, "items")?,
            shipping_method: get_str(row, "shipping_method")?,
            shipping_cost: get_decimal(row, "shipping_cost")?,
            shipping_address: get_json(row, "shipping_address")?,
            payment_method: get_str(row, "payment_method")?,
            transaction_id: get_opt_str(row, "transaction_id"),
            currency,
            subtotal: get_decimal(row, "subtotal")?,
            tax: get_decimal(row, "tax")?,
            discount: get_decimal(row, "discount")?,
            total: get_decimal(row, "total")?,
            coupon_code: get_opt_str(row, "coupon_code"),
            customer_email: get_opt_str(row, "customer_email"),
            notes: get_opt_str(row, "notes"),
            status: get_str(row, "status")?.parse()?,
            created_at: get_datetime(row, "created_at")?,
            updated_at: get_datetime(row, "updated_at")?,
        })
    }

    fn patch_row(patch: &OrderPatch) -> CheckoutResult<Row> {
        let mut row = Row::new();
        put_opt(&mut row, "status", patch.status.map(|s| json!(s.as_str())));
        put_opt(&mut row, "transaction_id", patch.transaction_id.as_ref().map(|v| json!(v)));
        put_opt(&mut row, "notes", patch.notes.as_ref().map(|v| json!(v)));
        Ok(row)
    }

    fn stamp_patch(row: &mut Row) {
        row.insert("updated_at".into(), datetime_value(timestamp_now()));
    }
}

pub type OrderRepository = Repository<Order>;

impl Repository<Order> {
    /// A user's orders, newest first
    pub async fn find_by_user(
        &self,
        user_id: &str,
        pagination: Pagination,
    ) -> CheckoutResult<Page<Order>> {
        let criteria = Criteria {
            filters: vec![Filter::eq("user_id", user_id)],
            sort: Some(Sort::desc("created_at")),
            pagination,
        };
        self.find_by_criteria(&criteria).await
    }

    pub async fn find_by_transaction(&self, transaction_id: &str) -> CheckoutResult<Option<Order>> {
        let criteria = Criteria::new()
            .filter(Filter::eq("transaction_id", transaction_id))
            .page(1, 1);
        Ok(self.find_by_criteria(&criteria).await?.data.into_iter().next())
    }

    /// Move an order along its lifecycle, rejecting illegal transitions.
    ///
    /// The transition is checked against the stored status at write time,
    /// so two racing updates cannot both leave the same state.
    pub async fn update_status(&self, id: &str, next: OrderStatus) -> CheckoutResult<Order> {
        self.modify(id, |order| {
            if !order.status.can_transition_to(next) {
                return Err(CheckoutError::InvalidStatusTransition {
                    from: order.status.to_string(),
                    to: next.to_string(),
                });
            }
            Ok(OrderPatch {
                status: Some(next),
                ..Default::default()
            })
        })
        .await?
        .ok_or_else(|| CheckoutError::NotFound {
            entity: Order::NAME,
            id: id.to_string(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::repository::MemoryDatastore;
    use std::sync::Arc;

    pub(crate) fn address() -> ShippingAddress {
        ShippingAddress {
            recipient: "Siti Rahma".into(),
            phone: "+62 812 0000 0000".into(),
            line1: "Jl. Merdeka 10".into(),
            line2: None,
            city: "Bandung".into(),
            province: "Jawa Barat".into(),
            postal_code: "40111".into(),
            country: "ID".into(),
        }
    }

    pub(crate) fn sample_order(user_id: &str) -> Order {
        let id = Order::draft_id();
        let now = timestamp_now();
        Order {
            order_number: Order::order_number_for(&id, now),
            id,
            user_id: user_id.into(),
            items: vec![OrderItem {
                product_id: "shirt".into(),
                product_name: "Batik Shirt".into(),
                quantity: 2,
                unit_price: Decimal::from(87_500),
                size: Some("M".into()),
                color: None,
            }],
            shipping_method: "express".into(),
            shipping_cost: Decimal::from(48_750),
            shipping_address: address(),
            payment_method: "stripe".into(),
            transaction_id: Some("pi_123".into()),
            currency: Currency::IDR,
            subtotal: Decimal::from(175_000),
            tax: Decimal::ZERO,
            discount: Decimal::ZERO,
            total: Decimal::from(223_750),
            coupon_code: None,
            customer_email: Some("siti@example.com".into()),
            notes: None,
            status: OrderStatus::Confirmed,
            created_at: now,
            updated_at: now,
        }
    }

    fn repo() -> OrderRepository {
        Repository::new(Arc::new(MemoryDatastore::new()))
    }

    #[test]
    fn test_status_transitions() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Processing));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(Processing.can_transition_to(Cancelled));

        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Shipped.can_transition_to(Cancelled));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Confirmed));
    }

    #[test]
    fn test_missing_address_fields() {
        let mut addr = address();
        assert!(addr.missing_fields().is_empty());

        addr.city = "  ".into();
        addr.postal_code.clear();
        assert_eq!(addr.missing_fields(), vec!["city", "postal_code"]);
    }

    #[test]
    fn test_order_number_format() {
        let at = DateTime::parse_from_rfc3339("2026-10-19T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let number = Order::order_number_for("1a2b3c4d-5e6f-0000-0000-000000000000", at);
        assert_eq!(number, "ORD-20261019-1A2B3C4D");
    }

    #[test]
    fn test_expected_total() {
        let order = sample_order("u1");
        assert_eq!(order.items_subtotal(), order.subtotal);
        assert_eq!(order.expected_total(), order.total);
        assert_eq!(order.item_count(), 2);
    }

    #[tokio::test]
    async fn test_order_round_trip() {
        let repo = repo();
        let order = sample_order("u1");

        repo.create(&order).await.unwrap();
        let loaded = repo.find_by_id(&order.id).await.unwrap().unwrap();

        assert_eq!(loaded, order);
    }

    #[tokio::test]
    async fn test_update_status_enforces_lifecycle() {
        let repo = repo();
        let order = repo.create(&sample_order("u1")).await.unwrap();

        let processing = repo.update_status(&order.id, OrderStatus::Processing).await.unwrap();
        assert_eq!(processing.status, OrderStatus::Processing);
        assert_eq!(processing.transaction_id, order.transaction_id);

        let err = repo
            .update_status(&order.id, OrderStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidStatusTransition { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_transitions_from_same_state() {
        let repo = repo();
        let order = repo.create(&sample_order("u1")).await.unwrap();
        let order = repo.update_status(&order.id, OrderStatus::Processing).await.unwrap();

        // processing -> shipped and processing -> cancelled are both legal,
        // but only one may win
        let tasks: Vec<_> = (0..50)
            .map(|i| {
                let repo = repo.clone();
                let id = order.id.clone();
                let next = if i % 2 == 0 {
                    OrderStatus::Shipped
                } else {
                    OrderStatus::Cancelled
                };
                tokio::spawn(async move { repo.update_status(&id, next).await })
            })
            .collect();

        let mut winners = Vec::new();
        for task in tasks {
            if let Ok(order) = task.await.unwrap() {
                winners.push(order.status);
            }
        }

        let stored = repo.get(&order.id).await.unwrap();
        assert_eq!(winners, vec![stored.status]);
    }

    #[tokio::test]
    async fn test_find_by_user_and_transaction() {
        let repo = repo();
        let first = repo.create(&sample_order("u1")).await.unwrap();
        repo.create(&sample_order("u2")).await.unwrap();

        let page = repo.find_by_user("u1", Pagination::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].id, first.id);

        let found = repo.find_by_transaction("pi_123").await.unwrap();
        assert!(found.is_some());
        assert!(repo.find_by_transaction("pi_missing").await.unwrap().is_none());
    }
}
