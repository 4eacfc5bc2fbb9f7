//! # Catalog Types
//!
//! Products as the settlement pipeline sees them (price, stock, weight)
//! and the cart items that reference them.
//! Seed catalogs are loaded from `config/products.toml`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{CheckoutError, CheckoutResult};
use crate::repository::row::{
    datetime_value, decimal_value, get_bool, get_datetime, get_decimal, get_json, get_opt_str,
    get_str, get_u32, put_opt, timestamp_now,
};
use crate::repository::{Entity, Repository, Row};

/// A product in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Unique product identifier (e.g., "batik-shirt-blue")
    pub id: String,

    /// Display name
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Unit price in major currency units
    pub price: Decimal,

    /// Units on hand
    #[serde(default)]
    pub stock: u32,

    /// Shipping weight per unit
    #[serde(default)]
    pub weight_kg: Decimal,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub sizes: Vec<String>,

    #[serde(default)]
    pub colors: Vec<String>,

    /// Whether this product is active and available for purchase
    #[serde(default = "default_true")]
    pub active: bool,

    #[serde(default = "timestamp_now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "timestamp_now")]
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Product {
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: Decimal, stock: u32) -> Self {
        let now = timestamp_now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            price,
            stock,
            weight_kg: Decimal::ZERO,
            category: None,
            sizes: Vec::new(),
            colors: Vec::new(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder: set per-unit weight
    pub fn with_weight(mut self, weight_kg: Decimal) -> Self {
        self.weight_kg = weight_kg;
        self
    }

    /// Builder: set description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Builder: set category
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Builder: set variants
    pub fn with_variants(mut self, sizes: &[&str], colors: &[&str]) -> Self {
        self.sizes = sizes.iter().map(|s| s.to_string()).collect();
        self.colors = colors.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Builder: mark inactive
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn is_purchasable(&self, quantity: u32) -> bool {
        self.active && quantity > 0 && self.stock >= quantity
    }
}

/// Partial product update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub stock: Option<u32>,
    pub weight_kg: Option<Decimal>,
    pub active: Option<bool>,
}

impl Entity for Product {
    type Patch = ProductPatch;
    const TABLE: &'static str = "products";
    const NAME: &'static str = "Product";

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> CheckoutResult<Row> {
        let mut row = Row::new();
        row.insert("id".into(), json!(self.id));
        row.insert("name".into(), json!(self.name));
        row.insert("description".into(), json!(self.description));
        row.insert("price".into(), decimal_value(self.price));
        row.insert("stock".into(), json!(self.stock));
        row.insert("weight_kg".into(), decimal_value(self.weight_kg));
        row.insert("category".into(), json!(self.category));
        row.insert("sizes".into(), json!(self.sizes));
        row.insert("colors".into(), json!(self.colors));
        row.insert("active".into(), json!(self.active));
        row.insert("created_at".into(), datetime_value(self.created_at));
        row.insert("updated_at".into(), datetime_value(self.updated_at));
        Ok(row)
    }

    fn from_row(row: &Row) -> CheckoutResult<Self> {
        Ok(Self {
            id: get_str(row, "id")?,
            name: get_str(row, "name")?,
            description: get_opt_str(row, "description").unwrap_or_default(),
            price: get_decimal(row, "price")?,
            stock: get_u32(row, "stock")?,
            weight_kg: get_decimal(row, "weight_kg")?,
            category: get_opt_str(row, "category"),
            sizes: get_json(row, "sizes")?,
            colors: get_json(row, "colors")?,
            active: get_bool(row, "active")?,
            created_at: get_datetime(row, "created_at")?,
            updated_at: get_datetime(row, "updated_at")?,
        })
    }

    fn patch_row(patch: &ProductPatch) -> CheckoutResult<Row> {
        let mut row = Row::new();
        put_opt(&mut row, "name", patch.name.as_ref().map(|v| json!(v)));
        put_opt(&mut row, "description", patch.description.as_ref().map(|v| json!(v)));
        put_opt(&mut row, "price", patch.price.map(decimal_value));
        put_opt(&mut row, "stock", patch.stock.map(|v| json!(v)));
        put_opt(&mut row, "weight_kg", patch.weight_kg.map(decimal_value));
        put_opt(&mut row, "active", patch.active.map(|v| json!(v)));
        Ok(row)
    }

    fn stamp_patch(row: &mut Row) {
        row.insert("updated_at".into(), datetime_value(timestamp_now()));
    }
}

pub type ProductRepository = Repository<Product>;

impl Repository<Product> {
    /// Take `quantity` units off the shelf.
    ///
    /// The stock check and the write happen in one datastore step, so
    /// concurrent decrements never oversell.
    pub async fn decrement_stock(&self, product_id: &str, quantity: u32) -> CheckoutResult<Product> {
        self.modify(product_id, |product| {
            if product.stock < quantity {
                return Err(CheckoutError::InsufficientStock {
                    product_id: product_id.to_string(),
                    requested: quantity,
                    available: product.stock,
                });
            }
            Ok(ProductPatch {
                stock: Some(product.stock - quantity),
                ..Default::default()
            })
        })
        .await?
        .ok_or_else(|| CheckoutError::ProductNotFound {
            product_id: product_id.to_string(),
        })
    }

    /// Insert every product in the catalog that is not already stored.
    pub async fn seed(&self, catalog: &ProductCatalog) -> CheckoutResult<usize> {
        let mut inserted = 0;
        for product in &catalog.products {
            if !self.exists(&product.id).await? {
                self.create(product).await?;
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

/// A line in the shopper's cart. Read-only to the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: String,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl CartItem {
    pub fn new(product_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            size: None,
            color: None,
        }
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Seed catalog (loaded from config)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductCatalog {
    #[serde(default)]
    pub products: Vec<Product>,
}

impl ProductCatalog {
    /// Load catalog from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}
