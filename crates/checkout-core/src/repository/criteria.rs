//! Criteria search: filters + sort + pagination.
//!
//! Field names are restricted to `[A-Za-z0-9_]` so that backends which
//! splice them into a JSON path never see anything else.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use super::Row;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Case-insensitive substring for strings, membership for arrays
    Contains,
    /// Field equals any element of an array value
    In,
}

/// A single `field <op> value` predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Ne, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Gte, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Lte, value)
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Contains, value)
    }

    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, FilterOp::In, Value::Array(values))
    }

    /// Evaluate against a row. Missing fields behave like JSON null.
    pub fn matches(&self, row: &Row) -> bool {
        let actual = row.get(&self.field).unwrap_or(&Value::Null);
        let numeric = self.value.is_number();

        match self.op {
            FilterOp::Eq => values_equal(actual, &self.value),
            FilterOp::Ne => !values_equal(actual, &self.value),
            FilterOp::Gt => compare_values(actual, &self.value, numeric) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(
                compare_values(actual, &self.value, numeric),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lt => compare_values(actual, &self.value, numeric) == Some(Ordering::Less),
            FilterOp::Lte => matches!(
                compare_values(actual, &self.value, numeric),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::Contains => match (actual, &self.value) {
                (Value::String(haystack), Value::String(needle)) => haystack
                    .to_lowercase()
                    .contains(&needle.to_lowercase()),
                (Value::Array(items), needle) => items.iter().any(|i| values_equal(i, needle)),
                _ => false,
            },
            FilterOp::In => match &self.value {
                Value::Array(options) => options.iter().any(|o| values_equal(actual, o)),
                _ => false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
    /// Compare as numbers (money is stored as decimal strings)
    #[serde(default)]
    pub numeric: bool,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
            numeric: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
            numeric: false,
        }
    }

    pub fn numeric(mut self) -> Self {
        self.numeric = true;
        self
    }

    /// Ordering of two rows under this sort. Rows missing the field go last.
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        let left = a.get(&self.field).filter(|v| !v.is_null());
        let right = b.get(&self.field).filter(|v| !v.is_null());

        match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(l), Some(r)) => {
                let ord = compare_values(l, r, self.numeric).unwrap_or(Ordering::Equal);
                match self.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            }
        }
    }
}

/// 1-based page selector. Always within bounds, however it was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawPagination")]
pub struct Pagination {
    page: u32,
    per_page: u32,
}

/// Unchecked wire shape; clamped on the way in
#[derive(Deserialize)]
struct RawPagination {
    #[serde(default = "first_page")]
    page: u32,
    #[serde(default = "default_per_page")]
    per_page: u32,
}

fn first_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    DEFAULT_PER_PAGE
}

impl From<RawPagination> for Pagination {
    fn from(raw: RawPagination) -> Self {
        Self::new(raw.page, raw.per_page)
    }
}

impl Pagination {
    /// Clamps `page` to at least 1 and `per_page` to `1..=MAX_PER_PAGE`.
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }

    pub fn total_pages(&self, total: u64) -> u32 {
        let pages = total.div_ceil(u64::from(self.per_page.max(1)));
        u32::try_from(pages).unwrap_or(u32::MAX)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(1, DEFAULT_PER_PAGE)
    }
}

/// Filters + sort + pagination
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub sort: Option<Sort>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn page(mut self, page: u32, per_page: u32) -> Self {
        self.pagination = Pagination::new(page, per_page);
        self
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// Field names referenced by filters and sort that fail the identifier check
    pub fn invalid_fields(&self) -> Vec<&str> {
        self.filters
            .iter()
            .map(|f| f.field.as_str())
            .chain(self.sort.iter().map(|s| s.field.as_str()))
            .filter(|f| !is_valid_field(f))
            .collect()
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: u64, pagination: Pagination) -> Self {
        Self {
            data,
            total,
            page: pagination.page(),
            per_page: pagination.per_page(),
            total_pages: pagination.total_pages(total),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            total_pages: self.total_pages,
        }
    }
}

pub fn is_valid_field(field: &str) -> bool {
    !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    if expected.is_number() {
        return match (as_f64(actual), as_f64(expected)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
    }
    actual == expected
}

fn compare_values(a: &Value, b: &Value, numeric: bool) -> Option<Ordering> {
    if numeric {
        return as_f64(a)?.partial_cmp(&as_f64(b)?);
    }
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => as_f64(a)?.partial_cmp(&as_f64(b)?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
