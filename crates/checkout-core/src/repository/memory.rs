//! In-process datastore.
//!
//! Tables are insertion-ordered vectors behind a single `RwLock`; every
//! operation takes the lock once, which gives the per-call atomicity the
//! [`Datastore`] contract asks for.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{Criteria, Datastore, Filter, Row, RowUpdate};
use crate::error::{CheckoutError, CheckoutResult};

#[derive(Default)]
struct Table {
    order: Vec<String>,
    rows: HashMap<String, Row>,
}

impl Table {
    fn ordered(&self) -> impl Iterator<Item = &Row> {
        self.order.iter().filter_map(|id| self.rows.get(id))
    }
}

#[derive(Default)]
pub struct MemoryDatastore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn insert(&self, table: &str, id: &str, row: Row) -> CheckoutResult<Row> {
        let mut tables = self.tables.write();
        let table = tables.entry(table.to_string()).or_default();
        if table.rows.contains_key(id) {
            return Err(CheckoutError::Storage(format!("duplicate id: {}", id)));
        }
        table.order.push(id.to_string());
        table.rows.insert(id.to_string(), row.clone());
        Ok(row)
    }

    async fn get(&self, table: &str, id: &str) -> CheckoutResult<Option<Row>> {
        Ok(self
            .tables
            .read()
            .get(table)
            .and_then(|t| t.rows.get(id))
            .cloned())
    }

    async fn list(&self, table: &str) -> CheckoutResult<Vec<Row>> {
        Ok(self
            .tables
            .read()
            .get(table)
            .map(|t| t.ordered().cloned().collect())
            .unwrap_or_default())
    }

    async fn patch(&self, table: &str, id: &str, changes: Row) -> CheckoutResult<Option<Row>> {
        let mut tables = self.tables.write();
        let Some(row) = tables.get_mut(table).and_then(|t| t.rows.get_mut(id)) else {
            return Ok(None);
        };
        row.extend(changes);
        Ok(Some(row.clone()))
    }

    async fn modify(
        &self,
        table: &str,
        id: &str,
        apply: &RowUpdate<'_>,
    ) -> CheckoutResult<Option<Row>> {
        let mut tables = self.tables.write();
        let Some(row) = tables.get_mut(table).and_then(|t| t.rows.get_mut(id)) else {
            return Ok(None);
        };
        let changes = apply(row)?;
        row.extend(changes);
        Ok(Some(row.clone()))
    }

    async fn patch_where(
        &self,
        table: &str,
        filters: &[Filter],
        changes: Row,
    ) -> CheckoutResult<u64> {
        let mut tables = self.tables.write();
        let Some(table) = tables.get_mut(table) else {
            return Ok(0);
        };

        let mut touched = 0;
        for row in table.rows.values_mut() {
            if filters.iter().all(|f| f.matches(row)) {
                row.extend(changes.clone());
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn remove(&self, table: &str, id: &str) -> CheckoutResult<bool> {
        let mut tables = self.tables.write();
        let Some(table) = tables.get_mut(table) else {
            return Ok(false);
        };
        if table.rows.remove(id).is_none() {
            return Ok(false);
        }
        table.order.retain(|existing| existing != id);
        Ok(true)
    }

    async fn query(&self, table: &str, criteria: &Criteria) -> CheckoutResult<(Vec<Row>, u64)> {
        let tables = self.tables.read();
        let Some(table) = tables.get(table) else {
            return Ok((Vec::new(), 0));
        };

        let mut matched: Vec<&Row> = table.ordered().filter(|r| criteria.matches(r)).collect();
        if let Some(sort) = &criteria.sort {
            // stable sort keeps insertion order for ties
            matched.sort_by(|a, b| sort.compare(a, b));
        }

        let total = matched.len() as u64;
        let offset = usize::try_from(criteria.pagination.offset()).unwrap_or(usize::MAX);
        let page = matched
            .into_iter()
            .skip(offset)
            .take(criteria.pagination.per_page() as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> CheckoutResult<u64> {
        Ok(self
            .tables
            .read()
            .get(table)
            .map(|t| t.ordered().filter(|r| filters.iter().all(|f| f.matches(r))).count() as u64)
            .unwrap_or(0))
    }
}
