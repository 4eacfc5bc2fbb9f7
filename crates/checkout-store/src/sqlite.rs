//! SQLite-backed [`Datastore`].
//!
//! One `documents` table holds every collection; each row is a JSON object
//! keyed by `(collection, id)`. `seq` preserves insertion order.

use async_trait::async_trait;
use checkout_core::{CheckoutResult, Criteria, Datastore, Filter, Row, RowUpdate};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::sql::{bind_all, page_query, WhereClause};

/// Compare-and-swap attempts before `modify` gives up on a contended row
const MAX_MODIFY_ATTEMPTS: u32 = 100;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS documents (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    doc TEXT NOT NULL,
    UNIQUE (collection, id)
)";

/// Datastore over a SQLite connection pool
#[derive(Clone)]
pub struct SqliteDatastore {
    pool: SqlitePool,
}

impl SqliteDatastore {
    /// Open (creating if missing) the database at `url` and apply the schema.
    ///
    /// `sqlite::memory:` gets a single long-lived connection, since each
    /// connection to an in-memory database sees its own empty database.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");

        let mut options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let mut pool_options = SqlitePoolOptions::new();
        pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .idle_timeout(None::<std::time::Duration>)
                .max_lifetime(None::<std::time::Duration>)
        } else {
            pool_options.max_connections(5)
        };

        let pool = pool_options.connect_with(options).await?;
        let store = Self::from_pool(pool);
        store.migrate().await?;

        info!("SQLite datastore ready: {}", url);
        Ok(store)
    }

    /// Wrap an existing pool. Call [`migrate`](Self::migrate) before use.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        sqlx::query("PRAGMA busy_timeout = 5000")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn decode(table: &str, id: &str, doc: &str) -> StoreResult<Row> {
    match serde_json::from_str::<Value>(doc) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(other) => Err(StoreError::Corrupt {
            table: table.to_string(),
            id: id.to_string(),
            message: format!("expected object, found {}", other),
        }),
        Err(e) => Err(StoreError::Corrupt {
            table: table.to_string(),
            id: id.to_string(),
            message: e.to_string(),
        }),
    }
}

fn encode(row: &Row) -> String {
    Value::Object(row.clone()).to_string()
}

impl SqliteDatastore {
    async fn insert_row(&self, table: &str, id: &str, row: Row) -> StoreResult<Row> {
        let result = sqlx::query("INSERT INTO documents (collection, id, doc) VALUES (?, ?, ?)")
            .bind(table)
            .bind(id)
            .bind(encode(&row))
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(row),
            Err(sqlx::Error::Database(ref e)) if e.is_unique_violation() => {
                Err(StoreError::Duplicate {
                    table: table.to_string(),
                    id: id.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_row(&self, table: &str, id: &str) -> StoreResult<Option<Row>> {
        let doc: Option<(String,)> =
            sqlx::query_as("SELECT doc FROM documents WHERE collection = ? AND id = ?")
                .bind(table)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        doc.map(|(doc,)| decode(table, id, &doc)).transpose()
    }

    async fn list_rows(&self, table: &str) -> StoreResult<Vec<Row>> {
        let docs: Vec<(String, String)> =
            sqlx::query_as("SELECT id, doc FROM documents WHERE collection = ? ORDER BY seq")
                .bind(table)
                .fetch_all(&self.pool)
                .await?;

        docs.iter().map(|(id, doc)| decode(table, id, doc)).collect()
    }

    async fn patch_row(&self, table: &str, id: &str, changes: Row) -> StoreResult<Option<Row>> {
        let mut tx = self.pool.begin().await?;

        let doc: Option<(String,)> =
            sqlx::query_as("SELECT doc FROM documents WHERE collection = ? AND id = ?")
                .bind(table)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((doc,)) = doc else {
            return Ok(None);
        };

        let mut row = decode(table, id, &doc)?;
        row.extend(changes);

        sqlx::query("UPDATE documents SET doc = ? WHERE collection = ? AND id = ?")
            .bind(encode(&row))
            .bind(table)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(row))
    }

    async fn get_doc(&self, table: &str, id: &str) -> StoreResult<Option<String>> {
        let doc: Option<(String,)> =
            sqlx::query_as("SELECT doc FROM documents WHERE collection = ? AND id = ?")
                .bind(table)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(doc.map(|(doc,)| doc))
    }

    /// Replace the document only if it still reads `expected`
    async fn swap_doc(&self, table: &str, id: &str, expected: &str, row: &Row) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE documents SET doc = ? WHERE collection = ? AND id = ? AND doc = ?",
        )
        .bind(encode(row))
        .bind(table)
        .bind(id)
        .bind(expected)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn modify_row(
        &self,
        table: &str,
        id: &str,
        apply: &RowUpdate<'_>,
    ) -> CheckoutResult<Option<Row>> {
        for attempt in 1..=MAX_MODIFY_ATTEMPTS {
            let Some(doc) = self.get_doc(table, id).await? else {
                return Ok(None);
            };

            let mut row = decode(table, id, &doc)?;
            let changes = apply(&row)?;
            if changes.is_empty() {
                return Ok(Some(row));
            }
            row.extend(changes);

            if self.swap_doc(table, id, &doc, &row).await? {
                return Ok(Some(row));
            }
            debug!("Concurrent write to {}/{}, retrying (attempt {})", table, id, attempt);
        }

        Err(StoreError::Contended {
            table: table.to_string(),
            id: id.to_string(),
        }
        .into())
    }

    async fn patch_matching(&self, table: &str, filters: &[Filter], changes: Row) -> StoreResult<u64> {
        let clause = WhereClause::build(table, filters)?;
        let select = format!("SELECT id, doc FROM documents WHERE {}", clause.sql);

        let mut tx = self.pool.begin().await?;
        let matched: Vec<(String, String)> = bind_all(sqlx::query_as(&select), &clause.binds)
            .fetch_all(&mut *tx)
            .await?;

        for (id, doc) in &matched {
            let mut row = decode(table, id, doc)?;
            row.extend(changes.clone());
            sqlx::query("UPDATE documents SET doc = ? WHERE collection = ? AND id = ?")
                .bind(encode(&row))
                .bind(table)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!("Patched {} row(s) in {}", matched.len(), table);
        Ok(matched.len() as u64)
    }

    async fn remove_row(&self, table: &str, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(table)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn query_rows(&self, table: &str, criteria: &Criteria) -> StoreResult<(Vec<Row>, u64)> {
        let (count_sql, select_sql, binds) = page_query(table, criteria)?;

        let (total,): (i64,) = bind_all(sqlx::query_as(&count_sql), &binds)
            .fetch_one(&self.pool)
            .await?;

        let pagination = criteria.pagination;
        let docs: Vec<(String, String)> = bind_all(sqlx::query_as(&select_sql), &binds)
            .bind(i64::from(pagination.per_page()))
            .bind(i64::try_from(pagination.offset()).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        let rows = docs
            .iter()
            .map(|(id, doc)| decode(table, id, doc))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok((rows, u64::try_from(total).unwrap_or(0)))
    }

    async fn count_rows(&self, table: &str, filters: &[Filter]) -> StoreResult<u64> {
        let clause = WhereClause::build(table, filters)?;
        let sql = format!("SELECT COUNT(*) FROM documents WHERE {}", clause.sql);
        let (total,): (i64,) = bind_all(sqlx::query_as(&sql), &clause.binds)
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(total).unwrap_or(0))
    }
}

#[async_trait]
impl Datastore for SqliteDatastore {
    async fn insert(&self, table: &str, id: &str, row: Row) -> CheckoutResult<Row> {
        Ok(self.insert_row(table, id, row).await?)
    }

    async fn get(&self, table: &str, id: &str) -> CheckoutResult<Option<Row>> {
        Ok(self.get_row(table, id).await?)
    }

    async fn list(&self, table: &str) -> CheckoutResult<Vec<Row>> {
        Ok(self.list_rows(table).await?)
    }

    async fn patch(&self, table: &str, id: &str, changes: Row) -> CheckoutResult<Option<Row>> {
        Ok(self.patch_row(table, id, changes).await?)
    }

    async fn modify(
        &self,
        table: &str,
        id: &str,
        apply: &RowUpdate<'_>,
    ) -> CheckoutResult<Option<Row>> {
        self.modify_row(table, id, apply).await
    }

    async fn patch_where(
        &self,
        table: &str,
        filters: &[Filter],
        changes: Row,
    ) -> CheckoutResult<u64> {
        Ok(self.patch_matching(table, filters, changes).await?)
    }

    async fn remove(&self, table: &str, id: &str) -> CheckoutResult<bool> {
        Ok(self.remove_row(table, id).await?)
    }

    async fn query(&self, table: &str, criteria: &Criteria) -> CheckoutResult<(Vec<Row>, u64)> {
        Ok(self.query_rows(table, criteria).await?)
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> CheckoutResult<u64> {
        Ok(self.count_rows(table, filters).await?)
    }
}
