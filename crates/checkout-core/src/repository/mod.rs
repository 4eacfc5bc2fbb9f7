//! # Repository
//!
//! Generic data access over a single entity type.
//!
//! ```text
//!   Repository<E: Entity>  ── to_row / from_row ──▶  Arc<dyn Datastore>
//!        │                                                 ▲
//!        │                                ┌────────────────┴───────────┐
//!   OrderRepository, ProductRepository,   │ MemoryDatastore (this crate)│
//!   CouponRepository, ...                 │ SqliteDatastore (store)     │
//!                                         └────────────────────────────┘
//! ```
//!
//! Entities map themselves to rows explicitly; there is no reflection.
//! Partial updates go through each entity's `Patch` type, whose row holds
//! only the fields that were set.

pub mod criteria;
pub mod memory;
pub mod row;

pub use criteria::{Criteria, Filter, FilterOp, Page, Pagination, Sort, SortDirection};
pub use memory::MemoryDatastore;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{CheckoutError, CheckoutResult};

/// Storage row shape: a flat JSON object
pub type Row = serde_json::Map<String, Value>;

/// Read-modify-write step for [`Datastore::modify`]: given the current row,
/// return the changes to merge, or an error to leave the row untouched.
/// May run more than once if the backend retries on conflict.
pub type RowUpdate<'a> = dyn Fn(&Row) -> CheckoutResult<Row> + Send + Sync + 'a;

/// Contract the core requires from a datastore.
///
/// Each call is atomic for the rows it touches; nothing more is promised.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Insert a new row. Fails if `id` already exists in `table`.
    async fn insert(&self, table: &str, id: &str, row: Row) -> CheckoutResult<Row>;

    async fn get(&self, table: &str, id: &str) -> CheckoutResult<Option<Row>>;

    /// All rows in insertion order
    async fn list(&self, table: &str) -> CheckoutResult<Vec<Row>>;

    /// Merge `changes` into an existing row. `None` if the row is missing.
    async fn patch(&self, table: &str, id: &str, changes: Row) -> CheckoutResult<Option<Row>>;

    /// Atomically read a row, compute changes from it and merge them.
    ///
    /// No other write to the same row can land between the read `apply`
    /// sees and the merge. `None` if the row is missing; errors from
    /// `apply` are returned as-is.
    async fn modify(
        &self,
        table: &str,
        id: &str,
        apply: &RowUpdate<'_>,
    ) -> CheckoutResult<Option<Row>>;

    /// Merge `changes` into every row matching all `filters`; returns the count.
    async fn patch_where(
        &self,
        table: &str,
        filters: &[Filter],
        changes: Row,
    ) -> CheckoutResult<u64>;

    /// `false` when nothing was removed
    async fn remove(&self, table: &str, id: &str) -> CheckoutResult<bool>;

    /// Matching rows for the requested page plus the total match count
    async fn query(&self, table: &str, criteria: &Criteria) -> CheckoutResult<(Vec<Row>, u64)>;

    async fn count(&self, table: &str, filters: &[Filter]) -> CheckoutResult<u64>;
}

/// Shared datastore handle
pub type SharedDatastore = Arc<dyn Datastore>;

/// A persisted entity with explicit row mapping.
pub trait Entity: Clone + Send + Sync + Sized + 'static {
    /// Partial update payload
    type Patch: Send + Sync;

    /// Table / collection name
    const TABLE: &'static str;

    /// Human-readable entity name for errors
    const NAME: &'static str;

    fn id(&self) -> &str;

    fn to_row(&self) -> CheckoutResult<Row>;

    fn from_row(row: &Row) -> CheckoutResult<Self>;

    /// Row containing only the fields the patch sets
    fn patch_row(patch: &Self::Patch) -> CheckoutResult<Row>;

    /// Hook for fields every non-empty patch must also touch (e.g. `updated_at`)
    fn stamp_patch(_row: &mut Row) {}
}

/// Generic CRUD + criteria search over one entity type.
pub struct Repository<E: Entity> {
    store: SharedDatastore,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(store: SharedDatastore) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    pub fn store(&self) -> &SharedDatastore {
        &self.store
    }

    pub async fn find_by_id(&self, id: &str) -> CheckoutResult<Option<E>> {
        self.store
            .get(E::TABLE, id)
            .await?
            .map(|row| E::from_row(&row))
            .transpose()
    }

    /// Like `find_by_id` but absence is an error
    pub async fn get(&self, id: &str) -> CheckoutResult<E> {
        self.find_by_id(id).await?.ok_or_else(|| CheckoutError::NotFound {
            entity: E::NAME,
            id: id.to_string(),
        })
    }

    pub async fn find_all(&self) -> CheckoutResult<Vec<E>> {
        self.store
            .list(E::TABLE)
            .await?
            .iter()
            .map(E::from_row)
            .collect()
    }

    pub async fn create(&self, entity: &E) -> CheckoutResult<E> {
        let row = entity.to_row()?;
        let stored = self.store.insert(E::TABLE, entity.id(), row).await?;
        E::from_row(&stored)
    }

    /// Apply a partial update. `None` when the entity does not exist.
    pub async fn update(&self, id: &str, patch: &E::Patch) -> CheckoutResult<Option<E>> {
        let mut changes = E::patch_row(patch)?;
        if changes.is_empty() {
            return self.find_by_id(id).await;
        }
        E::stamp_patch(&mut changes);

        self.store
            .patch(E::TABLE, id, changes)
            .await?
            .map(|row| E::from_row(&row))
            .transpose()
    }

    /// Derive a patch from the current entity and apply it atomically.
    ///
    /// Use this instead of `get` + `update` whenever the new value depends on
    /// the old one. `decide` may be called more than once; an empty patch
    /// writes nothing. `None` when the entity does not exist.
    pub async fn modify<F>(&self, id: &str, decide: F) -> CheckoutResult<Option<E>>
    where
        F: Fn(&E) -> CheckoutResult<E::Patch> + Send + Sync,
    {
        let apply = |row: &Row| -> CheckoutResult<Row> {
            let current = E::from_row(row)?;
            let mut changes = E::patch_row(&decide(&current)?)?;
            if !changes.is_empty() {
                E::stamp_patch(&mut changes);
            }
            Ok(changes)
        };

        self.store
            .modify(E::TABLE, id, &apply)
            .await?
            .map(|row| E::from_row(&row))
            .transpose()
    }

    /// Apply a partial update to every entity matching `filters`.
    pub async fn update_where(&self, filters: &[Filter], patch: &E::Patch) -> CheckoutResult<u64> {
        let mut changes = E::patch_row(patch)?;
        if changes.is_empty() {
            return Ok(0);
        }
        E::stamp_patch(&mut changes);
        self.store.patch_where(E::TABLE, filters, changes).await
    }

    /// Absence is not an error: returns `false` when nothing was deleted.
    pub async fn delete(&self, id: &str) -> CheckoutResult<bool> {
        self.store.remove(E::TABLE, id).await
    }

    pub async fn exists(&self, id: &str) -> CheckoutResult<bool> {
        Ok(self.store.get(E::TABLE, id).await?.is_some())
    }

    pub async fn find_by_criteria(&self, criteria: &Criteria) -> CheckoutResult<Page<E>> {
        let invalid = criteria.invalid_fields();
        if !invalid.is_empty() {
            return Err(CheckoutError::InvalidRequest(format!(
                "invalid field name(s): {}",
                invalid.join(", ")
            )));
        }

        let (rows, total) = self.store.query(E::TABLE, criteria).await?;
        let data = rows.iter().map(E::from_row).collect::<CheckoutResult<Vec<_>>>()?;
        Ok(Page::new(data, total, criteria.pagination))
    }

    pub async fn count(&self, filters: &[Filter]) -> CheckoutResult<u64> {
        self.store.count(E::TABLE, filters).await
    }
}

/// Memoizes one repository per entity type for the life of the factory.
///
/// The map lock is held across construction, so each entity type is built
/// exactly once even under concurrent first use.
pub struct RepositoryFactory {
    store: SharedDatastore,
    cache: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl RepositoryFactory {
    pub fn new(store: SharedDatastore) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &SharedDatastore {
        &self.store
    }

    pub fn repository<E: Entity>(&self) -> Arc<Repository<E>> {
        let mut cache = self.cache.lock();
        let entry = cache
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Arc::new(Repository::<E>::new(Arc::clone(&self.store))));

        match Arc::clone(entry).downcast::<Repository<E>>() {
            Ok(repo) => repo,
            // keyed by TypeId::of::<E>, so the stored value is always Repository<E>
            Err(_) => unreachable!("repository cache holds a mismatched type"),
        }
    }

    /// Number of distinct repositories built so far
    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::row::{get_opt_str, get_str, put_opt};
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq)]
    struct Widget {
        id: String,
        name: String,
        colour: Option<String>,
    }

    #[derive(Default)]
    struct WidgetPatch {
        name: Option<String>,
        colour: Option<String>,
    }

    impl Entity for Widget {
        type Patch = WidgetPatch;
        const TABLE: &'static str = "widgets";
        const NAME: &'static str = "Widget";

        fn id(&self) -> &str {
            &self.id
        }

        fn to_row(&self) -> CheckoutResult<Row> {
            let mut row = Row::new();
            row.insert("id".into(), json!(self.id));
            row.insert("name".into(), json!(self.name));
            row.insert("colour".into(), json!(self.colour));
            Ok(row)
        }

        fn from_row(row: &Row) -> CheckoutResult<Self> {
            Ok(Self {
                id: get_str(row, "id")?,
                name: get_str(row, "name")?,
                colour: get_opt_str(row, "colour"),
            })
        }

        fn patch_row(patch: &WidgetPatch) -> CheckoutResult<Row> {
            let mut row = Row::new();
            put_opt(&mut row, "name", patch.name.as_ref().map(|v| json!(v)));
            put_opt(&mut row, "colour", patch.colour.as_ref().map(|v| json!(v)));
            Ok(row)
        }
    }

    fn widget(id: &str, name: &str) -> Widget {
        Widget {
            id: id.into(),
            name: name.into(),
            colour: Some("red".into()),
        }
    }

    fn repo() -> Repository<Widget> {
        Repository::new(Arc::new(MemoryDatastore::new()))
    }

    #[tokio::test]
    async fn test_create_and_read_back() {
        let repo = repo();
        let created = repo.create(&widget("w1", "Sprocket")).await.unwrap();

        assert_eq!(created, widget("w1", "Sprocket"));
        assert_eq!(repo.find_by_id("w1").await.unwrap(), Some(created));
        assert!(repo.exists("w1").await.unwrap());
        assert!(!repo.exists("w2").await.unwrap());
    }

    #[tokio::test]
    async fn test_partial_update_keeps_unset_fields() {
        let repo = repo();
        repo.create(&widget("w1", "Sprocket")).await.unwrap();

        let updated = repo
            .update(
                "w1",
                &WidgetPatch {
                    name: Some("Cog".into()),
                    colour: None,
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.name, "Cog");
        assert_eq!(updated.colour.as_deref(), Some("red"));
    }

    #[tokio::test]
    async fn test_update_missing_returns_none() {
        let repo = repo();
        let result = repo
            .update(
                "nope",
                &WidgetPatch {
                    name: Some("x".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_modify_sees_current_row_and_can_refuse() {
        let repo = repo();
        repo.create(&widget("w1", "Sprocket")).await.unwrap();

        let renamed = repo
            .modify("w1", |w| {
                Ok(WidgetPatch {
                    name: Some(format!("{} v2", w.name)),
                    colour: None,
                })
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(renamed.name, "Sprocket v2");

        let err = repo
            .modify("w1", |_| Err(CheckoutError::InvalidRequest("no".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidRequest(_)));
        assert_eq!(repo.get("w1").await.unwrap().name, "Sprocket v2");

        assert!(repo
            .modify("missing", |_| Ok(WidgetPatch::default()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_modify_loses_no_updates() {
        let repo = repo();
        repo.create(&widget("w1", "0")).await.unwrap();

        let tasks: Vec<_> = (0..200)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    repo.modify("w1", |w| {
                        let n: u32 = w.name.parse().unwrap();
                        Ok(WidgetPatch {
                            name: Some((n + 1).to_string()),
                            colour: None,
                        })
                    })
                    .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(repo.get("w1").await.unwrap().name, "200");
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_an_error() {
        let repo = repo();
        repo.create(&widget("w1", "Sprocket")).await.unwrap();

        assert!(repo.delete("w1").await.unwrap());
        assert!(!repo.delete("w1").await.unwrap());
    }

    #[tokio::test]
    async fn test_find_by_criteria_pages() {
        let repo = repo();
        for i in 0..5 {
            repo.create(&widget(&format!("w{}", i), &format!("Widget {}", i)))
                .await
                .unwrap();
        }

        let page = repo
            .find_by_criteria(&Criteria::new().sort(Sort::desc("name")).page(2, 2))
            .await
            .unwrap();

        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.page, 2);
        let names: Vec<_> = page.data.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["Widget 2", "Widget 1"]);
    }

    #[tokio::test]
    async fn test_find_by_criteria_rejects_bad_field() {
        let repo = repo();
        let err = repo
            .find_by_criteria(&Criteria::new().filter(Filter::eq("name; drop", "x")))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidRequest(_)));
    }

    #[test]
    fn test_factory_memoizes_per_entity() {
        let factory = RepositoryFactory::new(Arc::new(MemoryDatastore::new()));

        let a = factory.repository::<Widget>();
        let b = factory.repository::<Widget>();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(factory.cached(), 1);
    }
}
