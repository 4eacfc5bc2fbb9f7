//! Saved payment methods for the account-settings surface.
//!
//! A user has at most one default method. Deletion is soft: rows are
//! deactivated, never removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{CheckoutError, CheckoutResult};
use crate::repository::row::{
    datetime_value, get_bool, get_datetime, get_opt_str, get_str, put_opt, timestamp_now,
};
use crate::repository::criteria::MAX_PER_PAGE;
use crate::repository::{Criteria, Entity, Filter, Repository, Row, Sort};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedPaymentMethod {
    pub id: String,
    pub user_id: String,
    /// Provider key (e.g. "stripe")
    pub provider: String,
    /// Display label (e.g. "Visa ending 4242")
    pub label: String,
    pub last4: Option<String>,
    pub brand: Option<String>,
    pub nickname: Option<String>,
    pub is_default: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SavedPaymentMethod {
    pub fn new(
        user_id: impl Into<String>,
        provider: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        let now = timestamp_now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            provider: provider.into(),
            label: label.into(),
            last4: None,
            brand: None,
            nickname: None,
            is_default: false,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SavedPaymentMethodPatch {
    pub nickname: Option<String>,
    pub is_default: Option<bool>,
    #[serde(skip)]
    pub active: Option<bool>,
}

impl Entity for SavedPaymentMethod {
    type Patch = SavedPaymentMethodPatch;
    const TABLE: &'static str = "payment_methods";
    const NAME: &'static str = "Payment method";

    fn id(&self) -> &str {
        &self.id
    }

    fn to_row(&self) -> CheckoutResult<Row> {
        let mut row = Row::new();
        row.insert("id".into(), json!(self.id));
        row.insert("user_id".into(), json!(self.user_id));
        row.insert("provider".into(), json!(self.provider));
        row.insert("label".into(), json!(self.label));
        row.insert("last4".into(), json!(self.last4));
        row.insert("brand".into(), json!(self.brand));
        row.insert("nickname".into(), json!(self.nickname));
        row.insert("is_default".into(), json!(self.is_default));
        row.insert("active".into(), json!(self.active));
        row.insert("created_at".into(), datetime_value(self.created_at));
        row.insert("updated_at".into(), datetime_value(self.updated_at));
        Ok(row)
    }

    fn from_row(row: &Row) -> CheckoutResult<Self> {
        Ok(Self {
            id: get_str(row, "id")?,
            user_id: get_str(row, "user_id")?,
            provider: get_str(row, "provider")?,
            label: get_str(row, "label")?,
            last4: get_opt_str(row, "last4"),
            brand: get_opt_str(row, "brand"),
            nickname: get_opt_str(row, "nickname"),
            is_default: get_bool(row, "is_default")?,
            active: get_bool(row, "active")?,
            created_at: get_datetime(row, "created_at")?,
            updated_at: get_datetime(row, "updated_at")?,
        })
    }

    fn patch_row(patch: &SavedPaymentMethodPatch) -> CheckoutResult<Row> {
        let mut row = Row::new();
        put_opt(&mut row, "nickname", patch.nickname.as_ref().map(|v| json!(v)));
        put_opt(&mut row, "is_default", patch.is_default.map(|v| json!(v)));
        put_opt(&mut row, "active", patch.active.map(|v| json!(v)));
        Ok(row)
    }

    fn stamp_patch(row: &mut Row) {
        row.insert("updated_at".into(), datetime_value(timestamp_now()));
    }
}

pub type SavedPaymentMethodRepository = Repository<SavedPaymentMethod>;

impl Repository<SavedPaymentMethod> {
    /// Active methods for a user: the default first, then newest first.
    pub async fn list_for_user(&self, user_id: &str) -> CheckoutResult<Vec<SavedPaymentMethod>> {
        let criteria = Criteria::new()
            .filter(Filter::eq("user_id", user_id))
            .filter(Filter::eq("active", true))
            .sort(Sort::desc("created_at"))
            .page(1, MAX_PER_PAGE);

        let mut methods = self.find_by_criteria(&criteria).await?.data;
        // stable: newest-first order survives within each group
        methods.sort_by_key(|m| !m.is_default);
        Ok(methods)
    }

    /// Store a new method, clearing the user's other defaults first if it
    /// is the default.
    pub async fn add(&self, method: &SavedPaymentMethod) -> CheckoutResult<SavedPaymentMethod> {
        if method.is_default {
            self.clear_defaults(&method.user_id).await?;
        }
        self.create(method).await
    }

    /// Update nickname and/or default flag. Setting a default clears the
    /// user's other defaults first.
    pub async fn apply(
        &self,
        id: &str,
        patch: &SavedPaymentMethodPatch,
    ) -> CheckoutResult<SavedPaymentMethod> {
        let existing = self.get(id).await?;
        if !existing.active {
            return Err(CheckoutError::NotFound {
                entity: SavedPaymentMethod::NAME,
                id: id.to_string(),
            });
        }

        if patch.is_default == Some(true) {
            self.clear_defaults(&existing.user_id).await?;
        }

        let patch = SavedPaymentMethodPatch {
            nickname: patch.nickname.clone(),
            is_default: patch.is_default,
            active: None,
        };
        self.update(id, &patch).await?.ok_or_else(|| CheckoutError::NotFound {
            entity: SavedPaymentMethod::NAME,
            id: id.to_string(),
        })
    }

    /// Soft delete. A deactivated method also stops being the default.
    pub async fn deactivate(&self, id: &str) -> CheckoutResult<bool> {
        let patch = SavedPaymentMethodPatch {
            active: Some(false),
            is_default: Some(false),
            ..Default::default()
        };
        Ok(self.update(id, &patch).await?.is_some())
    }

    async fn clear_defaults(&self, user_id: &str) -> CheckoutResult<u64> {
        let patch = SavedPaymentMethodPatch {
            is_default: Some(false),
            ..Default::default()
        };
        self.update_where(
            &[
                Filter::eq("user_id", user_id),
                Filter::eq("is_default", true),
            ],
            &patch,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryDatastore;
    use chrono::Duration;
    use std::sync::Arc;

    fn repo() -> SavedPaymentMethodRepository {
        Repository::new(Arc::new(MemoryDatastore::new()))
    }

    fn method(user: &str, label: &str, age_minutes: i64, is_default: bool) -> SavedPaymentMethod {
        let mut m = SavedPaymentMethod::new(user, "stripe", label);
        m.created_at = m.created_at - Duration::minutes(age_minutes);
        m.is_default = is_default;
        m
    }

    #[tokio::test]
    async fn test_list_orders_default_first_then_newest() {
        let repo = repo();
        repo.add(&method("u1", "oldest", 30, false)).await.unwrap();
        repo.add(&method("u1", "default", 20, true)).await.unwrap();
        repo.add(&method("u1", "newest", 10, false)).await.unwrap();
        repo.add(&method("u2", "other user", 5, true)).await.unwrap();

        let labels: Vec<_> = repo
            .list_for_user("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.label)
            .collect();
        assert_eq!(labels, vec!["default", "newest", "oldest"]);
    }

    #[tokio::test]
    async fn test_at_most_one_default_per_user() {
        let repo = repo();
        let first = repo.add(&method("u1", "first", 10, true)).await.unwrap();
        let second = repo.add(&method("u1", "second", 5, true)).await.unwrap();
        let other = repo.add(&method("u2", "other", 5, true)).await.unwrap();

        assert!(!repo.get(&first.id).await.unwrap().is_default);
        assert!(repo.get(&second.id).await.unwrap().is_default);
        assert!(repo.get(&other.id).await.unwrap().is_default);

        let patch = SavedPaymentMethodPatch {
            is_default: Some(true),
            ..Default::default()
        };
        repo.apply(&first.id, &patch).await.unwrap();

        let defaults = repo
            .count(&[Filter::eq("user_id", "u1"), Filter::eq("is_default", true)])
            .await
            .unwrap();
        assert_eq!(defaults, 1);
        assert!(repo.get(&first.id).await.unwrap().is_default);
    }

    #[tokio::test]
    async fn test_nickname_update_keeps_default() {
        let repo = repo();
        let m = repo.add(&method("u1", "card", 0, true)).await.unwrap();

        let patch = SavedPaymentMethodPatch {
            nickname: Some("work card".into()),
            ..Default::default()
        };
        let updated = repo.apply(&m.id, &patch).await.unwrap();
        assert_eq!(updated.nickname.as_deref(), Some("work card"));
        assert!(updated.is_default);
    }

    #[tokio::test]
    async fn test_delete_is_soft() {
        let repo = repo();
        let m = repo.add(&method("u1", "card", 0, true)).await.unwrap();

        assert!(repo.deactivate(&m.id).await.unwrap());
        assert!(!repo.deactivate("missing").await.unwrap());

        let stored = repo.get(&m.id).await.unwrap();
        assert!(!stored.active);
        assert!(repo.list_for_user("u1").await.unwrap().is_empty());

        let err = repo
            .apply(&m.id, &SavedPaymentMethodPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::NotFound { .. }));
    }
}
