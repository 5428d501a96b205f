//! Owner of the one-active-device-per-principal invariant.
//!
//! Reads go through the registry's own handle. Writes (`bind`, `unbind`) only
//! ever run on a transaction supplied by the caller so that a swap, its log
//! entry and the request transition commit or roll back together.

use chrono::{DateTime, Utc};
use db::models::device_binding::{ActiveModel, Column, Entity, Model as DeviceBinding};
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter,
};

use crate::error::AppError;

#[derive(Clone)]
pub struct DeviceRegistry {
    db: DatabaseConnection,
}

impl DeviceRegistry {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn get_active_binding(
        &self,
        principal_id: i64,
    ) -> Result<Option<DeviceBinding>, AppError> {
        Self::active_binding_on(&self.db, principal_id).await
    }

    /// True iff `device_id` is the principal's active device.
    pub async fn is_bound(&self, principal_id: i64, device_id: &str) -> Result<bool, AppError> {
        Self::is_bound_on(&self.db, principal_id, device_id).await
    }

    pub async fn history(&self, principal_id: i64) -> Result<Vec<DeviceBinding>, AppError> {
        Ok(DeviceBinding::history(&self.db, principal_id).await?)
    }

    pub(crate) async fn active_binding_on<C: ConnectionTrait>(
        conn: &C,
        principal_id: i64,
    ) -> Result<Option<DeviceBinding>, AppError> {
        Ok(DeviceBinding::find_active(conn, principal_id).await?)
    }

    pub(crate) async fn is_bound_on<C: ConnectionTrait>(
        conn: &C,
        principal_id: i64,
        device_id: &str,
    ) -> Result<bool, AppError> {
        let device_id = device_id.trim();
        Ok(Self::active_binding_on(conn, principal_id)
            .await?
            .is_some_and(|b| b.device_id == device_id))
    }

    /// Inserts a new active binding.
    ///
    /// Fails with `Conflict` if the principal already has an active binding;
    /// callers swapping devices must `unbind` first on the same transaction.
    /// The partial unique index turns a lost race into the same error.
    pub async fn bind(
        &self,
        principal_id: i64,
        device_id: &str,
        at: DateTime<Utc>,
        txn: &DatabaseTransaction,
    ) -> Result<DeviceBinding, AppError> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(AppError::Validation("Device id is required".into()));
        }

        if DeviceBinding::count_active(txn, principal_id).await? > 0 {
            tracing::warn!(principal_id, "bind refused: an active binding already exists");
            return Err(AppError::Conflict("An active device is already bound".into()));
        }

        let binding = ActiveModel {
            principal_id: Set(principal_id),
            device_id: Set(device_id.to_owned()),
            active: Set(true),
            bound_at: Set(at),
            ..Default::default()
        }
        .insert(txn)
        .await
        .map_err(|e| {
            AppError::from_insert(e, AppError::Conflict("An active device is already bound".into()))
        })?;

        tracing::info!(principal_id, binding_id = binding.id, "device bound");
        Ok(binding)
    }

    /// Deactivates the principal's active binding, returning it as it was.
    /// The row itself is kept as history.
    pub async fn unbind(
        &self,
        principal_id: i64,
        txn: &DatabaseTransaction,
    ) -> Result<Option<DeviceBinding>, AppError> {
        let Some(previous) = DeviceBinding::find_active(txn, principal_id).await? else {
            return Ok(None);
        };

        Entity::update_many()
            .col_expr(Column::Active, Expr::value(false))
            .filter(Column::Id.eq(previous.id))
            .filter(Column::Active.eq(true))
            .exec(txn)
            .await?;

        tracing::info!(principal_id, binding_id = previous.id, "device unbound");
        Ok(Some(previous))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::student;
    use db::test_utils::setup_test_db;
    use sea_orm::TransactionTrait;

    #[tokio::test]
    async fn bind_then_lookup() {
        let db = setup_test_db().await;
        let registry = DeviceRegistry::new(db.clone());
        let p = student(&db, "s1@example.com").await;

        let txn = db.begin().await.unwrap();
        let now = db::clock::now(&txn).await.unwrap();
        registry.bind(p.id, "phone-a", now, &txn).await.unwrap();
        txn.commit().await.unwrap();

        assert!(registry.is_bound(p.id, "phone-a").await.unwrap());
        assert!(registry.is_bound(p.id, " phone-a ").await.unwrap());
        assert!(!registry.is_bound(p.id, "phone-b").await.unwrap());
        assert_eq!(registry.get_active_binding(p.id).await.unwrap().unwrap().device_id, "phone-a");
    }

    #[tokio::test]
    async fn second_bind_without_unbind_conflicts() {
        let db = setup_test_db().await;
        let registry = DeviceRegistry::new(db.clone());
        let p = student(&db, "s2@example.com").await;

        let txn = db.begin().await.unwrap();
        let now = db::clock::now(&txn).await.unwrap();
        registry.bind(p.id, "phone-a", now, &txn).await.unwrap();
        let err = registry.bind(p.id, "phone-b", now, &txn).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        txn.commit().await.unwrap();

        assert_eq!(DeviceBinding::count_active(&db, p.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unbind_keeps_history() {
        let db = setup_test_db().await;
        let registry = DeviceRegistry::new(db.clone());
        let p = student(&db, "s3@example.com").await;

        let txn = db.begin().await.unwrap();
        let now = db::clock::now(&txn).await.unwrap();
        registry.bind(p.id, "phone-a", now, &txn).await.unwrap();
        let previous = registry.unbind(p.id, &txn).await.unwrap().unwrap();
        assert_eq!(previous.device_id, "phone-a");
        registry.bind(p.id, "phone-b", now, &txn).await.unwrap();
        txn.commit().await.unwrap();

        let history = registry.history(p.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(!history[0].active);
        assert!(history[1].active);
        assert!(!registry.is_bound(p.id, "phone-a").await.unwrap());
    }

    #[tokio::test]
    async fn unbind_without_binding_is_a_no_op() {
        let db = setup_test_db().await;
        let registry = DeviceRegistry::new(db.clone());
        let p = student(&db, "s4@example.com").await;

        let txn = db.begin().await.unwrap();
        assert!(registry.unbind(p.id, &txn).await.unwrap().is_none());
        txn.commit().await.unwrap();
    }

    #[tokio::test]
    async fn rolled_back_bind_leaves_nothing() {
        let db = setup_test_db().await;
        let registry = DeviceRegistry::new(db.clone());
        let p = student(&db, "s5@example.com").await;

        let txn = db.begin().await.unwrap();
        let now = db::clock::now(&txn).await.unwrap();
        registry.bind(p.id, "phone-a", now, &txn).await.unwrap();
        txn.rollback().await.unwrap();

        assert!(registry.get_active_binding(p.id).await.unwrap().is_none());
    }
}
