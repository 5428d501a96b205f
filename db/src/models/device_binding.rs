use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ConnectionTrait, QueryFilter, QueryOrder};
use serde::Serialize;

/// One row per device a principal has ever been bound to.
///
/// Rows are never deleted; a swap flips `active` off on the old row and
/// inserts a new active row. A partial unique index keeps at most one active
/// row per principal.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "device_bindings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub principal_id: i64,
    pub device_id: String,
    pub active: bool,
    pub bound_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::principal::Entity",
        from = "Column::PrincipalId",
        to = "super::principal::Column::Id"
    )]
    Principal,
}

impl Related<super::principal::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Principal.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn find_active<C: ConnectionTrait>(
        conn: &C,
        principal_id: i64,
    ) -> Result<Option<Model>, DbErr> {
        Entity::find()
            .filter(Column::PrincipalId.eq(principal_id))
            .filter(Column::Active.eq(true))
            .one(conn)
            .await
    }

    pub async fn count_active<C: ConnectionTrait>(
        conn: &C,
        principal_id: i64,
    ) -> Result<u64, DbErr> {
        Entity::find()
            .filter(Column::PrincipalId.eq(principal_id))
            .filter(Column::Active.eq(true))
            .count(conn)
            .await
    }

    /// Full binding history, oldest first.
    pub async fn history<C: ConnectionTrait>(
        conn: &C,
        principal_id: i64,
    ) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::PrincipalId.eq(principal_id))
            .order_by_asc(Column::Id)
            .all(conn)
            .await
    }
}
