use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ConnectionTrait, QueryFilter};
use serde::Serialize;

/// A time-boxed, location-anchored attendance window owned by a teacher.
///
/// Only `closes_at` may change after creation, and only to close early.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "attendance_sessions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// 128-bit random value, hex encoded. Carried in the QR payload.
    #[serde(skip_serializing)]
    pub token: String,
    pub owner_id: i64,
    pub subject_id: i64,
    pub class_id: i64,
    pub name: String,
    pub anchor_latitude: f64,
    pub anchor_longitude: f64,
    pub opens_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::principal::Entity",
        from = "Column::OwnerId",
        to = "super::principal::Column::Id"
    )]
    Owner,
    #[sea_orm(has_many = "super::attendance_record::Entity")]
    Records,
}

impl Related<super::attendance_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Records.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// `opens_at <= now <= closes_at`.
    #[inline]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.opens_at <= now && now <= self.closes_at
    }

    /// Looks a session up by token, returning it only while it is active.
    pub async fn find_active_by_token<C: ConnectionTrait>(
        conn: &C,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Model>, DbErr> {
        Entity::find()
            .filter(Column::Token.eq(token.trim()))
            .filter(Column::OpensAt.lte(now))
            .filter(Column::ClosesAt.gte(now))
            .one(conn)
            .await
    }
}
