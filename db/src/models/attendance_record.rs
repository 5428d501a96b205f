use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ConnectionTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// One immutable attendance fact. Unique on `(principal_id, session_id)`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "attendance_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub principal_id: i64,
    pub session_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub status: AttendanceStatus,
    pub marked_at: DateTime<Utc>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[strum(serialize_all = "lowercase")]
pub enum AttendanceStatus {
    #[sea_orm(string_value = "present")]
    Present,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::attendance_session::Entity",
        from = "Column::SessionId",
        to = "super::attendance_session::Column::Id"
    )]
    Session,
    #[sea_orm(
        belongs_to = "super::principal::Entity",
        from = "Column::PrincipalId",
        to = "super::principal::Column::Id"
    )]
    Principal,
}

impl Related<super::attendance_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Session.def()
    }
}

impl Related<super::principal::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Principal.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn find_for<C: ConnectionTrait>(
        conn: &C,
        principal_id: i64,
        session_id: i64,
    ) -> Result<Option<Model>, DbErr> {
        Entity::find()
            .filter(Column::PrincipalId.eq(principal_id))
            .filter(Column::SessionId.eq(session_id))
            .one(conn)
            .await
    }

    pub async fn count_for_session<C: ConnectionTrait>(
        conn: &C,
        session_id: i64,
    ) -> Result<u64, DbErr> {
        Entity::find()
            .filter(Column::SessionId.eq(session_id))
            .count(conn)
            .await
    }
}
