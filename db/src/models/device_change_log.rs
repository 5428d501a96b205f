use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;
use sea_orm::{ConnectionTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Append-only trail of binding transitions. Rows are written once.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "device_change_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub principal_id: i64,
    pub request_id: Option<i64>,
    pub old_device_id: Option<String>,
    pub new_device_id: Option<String>,
    /// Principal who caused the transition; `None` for self-service steps.
    pub actor_id: Option<i64>,
    pub action: ChangeAction,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeAction {
    #[sea_orm(string_value = "registered")]
    Registered,

    #[sea_orm(string_value = "otp_verified")]
    OtpVerified,

    #[sea_orm(string_value = "approved")]
    Approved,

    #[sea_orm(string_value = "rejected")]
    Rejected,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::principal::Entity",
        from = "Column::PrincipalId",
        to = "super::principal::Column::Id"
    )]
    Principal,
    #[sea_orm(
        belongs_to = "super::device_change_request::Entity",
        from = "Column::RequestId",
        to = "super::device_change_request::Column::Id"
    )]
    Request,
}

impl Related<super::principal::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Principal.def()
    }
}

impl Related<super::device_change_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Request.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Fields of a log entry to append.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub principal_id: i64,
    pub request_id: Option<i64>,
    pub old_device_id: Option<String>,
    pub new_device_id: Option<String>,
    pub actor_id: Option<i64>,
    pub action: ChangeAction,
    pub message: String,
}

impl Model {
    pub async fn append<C: ConnectionTrait>(
        conn: &C,
        entry: NewEntry,
        at: DateTime<Utc>,
    ) -> Result<Model, DbErr> {
        ActiveModel {
            principal_id: Set(entry.principal_id),
            request_id: Set(entry.request_id),
            old_device_id: Set(entry.old_device_id),
            new_device_id: Set(entry.new_device_id),
            actor_id: Set(entry.actor_id),
            action: Set(entry.action),
            message: Set(entry.message),
            created_at: Set(at),
            ..Default::default()
        }
        .insert(conn)
        .await
    }

    pub async fn for_principal<C: ConnectionTrait>(
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
