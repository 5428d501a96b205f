use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;
use sea_orm::{ConnectionTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Forensic trail of attendance attempts. Written by the engine, never read by it.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "attendance_audits")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub principal_id: i64,
    pub session_id: i64,
    pub device_id: String,
    pub action: AuditAction,
    pub reason: String,
    pub distance_m: Option<f64>,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[strum(serialize_all = "lowercase")]
pub enum AuditAction {
    #[sea_orm(string_value = "success")]
    Success,

    #[sea_orm(string_value = "failed")]
    Failed,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::attendance_session::Entity",
        from = "Column::SessionId",
        to = "super::attendance_session::Column::Id"
    )]
    Session,
}

impl Related<super::attendance_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Session.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Fields of an audit entry to append.
#[derive(Debug, Clone)]
pub struct NewAudit {
    pub principal_id: i64,
    pub session_id: i64,
    pub device_id: String,
    pub action: AuditAction,
    pub reason: String,
    pub distance_m: Option<f64>,
    pub latitude: f64,
    pub longitude: f64,
}

impl Model {
    pub async fn append<C: ConnectionTrait>(
        conn: &C,
        audit: NewAudit,
        at: DateTime<Utc>,
    ) -> Result<Model, DbErr> {
        ActiveModel {
            principal_id: Set(audit.principal_id),
            session_id: Set(audit.session_id),
            device_id: Set(audit.device_id),
            action: Set(audit.action),
            reason: Set(audit.reason),
            distance_m: Set(audit.distance_m),
            latitude: Set(audit.latitude),
            longitude: Set(audit.longitude),
            created_at: Set(at),
            ..Default::default()
        }
        .insert(conn)
        .await
    }

    pub async fn for_attempt<C: ConnectionTrait>(
        conn: &C,
        principal_id: i64,
        session_id: i64,
    ) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::PrincipalId.eq(principal_id))
            .filter(Column::SessionId.eq(session_id))
            .order_by_asc(Column::Id)
            .all(conn)
            .await
    }
}
