use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ConnectionTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "device_change_requests")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub principal_id: i64,
    /// Device bound when the request was raised, if any.
    pub current_device_id: Option<String>,
    pub requested_device_id: String,
    #[serde(skip_serializing)]
    pub challenge_code: String,
    pub challenge_expiry: DateTime<Utc>,
    pub status: RequestStatus,
    /// Admin who approved or rejected the request.
    pub disposed_by: Option<i64>,
    pub disposition_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `pending -> otp_verified -> {approved | rejected}`; `pending -> expired`
/// when a lapsed challenge is superseded by a new request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RequestStatus {
    #[sea_orm(string_value = "pending")]
    Pending,

    #[sea_orm(string_value = "otp_verified")]
    OtpVerified,

    #[sea_orm(string_value = "approved")]
    Approved,

    #[sea_orm(string_value = "rejected")]
    Rejected,

    #[sea_orm(string_value = "expired")]
    Expired,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Expired)
    }

    pub fn outstanding() -> [RequestStatus; 2] {
        [Self::Pending, Self::OtpVerified]
    }
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
    /// The principal's non-terminal request, if one exists.
    pub async fn find_outstanding<C: ConnectionTrait>(
        conn: &C,
        principal_id: i64,
    ) -> Result<Option<Model>, DbErr> {
        Entity::find()
            .filter(Column::PrincipalId.eq(principal_id))
            .filter(Column::Status.is_in(RequestStatus::outstanding()))
            .one(conn)
            .await
    }
}
