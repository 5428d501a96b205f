use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ConnectionTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A registered identity in the `principals` table.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "principals")]
pub struct Model {
    /// Primary key ID (auto-incremented).
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Unique login / notification address.
    pub email: String,
    pub name: String,
    pub role: Role,
    /// Students only. Unique when present.
    pub enrollment_no: Option<String>,
    /// Students only.
    pub branch: Option<String>,
    /// Students only, 1 through 4.
    pub year: Option<i32>,
    /// Students start inactive until an admin activates them.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
    #[sea_orm(string_value = "student")]
    Student,

    #[sea_orm(string_value = "teacher")]
    Teacher,

    #[sea_orm(string_value = "admin")]
    Admin,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::device_binding::Entity")]
    DeviceBindings,
    #[sea_orm(has_many = "super::attendance_record::Entity")]
    AttendanceRecords,
}

impl Related<super::device_binding::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DeviceBindings.def()
    }
}

impl Related<super::attendance_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AttendanceRecords.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Canonical form every stored address is kept in.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

impl Model {
    /// Case-insensitive: the argument is normalised before comparison.
    pub async fn find_by_email<C: ConnectionTrait>(
        conn: &C,
        email: &str,
    ) -> Result<Option<Model>, DbErr> {
        Entity::find()
            .filter(Column::Email.eq(normalize_email(email)))
            .one(conn)
            .await
    }

    pub async fn find_by_enrollment_no<C: ConnectionTrait>(
        conn: &C,
        enrollment_no: &str,
    ) -> Result<Option<Model>, DbErr> {
        Entity::find()
            .filter(Column::EnrollmentNo.eq(enrollment_no.trim()))
            .one(conn)
            .await
    }
}
