use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ConnectionTrait, QueryFilter};
use serde::Serialize;

use super::principal::{Role, normalize_email};

/// A registration awaiting its emailed code, one per address.
///
/// The row carries the details submitted with the request; completing the
/// registration consumes it and creates the principal from them.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "registration_challenges")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub challenge_code: String,
    pub challenge_expiry: DateTime<Utc>,
    pub name: String,
    pub role: Role,
    pub enrollment_no: Option<String>,
    pub branch: Option<String>,
    pub year: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn find_by_email<C: ConnectionTrait>(
        conn: &C,
        email: &str,
    ) -> Result<Option<Model>, DbErr> {
        Entity::find()
            .filter(Column::Email.eq(normalize_email(email)))
            .one(conn)
            .await
    }

    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.challenge_expiry > now
    }
}
