use chrono::Duration;
use db::models::attendance_session::{ActiveModel, Column, Entity, Model as AttendanceSession};
use db::models::principal::Role;
use rand::RngCore;
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use validator::Validate;

use crate::actor::Actor;
use crate::error::AppError;
use crate::geo;

const TOKEN_BYTES: usize = 16;

#[derive(Debug, Clone, Validate)]
pub struct OpenSession {
    pub subject_id: i64,
    pub class_id: i64,
    #[validate(length(min = 1, max = 255, message = "Session name must be 1-255 characters"))]
    pub name: String,
    pub anchor_latitude: f64,
    pub anchor_longitude: f64,
    /// Falls back to the configured default when absent.
    #[validate(range(min = 1, max = 1440, message = "Session length must be 1-1440 minutes"))]
    pub ttl_minutes: Option<i64>,
}

/// Creates and closes teacher-owned attendance sessions.
#[derive(Clone)]
pub struct SessionIssuer {
    db: DatabaseConnection,
    default_ttl_minutes: i64,
}

impl SessionIssuer {
    pub fn new(db: DatabaseConnection, default_ttl_minutes: i64) -> Self {
        Self { db, default_ttl_minutes }
    }

    /// Opens a session now, closing `ttl_minutes` later.
    pub async fn open(&self, actor: Actor, params: OpenSession) -> Result<AttendanceSession, AppError> {
        actor.require(Role::Teacher)?;
        let params = OpenSession { name: params.name.trim().to_owned(), ..params };
        params.validate()?;
        geo::validate_coordinates(params.anchor_latitude, params.anchor_longitude)?;

        let ttl = params.ttl_minutes.unwrap_or(self.default_ttl_minutes);
        let now = db::clock::now(&self.db).await?;

        let session = ActiveModel {
            token: Set(generate_token()),
            owner_id: Set(actor.principal_id),
            subject_id: Set(params.subject_id),
            class_id: Set(params.class_id),
            name: Set(params.name),
            anchor_latitude: Set(params.anchor_latitude),
            anchor_longitude: Set(params.anchor_longitude),
            opens_at: Set(now),
            closes_at: Set(now + Duration::minutes(ttl)),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        tracing::info!(
            session_id = session.id,
            owner_id = actor.principal_id,
            closes_at = %session.closes_at,
            "attendance session opened"
        );
        Ok(session)
    }

    /// Sets `closes_at` to now if `owner_id` owns the session and it is still open.
    ///
    /// Ownership and open-state are one predicate; either failing is `NotFound`.
    pub async fn close_early(&self, session_id: i64, owner_id: i64) -> Result<AttendanceSession, AppError> {
        let now = db::clock::now(&self.db).await?;

        let result = Entity::update_many()
            .col_expr(Column::ClosesAt, Expr::value(now))
            .filter(Column::Id.eq(session_id))
            .filter(Column::OwnerId.eq(owner_id))
            .filter(Column::ClosesAt.gt(now))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            tracing::warn!(session_id, owner_id, "close_early found no open session");
            return Err(AppError::NotFound("Session not found or already closed".into()));
        }

        tracing::info!(session_id, owner_id, "attendance session closed early");
        Entity::find_by_id(session_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Session not found or already closed".into()))
    }

    /// The session behind `token`, only while it is active.
    pub async fn find_active(&self, token: &str) -> Result<Option<AttendanceSession>, AppError> {
        let now = db::clock::now(&self.db).await?;
        Ok(AttendanceSession::find_active_by_token(&self.db, token, now).await?)
    }
}

/// 128 random bits, hex encoded.
fn generate_token() -> String {
    let mut buf = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}
