//! Records a single attendance event against an active session.
//!
//! Checks run in a fixed order (session, duplicate, device, geofence) inside
//! one transaction. Device and geofence rejections are audited and the audit
//! row is committed even though the attempt fails.

use chrono::{DateTime, Utc};
use db::models::attendance_audit::{AuditAction, Model as AttendanceAudit, NewAudit};
use db::models::attendance_record::{ActiveModel, AttendanceStatus, Model as AttendanceRecord};
use db::models::attendance_session::Model as AttendanceSession;
use db::models::principal::Role;
use sea_orm::ActiveValue::Set;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DatabaseTransaction, TransactionTrait};
use serde::Serialize;

use crate::actor::Actor;
use crate::device_registry::DeviceRegistry;
use crate::error::AppError;
use crate::geo;

pub const REASON_OUT_OF_RANGE: &str = "out-of-range";
pub const REASON_DEVICE_MISMATCH: &str = "device-mismatch";
pub const REASON_MARKED: &str = "marked";

#[derive(Debug, Clone)]
pub struct MarkAttendance {
    pub session_token: String,
    pub device_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarkOutcome {
    pub record: AttendanceRecord,
    pub session: AttendanceSession,
    /// Distance from the anchor, rounded to whole meters.
    pub distance_m: f64,
}

enum Attempt {
    Marked(MarkOutcome),
    /// Rejected after an audit row was written; the transaction still commits.
    Refused(AppError),
}

#[derive(Clone)]
pub struct AttendanceEngine {
    db: DatabaseConnection,
    max_distance_m: f64,
}

impl AttendanceEngine {
    pub fn new(db: DatabaseConnection, max_distance_m: f64) -> Self {
        Self { db, max_distance_m }
    }

    pub async fn mark(&self, actor: Actor, params: MarkAttendance) -> Result<MarkOutcome, AppError> {
        actor.require(Role::Student)?;
        geo::validate_coordinates(params.latitude, params.longitude)?;
        let token = params.session_token.trim();
        if token.is_empty() {
            return Err(AppError::SessionNotFound);
        }
        if params.device_id.trim().is_empty() {
            return Err(AppError::Validation("Device id is required".into()));
        }

        let txn = self.db.begin().await?;
        match self.attempt(&txn, actor.principal_id, token, &params).await {
            Ok(Attempt::Marked(outcome)) => {
                txn.commit().await?;
                tracing::info!(
                    principal_id = actor.principal_id,
                    session_id = outcome.session.id,
                    distance_m = outcome.distance_m,
                    "attendance marked"
                );
                Ok(outcome)
            }
            Ok(Attempt::Refused(err)) => {
                txn.commit().await?;
                tracing::warn!(principal_id = actor.principal_id, error = %err, "attendance refused");
                Err(err)
            }
            Err(err) => {
                if let Err(rb) = txn.rollback().await {
                    tracing::error!(error = %rb, "rollback failed");
                }
                if matches!(err, AppError::Storage(_)) {
                    tracing::error!(principal_id = actor.principal_id, error = ?err, "attendance marking failed");
                } else {
                    tracing::warn!(principal_id = actor.principal_id, error = %err, "attendance refused");
                }
                Err(err)
            }
        }
    }

    async fn attempt(
        &self,
        txn: &DatabaseTransaction,
        principal_id: i64,
        token: &str,
        params: &MarkAttendance,
    ) -> Result<Attempt, AppError> {
        let now = db::clock::now(txn).await?;
        let device_id = params.device_id.trim();

        let session = AttendanceSession::find_active_by_token(txn, token, now)
            .await?
            .ok_or(AppError::SessionNotFound)?;

        if AttendanceRecord::find_for(txn, principal_id, session.id).await?.is_some() {
            return Err(AppError::AlreadyMarked);
        }

        let audit = |action, reason: &str, distance_m| NewAudit {
            principal_id,
            session_id: session.id,
            device_id: device_id.to_owned(),
            action,
            reason: reason.to_owned(),
            distance_m,
            latitude: params.latitude,
            longitude: params.longitude,
        };

        if !DeviceRegistry::is_bound_on(txn, principal_id, device_id).await? {
            AttendanceAudit::append(txn, audit(AuditAction::Failed, REASON_DEVICE_MISMATCH, None), now).await?;
            return Ok(Attempt::Refused(AppError::DeviceNotAuthorized));
        }

        let distance = geo::distance_meters(
            params.latitude,
            params.longitude,
            session.anchor_latitude,
            session.anchor_longitude,
        );
        if distance > self.max_distance_m {
            AttendanceAudit::append(txn, audit(AuditAction::Failed, REASON_OUT_OF_RANGE, Some(distance)), now)
                .await?;
            return Ok(Attempt::Refused(AppError::GeofenceViolation {
                distance_m: distance.round(),
                threshold_m: self.max_distance_m,
            }));
        }

        let record = insert_record(txn, principal_id, &session, params, now).await?;
        AttendanceAudit::append(txn, audit(AuditAction::Success, REASON_MARKED, Some(distance)), now).await?;

        Ok(Attempt::Marked(MarkOutcome { record, session, distance_m: distance.round() }))
    }
}

async fn insert_record(
    txn: &DatabaseTransaction,
    principal_id: i64,
    session: &AttendanceSession,
    params: &MarkAttendance,
    now: DateTime<Utc>,
) -> Result<AttendanceRecord, AppError> {
    ActiveModel {
        principal_id: Set(principal_id),
        session_id: Set(session.id),
        latitude: Set(params.latitude),
        longitude: Set(params.longitude),
        status: Set(AttendanceStatus::Present),
        marked_at: Set(now),
        ..Default::default()
    }
    .insert(txn)
    .await
    .map_err(|e| AppError::from_insert(e, AppError::AlreadyMarked))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_issuer::{OpenSession, SessionIssuer};
    use crate::test_support::{bind, student, teacher};
    use db::test_utils::setup_test_db;

    async fn fixture() -> (DatabaseConnection, AttendanceEngine, Actor, AttendanceSession) {
        let db = setup_test_db().await;
        let t = teacher(&db, "t@example.com").await;
        let s = student(&db, "s@example.com").await;
        bind(&db, s.id, "phone-a").await;

        let session = SessionIssuer::new(db.clone(), 10)
            .open(
                Actor::from(&t),
                OpenSession {
                    subject_id: 1,
                    class_id: 1,
                    name: "Lecture".into(),
                    anchor_latitude: 0.0,
                    anchor_longitude: 0.0,
                    ttl_minutes: None,
                },
            )
            .await
            .unwrap();

        let engine = AttendanceEngine::new(db.clone(), 40.0);
        (db, engine, Actor::new(s.id, Role::Student, true), session)
    }

    fn at(session: &AttendanceSession, device: &str, lat: f64) -> MarkAttendance {
        MarkAttendance {
            session_token: session.token.clone(),
            device_id: device.into(),
            latitude: lat,
            longitude: 0.0,
        }
    }

    #[tokio::test]
    async fn marks_within_range() {
        let (db, engine, actor, session) = fixture().await;

        let outcome = engine.mark(actor, at(&session, "phone-a", 0.0001)).await.unwrap();
        assert_eq!(outcome.record.status, AttendanceStatus::Present);
        assert_eq!(outcome.distance_m, 11.0);
        assert_eq!(outcome.session.id, session.id);

        let audits = AttendanceAudit::for_attempt(&db, actor.principal_id, session.id).await.unwrap();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].action, AuditAction::Success);
    }

    #[tokio::test]
    async fn duplicate_is_reported_before_device_and_location() {
        let (db, engine, actor, session) = fixture().await;
        engine.mark(actor, at(&session, "phone-a", 0.0)).await.unwrap();

        let err = engine.mark(actor, at(&session, "phone-x", 1.0)).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyMarked));
        assert_eq!(AttendanceRecord::count_for_session(&db, session.id).await.unwrap(), 1);
        // no audit row for the duplicate
        assert_eq!(AttendanceAudit::for_attempt(&db, actor.principal_id, session.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn wrong_device_is_audited() {
        let (db, engine, actor, session) = fixture().await;

        let err = engine.mark(actor, at(&session, "phone-x", 5.0)).await.unwrap_err();
        assert!(matches!(err, AppError::DeviceNotAuthorized));

        let audits = AttendanceAudit::for_attempt(&db, actor.principal_id, session.id).await.unwrap();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].action, AuditAction::Failed);
        assert_eq!(audits[0].reason, REASON_DEVICE_MISMATCH);
        assert!(AttendanceRecord::find_for(&db, actor.principal_id, session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn out_of_range_is_audited_with_distance() {
        let (db, engine, actor, session) = fixture().await;

        let err = engine.mark(actor, at(&session, "phone-a", 0.00037)).await.unwrap_err();
        match err {
            AppError::GeofenceViolation { distance_m, threshold_m } => {
                assert_eq!(distance_m, 41.0);
                assert_eq!(threshold_m, 40.0);
            }
            other => panic!("expected geofence violation, got {other:?}"),
        }

        let audits = AttendanceAudit::for_attempt(&db, actor.principal_id, session.id).await.unwrap();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].reason, REASON_OUT_OF_RANGE);
        assert!(audits[0].distance_m.unwrap() > 40.0);
    }

    #[tokio::test]
    async fn unknown_token_is_session_not_found() {
        let (_db, engine, actor, _session) = fixture().await;
        let params = MarkAttendance {
            session_token: "ff".repeat(16),
            device_id: "phone-a".into(),
            latitude: 0.0,
            longitude: 0.0,
        };
        assert!(matches!(engine.mark(actor, params).await, Err(AppError::SessionNotFound)));
    }

    #[tokio::test]
    async fn only_active_students_mark() {
        let (_db, engine, actor, session) = fixture().await;

        let inactive = Actor { is_active: false, ..actor };
        assert!(matches!(
            engine.mark(inactive, at(&session, "phone-a", 0.0)).await,
            Err(AppError::PermissionDenied(_))
        ));

        let as_teacher = Actor { role: Role::Teacher, ..actor };
        assert!(matches!(
            engine.mark(as_teacher, at(&session, "phone-a", 0.0)).await,
            Err(AppError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn non_finite_location_is_invalid() {
        let (_db, engine, actor, session) = fixture().await;
        assert!(matches!(
            engine.mark(actor, at(&session, "phone-a", f64::NAN)).await,
            Err(AppError::Validation(_))
        ));
    }
}
