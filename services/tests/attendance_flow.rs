mod common;

use chrono::Duration;
use db::models::attendance_audit::{AuditAction, Model as AttendanceAudit};
use db::models::attendance_record::{AttendanceStatus, Model as AttendanceRecord};
use db::models::attendance_session::{self, Model as AttendanceSession};
use futures::future::join_all;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set};
use services::AppError;
use services::attendance_engine::MarkAttendance;
use services::session_issuer::OpenSession;

async fn open_at_origin(h: &common::Harness) -> AttendanceSession {
    h.core
        .sessions
        .open(
            h.teacher,
            OpenSession {
                subject_id: 11,
                class_id: 4,
                name: "Operating Systems".into(),
                anchor_latitude: 0.0,
                anchor_longitude: 0.0,
                ttl_minutes: None,
            },
        )
        .await
        .unwrap()
}

fn mark(session: &AttendanceSession, device: &str, latitude: f64) -> MarkAttendance {
    MarkAttendance {
        session_token: session.token.clone(),
        device_id: device.into(),
        latitude,
        longitude: 0.0,
    }
}

#[tokio::test]
async fn just_outside_the_fence_is_a_violation() {
    let h = common::harness().await;
    let (student, actor) = h.student("s@example.com", "EN001", "phone-a").await;
    let session = open_at_origin(&h).await;

    let err = h.core.attendance.mark(actor, mark(&session, "phone-a", 0.00037)).await.unwrap_err();
    match err {
        AppError::GeofenceViolation { distance_m, threshold_m } => {
            assert!((distance_m - 41.0).abs() < 1.0);
            assert_eq!(threshold_m, 40.0);
        }
        other => panic!("expected geofence violation, got {other:?}"),
    }

    assert!(AttendanceRecord::find_for(h.state.db(), student.id, session.id).await.unwrap().is_none());
    let audits = AttendanceAudit::for_attempt(h.state.db(), student.id, session.id).await.unwrap();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].action, AuditAction::Failed);
    assert_eq!(audits[0].reason, "out-of-range");
}

#[tokio::test]
async fn inside_the_fence_with_bound_device_is_present() {
    let h = common::harness().await;
    let (student, actor) = h.student("s@example.com", "EN001", "phone-a").await;
    let session = open_at_origin(&h).await;

    let outcome = h.core.attendance.mark(actor, mark(&session, "phone-a", 0.0003)).await.unwrap();
    assert_eq!(outcome.record.status, AttendanceStatus::Present);
    assert_eq!(outcome.record.principal_id, student.id);
    assert_eq!(outcome.distance_m, 33.0);
    assert_eq!(AttendanceRecord::count_for_session(h.state.db(), session.id).await.unwrap(), 1);

    assert!(matches!(
        h.core.attendance.mark(actor, mark(&session, "phone-a", 0.0)).await,
        Err(AppError::AlreadyMarked)
    ));
}

#[tokio::test]
async fn closed_session_is_not_found_whatever_else_is_right() {
    let h = common::harness().await;
    let (_, actor) = h.student("s@example.com", "EN001", "phone-a").await;
    let session = open_at_origin(&h).await;

    let past = db::clock::now(h.state.db()).await.unwrap() - Duration::minutes(1);
    attendance_session::Entity::update_many()
        .set(attendance_session::ActiveModel { closes_at: Set(past), ..Default::default() })
        .filter(attendance_session::Column::Id.eq(session.id))
        .exec(h.state.db())
        .await
        .unwrap();

    assert!(matches!(
        h.core.attendance.mark(actor, mark(&session, "phone-a", 0.0)).await,
        Err(AppError::SessionNotFound)
    ));
    assert!(matches!(
        h.core.attendance.mark(actor, mark(&session, "phone-z", 9.0)).await,
        Err(AppError::SessionNotFound)
    ));
}

#[tokio::test]
async fn early_close_by_owner_ends_marking() {
    let h = common::harness().await;
    let (_, actor) = h.student("s@example.com", "EN001", "phone-a").await;
    let session = open_at_origin(&h).await;

    h.core.sessions.close_early(session.id, h.teacher.principal_id).await.unwrap();
    // let the storage clock move past the closing instant
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    assert!(h.core.sessions.find_active(&session.token).await.unwrap().is_none());
    assert!(matches!(
        h.core.attendance.mark(actor, mark(&session, "phone-a", 0.0)).await,
        Err(AppError::SessionNotFound)
    ));
}

#[tokio::test]
async fn other_device_is_refused_and_audited() {
    let h = common::harness().await;
    let (student, actor) = h.student("s@example.com", "EN001", "phone-a").await;
    let session = open_at_origin(&h).await;

    assert!(matches!(
        h.core.attendance.mark(actor, mark(&session, "borrowed-phone", 0.0)).await,
        Err(AppError::DeviceNotAuthorized)
    ));
    let audits = AttendanceAudit::for_attempt(h.state.db(), student.id, session.id).await.unwrap();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].device_id, "borrowed-phone");

    // the real device still works afterwards
    assert!(h.core.attendance.mark(actor, mark(&session, "phone-a", 0.0)).await.is_ok());
}

#[tokio::test]
async fn concurrent_duplicate_submissions_record_once() {
    let h = common::harness().await;
    let (student, actor) = h.student("s@example.com", "EN001", "phone-a").await;
    let session = open_at_origin(&h).await;

    let results = join_all((0..5).map(|_| {
        let engine = h.core.attendance.clone();
        let params = mark(&session, "phone-a", 0.0001);
        async move { engine.mark(actor, params).await }
    }))
    .await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, AppError::AlreadyMarked))
    );
    assert!(AttendanceRecord::find_for(h.state.db(), student.id, session.id).await.unwrap().is_some());
    assert_eq!(AttendanceRecord::count_for_session(h.state.db(), session.id).await.unwrap(), 1);
}

#[tokio::test]
async fn each_student_marks_independently() {
    let h = common::harness().await;
    let (_, a) = h.student("a@example.com", "EN001", "phone-a").await;
    let (_, b) = h.student("b@example.com", "EN002", "phone-b").await;
    let session = open_at_origin(&h).await;

    h.core.attendance.mark(a, mark(&session, "phone-a", 0.0)).await.unwrap();
    h.core.attendance.mark(b, mark(&session, "phone-b", -0.0002)).await.unwrap();
    assert_eq!(AttendanceRecord::count_for_session(h.state.db(), session.id).await.unwrap(), 2);
}
