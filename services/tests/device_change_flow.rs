mod common;

use chrono::Duration;
use db::models::device_binding::Model as DeviceBinding;
use db::models::device_change_log::{ChangeAction, Model as ChangeLogEntry};
use db::models::device_change_request::{self, RequestStatus};
use futures::future::join_all;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait};
use services::AppError;
use services::approval_workflow::{Decision, RequestDeviceChange, VerifyDeviceChange};

fn change_to(email: &str, device: &str) -> RequestDeviceChange {
    RequestDeviceChange { email: email.into(), requested_device_id: device.into() }
}

fn verify(email: &str, code: &str, device: &str) -> VerifyDeviceChange {
    VerifyDeviceChange {
        email: email.into(),
        challenge_code: code.into(),
        requested_device_id: device.into(),
    }
}

#[tokio::test]
async fn wrong_or_expired_code_is_rejected() {
    let h = common::harness().await;
    h.student("s@example.com", "EN001", "phone-a").await;
    let issued = h.core.approvals.create(change_to("s@example.com", "phone-b")).await.unwrap();

    device_change_request::Entity::update_many()
        .set(device_change_request::ActiveModel {
            challenge_code: Set("123456".into()),
            ..Default::default()
        })
        .filter(device_change_request::Column::Id.eq(issued.request_id))
        .exec(h.state.db())
        .await
        .unwrap();

    assert!(matches!(
        h.core.approvals.verify(verify("s@example.com", "654321", "phone-b")).await,
        Err(AppError::InvalidChallenge)
    ));

    let past = db::clock::now(h.state.db()).await.unwrap() - Duration::seconds(1);
    device_change_request::Entity::update_many()
        .set(device_change_request::ActiveModel {
            challenge_expiry: Set(past),
            ..Default::default()
        })
        .filter(device_change_request::Column::Id.eq(issued.request_id))
        .exec(h.state.db())
        .await
        .unwrap();

    assert!(matches!(
        h.core.approvals.verify(verify("s@example.com", "123456", "phone-b")).await,
        Err(AppError::InvalidChallenge)
    ));
}

#[tokio::test]
async fn mixed_case_email_reaches_the_same_student() {
    let h = common::harness().await;
    let (student, _) = h.student("Ada@Example.com", "EN001", "phone-a").await;
    assert_eq!(student.email, "ada@example.com");

    let issued = h.core.approvals.create(change_to("Ada@Example.com", "phone-b")).await.unwrap();
    let code = h.last_code("ada@example.com");

    let verified = h
        .core
        .approvals
        .verify(verify(" ADA@example.com ", &code, "phone-b"))
        .await
        .unwrap();
    assert_eq!(verified.id, issued.request_id);
    assert_eq!(verified.principal_id, student.id);
    assert_eq!(verified.status, RequestStatus::OtpVerified);
}

#[tokio::test]
async fn approval_moves_the_binding() {
    let h = common::harness().await;
    let (student, _) = h.student("s@example.com", "EN001", "phone-a").await;

    let issued = h.core.approvals.create(change_to("s@example.com", "phone-b")).await.unwrap();
    let code = h.last_code("s@example.com");
    h.core.approvals.verify(verify("s@example.com", &code, "phone-b")).await.unwrap();
    h.core.approvals.dispose(h.admin, issued.request_id, Decision::Approve).await.unwrap();

    assert!(!h.core.registry.is_bound(student.id, "phone-a").await.unwrap());
    assert!(h.core.registry.is_bound(student.id, "phone-b").await.unwrap());

    let history = h.core.registry.history(student.id).await.unwrap();
    assert_eq!(history.iter().filter(|b| b.active).count(), 1);
    assert_eq!(history.len(), 2);

    let log = ChangeLogEntry::for_principal(h.state.db(), student.id).await.unwrap();
    let actions: Vec<_> = log.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![ChangeAction::Registered, ChangeAction::OtpVerified, ChangeAction::Approved]
    );

    // the student can now log in from the new device only
    assert!(h.core.principals.authorize_login("s@example.com", student.role, "phone-b").await.is_ok());
    assert!(matches!(
        h.core.principals.authorize_login("s@example.com", student.role, "phone-a").await,
        Err(AppError::DeviceNotAuthorized)
    ));
}

#[tokio::test]
async fn rejection_changes_no_binding() {
    let h = common::harness().await;
    let (student, _) = h.student("s@example.com", "EN001", "phone-a").await;

    let issued = h.core.approvals.create(change_to("s@example.com", "phone-b")).await.unwrap();
    let code = h.last_code("s@example.com");
    h.core.approvals.verify(verify("s@example.com", &code, "phone-b")).await.unwrap();
    h.core
        .approvals
        .dispose(h.admin, issued.request_id, Decision::Reject { reason: None })
        .await
        .unwrap();

    let history = h.core.registry.history(student.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(h.core.registry.is_bound(student.id, "phone-a").await.unwrap());

    let log = ChangeLogEntry::for_principal(h.state.db(), student.id).await.unwrap();
    assert_eq!(log.last().map(|e| e.action), Some(ChangeAction::Rejected));

    // a fresh request is allowed once the previous one is terminal
    assert!(h.core.approvals.create(change_to("s@example.com", "phone-c")).await.is_ok());
}

#[tokio::test]
async fn second_disposition_is_invalid_state() {
    let h = common::harness().await;
    let (student, _) = h.student("s@example.com", "EN001", "phone-a").await;

    let issued = h.core.approvals.create(change_to("s@example.com", "phone-b")).await.unwrap();
    let code = h.last_code("s@example.com");
    h.core.approvals.verify(verify("s@example.com", &code, "phone-b")).await.unwrap();

    h.core.approvals.dispose(h.admin, issued.request_id, Decision::Approve).await.unwrap();
    for decision in [Decision::Approve, Decision::Reject { reason: None }] {
        assert!(matches!(
            h.core.approvals.dispose(h.admin, issued.request_id, decision).await,
            Err(AppError::InvalidState(_))
        ));
    }

    assert_eq!(h.core.registry.history(student.id).await.unwrap().len(), 2);
    let approvals = ChangeLogEntry::for_principal(h.state.db(), student.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.action == ChangeAction::Approved)
        .count();
    assert_eq!(approvals, 1);
}

#[tokio::test]
async fn concurrent_dispositions_apply_once() {
    let h = common::harness().await;
    let (student, _) = h.student("s@example.com", "EN001", "phone-a").await;

    let issued = h.core.approvals.create(change_to("s@example.com", "phone-b")).await.unwrap();
    let code = h.last_code("s@example.com");
    h.core.approvals.verify(verify("s@example.com", &code, "phone-b")).await.unwrap();

    let (admin, request_id) = (h.admin, issued.request_id);
    let results = join_all((0..4).map(|i| {
        let approvals = h.core.approvals.clone();
        let decision = if i % 2 == 0 { Decision::Approve } else { Decision::Reject { reason: None } };
        async move { approvals.dispose(admin, request_id, decision).await }
    }))
    .await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, AppError::InvalidState(_)))
    );

    let request = device_change_request::Entity::find_by_id(issued.request_id)
        .one(h.state.db())
        .await
        .unwrap()
        .unwrap();
    assert!(request.status.is_terminal());
    assert!(DeviceBinding::count_active(h.state.db(), student.id).await.unwrap() <= 1);
}

#[tokio::test]
async fn interleaved_binds_leave_at_most_one_active() {
    let h = common::harness().await;
    let (student, _) = h.student("s@example.com", "EN001", "phone-a").await;
    let db = h.state.db_clone();
    let principal_id = student.id;

    let attempts = join_all((0..6).map(|i| {
        let db = db.clone();
        let registry = h.core.registry.clone();
        async move {
            let txn = db.begin().await?;
            let swapped = async {
                let now = db::clock::now(&txn).await?;
                if i % 2 == 0 {
                    registry.unbind(principal_id, &txn).await?;
                }
                registry.bind(principal_id, &format!("phone-{i}"), now, &txn).await?;
                Ok::<_, AppError>(())
            }
            .await;
            match swapped {
                Ok(()) => txn.commit().await?,
                Err(err) => {
                    txn.rollback().await?;
                    return Err(err);
                }
            }
            Ok::<_, AppError>(())
        }
    }))
    .await;

    assert!(attempts.iter().any(|r| r.is_ok()));
    assert!(
        attempts
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, AppError::Conflict(_)))
    );
    assert_eq!(DeviceBinding::count_active(h.state.db(), student.id).await.unwrap(), 1);
}

#[tokio::test]
async fn queue_lists_verified_requests_across_students() {
    let h = common::harness().await;
    h.student("a@example.com", "EN001", "phone-a").await;
    h.student("b@example.com", "EN002", "phone-b").await;

    h.core.approvals.create(change_to("a@example.com", "phone-a2")).await.unwrap();
    h.core.approvals.create(change_to("b@example.com", "phone-b2")).await.unwrap();
    let code = h.last_code("b@example.com");
    h.core.approvals.verify(verify("b@example.com", &code, "phone-b2")).await.unwrap();

    let queue = h
        .core
        .approvals
        .queue(h.admin, db::filters::DeviceChangeRequestFilter::new())
        .await
        .unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].requested_device_id, "phone-b2");
    assert_eq!(queue[0].status, RequestStatus::OtpVerified);
}
