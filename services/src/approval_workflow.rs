//! Device-change requests: `pending -> otp_verified -> {approved | rejected}`.
//!
//! A lapsed `pending` request moves to `expired` when its owner raises a new
//! one. Every transition is a compare-and-set on the current status, so a
//! code cannot verify twice and a request cannot be disposed twice.

use chrono::{DateTime, Duration, Utc};
use db::filters::DeviceChangeRequestFilter;
use db::models::device_change_log::{ChangeAction, Model as ChangeLogEntry, NewEntry};
use db::models::device_change_request::{
    ActiveModel, Column, Entity, Model as DeviceChangeRequest, RequestStatus,
};
use db::models::principal::{Model as Principal, Role};
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;

use crate::actor::Actor;
use crate::challenge::{codes_match, generate_code};
use crate::device_registry::DeviceRegistry;
use crate::error::AppError;
use crate::notifier::Notifier;

pub use crate::challenge::CHALLENGE_TTL_MINUTES;

const CHALLENGE_SUBJECT: &str = "Your device change verification code";

#[derive(Debug, Clone)]
pub struct RequestDeviceChange {
    pub email: String,
    pub requested_device_id: String,
}

#[derive(Debug, Clone)]
pub struct VerifyDeviceChange {
    pub email: String,
    pub challenge_code: String,
    pub requested_device_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject { reason: Option<String> },
}

#[derive(Debug, Clone, Serialize)]
pub struct ChallengeIssued {
    pub request_id: i64,
    pub challenge_expiry: DateTime<Utc>,
    /// False when the notifier failed; the challenge still stands.
    pub delivered: bool,
}

#[derive(Clone)]
pub struct ApprovalWorkflow {
    db: DatabaseConnection,
    registry: DeviceRegistry,
    notifier: Arc<dyn Notifier>,
}

impl ApprovalWorkflow {
    pub fn new(db: DatabaseConnection, registry: DeviceRegistry, notifier: Arc<dyn Notifier>) -> Self {
        Self { db, registry, notifier }
    }

    /// Raises a request for `requested_device_id` and sends the challenge.
    pub async fn create(&self, params: RequestDeviceChange) -> Result<ChallengeIssued, AppError> {
        let requested = params.requested_device_id.trim();
        if requested.is_empty() {
            return Err(AppError::Validation("Requested device id is required".into()));
        }

        let txn = self.db.begin().await?;
        let created = match self.create_in(&txn, params.email.trim(), requested).await {
            Ok(created) => created,
            Err(err) => {
                rollback(txn).await;
                tracing::warn!(email = params.email.trim(), error = %err, "device change request refused");
                return Err(err);
            }
        };
        txn.commit().await?;

        let (principal, request) = created;
        tracing::info!(
            principal_id = principal.id,
            request_id = request.id,
            "device change requested"
        );

        let body = format!(
            "Hello {},\n\nYour verification code is {}. It expires in {} minutes.\n\n\
             If you did not request a device change, ignore this message.",
            principal.name, request.challenge_code, CHALLENGE_TTL_MINUTES
        );
        let delivered = match self.notifier.send(&principal.email, CHALLENGE_SUBJECT, &body).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(request_id = request.id, error = %err, "challenge delivery failed");
                false
            }
        };

        Ok(ChallengeIssued {
            request_id: request.id,
            challenge_expiry: request.challenge_expiry,
            delivered,
        })
    }

    async fn create_in(
        &self,
        txn: &DatabaseTransaction,
        email: &str,
        requested: &str,
    ) -> Result<(Principal, DeviceChangeRequest), AppError> {
        let principal = Principal::find_by_email(txn, email)
            .await?
            .filter(|p| p.role == Role::Student)
            .ok_or_else(|| AppError::Validation("Unknown student".into()))?;

        let current = DeviceRegistry::active_binding_on(txn, principal.id).await?;
        if current.as_ref().is_some_and(|b| b.device_id == requested) {
            return Err(AppError::Validation("Requested device is already bound".into()));
        }

        let now = db::clock::now(txn).await?;

        let expired = Entity::update_many()
            .set(ActiveModel {
                status: Set(RequestStatus::Expired),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(Column::PrincipalId.eq(principal.id))
            .filter(Column::Status.eq(RequestStatus::Pending))
            .filter(Column::ChallengeExpiry.lte(now))
            .exec(txn)
            .await?;
        if expired.rows_affected > 0 {
            tracing::info!(principal_id = principal.id, count = expired.rows_affected, "lapsed challenges expired");
        }

        if DeviceChangeRequest::find_outstanding(txn, principal.id).await?.is_some() {
            return Err(AppError::Conflict("A device change request is already in progress".into()));
        }

        let request = ActiveModel {
            principal_id: Set(principal.id),
            current_device_id: Set(current.map(|b| b.device_id)),
            requested_device_id: Set(requested.to_owned()),
            challenge_code: Set(generate_code()),
            challenge_expiry: Set(now + Duration::minutes(CHALLENGE_TTL_MINUTES)),
            status: Set(RequestStatus::Pending),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(txn)
        .await
        .map_err(|e| {
            AppError::from_insert(
                e,
                AppError::Conflict("A device change request is already in progress".into()),
            )
        })?;

        Ok((principal, request))
    }

    /// Consumes the challenge. Every failure cause is `InvalidChallenge`.
    pub async fn verify(&self, params: VerifyDeviceChange) -> Result<DeviceChangeRequest, AppError> {
        let txn = self.db.begin().await?;
        match Self::verify_in(&txn, &params).await {
            Ok(request) => {
                txn.commit().await?;
                tracing::info!(request_id = request.id, "device change challenge verified");
                Ok(request)
            }
            Err(err) => {
                rollback(txn).await;
                tracing::warn!(email = params.email.trim(), error = %err, "device change verification refused");
                Err(err)
            }
        }
    }

    async fn verify_in(
        txn: &DatabaseTransaction,
        params: &VerifyDeviceChange,
    ) -> Result<DeviceChangeRequest, AppError> {
        let Some(principal) = Principal::find_by_email(txn, &params.email).await? else {
            return Err(AppError::InvalidChallenge);
        };
        let now = db::clock::now(txn).await?;

        let candidate = Entity::find()
            .filter(Column::PrincipalId.eq(principal.id))
            .filter(Column::Status.eq(RequestStatus::Pending))
            .one(txn)
            .await?;

        let Some(request) = candidate.filter(|r| {
            codes_match(&r.challenge_code, params.challenge_code.trim())
                && r.requested_device_id == params.requested_device_id.trim()
                && r.challenge_expiry > now
        }) else {
            return Err(AppError::InvalidChallenge);
        };

        let consumed = Entity::update_many()
            .set(ActiveModel {
                status: Set(RequestStatus::OtpVerified),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(Column::Id.eq(request.id))
            .filter(Column::Status.eq(RequestStatus::Pending))
            .exec(txn)
            .await?;
        if consumed.rows_affected != 1 {
            return Err(AppError::InvalidChallenge);
        }

        ChangeLogEntry::append(
            txn,
            NewEntry {
                principal_id: principal.id,
                request_id: Some(request.id),
                old_device_id: request.current_device_id.clone(),
                new_device_id: Some(request.requested_device_id.clone()),
                actor_id: Some(principal.id),
                action: ChangeAction::OtpVerified,
                message: "Verification code confirmed".into(),
            },
            now,
        )
        .await?;

        Ok(DeviceChangeRequest {
            status: RequestStatus::OtpVerified,
            updated_at: now,
            ..request
        })
    }

    /// Approves or rejects an `otp_verified` request. Admin only.
    ///
    /// Approval swaps the binding, logs it and closes the request in one
    /// transaction. A request that is no longer `otp_verified` fails with
    /// `InvalidState` and changes nothing.
    pub async fn dispose(
        &self,
        actor: Actor,
        request_id: i64,
        decision: Decision,
    ) -> Result<DeviceChangeRequest, AppError> {
        actor.require(Role::Admin)?;

        let txn = self.db.begin().await?;
        match self.dispose_in(&txn, actor, request_id, &decision).await {
            Ok(request) => {
                txn.commit().await?;
                tracing::info!(
                    request_id,
                    admin_id = actor.principal_id,
                    status = %request.status,
                    "device change request disposed"
                );
                Ok(request)
            }
            Err(err) => {
                rollback(txn).await;
                if matches!(err, AppError::Storage(_)) {
                    tracing::error!(request_id, error = ?err, "device change disposition failed");
                } else {
                    tracing::warn!(request_id, error = %err, "device change disposition refused");
                }
                Err(err)
            }
        }
    }

    async fn dispose_in(
        &self,
        txn: &DatabaseTransaction,
        actor: Actor,
        request_id: i64,
        decision: &Decision,
    ) -> Result<DeviceChangeRequest, AppError> {
        let request = Entity::find_by_id(request_id)
            .one(txn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Device change request {request_id} not found")))?;

        if request.status != RequestStatus::OtpVerified {
            return Err(AppError::InvalidState(format!(
                "Request is {}, expected otp_verified",
                request.status
            )));
        }

        let now = db::clock::now(txn).await?;
        let (status, reason) = match decision {
            Decision::Approve => (RequestStatus::Approved, None),
            Decision::Reject { reason } => (
                RequestStatus::Rejected,
                reason.as_deref().map(str::trim).filter(|r| !r.is_empty()).map(str::to_owned),
            ),
        };

        let claimed = Entity::update_many()
            .set(ActiveModel {
                status: Set(status),
                disposed_by: Set(Some(actor.principal_id)),
                disposition_reason: Set(reason.clone()),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(Column::Id.eq(request.id))
            .filter(Column::Status.eq(RequestStatus::OtpVerified))
            .exec(txn)
            .await?;
        if claimed.rows_affected != 1 {
            return Err(AppError::InvalidState("Request was disposed concurrently".into()));
        }

        let entry = match decision {
            Decision::Approve => {
                let previous = self.registry.unbind(request.principal_id, txn).await?;
                self.registry
                    .bind(request.principal_id, &request.requested_device_id, now, txn)
                    .await?;
                NewEntry {
                    principal_id: request.principal_id,
                    request_id: Some(request.id),
                    old_device_id: previous.map(|b| b.device_id),
                    new_device_id: Some(request.requested_device_id.clone()),
                    actor_id: Some(actor.principal_id),
                    action: ChangeAction::Approved,
                    message: "Device change approved".into(),
                }
            }
            Decision::Reject { .. } => NewEntry {
                principal_id: request.principal_id,
                request_id: Some(request.id),
                old_device_id: request.current_device_id.clone(),
                new_device_id: Some(request.requested_device_id.clone()),
                actor_id: Some(actor.principal_id),
                action: ChangeAction::Rejected,
                message: match &reason {
                    Some(r) => format!("Device change rejected: {r}"),
                    None => "Device change rejected".into(),
                },
            },
        };
        ChangeLogEntry::append(txn, entry, now).await?;

        Ok(DeviceChangeRequest {
            status,
            disposed_by: Some(actor.principal_id),
            disposition_reason: reason,
            updated_at: now,
            ..request
        })
    }

    /// Requests awaiting or past disposition, oldest first.
    ///
    /// With no status in `filter`, only `otp_verified` requests are listed.
    pub async fn queue(
        &self,
        actor: Actor,
        filter: DeviceChangeRequestFilter,
    ) -> Result<Vec<DeviceChangeRequest>, AppError> {
        actor.require(Role::Admin)?;
        let filter = match filter.status {
            Some(_) => filter,
            None => filter.with_status(RequestStatus::OtpVerified),
        };

        Ok(Entity::find()
            .filter(filter.condition())
            .order_by_asc(Column::CreatedAt)
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await?)
    }
}

async fn rollback(txn: DatabaseTransaction) {
    if let Err(err) = txn.rollback().await {
        tracing::error!(error = %err, "rollback failed");
    }
}
