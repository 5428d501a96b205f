//! Registration, activation and the login gate.
//!
//! Registration is two steps: `request_registration` validates the details and
//! mails a one-time code, and `register` consumes that code to create the
//! principal. Passwords never reach this module; the credential collaborator
//! verifies them and then asks `authorize_login` whether the principal may
//! proceed.

use chrono::{DateTime, Duration, Utc};
use db::filters::PrincipalFilter;
use db::models::device_change_log::{ChangeAction, Model as ChangeLogEntry, NewEntry};
use db::models::principal::{ActiveModel, Column, Entity, Model as Principal, Role, normalize_email};
use db::models::registration_challenge::{self, Model as RegistrationChallenge};
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use validator::{Validate, ValidationError};

use crate::actor::Actor;
use crate::challenge::{CHALLENGE_TTL_MINUTES, codes_match, generate_code};
use crate::device_registry::DeviceRegistry;
use crate::error::AppError;
use crate::notifier::Notifier;

pub const BRANCHES: [&str; 4] = ["CSE", "ECE", "ME", "CE"];
const REGISTRATION_SUBJECT: &str = "Your registration verification code";

fn validate_branch(branch: &str) -> Result<(), ValidationError> {
    if BRANCHES.contains(&branch.trim().to_ascii_uppercase().as_str()) {
        Ok(())
    } else {
        Err(ValidationError::new("branch").with_message("Branch must be one of CSE, ECE, ME, CE".into()))
    }
}

#[derive(Debug, Clone, Validate)]
pub struct RegisterPrincipal {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    pub role: Role,
    /// Required for students, rejected for everyone else.
    pub student: Option<StudentDetails>,
}

#[derive(Debug, Clone, Validate)]
pub struct StudentDetails {
    #[validate(length(min = 1, max = 32, message = "Enrollment number must be 1-32 characters"))]
    pub enrollment_no: String,
    #[validate(custom(function = "validate_branch"))]
    pub branch: String,
    #[validate(range(min = 1, max = 4, message = "Year must be between 1 and 4"))]
    pub year: i32,
}

impl RegisterPrincipal {
    fn normalized(self) -> Self {
        Self {
            email: normalize_email(&self.email),
            name: self.name.trim().to_owned(),
            role: self.role,
            student: self.student.map(|s| StudentDetails {
                enrollment_no: s.enrollment_no.trim().to_owned(),
                branch: s.branch.trim().to_ascii_uppercase(),
                year: s.year,
            }),
        }
    }
}

/// Second registration step, presented with the mailed code.
#[derive(Debug, Clone)]
pub struct CompleteRegistration {
    pub email: String,
    pub challenge_code: String,
    /// The device registering. Required for students, ignored for staff.
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationIssued {
    pub email: String,
    pub challenge_expiry: DateTime<Utc>,
    /// False when the notifier failed; the challenge still stands.
    pub delivered: bool,
}

#[derive(Clone)]
pub struct PrincipalService {
    db: DatabaseConnection,
    registry: DeviceRegistry,
    notifier: Arc<dyn Notifier>,
}

impl PrincipalService {
    pub fn new(db: DatabaseConnection, registry: DeviceRegistry, notifier: Arc<dyn Notifier>) -> Self {
        Self { db, registry, notifier }
    }

    /// Validates the details, stores them behind a fresh code and mails it.
    ///
    /// A repeated request for the same address replaces the earlier code.
    pub async fn request_registration(&self, params: RegisterPrincipal) -> Result<RegistrationIssued, AppError> {
        let params = params.normalized();
        params.validate()?;
        match (params.role, &params.student) {
            (Role::Student, Some(details)) => details.validate()?,
            (Role::Student, None) => {
                return Err(AppError::Validation("Student details are required".into()));
            }
            (_, Some(_)) => {
                return Err(AppError::Validation("Only students carry student details".into()));
            }
            (_, None) => {}
        }

        let txn = self.db.begin().await?;
        let challenge = match Self::request_in(&txn, params).await {
            Ok(challenge) => challenge,
            Err(err) => {
                rollback(txn).await;
                tracing::warn!(error = %err, "registration request refused");
                return Err(err);
            }
        };
        txn.commit().await?;
        tracing::info!(role = %challenge.role, "registration code issued");

        let body = format!(
            "Hello {},\n\nYour registration code is {}. It expires in {} minutes.\n\n\
             If you did not sign up, ignore this message.",
            challenge.name, challenge.challenge_code, CHALLENGE_TTL_MINUTES
        );
        let delivered = match self.notifier.send(&challenge.email, REGISTRATION_SUBJECT, &body).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(error = %err, "registration code delivery failed");
                false
            }
        };

        Ok(RegistrationIssued {
            email: challenge.email,
            challenge_expiry: challenge.challenge_expiry,
            delivered,
        })
    }

    async fn request_in(
        txn: &DatabaseTransaction,
        params: RegisterPrincipal,
    ) -> Result<RegistrationChallenge, AppError> {
        Self::ensure_unclaimed(txn, &params.email, params.student.as_ref().map(|s| s.enrollment_no.as_str()))
            .await?;

        let now = db::clock::now(txn).await?;
        registration_challenge::Entity::delete_many()
            .filter(registration_challenge::Column::Email.eq(params.email.as_str()))
            .exec(txn)
            .await?;

        let student = params.student;
        let challenge = registration_challenge::ActiveModel {
            email: Set(params.email),
            challenge_code: Set(generate_code()),
            challenge_expiry: Set(now + Duration::minutes(CHALLENGE_TTL_MINUTES)),
            name: Set(params.name),
            role: Set(params.role),
            enrollment_no: Set(student.as_ref().map(|s| s.enrollment_no.clone())),
            branch: Set(student.as_ref().map(|s| s.branch.clone())),
            year: Set(student.as_ref().map(|s| s.year)),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(txn)
        .await
        .map_err(|e| AppError::from_insert(e, AppError::Conflict("Registration already in progress".into())))?;

        Ok(challenge)
    }

    async fn ensure_unclaimed(
        txn: &DatabaseTransaction,
        email: &str,
        enrollment_no: Option<&str>,
    ) -> Result<(), AppError> {
        if Principal::find_by_email(txn, email).await?.is_some() {
            return Err(AppError::Conflict("Email already registered".into()));
        }
        if let Some(enrollment_no) = enrollment_no {
            if Principal::find_by_enrollment_no(txn, enrollment_no).await?.is_some() {
                return Err(AppError::Conflict("Enrollment number already registered".into()));
            }
        }
        Ok(())
    }

    /// Consumes the mailed code and creates the principal from the details
    /// stored with it. Students start inactive with the presenting device
    /// bound; the row, binding and log entry commit together.
    ///
    /// A wrong, lapsed, already used or unknown code is `InvalidChallenge`.
    pub async fn register(&self, params: CompleteRegistration) -> Result<Principal, AppError> {
        let txn = self.db.begin().await?;
        match self.register_in(&txn, &params).await {
            Ok(principal) => {
                txn.commit().await?;
                tracing::info!(principal_id = principal.id, role = %principal.role, "principal registered");
                Ok(principal)
            }
            Err(err) => {
                rollback(txn).await;
                tracing::warn!(error = %err, "registration refused");
                Err(err)
            }
        }
    }

    async fn register_in(
        &self,
        txn: &DatabaseTransaction,
        params: &CompleteRegistration,
    ) -> Result<Principal, AppError> {
        let Some(challenge) = RegistrationChallenge::find_by_email(txn, &params.email).await? else {
            return Err(AppError::InvalidChallenge);
        };
        let now = db::clock::now(txn).await?;
        if !codes_match(&challenge.challenge_code, params.challenge_code.trim()) || !challenge.is_live_at(now) {
            return Err(AppError::InvalidChallenge);
        }

        let device_id = match challenge.role {
            Role::Student => {
                let device = params.device_id.as_deref().map(str::trim).unwrap_or_default();
                if device.is_empty() || device.len() > 255 {
                    return Err(AppError::Validation("Device id is required".into()));
                }
                Some(device.to_owned())
            }
            _ => None,
        };

        let consumed = registration_challenge::Entity::delete_many()
            .filter(registration_challenge::Column::Id.eq(challenge.id))
            .exec(txn)
            .await?;
        if consumed.rows_affected != 1 {
            return Err(AppError::InvalidChallenge);
        }

        Self::ensure_unclaimed(txn, &challenge.email, challenge.enrollment_no.as_deref()).await?;

        let principal = ActiveModel {
            email: Set(challenge.email),
            name: Set(challenge.name),
            role: Set(challenge.role),
            enrollment_no: Set(challenge.enrollment_no),
            branch: Set(challenge.branch),
            year: Set(challenge.year),
            is_active: Set(challenge.role != Role::Student),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(txn)
        .await
        .map_err(|e| AppError::from_insert(e, AppError::Conflict("Principal already registered".into())))?;

        if let Some(device_id) = device_id {
            self.registry.bind(principal.id, &device_id, now, txn).await?;
            ChangeLogEntry::append(
                txn,
                NewEntry {
                    principal_id: principal.id,
                    request_id: None,
                    old_device_id: None,
                    new_device_id: Some(device_id),
                    actor_id: None,
                    action: ChangeAction::Registered,
                    message: "Initial device bound at registration".into(),
                },
                now,
            )
            .await?;
        }

        Ok(principal)
    }

    /// Admin only.
    pub async fn set_active(&self, actor: Actor, principal_id: i64, active: bool) -> Result<Principal, AppError> {
        actor.require(Role::Admin)?;
        let now = db::clock::now(&self.db).await?;

        let result = Entity::update_many()
            .set(ActiveModel {
                is_active: Set(active),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(Column::Id.eq(principal_id))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!("Principal {principal_id} not found")));
        }

        tracing::info!(principal_id, active, admin_id = actor.principal_id, "activation changed");
        Entity::find_by_id(principal_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Principal {principal_id} not found")))
    }

    /// Gate applied after the password has been verified elsewhere.
    ///
    /// Students must also present their bound device.
    pub async fn authorize_login(&self, email: &str, role: Role, device_id: &str) -> Result<Actor, AppError> {
        let principal = Principal::find_by_email(&self.db, email)
            .await?
            .filter(|p| p.role == role)
            .ok_or_else(|| AppError::NotFound("Account not found".into()))?;

        if !principal.is_active {
            return Err(AppError::PermissionDenied("Account not approved".into()));
        }

        if role == Role::Student && !self.registry.is_bound(principal.id, device_id).await? {
            tracing::warn!(principal_id = principal.id, "login from unbound device");
            return Err(AppError::DeviceNotAuthorized);
        }

        Ok(Actor::from(&principal))
    }

    pub async fn find_all(&self, filter: PrincipalFilter) -> Result<Vec<Principal>, AppError> {
        Ok(Entity::find()
            .filter(filter.condition())
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
