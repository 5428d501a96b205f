use super::{ADMIN_EMAIL, STUDENT_EMAIL, TEACHER_EMAIL};
use crate::seed::Seeder;
use db::models::principal::Role;
use fake::{Fake, faker::internet::en::SafeEmail, faker::name::en::Name};
use services::notifier::OutboxNotifier;
use services::principal_service::{BRANCHES, CompleteRegistration, RegisterPrincipal, StudentDetails};
use services::{AppError, Core};

/// Registers through the mailed-code flow, reading codes back from `outbox`.
pub struct PrincipalSeeder {
    pub outbox: OutboxNotifier,
}

fn staff(email: &str, name: &str, role: Role) -> (RegisterPrincipal, Option<String>) {
    (RegisterPrincipal { email: email.into(), name: name.into(), role, student: None }, None)
}

fn student(email: String, name: String, n: u32) -> (RegisterPrincipal, Option<String>) {
    let params = RegisterPrincipal {
        email,
        name,
        role: Role::Student,
        student: Some(StudentDetails {
            enrollment_no: format!("EN{n:08}"),
            branch: BRANCHES[fastrand::usize(..BRANCHES.len())].into(),
            year: fastrand::i32(1..=4),
        }),
    };
    (params, Some(format!("seed-device-{n:04}")))
}

impl PrincipalSeeder {
    /// Registration that tolerates an already-seeded database.
    async fn register(
        &self,
        core: &Core,
        (params, device_id): (RegisterPrincipal, Option<String>),
    ) -> Result<(), AppError> {
        let issued = match core.principals.request_registration(params).await {
            Ok(issued) => issued,
            Err(AppError::Conflict(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        let challenge_code = self
            .outbox
            .last_code_to(&issued.email)
            .ok_or_else(|| AppError::Delivery(format!("no code captured for {}", issued.email)))?;

        core.principals
            .register(CompleteRegistration { email: issued.email, challenge_code, device_id })
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Seeder for PrincipalSeeder {
    async fn seed(&self, core: &Core) -> Result<(), AppError> {
        self.register(core, staff(ADMIN_EMAIL, "Admin", Role::Admin)).await?;
        self.register(core, staff(TEACHER_EMAIL, "Teacher", Role::Teacher)).await?;
        self.register(core, student(STUDENT_EMAIL.into(), "Student".into(), 1)).await?;

        for n in 2..12 {
            self.register(core, student(SafeEmail().fake(), Name().fake(), n)).await?;
        }

        let admin = core.principals.authorize_login(ADMIN_EMAIL, Role::Admin, "").await?;
        let pending = core
            .principals
            .find_all(
                db::filters::PrincipalFilter::new()
                    .with_role(Role::Student)
                    .with_active(false),
            )
            .await?;

        // Leave a couple of students awaiting approval.
        for p in pending.iter().skip(2).chain(pending.iter().filter(|p| p.email == STUDENT_EMAIL)) {
            core.principals.set_active(admin, p.id, true).await?;
        }

        Ok(())
    }
}
