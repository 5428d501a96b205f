#![allow(dead_code)]

use db::models::principal::{Model as Principal, Role};
use db::test_utils::setup_test_db;
use services::notifier::OutboxNotifier;
use services::principal_service::{CompleteRegistration, RegisterPrincipal, StudentDetails};
use services::{Actor, Core};
use std::sync::Arc;
use util::config::AppConfig;
use util::state::AppState;

pub struct Harness {
    pub state: AppState,
    pub core: Core,
    pub outbox: OutboxNotifier,
    pub admin: Actor,
    pub teacher: Actor,
}

pub fn test_config() -> AppConfig {
    AppConfig {
        env: "test".into(),
        project_name: "geoattend".into(),
        log_level: "warn".into(),
        log_file: "geoattend-test.log".into(),
        log_to_stdout: false,
        database_path: "sqlite::memory:".into(),
        max_distance_meters: 40.0,
        session_ttl_minutes: 10,
        gmail_username: String::new(),
        gmail_app_password: String::new(),
        email_from_name: "GeoAttend".into(),
    }
}

/// Both registration steps, reading the code back from the outbox.
pub async fn register(
    core: &Core,
    outbox: &OutboxNotifier,
    params: RegisterPrincipal,
    device_id: Option<&str>,
) -> Principal {
    let email = params.email.trim().to_ascii_lowercase();
    core.principals.request_registration(params).await.unwrap();
    let code = outbox.last_code_to(&email).expect("registration code sent");
    core.principals
        .register(CompleteRegistration {
            email,
            challenge_code: code,
            device_id: device_id.map(str::to_owned),
        })
        .await
        .unwrap()
}

pub async fn harness() -> Harness {
    let state = AppState::new(setup_test_db().await, test_config());
    let outbox = OutboxNotifier::new();
    let core = Core::new(&state, Arc::new(outbox.clone()));

    let staff = |email: &str, name: &str, role: Role| RegisterPrincipal {
        email: email.into(),
        name: name.into(),
        role,
        student: None,
    };
    let admin = register(&core, &outbox, staff("admin@example.com", "Admin", Role::Admin), None).await;
    let teacher = register(&core, &outbox, staff("teacher@example.com", "Teacher", Role::Teacher), None).await;

    Harness {
        state,
        core,
        outbox,
        admin: Actor::from(&admin),
        teacher: Actor::from(&teacher),
    }
}

impl Harness {
    /// Registers and activates a student bound to `device_id`.
    pub async fn student(&self, email: &str, enrollment_no: &str, device_id: &str) -> (Principal, Actor) {
        let params = RegisterPrincipal {
            email: email.into(),
            name: "Student".into(),
            role: Role::Student,
            student: Some(StudentDetails {
                enrollment_no: enrollment_no.into(),
                branch: "ECE".into(),
                year: 3,
            }),
        };
        let student = register(&self.core, &self.outbox, params, Some(device_id)).await;
        let student = self.core.principals.set_active(self.admin, student.id, true).await.unwrap();
        let actor = Actor::from(&student);
        (student, actor)
    }

    /// The six-digit code in the latest message sent to `email`.
    pub fn last_code(&self, email: &str) -> String {
        self.outbox.last_code_to(email).expect("code in message")
    }
}
