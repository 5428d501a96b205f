use super::TEACHER_EMAIL;
use crate::seed::Seeder;
use db::models::principal::Role;
use services::session_issuer::OpenSession;
use services::{AppError, Core};

pub struct SessionSeeder;

#[async_trait::async_trait]
impl Seeder for SessionSeeder {
    async fn seed(&self, core: &Core) -> Result<(), AppError> {
        let teacher = core.principals.authorize_login(TEACHER_EMAIL, Role::Teacher, "").await?;

        let session = core
            .sessions
            .open(
                teacher,
                OpenSession {
                    subject_id: 1,
                    class_id: 1,
                    name: "Seeded lecture".into(),
                    anchor_latitude: -25.7545,
                    anchor_longitude: 28.2314,
                    ttl_minutes: Some(60),
                },
            )
            .await?;

        tracing::info!(session_id = session.id, token = %session.token, "seeded attendance session");
        Ok(())
    }
}
