use async_trait::async_trait;
use db::models::device_binding;
use db::models::principal::{self, Role};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

use crate::error::AppError;
use crate::notifier::Notifier;

/// A transport that is always down.
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), AppError> {
        Err(AppError::Delivery("smtp relay unreachable".into()))
    }
}

async fn principal(db: &DatabaseConnection, email: &str, role: Role) -> principal::Model {
    let now = db::clock::now(db).await.unwrap();
    principal::ActiveModel {
        email: Set(email.into()),
        name: Set(email.split('@').next().unwrap_or(email).into()),
        role: Set(role),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert principal")
}

pub async fn student(db: &DatabaseConnection, email: &str) -> principal::Model {
    principal(db, email, Role::Student).await
}

pub async fn teacher(db: &DatabaseConnection, email: &str) -> principal::Model {
    principal(db, email, Role::Teacher).await
}

pub async fn admin(db: &DatabaseConnection, email: &str) -> principal::Model {
    principal(db, email, Role::Admin).await
}

pub async fn bind(db: &DatabaseConnection, principal_id: i64, device_id: &str) -> device_binding::Model {
    let now = db::clock::now(db).await.unwrap();
    device_binding::ActiveModel {
        principal_id: Set(principal_id),
        device_id: Set(device_id.into()),
        active: Set(true),
        bound_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert binding")
}
