use db::models::principal::{self, Role};

use crate::error::AppError;

/// The identity the credential collaborator vouches for on a request.
///
/// The core trusts these fields verbatim; it never re-verifies credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub principal_id: i64,
    pub role: Role,
    pub is_active: bool,
}

impl Actor {
    pub fn new(principal_id: i64, role: Role, is_active: bool) -> Self {
        Self { principal_id, role, is_active }
    }

    /// Fails unless the actor is active and holds `role`.
    pub fn require(&self, role: Role) -> Result<(), AppError> {
        if self.role != role {
            return Err(AppError::PermissionDenied(format!("Requires the {role} role")));
        }
        if !self.is_active {
            return Err(AppError::PermissionDenied("Account not approved".into()));
        }
        Ok(())
    }
}

impl From<&principal::Model> for Actor {
    fn from(p: &principal::Model) -> Self {
        Self::new(p.id, p.role, p.is_active)
    }
}
