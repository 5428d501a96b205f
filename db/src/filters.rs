//! Optional equality / range filters composed into SeaORM conditions.
//!
//! Every value is bound as a query parameter; nothing is spliced into SQL text.

use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, Condition};

use crate::models::device_change_request::{self, RequestStatus};
use crate::models::principal::{self, Role};

#[derive(Debug, Clone, Default)]
pub struct PrincipalFilter {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    /// Substring match on email, name or enrollment number.
    pub query: Option<String>,
}

impl PrincipalFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn condition(&self) -> Condition {
        let mut cond = Condition::all();

        if let Some(role) = self.role {
            cond = cond.add(principal::Column::Role.eq(role));
        }
        if let Some(is_active) = self.is_active {
            cond = cond.add(principal::Column::IsActive.eq(is_active));
        }
        if let Some(q) = self.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            cond = cond.add(
                Condition::any()
                    .add(principal::Column::Email.contains(q))
                    .add(principal::Column::Name.contains(q))
                    .add(principal::Column::EnrollmentNo.contains(q)),
            );
        }

        cond
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeviceChangeRequestFilter {
    pub principal_id: Option<i64>,
    pub status: Option<RequestStatus>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl DeviceChangeRequestFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_principal(mut self, principal_id: i64) -> Self {
        self.principal_id = Some(principal_id);
        self
    }

    pub fn with_status(mut self, status: RequestStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn created_between(
        mut self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_after = after;
        self.created_before = before;
        self
    }

    pub fn condition(&self) -> Condition {
        let mut cond = Condition::all();

        if let Some(principal_id) = self.principal_id {
            cond = cond.add(device_change_request::Column::PrincipalId.eq(principal_id));
        }
        if let Some(status) = self.status {
            cond = cond.add(device_change_request::Column::Status.eq(status));
        }
        if let Some(after) = self.created_after {
            cond = cond.add(device_change_request::Column::CreatedAt.gte(after));
        }
        if let Some(before) = self.created_before {
            cond = cond.add(device_change_request::Column::CreatedAt.lt(before));
        }

        cond
    }
}
