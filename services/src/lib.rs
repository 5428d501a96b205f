//! GeoAttend core: device binding, device-change approval, attendance
//! sessions and geofenced attendance marking.
//!
//! Every component is built from an explicit [`AppState`]; nothing here
//! reaches for a global connection or the global configuration.

pub mod actor;
pub mod approval_workflow;
pub mod attendance_engine;
pub mod challenge;
pub mod device_registry;
pub mod error;
pub mod geo;
pub mod notifier;
pub mod principal_service;
pub mod session_issuer;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use util::state::AppState;

pub use actor::Actor;
pub use approval_workflow::ApprovalWorkflow;
pub use attendance_engine::AttendanceEngine;
pub use device_registry::DeviceRegistry;
pub use error::AppError;
pub use notifier::Notifier;
pub use principal_service::PrincipalService;
pub use session_issuer::SessionIssuer;

/// All core components wired to one storage handle.
#[derive(Clone)]
pub struct Core {
    pub registry: DeviceRegistry,
    pub principals: PrincipalService,
    pub approvals: ApprovalWorkflow,
    pub sessions: SessionIssuer,
    pub attendance: AttendanceEngine,
}

impl Core {
    pub fn new(state: &AppState, notifier: Arc<dyn Notifier>) -> Self {
        let db = state.db_clone();
        let config = state.config();
        let registry = DeviceRegistry::new(db.clone());

        Self {
            principals: PrincipalService::new(db.clone(), registry.clone(), notifier.clone()),
            approvals: ApprovalWorkflow::new(db.clone(), registry.clone(), notifier),
            sessions: SessionIssuer::new(db.clone(), config.session_ttl_minutes),
            attendance: AttendanceEngine::new(db, config.max_distance_meters),
            registry,
        }
    }
}
