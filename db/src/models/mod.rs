pub mod attendance_audit;
pub mod attendance_record;
pub mod attendance_session;
pub mod device_binding;
pub mod device_change_log;
pub mod device_change_request;
pub mod principal;
pub mod registration_challenge;

pub use attendance_audit::Entity as AttendanceAudit;
pub use attendance_record::Entity as AttendanceRecord;
pub use attendance_session::Entity as AttendanceSession;
pub use device_binding::Entity as DeviceBinding;
pub use device_change_log::Entity as DeviceChangeLog;
pub use device_change_request::Entity as DeviceChangeRequest;
pub use principal::Entity as Principal;
pub use registration_challenge::Entity as RegistrationChallenge;
