pub mod m202510010001_create_principals;
pub mod m202510010002_create_device_bindings;
pub mod m202510010003_create_device_change_requests;
pub mod m202510010004_create_device_change_logs;
pub mod m202510010005_create_attendance_sessions;
pub mod m202510010006_create_attendance_records;
pub mod m202510010007_create_attendance_audits;
pub mod m202510010008_create_registration_challenges;
