pub mod principal;
pub mod session;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const TEACHER_EMAIL: &str = "teacher@example.com";
pub const STUDENT_EMAIL: &str = "student@example.com";
