use sea_orm::{DbErr, SqlErr};
use thiserror::Error;
use validator::ValidationErrors;

/// Every failure the core can report.
///
/// Business-rule variants carry just enough for the caller to act on.
/// `Storage` keeps the underlying `DbErr` as its source for logs but displays
/// generically.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PermissionDenied(String),

    /// Wrong, expired, consumed, or out-of-state challenge. Deliberately one variant.
    #[error("Invalid or expired challenge code")]
    InvalidChallenge,

    #[error("{0}")]
    InvalidState(String),

    /// Unknown or inactive session token. Deliberately one variant.
    #[error("Invalid or expired session")]
    SessionNotFound,

    #[error("Attendance already marked for this session")]
    AlreadyMarked,

    #[error("Device not authorized")]
    DeviceNotAuthorized,

    #[error("Location is {distance_m:.0}m from the session, limit is {threshold_m:.0}m")]
    GeofenceViolation { distance_m: f64, threshold_m: f64 },

    #[error("Failed to deliver notification: {0}")]
    Delivery(String),

    #[error("Storage failure")]
    Storage(#[source] DbErr),
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        AppError::Storage(err)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(format_validation_errors(&errors))
    }
}

impl AppError {
    /// Maps a unique-constraint violation to `on_unique`, anything else to `Storage`.
    pub(crate) fn from_insert(err: DbErr, on_unique: AppError) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => on_unique,
            _ => AppError::Storage(err),
        }
    }
}

/// Flattens `validator` output into one `; `-separated message.
pub fn format_validation_errors(errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| match &e.message {
                Some(m) => m.to_string(),
                None => format!("{field} is invalid"),
            })
        })
        .collect();
    messages.sort();
    messages.join("; ")
}
