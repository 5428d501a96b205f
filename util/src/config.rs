//! Global application configuration manager.
//!
//! `AppConfig` is a lazily initialized, globally accessible singleton containing
//! runtime configuration values loaded from environment variables. Binaries read
//! it once at start-up and hand the relevant values to each component; nothing
//! in the core reads the singleton on its own.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::{OnceLock, RwLock};

/// Represents the complete application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub project_name: String,
    pub log_level: String,
    pub log_file: String,
    pub log_to_stdout: bool,
    pub database_path: String,
    /// Geofence radius around a session anchor, in meters.
    pub max_distance_meters: f64,
    /// Default lifetime of a newly opened attendance session.
    pub session_ttl_minutes: i64,
    pub gmail_username: String,
    pub gmail_app_password: String,
    pub email_from_name: String,
}

/// Lazily-initialized, thread-safe singleton instance of `AppConfig`.
static CONFIG_INSTANCE: OnceLock<RwLock<AppConfig>> = OnceLock::new();

/// Reads a strictly positive number, keeping `default` when the variable is
/// unset and warning when it is malformed or not positive.
fn parse_positive_or<T>(key: &str, default: T) -> T
where
    T: FromStr + PartialOrd + Default + Display,
{
    let Ok(raw) = env::var(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => value,
        Ok(value) => {
            tracing::warn!(key, %value, %default, "value must be positive, using default");
            default
        }
        Err(_) => {
            tracing::warn!(key, value = raw.as_str(), %default, "malformed number, using default");
            default
        }
    }
}

impl AppConfig {
    /// Loads the configuration from `.env` and environment variables.
    ///
    /// Panics if `DATABASE_PATH` is missing. Numeric values that are malformed
    /// or not positive fall back to their defaults with a warning.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            env: env::var("APP_ENV").unwrap_or_else(|_| "development".into()),
            project_name: env::var("PROJECT_NAME").unwrap_or_else(|_| "geoattend".into()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_file: env::var("LOG_FILE").unwrap_or_else(|_| "geoattend.log".into()),
            log_to_stdout: env::var("LOG_TO_STDOUT").unwrap_or_else(|_| "false".into()) == "true",
            database_path: env::var("DATABASE_PATH").expect("DATABASE_PATH is required"),
            max_distance_meters: parse_positive_or("MAX_DISTANCE_METERS", 40.0),
            session_ttl_minutes: parse_positive_or("SESSION_TTL_MINUTES", 10),
            gmail_username: env::var("GMAIL_USERNAME").unwrap_or_default(),
            gmail_app_password: env::var("GMAIL_APP_PASSWORD").unwrap_or_default(),
            email_from_name: env::var("EMAIL_FROM_NAME").unwrap_or_else(|_| "GeoAttend".into()),
        }
    }

    /// True when both SMTP credentials are present.
    pub fn smtp_configured(&self) -> bool {
        !self.gmail_username.is_empty() && !self.gmail_app_password.is_empty()
    }

    /// Returns a shared reference to the global configuration.
    ///
    /// # Panics
    /// Panics if the lock cannot be acquired.
    pub fn global() -> std::sync::RwLockReadGuard<'static, AppConfig> {
        CONFIG_INSTANCE
            .get_or_init(|| RwLock::new(AppConfig::from_env()))
            .read()
            .expect("Failed to acquire AppConfig read lock")
    }

    /// Resets the configuration by reloading from environment variables.
    ///
    /// Useful in tests to clear overrides.
    pub fn reset() {
        if let Some(lock) = CONFIG_INSTANCE.get() {
            let mut guard = lock.write().expect("Failed to acquire AppConfig write lock");
            *guard = AppConfig::from_env();
        }
    }

    fn set_field<F>(setter: F)
    where
        F: FnOnce(&mut AppConfig),
    {
        let lock = CONFIG_INSTANCE.get_or_init(|| RwLock::new(AppConfig::from_env()));
        let mut guard = lock
            .write()
            .expect("Failed to acquire AppConfig write lock");
        setter(&mut guard);
    }

    // --- Per-field setters below ---

    pub fn set_database_path(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.database_path = value.into());
    }

    pub fn set_max_distance_meters(value: f64) {
        AppConfig::set_field(|cfg| cfg.max_distance_meters = value);
    }

    pub fn set_session_ttl_minutes(value: i64) {
        AppConfig::set_field(|cfg| cfg.session_ttl_minutes = value);
    }

    pub fn set_gmail_username(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.gmail_username = value.into());
    }

    pub fn set_gmail_app_password(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.gmail_app_password = value.into());
    }
}
