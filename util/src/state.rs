//! Application state container shared by every core component.
//!
//! Holds the storage handle and the configuration snapshot taken at start-up.
//! It is created once by a binary and passed explicitly to the components that
//! need it; there is no process-wide connection.

use crate::config::AppConfig;
use sea_orm::DatabaseConnection;

/// Central application state.
///
/// This includes:
/// - A cloned, thread-safe database connection pool for use with SeaORM.
/// - The `AppConfig` values the components were built with.
#[derive(Clone)]
pub struct AppState {
    db: DatabaseConnection,
    config: AppConfig,
}

impl AppState {
    /// Creates a new `AppState` with the given database connection and configuration.
    pub fn new(db: DatabaseConnection, config: AppConfig) -> Self {
        Self { db, config }
    }

    /// Returns a shared reference to the internal `DatabaseConnection`.
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Returns a cloned copy of the database connection.
    ///
    /// Useful for components that own their handle.
    pub fn db_clone(&self) -> DatabaseConnection {
        self.db.clone()
    }

    /// Closes the pool. Called once on shutdown.
    pub async fn close(self) -> Result<(), sea_orm::DbErr> {
        self.db.close().await
    }
}
