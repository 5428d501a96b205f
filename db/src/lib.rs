pub mod clock;
pub mod filters;
pub mod models;
pub mod test_utils;

use sea_orm::{Database, DatabaseConnection, DbErr};
use std::path::Path;
use util::config::AppConfig;

/// Opens the connection pool described by `DATABASE_PATH`.
///
/// A DSN is used as-is; anything else is treated as a SQLite file path whose
/// parent directory is created on demand.
pub async fn connect(config: &AppConfig) -> Result<DatabaseConnection, DbErr> {
    let path_or_url = config.database_path.as_str();
    let url = if path_or_url.starts_with("sqlite:")
        || path_or_url.starts_with("postgres://")
        || path_or_url.starts_with("mysql://")
    {
        path_or_url.to_owned()
    } else {
        // SQLite won't create intermediate dirs.
        if let Some(parent) = Path::new(path_or_url).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        format!("sqlite://{path_or_url}?mode=rwc")
    };

    let db = Database::connect(&url).await?;
    tracing::info!(target: "db", "Connected to {}", url);
    Ok(db)
}
