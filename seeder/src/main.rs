use crate::seed::{Seeder, run_seeder};
use crate::seeds::{principal::PrincipalSeeder, session::SessionSeeder};
use migration::Migrator;
use sea_orm_migration::MigratorTrait;
use services::Core;
use services::notifier::OutboxNotifier;
use std::sync::Arc;
use util::{config::AppConfig, logging::init_logging, state::AppState};

mod seed;
mod seeds;

#[tokio::main]
async fn main() {
    let config = AppConfig::global().clone();
    let _guard = init_logging(&config);

    let db = match db::connect(&config).await {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Failed to connect to {}: {}", config.database_path, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = Migrator::up(&db, None).await {
        eprintln!("Failed to apply migrations: {}", e);
        std::process::exit(1);
    }

    let state = AppState::new(db, config);
    // Seeded challenges are never mailed out.
    let outbox = OutboxNotifier::new();
    let core = Core::new(&state, Arc::new(outbox.clone()));

    for (seeder, name) in [
        (Box::new(PrincipalSeeder { outbox }) as Box<dyn Seeder + Send + Sync>, "Principal"),
        (Box::new(SessionSeeder), "AttendanceSession"),
    ] {
        run_seeder(&*seeder, name, &core).await;
    }

    if let Err(e) = state.close().await {
        eprintln!("Failed to close the database: {}", e);
    }
}
