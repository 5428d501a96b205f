use colored::*;
use futures::FutureExt;
use migration::Migrator;
use sea_orm_migration::prelude::*;
use std::io::{self, Write};
use std::time::Instant;

const STATUS_COLUMN: usize = 80;

/// Applies every migration in order with a status line each.
///
/// The GeoAttend migrations are idempotent, so re-running against an existing
/// database only fills in what is missing.
pub async fn run_all_migrations(url: &str) {
    let db = sea_orm::Database::connect(url)
        .await
        .expect("DB connection failed");

    println!("Running migrations...");
    let schema_manager = SchemaManager::new(&db);
    let started = Instant::now();
    let migrations = <Migrator as MigratorTrait>::migrations();
    let count = migrations.len();

    for migration in migrations {
        run_migration(&schema_manager, migration).await;
    }

    println!(
        "{} {} migrations {}",
        "Applied".green(),
        count,
        format!("({:.2?})", started.elapsed()).dimmed()
    );
}

pub fn list_migrations() {
    for (i, migration) in <Migrator as MigratorTrait>::migrations().iter().enumerate() {
        println!("{:>3}  {}", i + 1, migration.name());
    }
}

async fn run_migration(schema_manager: &SchemaManager<'_>, migration: Box<dyn MigrationTrait>) {
    let name_str = format!("Applying {}", migration.name().bold());
    let dots = ".".repeat(STATUS_COLUMN.saturating_sub(name_str.len()));
    print!("{}{} ", name_str, dots);
    io::stdout().flush().ok();

    let start = Instant::now();
    let result = std::panic::AssertUnwindSafe(migration.up(schema_manager))
        .catch_unwind()
        .await;

    match result {
        Ok(Ok(())) => {
            let time_str = format!("({:.2?})", start.elapsed()).dimmed();
            println!("{} {}", "done".green(), time_str);
        }
        Ok(Err(e)) => {
            println!("{} {}", "failed".red(), e);
            std::process::exit(1);
        }
        Err(_) => {
            println!("{}", "failed".red());
            std::process::exit(1);
        }
    }
}
