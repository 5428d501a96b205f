use std::{env, fs, path::Path};

mod runner;

/// `migration` applies the GeoAttend schema, `migration fresh` rebuilds a
/// SQLite file from scratch, `migration clean` deletes it and `migration list`
/// prints the known migrations.
#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let target = env::var("DATABASE_PATH").expect("DATABASE_PATH must be set");
    let is_dsn = target.contains("://") || target.starts_with("sqlite:");
    let url = if is_dsn {
        target.clone()
    } else {
        format!("sqlite://{}?mode=rwc", target)
    };

    match env::args().nth(1).as_deref() {
        Some("list") => runner::list_migrations(),
        Some("clean") if !is_dsn => remove_db_file(&target),
        Some("fresh") if !is_dsn => {
            remove_db_file(&target);
            create_db_dir(&target);
            runner::run_all_migrations(&url).await;
        }
        Some(cmd @ ("clean" | "fresh")) => {
            eprintln!("`{}` only applies to a SQLite file path", cmd);
            std::process::exit(2);
        }
        _ => {
            if !is_dsn {
                create_db_dir(&target);
            }
            runner::run_all_migrations(&url).await;
        }
    }
}

fn remove_db_file(path: &str) {
    let db_path = Path::new(path);
    if db_path.exists() {
        fs::remove_file(db_path).expect("Failed to delete DB file");
        println!("Deleted DB: {}", db_path.display());
    } else {
        println!("DB file does not exist: {}", db_path.display());
    }
}

fn create_db_dir(path: &str) {
    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent).expect("Failed to create DB directory");
    }
}
