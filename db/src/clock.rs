//! Storage-side clock.
//!
//! Expiry checks and written timestamps all use the database's notion of
//! "now" so that session issuance, challenge expiry and attendance marking
//! never disagree because of application host skew.

use chrono::{DateTime, NaiveDateTime, Utc};
use sea_orm::{ConnectionTrait, DbBackend, DbErr, Statement};

const FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

fn now_query(backend: DbBackend) -> &'static str {
    match backend {
        DbBackend::Sqlite => "SELECT strftime('%Y-%m-%d %H:%M:%f', 'now') AS now",
        DbBackend::Postgres => {
            "SELECT to_char(now() AT TIME ZONE 'UTC', 'YYYY-MM-DD HH24:MI:SS.US') AS now"
        }
        DbBackend::MySql => "SELECT DATE_FORMAT(UTC_TIMESTAMP(6), '%Y-%m-%d %H:%i:%s.%f') AS now",
    }
}

/// Reads the current UTC time from the storage engine behind `conn`.
///
/// Pass the open transaction when inside one so the read does not need a
/// second pooled connection.
pub async fn now<C: ConnectionTrait>(conn: &C) -> Result<DateTime<Utc>, DbErr> {
    let backend = conn.get_database_backend();
    let row = conn
        .query_one(Statement::from_string(backend, now_query(backend)))
        .await?
        .ok_or_else(|| DbErr::Custom("storage clock returned no row".into()))?;

    let raw: String = row.try_get("", "now")?;
    parse(&raw)
}

fn parse(raw: &str) -> Result<DateTime<Utc>, DbErr> {
    NaiveDateTime::parse_from_str(raw.trim(), FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| DbErr::Custom(format!("unparseable storage time '{raw}': {e}")))
}
