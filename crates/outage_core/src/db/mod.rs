use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;
use tracing::debug;

use crate::error::{db_error, AppError};

/// Web requests, the periodic task and a blocked `wait` may all hold the same file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

struct Migration {
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "0001_init.sql",
        sql: include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../../migrations/0001_init.sql"
        )),
    },
    Migration {
        name: "0002_calendar_and_settings.sql",
        sql: include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../../migrations/0002_calendar_and_settings.sql"
        )),
    },
];

pub fn open(path: &Path) -> Result<Connection, AppError> {
    let conn = Connection::open(path).map_err(|e| {
        AppError::new("DB_OPEN_FAILED", "Failed to open outage database")
            .with_details(format!("path={}: {}", path.display(), e))
    })?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|e| db_error("DB_OPEN_FAILED", "Failed to set busy timeout", e))?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection, AppError> {
    Connection::open_in_memory()
        .map_err(|e| db_error("DB_OPEN_FAILED", "Failed to open in-memory outage database", e))
}

/// Open a database file and bring its schema up to date.
pub fn open_and_migrate(path: &Path) -> Result<Connection, AppError> {
    let mut conn = open(path)?;
    migrate(&mut conn)?;
    Ok(conn)
}

fn applied_migrations(conn: &Connection) -> Result<HashSet<String>, AppError> {
    let mut stmt = conn
        .prepare("SELECT name FROM _migrations")
        .map_err(|e| db_error("DB_MIGRATIONS_QUERY_FAILED", "Failed to query applied migrations", e))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .and_then(|rows| rows.collect::<Result<HashSet<_>, _>>())
        .map_err(|e| db_error("DB_MIGRATIONS_QUERY_FAILED", "Failed to read applied migrations", e))?;
    Ok(names)
}

/// Names of schema migrations not yet applied to `conn`, in apply order.
pub fn pending_migrations(conn: &Connection) -> Result<Vec<&'static str>, AppError> {
    let applied = applied_migrations(conn)?;
    Ok(MIGRATIONS
        .iter()
        .map(|m| m.name)
        .filter(|name| !applied.contains(*name))
        .collect())
}

/// Apply every pending migration, each in its own transaction.
pub fn migrate(conn: &mut Connection) -> Result<(), AppError> {
    conn.execute_batch(
        r#"
      CREATE TABLE IF NOT EXISTS _migrations (
        name TEXT PRIMARY KEY NOT NULL,
        applied_at TEXT NOT NULL
      );
    "#,
    )
    .map_err(|e| {
        db_error(
            "DB_MIGRATIONS_TABLE_FAILED",
            "Failed to ensure migrations table exists",
            e,
        )
    })?;

    for name in pending_migrations(conn)? {
        let Some(migration) = MIGRATIONS.iter().find(|m| m.name == name) else {
            continue;
        };
        let tx = conn
            .transaction()
            .map_err(|e| db_error("DB_TX_FAILED", "Failed to start migration transaction", e))?;
        tx.execute_batch(migration.sql).map_err(|e| {
            AppError::new("DB_MIGRATION_FAILED", format!("Migration {name} failed"))
                .with_details(e.to_string())
        })?;
        tx.execute(
            "INSERT INTO _migrations(name, applied_at) VALUES (?1, strftime('%Y-%m-%dT%H:%M:%fZ','now'))",
            [name],
        )
        .map_err(|e| {
            AppError::new("DB_MIGRATION_FAILED", format!("Failed to record migration {name}"))
                .with_details(e.to_string())
        })?;
        tx.commit()
            .map_err(|e| db_error("DB_TX_FAILED", "Failed to commit migration transaction", e))?;
        debug!(migration = name, "applied migration");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::OptionalExtension;

    #[test]
    fn migrations_create_expected_tables() {
        let mut conn = open_in_memory().expect("open");
        migrate(&mut conn).expect("migrate");

        for table in ["outages", "outage_events", "calendar_events", "settings"] {
            let name: Option<String> = conn
                .query_row(
                    "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .optional()
                .unwrap();
            assert_eq!(name.as_deref(), Some(table));
        }
    }

    #[test]
    fn migrate_is_idempotent() {
        let mut conn = open_in_memory().expect("open");
        migrate(&mut conn).expect("first");
        assert!(pending_migrations(&conn).unwrap().is_empty());
        migrate(&mut conn).expect("second");
        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, 2);
    }
}
