//! Database migration runner.
//!
//! Migrations are executed in order on every [`Database::open_at`] /
//! [`Database::open_in_memory`] call. Each migration is guarded by the
//! `user_version` pragma so it runs exactly once.
//!
//! [`Database::open_at`]: crate::Database::open_at
//! [`Database::open_in_memory`]: crate::Database::open_in_memory

pub mod v001_initial;
pub mod v002_commerce;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.  Bump this and add a new migration module whenever
/// the schema changes.
pub const CURRENT_VERSION: u32 = 2;

/// A schema step: its version number, log name and body.
type Migration = (u32, &'static str, fn(&Connection) -> rusqlite::Result<()>);

const MIGRATIONS: &[Migration] = &[
    (1, "v001_initial", v001_initial::up),
    (2, "v002_commerce", v002_commerce::up),
];

/// Run all pending migrations against the open connection.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    apply(conn, MIGRATIONS)
}

/// Each version is applied in its own transaction together with the
/// `user_version` bump, so a failing step leaves the previous version intact.
fn apply(conn: &Connection, migrations: &[Migration]) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    tracing::debug!(
        current_version = current,
        target_version = CURRENT_VERSION,
        "checking database migrations"
    );

    for &(version, name, up) in migrations.iter().filter(|(v, _, _)| *v > current) {
        tracing::info!(version, "applying migration {name}");
        let tx = conn.unchecked_transaction()?;
        up(&tx).map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_version(conn: &Connection) -> u32 {
        conn.pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn failed_step_leaves_previous_version() {
        let conn = Connection::open_in_memory().unwrap();
        let steps: &[Migration] = &[
            (1, "v001_initial", v001_initial::up),
            (2, "broken", |conn: &Connection| {
                conn.execute_batch("CREATE TABLE scratch (id INTEGER); SELECT * FROM missing;")
            }),
        ];

        assert!(matches!(apply(&conn, steps), Err(StoreError::Migration(_))));
        assert_eq!(user_version(&conn), 1);

        let scratch: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'scratch'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(scratch, 0);
    }

    #[test]
    fn rerun_is_a_no_op() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(user_version(&conn), CURRENT_VERSION);
    }
}
