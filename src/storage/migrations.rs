//! Versioned schema initialization for the recording store.
//!
//! Each migration runs exactly once and is tracked in the `schema_migrations`
//! table. Migrations are applied in order by version number, each inside its
//! own transaction. A database that records a version newer than any listed
//! here was written by a newer build and is refused.

use rusqlite::{params, Connection};
use std::collections::HashSet;
use thiserror::Error;

/// A schema migration with a version number, name, and SQL to execute.
pub struct Migration {
    /// Unique version number (migrations run in order)
    pub version: i64,
    /// Human-readable name for the migration
    pub name: &'static str,
    /// SQL to execute (can be multiple statements)
    pub sql: &'static str,
}

/// All migrations in order. New migrations are appended at the end.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_recordings_table",
        sql: r#"
            CREATE TABLE IF NOT EXISTS recordings (
                filename TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
        "#,
    },
    Migration {
        version: 2,
        name: "create_recording_frames_table",
        sql: r#"
            CREATE TABLE IF NOT EXISTS recording_frames (
                filename TEXT NOT NULL,
                seq INTEGER NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (filename, seq),
                FOREIGN KEY (filename) REFERENCES recordings(filename) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 3,
        name: "add_recordings_frame_count",
        sql: r#"
            ALTER TABLE recordings ADD COLUMN frame_count INTEGER NOT NULL DEFAULT 0;
            UPDATE recordings SET frame_count = (
                SELECT COUNT(*) FROM recording_frames f WHERE f.filename = recordings.filename
            );
        "#,
    },
];

/// Schema version a fully migrated store reports
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Why a store's schema could not be brought up to date
#[derive(Error, Debug)]
pub enum MigrationError {
    /// The store was written by a newer build
    #[error("schema version {found} is newer than supported version {supported}")]
    UnknownVersion { found: i64, supported: i64 },
    /// SQLite rejected a migration step
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

fn ensure_migrations_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );
        "#,
    )
}

pub(crate) fn get_applied_versions(conn: &Connection) -> rusqlite::Result<HashSet<i64>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<HashSet<i64>>>()?;
    Ok(versions)
}

#[cfg(test)]
fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        [table],
        |row| row.get::<_, i64>(0).map(|c| c > 0),
    )
}

/// Run all pending migrations.
///
/// Returns the schema version the store is at afterwards.
pub fn run_migrations(conn: &mut Connection) -> Result<i64, MigrationError> {
    ensure_migrations_table(conn)?;

    let applied = get_applied_versions(conn)?;
    let supported = latest_version();
    if let Some(&found) = applied.iter().max() {
        if found > supported {
            return Err(MigrationError::UnknownVersion { found, supported });
        }
    }

    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }

        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );

        let now = chrono::Utc::now().to_rfc3339();
        let tx = conn.transaction()?;
        let result = tx.execute_batch(migration.sql).and_then(|_| {
            tx.execute(
                "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![migration.version, migration.name, now],
            )
        });
        if let Err(e) = result {
            tracing::error!(
                version = migration.version,
                name = migration.name,
                error = %e,
                "Migration failed"
            );
            return Err(e.into());
        }
        tx.commit()?;
    }

    Ok(supported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_ordered() {
        let mut last_version = 0;
        for migration in MIGRATIONS {
            assert!(
                migration.version > last_version,
                "Migrations must be in ascending order: {} should come after {}",
                migration.version,
                last_version
            );
            last_version = migration.version;
        }
    }

    #[test]
    fn test_fresh_database_migrations() {
        let mut conn = Connection::open_in_memory().unwrap();
        let version = run_migrations(&mut conn).unwrap();
        assert_eq!(version, latest_version());

        let applied = get_applied_versions(&conn).unwrap();
        assert_eq!(applied.len(), MIGRATIONS.len());
        assert!(table_exists(&conn, "recordings").unwrap());
        assert!(table_exists(&conn, "recording_frames").unwrap());
    }

    #[test]
    fn test_idempotent_migrations() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();

        let applied = get_applied_versions(&conn).unwrap();
        assert_eq!(applied.len(), MIGRATIONS.len());
    }

    #[test]
    fn test_frame_count_backfilled_from_v2() {
        let mut conn = Connection::open_in_memory().unwrap();
        ensure_migrations_table(&conn).unwrap();
        for migration in &MIGRATIONS[..2] {
            conn.execute_batch(migration.sql).unwrap();
            conn.execute(
                "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, 'now')",
                params![migration.version, migration.name],
            )
            .unwrap();
        }
        conn.execute_batch(
            r#"
            INSERT INTO recordings (filename, created_at, updated_at) VALUES ('old.csv', 'a', 'a');
            INSERT INTO recording_frames (filename, seq, payload) VALUES ('old.csv', 0, '[1,0]');
            INSERT INTO recording_frames (filename, seq, payload) VALUES ('old.csv', 1, '[2,1]');
            "#,
        )
        .unwrap();

        run_migrations(&mut conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT frame_count FROM recordings WHERE filename = 'old.csv'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (99, 'future', 'now')",
            [],
        )
        .unwrap();

        let err = run_migrations(&mut conn).unwrap_err();
        match &err {
            MigrationError::UnknownVersion { found, .. } => assert_eq!(*found, 99),
            other => panic!("expected UnknownVersion, got {:?}", other),
        }
        assert_eq!(
            err.to_string(),
            format!("schema version 99 is newer than supported version {}", latest_version())
        );
    }

    #[test]
    fn test_sqlite_errors_pass_through() {
        let err = MigrationError::from(rusqlite::Error::InvalidQuery);
        assert!(matches!(err, MigrationError::Sqlite(_)));
        assert_eq!(err.to_string(), rusqlite::Error::InvalidQuery.to_string());
    }
}
