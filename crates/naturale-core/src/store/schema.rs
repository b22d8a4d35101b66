//! SQLite schema DDL and version stamping for persisted metadata
//! snapshots.

use rusqlite::Connection;

use crate::errors::NaturaleResult;

/// Version stamped into `store_meta` once the DDL has been applied.
pub const SCHEMA_VERSION: i32 = 1;

/// Core DDL statements, replayable on an initialised database.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS store_meta (
        key TEXT PRIMARY KEY,
        value TEXT
    );",
    "CREATE TABLE IF NOT EXISTS migration_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        from_version INTEGER NOT NULL,
        to_version INTEGER NOT NULL,
        status TEXT NOT NULL,
        error_message TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );",
    "CREATE TABLE IF NOT EXISTS metadata_snapshots (
        organization TEXT NOT NULL,
        project TEXT NOT NULL,
        payload_json TEXT NOT NULL,
        fingerprint TEXT NOT NULL,
        fetched_at INTEGER NOT NULL,
        stored_at TEXT DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY(organization, project)
    );",
    "CREATE INDEX IF NOT EXISTS idx_metadata_snapshots_fetched ON metadata_snapshots(fetched_at);",
];

// ─── Versioning ─────────────────────────────────────────────────────────────

/// Stamp [`SCHEMA_VERSION`] on a database that predates it. The step runs in
/// a SAVEPOINT and its outcome is recorded in `migration_history`.
pub fn migrate_schema(conn: &Connection) -> NaturaleResult<()> {
    let current_version = get_schema_version(conn);
    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }

    conn.execute_batch("SAVEPOINT naturale_migrate;")?;
    let step_result = (|| -> NaturaleResult<()> {
        set_schema_version(conn, SCHEMA_VERSION)?;
        record_migration_step(conn, current_version, SCHEMA_VERSION, "success", None)?;
        conn.execute_batch("RELEASE SAVEPOINT naturale_migrate;")?;
        Ok(())
    })();

    if let Err(e) = step_result {
        let _ = conn.execute_batch("ROLLBACK TO SAVEPOINT naturale_migrate;");
        let _ = conn.execute_batch("RELEASE SAVEPOINT naturale_migrate;");
        let _ = record_migration_step(
            conn,
            current_version,
            SCHEMA_VERSION,
            "failed",
            Some(&e.to_string()),
        );
        return Err(e);
    }
    Ok(())
}

/// Returns 0 when the key is absent or unparseable.
pub fn get_schema_version(conn: &Connection) -> i32 {
    let result: Result<String, _> = conn.query_row(
        "SELECT value FROM store_meta WHERE key = 'schema_version';",
        [],
        |row| row.get(0),
    );
    match result {
        Ok(v) => v.parse::<i32>().unwrap_or(0),
        Err(_) => 0,
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> NaturaleResult<()> {
    conn.execute(
        "INSERT INTO store_meta(key, value) \
         VALUES('schema_version', ?1) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
        rusqlite::params![version.to_string()],
    )?;
    Ok(())
}

fn record_migration_step(
    conn: &Connection,
    from_v: i32,
    to_v: i32,
    status: &str,
    error_msg: Option<&str>,
) -> NaturaleResult<()> {
    conn.execute(
        "INSERT INTO migration_history(from_version, to_version, status, error_message) \
         VALUES (?1, ?2, ?3, ?4);",
        rusqlite::params![from_v, to_v, status, error_msg],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        for stmt in SCHEMA_STATEMENTS {
            conn.execute_batch(stmt).unwrap();
        }
        conn
    }

    #[test]
    fn migrate_fresh_database() {
        let conn = fresh();
        migrate_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
        let steps: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM migration_history WHERE status = 'success';",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(steps, 1);
    }

    #[test]
    fn newer_version_left_alone() {
        let conn = fresh();
        set_schema_version(&conn, SCHEMA_VERSION + 1).unwrap();
        migrate_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION + 1);
        let steps: i64 = conn
            .query_row("SELECT COUNT(*) FROM migration_history;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(steps, 0);
    }

    #[test]
    fn migrate_idempotent() {
        let conn = fresh();
        migrate_schema(&conn).unwrap();
        migrate_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn schema_version_defaults_to_zero() {
        let conn = fresh();
        assert_eq!(get_schema_version(&conn), 0);
    }
}
