//! SQLite persistence for metadata snapshots.
//!
//! Each public method opens its own connection so callers never manage
//! connection lifetime; the store runs them on blocking threads.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::errors::NaturaleResult;
use crate::models::{MetadataSnapshot, ProjectKey};
use crate::store::schema;

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let mut expanded = PathBuf::from(home);
            if path.len() > 2 {
                expanded.push(&path[2..]);
            }
            return expanded;
        }
    }
    PathBuf::from(path)
}

/// Hex SHA-256 of a serialized payload.
pub fn fingerprint(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Row summary without the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSnapshot {
    pub key: ProjectKey,
    pub fetched_at: DateTime<Utc>,
    pub fingerprint: String,
}

fn from_epoch(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct SnapshotDatabase {
    db_path: PathBuf,
}

impl SnapshotDatabase {
    /// The path is tilde-expanded and its parent directories created.
    pub fn new(db_path: impl AsRef<Path>) -> NaturaleResult<Self> {
        let expanded = expand_tilde(&db_path.as_ref().to_string_lossy());
        let resolved = if expanded.is_absolute() {
            expanded
        } else {
            std::env::current_dir()?.join(&expanded)
        };
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { db_path: resolved })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> NaturaleResult<Connection> {
        Ok(Connection::open(&self.db_path)?)
    }

    pub fn init_schema(&self) -> NaturaleResult<()> {
        let conn = self.connect()?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        for stmt in schema::SCHEMA_STATEMENTS {
            conn.execute_batch(stmt)?;
        }
        schema::migrate_schema(&conn)?;
        Ok(())
    }

    /// Insert or replace the row for the snapshot's key.
    pub fn save_snapshot(&self, snapshot: &MetadataSnapshot) -> NaturaleResult<()> {
        let payload = serde_json::to_string(snapshot)?;
        let digest = fingerprint(&payload);
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO metadata_snapshots(organization, project, payload_json, fingerprint, fetched_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(organization, project) DO UPDATE SET \
                payload_json = excluded.payload_json, \
                fingerprint = excluded.fingerprint, \
                fetched_at = excluded.fetched_at, \
                stored_at = CURRENT_TIMESTAMP;",
            params![
                snapshot.organization,
                snapshot.project,
                payload,
                digest,
                snapshot.fetched_at.timestamp()
            ],
        )?;
        Ok(())
    }

    /// Load a snapshot. A row whose payload no longer matches its
    /// fingerprint is dropped and reported as absent.
    pub fn load_snapshot(&self, key: &ProjectKey) -> NaturaleResult<Option<MetadataSnapshot>> {
        let conn = self.connect()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT payload_json, fingerprint FROM metadata_snapshots \
                 WHERE organization = ?1 AND project = ?2;",
                params![key.organization, key.project],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((payload, stored_digest)) = row else {
            return Ok(None);
        };
        if fingerprint(&payload) != stored_digest {
            warn!(key = %key, "discarding persisted snapshot with mismatched fingerprint");
            self.delete_snapshot(key)?;
            return Ok(None);
        }
        match serde_json::from_str::<MetadataSnapshot>(&payload) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(err) => {
                warn!(key = %key, error = %err, "discarding unreadable persisted snapshot");
                self.delete_snapshot(key)?;
                Ok(None)
            }
        }
    }

    /// Returns whether a row was removed.
    pub fn delete_snapshot(&self, key: &ProjectKey) -> NaturaleResult<bool> {
        let conn = self.connect()?;
        let removed = conn.execute(
            "DELETE FROM metadata_snapshots WHERE organization = ?1 AND project = ?2;",
            params![key.organization, key.project],
        )?;
        Ok(removed > 0)
    }

    pub fn list_snapshots(&self) -> NaturaleResult<Vec<StoredSnapshot>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT organization, project, fetched_at, fingerprint FROM metadata_snapshots \
             ORDER BY organization, project;",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(StoredSnapshot {
                key: ProjectKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                fetched_at: from_epoch(row.get::<_, i64>(2)?),
                fingerprint: row.get(3)?,
            })
        })?;
        let mut snapshots = Vec::new();
        for row in rows {
            snapshots.push(row?);
        }
        Ok(snapshots)
    }

    /// Remove every persisted snapshot; returns the number of rows removed.
    pub fn clear(&self) -> NaturaleResult<usize> {
        let conn = self.connect()?;
        Ok(conn.execute("DELETE FROM metadata_snapshots;", [])?)
    }

    /// Online copy of the database to `destination`.
    pub fn backup_to(&self, destination: &Path) -> NaturaleResult<PathBuf> {
        let expanded = expand_tilde(&destination.to_string_lossy());
        let resolved = if expanded.is_absolute() {
            expanded
        } else {
            std::env::current_dir()?.join(&expanded)
        };
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let src_conn = self.connect()?;
        let mut dst_conn = Connection::open(&resolved)?;
        let backup = rusqlite::backup::Backup::new(&src_conn, &mut dst_conn)?;
        backup.run_to_completion(100, std::time::Duration::from_millis(10), None)?;
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::fallback::fallback_snapshot;

    fn database() -> (tempfile::TempDir, SnapshotDatabase) {
        let dir = tempfile::tempdir().unwrap();
        let db = SnapshotDatabase::new(dir.path().join("nested").join("metadata.db")).unwrap();
        db.init_schema().unwrap();
        (dir, db)
    }

    fn live_snapshot(org: &str, project: &str) -> MetadataSnapshot {
        let mut snapshot = fallback_snapshot(org, project);
        snapshot.is_fallback = false;
        snapshot
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let (_dir, db) = database();
        let snapshot = live_snapshot("acme", "web");
        db.save_snapshot(&snapshot).unwrap();
        let loaded = db.load_snapshot(&snapshot.key()).unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        assert!(db.load_snapshot(&ProjectKey::new("acme", "other")).unwrap().is_none());
    }

    #[test]
    fn test_save_replaces_existing_row() {
        let (_dir, db) = database();
        let mut snapshot = live_snapshot("acme", "web");
        db.save_snapshot(&snapshot).unwrap();
        snapshot.areas.push(crate::models::Area {
            id: Some(1),
            name: "web".into(),
            path: "web".into(),
        });
        db.save_snapshot(&snapshot).unwrap();
        assert_eq!(db.list_snapshots().unwrap().len(), 1);
        let loaded = db.load_snapshot(&snapshot.key()).unwrap().unwrap();
        assert_eq!(loaded.areas.len(), 1);
    }

    #[test]
    fn test_tampered_payload_is_discarded() {
        let (_dir, db) = database();
        let snapshot = live_snapshot("acme", "web");
        db.save_snapshot(&snapshot).unwrap();
        let conn = Connection::open(db.db_path()).unwrap();
        conn.execute(
            "UPDATE metadata_snapshots SET payload_json = '{}' WHERE organization = 'acme';",
            [],
        )
        .unwrap();
        assert!(db.load_snapshot(&snapshot.key()).unwrap().is_none());
        assert!(db.list_snapshots().unwrap().is_empty());
    }

    #[test]
    fn test_delete_and_clear() {
        let (_dir, db) = database();
        db.save_snapshot(&live_snapshot("acme", "web")).unwrap();
        db.save_snapshot(&live_snapshot("acme", "api")).unwrap();
        assert!(db.delete_snapshot(&ProjectKey::new("acme", "web")).unwrap());
        assert!(!db.delete_snapshot(&ProjectKey::new("acme", "web")).unwrap());
        assert_eq!(db.clear().unwrap(), 1);
        assert!(db.list_snapshots().unwrap().is_empty());
    }

    #[test]
    fn test_list_reports_fetch_time() {
        let (_dir, db) = database();
        let snapshot = live_snapshot("acme", "web");
        db.save_snapshot(&snapshot).unwrap();
        let listed = db.list_snapshots().unwrap();
        assert_eq!(listed[0].key, snapshot.key());
        assert_eq!(listed[0].fetched_at.timestamp(), snapshot.fetched_at.timestamp());
        assert_eq!(listed[0].fingerprint.len(), 64);
    }

    #[test]
    fn test_backup_copies_rows() {
        let (dir, db) = database();
        db.save_snapshot(&live_snapshot("acme", "web")).unwrap();
        let copy = db.backup_to(&dir.path().join("backup").join("copy.db")).unwrap();
        let restored = SnapshotDatabase::new(&copy).unwrap();
        assert_eq!(restored.list_snapshots().unwrap().len(), 1);
    }
}
