//! Read-only snapshot of a live browser database
//!
//! A running browser holds a lock on `Login Data`. Instead of contending
//! for it we copy the file (and its WAL/journal, if present) into a private
//! temp directory and read the copy. The copy is removed on drop.

use anyhow::{anyhow, Context, Result};
use rusqlite::{Connection, OpenFlags};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Sidecar files SQLite may keep next to the main database
const SIDECAR_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];

/// Temporary copy of a database, deleted when dropped
#[derive(Debug)]
pub struct DbSnapshot {
    path: PathBuf,
}

impl DbSnapshot {
    /// Copy `db_path` into a fresh file under the system temp dir
    pub fn create(db_path: &Path) -> Result<Self> {
        if !db_path.exists() {
            return Err(anyhow!("Database file does not exist: {:?}", db_path));
        }

        let temp_dir = std::env::temp_dir().join("browser-password-export");
        fs::create_dir_all(&temp_dir).context("Failed to create snapshot directory")?;

        let db_name = db_path
            .file_name()
            .ok_or_else(|| anyhow!("Invalid database path"))?
            .to_string_lossy()
            .replace(' ', "_");

        let path = temp_dir.join(format!("{}_{}.sqlite", db_name, uuid::Uuid::new_v4()));

        debug!("Creating snapshot of {:?} at {:?}", db_path, path);
        fs::copy(db_path, &path).context("Failed to copy database")?;

        for suffix in SIDECAR_SUFFIXES {
            let src = sidecar(db_path, suffix);
            if src.exists() {
                if let Err(e) = fs::copy(&src, sidecar(&path, suffix)) {
                    warn!("Failed to copy {:?}: {}", src, e);
                }
            }
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the snapshot read-only and run a quick integrity check
    pub fn open(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open database snapshot")?;

        let integrity: String = conn
            .query_row("PRAGMA quick_check", [], |row| row.get(0))
            .context("Failed to run integrity check")?;

        if integrity != "ok" {
            return Err(anyhow!("Database integrity check failed: {}", integrity));
        }

        Ok(conn)
    }
}

impl Drop for DbSnapshot {
    fn drop(&mut self) {
        for suffix in SIDECAR_SUFFIXES {
            let side = sidecar(&self.path, suffix);
            if side.exists() {
                let _ = fs::remove_file(side);
            }
        }
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove snapshot {:?}: {}", self.path, e);
        }
    }
}

fn sidecar(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = db_path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("Login Data");
        {
            let conn = Connection::open(&db).unwrap();
            conn.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1);")
                .unwrap();
        }

        let snapshot = DbSnapshot::create(&db).unwrap();
        let copy = snapshot.path().to_path_buf();
        assert!(copy.exists());
        assert_ne!(copy, db);

        let conn = snapshot.open().unwrap();
        let x: i64 = conn.query_row("SELECT x FROM t", [], |r| r.get(0)).unwrap();
        assert_eq!(x, 1);
        drop(conn);

        drop(snapshot);
        assert!(!copy.exists());
        assert!(db.exists());
    }

    #[test]
    fn test_missing_database() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DbSnapshot::create(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn test_sidecar_name() {
        assert_eq!(
            sidecar(Path::new("/tmp/Login Data"), "-wal"),
            PathBuf::from("/tmp/Login Data-wal")
        );
    }
}
