//! SQLite persistence.
//!
//! rusqlite is synchronous: every call that touches a [`Connection`] must run
//! through [`crate::blocking::offload`] when made from async code.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use rusqlite::Connection;

pub mod kv;

pub use kv::KvStore;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid stored value: {0}")]
    Json(#[from] serde_json::Error),
}

/// Location of the database file. Hands out fresh connections.
///
/// Clones share one write gate: SQLite allows a single writer, and a console
/// transaction may stay open for a whole confirmation wait, longer than any
/// busy timeout.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
    gate: Arc<WriteGate>,
}

#[derive(Debug, Default)]
struct WriteGate {
    held: Mutex<bool>,
    released: Condvar,
}

/// Exclusive right to write. Released on drop.
#[derive(Debug)]
pub struct WriteLease {
    gate: Arc<WriteGate>,
}

impl Drop for WriteLease {
    fn drop(&mut self) {
        *self.gate.held.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.gate.released.notify_one();
    }
}

impl Database {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            gate: Arc::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens a new connection, creating the file and its directory if needed.
    pub fn connect(&self) -> Result<Connection, StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Blocks until no other lease is held. Call from blocking code only.
    pub fn lease_writes(&self) -> WriteLease {
        let mut held = self.gate.held.lock().unwrap_or_else(PoisonError::into_inner);
        while *held {
            held = self
                .gate
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *held = true;
        WriteLease {
            gate: Arc::clone(&self.gate),
        }
    }

    /// Runs `write` on a fresh connection while holding the write lease.
    pub fn write<T>(
        &self,
        write: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _lease = self.lease_writes();
        let conn = self.connect()?;
        write(&conn)
    }

    /// Runs each schema script. Scripts must be idempotent.
    pub fn initialize(&self, schemas: &[&str]) -> Result<(), StoreError> {
        let conn = self.connect()?;
        for schema in schemas {
            conn.execute_batch(schema)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn connect_creates_missing_directories() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("nested").join("bastion.db"));

        let conn = db.connect().unwrap();
        let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0)).unwrap();

        assert_eq!(one, 1);
        assert!(db.path().exists());
    }

    #[test]
    fn initialize_is_repeatable() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("bastion.db"));
        let schema = "CREATE TABLE IF NOT EXISTS t (x INTEGER);";

        db.initialize(&[schema, kv::SCHEMA]).unwrap();
        db.initialize(&[schema, kv::SCHEMA]).unwrap();
    }

    #[test]
    fn writers_wait_for_an_open_lease() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("bastion.db"));
        db.initialize(&["CREATE TABLE IF NOT EXISTS t (x INTEGER);"])
            .unwrap();

        // Hold a write transaction open far longer than the busy timeout would
        // let a second writer wait.
        let lease = db.lease_writes();
        let conn = db.connect().unwrap();
        conn.execute_batch("BEGIN; INSERT INTO t VALUES (1);").unwrap();

        let writer = {
            let db = db.clone();
            std::thread::spawn(move || {
                db.write(|conn| Ok(conn.execute("INSERT INTO t VALUES (2)", [])?))
            })
        };
        std::thread::sleep(Duration::from_millis(50));
        assert!(!writer.is_finished());

        conn.execute_batch("COMMIT").unwrap();
        drop(lease);
        assert_eq!(writer.join().unwrap().unwrap(), 1);

        let count: i64 = conn
            .query_row("SELECT count(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }
}
