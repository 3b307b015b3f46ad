//! Shared `SQLite` connection handle.
//!
//! All primary-index stores clone one [`Db`] so files, chunks, tags,
//! embeddings, entities, and links live in a single database file with
//! foreign keys enforced across them. Access is serialized through an
//! internal mutex; individual statements are short, so contention stays
//! low even under the async runtime.
//!
//! Schema state lives in SQLite's `user_version` pragma: 0 means a
//! fresh database, anything else is the version the DDL was stamped
//! with when it ran.

use crate::error::{Error, Result};
use crate::store::schema::{CURRENT_SCHEMA_VERSION, SCHEMA_SQL, upgrades_after};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Cloneable handle to a `SQLite` database.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl Db {
    /// Opens or creates a database at the given path.
    ///
    /// Enables WAL journaling and foreign keys. The parent directory is
    /// created when missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;
        let _: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path),
        })
    }

    /// Creates an in-memory database. Useful for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Returns the database path (`None` for in-memory).
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Runs a closure with the locked connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned or the closure fails.
    pub fn with<R>(&self, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::Dependency("database lock poisoned".to_string()))?;
        f(&conn)
    }

    /// Runs a closure with the locked connection, mutably (transactions).
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned or the closure fails.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Connection) -> Result<R>) -> Result<R> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| Error::Dependency("database lock poisoned".to_string()))?;
        f(&mut conn)
    }

    /// Reads the stamped schema version (0 for a fresh database).
    fn stamped_version(conn: &Connection) -> Result<u32> {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        Ok(u32::try_from(version).unwrap_or(0))
    }

    /// Brings the database to the current schema.
    ///
    /// A fresh database runs the full DDL; an older one replays the
    /// pending upgrade batches in order, stamping the version after
    /// each so an interrupted upgrade resumes where it stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if DDL execution or version stamping fails.
    pub fn init(&self, schema_sql: &str) -> Result<()> {
        self.with(|conn| {
            let stamped = Self::stamped_version(conn)?;
            if stamped == 0 {
                conn.execute_batch(schema_sql)?;
                conn.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
                return Ok(());
            }

            for (target, sql) in upgrades_after(stamped) {
                conn.execute_batch(sql)
                    .map_err(|e| Error::Dependency(format!("schema upgrade to v{target}: {e}")))?;
                conn.pragma_update(None, "user_version", *target)?;
            }
            Ok(())
        })
    }

    /// Whether the schema DDL has ever run against this database.
    ///
    /// # Errors
    ///
    /// Returns an error if the version read fails.
    pub fn is_initialized(&self) -> Result<bool> {
        self.with(|conn| Ok(Self::stamped_version(conn)? > 0))
    }

    /// Creates an initialized in-memory primary-index database.
    ///
    /// # Errors
    ///
    /// Returns an error if initialization fails.
    pub fn in_memory_index() -> Result<Self> {
        let db = Self::in_memory()?;
        db.init(SCHEMA_SQL)?;
        Ok(db)
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db").field("path", &self.path).finish()
    }
}
