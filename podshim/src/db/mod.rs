//! Database layer for the local engine.
//!
//! Provides SQLite-based persistence of engine records:
//! - Queryable columns for id, name and state
//! - The full record as a JSON blob, so new fields need no migration
//!
//! Enumeration order is the insertion sequence.

mod records;
mod schema;

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OptionalExtension};

use crate::engine::{EngineError, EngineResult};

pub use records::SqliteRecordStore;

/// Helper macro to convert rusqlite errors to EngineError.
macro_rules! db_err {
    ($result:expr) => {
        $result.map_err(|e| crate::engine::EngineError::Store(e.to_string()))
    };
}

pub(crate) use db_err;

/// SQLite database handle.
///
/// Thread-safe via `parking_lot::Mutex`. Domain-specific stores wrap this
/// to provide their APIs.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

impl Database {
    /// Open or create the database.
    pub fn open(db_path: &Path) -> EngineResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                EngineError::Store(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }

        let conn = db_err!(Connection::open(db_path))?;
        Self::configure(conn)
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory() -> EngineResult<Self> {
        let conn = db_err!(Connection::open_in_memory())?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> EngineResult<Self> {
        // - WAL mode: concurrent readers while the engine writes
        // - Busy timeout: another shim process may hold the write lock
        db_err!(conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=FULL;
            PRAGMA busy_timeout=10000;
            "
        ))?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Acquire the database connection.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    fn init_schema(conn: &Connection) -> EngineResult<()> {
        for sql in schema::all_schemas() {
            db_err!(conn.execute_batch(sql))?;
        }

        let current_version: Option<i32> = db_err!(
            conn.query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
        )?;

        match current_version {
            None => {
                let now = Utc::now().to_rfc3339();
                db_err!(conn.execute(
                    "INSERT INTO schema_version (id, version, updated_at) VALUES (1, ?1, ?2)",
                    rusqlite::params![schema::SCHEMA_VERSION, now],
                ))?;
                tracing::info!(
                    "Initialized record store schema version {}",
                    schema::SCHEMA_VERSION
                );
            }
            Some(v) if v > schema::SCHEMA_VERSION => {
                return Err(EngineError::Store(format!(
                    "record store schema version {} is newer than supported {}",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
            Some(_) => {}
        }

        Ok(())
    }
}
