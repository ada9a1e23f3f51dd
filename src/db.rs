// Database handle - connection factory, pragmas, savepoints, error mapping
//
// Every Core owns exactly one connection opened here. There is no pool and no
// process-wide connection: concurrent Cores only meet inside SQLite (WAL
// journal + busy timeout), never in application state.

use rusqlite::{ffi, Connection, ErrorCode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::schema;
use crate::session::{AtomicCore, Core};

/// How long a connection waits for another writer before giving up.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Location of the database file plus the policy for opening connections to it.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Database { path: path.into() }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.database_path.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a fresh, configured connection. Creates parent directories.
    pub fn connect(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&self.path)?;
        configure_connection(&conn)?;
        debug!(path = %self.path.display(), "opened database connection");
        Ok(conn)
    }

    /// Create the schema if needed and apply pending migrations.
    pub fn init(&self) -> Result<()> {
        let conn = self.connect()?;
        schema::init(&conn)
    }

    /// Core in autocommit mode: every statement commits on its own.
    pub fn core(&self) -> Result<Core> {
        Ok(Core::new(self.connect()?))
    }

    /// Core in atomic mode: one transaction until `commit`/`rollback`/drop.
    pub fn begin(&self) -> Result<AtomicCore> {
        self.core()?.begin()
    }

    /// Run `f` inside one atomic scope: `Ok` commits, `Err` rolls back.
    /// A panic inside `f` also rolls back (the scope is dropped while unwinding).
    pub fn atomic<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Core) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let scope = self.begin()?;
        match f(&*scope) {
            Ok(value) => {
                scope.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = scope.rollback() {
                    warn!(error = %rollback_err, "rollback after failed atomic scope also failed");
                }
                Err(err)
            }
        }
    }
}

/// Pragmas every connection needs: foreign keys (payload rows must reference
/// an entity row), WAL journal, busy timeout.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    debug!(journal_mode = %mode, "journal mode set");
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}

/// Private in-memory database with the full schema. Used by tests and tools
/// that need a throwaway store.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure_connection(&conn)?;
    schema::init(&conn)?;
    Ok(conn)
}

// ============================================================================
// SAVEPOINTS
// ============================================================================

/// Run `f` inside a named savepoint.
///
/// Outside a transaction the savepoint opens one (so the sequence is atomic
/// in autocommit mode); inside an atomic scope it nests. On error the work
/// since the savepoint is undone and the error is returned unchanged.
pub(crate) fn with_savepoint<T, F>(conn: &Connection, name: &str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    conn.execute_batch(&format!("SAVEPOINT {}", name))?;

    match f() {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE SAVEPOINT {}", name))?;
            Ok(value)
        }
        Err(err) => {
            let undo = format!("ROLLBACK TO SAVEPOINT {0}; RELEASE SAVEPOINT {0}", name);
            if let Err(undo_err) = conn.execute_batch(&undo) {
                warn!(savepoint = name, error = %undo_err, "failed to roll back savepoint");
            }
            Err(err)
        }
    }
}

// ============================================================================
// CONSTRAINT MAPPING
// ============================================================================

/// Translate an insert failure into the typed taxonomy: duplicate keys become
/// `DuplicateEntity`, other integrity failures `ConstraintViolation`.
pub(crate) fn map_insert_error(err: rusqlite::Error, table: &str, id: &str) -> Error {
    if let rusqlite::Error::SqliteFailure(failure, message) = &err {
        if failure.code == ErrorCode::ConstraintViolation {
            return match failure.extended_code {
                ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE => {
                    Error::DuplicateEntity { id: id.to_string() }
                }
                _ => Error::ConstraintViolation {
                    table: table.to_string(),
                    id: id.to_string(),
                    message: message.clone().unwrap_or_else(|| failure.to_string()),
                },
            };
        }
    }

    Error::Database(err)
}
