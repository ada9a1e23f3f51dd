// Schema - DDL, idempotent initialization, forward-only migrations
//
// `_schema_metadata` is the "already initialized" marker. A fresh database
// gets the base schema and then walks the same migration list an existing
// database would, so both paths end at the same shape.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::db::with_savepoint;
use crate::error::Result;
use crate::temporal;

/// Version written by the base schema.
pub const BASE_SCHEMA_VERSION: &str = "20251223";

/// Version a fully migrated database reports.
pub const EXPECTED_SCHEMA_VERSION: &str = "20251229";

const BASE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS _schema_metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Global registry: identity and lifecycle of every domain object
CREATE TABLE IF NOT EXISTS entity (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    group_id TEXT,
    derived_from TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    superseded_by TEXT,
    superseded_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_entity_type ON entity(type);
CREATE INDEX IF NOT EXISTS idx_entity_superseded_by ON entity(superseded_by);
CREATE INDEX IF NOT EXISTS idx_entity_group_id ON entity(group_id);

-- Transaction payload, 1:1 with an entity row
CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY REFERENCES entity(id),
    amount REAL NOT NULL,
    currency TEXT NOT NULL,
    transaction_date TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    account TEXT NOT NULL,
    category TEXT,
    author TEXT NOT NULL DEFAULT 'system',
    notes TEXT
);

CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(transaction_date);
CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(account);
CREATE INDEX IF NOT EXISTS idx_transactions_category ON transactions(category);

CREATE VIEW IF NOT EXISTS transactions_view AS
SELECT t.*,
       e.created_at, e.updated_at, e.superseded_by, e.superseded_at,
       e.group_id, e.derived_from
FROM transactions t
JOIN entity e ON t.id = e.id;
";

/// Ordered list of `(version, sql)` steps applied to databases older than `version`.
const MIGRATIONS: &[(&str, &str)] = &[(
    "20251229",
    "
CREATE TABLE IF NOT EXISTS recurrences (
    id TEXT PRIMARY KEY REFERENCES entity(id),
    rrule TEXT NOT NULL,
    entities TEXT NOT NULL,
    valid_from TEXT NOT NULL,
    valid_until TEXT
);

CREATE INDEX IF NOT EXISTS idx_recurrences_valid_from ON recurrences(valid_from);

CREATE VIEW IF NOT EXISTS recurrences_view AS
SELECT r.*,
       e.created_at, e.updated_at, e.superseded_by, e.superseded_at,
       e.group_id, e.derived_from
FROM recurrences r
JOIN entity e ON r.id = e.id;

ALTER TABLE transactions ADD COLUMN recurrence_id TEXT REFERENCES entity(id);

DROP VIEW IF EXISTS transactions_view;
CREATE VIEW transactions_view AS
SELECT t.*,
       e.created_at, e.updated_at, e.superseded_by, e.superseded_at,
       e.group_id, e.derived_from
FROM transactions t
JOIN entity e ON t.id = e.id;
",
)];

/// Initialize the database if the marker table is missing, then migrate.
pub fn init(conn: &Connection) -> Result<()> {
    if !is_initialized(conn)? {
        apply_base_schema(conn)?;
        info!(version = BASE_SCHEMA_VERSION, "database schema created");
    }

    run_migrations(conn)
}

pub fn is_initialized(conn: &Connection) -> Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = '_schema_metadata'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn apply_base_schema(conn: &Connection) -> Result<()> {
    with_savepoint(conn, "schema_base", || {
        conn.execute_batch(BASE_SCHEMA)?;
        set_version(conn, BASE_SCHEMA_VERSION)
    })
}

pub fn current_version(conn: &Connection) -> Result<Option<String>> {
    if !is_initialized(conn)? {
        return Ok(None);
    }

    let version = conn
        .query_row(
            "SELECT value FROM _schema_metadata WHERE key = 'version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(version)
}

/// Apply every migration newer than the stored version, in one savepoint.
///
/// A database reporting a version newer than any known migration is left
/// untouched.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current = current_version(conn)?.unwrap_or_else(|| BASE_SCHEMA_VERSION.to_string());

    let pending: Vec<&(&str, &str)> = MIGRATIONS
        .iter()
        .filter(|(version, _)| *version > current.as_str())
        .collect();

    if pending.is_empty() {
        debug!(version = %current, "schema up to date");
        return Ok(());
    }

    with_savepoint(conn, "schema_migrate", || {
        for (version, sql) in &pending {
            conn.execute_batch(sql)?;
            set_version(conn, version)?;
            info!(from = %current, to = %version, "schema migrated");
        }
        Ok(())
    })
}

fn set_version(conn: &Connection, version: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO _schema_metadata (key, value, updated_at) VALUES ('version', ?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![version, temporal::now()],
    )?;
    Ok(())
}
