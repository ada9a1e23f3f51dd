// 🪪 Entity Registry - identity and lifecycle of every domain object
//
// "Identity persists, values change": each domain object gets one registry row
// with a UUID and its lifecycle metadata, whatever its payload shape.
//
// Rules:
// - A row is created exactly once; `id` and `type` never change afterwards
// - After creation a row may only be timestamp-touched or superseded
// - Superseded rows are never deleted (Mutable Snapshot, Immutable Memory)

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::map_insert_error;
use crate::error::{Error, Result};
use crate::query;
use crate::temporal;

// ============================================================================
// LIFECYCLE METADATA
// ============================================================================

/// Registry columns shared by every `*_view` that joins a payload table with
/// `entity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lifecycle {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Replacement entity; `Some` means this row is logically deleted/replaced
    pub superseded_by: Option<String>,
    pub superseded_at: Option<DateTime<Utc>>,

    /// Clusters related entities
    pub group_id: Option<String>,

    /// Provenance link to a source entity
    pub derived_from: Option<String>,
}

impl Lifecycle {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Lifecycle {
            created_at: temporal::timestamp_column(row, "created_at")?,
            updated_at: temporal::timestamp_column(row, "updated_at")?,
            superseded_by: row.get("superseded_by")?,
            superseded_at: temporal::optional_timestamp_column(row, "superseded_at")?,
            group_id: row.get("group_id")?,
            derived_from: row.get("derived_from")?,
        })
    }

    /// True until the entity has been superseded.
    pub fn is_current(&self) -> bool {
        self.superseded_by.is_none()
    }
}

// ============================================================================
// ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,

    /// Discriminator, e.g. "transactions"
    #[serde(rename = "type")]
    pub entity_type: String,

    #[serde(flatten)]
    pub lifecycle: Lifecycle,
}

impl Entity {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Entity {
            id: row.get("id")?,
            entity_type: row.get("type")?,
            lifecycle: Lifecycle::from_row(row)?,
        })
    }
}

// ============================================================================
// ENTITY REGISTRY
// ============================================================================

/// Registry operations over one connection.
///
/// A cheap handle: it borrows the Core's connection, so every store built
/// from the same Core shares its transaction scope.
#[derive(Debug, Clone, Copy)]
pub struct EntityRegistry<'c> {
    conn: &'c Connection,
}

impl<'c> EntityRegistry<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        EntityRegistry { conn }
    }

    /// Register a new entity and return its id.
    ///
    /// A random v4 UUID is generated unless `entity_id` is supplied. A
    /// supplied id that already exists fails with `DuplicateEntity`.
    pub fn create(
        &self,
        entity_type: &str,
        entity_id: Option<&str>,
        group_id: Option<&str>,
        derived_from: Option<&str>,
    ) -> Result<String> {
        let id = match entity_id {
            Some(id) => id.to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };
        let now = temporal::now();

        self.conn
            .execute(
                "INSERT INTO entity (id, type, group_id, derived_from, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![id, entity_type, group_id, derived_from, now],
            )
            .map_err(|e| map_insert_error(e, "entity", &id))?;

        debug!(entity_id = %id, entity_type, "entity created");
        Ok(id)
    }

    pub fn get_by_id(&self, entity_id: &str) -> Result<Entity> {
        self.get_from(entity_id, "entity", "Entity", Entity::from_row)
    }

    /// Fetch one row by id from `table_or_view` and decode it with `map`.
    ///
    /// Higher-level stores use this against their `*_view` so lookups share
    /// one NotFound policy. `label` names the entity in the error.
    pub fn get_from<T, F>(
        &self,
        entity_id: &str,
        table_or_view: &str,
        label: &str,
        map: F,
    ) -> Result<T>
    where
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        if !query::is_identifier(table_or_view) {
            return Err(Error::InvalidFragment {
                key: "table_or_view".to_string(),
                fragment: table_or_view.to_string(),
            });
        }

        let sql = format!("SELECT * FROM {} WHERE id = ?1", table_or_view);
        self.conn
            .query_row(&sql, [entity_id], map)
            .optional()?
            .ok_or_else(|| Error::not_found(label, entity_id))
    }

    pub fn exists(&self, entity_id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM entity WHERE id = ?1", [entity_id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    /// Mark `old_id` as replaced by `new_id`.
    ///
    /// `new_id` is not checked: create the replacement first, in the same
    /// atomic scope. Repeating the call with the same `new_id` changes
    /// nothing; a different `new_id` overwrites the pointer (only one active
    /// supersession per entity).
    pub fn supersede(&self, old_id: &str, new_id: &str) -> Result<()> {
        let now = temporal::now();

        let changed = self.conn.execute(
            "UPDATE entity
             SET superseded_by = ?1, superseded_at = ?2, updated_at = ?2
             WHERE id = ?3 AND (superseded_by IS NULL OR superseded_by <> ?1)",
            params![new_id, now, old_id],
        )?;

        if changed == 0 && !self.exists(old_id)? {
            return Err(Error::not_found("Entity", old_id));
        }

        debug!(old_id, new_id, changed, "entity superseded");
        Ok(())
    }

    /// Bump `updated_at` after a payload change.
    pub fn update_timestamp(&self, entity_id: &str) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE entity SET updated_at = ?1 WHERE id = ?2",
            params![temporal::now(), entity_id],
        )?;

        if changed == 0 {
            return Err(Error::not_found("Entity", entity_id));
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
