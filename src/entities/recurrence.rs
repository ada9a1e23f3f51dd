// 🔁 Recurrence Store - payload operations for the `recurrences` entity type
//
// A recurrence holds an RFC 5545 rule and a JSON template of the transactions
// it generates. The rule text is stored verbatim; expanding it is up to the
// caller.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::entity::{EntityRegistry, Lifecycle};
use super::{double_option, RECURRENCES};
use crate::db::{map_insert_error, with_savepoint};
use crate::error::{Error, Result};
use crate::query;
use crate::temporal;

fn validate_window(
    rrule: &str,
    valid_from: DateTime<Utc>,
    valid_until: Option<DateTime<Utc>>,
) -> Result<()> {
    if rrule.trim().is_empty() {
        return Err(Error::Validation("rrule must not be empty".to_string()));
    }
    if let Some(until) = valid_until {
        if until < valid_from {
            return Err(Error::Validation(format!(
                "valid_until ({}) is before valid_from ({})",
                temporal::to_timestamp(until),
                temporal::to_timestamp(valid_from)
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecurrence {
    pub rrule: String,
    /// Template of the transactions generated per occurrence
    pub entities: serde_json::Value,
    pub valid_from: DateTime<Utc>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

impl NewRecurrence {
    pub fn new(
        rrule: impl Into<String>,
        entities: serde_json::Value,
        valid_from: DateTime<Utc>,
    ) -> Self {
        NewRecurrence {
            rrule: rrule.into(),
            entities,
            valid_from,
            valid_until: None,
        }
    }

    pub fn until(mut self, valid_until: DateTime<Utc>) -> Self {
        self.valid_until = Some(valid_until);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_window(&self.rrule, self.valid_from, self.valid_until)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recurrence {
    pub id: String,
    pub rrule: String,
    pub entities: serde_json::Value,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub lifecycle: Lifecycle,
}

impl Recurrence {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let raw: String = row.get("entities")?;
        let entities = serde_json::from_str(&raw).map_err(|e| {
            let idx = row.as_ref().column_index("entities").unwrap_or(0);
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?;

        Ok(Recurrence {
            id: row.get("id")?,
            rrule: row.get("rrule")?,
            entities,
            valid_from: temporal::timestamp_column(row, "valid_from")?,
            valid_until: temporal::optional_timestamp_column(row, "valid_until")?,
            lifecycle: Lifecycle::from_row(row)?,
        })
    }
}

/// Fields to change; `valid_until: Some(None)` removes the end of the window.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RecurrencePatch {
    #[serde(default)]
    pub rrule: Option<String>,
    #[serde(default)]
    pub entities: Option<serde_json::Value>,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "double_option")]
    pub valid_until: Option<Option<DateTime<Utc>>>,
}

impl RecurrencePatch {
    pub fn is_empty(&self) -> bool {
        self.rrule.is_none()
            && self.entities.is_none()
            && self.valid_from.is_none()
            && self.valid_until.is_none()
    }

    fn assignments(&self) -> Vec<(&'static str, Option<Value>)> {
        let timestamp = |dt: DateTime<Utc>| Value::Text(temporal::to_timestamp(dt));
        vec![
            ("rrule", self.rrule.clone().map(Value::Text)),
            (
                "entities",
                self.entities.as_ref().map(|e| Value::Text(e.to_string())),
            ),
            ("valid_from", self.valid_from.map(timestamp)),
            (
                "valid_until",
                self.valid_until
                    .map(|until| until.map(timestamp).unwrap_or(Value::Null)),
            ),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RecurrenceFilter {
    /// Recurrences starting at or after this instant
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    /// Recurrences ending at or before this instant
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub include_superseded: bool,
}

const FILTER_FRAGMENTS: &[(&str, &str)] = &[
    ("valid_from", "r.valid_from >= ?"),
    ("valid_until", "r.valid_until <= ?"),
];

#[derive(Debug, Clone, Copy)]
pub struct RecurrenceStore<'c> {
    conn: &'c Connection,
    entity: EntityRegistry<'c>,
}

impl<'c> RecurrenceStore<'c> {
    pub fn new(conn: &'c Connection, entity: EntityRegistry<'c>) -> Self {
        RecurrenceStore { conn, entity }
    }

    pub fn get_by_id(&self, id: &str) -> Result<Recurrence> {
        self.entity
            .get_from(id, "recurrences_view", "Recurrence", Recurrence::from_row)
    }

    pub fn create(&self, id: &str, recurrence: &NewRecurrence) -> Result<()> {
        recurrence.validate()?;

        self.conn
            .execute(
                "INSERT INTO recurrences (id, rrule, entities, valid_from, valid_until)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    recurrence.rrule,
                    recurrence.entities.to_string(),
                    temporal::to_timestamp(recurrence.valid_from),
                    recurrence.valid_until.map(temporal::to_timestamp),
                ],
            )
            .map_err(|e| map_insert_error(e, "recurrences", id))?;

        debug!(recurrence_id = %id, rrule = %recurrence.rrule, "recurrence payload inserted");
        Ok(())
    }

    pub fn record(&self, recurrence: &NewRecurrence) -> Result<String> {
        recurrence.validate()?;

        with_savepoint(self.conn, "recurrence_record", || {
            let id = self.entity.create(RECURRENCES, None, None, None)?;
            self.create(&id, recurrence)?;
            Ok(id)
        })
    }

    pub fn list(
        &self,
        filter: &RecurrenceFilter,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Recurrence>> {
        let timestamp = |dt: &Option<DateTime<Utc>>| {
            dt.map(|dt| Value::Text(temporal::to_timestamp(dt)))
        };
        let conditions = [
            ("valid_from", timestamp(&filter.valid_from)),
            ("valid_until", timestamp(&filter.valid_until)),
        ];

        let (mut clause, mut values) = query::build_where_clause(&conditions, FILTER_FRAGMENTS)?;
        if !filter.include_superseded {
            clause = query::and_literal(&clause, "e.superseded_by IS NULL");
        }

        let sql = format!(
            "SELECT r.*,
                    e.created_at, e.updated_at, e.superseded_by, e.superseded_at,
                    e.group_id, e.derived_from
             FROM recurrences r
             JOIN entity e ON r.id = e.id
             WHERE {}
             ORDER BY r.valid_from DESC, e.created_at DESC, r.rowid DESC
             LIMIT ? OFFSET ?",
            clause
        );
        values.push(Value::Integer(i64::from(limit)));
        values.push(Value::Integer(i64::from(offset)));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), Recurrence::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn update(&self, id: &str, patch: &RecurrencePatch) -> Result<bool> {
        if patch.is_empty() {
            return Ok(false);
        }

        // The window is checked against the stored values it is merged with
        let current = self.get_by_id(id)?;
        validate_window(
            patch.rrule.as_deref().unwrap_or(&current.rrule),
            patch.valid_from.unwrap_or(current.valid_from),
            patch.valid_until.unwrap_or(current.valid_until),
        )?;

        let (clause, mut values) = query::build_update_clause(&patch.assignments(), &["id"])?;
        let sql = format!("UPDATE recurrences SET {} WHERE id = ?", clause);
        values.push(Value::Text(id.to_string()));

        with_savepoint(self.conn, "recurrence_update", || {
            let changed = self.conn.execute(&sql, params_from_iter(values.iter()))?;
            if changed == 0 {
                return Err(Error::not_found("Recurrence", id));
            }
            self.entity.update_timestamp(id)
        })?;

        debug!(recurrence_id = %id, "recurrence updated");
        Ok(true)
    }

    /// Soft delete, same contract as `TransactionStore::delete`.
    pub fn delete(&self, id: &str) -> Result<String> {
        let current = self.get_by_id(id)?;
        if let Some(existing) = current.lifecycle.superseded_by {
            return Ok(existing);
        }

        let tombstone = with_savepoint(self.conn, "recurrence_delete", || {
            let tombstone = self.entity.create(RECURRENCES, None, None, Some(id))?;
            self.entity.supersede(id, &tombstone)?;
            Ok(tombstone)
        })?;

        info!(recurrence_id = %id, tombstone = %tombstone, "recurrence deleted");
        Ok(tombstone)
    }
}
