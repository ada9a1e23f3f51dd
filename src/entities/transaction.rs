// 💸 Transaction Store - payload operations for the `transactions` entity type
//
// A transaction is a payload row keyed by an entity id. The store never
// touches lifecycle columns directly: creation, timestamp bumps and
// supersession all go through the EntityRegistry it holds.
//
// Money convention: negative amount = expense, positive = income.

use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::entity::{EntityRegistry, Lifecycle};
use super::{double_option, TRANSACTIONS};
use crate::db::{map_insert_error, with_savepoint};
use crate::error::{Error, Result};
use crate::query;
use crate::temporal;

/// Author recorded when the caller does not name one.
pub const DEFAULT_AUTHOR: &str = "system";

/// Currency codes are three upper-case ASCII letters (ISO 4217 shape).
pub fn validate_currency(code: &str) -> Result<()> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "currency must be a 3-letter upper-case code, got '{}'",
            code
        )))
    }
}

fn validate_amount(amount: f64) -> Result<()> {
    if amount.is_finite() {
        Ok(())
    } else {
        Err(Error::Validation(format!("amount must be finite, got {}", amount)))
    }
}

fn validate_account(account: &str) -> Result<()> {
    if account.trim().is_empty() {
        Err(Error::Validation("account must not be empty".to_string()))
    } else {
        Ok(())
    }
}

fn default_author() -> String {
    DEFAULT_AUTHOR.to_string()
}

// ============================================================================
// NEW TRANSACTION (write model)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub amount: f64,
    pub currency: String,
    pub transaction_date: NaiveDate,
    #[serde(default)]
    pub description: String,
    pub account: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "default_author")]
    pub author: String,
    #[serde(default)]
    pub recurrence_id: Option<String>,
}

impl NewTransaction {
    pub fn new(
        amount: f64,
        transaction_date: NaiveDate,
        account: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        NewTransaction {
            amount,
            currency: currency.into(),
            transaction_date,
            description: String::new(),
            account: account.into(),
            category: None,
            notes: None,
            author: default_author(),
            recurrence_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_recurrence(mut self, recurrence_id: impl Into<String>) -> Self {
        self.recurrence_id = Some(recurrence_id.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_amount(self.amount)?;
        validate_currency(&self.currency)?;
        validate_account(&self.account)
    }
}

// ============================================================================
// TRANSACTION (read model, one row of transactions_view)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub amount: f64,
    pub currency: String,
    pub transaction_date: NaiveDate,
    pub description: String,
    pub account: String,
    pub category: Option<String>,
    pub author: String,
    pub notes: Option<String>,
    pub recurrence_id: Option<String>,

    #[serde(flatten)]
    pub lifecycle: Lifecycle,
}

impl Transaction {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Transaction {
            id: row.get("id")?,
            amount: row.get("amount")?,
            currency: row.get("currency")?,
            transaction_date: temporal::date_column(row, "transaction_date")?,
            description: row.get("description")?,
            account: row.get("account")?,
            category: row.get("category")?,
            author: row.get("author")?,
            notes: row.get("notes")?,
            recurrence_id: row.get("recurrence_id")?,
            lifecycle: Lifecycle::from_row(row)?,
        })
    }
}

// ============================================================================
// PATCH (partial update)
// ============================================================================

/// Fields to change. `None` leaves a column untouched; for the nullable
/// columns `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TransactionPatch {
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub transaction_date: Option<NaiveDate>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub category: Option<Option<String>>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub recurrence_id: Option<Option<String>>,
}

fn text(value: &Option<String>) -> Option<Value> {
    value.as_ref().map(|v| Value::Text(v.clone()))
}

fn nullable_text(value: &Option<Option<String>>) -> Option<Value> {
    match value {
        None => None,
        Some(None) => Some(Value::Null),
        Some(Some(v)) => Some(Value::Text(v.clone())),
    }
}

impl TransactionPatch {
    pub fn is_empty(&self) -> bool {
        self.assignments().iter().all(|(_, value)| value.is_none())
    }

    /// Column assignments in a fixed order, ready for `build_update_clause`.
    pub fn assignments(&self) -> Vec<(&'static str, Option<Value>)> {
        vec![
            ("amount", self.amount.map(Value::Real)),
            ("currency", text(&self.currency)),
            (
                "transaction_date",
                self.transaction_date
                    .map(|d| Value::Text(temporal::to_datestring(d))),
            ),
            ("description", text(&self.description)),
            ("account", text(&self.account)),
            ("category", nullable_text(&self.category)),
            ("author", text(&self.author)),
            ("notes", nullable_text(&self.notes)),
            ("recurrence_id", nullable_text(&self.recurrence_id)),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(amount) = self.amount {
            validate_amount(amount)?;
        }
        if let Some(currency) = &self.currency {
            validate_currency(currency)?;
        }
        if let Some(account) = &self.account {
            validate_account(account)?;
        }
        Ok(())
    }
}

// ============================================================================
// FILTER
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TransactionFilter {
    /// Inclusive lower bound on `transaction_date`
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// Inclusive upper bound on `transaction_date`
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub include_superseded: bool,
}

const FILTER_FRAGMENTS: &[(&str, &str)] = &[
    ("start_date", "t.transaction_date >= ?"),
    ("end_date", "t.transaction_date <= ?"),
    ("account", "t.account = ?"),
    ("category", "t.category = ?"),
];

impl TransactionFilter {
    fn conditions(&self) -> Vec<(&'static str, Option<Value>)> {
        let date = |d: &Option<NaiveDate>| d.map(|d| Value::Text(temporal::to_datestring(d)));
        vec![
            ("start_date", date(&self.start_date)),
            ("end_date", date(&self.end_date)),
            ("account", text(&self.account)),
            ("category", text(&self.category)),
        ]
    }
}

// ============================================================================
// TRANSACTION STORE
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct TransactionStore<'c> {
    conn: &'c Connection,
    entity: EntityRegistry<'c>,
}

impl<'c> TransactionStore<'c> {
    pub fn new(conn: &'c Connection, entity: EntityRegistry<'c>) -> Self {
        TransactionStore { conn, entity }
    }

    /// Fetch one transaction with its lifecycle metadata. Superseded
    /// transactions remain readable by id.
    pub fn get_by_id(&self, id: &str) -> Result<Transaction> {
        self.entity
            .get_from(id, "transactions_view", "Transaction", Transaction::from_row)
    }

    /// Insert the payload for an entity that already exists.
    pub fn create(&self, id: &str, tx: &NewTransaction) -> Result<()> {
        tx.validate()?;

        self.conn
            .execute(
                "INSERT INTO transactions
                 (id, amount, currency, transaction_date, description, account, category, author, notes, recurrence_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id,
                    tx.amount,
                    tx.currency,
                    temporal::to_datestring(tx.transaction_date),
                    tx.description,
                    tx.account,
                    tx.category,
                    tx.author,
                    tx.notes,
                    tx.recurrence_id,
                ],
            )
            .map_err(|e| map_insert_error(e, "transactions", id))?;

        debug!(transaction_id = %id, amount = tx.amount, "transaction payload inserted");
        Ok(())
    }

    /// Register a new entity and insert its payload as one unit.
    pub fn record(&self, tx: &NewTransaction) -> Result<String> {
        tx.validate()?;

        with_savepoint(self.conn, "transaction_record", || {
            let id = self.entity.create(TRANSACTIONS, None, None, None)?;
            self.create(&id, tx)?;
            Ok(id)
        })
    }

    /// Newest first. Superseded transactions are left out unless the filter
    /// asks for them.
    pub fn list(
        &self,
        filter: &TransactionFilter,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Transaction>> {
        let (mut clause, mut values) =
            query::build_where_clause(&filter.conditions(), FILTER_FRAGMENTS)?;
        if !filter.include_superseded {
            clause = query::and_literal(&clause, "e.superseded_by IS NULL");
        }

        let sql = format!(
            "SELECT t.*,
                    e.created_at, e.updated_at, e.superseded_by, e.superseded_at,
                    e.group_id, e.derived_from
             FROM transactions t
             JOIN entity e ON t.id = e.id
             WHERE {}
             ORDER BY t.transaction_date DESC, e.created_at DESC, t.rowid DESC
             LIMIT ? OFFSET ?",
            clause
        );
        values.push(Value::Integer(i64::from(limit)));
        values.push(Value::Integer(i64::from(offset)));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), Transaction::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        debug!(count = rows.len(), limit, offset, "transactions listed");
        Ok(rows)
    }

    /// Apply a partial update. Returns `false` when the patch is empty (no
    /// statement is issued).
    pub fn update(&self, id: &str, patch: &TransactionPatch) -> Result<bool> {
        if patch.is_empty() {
            return Ok(false);
        }
        patch.validate()?;

        let (clause, mut values) = query::build_update_clause(&patch.assignments(), &["id"])?;
        let sql = format!("UPDATE transactions SET {} WHERE id = ?", clause);
        values.push(Value::Text(id.to_string()));

        with_savepoint(self.conn, "transaction_update", || {
            let changed = self.conn.execute(&sql, params_from_iter(values.iter()))?;
            if changed == 0 {
                return Err(Error::not_found("Transaction", id));
            }
            self.entity.update_timestamp(id)
        })?;

        debug!(transaction_id = %id, "transaction updated");
        Ok(true)
    }

    /// Soft delete: create a tombstone entity derived from `id` and supersede
    /// the transaction with it. Returns the tombstone id.
    ///
    /// Deleting an already-superseded transaction returns its existing
    /// replacement without writing.
    pub fn delete(&self, id: &str) -> Result<String> {
        let current = self.get_by_id(id)?;
        if let Some(existing) = current.lifecycle.superseded_by {
            return Ok(existing);
        }

        let tombstone = with_savepoint(self.conn, "transaction_delete", || {
            let tombstone = self.entity.create(TRANSACTIONS, None, None, Some(id))?;
            self.entity.supersede(id, &tombstone)?;
            Ok(tombstone)
        })?;

        info!(transaction_id = %id, tombstone = %tombstone, "transaction deleted");
        Ok(tombstone)
    }

    /// Distinct account labels, sorted. Includes labels only used by
    /// superseded transactions.
    pub fn accounts(&self) -> Result<Vec<String>> {
        self.labels("account")
    }

    /// Distinct category labels, sorted.
    pub fn categories(&self) -> Result<Vec<String>> {
        self.labels("category")
    }

    fn labels(&self, column: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT {0} FROM transactions WHERE {0} IS NOT NULL ORDER BY {0}",
            column
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let labels = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(labels)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use std::thread::sleep;
    use std::time::Duration;

    fn date(value: &str) -> NaiveDate {
        temporal::parse_date(value).unwrap()
    }

    fn store(conn: &Connection) -> TransactionStore<'_> {
        TransactionStore::new(conn, EntityRegistry::new(conn))
    }

    fn lunch() -> NewTransaction {
        NewTransaction::new(-12.5, date("2025-12-27"), "Personal", "SGD")
            .with_description("Lunch")
            .with_category("Food")
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })
        .unwrap()
    }

    #[test]
    fn test_validate_currency() {
        assert!(validate_currency("SGD").is_ok());
        assert!(validate_currency("sgd").is_err());
        assert!(validate_currency("SG").is_err());
        assert!(validate_currency("SGDX").is_err());
    }

    #[test]
    fn test_record_and_get_round_trip() {
        let conn = open_in_memory().unwrap();
        let store = store(&conn);

        let id = store.record(&lunch().with_notes("with team")).unwrap();
        let tx = store.get_by_id(&id).unwrap();

        assert_eq!(tx.id, id);
        assert_eq!(tx.amount, -12.5);
        assert_eq!(tx.currency, "SGD");
        assert_eq!(tx.transaction_date, date("2025-12-27"));
        assert_eq!(tx.description, "Lunch");
        assert_eq!(tx.category.as_deref(), Some("Food"));
        assert_eq!(tx.notes.as_deref(), Some("with team"));
        assert_eq!(tx.author, "system");
        assert!(tx.lifecycle.is_current());

        // Stored as a plain calendar date
        let raw: String = conn
            .query_row(
                "SELECT transaction_date FROM transactions WHERE id = ?1",
                [&id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(raw, "2025-12-27");
    }

    #[test]
    fn test_get_by_id_unknown_is_not_found() {
        let conn = open_in_memory().unwrap();
        let err = store(&conn).get_by_id("nope").unwrap_err();
        assert_eq!(err.to_string(), "Transaction 'nope' not found");
    }

    #[test]
    fn test_create_requires_entity_row() {
        let conn = open_in_memory().unwrap();
        let err = store(&conn).create("orphan", &lunch()).unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation { .. }));
        assert_eq!(count(&conn, "transactions"), 0);
    }

    #[test]
    fn test_create_twice_is_duplicate() {
        let conn = open_in_memory().unwrap();
        let store = store(&conn);
        let id = store.record(&lunch()).unwrap();

        let err = store.create(&id, &lunch()).unwrap_err();
        assert!(matches!(err, Error::DuplicateEntity { .. }));
    }

    #[test]
    fn test_record_rejects_invalid_input_without_writing() {
        let conn = open_in_memory().unwrap();
        let store = store(&conn);

        let bad = NewTransaction::new(1.0, date("2025-12-27"), "Personal", "dollars");
        assert!(matches!(store.record(&bad), Err(Error::Validation(_))));

        let bad = NewTransaction::new(1.0, date("2025-12-27"), "  ", "SGD");
        assert!(matches!(store.record(&bad), Err(Error::Validation(_))));

        assert_eq!(count(&conn, "entity"), 0);
    }

    #[test]
    fn test_list_orders_newest_first() {
        let conn = open_in_memory().unwrap();
        let store = store(&conn);

        let older = store
            .record(&NewTransaction::new(-1.0, date("2025-12-01"), "Personal", "SGD"))
            .unwrap();
        let newer = store
            .record(&NewTransaction::new(-2.0, date("2025-12-20"), "Personal", "SGD"))
            .unwrap();
        let same_day = store
            .record(&NewTransaction::new(-3.0, date("2025-12-20"), "Personal", "SGD"))
            .unwrap();

        let ids: Vec<String> = store
            .list(&TransactionFilter::default(), 100, 0)
            .unwrap()
            .into_iter()
            .map(|tx| tx.id)
            .collect();

        assert_eq!(ids, vec![same_day, newer, older]);
    }

    #[test]
    fn test_list_filters_and_pages() {
        let conn = open_in_memory().unwrap();
        let store = store(&conn);

        for (day, account, category) in [
            ("2025-11-30", "Personal", "Food"),
            ("2025-12-05", "Household", "Utilities"),
            ("2025-12-10", "Personal", "Food"),
            ("2025-12-15", "Personal", "Transport"),
            ("2026-01-02", "Personal", "Food"),
        ] {
            store
                .record(
                    &NewTransaction::new(-5.0, date(day), account, "SGD").with_category(category),
                )
                .unwrap();
        }

        let december = TransactionFilter {
            start_date: Some(date("2025-12-01")),
            end_date: Some(date("2025-12-31")),
            ..Default::default()
        };
        assert_eq!(store.list(&december, 100, 0).unwrap().len(), 3);

        let personal_food = TransactionFilter {
            account: Some("Personal".to_string()),
            category: Some("Food".to_string()),
            ..Default::default()
        };
        let rows = store.list(&personal_food, 100, 0).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|tx| tx.account == "Personal"));

        let page = store.list(&personal_food, 2, 2).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].transaction_date, date("2025-11-30"));
    }

    #[test]
    fn test_list_excludes_superseded_by_default() {
        let conn = open_in_memory().unwrap();
        let store = store(&conn);
        let kept = store.record(&lunch()).unwrap();
        let removed = store.record(&lunch()).unwrap();
        store.delete(&removed).unwrap();

        let current = store.list(&TransactionFilter::default(), 100, 0).unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].id, kept);

        let all = TransactionFilter {
            include_superseded: true,
            ..Default::default()
        };
        let rows = store.list(&all, 100, 0).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|tx| tx.id == removed && !tx.lifecycle.is_current()));
    }

    #[test]
    fn test_list_filter_values_are_bound() {
        let conn = open_in_memory().unwrap();
        let store = store(&conn);
        store.record(&lunch()).unwrap();

        let hostile = TransactionFilter {
            account: Some("x' OR '1'='1".to_string()),
            ..Default::default()
        };
        assert!(store.list(&hostile, 100, 0).unwrap().is_empty());
        assert_eq!(count(&conn, "transactions"), 1);
    }

    #[test]
    fn test_list_single_day_round_trip() {
        let conn = open_in_memory().unwrap();
        let store = store(&conn);
        for day in ["2025-12-26", "2025-12-28"] {
            let mut neighbour = lunch();
            neighbour.transaction_date = date(day);
            store.record(&neighbour).unwrap();
        }
        let id = store.record(&lunch()).unwrap();

        let filter = TransactionFilter {
            start_date: Some(date("2025-12-27")),
            end_date: Some(date("2025-12-27")),
            ..Default::default()
        };
        let rows = store.list(&filter, 100, 0).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id);
        assert_eq!(rows[0].transaction_date, date("2025-12-27"));
    }

    #[test]
    fn test_update_touches_only_supplied_fields() {
        let conn = open_in_memory().unwrap();
        let store = store(&conn);
        let id = store.record(&lunch().with_notes("keep me")).unwrap();
        let before = store.get_by_id(&id).unwrap();

        sleep(Duration::from_millis(2));
        let patch = TransactionPatch {
            amount: Some(-15.0),
            transaction_date: Some(date("2025-12-28")),
            ..Default::default()
        };
        assert!(store.update(&id, &patch).unwrap());

        let after = store.get_by_id(&id).unwrap();
        assert_eq!(after.amount, -15.0);
        assert_eq!(after.transaction_date, date("2025-12-28"));
        assert_eq!(after.description, before.description);
        assert_eq!(after.category, before.category);
        assert_eq!(after.notes, before.notes);
        assert!(after.lifecycle.updated_at > before.lifecycle.updated_at);
        assert_eq!(after.lifecycle.created_at, before.lifecycle.created_at);
    }

    #[test]
    fn test_update_description_only() {
        let conn = open_in_memory().unwrap();
        let store = store(&conn);
        let id = store.record(&lunch()).unwrap();
        let before = store.get_by_id(&id).unwrap();

        sleep(Duration::from_millis(2));
        let patch = TransactionPatch {
            description: Some("Team lunch".to_string()),
            ..Default::default()
        };
        assert!(store.update(&id, &patch).unwrap());

        let after = store.get_by_id(&id).unwrap();
        assert_eq!(after.description, "Team lunch");
        assert_eq!(after.amount, before.amount);
        assert_eq!(after.account, before.account);
        assert_eq!(after.category, before.category);
        assert_eq!(after.currency, before.currency);
        assert_eq!(after.transaction_date, before.transaction_date);
        assert!(after.lifecycle.updated_at > before.lifecycle.updated_at);
    }

    #[test]
    fn test_update_can_clear_nullable_fields() {
        let conn = open_in_memory().unwrap();
        let store = store(&conn);
        let id = store.record(&lunch().with_notes("temporary")).unwrap();

        let patch = TransactionPatch {
            category: Some(None),
            ..Default::default()
        };
        store.update(&id, &patch).unwrap();

        let tx = store.get_by_id(&id).unwrap();
        assert_eq!(tx.category, None);
        assert_eq!(tx.notes.as_deref(), Some("temporary"));
    }

    #[test]
    fn test_empty_patch_is_noop() {
        let conn = open_in_memory().unwrap();
        let store = store(&conn);
        let id = store.record(&lunch()).unwrap();
        let before = store.get_by_id(&id).unwrap();

        assert!(!store.update(&id, &TransactionPatch::default()).unwrap());
        assert!(!store.update("unknown", &TransactionPatch::default()).unwrap());
        assert_eq!(store.get_by_id(&id).unwrap(), before);
    }

    #[test]
    fn test_update_unknown_id_is_not_found() {
        let conn = open_in_memory().unwrap();
        let patch = TransactionPatch {
            description: Some("x".to_string()),
            ..Default::default()
        };
        let err = store(&conn).update("unknown", &patch).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_patch_deserialization_distinguishes_null_from_absent() {
        let patch: TransactionPatch =
            serde_json::from_str(r#"{"category": null, "description": "Dinner"}"#).unwrap();
        assert_eq!(patch.category, Some(None));
        assert_eq!(patch.notes, None);
        assert_eq!(patch.description.as_deref(), Some("Dinner"));

        let empty: TransactionPatch = serde_json::from_str(r#"{"id": "ignored"}"#).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_delete_creates_tombstone() {
        let conn = open_in_memory().unwrap();
        let store = store(&conn);
        let registry = EntityRegistry::new(&conn);
        let id = store.record(&lunch()).unwrap();

        let tombstone = store.delete(&id).unwrap();

        let tx = store.get_by_id(&id).unwrap();
        assert_eq!(tx.lifecycle.superseded_by.as_deref(), Some(tombstone.as_str()));
        let marker = registry.get_by_id(&tombstone).unwrap();
        assert_eq!(marker.lifecycle.derived_from.as_deref(), Some(id.as_str()));

        // Second delete returns the same tombstone and writes nothing
        assert_eq!(store.delete(&id).unwrap(), tombstone);
        assert_eq!(count(&conn, "entity"), 2);

        assert!(matches!(store.delete("unknown"), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_labels_are_distinct_and_sorted() {
        let conn = open_in_memory().unwrap();
        let store = store(&conn);
        store.record(&lunch()).unwrap();
        store
            .record(
                &NewTransaction::new(-80.0, date("2025-12-01"), "Household", "SGD")
                    .with_category("Utilities"),
            )
            .unwrap();
        store
            .record(&NewTransaction::new(3000.0, date("2025-12-01"), "Personal", "SGD"))
            .unwrap();

        assert_eq!(store.accounts().unwrap(), vec!["Household", "Personal"]);
        assert_eq!(store.categories().unwrap(), vec!["Food", "Utilities"]);
    }
}
