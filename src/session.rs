// Core - one connection, the stores over it, and its transaction mode
//
// Modes:
// - `Core`: autocommit; each statement (or savepoint-wrapped sequence)
//   commits on its own
// - `AtomicCore`: everything between `Core::begin` and `commit` is one
//   IMMEDIATE transaction; dropping it unfinished rolls back
//
// `commit` and `rollback` take the scope by value, so nothing can run on a
// closed scope.

use rusqlite::Connection;
use std::ops::Deref;
use tracing::{debug, warn};

use crate::entities::{EntityRegistry, RecurrenceStore, TransactionStore};
use crate::error::Result;

pub struct Core {
    conn: Connection,
}

impl Core {
    pub fn new(conn: Connection) -> Self {
        Core { conn }
    }

    /// Switch to atomic mode. Takes the write lock up front so the scope
    /// never fails half-way on a lock upgrade.
    pub fn begin(self) -> Result<AtomicCore> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        debug!("atomic scope opened");
        Ok(AtomicCore {
            core: self,
            finished: false,
        })
    }

    pub fn entity(&self) -> EntityRegistry<'_> {
        EntityRegistry::new(&self.conn)
    }

    pub fn transaction(&self) -> TransactionStore<'_> {
        TransactionStore::new(&self.conn, self.entity())
    }

    pub fn recurrence(&self) -> RecurrenceStore<'_> {
        RecurrenceStore::new(&self.conn, self.entity())
    }

    /// Raw access for callers that need a statement the stores do not offer.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// A Core inside `BEGIN IMMEDIATE ... COMMIT/ROLLBACK`.
pub struct AtomicCore {
    core: Core,
    finished: bool,
}

impl AtomicCore {
    /// On failure the scope is still open and `Drop` rolls it back.
    pub fn commit(mut self) -> Result<()> {
        self.core.conn.execute_batch("COMMIT")?;
        self.finished = true;
        debug!("atomic scope committed");
        Ok(())
    }

    pub fn rollback(mut self) -> Result<()> {
        self.core.conn.execute_batch("ROLLBACK")?;
        self.finished = true;
        debug!("atomic scope rolled back");
        Ok(())
    }
}

impl Deref for AtomicCore {
    type Target = Core;

    fn deref(&self) -> &Core {
        &self.core
    }
}

impl Drop for AtomicCore {
    fn drop(&mut self) {
        if self.finished || self.core.conn.is_autocommit() {
            return;
        }

        warn!("atomic scope dropped without commit, rolling back");
        if let Err(e) = self.core.conn.execute_batch("ROLLBACK") {
            warn!(error = %e, "implicit rollback failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::entities::{NewTransaction, TransactionFilter};
    use crate::error::Error;
    use crate::temporal;

    fn temp_database() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("memogarden.db"));
        db.init().unwrap();
        (dir, db)
    }

    fn sample() -> NewTransaction {
        NewTransaction::new(
            -4.5,
            temporal::parse_date("2025-12-27").unwrap(),
            "Personal",
            "SGD",
        )
        .with_description("Coffee")
    }

    fn counts(db: &Database) -> (i64, i64) {
        let core = db.core().unwrap();
        let conn = core.connection();
        let entities = conn
            .query_row("SELECT COUNT(*) FROM entity", [], |row| row.get(0))
            .unwrap();
        let transactions = conn
            .query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))
            .unwrap();
        (entities, transactions)
    }

    #[test]
    fn test_autocommit_writes_are_visible_to_other_cores() {
        let (_dir, db) = temp_database();

        let id = db.core().unwrap().transaction().record(&sample()).unwrap();

        let other = db.core().unwrap();
        assert_eq!(other.transaction().get_by_id(&id).unwrap().description, "Coffee");
    }

    #[test]
    fn test_stores_share_the_scope() {
        let (_dir, db) = temp_database();
        let scope = db.begin().unwrap();

        let id = scope
            .entity()
            .create(crate::entities::TRANSACTIONS, None, None, None)
            .unwrap();
        scope.transaction().create(&id, &sample()).unwrap();
        scope.commit().unwrap();

        assert_eq!(counts(&db), (1, 1));
    }

    #[test]
    fn test_atomic_rollback_leaves_no_rows() {
        let (_dir, db) = temp_database();

        let scope = db.begin().unwrap();
        scope.transaction().record(&sample()).unwrap();
        scope.transaction().record(&sample()).unwrap();
        scope.rollback().unwrap();

        assert_eq!(counts(&db), (0, 0));
    }

    #[test]
    fn test_dropped_scope_rolls_back() {
        let (_dir, db) = temp_database();

        {
            let scope = db.begin().unwrap();
            scope.transaction().record(&sample()).unwrap();
        }

        assert_eq!(counts(&db), (0, 0));
    }

    #[test]
    fn test_atomic_helper_commits_on_ok_and_rolls_back_on_err() {
        let (_dir, db) = temp_database();

        let id = db
            .atomic(|core| core.transaction().record(&sample()))
            .unwrap();
        assert_eq!(counts(&db), (1, 1));

        let result: Result<()> = db.atomic(|core| {
            core.transaction().delete(&id)?;
            Err(Error::Validation("abort".to_string()))
        });
        assert!(result.is_err());

        let tx = db.core().unwrap().transaction().get_by_id(&id).unwrap();
        assert!(tx.lifecycle.is_current());
        assert_eq!(counts(&db), (1, 1));
    }

    #[test]
    fn test_failed_step_inside_scope_keeps_earlier_work_until_commit() {
        let (_dir, db) = temp_database();

        let scope = db.begin().unwrap();
        let id = scope.transaction().record(&sample()).unwrap();
        // Duplicate payload fails; only the failing statement is undone
        assert!(scope.transaction().create(&id, &sample()).is_err());
        scope.commit().unwrap();

        assert_eq!(counts(&db), (1, 1));
        let listed = db
            .core()
            .unwrap()
            .transaction()
            .list(&TransactionFilter::default(), 100, 0)
            .unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn test_failed_commit_rolls_back_and_releases_lock() {
        let (_dir, db) = temp_database();

        let scope = db.begin().unwrap();
        scope.transaction().record(&sample()).unwrap();
        // Foreign keys checked at COMMIT: an orphan payload makes COMMIT fail
        // while the transaction stays open
        scope
            .connection()
            .execute_batch(
                "PRAGMA defer_foreign_keys = ON;
                 INSERT INTO transactions (id, amount, currency, transaction_date, description, account, author)
                 VALUES ('orphan', 1.0, 'SGD', '2025-12-27', '', 'Personal', 'system');",
            )
            .unwrap();

        assert!(matches!(scope.commit(), Err(Error::Database(_))));

        assert_eq!(counts(&db), (0, 0));
        let next = db.begin().unwrap();
        next.rollback().unwrap();
    }

    #[test]
    fn test_second_writer_waits_then_fails_busy() {
        let (_dir, db) = temp_database();

        let first = db.begin().unwrap();
        let second_conn = db.connect().unwrap();
        second_conn
            .busy_timeout(std::time::Duration::from_millis(50))
            .unwrap();
        let second = Core::new(second_conn);

        assert!(matches!(second.begin(), Err(Error::Database(_))));
        first.rollback().unwrap();
    }
}
