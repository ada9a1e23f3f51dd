// 📥 Import - CSV loading and development seed data
//
// CSV columns (header row required):
//   date, description, amount, account[, category, notes, currency]
//
// Rows are parsed and validated up front; nothing is written until the
// whole file is known to be good.

use chrono::{Duration, NaiveDate};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::entities::transaction::validate_currency;
use crate::entities::NewTransaction;
use crate::error::{Error, Result};
use crate::session::Core;
use crate::temporal;

/// Author recorded on seeded transactions.
pub const SEED_AUTHOR: &str = "seed-script";

/// Author recorded on CSV imports.
pub const IMPORT_AUTHOR: &str = "csv-import";

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: String,
    #[serde(default)]
    description: String,
    amount: f64,
    account: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    currency: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl CsvRow {
    fn into_transaction(self, default_currency: &str) -> Result<NewTransaction> {
        let date = temporal::parse_date(&self.date)?;
        let currency = non_blank(self.currency)
            .map(|c| c.to_uppercase())
            .unwrap_or_else(|| default_currency.to_string());
        validate_currency(&currency)?;

        let mut tx = NewTransaction::new(self.amount, date, self.account.trim(), currency)
            .with_description(self.description.trim())
            .with_author(IMPORT_AUTHOR);
        tx.category = non_blank(self.category);
        tx.notes = non_blank(self.notes);
        tx.validate()?;
        Ok(tx)
    }
}

/// Parse every row of `csv_path`. The first invalid row aborts the load with
/// its line number.
pub fn load_csv(csv_path: &Path, default_currency: &str) -> Result<Vec<NewTransaction>> {
    let mut rdr = csv::Reader::from_path(csv_path)?;
    let mut transactions = Vec::new();

    for (index, result) in rdr.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = result?;
        let tx = row
            .into_transaction(default_currency)
            .map_err(|e| Error::Validation(format!("line {}: {}", line, e)))?;
        transactions.push(tx);
    }

    info!(path = %csv_path.display(), rows = transactions.len(), "csv loaded");
    Ok(transactions)
}

/// Record each transaction through `core`. Run it in atomic mode to make the
/// import all-or-nothing.
pub fn import_transactions(core: &Core, transactions: &[NewTransaction]) -> Result<usize> {
    let store = core.transaction();
    for tx in transactions {
        store.record(tx)?;
    }
    Ok(transactions.len())
}

/// Sample data for development, dated relative to `today`.
pub fn seed_transactions(core: &Core, today: NaiveDate, currency: &str) -> Result<usize> {
    let samples: &[(i64, &str, f64, &str, &str, Option<&str>)] = &[
        (1, "Coffee at Starbucks", -6.50, "Personal", "Food", Some("Morning coffee before work")),
        (2, "Grocery shopping", -123.45, "Household", "Food", Some("Weekly groceries at FairPrice")),
        (3, "Taxi to airport", -28.00, "Personal", "Transport", None),
        (5, "Netflix subscription", -16.98, "Household", "Entertainment", Some("Monthly subscription")),
        (6, "Lunch at hawker center", -5.00, "Personal", "Food", None),
        (7, "Electricity bill", -82.50, "Household", "Utilities", Some("SP Group monthly bill")),
        (10, "Bookstore purchase", -34.90, "Personal", "Shopping", Some("Two technical books")),
        (12, "Doctor consultation", -45.00, "Personal", "Healthcare", Some("Annual checkup")),
        (14, "MRT card top-up", -50.00, "Personal", "Transport", None),
        (15, "Internet bill", -49.90, "Household", "Utilities", Some("Singtel fiber broadband")),
        (18, "Restaurant dinner", -78.50, "Personal", "Food", Some("Dinner with friends")),
        (20, "Clothing purchase", -89.00, "Personal", "Shopping", Some("Uniqlo sale")),
        (22, "Movie tickets", -24.00, "Personal", "Entertainment", Some("Weekend movie")),
        (25, "Pharmacy", -18.50, "Personal", "Healthcare", Some("Vitamins and supplements")),
        (26, "Salary", 4200.00, "Personal", "Income", None),
        (28, "Grab ride", -12.30, "Personal", "Transport", None),
    ];

    let store = core.transaction();
    for (days_ago, description, amount, account, category, notes) in samples {
        let mut tx = NewTransaction::new(*amount, today - Duration::days(*days_ago), *account, currency)
            .with_description(*description)
            .with_category(*category)
            .with_author(SEED_AUTHOR);
        tx.notes = notes.map(String::from);
        store.record(&tx)?;
    }

    info!(count = samples.len(), "seed transactions recorded");
    Ok(samples.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::entities::TransactionFilter;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_csv_with_optional_columns() {
        let file = write_csv(
            "date,description,amount,account,category,notes,currency\n\
             2025-12-01,Lunch,-12.50,Personal,Food,,\n\
             2025-12-02,Refund,30,Household,,Returned lamp,usd\n",
        );

        let rows = load_csv(file.path(), "SGD").unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].currency, "SGD");
        assert_eq!(rows[0].category.as_deref(), Some("Food"));
        assert_eq!(rows[0].notes, None);
        assert_eq!(rows[0].author, IMPORT_AUTHOR);

        assert_eq!(rows[1].currency, "USD");
        assert_eq!(rows[1].category, None);
        assert_eq!(rows[1].notes.as_deref(), Some("Returned lamp"));
    }

    #[test]
    fn test_load_csv_minimal_columns() {
        let file = write_csv("date,description,amount,account\n2025-12-01,Bus,-1.2,Personal\n");

        let rows = load_csv(file.path(), "EUR").unwrap();
        assert_eq!(rows[0].currency, "EUR");
        assert_eq!(rows[0].category, None);
    }

    #[test]
    fn test_load_csv_reports_bad_line() {
        let file = write_csv(
            "date,description,amount,account\n\
             2025-12-01,Bus,-1.2,Personal\n\
             01/12/2025,Bus,-1.2,Personal\n",
        );

        let err = load_csv(file.path(), "SGD").unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_import_is_all_or_nothing_in_atomic_mode() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("memogarden.db"));
        db.init().unwrap();

        let file = write_csv("date,description,amount,account\n2025-12-01,Bus,-1.2,Personal\n");
        let rows = load_csv(file.path(), "SGD").unwrap();

        let imported = db.atomic(|core| import_transactions(core, &rows)).unwrap();
        assert_eq!(imported, 1);

        let result: Result<usize> = db.atomic(|core| {
            import_transactions(core, &rows)?;
            let mut broken = rows[0].clone();
            broken.currency = "??".to_string();
            import_transactions(core, &[broken])
        });
        assert!(result.is_err());

        let listed = db
            .core()
            .unwrap()
            .transaction()
            .list(&TransactionFilter::default(), 100, 0)
            .unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn test_seed_dates_relative_to_today() {
        let conn = crate::db::open_in_memory().unwrap();
        let core = Core::new(conn);
        let today = temporal::parse_date("2025-12-31").unwrap();

        let count = seed_transactions(&core, today, "SGD").unwrap();
        assert_eq!(count, 16);

        let listed = core
            .transaction()
            .list(&TransactionFilter::default(), 100, 0)
            .unwrap();
        assert_eq!(listed.len(), 16);
        assert_eq!(listed[0].transaction_date, temporal::parse_date("2025-12-30").unwrap());
        assert!(listed.iter().all(|tx| tx.author == SEED_AUTHOR));
        assert_eq!(
            core.transaction().accounts().unwrap(),
            vec!["Household", "Personal"]
        );
    }
}
