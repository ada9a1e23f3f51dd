// MemoGarden - command-line interface
//
// Every command opens its own Core: autocommit for single operations,
// atomic mode for bulk writes (seed, import).

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use memogarden_core::observability::init_tracing;
use memogarden_core::{
    import_transactions, load_csv, seed_transactions, temporal, Database, Error, NewTransaction,
    Settings, TransactionFilter, TransactionPatch, DEFAULT_LIST_LIMIT,
};

#[derive(Parser)]
#[command(name = "memogarden")]
#[command(author, version, about = "Personal finance tracking on a single SQLite file", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "MEMOGARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// Database file (overrides configuration)
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the schema and apply pending migrations
    Init,

    /// Record sample transactions dated relative to today
    Seed,

    /// Import transactions from a CSV file (all-or-nothing)
    Import {
        /// CSV with columns date,description,amount,account[,category,notes,currency]
        csv: PathBuf,
    },

    /// Record a single transaction
    Add {
        /// Signed amount (negative = expense)
        #[arg(long, allow_negative_numbers = true)]
        amount: f64,

        /// Transaction date, YYYY-MM-DD (default: today)
        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,

        #[arg(long)]
        account: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        /// ISO 4217 code (default: configured currency)
        #[arg(long)]
        currency: Option<String>,

        #[arg(long)]
        author: Option<String>,
    },

    /// List transactions, newest first
    List {
        #[arg(long, value_parser = parse_date_arg)]
        start_date: Option<NaiveDate>,

        #[arg(long, value_parser = parse_date_arg)]
        end_date: Option<NaiveDate>,

        #[arg(long)]
        account: Option<String>,

        #[arg(long)]
        category: Option<String>,

        /// Include deleted/replaced transactions
        #[arg(long)]
        include_superseded: bool,

        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: u32,

        #[arg(long, default_value_t = 0)]
        offset: u32,
    },

    /// Show one transaction (including superseded ones)
    Show { id: String },

    /// Change some fields of a transaction
    Update {
        id: String,

        #[arg(long, allow_negative_numbers = true)]
        amount: Option<f64>,

        #[arg(long, value_parser = parse_date_arg)]
        date: Option<NaiveDate>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        account: Option<String>,

        #[arg(long, conflicts_with = "clear_category")]
        category: Option<String>,

        /// Remove the category
        #[arg(long)]
        clear_category: bool,

        #[arg(long, conflicts_with = "clear_notes")]
        notes: Option<String>,

        /// Remove the notes
        #[arg(long)]
        clear_notes: bool,

        #[arg(long)]
        currency: Option<String>,
    },

    /// Soft-delete a transaction (supersede it with a tombstone)
    Delete { id: String },

    /// List distinct account labels
    Accounts,

    /// List distinct category labels
    Categories,
}

fn parse_date_arg(value: &str) -> std::result::Result<NaiveDate, String> {
    temporal::parse_date(value).map_err(|e| e.to_string())
}

/// `None` = untouched, `Some(None)` = cleared.
fn nullable(value: Option<String>, clear: bool) -> Option<Option<String>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(database) = &cli.database {
        settings.database_path = database.clone();
    }

    init_tracing(if cli.verbose { "debug" } else { settings.log_filter.as_str() });

    let db = Database::from_settings(&settings);
    db.init()
        .with_context(|| format!("Failed to initialize {}", db.path().display()))?;

    run(cli.command, &db, &settings)
}

fn run(command: Commands, db: &Database, settings: &Settings) -> Result<()> {
    match command {
        Commands::Init => {
            println!("✓ Database ready at {}", db.path().display());
        }

        Commands::Seed => {
            let today = Local::now().date_naive();
            let count = db.atomic(|core| seed_transactions(core, today, &settings.default_currency))?;
            println!("✓ Seeded {} transactions", count);
        }

        Commands::Import { csv } => {
            let rows = load_csv(&csv, &settings.default_currency)
                .with_context(|| format!("Failed to load {}", csv.display()))?;
            let count = db.atomic(|core| import_transactions(core, &rows))?;
            println!("✓ Imported {} transactions from {}", count, csv.display());
        }

        Commands::Add {
            amount,
            date,
            account,
            description,
            category,
            notes,
            currency,
            author,
        } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let currency = currency
                .map(|c| c.to_uppercase())
                .unwrap_or_else(|| settings.default_currency.clone());

            let mut tx = NewTransaction::new(amount, date, account, currency)
                .with_description(description);
            tx.category = category;
            tx.notes = notes;
            if let Some(author) = author {
                tx.author = author;
            }

            let core = db.core()?;
            let id = core.transaction().record(&tx)?;
            print_json(&core.transaction().get_by_id(&id)?)?;
        }

        Commands::List {
            start_date,
            end_date,
            account,
            category,
            include_superseded,
            limit,
            offset,
        } => {
            let filter = TransactionFilter {
                start_date,
                end_date,
                account,
                category,
                include_superseded,
            };
            let rows = db.core()?.transaction().list(&filter, limit, offset)?;
            print_json(&rows)?;
        }

        Commands::Show { id } => {
            print_json(&db.core()?.transaction().get_by_id(&id)?)?;
        }

        Commands::Update {
            id,
            amount,
            date,
            description,
            account,
            category,
            clear_category,
            notes,
            clear_notes,
            currency,
        } => {
            let patch = TransactionPatch {
                amount,
                currency: currency.map(|c| c.to_uppercase()),
                transaction_date: date,
                description,
                account,
                category: nullable(category, clear_category),
                notes: nullable(notes, clear_notes),
                ..Default::default()
            };
            if patch.is_empty() {
                return Err(Error::MalformedUpdate { id }.into());
            }

            let core = db.core()?;
            core.transaction().update(&id, &patch)?;
            print_json(&core.transaction().get_by_id(&id)?)?;
        }

        Commands::Delete { id } => {
            let tombstone = db.core()?.transaction().delete(&id)?;
            println!("✓ Deleted {} (superseded by {})", id, tombstone);
        }

        Commands::Accounts => {
            for account in db.core()?.transaction().accounts()? {
                println!("{}", account);
            }
        }

        Commands::Categories => {
            for category in db.core()?.transaction().categories()? {
                println!("{}", category);
            }
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
