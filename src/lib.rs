// MemoGarden Core - Library
// Exposes all modules for use in the CLI, the API server, and tests

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod import;
pub mod observability;
pub mod query;
pub mod schema;
pub mod session;
pub mod temporal;

// Re-export commonly used types
pub use config::Settings;
pub use db::{open_in_memory, Database};
pub use entities::{
    Entity, EntityRegistry, Lifecycle,
    NewRecurrence, Recurrence, RecurrenceFilter, RecurrencePatch, RecurrenceStore,
    NewTransaction, Transaction, TransactionFilter, TransactionPatch, TransactionStore,
    DEFAULT_LIST_LIMIT,
};
pub use error::{Error, Result};
pub use import::{import_transactions, load_csv, seed_transactions};
pub use session::{AtomicCore, Core};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
