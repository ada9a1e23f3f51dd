// Error taxonomy for the Core API
//
// Every failure carries the offending id (or key) so callers at the edge
// (CLI, HTTP handlers) can report it without re-querying.

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    /// Lookup failed: the id is unknown to the table or view that was queried.
    #[error("{label} '{id}' not found")]
    NotFound { label: String, id: String },

    /// A caller-supplied id collides with an existing row.
    #[error("entity '{id}' already exists")]
    DuplicateEntity { id: String },

    /// Integrity failure other than a duplicate key, e.g. a payload row whose
    /// entity registry row does not exist.
    #[error("constraint violation on {table} '{id}': {message}")]
    ConstraintViolation {
        table: String,
        id: String,
        message: String,
    },

    /// The caller required a change but supplied no field to update.
    #[error("update for '{id}' contains no fields")]
    MalformedUpdate { id: String },

    /// A query fragment or column key that could carry SQL text instead of a
    /// bound parameter.
    #[error("invalid query fragment for '{key}': {fragment:?}")]
    InvalidFragment { key: String, fragment: String },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl Error {
    pub fn not_found(label: &str, id: &str) -> Self {
        Error::NotFound {
            label: label.to_string(),
            id: id.to_string(),
        }
    }

    /// True for failures caused by caller input rather than the database.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::InvalidFragment { .. }
                | Error::MalformedUpdate { .. }
                | Error::ConstraintViolation { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
