// Entity Models
// Following Rich Hickey's philosophy: "Identity persists, values change"
//
// Every domain object has:
// - Stable identity (UUID) in the global `entity` registry that NEVER changes
// - A payload row in its own table (1:1 by id)
// - A `*_view` joining the two for reads
//
// Changes are recorded by superseding, never by deleting.

pub mod entity;
pub mod recurrence;
pub mod transaction;

pub use entity::{Entity, EntityRegistry, Lifecycle};
pub use recurrence::{NewRecurrence, Recurrence, RecurrenceFilter, RecurrencePatch, RecurrenceStore};
pub use transaction::{
    NewTransaction, Transaction, TransactionFilter, TransactionPatch, TransactionStore,
};

/// Entity type discriminator for transactions.
pub const TRANSACTIONS: &str = "transactions";

/// Entity type discriminator for recurrences.
pub const RECURRENCES: &str = "recurrences";

/// Default page size for list operations.
pub const DEFAULT_LIST_LIMIT: u32 = 100;

/// Deserialize helper for patch fields that distinguish "absent" (`None`)
/// from "explicit null" (`Some(None)`).
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}
