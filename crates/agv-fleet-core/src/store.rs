//! Storage seam for normalized records.

use crate::record::Record;
use agv_fleet_proto::Category;

/// Append-only store of normalized records.
///
/// Every `insert` is its own transaction: it either commits the whole row
/// or leaves the store unchanged.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait RecordStore: Send + Sync {
    /// Insert one record into its category table.
    ///
    /// # Errors
    ///
    /// Returns error if the transaction was rolled back.
    fn insert(&self, record: &Record) -> Result<(), PersistenceError>;

    /// Highest header id stored for `category`, or `None` for an empty table.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn max_header_id(&self, category: Category) -> Result<Option<i64>, PersistenceError>;
}

/// Errors for storage operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    /// Statement or transaction failed
    #[error("database error: {0}")]
    Database(String),
    /// A nested structure could not be encoded
    #[error("serialization error: {0}")]
    Serialize(String),
    /// Connection state is unusable
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
