//! Error types for the record store.

use thiserror::Error;

use crate::schema::{RowKey, Table};
use crate::txn::TxnId;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by transactions and store reads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A keyed lookup matched no row.
    #[error("no row matches {key}")]
    NoResultFound { key: RowKey },

    /// A no-wait lock request found the row locked by another transaction.
    #[error("could not obtain lock on {key}: held by transaction {holder}")]
    LockUnavailable { key: RowKey, holder: TxnId },

    /// A write was attempted on a row the transaction has not locked.
    #[error("transaction {txn} does not hold the lock on {key}")]
    LockNotHeld { txn: TxnId, key: RowKey },

    /// A written row references a row that does not exist.
    #[error("{table} row references missing {key}")]
    ForeignKeyViolation { table: Table, key: RowKey },

    /// A unique column already holds the value.
    #[error("duplicate value for {table}.{column}: {value}")]
    UniqueViolation {
        table: Table,
        column: &'static str,
        value: String,
    },

    /// A serializable transaction read a row that changed before it committed.
    #[error("could not serialize access: {key} changed after it was read")]
    SerializationFailure { key: RowKey },

    /// The transaction was already committed or rolled back.
    #[error("transaction {0} is no longer active")]
    TransactionClosed(TxnId),
}

impl StoreError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NoResultFound { .. } => "no_result_found",
            StoreError::LockUnavailable { .. } => "lock_unavailable",
            StoreError::LockNotHeld { .. } => "lock_not_held",
            StoreError::ForeignKeyViolation { .. } => "foreign_key_violation",
            StoreError::UniqueViolation { .. } => "unique_violation",
            StoreError::SerializationFailure { .. } => "serialization_failure",
            StoreError::TransactionClosed(_) => "transaction_closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        let err = StoreError::LockUnavailable {
            key: RowKey::Book(7),
            holder: TxnId(3),
        };
        assert_eq!(err.code(), "lock_unavailable");
        assert_eq!(
            err.to_string(),
            "could not obtain lock on book[7]: held by transaction #3"
        );

        let err = StoreError::ForeignKeyViolation {
            table: Table::Book,
            key: RowKey::Genre(42),
        };
        assert_eq!(err.code(), "foreign_key_violation");
        assert_eq!(err.to_string(), "book row references missing genre[42]");
    }
}
