//! Classification of store failures raised while mutating books.
//!
//! Only three outcomes reach callers: the target (or a referenced row) is
//! missing, the row lock was taken, or something unexpected went wrong.
//! The first two are expected and retryable by the client; the last one
//! is fatal for the request.

use std::fmt;

use stacks_db::{StoreError, Table};
use stacks_http::error::AppError;
use thiserror::Error;

use crate::utils::LOCK_UNAVAILABLE_MESSAGE;

/// Entity named in not-found responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Genre,
    Book,
}

impl From<Table> for Entity {
    fn from(table: Table) -> Self {
        match table {
            Table::User => Entity::User,
            Table::Genre => Entity::Genre,
            Table::Book => Entity::Book,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::User => "User",
            Entity::Genre => "Genre",
            Entity::Book => "Book",
        })
    }
}

/// Terminal failure of a guarded mutation.
#[derive(Debug, Error)]
pub enum MutationError {
    #[error("{entity} not found")]
    NotFound { entity: Entity },

    #[error("{}", LOCK_UNAVAILABLE_MESSAGE)]
    LockUnavailable,

    #[error("unexpected store failure")]
    Unexpected(#[source] StoreError),
}

impl MutationError {
    /// Short status class reported alongside the response.
    pub fn status_class(&self) -> &'static str {
        match self {
            MutationError::NotFound { .. } => "not_found",
            MutationError::LockUnavailable => "conflict",
            MutationError::Unexpected(_) => "fatal",
        }
    }
}

/// Map a store failure onto the mutation taxonomy.
pub fn classify(err: StoreError) -> MutationError {
    match err {
        StoreError::NoResultFound { key } => MutationError::NotFound {
            entity: key.table().into(),
        },
        // The referenced row is the one that is missing.
        StoreError::ForeignKeyViolation { key, .. } => MutationError::NotFound {
            entity: key.table().into(),
        },
        StoreError::LockUnavailable { .. } | StoreError::SerializationFailure { .. } => {
            MutationError::LockUnavailable
        }
        other => MutationError::Unexpected(other),
    }
}

impl From<MutationError> for AppError {
    fn from(err: MutationError) -> Self {
        match err {
            MutationError::NotFound { .. } => AppError::not_found(err.to_string()),
            MutationError::LockUnavailable => {
                AppError::conflict_with_code("lock_unavailable", LOCK_UNAVAILABLE_MESSAGE)
            }
            MutationError::Unexpected(source) => {
                AppError::Internal(anyhow::Error::new(source).context("book mutation failed"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use stacks_db::{RowKey, TxnId};

    #[test]
    fn missing_rows_name_their_entity() {
        let err = classify(StoreError::NoResultFound {
            key: RowKey::Book(7),
        });
        assert_eq!(err.to_string(), "Book not found");

        let err = classify(StoreError::NoResultFound {
            key: RowKey::User("ann".to_string()),
        });
        assert_eq!(err.to_string(), "User not found");
    }

    #[test]
    fn missing_reference_is_reported_as_the_referenced_entity() {
        let err = classify(StoreError::ForeignKeyViolation {
            table: Table::Book,
            key: RowKey::Genre(42),
        });
        assert!(matches!(
            err,
            MutationError::NotFound {
                entity: Entity::Genre
            }
        ));
    }

    #[test]
    fn contention_is_retryable() {
        let lock = classify(StoreError::LockUnavailable {
            key: RowKey::Book(7),
            holder: TxnId(1),
        });
        let serialization = classify(StoreError::SerializationFailure {
            key: RowKey::User("ann".to_string()),
        });
        assert!(matches!(lock, MutationError::LockUnavailable));
        assert!(matches!(serialization, MutationError::LockUnavailable));
        assert_eq!(lock.status_class(), "conflict");
    }

    #[test]
    fn everything_else_is_unexpected() {
        let err = classify(StoreError::LockNotHeld {
            txn: TxnId(1),
            key: RowKey::Book(7),
        });
        assert!(matches!(
            err,
            MutationError::Unexpected(StoreError::LockNotHeld { .. })
        ));
        assert_eq!(err.status_class(), "fatal");
    }

    #[test]
    fn http_mapping() {
        let not_found: AppError = MutationError::NotFound {
            entity: Entity::Book,
        }
        .into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let conflict: AppError = MutationError::LockUnavailable.into();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let fatal: AppError =
            MutationError::Unexpected(StoreError::TransactionClosed(TxnId(9))).into();
        assert_eq!(fatal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
