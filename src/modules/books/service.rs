//! Lock-guarded book mutations.
//!
//! Every mutation runs as one serializable transaction that first takes a
//! no-wait exclusive lock on its target row (the owning user for a create,
//! the book itself for an update or delete), then applies the change and
//! commits. Nothing here retries: a lost lock race is returned to the
//! caller immediately as [`MutationError::LockUnavailable`].

use stacks_db::{Book, BookFields, Database, IsolationLevel, StoreError, StoreResult, Transaction};

use super::conflict::{classify, MutationError};

#[derive(Clone, Debug)]
pub struct MutationService {
    db: Database,
}

impl MutationService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Insert a book after locking the owning user row.
    pub fn create_book(&self, fields: BookFields) -> Result<Book, MutationError> {
        self.guarded("create", None, |txn| {
            txn.lock_user_nowait(&fields.user_username)?;
            txn.insert_book(fields)
        })
    }

    /// Replace every caller-supplied column of a book.
    pub fn update_book(&self, id: i64, fields: BookFields) -> Result<Book, MutationError> {
        self.guarded("update", Some(id), |txn| {
            txn.lock_book_nowait(id)?;
            txn.update_book(id, fields)
        })
    }

    pub fn delete_book(&self, id: i64) -> Result<(), MutationError> {
        self.guarded("delete", Some(id), |txn| {
            txn.lock_book_nowait(id)?;
            txn.delete_book(id)
        })
    }

    fn guarded<T>(
        &self,
        op: &'static str,
        book_id: Option<i64>,
        apply: impl FnOnce(&mut Transaction) -> StoreResult<T>,
    ) -> Result<T, MutationError> {
        let mut txn = self.db.begin(IsolationLevel::Serializable);
        let txn_id = txn.id();

        let value = match apply(&mut txn) {
            Ok(value) => value,
            Err(err) => {
                txn.rollback();
                return Err(report(op, book_id, txn_id, err));
            }
        };

        match txn.commit() {
            Ok(version) => {
                tracing::debug!(op, ?book_id, txn = %txn_id, version, "book mutation committed");
                Ok(value)
            }
            Err(err) => Err(report(op, book_id, txn_id, err)),
        }
    }
}

fn report(
    op: &'static str,
    book_id: Option<i64>,
    txn_id: stacks_db::TxnId,
    err: StoreError,
) -> MutationError {
    let code = err.code();
    let classified = classify(err);
    match &classified {
        MutationError::LockUnavailable => {
            tracing::warn!(op, ?book_id, txn = %txn_id, code, "book mutation lost lock race");
        }
        MutationError::NotFound { entity } => {
            tracing::debug!(op, ?book_id, txn = %txn_id, %entity, "book mutation target missing");
        }
        MutationError::Unexpected(source) => {
            tracing::error!(op, ?book_id, txn = %txn_id, error = %source, "book mutation failed");
        }
    }
    classified
}
