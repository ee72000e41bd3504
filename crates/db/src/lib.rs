//! In-process record store for Stacks.
//!
//! Holds the user, genre, and book tables behind a single [`Database`]
//! handle. Mutations run inside a [`Transaction`] which can take
//! exclusive row locks with no-wait semantics and, at
//! [`IsolationLevel::Serializable`], validates its read set on commit.

pub mod error;
pub mod lock;
pub mod schema;
mod store;
pub mod txn;

pub use error::{StoreError, StoreResult};
pub use schema::{Book, BookFields, BookRecord, Genre, RowKey, Table, User};
pub use store::Database;
pub use txn::{IsolationLevel, Transaction, TxnId, TxnState};
