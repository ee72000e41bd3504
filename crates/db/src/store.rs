//! Shared table state and the [`Database`] handle.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::StoreError;
use crate::lock::RowLockTable;
use crate::schema::{Book, BookRecord, Genre, RowKey, Table, User, Versioned};
use crate::txn::{IsolationLevel, Transaction, TxnId, Write};

/// Committed table contents.
#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub users: BTreeMap<String, Versioned<User>>,
    /// email -> username
    pub emails: HashMap<String, String>,
    pub genres: BTreeMap<i64, Versioned<Genre>>,
    pub books: BTreeMap<i64, Versioned<Book>>,
    /// genre id -> book ids
    pub books_by_genre: BTreeMap<i64, BTreeSet<i64>>,
    commit_seq: u64,
}

impl Tables {
    /// Version of the committed row behind `key`, `None` if absent.
    pub fn version(&self, key: &RowKey) -> Option<u64> {
        match key {
            RowKey::User(username) => self.users.get(username).map(|v| v.version),
            RowKey::Genre(id) => self.genres.get(id).map(|v| v.version),
            RowKey::Book(id) => self.books.get(id).map(|v| v.version),
        }
    }

    /// Checks a pending user insert against committed unique columns.
    pub fn check_unique_user(&self, user: &User) -> Result<(), StoreError> {
        if self.users.contains_key(&user.username) {
            return Err(StoreError::UniqueViolation {
                table: Table::User,
                column: "username",
                value: user.username.clone(),
            });
        }
        if self.emails.contains_key(&user.email) {
            return Err(StoreError::UniqueViolation {
                table: Table::User,
                column: "email",
                value: user.email.clone(),
            });
        }
        Ok(())
    }

    pub fn next_commit_seq(&mut self) -> u64 {
        self.commit_seq += 1;
        self.commit_seq
    }

    pub fn apply(&mut self, write: Write, version: u64) {
        match write {
            Write::InsertUser(user) => {
                self.emails
                    .insert(user.email.clone(), user.username.clone());
                self.users
                    .insert(user.username.clone(), Versioned { row: user, version });
            }
            Write::InsertGenre(genre) => {
                self.genres.insert(genre.id, Versioned { row: genre, version });
            }
            Write::PutBook(book) => {
                if let Some(previous) = self.books.get(&book.id) {
                    if previous.row.genre_id != book.genre_id {
                        self.unindex_book(previous.row.genre_id, book.id);
                    }
                }
                self.books_by_genre
                    .entry(book.genre_id)
                    .or_default()
                    .insert(book.id);
                self.books.insert(book.id, Versioned { row: book, version });
            }
            Write::DeleteBook(id) => {
                if let Some(previous) = self.books.remove(&id) {
                    self.unindex_book(previous.row.genre_id, id);
                }
            }
        }
    }

    fn unindex_book(&mut self, genre_id: i64, book_id: i64) {
        if let Some(ids) = self.books_by_genre.get_mut(&genre_id) {
            ids.remove(&book_id);
            if ids.is_empty() {
                self.books_by_genre.remove(&genre_id);
            }
        }
    }

    fn join(&self, book: &Book) -> Option<BookRecord> {
        let genre = self.genres.get(&book.genre_id)?;
        Some(BookRecord {
            book: book.clone(),
            genre: genre.row.clone(),
        })
    }
}

pub(crate) struct Shared {
    name: String,
    pub tables: RwLock<Tables>,
    pub locks: RowLockTable,
    next_txn: AtomicU64,
    book_seq: AtomicI64,
    genre_seq: AtomicI64,
    migrations: Mutex<Vec<String>>,
}

impl Shared {
    pub fn next_book_id(&self) -> i64 {
        self.book_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn next_genre_id(&self) -> i64 {
        self.genre_seq.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Handle to an in-process record store.
///
/// Cloning is cheap; every clone addresses the same tables, lock table,
/// and sequences. Reads through the handle take no row locks and always
/// observe committed state. Writes go through a [`Transaction`].
#[derive(Clone)]
pub struct Database {
    pub(crate) shared: Arc<Shared>,
}

impl Database {
    /// Opens an empty store.
    pub fn open(name: impl Into<String>) -> Self {
        let name = name.into();
        tracing::info!(target: "stacks-db", db = %name, "record store opened");
        Self {
            shared: Arc::new(Shared {
                name,
                tables: RwLock::new(Tables::default()),
                locks: RowLockTable::new(),
                next_txn: AtomicU64::new(0),
                book_seq: AtomicI64::new(0),
                genre_seq: AtomicI64::new(0),
                migrations: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Starts a transaction at the given isolation level.
    pub fn begin(&self, isolation: IsolationLevel) -> Transaction {
        let id = TxnId(self.shared.next_txn.fetch_add(1, Ordering::SeqCst) + 1);
        tracing::trace!(txn = %id, ?isolation, "transaction started");
        Transaction::new(self.clone(), id, isolation)
    }

    pub fn users(&self) -> Vec<User> {
        let tables = self.shared.tables.read();
        tables.users.values().map(|v| v.row.clone()).collect()
    }

    pub fn user(&self, username: &str) -> Option<User> {
        let tables = self.shared.tables.read();
        tables.users.get(username).map(|v| v.row.clone())
    }

    pub fn genres(&self) -> Vec<Genre> {
        let tables = self.shared.tables.read();
        tables.genres.values().map(|v| v.row.clone()).collect()
    }

    pub fn genre(&self, id: i64) -> Option<Genre> {
        let tables = self.shared.tables.read();
        tables.genres.get(&id).map(|v| v.row.clone())
    }

    /// Reads one book joined with its genre.
    pub fn book(&self, id: i64) -> Option<BookRecord> {
        let tables = self.shared.tables.read();
        tables.books.get(&id).and_then(|v| tables.join(&v.row))
    }

    /// Reads all books, or those of one genre, in id order.
    pub fn books(&self, genre_id: Option<i64>) -> Vec<BookRecord> {
        let tables = self.shared.tables.read();
        match genre_id {
            Some(genre_id) => tables
                .books_by_genre
                .get(&genre_id)
                .into_iter()
                .flatten()
                .filter_map(|id| tables.books.get(id))
                .filter_map(|v| tables.join(&v.row))
                .collect(),
            None => tables
                .books
                .values()
                .filter_map(|v| tables.join(&v.row))
                .collect(),
        }
    }

    /// Transaction currently holding the lock on `key`.
    pub fn lock_holder(&self, key: &RowKey) -> Option<TxnId> {
        self.shared.locks.holder(key)
    }

    /// Number of rows locked by in-flight transactions.
    pub fn locked_rows(&self) -> usize {
        self.shared.locks.len()
    }

    /// Runs `up` once per `scope/id` pair and records it in the ledger.
    ///
    /// Returns `Ok(false)` without calling `up` if the migration was already
    /// applied. A failed migration is not recorded.
    pub fn apply_migration<F, E>(&self, scope: &str, id: &str, up: F) -> Result<bool, E>
    where
        F: FnOnce(&Database) -> Result<(), E>,
    {
        let key = format!("{scope}/{id}");
        let mut ledger = self.shared.migrations.lock();
        if ledger.contains(&key) {
            tracing::debug!(migration = %key, "migration already applied");
            return Ok(false);
        }

        up(self)?;
        tracing::info!(migration = %key, "migration applied");
        ledger.push(key);
        Ok(true)
    }

    /// Applied migrations in application order.
    pub fn applied_migrations(&self) -> Vec<String> {
        self.shared.migrations.lock().clone()
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.shared.name)
            .field("locked_rows", &self.shared.locks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::BookFields;

    fn seeded() -> Database {
        let db = Database::open("test");
        let mut txn = db.begin(IsolationLevel::ReadCommitted);
        txn.insert_user(User {
            username: "ann".to_string(),
            email: "ann@example.com".to_string(),
        })
        .unwrap();
        txn.insert_genre("Fiction").unwrap();
        txn.insert_genre("History").unwrap();
        txn.commit().unwrap();
        db
    }

    fn add_book(db: &Database, title: &str, genre_id: i64) -> i64 {
        let mut txn = db.begin(IsolationLevel::Serializable);
        txn.lock_user_nowait("ann").unwrap();
        let book = txn
            .insert_book(BookFields {
                title: title.to_string(),
                description: None,
                user_username: "ann".to_string(),
                rating: Some(3),
                genre_id,
            })
            .unwrap();
        txn.commit().unwrap();
        book.id
    }

    #[test]
    fn books_filter_uses_genre_index() {
        let db = seeded();
        let first = add_book(&db, "Dune", 1);
        add_book(&db, "SPQR", 2);
        let third = add_book(&db, "Emma", 1);

        let fiction: Vec<i64> = db.books(Some(1)).iter().map(|r| r.book.id).collect();
        assert_eq!(fiction, vec![first, third]);
        assert_eq!(db.books(None).len(), 3);
        assert!(db.books(Some(99)).is_empty());
    }

    #[test]
    fn genre_change_moves_book_between_index_entries() {
        let db = seeded();
        let id = add_book(&db, "Dune", 1);

        let mut txn = db.begin(IsolationLevel::Serializable);
        let current = txn.lock_book_nowait(id).unwrap();
        txn.update_book(
            id,
            BookFields {
                title: current.title,
                description: current.description,
                user_username: current.user_username,
                rating: current.rating,
                genre_id: 2,
            },
        )
        .unwrap();
        txn.commit().unwrap();

        assert!(db.books(Some(1)).is_empty());
        assert_eq!(db.books(Some(2))[0].genre.name, "History");
    }

    #[test]
    fn migrations_run_once() {
        let db = Database::open("test");
        let mut runs = 0;

        let applied = db
            .apply_migration("genres", "001_seed", |_| {
                runs += 1;
                Ok::<_, StoreError>(())
            })
            .unwrap();
        assert!(applied);

        let applied = db
            .apply_migration("genres", "001_seed", |_| {
                runs += 1;
                Ok::<_, StoreError>(())
            })
            .unwrap();
        assert!(!applied);
        assert_eq!(runs, 1);
        assert_eq!(db.applied_migrations(), vec!["genres/001_seed".to_string()]);
    }

    #[test]
    fn failed_migration_is_not_recorded() {
        let db = Database::open("test");
        let result = db.apply_migration("books", "001", |_| {
            Err(StoreError::NoResultFound {
                key: RowKey::Genre(1),
            })
        });
        assert!(result.is_err());
        assert!(db.applied_migrations().is_empty());
    }
}
