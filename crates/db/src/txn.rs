//! Transactions over the record store.
//!
//! Writes are buffered in the transaction and applied atomically on
//! commit under the exclusive table latch. Book writes require the row
//! lock, which is only ever taken with no-wait semantics through
//! [`Transaction::lock_book_nowait`] or [`Transaction::lock_user_nowait`].
//!
//! Serializable transactions record the version of every row they read
//! (including rows they found absent) and refuse to commit if any of
//! those rows changed in the meantime.

use std::collections::BTreeMap;
use std::fmt;

use time::OffsetDateTime;

use crate::error::{StoreError, StoreResult};
use crate::lock::Acquired;
use crate::schema::{Book, BookFields, Genre, RowKey, Table, User};
use crate::store::{Database, Tables};

/// Unique transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnId(pub u64);

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Transaction isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Reads see committed data; no commit-time validation.
    ReadCommitted,
    /// Commit fails if any row read by the transaction has since changed.
    #[default]
    Serializable,
}

/// Transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Active,
    Committed,
    RolledBack,
}

/// A buffered write.
#[derive(Debug, Clone)]
pub(crate) enum Write {
    InsertUser(User),
    InsertGenre(Genre),
    PutBook(Book),
    DeleteBook(i64),
}

/// A transaction handle. Dropping an active transaction rolls it back.
pub struct Transaction {
    db: Database,
    id: TxnId,
    isolation: IsolationLevel,
    state: TxnState,
    /// First version observed per row; `None` means the row was absent.
    read_set: BTreeMap<RowKey, Option<u64>>,
    held: Vec<RowKey>,
    writes: Vec<Write>,
}

impl Transaction {
    pub(crate) fn new(db: Database, id: TxnId, isolation: IsolationLevel) -> Self {
        Self {
            db,
            id,
            isolation,
            state: TxnState::Active,
            read_set: BTreeMap::new(),
            held: Vec::new(),
            writes: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> TxnId {
        self.id
    }

    #[inline]
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    #[inline]
    pub fn state(&self) -> TxnState {
        self.state
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.state == TxnState::Active
    }

    /// Rows currently locked by this transaction.
    pub fn held_locks(&self) -> &[RowKey] {
        &self.held
    }

    /// Number of buffered writes.
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// Locks the user row without waiting and returns it.
    ///
    /// Fails with [`StoreError::NoResultFound`] if the user does not exist
    /// and [`StoreError::LockUnavailable`] if another transaction holds it.
    pub fn lock_user_nowait(&mut self, username: &str) -> StoreResult<User> {
        self.ensure_active()?;
        let key = RowKey::User(username.to_string());
        if let Some(user) = self.pending_user(username) {
            return Ok(user.clone());
        }

        let db = self.db.clone();
        let tables = db.shared.tables.read();
        let Some(entry) = tables.users.get(username) else {
            self.observe(key.clone(), None);
            return Err(StoreError::NoResultFound { key });
        };
        self.acquire(&key)?;
        self.observe(key, Some(entry.version));
        Ok(entry.row.clone())
    }

    /// Locks the book row without waiting and returns it.
    pub fn lock_book_nowait(&mut self, id: i64) -> StoreResult<Book> {
        self.ensure_active()?;
        let key = RowKey::Book(id);
        match self.pending_book(id) {
            Some(Some(book)) => return Ok(book.clone()),
            Some(None) => return Err(StoreError::NoResultFound { key }),
            None => {}
        }

        let db = self.db.clone();
        let tables = db.shared.tables.read();
        let Some(entry) = tables.books.get(&id) else {
            self.observe(key.clone(), None);
            return Err(StoreError::NoResultFound { key });
        };
        self.acquire(&key)?;
        self.observe(key, Some(entry.version));
        Ok(entry.row.clone())
    }

    /// Buffers a new book. The referenced user must already be locked by
    /// this transaction; the new row is locked as well.
    pub fn insert_book(&mut self, fields: BookFields) -> StoreResult<Book> {
        self.ensure_active()?;
        self.require_lock(&RowKey::User(fields.user_username.clone()))?;

        let db = self.db.clone();
        {
            let tables = db.shared.tables.read();
            self.check_references(&tables, &fields)?;
        }

        let id = db.shared.next_book_id();
        let book = Book::from_fields(id, fields, OffsetDateTime::now_utc());
        self.acquire(&RowKey::Book(id))?;
        self.writes.push(Write::PutBook(book.clone()));
        Ok(book)
    }

    /// Buffers a replacement of every caller-supplied column of a locked
    /// book. `created_at` is carried over from the current row.
    pub fn update_book(&mut self, id: i64, fields: BookFields) -> StoreResult<Book> {
        self.ensure_active()?;
        let key = RowKey::Book(id);
        self.require_lock(&key)?;

        let db = self.db.clone();
        let created_at = {
            let tables = db.shared.tables.read();
            let created_at = match self.pending_book(id) {
                Some(Some(book)) => book.created_at,
                Some(None) => return Err(StoreError::NoResultFound { key }),
                None => tables
                    .books
                    .get(&id)
                    .map(|entry| entry.row.created_at)
                    .ok_or(StoreError::NoResultFound { key })?,
            };
            self.check_references(&tables, &fields)?;
            created_at
        };

        let book = Book::from_fields(id, fields, created_at);
        self.writes.push(Write::PutBook(book.clone()));
        Ok(book)
    }

    /// Buffers removal of a locked book.
    pub fn delete_book(&mut self, id: i64) -> StoreResult<()> {
        self.ensure_active()?;
        let key = RowKey::Book(id);
        self.require_lock(&key)?;

        let exists = match self.pending_book(id) {
            Some(pending) => pending.is_some(),
            None => self.db.shared.tables.read().books.contains_key(&id),
        };
        if !exists {
            return Err(StoreError::NoResultFound { key });
        }

        self.writes.push(Write::DeleteBook(id));
        Ok(())
    }

    /// Buffers a new user. Username and email must be unique.
    pub fn insert_user(&mut self, user: User) -> StoreResult<()> {
        self.ensure_active()?;
        let key = RowKey::User(user.username.clone());

        {
            let db = self.db.clone();
            let tables = db.shared.tables.read();
            tables.check_unique_user(&user)?;
        }
        if self.pending_user(&user.username).is_some() {
            return Err(StoreError::UniqueViolation {
                table: Table::User,
                column: "username",
                value: user.username,
            });
        }
        if self.pending_users().any(|pending| pending.email == user.email) {
            return Err(StoreError::UniqueViolation {
                table: Table::User,
                column: "email",
                value: user.email,
            });
        }

        self.observe(key.clone(), None);
        self.acquire(&key)?;
        self.writes.push(Write::InsertUser(user));
        Ok(())
    }

    /// Buffers a new genre and returns it with its assigned id.
    pub fn insert_genre(&mut self, name: impl Into<String>) -> StoreResult<Genre> {
        self.ensure_active()?;
        let genre = Genre {
            id: self.db.shared.next_genre_id(),
            name: name.into(),
        };
        self.writes.push(Write::InsertGenre(genre.clone()));
        Ok(genre)
    }

    /// Validates and applies the buffered writes, then releases all locks.
    ///
    /// Returns the commit sequence number stamped on the written rows. On
    /// validation failure nothing is applied and the transaction is rolled
    /// back.
    pub fn commit(mut self) -> StoreResult<u64> {
        self.ensure_active()?;
        let db = self.db.clone();
        let mut tables = db.shared.tables.write();

        if let Err(err) = self.validate(&tables) {
            self.abort();
            tracing::debug!(txn = %self.id, error = %err, "commit rejected");
            return Err(err);
        }

        let version = tables.next_commit_seq();
        let writes = std::mem::take(&mut self.writes);
        let write_count = writes.len();
        for write in writes {
            tables.apply(write, version);
        }
        // Released under the latch so no reader sees the new rows unlocked
        // before they are visible.
        self.release();
        self.state = TxnState::Committed;
        drop(tables);

        tracing::debug!(txn = %self.id, version, write_count, "transaction committed");
        Ok(version)
    }

    /// Discards buffered writes and releases all locks.
    pub fn rollback(mut self) {
        if self.is_active() {
            tracing::debug!(txn = %self.id, "transaction rolled back");
            self.abort();
        }
    }

    fn validate(&self, tables: &Tables) -> StoreResult<()> {
        if self.isolation == IsolationLevel::Serializable {
            for (key, seen) in &self.read_set {
                if tables.version(key) != *seen {
                    return Err(StoreError::SerializationFailure { key: key.clone() });
                }
            }
        }

        for user in self.pending_users() {
            tables.check_unique_user(user)?;
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.writes.clear();
        self.release();
        self.state = TxnState::RolledBack;
    }

    fn release(&mut self) {
        let held = std::mem::take(&mut self.held);
        self.db.shared.locks.release_all(self.id, &held);
    }

    fn ensure_active(&self) -> StoreResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(StoreError::TransactionClosed(self.id))
        }
    }

    fn acquire(&mut self, key: &RowKey) -> StoreResult<()> {
        if self.db.shared.locks.try_acquire(self.id, key)? == Acquired::Granted {
            self.held.push(key.clone());
        }
        Ok(())
    }

    fn require_lock(&self, key: &RowKey) -> StoreResult<()> {
        if self.db.shared.locks.holds(self.id, key) {
            Ok(())
        } else {
            Err(StoreError::LockNotHeld {
                txn: self.id,
                key: key.clone(),
            })
        }
    }

    fn observe(&mut self, key: RowKey, version: Option<u64>) {
        self.read_set.entry(key).or_insert(version);
    }

    fn check_references(&mut self, tables: &Tables, fields: &BookFields) -> StoreResult<()> {
        let user = RowKey::User(fields.user_username.clone());
        if self.pending_user(&fields.user_username).is_none() {
            let version = tables.version(&user);
            self.observe(user.clone(), version);
            if version.is_none() {
                return Err(StoreError::ForeignKeyViolation {
                    table: Table::Book,
                    key: user,
                });
            }
        }

        let genre = RowKey::Genre(fields.genre_id);
        if self.pending_genre(fields.genre_id).is_none() {
            let version = tables.version(&genre);
            self.observe(genre.clone(), version);
            if version.is_none() {
                return Err(StoreError::ForeignKeyViolation {
                    table: Table::Book,
                    key: genre,
                });
            }
        }
        Ok(())
    }

    /// Latest buffered state of a book: `Some(None)` if deleted here.
    fn pending_book(&self, id: i64) -> Option<Option<&Book>> {
        self.writes.iter().rev().find_map(|write| match write {
            Write::PutBook(book) if book.id == id => Some(Some(book)),
            Write::DeleteBook(deleted) if *deleted == id => Some(None),
            _ => None,
        })
    }

    fn pending_users(&self) -> impl Iterator<Item = &User> {
        self.writes.iter().filter_map(|write| match write {
            Write::InsertUser(user) => Some(user),
            _ => None,
        })
    }

    fn pending_user(&self, username: &str) -> Option<&User> {
        self.pending_users().find(|user| user.username == username)
    }

    fn pending_genre(&self, id: i64) -> Option<&Genre> {
        self.writes.iter().find_map(|write| match write {
            Write::InsertGenre(genre) if genre.id == id => Some(genre),
            _ => None,
        })
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.is_active() {
            tracing::debug!(txn = %self.id, "rolling back dropped transaction");
            self.abort();
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("isolation", &self.isolation)
            .field("state", &self.state)
            .field("held", &self.held)
            .field("writes", &self.writes.len())
            .finish()
    }
}
