//! Row types for the user, genre, and book tables.

use std::fmt;

use serde::Serialize;
use time::OffsetDateTime;

/// Tables known to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    User,
    Genre,
    Book,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::User => "user",
            Table::Genre => "genre",
            Table::Book => "book",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primary key of a single row, used for locking and read-set tracking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RowKey {
    User(String),
    Genre(i64),
    Book(i64),
}

impl RowKey {
    /// Table the row lives in.
    pub fn table(&self) -> Table {
        match self {
            RowKey::User(_) => Table::User,
            RowKey::Genre(_) => Table::Genre,
            RowKey::Book(_) => Table::Book,
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::User(username) => write!(f, "user[{username}]"),
            RowKey::Genre(id) => write!(f, "genre[{id}]"),
            RowKey::Book(id) => write!(f, "book[{id}]"),
        }
    }
}

/// A registered user. Usernames and emails are both unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub username: String,
    pub email: String,
}

/// A book genre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

/// A stored book row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub user_username: String,
    pub rating: Option<i32>,
    pub genre_id: i64,
    /// Set once when the row is inserted.
    pub created_at: OffsetDateTime,
}

/// Caller-supplied columns of a book, used for both insert and update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookFields {
    pub title: String,
    pub description: Option<String>,
    pub user_username: String,
    pub rating: Option<i32>,
    pub genre_id: i64,
}

impl Book {
    pub(crate) fn from_fields(id: i64, fields: BookFields, created_at: OffsetDateTime) -> Self {
        Self {
            id,
            title: fields.title,
            description: fields.description,
            user_username: fields.user_username,
            rating: fields.rating,
            genre_id: fields.genre_id,
            created_at,
        }
    }
}

/// A book joined with its genre.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookRecord {
    pub book: Book,
    pub genre: Genre,
}

/// A row together with the commit sequence number that last wrote it.
#[derive(Debug, Clone)]
pub(crate) struct Versioned<T> {
    pub row: T,
    pub version: u64,
}
