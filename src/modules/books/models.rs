use serde::{de, Deserialize, Deserializer, Serialize};
use stacks_db::{BookFields, BookRecord, Genre};
use stacks_http::error::AppError;
use time::{macros::format_description, OffsetDateTime};

use crate::utils::require_non_blank;

/// Request body for creating or replacing a book.
///
/// An update replaces every column, so both operations share one shape.
#[derive(Debug, Clone, Deserialize)]
pub struct BookPayload {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub user_username: String,
    #[serde(default)]
    pub rating: Option<i32>,
    pub genre_id: i64,
}

impl BookPayload {
    pub fn validate(&self) -> Result<(), AppError> {
        require_non_blank("title", &self.title)?;
        require_non_blank("user_username", &self.user_username)
    }
}

impl From<BookPayload> for BookFields {
    fn from(payload: BookPayload) -> Self {
        BookFields {
            title: payload.title,
            description: payload.description,
            user_username: payload.user_username,
            rating: payload.rating,
            genre_id: payload.genre_id,
        }
    }
}

/// Genre embedded in a book view.
#[derive(Debug, Clone, Serialize)]
pub struct GenreRef {
    pub id: i64,
    pub name: String,
}

impl From<Genre> for GenreRef {
    fn from(genre: Genre) -> Self {
        GenreRef {
            id: genre.id,
            name: genre.name,
        }
    }
}

/// A book as returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct BookView {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub user_username: String,
    pub rating: Option<i32>,
    pub genre: GenreRef,
    /// `YYYY-MM-DD HH:MM:SS`, UTC.
    pub created_at: String,
}

impl From<BookRecord> for BookView {
    fn from(record: BookRecord) -> Self {
        let BookRecord { book, genre } = record;
        BookView {
            id: book.id,
            title: book.title,
            description: book.description,
            user_username: book.user_username,
            rating: book.rating,
            genre: genre.into(),
            created_at: format_timestamp(book.created_at),
        }
    }
}

fn format_timestamp(at: OffsetDateTime) -> String {
    at.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ))
    .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

#[derive(Debug, Default, Deserialize)]
pub struct GenreQuery {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub genre_id: Option<i64>,
}

/// `?genre_id=` with no value means no filter.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(de::Error::custom),
    }
}
