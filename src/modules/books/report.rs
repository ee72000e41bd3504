//! Rating reports over books joined with their genre.
//!
//! Aggregation runs in two stages: books are first summarized one row per
//! (genre, book), then the summaries are rolled up per genre or globally.
//! Both report kinds share the same path and differ only in the rollup key.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use stacks_db::{BookRecord, Database, Genre};

/// Rolled-up rating statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportStats {
    pub avg_rating: Option<f64>,
    pub num_ratings: u64,
    pub num_users: u64,
    pub num_books: u64,
    /// `"<title> (<rating>)"` of the best-rated book, lowest id on ties.
    pub highest_rated_book: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenreReport {
    pub genre_name: String,
    #[serde(flatten)]
    pub stats: ReportStats,
}

/// Serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmptyReport {}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Report {
    Genre(GenreReport),
    Global(ReportStats),
    /// The requested genre does not exist.
    Empty(EmptyReport),
}

/// Stage one output: one row per book.
#[derive(Debug)]
struct BookSummary<'a> {
    genre_id: i64,
    book_id: i64,
    title: &'a str,
    users: BTreeSet<&'a str>,
    rating_sum: f64,
    rated: u64,
    /// One per book row, rated or not.
    num_ratings: u64,
    num_books: u64,
}

impl BookSummary<'_> {
    fn avg_rating(&self) -> Option<f64> {
        (self.rated > 0).then(|| self.rating_sum / self.rated as f64)
    }
}

#[derive(Debug, Default)]
struct Rollup<'a> {
    avg_sum: f64,
    rated_books: u64,
    num_ratings: u64,
    num_books: u64,
    users: BTreeSet<&'a str>,
    /// (rating, book id, title)
    best: Option<(f64, i64, &'a str)>,
}

impl<'a> Rollup<'a> {
    fn add(&mut self, summary: &BookSummary<'a>) {
        self.num_ratings += summary.num_ratings;
        self.num_books += summary.num_books;
        self.users.extend(summary.users.iter().copied());

        let Some(avg) = summary.avg_rating() else {
            return;
        };
        self.avg_sum += avg;
        self.rated_books += 1;

        let better = match self.best {
            None => true,
            Some((best, best_id, _)) => avg > best || (avg == best && summary.book_id < best_id),
        };
        if better {
            self.best = Some((avg, summary.book_id, summary.title));
        }
    }

    fn finish(self) -> ReportStats {
        ReportStats {
            avg_rating: (self.rated_books > 0).then(|| self.avg_sum / self.rated_books as f64),
            num_ratings: self.num_ratings,
            num_users: self.users.len() as u64,
            num_books: self.num_books,
            highest_rated_book: self
                .best
                .map(|(rating, _, title)| format!("{title} ({rating:.2})")),
        }
    }
}

fn summarize_books(records: &[BookRecord]) -> Vec<BookSummary<'_>> {
    let mut groups: BTreeMap<(i64, i64), BookSummary<'_>> = BTreeMap::new();
    for record in records {
        let book = &record.book;
        let summary = groups
            .entry((book.genre_id, book.id))
            .or_insert_with(|| BookSummary {
                genre_id: book.genre_id,
                book_id: book.id,
                title: &book.title,
                users: BTreeSet::new(),
                rating_sum: 0.0,
                rated: 0,
                num_ratings: 0,
                num_books: 0,
            });
        summary.users.insert(&book.user_username);
        summary.num_books += 1;
        summary.num_ratings += 1;
        if let Some(rating) = book.rating {
            summary.rating_sum += f64::from(rating);
            summary.rated += 1;
        }
    }
    groups.into_values().collect()
}

fn roll_up<'a, K: Ord>(
    summaries: &[BookSummary<'a>],
    key: impl Fn(&BookSummary<'a>) -> K,
) -> BTreeMap<K, Rollup<'a>> {
    let mut rollups: BTreeMap<K, Rollup<'a>> = BTreeMap::new();
    for summary in summaries {
        rollups.entry(key(summary)).or_default().add(summary);
    }
    rollups
}

/// Aggregate the books of one genre.
pub fn aggregate_genre(genre: &Genre, records: &[BookRecord]) -> GenreReport {
    let summaries = summarize_books(records);
    let stats = roll_up(&summaries, |summary| summary.genre_id)
        .remove(&genre.id)
        .map(Rollup::finish)
        .unwrap_or_default();

    GenreReport {
        genre_name: genre.name.clone(),
        stats,
    }
}

/// Aggregate every book regardless of genre.
pub fn aggregate_global(records: &[BookRecord]) -> ReportStats {
    let summaries = summarize_books(records);
    roll_up(&summaries, |_| ())
        .remove(&())
        .map(Rollup::finish)
        .unwrap_or_default()
}

/// Build a report from committed state without taking row locks.
pub fn build_report(db: &Database, genre_id: Option<i64>) -> Report {
    match genre_id {
        Some(genre_id) => match db.genre(genre_id) {
            Some(genre) => Report::Genre(aggregate_genre(&genre, &db.books(Some(genre_id)))),
            None => Report::Empty(EmptyReport {}),
        },
        None => Report::Global(aggregate_global(&db.books(None))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stacks_db::Book;
    use time::OffsetDateTime;

    fn genre(id: i64, name: &str) -> Genre {
        Genre {
            id,
            name: name.to_string(),
        }
    }

    fn record(id: i64, title: &str, user: &str, rating: Option<i32>, genre: &Genre) -> BookRecord {
        BookRecord {
            book: Book {
                id,
                title: title.to_string(),
                description: None,
                user_username: user.to_string(),
                rating,
                genre_id: genre.id,
                created_at: OffsetDateTime::UNIX_EPOCH,
            },
            genre: genre.clone(),
        }
    }

    #[test]
    fn genre_report_for_two_rated_books() {
        let fiction = genre(1, "Fiction");
        let records = vec![
            record(1, "A", "ann", Some(4), &fiction),
            record(2, "B", "bob", Some(5), &fiction),
        ];

        let report = aggregate_genre(&fiction, &records);
        assert_eq!(report.genre_name, "Fiction");
        assert_eq!(report.stats.num_books, 2);
        assert_eq!(report.stats.num_ratings, 2);
        assert_eq!(report.stats.num_users, 2);
        assert_eq!(report.stats.avg_rating, Some(4.5));
        assert_eq!(report.stats.highest_rated_book.as_deref(), Some("B (5.00)"));
    }

    #[test]
    fn empty_genre_reports_zero_counts() {
        let history = genre(9, "History");
        let report = aggregate_genre(&history, &[]);

        assert_eq!(
            serde_json::to_value(Report::Genre(report)).unwrap(),
            json!({
                "genre_name": "History",
                "avg_rating": null,
                "num_ratings": 0,
                "num_users": 0,
                "num_books": 0,
                "highest_rated_book": null
            })
        );
    }

    #[test]
    fn unrated_books_count_but_do_not_rate() {
        let fiction = genre(1, "Fiction");
        let records = vec![
            record(1, "A", "ann", None, &fiction),
            record(2, "B", "ann", None, &fiction),
        ];

        let stats = aggregate_genre(&fiction, &records).stats;
        assert_eq!(stats.num_books, 2);
        assert_eq!(stats.num_ratings, 2);
        assert_eq!(stats.num_users, 1);
        assert_eq!(stats.avg_rating, None);
        assert_eq!(stats.highest_rated_book, None);
    }

    #[test]
    fn null_rating_is_excluded_from_average() {
        let fiction = genre(1, "Fiction");
        let records = vec![
            record(1, "A", "ann", Some(2), &fiction),
            record(2, "B", "bob", None, &fiction),
            record(3, "C", "cy", Some(4), &fiction),
        ];

        let stats = aggregate_genre(&fiction, &records).stats;
        assert_eq!(stats.avg_rating, Some(3.0));
        assert_eq!(stats.num_ratings, 3);
        assert_eq!(stats.num_books, 3);
        assert_eq!(stats.num_users, 3);
    }

    #[test]
    fn every_book_counts_as_one_rating() {
        let fiction = genre(1, "Fiction");
        let records = vec![
            record(1, "T1", "ann", Some(4), &fiction),
            record(2, "T2", "bob", None, &fiction),
        ];

        let stats = aggregate_genre(&fiction, &records).stats;
        assert_eq!(stats.num_ratings, stats.num_books);
        assert_eq!(stats.num_ratings, 2);
        assert_eq!(stats.avg_rating, Some(4.0));
        assert_eq!(stats.highest_rated_book.as_deref(), Some("T1 (4.00)"));
    }

    #[test]
    fn ties_go_to_the_lowest_id() {
        let fiction = genre(1, "Fiction");
        let history = genre(2, "History");
        let records = vec![
            record(2, "Second", "ann", Some(5), &fiction),
            record(7, "Seventh", "ann", Some(5), &fiction),
            record(1, "First", "bob", Some(5), &history),
        ];

        let stats = aggregate_global(&records);
        assert_eq!(stats.highest_rated_book.as_deref(), Some("First (5.00)"));

        let fiction_stats = aggregate_genre(&fiction, &records[..2]).stats;
        assert_eq!(
            fiction_stats.highest_rated_book.as_deref(),
            Some("Second (5.00)")
        );
    }

    #[test]
    fn books_sharing_a_title_stay_distinct() {
        let fiction = genre(1, "Fiction");
        let records = vec![
            record(1, "Twin", "ann", Some(2), &fiction),
            record(2, "Twin", "bob", Some(4), &fiction),
        ];

        let stats = aggregate_genre(&fiction, &records).stats;
        assert_eq!(stats.num_books, 2);
        assert_eq!(stats.avg_rating, Some(3.0));
        assert_eq!(stats.highest_rated_book.as_deref(), Some("Twin (4.00)"));
    }

    #[test]
    fn global_report_spans_genres_and_omits_genre_name() {
        let fiction = genre(1, "Fiction");
        let history = genre(2, "History");
        let records = vec![
            record(1, "A", "ann", Some(3), &fiction),
            record(2, "B", "ann", Some(4), &history),
        ];

        let value = serde_json::to_value(Report::Global(aggregate_global(&records))).unwrap();
        assert!(value.get("genre_name").is_none());
        assert_eq!(value["num_books"], 2);
        assert_eq!(value["num_users"], 1);
        assert_eq!(value["avg_rating"], 3.5);
        assert_eq!(value["highest_rated_book"], "B (4.00)");
    }

    #[test]
    fn unknown_genre_serializes_as_empty_object() {
        let db = Database::open("test");
        let report = build_report(&db, Some(3));
        assert_eq!(serde_json::to_value(report).unwrap(), json!({}));
    }
}
