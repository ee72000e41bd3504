//! HTTP handlers for the books module.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use stacks_db::Database;
use stacks_http::error::AppError;

use super::models::{BookPayload, BookView, GenreQuery};
use super::report::{build_report, Report};
use super::service::MutationService;
use crate::utils::{json_body, MessageResponse};

#[derive(Clone)]
pub struct BooksState {
    pub db: Database,
    pub service: MutationService,
}

impl BooksState {
    pub fn new(db: Database) -> Self {
        Self {
            service: MutationService::new(db.clone()),
            db,
        }
    }
}

pub fn router(state: BooksState) -> Router {
    Router::new()
        .route("/", get(list_books).post(create_book))
        .route("/report", get(report))
        .route(
            "/{id}",
            get(get_book).put(update_book).delete(delete_book),
        )
        .with_state(state)
}

fn book_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, AppError> {
    path.map(|Path(id)| id)
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}

async fn list_books(
    State(state): State<BooksState>,
    query: Result<Query<GenreQuery>, QueryRejection>,
) -> Result<Json<Vec<BookView>>, AppError> {
    let Query(query) = query.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    let books = state
        .db
        .books(query.genre_id)
        .into_iter()
        .map(BookView::from)
        .collect();
    Ok(Json(books))
}

async fn get_book(
    State(state): State<BooksState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<BookView>, AppError> {
    let id = book_id(path)?;
    state
        .db
        .book(id)
        .map(|record| Json(record.into()))
        .ok_or_else(|| AppError::not_found("Book not found"))
}

async fn create_book(
    State(state): State<BooksState>,
    payload: Result<Json<BookPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    let payload = json_body(payload)?;
    payload.validate()?;

    let book = state.service.create_book(payload.into())?;
    tracing::info!(book_id = book.id, user = %book.user_username, "book created");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::with_id("Book created successfully", book.id)),
    ))
}

async fn update_book(
    State(state): State<BooksState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<BookPayload>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = book_id(path)?;
    let payload = json_body(payload)?;
    payload.validate()?;

    state.service.update_book(id, payload.into())?;
    tracing::info!(book_id = id, "book updated");
    Ok(Json(MessageResponse::new("Book updated successfully")))
}

async fn delete_book(
    State(state): State<BooksState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = book_id(path)?;
    state.service.delete_book(id)?;
    tracing::info!(book_id = id, "book deleted");
    Ok(Json(MessageResponse::new("Book deleted successfully")))
}

async fn report(
    State(state): State<BooksState>,
    query: Result<Query<GenreQuery>, QueryRejection>,
) -> Result<Json<Report>, AppError> {
    let Query(query) = query.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    Ok(Json(build_report(&state.db, query.genre_id)))
}
