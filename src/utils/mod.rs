//! Project-specific utilities live here.

use axum::{extract::rejection::JsonRejection, Json};
use serde::Serialize;
use serde_json::json;
use stacks_http::error::AppError;

/// Formats a shared log prefix for project logs.
pub fn log_prefix(module: &str) -> String {
    format!("project::{module}")
}

/// Message returned to clients that lost a row lock race.
pub const LOCK_UNAVAILABLE_MESSAGE: &str = "Unable to obtain lock, please try again later";

/// Body returned by successful mutations.
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            id: None,
        }
    }

    pub fn with_id(message: impl Into<String>, id: i64) -> Self {
        Self {
            message: message.into(),
            id: Some(id),
        }
    }
}

/// Unwraps a JSON body, turning extractor rejections into validation errors.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(AppError::validation(
            vec![json!({ "error": rejection.body_text() })],
            "Invalid request body",
        )),
    }
}

/// Rejects blank string fields.
pub fn require_non_blank(field: &'static str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(
            vec![json!({ "field": field, "error": "required" })],
            format!("{field} must not be empty"),
        ));
    }
    Ok(())
}
