use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use stacks_db::{Database, Genre, IsolationLevel};
use stacks_http::error::AppError;
use stacks_kernel::{InitCtx, Migration, Module};

use crate::utils::{self, json_body, require_non_blank, MessageResponse};

/// Genres seeded on first boot, in id order.
pub const GENRE_CATALOG: &[&str] = &[
    "Fiction",
    "Non-Fiction",
    "Mystery",
    "Fantasy",
    "Science Fiction",
    "Romance",
    "Thriller",
    "Biography",
    "History",
];

pub struct GenresModule {
    db: Database,
    seed: bool,
}

impl GenresModule {
    pub fn new(db: Database, seed: bool) -> Self {
        Self { db, seed }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateGenre {
    pub name: String,
}

/// Insert the catalog unless genres already exist.
fn seed_genres(db: &Database) -> anyhow::Result<()> {
    if !db.genres().is_empty() {
        tracing::debug!("genre table already populated; skipping seed");
        return Ok(());
    }

    let mut txn = db.begin(IsolationLevel::ReadCommitted);
    for name in GENRE_CATALOG {
        txn.insert_genre(*name)?;
    }
    txn.commit()?;
    tracing::info!(count = GENRE_CATALOG.len(), "genre catalog seeded");
    Ok(())
}

#[async_trait]
impl Module for GenresModule {
    fn name(&self) -> &'static str {
        "genres"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            target: "project.genres",
            prefix = %utils::log_prefix(self.name()),
            seed = self.seed,
            database = ctx.db.name(),
            "genres module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/", get(list_genres).post(create_genre))
            .with_state(self.db.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "List genres",
                        "tags": ["Genres"],
                        "responses": {
                            "200": {
                                "description": "Genres in id order",
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "array",
                                            "items": { "$ref": "#/components/schemas/Genre" }
                                        }
                                    }
                                }
                            }
                        }
                    },
                    "post": {
                        "summary": "Create a genre",
                        "tags": ["Genres"],
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "object",
                                        "properties": { "name": { "type": "string" } },
                                        "required": ["name"]
                                    }
                                }
                            }
                        },
                        "responses": {
                            "201": {
                                "description": "Genre created",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/MessageResponse" }
                                    }
                                }
                            },
                            "422": {
                                "description": "Invalid request body",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                                    }
                                }
                            }
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Genre": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "integer", "format": "int64" },
                            "name": { "type": "string" }
                        },
                        "required": ["id", "name"]
                    }
                }
            }
        }))
    }

    fn migrations(&self) -> Vec<Migration> {
        if !self.seed {
            return vec![];
        }
        vec![Migration {
            id: "001_seed_genres",
            up: seed_genres,
        }]
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "genres module stopped");
        Ok(())
    }
}

async fn list_genres(State(db): State<Database>) -> Json<Vec<Genre>> {
    Json(db.genres())
}

async fn create_genre(
    State(db): State<Database>,
    payload: Result<Json<CreateGenre>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    let CreateGenre { name } = json_body(payload)?;
    require_non_blank("name", &name)?;

    let mut txn = db.begin(IsolationLevel::ReadCommitted);
    let genre = txn
        .insert_genre(name)
        .map_err(|err| anyhow::Error::new(err).context("genre insert failed"))?;
    txn.commit()
        .map_err(|err| anyhow::Error::new(err).context("genre insert failed"))?;

    tracing::info!(genre_id = genre.id, name = %genre.name, "genre created");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::with_id("Genre created successfully", genre.id)),
    ))
}

/// Create a new instance of the genres module
pub fn create_module(db: Database, seed: bool) -> Arc<dyn Module> {
    Arc::new(GenresModule::new(db, seed))
}
