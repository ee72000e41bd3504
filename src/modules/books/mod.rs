pub mod conflict;
pub mod models;
pub mod report;
pub mod routes;
pub mod service;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use serde_json::json;
use stacks_db::Database;
use stacks_kernel::{InitCtx, Module};

use crate::utils;

/// Book records, lock-guarded mutations and rating reports
pub struct BooksModule {
    state: routes::BooksState,
}

impl BooksModule {
    pub fn new(db: Database) -> Self {
        Self {
            state: routes::BooksState::new(db),
        }
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            target: "project.books",
            prefix = %utils::log_prefix(self.name()),
            environment = ?ctx.settings.environment,
            books = ctx.db.books(None).len(),
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(self.state.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        let error = |description: &str| {
            json!({
                "description": description,
                "content": {
                    "application/json": {
                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                    }
                }
            })
        };
        let message = |description: &str| {
            json!({
                "description": description,
                "content": {
                    "application/json": {
                        "schema": { "$ref": "#/components/schemas/MessageResponse" }
                    }
                }
            })
        };
        let id_param = json!({
            "name": "id",
            "in": "path",
            "required": true,
            "schema": { "type": "integer", "format": "int64" }
        });
        let genre_param = json!({
            "name": "genre_id",
            "in": "query",
            "required": false,
            "schema": { "type": "integer", "format": "int64" }
        });
        let payload = json!({
            "required": true,
            "content": {
                "application/json": {
                    "schema": { "$ref": "#/components/schemas/BookPayload" }
                }
            }
        });

        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "List books",
                        "tags": ["Books"],
                        "parameters": [genre_param.clone()],
                        "responses": {
                            "200": {
                                "description": "Books in id order",
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "array",
                                            "items": { "$ref": "#/components/schemas/Book" }
                                        }
                                    }
                                }
                            }
                        }
                    },
                    "post": {
                        "summary": "Create a book",
                        "description": "Locks the owning user row without waiting.",
                        "tags": ["Books"],
                        "requestBody": payload.clone(),
                        "responses": {
                            "201": message("Book created"),
                            "404": error("User or genre not found"),
                            "409": error("User row is locked"),
                            "422": error("Invalid request body")
                        }
                    }
                },
                "/{id}": {
                    "get": {
                        "summary": "Get a book",
                        "tags": ["Books"],
                        "parameters": [id_param.clone()],
                        "responses": {
                            "200": {
                                "description": "Book",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/Book" }
                                    }
                                }
                            },
                            "404": error("Book not found")
                        }
                    },
                    "put": {
                        "summary": "Replace a book",
                        "description": "Locks the book row without waiting.",
                        "tags": ["Books"],
                        "parameters": [id_param.clone()],
                        "requestBody": payload,
                        "responses": {
                            "200": message("Book updated"),
                            "404": error("Book, user or genre not found"),
                            "409": error("Book row is locked"),
                            "422": error("Invalid request body")
                        }
                    },
                    "delete": {
                        "summary": "Delete a book",
                        "tags": ["Books"],
                        "parameters": [id_param],
                        "responses": {
                            "200": message("Book deleted"),
                            "404": error("Book not found"),
                            "409": error("Book row is locked")
                        }
                    }
                },
                "/report": {
                    "get": {
                        "summary": "Rating report",
                        "description": "Per-genre when genre_id is given, global otherwise. Unknown genres yield {}.",
                        "tags": ["Books"],
                        "parameters": [genre_param],
                        "responses": {
                            "200": {
                                "description": "Report",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/BookReport" }
                                    }
                                }
                            }
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Book": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "integer", "format": "int64" },
                            "title": { "type": "string" },
                            "description": { "type": "string", "nullable": true },
                            "user_username": { "type": "string" },
                            "rating": { "type": "integer", "nullable": true },
                            "genre": { "$ref": "#/components/schemas/Genre" },
                            "created_at": {
                                "type": "string",
                                "description": "UTC, formatted YYYY-MM-DD HH:MM:SS"
                            }
                        },
                        "required": ["id", "title", "user_username", "genre", "created_at"]
                    },
                    "BookPayload": {
                        "type": "object",
                        "properties": {
                            "title": { "type": "string" },
                            "description": { "type": "string", "nullable": true },
                            "user_username": { "type": "string" },
                            "rating": { "type": "integer", "nullable": true },
                            "genre_id": { "type": "integer", "format": "int64" }
                        },
                        "required": ["title", "user_username", "genre_id"]
                    },
                    "BookReport": {
                        "type": "object",
                        "properties": {
                            "genre_name": { "type": "string" },
                            "avg_rating": { "type": "number", "nullable": true },
                            "num_ratings": { "type": "integer" },
                            "num_users": { "type": "integer" },
                            "num_books": { "type": "integer" },
                            "highest_rated_book": { "type": "string", "nullable": true }
                        }
                    }
                }
            }
        }))
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            locked_rows = self.state.db.locked_rows(),
            "books module stopped"
        );
        Ok(())
    }
}

/// Create a new instance of the books module
pub fn create_module(db: Database) -> Arc<dyn Module> {
    Arc::new(BooksModule::new(db))
}
