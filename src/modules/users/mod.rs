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
use stacks_db::{Database, IsolationLevel, StoreError, User};
use stacks_http::error::AppError;
use stacks_kernel::{InitCtx, Module};

use crate::utils::{
    self, json_body, require_non_blank, MessageResponse, LOCK_UNAVAILABLE_MESSAGE,
};

/// Book owners. Users are append-only.
pub struct UsersModule {
    db: Database,
}

impl UsersModule {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub username: String,
    pub email: String,
}

#[async_trait]
impl Module for UsersModule {
    fn name(&self) -> &'static str {
        "users"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            target: "project.users",
            prefix = %utils::log_prefix(self.name()),
            environment = ?ctx.settings.environment,
            "users module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/", get(list_users).post(create_user))
            .with_state(self.db.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "List users",
                        "tags": ["Users"],
                        "responses": {
                            "200": {
                                "description": "Users ordered by username",
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "array",
                                            "items": { "$ref": "#/components/schemas/User" }
                                        }
                                    }
                                }
                            }
                        }
                    },
                    "post": {
                        "summary": "Create a user",
                        "tags": ["Users"],
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/User" }
                                }
                            }
                        },
                        "responses": {
                            "201": {
                                "description": "User created",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/MessageResponse" }
                                    }
                                }
                            },
                            "409": {
                                "description": "Username or email already taken",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
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
                    "User": {
                        "type": "object",
                        "properties": {
                            "username": {
                                "type": "string",
                                "description": "Unique username, also the primary key"
                            },
                            "email": {
                                "type": "string",
                                "format": "email",
                                "description": "Unique email address"
                            }
                        },
                        "required": ["username", "email"]
                    }
                }
            }
        }))
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), users = self.db.users().len(), "users module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "users module stopped");
        Ok(())
    }
}

async fn list_users(State(db): State<Database>) -> Json<Vec<User>> {
    Json(db.users())
}

async fn create_user(
    State(db): State<Database>,
    payload: Result<Json<CreateUser>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    let CreateUser { username, email } = json_body(payload)?;
    require_non_blank("username", &username)?;
    require_non_blank("email", &email)?;

    let mut txn = db.begin(IsolationLevel::Serializable);
    txn.insert_user(User {
        username: username.clone(),
        email,
    })
    .map_err(user_error)?;
    txn.commit().map_err(user_error)?;

    tracing::info!(%username, "user created");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User created successfully")),
    ))
}

fn user_error(err: StoreError) -> AppError {
    match err {
        StoreError::UniqueViolation { column, .. } => {
            tracing::debug!(column, "duplicate user rejected");
            AppError::conflict_with_code("user_exists", "User already exists")
        }
        StoreError::LockUnavailable { .. } | StoreError::SerializationFailure { .. } => {
            AppError::conflict_with_code("lock_unavailable", LOCK_UNAVAILABLE_MESSAGE)
        }
        other => AppError::Internal(anyhow::Error::new(other).context("user insert failed")),
    }
}

/// Create a new instance of the users module
pub fn create_module(db: Database) -> Arc<dyn Module> {
    Arc::new(UsersModule::new(db))
}
