// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ocstore_kernel::KernelError;
use ocstore_persistence::PersistenceError;
use serde_json::json;
use thiserror::Error;

use crate::content::ContentError;
use crate::directory::DirectoryError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Content store error: {0}")]
    Content(#[from] ContentError),
    #[error("Name service error: {0}")]
    Directory(#[from] DirectoryError),
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),
    #[error("Maximum number of artifacts with the same timestamp exceeded")]
    AllocationExhausted,
    #[error("Initialization failed: {0}")]
    Initialization(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Service unavailable")]
    Unavailable,
    #[error("Resource not found")]
    NotFound,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            EngineError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            EngineError::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable".to_string()),
            EngineError::NotFound => (StatusCode::NOT_FOUND, "Resource not found".to_string()),
            other => {
                tracing::error!("Request failed: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
