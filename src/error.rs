use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::repository::RepositoryError;
use crate::services::{catalog::CatalogError, redemption::RedemptionError};

/// Caller-facing outcome kinds shared by the engine and the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Inactive,
    Expired,
    Exhausted,
    StoreMismatch,
    InvalidInput,
    Conflict,
}

impl ErrorKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Inactive
            | ErrorKind::Expired
            | ErrorKind::Exhausted
            | ErrorKind::StoreMismatch => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Storage(#[from] RepositoryError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl AppError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            AppError::Validation(_) => Some(ErrorKind::InvalidInput),
            AppError::NotFound(_) => Some(ErrorKind::NotFound),
            AppError::Conflict(_) => Some(ErrorKind::Conflict),
            AppError::Storage(_) => None,
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::InvalidInput(msg) => AppError::Validation(msg),
            CatalogError::NotFound(what) => AppError::NotFound(format!("{} not found", what)),
            CatalogError::Conflict(msg) => AppError::Conflict(msg),
            CatalogError::Repository(e) => AppError::Storage(e),
        }
    }
}

impl From<RedemptionError> for AppError {
    fn from(err: RedemptionError) -> Self {
        match err {
            RedemptionError::Repository(e) => AppError::Storage(e),
        }
    }
}

/// Malformed or mistyped request bodies are caller input errors
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();

        let (status, message) = match &self {
            AppError::Storage(e) => {
                tracing::error!(error = %e, "Storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage error".to_string(),
                )
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
        };

        let body = Json(json!({
            "kind": kind,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
