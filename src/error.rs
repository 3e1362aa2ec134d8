use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

use crate::models::attempt::AttemptStatus;
use crate::services::eligibility::IneligibleReason;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] validator::ValidationErrors),

    #[error("Attempt has already been submitted")]
    AlreadySubmitted,

    #[error("Time limit for this attempt has expired")]
    TimeExpired,

    #[error("Not eligible to start an attempt: {0}")]
    NotEligible(IneligibleReason),

    #[error("Question cannot be graded automatically")]
    NotAutoGradable,

    #[error("Cannot {action} an attempt in status '{status}'")]
    InvalidTransition {
        status: AttemptStatus,
        action: &'static str,
    },

    #[error("Inconsistent state: {0}")]
    InconsistentState(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            Error::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, json!({ "error": msg })),
            Error::InvalidPayload(err) => {
                (StatusCode::BAD_REQUEST, json!({ "error": err.to_string() }))
            }
            Error::AlreadySubmitted => (
                StatusCode::CONFLICT,
                json!({ "error": "already_submitted" }),
            ),
            Error::TimeExpired => (StatusCode::CONFLICT, json!({ "error": "time_expired" })),
            Error::NotEligible(reason) => (
                StatusCode::FORBIDDEN,
                json!({ "error": "not_eligible", "reason": reason }),
            ),
            Error::NotAutoGradable => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": "not_auto_gradable" }),
            ),
            err @ Error::InvalidTransition { .. } => {
                (StatusCode::CONFLICT, json!({ "error": err.to_string() }))
            }
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            Error::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            Error::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            Error::Json(err) => (StatusCode::BAD_REQUEST, json!({ "error": err.to_string() })),
            Error::Database(err) => {
                tracing::error!(error = ?err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "An unexpected error occurred" }),
                )
            }
            other => {
                tracing::error!(error = %other, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "An unexpected error occurred" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            other => Error::Database(other),
        }
    }
}
