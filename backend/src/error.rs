//! Error handling for the clinic inventory server
//!
//! Every error leaves the server as `{ "error": { code, message, field? } }`

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::reservation::ReservationError;
use thiserror::Error;

/// SQLSTATE serialization_failure
const SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE deadlock_detected
const DEADLOCK_DETECTED: &str = "40P01";
/// SQLSTATE unique_violation
const UNIQUE_VIOLATION: &str = "23505";
/// Partial unique index allowing a single open basket
const SINGLE_CURRENT_ORDER: &str = "orders_single_current";

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business rule errors
    #[error("Integrity violation: {message}")]
    IntegrityViolation { field: String, message: String },

    #[error("Concurrent modification of {0}")]
    ConcurrentMutationConflict(String),

    #[error("Conflict: {message}")]
    Conflict { resource: String, message: String },

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Reservation engine error: {0}")]
    Engine(#[from] ReservationError),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Write-write conflict the transaction may be re-run for
    pub fn is_conflict(&self) -> bool {
        match self {
            AppError::DatabaseError(err) => is_conflict(err),
            AppError::ConcurrentMutationConflict(_) => true,
            _ => false,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors
            .field_errors()
            .keys()
            .min()
            .map(|field| field.to_string())
            .unwrap_or_default();
        AppError::Validation {
            field,
            message: errors.to_string(),
        }
    }
}

/// Whether PostgreSQL aborted the transaction because of a concurrent writer.
///
/// Two requests opening the current basket at once collide on its unique
/// index; the loser sees the winner's basket on the next attempt.
pub fn is_conflict(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db_err) = err else {
        return false;
    };
    match db_err.code().as_deref() {
        Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => true,
        Some(UNIQUE_VIOLATION) => db_err.constraint() == Some(SINGLE_CURRENT_ORDER),
        _ => false,
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl AppError {
    fn status_and_detail(&self) -> (StatusCode, ErrorDetail) {
        match self {
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "VALIDATION_ERROR".to_string(),
                    message: message.clone(),
                    field: Some(field.clone()),
                },
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail {
                    code: "NOT_FOUND".to_string(),
                    message: format!("{} not found", resource),
                    field: None,
                },
            ),
            AppError::IntegrityViolation { field, message } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail {
                    code: "INTEGRITY_VIOLATION".to_string(),
                    message: message.clone(),
                    field: Some(field.clone()),
                },
            ),
            AppError::ConcurrentMutationConflict(resource) => (
                StatusCode::CONFLICT,
                ErrorDetail {
                    code: "CONCURRENT_MUTATION_CONFLICT".to_string(),
                    message: format!(
                        "{} was modified by another request, please try again",
                        resource
                    ),
                    field: None,
                },
            ),
            AppError::Conflict { resource, message } => (
                StatusCode::CONFLICT,
                ErrorDetail {
                    code: "CONFLICT".to_string(),
                    message: message.clone(),
                    field: Some(resource.clone()),
                },
            ),
            AppError::DatabaseError(err) if is_conflict(err) => (
                StatusCode::CONFLICT,
                ErrorDetail {
                    code: "CONCURRENT_MUTATION_CONFLICT".to_string(),
                    message: "Stock was modified by another request, please try again"
                        .to_string(),
                    field: None,
                },
            ),
            AppError::DatabaseError(sqlx::Error::PoolTimedOut) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorDetail {
                    code: "DATABASE_UNAVAILABLE".to_string(),
                    message: "The database is temporarily unavailable".to_string(),
                    field: None,
                },
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "DATABASE_ERROR".to_string(),
                    message: "A database error occurred".to_string(),
                    field: None,
                },
            ),
            AppError::Engine(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "ENGINE_ERROR".to_string(),
                    message: err.to_string(),
                    field: None,
                },
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "INTERNAL_ERROR".to_string(),
                    message: msg.clone(),
                    field: None,
                },
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred".to_string(),
                    field: None,
                },
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = self.status_and_detail();

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let cases = vec![
            (AppError::validation("quantity", "Quantity cannot be negative"), StatusCode::BAD_REQUEST),
            (AppError::NotFound("Part".to_string()), StatusCode::NOT_FOUND),
            (
                AppError::IntegrityViolation {
                    field: "prosthesis_id".to_string(),
                    message: "Prosthesis region does not match the client region".to_string(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                AppError::ConcurrentMutationConflict("Part".to_string()),
                StatusCode::CONFLICT,
            ),
            (
                AppError::DatabaseError(sqlx::Error::PoolTimedOut),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::DatabaseError(sqlx::Error::RowNotFound),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AppError::Engine(ReservationError::DuplicateUnit(Uuid::nil())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_validation_detail_carries_field() {
        let (_, detail) = AppError::validation("price", "Price cannot be negative").status_and_detail();
        assert_eq!(detail.code, "VALIDATION_ERROR");
        assert_eq!(detail.field.as_deref(), Some("price"));
    }

    /// Database error as PostgreSQL would report it
    #[derive(Debug)]
    struct PgFailure {
        code: &'static str,
        constraint: Option<&'static str>,
    }

    impl std::fmt::Display for PgFailure {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "SQLSTATE {}", self.code)
        }
    }

    impl std::error::Error for PgFailure {}

    impl sqlx::error::DatabaseError for PgFailure {
        fn message(&self) -> &str {
            "simulated failure"
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(self.code.into())
        }

        fn constraint(&self) -> Option<&str> {
            self.constraint
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            match self.code {
                "23505" => sqlx::error::ErrorKind::UniqueViolation,
                _ => sqlx::error::ErrorKind::Other,
            }
        }
    }

    fn pg_failure(code: &'static str, constraint: Option<&'static str>) -> sqlx::Error {
        sqlx::Error::Database(Box::new(PgFailure { code, constraint }))
    }

    #[test]
    fn test_conflict_codes_are_retryable() {
        assert!(is_conflict(&pg_failure("40001", None)));
        assert!(is_conflict(&pg_failure("40P01", None)));
        assert!(is_conflict(&pg_failure("23505", Some("orders_single_current"))));
        assert!(!is_conflict(&pg_failure("23505", Some("parts_vendor_code_key"))));
        assert!(!is_conflict(&pg_failure("23503", None)));
    }

    #[test]
    fn test_conflicts_render_as_concurrent_mutation() {
        for error in [
            AppError::ConcurrentMutationConflict("Part".to_string()),
            AppError::DatabaseError(pg_failure("23505", Some("orders_single_current"))),
        ] {
            let (status, detail) = error.status_and_detail();
            assert_eq!(status, StatusCode::CONFLICT);
            assert_eq!(detail.code, "CONCURRENT_MUTATION_CONFLICT");
        }
    }

    #[test]
    fn test_non_database_errors_are_not_conflicts() {
        assert!(!is_conflict(&sqlx::Error::RowNotFound));
        assert!(!AppError::NotFound("Job".to_string()).is_conflict());
        assert!(AppError::ConcurrentMutationConflict("Part".to_string()).is_conflict());
    }
}
