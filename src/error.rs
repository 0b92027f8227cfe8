//! Error types for the lending server

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Stable error codes returned alongside every error response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NoSuchBook = 4,
    NoSuchStudent = 5,
    NoSuchBorrowRecord = 6,
    NoSuchData = 7,
    NoCopiesAvailable = 8,
    AlreadyBorrowed = 9,
    AlreadyReturned = 10,
    Duplicate = 11,
    BadValue = 12,
}

/// Reasons a borrow or return is refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LendingViolation {
    NoCopiesAvailable,
    AlreadyBorrowed,
    AlreadyReturned,
}

impl LendingViolation {
    pub fn message(&self) -> &'static str {
        match self {
            LendingViolation::NoCopiesAvailable => "Book has no available copies",
            LendingViolation::AlreadyBorrowed => "Student already has this book borrowed",
            LendingViolation::AlreadyReturned => "Book has already been returned",
        }
    }

    fn code(&self) -> ErrorCode {
        match self {
            LendingViolation::NoCopiesAvailable => ErrorCode::NoCopiesAvailable,
            LendingViolation::AlreadyBorrowed => ErrorCode::AlreadyBorrowed,
            LendingViolation::AlreadyReturned => ErrorCode::AlreadyReturned,
        }
    }
}

impl std::fmt::Display for LendingViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("{entity} with ID {id} not found")]
    NotFound { entity: &'static str, id: i32 },

    #[error("Invalid operation: {0}")]
    InvalidOperation(LendingViolation),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(entity: &'static str, id: i32) -> Self {
        AppError::NotFound { entity, id }
    }

    /// True for failures of the store itself rather than of the request
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::Internal(_))
    }
}

impl From<LendingViolation> for AppError {
    fn from(violation: LendingViolation) -> Self {
        AppError::InvalidOperation(violation)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Authentication(msg) => {
                (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::Authorization(msg) => {
                (StatusCode::FORBIDDEN, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::NotFound { entity, .. } => {
                let code = match *entity {
                    "Book" => ErrorCode::NoSuchBook,
                    "Student" => ErrorCode::NoSuchStudent,
                    "BorrowRecord" => ErrorCode::NoSuchBorrowRecord,
                    _ => ErrorCode::NoSuchData,
                };
                (StatusCode::NOT_FOUND, code, self.to_string())
            }
            AppError::InvalidOperation(violation) => (
                StatusCode::BAD_REQUEST,
                violation.code(),
                violation.message().to_string(),
            ),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone())
            }
            AppError::Conflict(msg) => {
                (StatusCode::CONFLICT, ErrorCode::Duplicate, msg.clone())
            }
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::DbFailure,
                    "Operation failed".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Failure,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
