//! Error types for the Librairie server

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use once_cell::sync::OnceCell;
use serde::Serialize;
use thiserror::Error;

/// Whether error responses may carry internal detail (development only)
static EXPOSE_DETAILS: OnceCell<bool> = OnceCell::new();

/// Enable or disable internal detail in error bodies; first call wins
pub fn expose_error_details(enabled: bool) {
    let _ = EXPOSE_DETAILS.set(enabled);
}

fn details_exposed() -> bool {
    EXPOSE_DETAILS.get().copied().unwrap_or(false)
}

/// Stable application error codes returned in every error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NoSuchEntity = 4,
    BadValue = 5,
    Duplicate = 6,
    BookNotAvailable = 7,
    LoanAlreadyReturned = 8,
    InvalidAdminCode = 9,
    AdminCodeExpired = 10,
    DomainNotAllowed = 11,
    DeliveryFailure = 12,
    ServiceUnavailable = 13,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Book {0} has no copies available")]
    OutOfStock(i32),

    #[error("Loan {0} has already been returned")]
    AlreadyReturned(i32),

    #[error("Invalid admin verification code")]
    InvalidCode,

    #[error("Admin verification code has expired")]
    CodeExpired,

    #[error("Admin registration requires an email ending with {0}")]
    ForbiddenDomain(String),

    #[error("Failed to deliver verification code: {0}")]
    DeliveryFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AppError {
    fn parts(&self) -> (StatusCode, ErrorCode, String) {
        match self {
            AppError::Authentication(msg) => {
                (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::Authorization(msg) => {
                (StatusCode::FORBIDDEN, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, ErrorCode::NoSuchEntity, msg.clone())
            }
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone())
            }
            AppError::Conflict(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::Duplicate, msg.clone())
            }
            AppError::OutOfStock(_) => (
                StatusCode::BAD_REQUEST,
                ErrorCode::BookNotAvailable,
                "Book is out of stock".to_string(),
            ),
            AppError::AlreadyReturned(_) => (
                StatusCode::BAD_REQUEST,
                ErrorCode::LoanAlreadyReturned,
                "Loan already returned".to_string(),
            ),
            AppError::InvalidCode => (
                StatusCode::BAD_REQUEST,
                ErrorCode::InvalidAdminCode,
                self.to_string(),
            ),
            AppError::CodeExpired => (
                StatusCode::BAD_REQUEST,
                ErrorCode::AdminCodeExpired,
                self.to_string(),
            ),
            AppError::ForbiddenDomain(_) => {
                (StatusCode::FORBIDDEN, ErrorCode::DomainNotAllowed, self.to_string())
            }
            AppError::DeliveryFailed(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::DeliveryFailure,
                "Failed to send verification code".to_string(),
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::DbFailure,
                "Database error".to_string(),
            ),
            AppError::Unavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::ServiceUnavailable,
                "Service temporarily unavailable".to_string(),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::Failure,
                "Internal server error".to_string(),
            ),
        }
    }

    /// Errors whose message hides the underlying cause
    fn is_opaque(&self) -> bool {
        matches!(
            self,
            AppError::DeliveryFailed(_)
                | AppError::Database(_)
                | AppError::Unavailable(_)
                | AppError::Internal(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        let detail = if self.is_opaque() {
            tracing::error!(error = %self, "request failed");
            details_exposed().then(|| self.to_string())
        } else {
            None
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
            detail,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
