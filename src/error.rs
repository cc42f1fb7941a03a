use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Input missing: {0}")]
    InputMissing(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Access refused: {0}")]
    AccessRefused(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Digest already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Expired: {0}")]
    Expired(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("Ledger registration timed out after {0:?}")]
    LedgerTimeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mail delivery error: {0}")]
    Mail(#[from] reqwest::Error),
}

impl AppError {
    /// Machine-readable reason sent alongside the human message
    pub fn reason(&self) -> &'static str {
        match self {
            AppError::InputMissing(_) => "input_missing",
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::AccessRefused(_) => "access_refused",
            AppError::NotFound(_) => "not_found",
            AppError::AlreadyRegistered(_) => "already_registered",
            AppError::Expired(_) => "expired",
            AppError::Database(_) | AppError::StorageFailure(_) | AppError::Io(_) => {
                "storage_failure"
            }
            AppError::LedgerUnavailable(_) => "ledger_unavailable",
            AppError::LedgerTimeout(_) => "ledger_timeout",
            AppError::Internal(_) => "internal",
            AppError::Mail(_) => "mail_unavailable",
        }
    }
}

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            message: "success".to_string(),
            reason: None,
            data: Some(data),
        }
    }

    pub fn success_message(message: &str) -> ApiResponse<()> {
        ApiResponse {
            code: 0,
            message: message.to_string(),
            reason: None,
            data: None,
        }
    }

    pub fn error(code: i32, reason: &str, message: &str) -> ApiResponse<()> {
        ApiResponse {
            code,
            message: message.to_string(),
            reason: Some(reason.to_string()),
            data: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            AppError::InputMissing(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::AccessRefused(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::AlreadyRegistered(digest) => (
                StatusCode::CONFLICT,
                format!("File already exists on the ledger: {}", digest),
            ),
            AppError::Expired(msg) => (StatusCode::GONE, msg.clone()),
            AppError::StorageFailure(msg) => {
                tracing::error!("Storage failure: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            AppError::LedgerUnavailable(msg) => {
                tracing::error!("Ledger unavailable: {}", msg);
                (StatusCode::BAD_GATEWAY, msg.clone())
            }
            AppError::LedgerTimeout(after) => {
                tracing::error!("Ledger registration timed out after {:?}", after);
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "Ledger registration timed out".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "IO error".to_string())
            }
            AppError::Mail(e) => {
                tracing::error!("Mail delivery error: {:?}", e);
                (StatusCode::BAD_GATEWAY, "Mail delivery failed".to_string())
            }
        };

        let body = Json(ApiResponse::<()>::error(
            status.as_u16() as i32,
            self.reason(),
            &message,
        ));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
