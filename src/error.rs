use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid amount: must be positive with at most 2 fractional digits")]
    InvalidAmount,

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Wallet not found for user {0}")]
    WalletNotFound(String),

    #[error("Transaction {0} not found")]
    TransactionNotFound(String),

    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Duplicate request")]
    DuplicateRequest,

    #[error("Idempotency key is required")]
    MissingIdempotencyKey,

    #[error("Wallet is locked by another operation, retry later")]
    LockConflict,

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidAmount | AppError::InvalidStatus(_) => StatusCode::BAD_REQUEST,
            AppError::WalletNotFound(_) | AppError::TransactionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            AppError::InsufficientFunds => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DuplicateRequest
            | AppError::MissingIdempotencyKey
            | AppError::LockConflict => StatusCode::CONFLICT,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Lock conflicts are transient; the caller may retry the same request
    /// (with the same idempotency key) once the competing operation commits.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::LockConflict)
    }
}

/// Postgres reports a `lock_timeout` expiry as 55P03 and unique-constraint
/// violations as 23505. The partial unique index on
/// `transactions.idempotency_key` is the authoritative duplicate check, so a
/// 23505 on it means a concurrent submission already won.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.code().as_deref() == Some("55P03") {
                return AppError::LockConflict;
            }
            if db_err.code().as_deref() == Some("23505")
                && db_err
                    .constraint()
                    .is_some_and(|c| c.contains("idempotency"))
            {
                return AppError::DuplicateRequest;
            }
        }
        AppError::Database(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
            "retryable": self.is_retryable(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_amount_status_code() {
        assert_eq!(AppError::InvalidAmount.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_wallet_not_found_status_code() {
        let error = AppError::WalletNotFound("u1".to_string());
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_insufficient_funds_status_code() {
        assert_eq!(
            AppError::InsufficientFunds.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_duplicate_request_status_code() {
        assert_eq!(AppError::DuplicateRequest.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_missing_idempotency_key_status_code() {
        assert_eq!(
            AppError::MissingIdempotencyKey.status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_lock_conflict_is_retryable() {
        assert!(AppError::LockConflict.is_retryable());
        assert!(!AppError::InsufficientFunds.is_retryable());
    }

    #[test]
    fn test_database_error_status_code() {
        let error = AppError::Database(sqlx::Error::RowNotFound);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_insufficient_funds_response() {
        let response = AppError::InsufficientFunds.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_lock_conflict_response() {
        let response = AppError::LockConflict.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
