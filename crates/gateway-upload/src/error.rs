//! Upload-service error type and its HTTP mapping (`spec.md` §6).

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid data item: {0}")]
    InvalidDataItem(String),
    #[error("byte count exceeds the configured limit: {0}")]
    TooLarge(String),
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("payment required")]
    PaymentRequired,
    #[error("fraud detected: declared {declared}, actual {actual}")]
    FraudPenalty { declared: u64, actual: u64 },
    #[error("address is blocklisted")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("queue error: {0}")]
    Queue(#[from] gateway_queue::QueueError),
    #[error("storage error: {0}")]
    Storage(#[from] gateway_storage::ObjectStoreError),
    #[error("payment-service error: {0}")]
    PaymentService(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        if let UploadError::FraudPenalty { declared, actual } = &self {
            return (
                StatusCode::PAYMENT_REQUIRED,
                Json(serde_json::json!({
                    "error": { "kind": "payment_required", "reason": "fraud_penalty" },
                    "declaredByteCount": declared,
                    "actualByteCount": actual,
                })),
            )
                .into_response();
        }

        let status = match &self {
            UploadError::InvalidDataItem(_) => StatusCode::BAD_REQUEST,
            UploadError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::InsufficientBalance => StatusCode::PAYMENT_REQUIRED,
            UploadError::PaymentRequired => StatusCode::PAYMENT_REQUIRED,
            UploadError::Forbidden => StatusCode::FORBIDDEN,
            UploadError::NotFound => StatusCode::NOT_FOUND,
            UploadError::Unauthorized => StatusCode::UNAUTHORIZED,
            UploadError::Database(_) | UploadError::Queue(_) | UploadError::Storage(_) | UploadError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            UploadError::PaymentService(_) => StatusCode::BAD_GATEWAY,
            UploadError::FraudPenalty { .. } => unreachable!("handled above"),
        };
        let body = ErrorBody {
            error: status.canonical_reason().unwrap_or("error").to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<crate::payment_client::PaymentClientError> for UploadError {
    fn from(err: crate::payment_client::PaymentClientError) -> Self {
        UploadError::PaymentService(err.to_string())
    }
}

impl From<crate::multipart::MultipartError> for UploadError {
    fn from(err: crate::multipart::MultipartError) -> Self {
        use crate::multipart::MultipartError;
        match err {
            MultipartError::NotFound(_) => UploadError::NotFound,
            MultipartError::BadToken => UploadError::Unauthorized,
            MultipartError::PartSizeOutOfRange(_) | MultipartError::NonContiguousParts => UploadError::InvalidDataItem(err.to_string()),
            MultipartError::Database(e) => UploadError::Database(e),
        }
    }
}
