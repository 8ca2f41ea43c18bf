//! Payment-service error enum, mapped to the shared behavioral error kinds
//! of `gateway_types::error::ErrorKind`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gateway_types::error::{ErrorBody, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("x402 payment required: {0:?}")]
    PaymentRequired(gateway_types::x402::PriceQuote),
    #[error("x402 verification failed: {0}")]
    VerificationFailed(String),
    #[error("fraud detected: declared {declared}, actual {actual}")]
    FraudPenalty { declared: u64, actual: u64 },
    #[error("address is blocklisted")]
    Blocklisted,
    #[error("duplicate transaction hash")]
    DuplicateTxHash,
    #[error("no networks enabled")]
    NoNetworksEnabled,
    #[error("resource not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("upstream facilitator error: {0}")]
    Facilitator(#[from] reqwest::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl PaymentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::InvalidInput(_) => ErrorKind::InvalidInput,
            PaymentError::InsufficientBalance
            | PaymentError::PaymentRequired(_)
            | PaymentError::VerificationFailed(_)
            | PaymentError::FraudPenalty { .. } => ErrorKind::PaymentRequired,
            PaymentError::Blocklisted => ErrorKind::Forbidden,
            PaymentError::DuplicateTxHash => ErrorKind::Conflict,
            PaymentError::NoNetworksEnabled => ErrorKind::Unavailable,
            PaymentError::NotFound => ErrorKind::NotFound,
            PaymentError::Unauthorized => ErrorKind::Unauthorized,
            PaymentError::Database(_) | PaymentError::Facilitator(_) | PaymentError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = StatusCode::from_u16(kind.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // Payment verification failures always carry the structured accepts[]
        // body so the client can retry (spec.md §7).
        if let PaymentError::PaymentRequired(quote) = &self {
            return (status, Json(quote.clone())).into_response();
        }
        if let PaymentError::FraudPenalty { declared, actual } = &self {
            return (
                status,
                Json(serde_json::json!({
                    "error": { "kind": "payment_required", "reason": "fraud_penalty" },
                    "declaredByteCount": declared,
                    "actualByteCount": actual,
                })),
            )
                .into_response();
        }

        tracing::warn!(error = %self, "payment-service request failed");
        (status, Json(ErrorBody::new(kind, self.to_string()))).into_response()
    }
}
