//! Payment-service HTTP handlers (`spec.md` §6).

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use gateway_types::ans104::SignatureType;
use gateway_types::user::UserAddressType;
use gateway_types::x402::PaymentPayload;
use serde::{Deserialize, Serialize};

use crate::error::PaymentError;
use crate::ledger::{CheckBalanceResult, ReserveResult};

use super::state::AppState;

fn parse_sig_type(name: &str) -> Result<SignatureType, PaymentError> {
    match name.to_ascii_lowercase().as_str() {
        "arweave" => Ok(SignatureType::Arweave),
        "ed25519" => Ok(SignatureType::Ed25519),
        "ethereum" => Ok(SignatureType::Ethereum),
        "solana" => Ok(SignatureType::Solana),
        "injectedaptos" => Ok(SignatureType::InjectedAptos),
        "multiaptos" => Ok(SignatureType::MultiAptos),
        "typedethereum" => Ok(SignatureType::TypedEthereum),
        "kyve" => Ok(SignatureType::Kyve),
        other => Err(PaymentError::InvalidInput(format!("unknown signature type: {other}"))),
    }
}

fn check_internal_bearer(headers: &HeaderMap, secret: &str) -> Result<(), PaymentError> {
    let provided = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match provided {
        Some(token) if token == secret => Ok(()),
        _ => Err(PaymentError::Unauthorized),
    }
}

#[derive(Deserialize)]
pub struct BytesQuery {
    pub bytes: u64,
}

/// `GET /v1/x402/price/<sigType>/<address>?bytes=N` — always `402`.
pub async fn price(
    State(state): State<AppState>,
    Path((sig_type, address)): Path<(String, String)>,
    Query(query): Query<BytesQuery>,
) -> impl IntoResponse {
    match handle_price(state, sig_type, address, query.bytes).await {
        Ok(quote) => (
            StatusCode::PAYMENT_REQUIRED,
            [("X-Payment-Required", "x402-1")],
            Json(quote),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn handle_price(
    state: AppState,
    sig_type: String,
    address: String,
    bytes: u64,
) -> Result<gateway_types::x402::PriceQuote, PaymentError> {
    let sig_type = parse_sig_type(&sig_type)?;
    state
        .engine
        .quote(sig_type, &address, bytes)
        .await
        .map_err(engine_error_to_payment_error)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub mode: Option<gateway_types::x402::PaymentMode>,
    pub data_item_id: Option<String>,
    pub declared_byte_count: Option<u64>,
    #[serde(flatten)]
    pub payload: PaymentPayload,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub payment_id: uuid::Uuid,
    pub tx_hash: String,
    pub network: String,
    pub mode: gateway_types::x402::PaymentMode,
}

/// `POST /v1/x402/payment/<sigType>/<address>` — verify & settle
/// (payg/topup/hybrid).
pub async fn pay(
    State(state): State<AppState>,
    Path((sig_type, address)): Path<(String, String)>,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<PaymentResponse>, PaymentError> {
    let sig_type = parse_sig_type(&sig_type)?;
    let mode = request.mode.unwrap_or_default();
    let payment = state
        .engine
        .pay(sig_type, &address, request.payload, mode, request.data_item_id, request.declared_byte_count)
        .await
        .map_err(engine_error_to_payment_error)?;
    Ok(Json(PaymentResponse {
        payment_id: payment.id,
        tx_hash: payment.tx_hash,
        network: payment.network,
        mode,
    }))
}

/// `POST /v1/x402/top-up/<sigType>/<address>` — pure top-up; always mode
/// `topup` regardless of the body.
pub async fn top_up(
    State(state): State<AppState>,
    Path((sig_type, address)): Path<(String, String)>,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<PaymentResponse>, PaymentError> {
    let sig_type = parse_sig_type(&sig_type)?;
    let payment = state
        .engine
        .pay(
            sig_type,
            &address,
            request.payload,
            gateway_types::x402::PaymentMode::Topup,
            None,
            request.declared_byte_count,
        )
        .await
        .map_err(engine_error_to_payment_error)?;
    Ok(Json(PaymentResponse {
        payment_id: payment.id,
        tx_hash: payment.tx_hash,
        network: payment.network,
        mode: gateway_types::x402::PaymentMode::Topup,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    pub data_item_id: String,
    pub actual_byte_count: u64,
}

#[derive(Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FinalizeResponse {
    Confirmed,
    Refunded { refund_winc: String },
    FraudPenalty { declared: u64, actual: u64 },
}

/// `POST /v1/x402/finalize {dataItemId, actualByteCount}`.
pub async fn finalize(
    State(state): State<AppState>,
    Json(request): Json<FinalizeRequest>,
) -> Result<Json<FinalizeResponse>, PaymentError> {
    let outcome = state
        .engine
        .finalize(&request.data_item_id, request.actual_byte_count)
        .await
        .map_err(engine_error_to_payment_error)?;
    Ok(Json(match outcome {
        gateway_types::x402::FinalizeOutcome::Confirmed => FinalizeResponse::Confirmed,
        gateway_types::x402::FinalizeOutcome::Refunded { refund_winc } => FinalizeResponse::Refunded {
            refund_winc: refund_winc.to_string(),
        },
        gateway_types::x402::FinalizeOutcome::FraudPenalty { declared, actual } => {
            return Err(PaymentError::FraudPenalty { declared, actual });
        }
    }))
}

#[derive(Deserialize)]
pub struct BalanceQuery {
    pub address: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub user_address: String,
    pub winston_credit_balance: String,
}

/// `GET /v1/balance?address=...`.
pub async fn balance(
    State(state): State<AppState>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<BalanceResponse>, PaymentError> {
    let user = state.ledger.get_user(&query.address).await?;
    match user {
        Some(user) => Ok(Json(BalanceResponse {
            user_address: user.user_address,
            winston_credit_balance: user.winston_credit_balance.to_string(),
        })),
        None => Ok(Json(BalanceResponse {
            user_address: query.address,
            winston_credit_balance: "0".to_string(),
        })),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveBalanceRequest {
    pub data_item_id: String,
    pub user_address: String,
    pub user_address_type: UserAddressType,
    pub byte_count: u64,
    pub signature_type: SignatureType,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveBalanceResponse {
    pub is_reserved: bool,
    pub cost_of_data_item: String,
    pub wallet_exists: bool,
}

impl From<ReserveResult> for ReserveBalanceResponse {
    fn from(r: ReserveResult) -> Self {
        Self {
            is_reserved: r.is_reserved,
            cost_of_data_item: r.cost_of_data_item.to_string(),
            wallet_exists: r.wallet_exists,
        }
    }
}

/// `POST /v1/reserve-balance` — internal, bearer-secret protected
/// (`spec.md` §6).
pub async fn reserve_balance(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ReserveBalanceRequest>,
) -> Result<Json<ReserveBalanceResponse>, PaymentError> {
    check_internal_bearer(&headers, &state.config.internal_bearer_secret)?;
    let allow_listed = state.config.allow_listed().contains(&request.user_address);
    let result = state
        .ledger
        .reserve_balance_for_data(
            &request.data_item_id,
            &request.user_address,
            request.user_address_type,
            request.byte_count,
            request.signature_type,
            allow_listed,
            state.config.free_upload_limit_bytes,
        )
        .await?;
    Ok(Json(result.into()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckBalanceRequest {
    pub user_address: String,
    pub user_address_type: UserAddressType,
    pub byte_count: u64,
    pub signature_type: SignatureType,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckBalanceResponse {
    pub sufficient: bool,
    pub bytes_cost_in_winc: String,
    pub user_balance_in_winc: String,
}

impl From<CheckBalanceResult> for CheckBalanceResponse {
    fn from(r: CheckBalanceResult) -> Self {
        Self {
            sufficient: r.sufficient,
            bytes_cost_in_winc: r.bytes_cost_in_winc.to_string(),
            user_balance_in_winc: r.user_balance_in_winc.to_string(),
        }
    }
}

/// `POST /v1/check-balance` — internal; lets the upload service pre-flight a
/// reservation without committing it.
pub async fn check_balance(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CheckBalanceRequest>,
) -> Result<Json<CheckBalanceResponse>, PaymentError> {
    check_internal_bearer(&headers, &state.config.internal_bearer_secret)?;
    let allow_listed = state.config.allow_listed().contains(&request.user_address);
    let result = state
        .ledger
        .check_balance_for_data(
            &request.user_address,
            request.user_address_type,
            request.byte_count,
            request.signature_type,
            allow_listed,
            state.config.free_upload_limit_bytes,
        )
        .await?;
    Ok(Json(result.into()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeReservationRequest {
    pub data_item_id: String,
    pub action: FinalizeReservationAction,
}

#[derive(Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeReservationAction {
    Consume,
    Cancel,
}

/// `POST /v1/finalize-reservation` — consume (bundle persisted) or cancel
/// (upload failed) a balance reservation.
pub async fn finalize_reservation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<FinalizeReservationRequest>,
) -> Result<StatusCode, PaymentError> {
    check_internal_bearer(&headers, &state.config.internal_bearer_secret)?;
    match request.action {
        FinalizeReservationAction::Consume => state.ledger.finalize_reservation(&request.data_item_id).await?,
        FinalizeReservationAction::Cancel => state.ledger.cancel_reservation(&request.data_item_id).await?,
    }
    Ok(StatusCode::NO_CONTENT)
}

fn engine_error_to_payment_error(e: crate::x402::EngineError) -> PaymentError {
    use crate::x402::EngineError;
    match e {
        EngineError::VerificationFailed(msg) => PaymentError::VerificationFailed(msg),
        EngineError::FraudPenalty { declared, actual } => PaymentError::FraudPenalty { declared, actual },
        EngineError::DuplicateTxHash => PaymentError::DuplicateTxHash,
        EngineError::NoMatchingNetwork => PaymentError::NoNetworksEnabled,
        EngineError::Malformed(msg) => PaymentError::InvalidInput(msg),
        EngineError::Database(e) => PaymentError::Database(e),
        EngineError::Ledger(crate::ledger::LedgerError::InsufficientBalance) => PaymentError::InsufficientBalance,
        EngineError::Ledger(e) => PaymentError::Internal(e.to_string()),
        EngineError::Facilitator(e) => PaymentError::Internal(e.to_string()),
        EngineError::SettlementIncomplete => PaymentError::Internal("settlement did not complete".to_string()),
        EngineError::Pricing(e) => PaymentError::Internal(e.to_string()),
        EngineError::ReservationNotFound(_) => PaymentError::NotFound,
    }
}

impl From<crate::ledger::LedgerError> for PaymentError {
    fn from(e: crate::ledger::LedgerError) -> Self {
        match e {
            crate::ledger::LedgerError::InsufficientBalance => PaymentError::InsufficientBalance,
            crate::ledger::LedgerError::NoReservation(_) => PaymentError::NotFound,
            crate::ledger::LedgerError::Database(e) => PaymentError::Database(e),
        }
    }
}
