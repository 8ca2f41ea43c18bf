//! Upload-service HTTP handlers (`spec.md` §6).

use std::io;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use futures_util::TryStreamExt;
use gateway_queue::{QueueClient, QueueName};
use gateway_storage::object_store::MultipartUploadHandle;
use gateway_types::ans104::SignatureType;
use gateway_types::lifecycle::DataItemStatus;
use gateway_types::offsets::DataItemOffset;
use gateway_types::x402::{PaymentPayload, PriceQuote};
use gateway_types::multipart::MAX_PART_SIZE;
use serde::{Deserialize, Serialize};
use tokio_util::io::StreamReader;
use uuid::Uuid;

use crate::bundle::payloads::FinalizeUploadPayload;
use crate::error::UploadError;
use crate::ingress::{self, IngestOutcome};
use crate::token;

use super::state::AppState;

/// A generic-usdc quote isn't addressed to any particular wallet; this
/// placeholder stands in for the `address` path segment the payment-service's
/// own `/v1/x402/price/<sigType>/<address>` route expects (`spec.md` §6).
const PRICE_QUOTE_PLACEHOLDER_ADDRESS: &str = "anonymous";

/// No signature has been collected yet at quote time, so the two upload-side
/// price routes price against the signature type the raw (x402-only) ingest
/// path itself signs under.
const PRICE_QUOTE_SIGNATURE_TYPE: SignatureType = SignatureType::TypedEthereum;

/// Rough per-tag ANS-104 framing overhead (name/value length prefixes plus a
/// few bytes of slack), used only to approximate the byte cost `tags=N`
/// would add ahead of an actual envelope existing.
const APPROX_TAG_OVERHEAD_BYTES: u64 = 24;

fn content_length_header(headers: &HeaderMap) -> Option<u64> {
    headers.get(header::CONTENT_LENGTH)?.to_str().ok()?.parse().ok()
}

fn body_reader(body: Body) -> impl tokio::io::AsyncRead + Unpin + Send {
    StreamReader::new(body.into_data_stream().map_err(io::Error::other))
}

fn decode_x_payment(x_payment: &str) -> Result<PaymentPayload, UploadError> {
    let decoded = BASE64_STANDARD
        .decode(x_payment)
        .map_err(|e| UploadError::InvalidDataItem(format!("invalid X-PAYMENT header: {e}")))?;
    serde_json::from_slice(&decoded).map_err(|e| UploadError::InvalidDataItem(format!("invalid X-PAYMENT payload: {e}")))
}

fn receipt_response(outcome: IngestOutcome) -> Response {
    let mut response = Json(outcome.receipt).into_response();
    if let Some(payment) = outcome.payment {
        if let Ok(bytes) = serde_json::to_vec(&payment) {
            let encoded = BASE64_STANDARD.encode(bytes);
            if let Ok(value) = HeaderValue::from_str(&encoded) {
                response.headers_mut().insert("X-Payment-Response", value);
            }
        }
    }
    response
}

/// `POST /v1/tx` — signed ANS-104 envelope, paid by credit or x402
/// (`spec.md` §4.1).
pub async fn ingest_signed(State(state): State<AppState>, headers: HeaderMap, body: Body) -> Result<Response, UploadError> {
    let content_length = content_length_header(&headers);
    let x_payment = headers.get("X-PAYMENT").and_then(|v| v.to_str().ok()).map(str::to_string);
    let reader = body_reader(body);
    let outcome = ingress::ingest_signed(&state.ingest, reader, content_length, x_payment).await?;
    Ok(receipt_response(outcome))
}

/// `POST /v1/tx/<token>` — raw, unsigned bytes the gateway wraps and signs
/// itself, paid entirely over x402 (`spec.md` §4.1, §4.2).
pub async fn ingest_raw(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, UploadError> {
    let parsed = token::parse(&token).map_err(|e| UploadError::InvalidDataItem(e.to_string()))?;
    let content_length =
        content_length_header(&headers).ok_or_else(|| UploadError::InvalidDataItem("Content-Length is required".to_string()))?;
    let x_payment = headers
        .get("X-PAYMENT")
        .and_then(|v| v.to_str().ok())
        .ok_or(UploadError::PaymentRequired)?
        .to_string();

    let payload = decode_x_payment(&x_payment)?;
    if payload.network != parsed.network {
        return Err(UploadError::InvalidDataItem(format!(
            "X-PAYMENT network {} does not match route token network {}",
            payload.network, parsed.network
        )));
    }
    let payer_address = payload.payload.authorization.from.clone();

    let reader = body_reader(body);
    let outcome = ingress::ingest_raw(&state.ingest, reader, content_length, x_payment, &payer_address).await?;
    Ok(receipt_response(outcome))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMultipartRequest {
    pub user_address: Option<String>,
    pub chunk_size: Option<u64>,
    pub expected_byte_count: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMultipartResponse {
    pub upload_id: Uuid,
    pub finalize_token: String,
    pub chunk_size: i64,
}

/// `POST /v1/tx/multipart` — opens an object-store multipart upload and a
/// bookkeeping session over it (`spec.md` §4.1, §6).
pub async fn create_multipart(
    State(state): State<AppState>,
    Json(request): Json<CreateMultipartRequest>,
) -> Result<Json<CreateMultipartResponse>, UploadError> {
    let object_key = format!("multipart-upload/{}", Uuid::new_v4());
    let handle = state.ingest.object_store.create_multipart_upload(&object_key).await?;
    let upload = state
        .multipart_repository
        .create(request.user_address, request.chunk_size, request.expected_byte_count, handle.upload_id, handle.key)
        .await?;
    Ok(Json(CreateMultipartResponse {
        upload_id: upload.upload_id,
        finalize_token: upload.finalize_token,
        chunk_size: upload.chunk_size,
    }))
}

/// `PUT /v1/tx/multipart/<uploadId>/<partNumber>`.
pub async fn upload_part(
    State(state): State<AppState>,
    Path((upload_id, part_number)): Path<(Uuid, i32)>,
    body: Body,
) -> Result<StatusCode, UploadError> {
    let upload = state.multipart_repository.get(upload_id).await?;
    let bytes = axum::body::to_bytes(body, MAX_PART_SIZE as usize)
        .await
        .map_err(|e| UploadError::TooLarge(e.to_string()))?;
    let handle = MultipartUploadHandle {
        upload_id: upload.object_upload_id,
        key: upload.object_key,
    };
    let completed = state.ingest.object_store.upload_part(&handle, part_number, bytes.clone()).await?;
    state.multipart_repository.record_part(upload_id, part_number, &completed.etag, bytes.len() as u64).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /v1/tx/multipart/<uploadId>/finalize/<token>` — hands the session
/// off to the `finalize-upload` worker, which completes the object-store
/// upload and runs the assembled bytes through the ordinary ingest pipeline.
pub async fn finalize_multipart(
    State(state): State<AppState>,
    Path((upload_id, token)): Path<(Uuid, String)>,
) -> Result<StatusCode, UploadError> {
    state.multipart_repository.verify_finalize_token(upload_id, &token).await?;
    state
        .ingest
        .queue
        .enqueue(QueueName::FinalizeUpload, &upload_id.to_string(), &FinalizeUploadPayload { upload_id })
        .await?;
    Ok(StatusCode::ACCEPTED)
}

async fn quote_response(state: &AppState, token: &str, byte_count: u64) -> Result<Response, UploadError> {
    let parsed = token::parse(token).map_err(|e| UploadError::InvalidDataItem(e.to_string()))?;
    let quote = state
        .ingest
        .payment_client
        .price_quote(PRICE_QUOTE_SIGNATURE_TYPE, PRICE_QUOTE_PLACEHOLDER_ADDRESS, byte_count)
        .await?;
    let accepts: Vec<_> = quote.accepts.into_iter().filter(|a| a.network == parsed.network).collect();
    if accepts.is_empty() {
        return Err(UploadError::NotFound);
    }
    let quote = PriceQuote {
        x402_version: quote.x402_version,
        accepts,
    };
    Ok((StatusCode::PAYMENT_REQUIRED, [("X-Payment-Required", "x402-1")], Json(quote)).into_response())
}

/// `GET /v1/price/x402/data-item/<token>/<byteCount>` — exact-item quote.
pub async fn price_data_item(State(state): State<AppState>, Path((token, byte_count)): Path<(String, u64)>) -> Result<Response, UploadError> {
    quote_response(&state, &token, byte_count).await
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPriceQuery {
    pub tags: Option<u64>,
    pub content_type: Option<String>,
}

/// `GET /v1/price/x402/data/<token>/<byteCount>?tags=N&contentType=T` —
/// quotes a raw (unsigned) upload, approximating the envelope overhead the
/// gateway's own wrapping will add (`spec.md` §4.1, §6).
pub async fn price_data(
    State(state): State<AppState>,
    Path((token, byte_count)): Path<(String, u64)>,
    Query(query): Query<DataPriceQuery>,
) -> Result<Response, UploadError> {
    let overhead =
        query.tags.unwrap_or(0) * APPROX_TAG_OVERHEAD_BYTES + query.content_type.as_deref().map(|c| c.len() as u64).unwrap_or(0);
    quote_response(&state, &token, byte_count + overhead).await
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusResponse {
    New,
    Planned,
    Permanent { bundle_id: String, block_height: i64 },
    Failed { failed_reason: String, failed_date: chrono::DateTime<chrono::Utc> },
}

/// `GET /v1/tx/<id>/status`.
pub async fn status(State(state): State<AppState>, Path(data_item_id): Path<String>) -> Result<Json<StatusResponse>, UploadError> {
    let response = match state.lifecycle_repository.status_of(&data_item_id).await? {
        DataItemStatus::New => StatusResponse::New,
        DataItemStatus::Planned => StatusResponse::Planned,
        DataItemStatus::Permanent => {
            let item = state.lifecycle_repository.permanent_item(&data_item_id).await?.ok_or(UploadError::NotFound)?;
            StatusResponse::Permanent {
                bundle_id: item.bundle_id,
                block_height: item.block_height,
            }
        }
        DataItemStatus::Failed => {
            let item = state.lifecycle_repository.failed_item(&data_item_id).await?.ok_or(UploadError::NotFound)?;
            StatusResponse::Failed {
                failed_reason: item.failed_reason,
                failed_date: item.failed_date,
            }
        }
        DataItemStatus::NotFound => return Err(UploadError::NotFound),
    };
    Ok(Json(response))
}

/// `GET /v1/tx/<id>/offset`.
pub async fn offset(State(state): State<AppState>, Path(data_item_id): Path<String>) -> Result<Json<DataItemOffset>, UploadError> {
    let offset = state.offsets_store.get(&data_item_id).await?.ok_or(UploadError::NotFound)?;
    Ok(Json(offset))
}
