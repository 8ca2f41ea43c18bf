//! The ingest pipeline (`spec.md` §4.1): streaming envelope parse, payment
//! decision, redundant storage writes, and receipt issuance, shared by
//! `POST /v1/tx`, `POST /v1/tx/<token>`, and multipart finalize.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use bytes::Bytes;
use chrono::Utc;
use gateway_storage::{BackupFs, HotCache, ObjectMetadata, ObjectStore};
use gateway_types::ans104::{self, EnvelopeReader, ParsedEnvelopeHeader, SignatureType};
use gateway_types::lifecycle::NewDataItem;
use gateway_types::money::Winston;
use gateway_types::receipt::{self, Receipt, ReceiptSigner};
use gateway_types::user::UserAddressType;
use gateway_types::x402::{PaymentMode, PaymentPayload, PaymentResponseHeader};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tracing::{info, instrument, warn};

use crate::bundle::payloads::{NewDataItemPayload, OpticalPostPayload};
use crate::bundle::repository::LifecycleRepository;
use crate::config::Config;
use crate::dedicated_bundles;
use crate::error::UploadError;
use crate::gateway_client::ArweaveGateway;
use crate::indexer::DownstreamIndexer;
use crate::payment_client::PaymentClient;
use crate::receipt_signer::LocalWalletReceiptSigner;
use gateway_queue::{QueueClient, QueueName, RedisQueue};

const BYTE_LIMIT_EXCEEDED_MSG: &str = "ingest byte limit exceeded";

/// Object store key a data item's raw envelope bytes live under.
pub fn object_key(data_item_id: &str) -> String {
    format!("raw-data-item/{data_item_id}")
}

/// A read wrapper that counts bytes as they pass through and fails the
/// instant a configured ceiling is crossed — the streaming invariant of
/// `spec.md` §4.1/§5: the body future resolves to an error before any
/// further bytes are read, rather than buffering past the limit.
struct ByteCountingReader<R> {
    inner: R,
    consumed: u64,
    limit: u64,
}

impl<R> ByteCountingReader<R> {
    fn new(inner: R, limit: u64) -> Self {
        Self { inner, consumed: 0, limit }
    }

    fn consumed(&self) -> u64 {
        self.consumed
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ByteCountingReader<R> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let newly_read = (buf.filled().len() - before) as u64;
                this.consumed += newly_read;
                if this.consumed > this.limit {
                    return Poll::Ready(Err(io::Error::other(BYTE_LIMIT_EXCEEDED_MSG)));
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

fn is_byte_limit_exceeded(err: &io::Error) -> bool {
    err.get_ref().map(|inner| inner.to_string() == BYTE_LIMIT_EXCEEDED_MSG).unwrap_or(false)
}

/// Shared collaborators the ingest pipeline needs, assembled once by the
/// `upload-service` binary and cloned into each request/job.
#[derive(Clone)]
pub struct IngestState {
    pub repository: LifecycleRepository,
    pub object_store: Arc<dyn ObjectStore>,
    pub backup_fs: Option<Arc<BackupFs>>,
    pub hot_cache: Option<Arc<HotCache>>,
    pub queue: RedisQueue,
    pub payment_client: PaymentClient,
    pub gateway: Arc<dyn ArweaveGateway>,
    pub indexer: Arc<dyn DownstreamIndexer>,
    pub receipt_signer: Arc<LocalWalletReceiptSigner>,
    pub config: Arc<Config>,
}

pub struct IngestOutcome {
    pub receipt: Receipt,
    /// Set when the upload was paid for over x402, so the HTTP layer can
    /// emit `X-Payment-Response` (`spec.md` §4.2, §6); absent on the credit
    /// (non-x402) path.
    pub payment: Option<PaymentResponseHeader>,
}

/// Ingests one signed ANS-104 data item (`POST /v1/tx`).
#[instrument(skip(state, reader))]
pub async fn ingest_signed<R>(
    state: &IngestState,
    reader: R,
    content_length: Option<u64>,
    x_payment: Option<String>,
) -> Result<IngestOutcome, UploadError>
where
    R: AsyncRead + Unpin + Send,
{
    if x_payment.is_some() && content_length.is_none() {
        return Err(UploadError::InvalidDataItem(
            "Content-Length is required when X-PAYMENT is present".to_string(),
        ));
    }

    let header_limit = content_length.unwrap_or(state.config.max_single_data_item_byte_count);
    let limit = header_limit.min(state.config.max_single_data_item_byte_count);
    let mut counting = ByteCountingReader::new(reader, limit);

    let mut envelope_reader = EnvelopeReader::new(&mut counting);
    let header = envelope_reader
        .read_header()
        .await
        .map_err(|e| UploadError::InvalidDataItem(e.to_string()))?;
    drop(envelope_reader);

    let owner_public_address = header.owner_public_address();
    if state.config.blocklisted().contains(&owner_public_address) {
        return Err(UploadError::Forbidden);
    }
    let data_item_id = header.data_item_id();
    let premium_feature_type = dedicated_bundles::classify(header.signature_type, &header.tags);

    // x402 requires Content-Length up front (checked above) so payment can be
    // settled before any payload bytes are read. The credit path, lacking a
    // declared length, reads the (limit-bounded) payload first and reserves
    // against the actual byte count instead.
    let (winc, payment, payload) = if let Some(x_payment) = x_payment {
        let declared_byte_count = content_length.expect("checked above");
        let (winc, payment) =
            settle_x402(state, &header, &data_item_id, &owner_public_address, &x_payment, declared_byte_count).await?;
        let payload = match read_remaining(&mut counting).await {
            Ok(bytes) => bytes,
            Err(e) if is_byte_limit_exceeded(&e) => {
                let actual = counting.consumed();
                return Err(handle_overrun(state, &data_item_id, declared_byte_count, actual).await);
            }
            Err(e) => return Err(UploadError::InvalidDataItem(e.to_string())),
        };
        (winc, Some(payment), payload)
    } else {
        let payload = read_remaining(&mut counting)
            .await
            .map_err(|e| UploadError::TooLarge(e.to_string()))?;
        let actual_byte_count = counting.consumed();
        let winc = reserve_credit(state, &data_item_id, &owner_public_address, header.signature_type, actual_byte_count).await?;
        (winc, None, payload)
    };

    let full_bytes = {
        let mut bytes = ans104::encode_header(&header);
        bytes.extend_from_slice(&payload);
        Bytes::from(bytes)
    };

    persist_and_finish(state, header, data_item_id, owner_public_address, premium_feature_type, full_bytes, winc, payment).await
}

/// Ingests raw, unsigned bytes paid for via x402 (`POST /v1/tx/<token>`): the
/// gateway's own wallet wraps the bytes in a minimal ANS-104 envelope it
/// signs itself, recording the paying address only through the x402 payment
/// record rather than as the item's `owner`.
#[instrument(skip(state, reader))]
pub async fn ingest_raw<R>(
    state: &IngestState,
    reader: R,
    content_length: u64,
    x_payment: String,
    payer_address: &str,
) -> Result<IngestOutcome, UploadError>
where
    R: AsyncRead + Unpin + Send,
{
    let limit = content_length.min(state.config.max_single_data_item_byte_count);
    let mut counting = ByteCountingReader::new(reader, limit);
    let payload = match read_remaining(&mut counting).await {
        Ok(bytes) => bytes,
        Err(e) if is_byte_limit_exceeded(&e) => {
            return Err(UploadError::TooLarge(format!("raw upload exceeded declared {content_length} bytes")));
        }
        Err(e) => return Err(UploadError::InvalidDataItem(e.to_string())),
    };

    let owner_address = state.receipt_signer.owner_address().to_string();
    let signature = state
        .receipt_signer
        .sign(&payload)
        .map_err(|e| UploadError::Internal(e.to_string()))?;
    let owner_bytes = hex::decode(owner_address.trim_start_matches("0x")).unwrap_or_default();
    let mut padded_owner = vec![0u8; 65];
    let n = owner_bytes.len().min(65);
    padded_owner[..n].copy_from_slice(&owner_bytes[..n]);

    let header = ParsedEnvelopeHeader {
        signature_type: SignatureType::TypedEthereum,
        signature,
        owner: padded_owner,
        target: None,
        anchor: None,
        tags: Vec::new(),
        payload_data_start: 0,
    };
    let header_bytes = ans104::encode_header(&header);
    let payload_data_start = header_bytes.len() as u64;
    let header = ParsedEnvelopeHeader {
        payload_data_start,
        ..header
    };
    let data_item_id = header.data_item_id();

    let (winc, payment) = settle_x402(state, &header, &data_item_id, payer_address, &x_payment, content_length).await?;

    let mut full_bytes = header_bytes;
    full_bytes.extend_from_slice(&payload);

    persist_and_finish(
        state,
        header,
        data_item_id,
        payer_address.to_string(),
        None,
        Bytes::from(full_bytes),
        winc,
        Some(payment),
    )
    .await
}

async fn read_remaining<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(buf)
}

async fn settle_x402(
    state: &IngestState,
    header: &ParsedEnvelopeHeader,
    data_item_id: &str,
    address: &str,
    x_payment: &str,
    declared_byte_count: u64,
) -> Result<(Winston, PaymentResponseHeader), UploadError> {
    let decoded = BASE64_STANDARD
        .decode(x_payment)
        .map_err(|e| UploadError::InvalidDataItem(format!("invalid X-PAYMENT header: {e}")))?;
    let payload: PaymentPayload = serde_json::from_slice(&decoded)
        .map_err(|e| UploadError::InvalidDataItem(format!("invalid X-PAYMENT payload: {e}")))?;

    match state
        .payment_client
        .pay(
            header.signature_type,
            address,
            &payload,
            PaymentMode::default(),
            Some(data_item_id),
            Some(declared_byte_count),
        )
        .await
    {
        Ok(response) => {
            let winc = gateway_pricing::gateway_quoted_price(declared_byte_count, header.signature_type);
            let payment = PaymentResponseHeader {
                payment_id: response.payment_id,
                tx_hash: response.tx_hash,
                network: response.network,
                mode: response.mode,
            };
            Ok((winc, payment))
        }
        Err(e) => Err(UploadError::PaymentRequired.with_detail(e.to_string())),
    }
}

async fn reserve_credit(
    state: &IngestState,
    data_item_id: &str,
    owner_public_address: &str,
    signature_type: SignatureType,
    byte_count: u64,
) -> Result<Winston, UploadError> {
    let user_address_type = UserAddressType::from(signature_type);
    let response = state
        .payment_client
        .reserve_balance(data_item_id, owner_public_address, user_address_type, byte_count, signature_type)
        .await?;
    let cost: Winston = response.cost_of_data_item.parse().unwrap_or(Winston::ZERO);
    if !response.is_reserved && cost > Winston::ZERO {
        return Err(UploadError::InsufficientBalance);
    }
    Ok(cost)
}

/// Handles the mid-stream overrun abort: the body was declared (via
/// Content-Length) to be `declared` bytes but the inbound byte counter
/// crossed it, so the connection was closed the instant that happened
/// (`spec.md` §4.1, §5, §8). Finalizes the x402 payment at the actually
/// observed byte count so the fraud-tolerance classification can run, and
/// never persists a data-item row for the aborted upload.
async fn handle_overrun(state: &IngestState, data_item_id: &str, declared: u64, actual: u64) -> UploadError {
    match state.payment_client.finalize_x402(data_item_id, actual).await {
        Ok(_) => UploadError::TooLarge(format!("declared {declared} bytes, observed more than {actual}")),
        Err(e) => {
            let msg = e.to_string();
            if msg.contains("fraud_penalty") {
                UploadError::FraudPenalty { declared, actual }
            } else {
                warn!(data_item_id, error = %msg, "x402 finalize after overrun failed");
                UploadError::TooLarge(format!("declared {declared} bytes, observed more than {actual}"))
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn persist_and_finish(
    state: &IngestState,
    header: ParsedEnvelopeHeader,
    data_item_id: String,
    owner_public_address: String,
    premium_feature_type: Option<gateway_types::lifecycle::PremiumFeatureType>,
    full_bytes: Bytes,
    winc: Winston,
    payment: Option<PaymentResponseHeader>,
) -> Result<IngestOutcome, UploadError> {
    let byte_count = full_bytes.len() as u64;
    let key = object_key(&data_item_id);
    let metadata = ObjectMetadata {
        payload_data_start: Some(header.payload_data_start),
        payload_content_type: gateway_types::tags::Tag::find(&header.tags, "Content-Type").map(str::to_string),
    };

    if let Err(e) = state.object_store.put_object(&key, full_bytes.clone(), metadata.clone()).await {
        // §4.1.d: "If the object-store write fails, the reservation is released."
        // The x402 path has no analogous credit reservation to release here — its
        // payment is already settled on-chain and is reconciled later via finalize.
        if payment.is_none() && winc > Winston::ZERO {
            if let Err(cancel_err) = state.payment_client.cancel_reservation(&data_item_id).await {
                warn!(data_item_id = %data_item_id, error = %cancel_err, "failed to release balance reservation after object-store write failure");
            }
        }
        return Err(UploadError::from(e));
    }

    if let Some(backup_fs) = &state.backup_fs {
        backup_fs.write_best_effort(&data_item_id, &full_bytes).await;
    }
    if let Some(hot_cache) = &state.hot_cache {
        if full_bytes.len() <= state.config.hot_cache_max_item_bytes {
            hot_cache.put(&data_item_id, full_bytes.clone());
        }
    }

    let tip = state.gateway.current_block_height().await.unwrap_or(0);
    let deadline_height = tip as i64 + gateway_types::receipt::DEADLINE_HEIGHT_INCREMENT as i64;
    let uploaded_date = Utc::now();

    let item = NewDataItem {
        data_item_id: data_item_id.clone(),
        owner_public_address,
        byte_count: byte_count as i64,
        assessed_winston_price: winc,
        payload_data_start: header.payload_data_start as i64,
        payload_content_type: metadata.payload_content_type.clone(),
        uploaded_date,
        deadline_height,
        premium_feature_type: premium_feature_type.map(|p| p.as_str().to_string()),
        signature_type: header.signature_type.tag().to_string(),
        signature: header.signature.clone(),
        failed_bundles: Vec::new(),
    };
    state.repository.insert_new_data_item(&item).await?;

    state
        .queue
        .enqueue(
            QueueName::NewDataItem,
            &data_item_id,
            &NewDataItemPayload { data_item_id: data_item_id.clone() },
        )
        .await?;
    state
        .queue
        .enqueue(
            QueueName::OpticalPost,
            &data_item_id,
            &OpticalPostPayload { data_item_id: data_item_id.clone() },
        )
        .await?;

    let receipt = receipt::build_and_sign(
        state.receipt_signer.as_ref(),
        data_item_id.clone(),
        uploaded_date.timestamp(),
        deadline_height as u64,
        vec!["arweave.net".to_string()],
        Vec::new(),
        winc,
    )
    .map_err(|e| UploadError::Internal(e.to_string()))?;

    info!(data_item_id = %data_item_id, byte_count, "ingested data item");
    Ok(IngestOutcome { receipt, payment })
}

impl UploadError {
    /// Annotates a `PaymentRequired` rejection with the payment service's own
    /// message, without inventing a new error variant for it.
    fn with_detail(self, detail: String) -> Self {
        match self {
            UploadError::PaymentRequired => UploadError::PaymentService(detail),
            other => other,
        }
    }
}
