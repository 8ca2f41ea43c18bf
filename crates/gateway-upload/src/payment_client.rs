//! HTTP client for the payment-service's internal surface (`spec.md` §5,
//! §6): balance pre-flight checks, reservations, and reservation
//! finalize/cancel, all bearer-secret protected the way the teacher's
//! `FacilitatorClient` protects its own service-to-service calls.

use std::time::Duration;

use gateway_types::ans104::SignatureType;
use gateway_types::user::UserAddressType;
use gateway_types::x402::{PaymentMode, PaymentPayload, PriceQuote};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum PaymentClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("payment-service rejected the request: {0}")]
    Rejected(String),
}

#[derive(Clone)]
pub struct PaymentClient {
    client: reqwest::Client,
    base_url: String,
    bearer_secret: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckBalanceRequest<'a> {
    user_address: &'a str,
    user_address_type: UserAddressType,
    byte_count: u64,
    signature_type: SignatureType,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CheckBalanceResponse {
    pub sufficient: bool,
    pub bytes_cost_in_winc: String,
    pub user_balance_in_winc: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReserveBalanceRequest<'a> {
    data_item_id: &'a str,
    user_address: &'a str,
    user_address_type: UserAddressType,
    byte_count: u64,
    signature_type: SignatureType,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ReserveBalanceResponse {
    pub is_reserved: bool,
    pub cost_of_data_item: String,
    pub wallet_exists: bool,
}

#[derive(Serialize, Eq, PartialEq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeReservationAction {
    Consume,
    Cancel,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FinalizeReservationRequest<'a> {
    data_item_id: &'a str,
    action: FinalizeReservationAction,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct X402FinalizeRequest<'a> {
    data_item_id: &'a str,
    actual_byte_count: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum X402FinalizeResponse {
    Confirmed,
    Refunded { refund_winc: String },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PayRequest<'a> {
    mode: PaymentMode,
    data_item_id: Option<&'a str>,
    declared_byte_count: Option<u64>,
    #[serde(flatten)]
    payload: &'a PaymentPayload,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PayResponse {
    pub payment_id: Uuid,
    pub tx_hash: String,
    pub network: String,
    pub mode: PaymentMode,
}

impl PaymentClient {
    pub fn new(base_url: impl Into<String>, bearer_secret: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            bearer_secret: bearer_secret.into(),
        }
    }

    async fn post_internal<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, PaymentClientError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.bearer_secret)
            .timeout(Duration::from_secs(10))
            .json(body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentClientError::Rejected(format!("{status}: {body}")));
        }
        Ok(response.json().await?)
    }

    pub async fn check_balance(
        &self,
        user_address: &str,
        user_address_type: UserAddressType,
        byte_count: u64,
        signature_type: SignatureType,
    ) -> Result<CheckBalanceResponse, PaymentClientError> {
        self.post_internal(
            "/v1/check-balance",
            &CheckBalanceRequest {
                user_address,
                user_address_type,
                byte_count,
                signature_type,
            },
        )
        .await
    }

    pub async fn reserve_balance(
        &self,
        data_item_id: &str,
        user_address: &str,
        user_address_type: UserAddressType,
        byte_count: u64,
        signature_type: SignatureType,
    ) -> Result<ReserveBalanceResponse, PaymentClientError> {
        self.post_internal(
            "/v1/reserve-balance",
            &ReserveBalanceRequest {
                data_item_id,
                user_address,
                user_address_type,
                byte_count,
                signature_type,
            },
        )
        .await
    }

    async fn finalize_reservation(
        &self,
        data_item_id: &str,
        action: FinalizeReservationAction,
    ) -> Result<(), PaymentClientError> {
        let response = self
            .client
            .post(format!("{}/v1/finalize-reservation", self.base_url))
            .bearer_auth(&self.bearer_secret)
            .timeout(Duration::from_secs(10))
            .json(&FinalizeReservationRequest { data_item_id, action })
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(PaymentClientError::Rejected(status.to_string()));
        }
        Ok(())
    }

    pub async fn consume_reservation(&self, data_item_id: &str) -> Result<(), PaymentClientError> {
        self.finalize_reservation(data_item_id, FinalizeReservationAction::Consume).await
    }

    pub async fn cancel_reservation(&self, data_item_id: &str) -> Result<(), PaymentClientError> {
        self.finalize_reservation(data_item_id, FinalizeReservationAction::Cancel).await
    }

    /// Fetches the payment-service's `accepts[]` quote for `byteCount` bytes
    /// under `sigType`/`address` (`spec.md` §4.2, §6), used by the
    /// upload-service's own `/v1/price/x402/*` routes to price a single
    /// network before any payload has been read.
    pub async fn price_quote(
        &self,
        sig_type: SignatureType,
        address: &str,
        byte_count: u64,
    ) -> Result<PriceQuote, PaymentClientError> {
        let sig_type_path = format!("{sig_type:?}").to_lowercase();
        let response = self
            .client
            .get(format!("{}/v1/x402/price/{sig_type_path}/{address}", self.base_url))
            .query(&[("bytes", byte_count)])
            .timeout(Duration::from_secs(10))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentClientError::Rejected(format!("{status}: {body}")));
        }
        Ok(response.json().await?)
    }

    /// Submits an `X-PAYMENT` authorization for settlement against
    /// `sigType`/`address`, the path-addressed x402 endpoint (`spec.md`
    /// §4.2, §6). `data_item_id`/`declared_byte_count` are present for
    /// `payg`/`hybrid` mode and absent for a plain `topup`.
    pub async fn pay(
        &self,
        sig_type: SignatureType,
        address: &str,
        payload: &PaymentPayload,
        mode: PaymentMode,
        data_item_id: Option<&str>,
        declared_byte_count: Option<u64>,
    ) -> Result<PayResponse, PaymentClientError> {
        let sig_type_path = format!("{sig_type:?}").to_lowercase();
        self.post_internal(
            &format!("/v1/x402/payment/{sig_type_path}/{address}"),
            &PayRequest {
                mode,
                data_item_id,
                declared_byte_count,
                payload,
            },
        )
        .await
    }

    /// Finalizes an x402 payment at its actual byte count once the bundle
    /// containing it has posted (`spec.md` §4.2, §8).
    pub async fn finalize_x402(
        &self,
        data_item_id: &str,
        actual_byte_count: u64,
    ) -> Result<X402FinalizeResponse, PaymentClientError> {
        self.post_internal(
            "/v1/x402/finalize",
            &X402FinalizeRequest {
                data_item_id,
                actual_byte_count,
            },
        )
        .await
    }
}
