//! x402 / EIP-3009 wire types and payment ledger rows (`spec.md` §4.2, §6).
//!
//! These are the shapes that travel over HTTP and sit in the
//! `payment_service` database; the EIP-712 domain construction and signature
//! recovery that operate on [`ExactEvmPayloadAuthorization`] live in
//! `gateway-payment::x402` where `alloy` is available.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Winston;

pub const X402_VERSION: u32 = 1;
pub const SCHEME_EXACT: &str = "exact";

/// Default configuration (`spec.md` §6).
pub const DEFAULT_PRICING_BUFFER_PERCENT: u8 = 15;
pub const DEFAULT_FRAUD_TOLERANCE_PERCENT: u8 = 5;
pub const DEFAULT_PAYMENT_TIMEOUT_MS: u64 = 300_000;
pub const MIN_USDC_ATOMIC_UNITS: u64 = 1_000;
/// One hour, in seconds: x402 reservation lifetime (`spec.md` §3).
pub const X402_RESERVATION_TTL_SECS: i64 = 3_600;

/// One entry of the `402 Payment Required` `accepts[]` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: String,
    pub max_amount_required: String,
    pub resource: String,
    pub description: String,
    pub mime_type: String,
    pub pay_to: String,
    pub max_timeout_seconds: u64,
    pub asset: String,
    pub extra: PaymentRequirementsExtra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequirementsExtra {
    pub name: String,
    pub version: String,
}

/// The full `402` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub x402_version: u32,
    pub accepts: Vec<PaymentRequirements>,
}

/// The decoded `X-PAYMENT` header: an EIP-3009 authorization plus its
/// EIP-712 signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: u32,
    pub scheme: String,
    pub network: String,
    pub payload: ExactEvmPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayload {
    /// `0x`-prefixed hex-encoded signature bytes.
    pub signature: String,
    pub authorization: ExactEvmPayloadAuthorization,
}

/// EIP-3009 `TransferWithAuthorization` fields. `valid_after`/`valid_before`
/// are strings on the wire per `spec.md` §4.2 ("Strings required for
/// `validAfter`/`validBefore`").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactEvmPayloadAuthorization {
    pub from: String,
    pub to: String,
    pub value: String,
    pub valid_after: String,
    pub valid_before: String,
    pub nonce: String,
}

/// `X-Payment-Response` header body, base64-JSON encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponseHeader {
    pub payment_id: Uuid,
    pub tx_hash: String,
    pub network: String,
    pub mode: PaymentMode,
}

/// Facilitator `/settle` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitatorSettleRequest {
    pub x402_version: u32,
    pub payment_payload: PaymentPayload,
    pub payment_requirements: PaymentRequirements,
}

pub type FacilitatorVerifyRequest = FacilitatorSettleRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitatorSettleResponse {
    pub success: bool,
    pub tx_hash: Option<String>,
    pub error_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitatorVerifyResponse {
    pub is_valid: bool,
    pub invalid_reason: Option<String>,
}

/// The three payment modes (`spec.md` §4.2).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    /// Exactly pays for `dataItemId`; no credit delta.
    Payg,
    /// Credits the entire paid amount to the user balance; no reservation.
    Topup,
    /// Reserves the quoted amount for `dataItemId`; excess is credited.
    Hybrid,
}

impl Default for PaymentMode {
    fn default() -> Self {
        PaymentMode::Hybrid
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum X402PaymentStatus {
    Pending,
    Confirmed,
    FraudPenalty,
    Refunded,
}

impl X402PaymentStatus {
    /// `spec.md` §3: "once `status in {confirmed, fraud_penalty, refunded}`
    /// row is immutable."
    pub fn is_terminal(self) -> bool {
        !matches!(self, X402PaymentStatus::Pending)
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct X402Payment {
    pub id: Uuid,
    pub user_address: String,
    pub user_address_type: String,
    pub tx_hash: String,
    pub network: String,
    pub token_address: String,
    pub usdc_amount: String,
    pub winc_amount: Winston,
    pub mode: String,
    pub data_item_id: Option<String>,
    pub declared_byte_count: Option<i64>,
    pub actual_byte_count: Option<i64>,
    pub payer_address: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl X402Payment {
    pub fn status(&self) -> Option<X402PaymentStatus> {
        match self.status.as_str() {
            "pending" => Some(X402PaymentStatus::Pending),
            "confirmed" => Some(X402PaymentStatus::Confirmed),
            "fraud_penalty" => Some(X402PaymentStatus::FraudPenalty),
            "refunded" => Some(X402PaymentStatus::Refunded),
            _ => None,
        }
    }
}

/// `(dataItemId PK, paymentId FK, expiresAt)`, auto-expires after one hour.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct X402Reservation {
    pub data_item_id: String,
    pub payment_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Finalization outcome (`spec.md` §4.2 table).
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FinalizeOutcome {
    Confirmed,
    Refunded { refund_winc: Winston },
    FraudPenalty { declared: u64, actual: u64 },
}

/// Classifies the actual-vs-declared byte count comparison per the
/// finalization table in `spec.md` §4.2.
pub fn classify_finalization(
    declared: u64,
    actual: u64,
    tolerance_percent: u8,
    quoted_cost: Winston,
    actual_cost: Winston,
) -> FinalizeOutcome {
    let tolerance = (declared as u128 * tolerance_percent as u128) / 100;
    if actual <= declared {
        if actual == declared {
            return FinalizeOutcome::Confirmed;
        }
        let refund = quoted_cost.saturating_sub(actual_cost);
        return FinalizeOutcome::Refunded { refund_winc: refund };
    }
    let over_by = actual as u128 - declared as u128;
    if over_by <= tolerance {
        FinalizeOutcome::Confirmed
    } else {
        FinalizeOutcome::FraudPenalty { declared, actual }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_confirms() {
        let outcome = classify_finalization(1000, 1000, 5, Winston::new(10), Winston::new(10));
        assert_eq!(outcome, FinalizeOutcome::Confirmed);
    }

    #[test]
    fn smaller_actual_refunds_difference() {
        let outcome = classify_finalization(1000, 900, 5, Winston::new(100), Winston::new(90));
        assert_eq!(
            outcome,
            FinalizeOutcome::Refunded {
                refund_winc: Winston::new(10)
            }
        );
    }

    #[test]
    fn within_tolerance_overage_confirms() {
        let outcome = classify_finalization(1000, 1040, 5, Winston::new(10), Winston::new(10));
        assert_eq!(outcome, FinalizeOutcome::Confirmed);
    }

    #[test]
    fn beyond_tolerance_overage_is_fraud() {
        let outcome = classify_finalization(1000, 1060, 5, Winston::new(10), Winston::new(10));
        assert_eq!(
            outcome,
            FinalizeOutcome::FraudPenalty {
                declared: 1000,
                actual: 1060
            }
        );
    }
}
