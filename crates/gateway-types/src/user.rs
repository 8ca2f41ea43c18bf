//! Credit account rows (`spec.md` §3, §4.4): user balances, ledger entries,
//! and balance reservations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ans104::SignatureType;
use crate::money::Winston;

/// How a `userAddress` was derived — mirrors [`SignatureType`] but is stored
/// independently since a user row outlives any single data item.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UserAddressType {
    Arweave,
    Ethereum,
    Solana,
    Kyve,
    Aptos,
}

impl From<SignatureType> for UserAddressType {
    fn from(sig_type: SignatureType) -> Self {
        match sig_type {
            SignatureType::Arweave => UserAddressType::Arweave,
            SignatureType::Ethereum | SignatureType::TypedEthereum => UserAddressType::Ethereum,
            SignatureType::Solana => UserAddressType::Solana,
            SignatureType::Kyve => UserAddressType::Kyve,
            SignatureType::Ed25519 | SignatureType::InjectedAptos | SignatureType::MultiAptos => {
                UserAddressType::Aptos
            }
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct User {
    pub user_address: String,
    pub user_address_type: String,
    pub winston_credit_balance: Winston,
    pub promotional_info: serde_json::Value,
}

/// Why a balance changed; captured on every ledger row so the history is
/// auditable (`spec.md` §3 invariant: "all changes are captured as ledger
/// rows with a `changeReason` and monotonic `changeId`").
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    Reservation,
    ReservationRefund,
    FinalizeReservation,
    X402Topup,
    X402HybridExcess,
    X402Refund,
    AdminCredit,
    AdminDebit,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct BalanceLedgerEntry {
    pub change_id: i64,
    pub user_address: String,
    pub delta: String,
    pub change_reason: String,
    pub created_at: DateTime<Utc>,
}

/// Created when a data item is accepted and balance allows; destroyed on
/// finalize (consume) or cancellation (credit back).
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct BalanceReservation {
    pub data_item_id: String,
    pub user_address: String,
    pub reserved_winc: Winston,
    pub network_fee: Winston,
    pub service_fee: Winston,
    pub signature_type: String,
    pub byte_count: i64,
    pub reserved_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ethereum_and_typed_ethereum_share_address_type() {
        assert_eq!(
            UserAddressType::from(SignatureType::Ethereum),
            UserAddressType::from(SignatureType::TypedEthereum)
        );
    }
}
