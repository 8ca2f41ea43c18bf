//! Upload receipts (`spec.md` §4.1).
//!
//! On a successful ingest the client gets back an Arweave-signed JSON receipt
//! binding the data item id, the deadline height, and the charged amount, so
//! the client can verify the receipt post-hoc without trusting the gateway.

use serde::{Deserialize, Serialize};

use crate::money::Winston;

pub const RECEIPT_VERSION: &str = "0.2.0";

/// Increment added to the current block height to produce `deadlineHeight`
/// at ingest time (`spec.md` §9 glossary).
pub const DEADLINE_HEIGHT_INCREMENT: u64 = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub id: String,
    pub timestamp: i64,
    pub version: String,
    pub deadline_height: u64,
    pub data_caches: Vec<String>,
    pub fast_finality_indexes: Vec<String>,
    pub winc: Winston,
    pub owner: String,
    /// base64url signature over the canonical JSON of every field above.
    pub signature: String,
}

/// The bytes a [`Receipt`] signature is computed over: every field except
/// `signature` itself, serialized deterministically.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignableReceipt<'a> {
    id: &'a str,
    timestamp: i64,
    version: &'a str,
    deadline_height: u64,
    data_caches: &'a [String],
    fast_finality_indexes: &'a [String],
    winc: Winston,
    owner: &'a str,
}

/// Signs receipts with the gateway operator's wallet.
///
/// The actual wallet/keypair management and chain-specific signing algorithm
/// are an external collaborator (`spec.md` §6): this trait is the seam a
/// concrete Arweave JWK signer plugs into.
pub trait ReceiptSigner {
    type Error: std::error::Error + Send + Sync + 'static;

    fn owner_address(&self) -> &str;

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, Self::Error>;
}

pub fn canonical_signable_bytes(receipt_without_signature: &Receipt) -> Vec<u8> {
    let signable = SignableReceipt {
        id: &receipt_without_signature.id,
        timestamp: receipt_without_signature.timestamp,
        version: &receipt_without_signature.version,
        deadline_height: receipt_without_signature.deadline_height,
        data_caches: &receipt_without_signature.data_caches,
        fast_finality_indexes: &receipt_without_signature.fast_finality_indexes,
        winc: receipt_without_signature.winc,
        owner: &receipt_without_signature.owner,
    };
    serde_json::to_vec(&signable).expect("SignableReceipt always serializes")
}

pub fn build_and_sign<S: ReceiptSigner>(
    signer: &S,
    id: String,
    timestamp: i64,
    deadline_height: u64,
    data_caches: Vec<String>,
    fast_finality_indexes: Vec<String>,
    winc: Winston,
) -> Result<Receipt, S::Error> {
    let mut receipt = Receipt {
        id,
        timestamp,
        version: RECEIPT_VERSION.to_string(),
        deadline_height,
        data_caches,
        fast_finality_indexes,
        winc,
        owner: signer.owner_address().to_string(),
        signature: String::new(),
    };
    let message = canonical_signable_bytes(&receipt);
    let signature = signer.sign(&message)?;
    receipt.signature = crate::ids::base64url(&signature);
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    struct FakeSigner;

    impl ReceiptSigner for FakeSigner {
        type Error = Infallible;

        fn owner_address(&self) -> &str {
            "test-owner"
        }

        fn sign(&self, message: &[u8]) -> Result<Vec<u8>, Self::Error> {
            Ok(message.iter().map(|b| b.wrapping_add(1)).collect())
        }
    }

    #[test]
    fn build_and_sign_fills_version_and_owner() {
        let receipt = build_and_sign(
            &FakeSigner,
            "abc".into(),
            1_700_000_000,
            1234,
            vec![],
            vec![],
            Winston::ZERO,
        )
        .unwrap();
        assert_eq!(receipt.version, RECEIPT_VERSION);
        assert_eq!(receipt.owner, "test-owner");
        assert!(!receipt.signature.is_empty());
    }
}
