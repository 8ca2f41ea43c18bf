//! Wallet-backed signer for the upload receipt (`spec.md` §4.1).
//!
//! The signer itself is the gateway operator's own key, not an external
//! collaborator, so unlike `gateway_client`/`indexer` this has a concrete
//! implementation rather than only a trait. It reuses the teacher's
//! `alloy-signer-local` wallet the same way `chain::eip155` turns a raw hex
//! private key into a `PrivateKeySigner`.

use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use gateway_types::receipt::ReceiptSigner;

#[derive(Debug, thiserror::Error)]
pub enum ReceiptSignerError {
    #[error("invalid receipt signing key: {0}")]
    InvalidKey(String),
    #[error("signing failed: {0}")]
    Sign(#[from] alloy_signer::Error),
}

/// Signs receipts with a local ECDSA wallet, matching the owner-address
/// convention `gateway_types::ans104::SignatureType::owner_to_address` uses
/// for Ethereum-family signature types.
pub struct LocalWalletReceiptSigner {
    signer: PrivateKeySigner,
    owner_address: String,
}

impl LocalWalletReceiptSigner {
    /// `private_key_hex` is a `0x`-optional 32-byte hex string, following
    /// the teacher's `PrivateKeySigner::from_bytes` convention.
    pub fn from_hex(private_key_hex: &str) -> Result<Self, ReceiptSignerError> {
        let signer: PrivateKeySigner = private_key_hex
            .parse()
            .map_err(|e: alloy_signer_local::LocalSignerError| ReceiptSignerError::InvalidKey(e.to_string()))?;
        let owner_address = format!("0x{:x}", signer.address());
        Ok(Self { signer, owner_address })
    }
}

impl ReceiptSigner for LocalWalletReceiptSigner {
    type Error = ReceiptSignerError;

    fn owner_address(&self) -> &str {
        &self.owner_address
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, Self::Error> {
        let signature = self.signer.sign_message_sync(message)?;
        Ok(signature.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_address_is_0x_prefixed() {
        let signer = LocalWalletReceiptSigner::from_hex(
            "0x0123456789012345678901234567890123456789012345678901234567890a",
        )
        .unwrap();
        assert!(signer.owner_address().starts_with("0x"));
        assert_eq!(signer.owner_address().len(), 42);
    }

    #[test]
    fn sign_produces_65_byte_ecdsa_signature() {
        let signer = LocalWalletReceiptSigner::from_hex(
            "0x0123456789012345678901234567890123456789012345678901234567890a",
        )
        .unwrap();
        let sig = signer.sign(b"hello receipt").unwrap();
        assert_eq!(sig.len(), 65);
    }
}
