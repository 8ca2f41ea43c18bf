//! Id and address derivation helpers.
//!
//! `data_item_id` implements the invariant in `spec.md` §6: the 43-char
//! url-safe-base64 id of a data item is `base64url(sha256(signature))`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// base64url (no padding) encoding, matching the 43-char Arweave id convention.
pub fn base64url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn base64url_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(s)
}

/// `id = base64url(sha256(signature))`.
pub fn data_item_id(signature: &[u8]) -> String {
    base64url(&Sha256::digest(signature))
}

/// Derives a checksummed `0x`-prefixed Ethereum address from an uncompressed
/// secp256k1 public key (65 bytes, `0x04 || X(32) || Y(32)`), per the standard
/// `keccak256(pubkey[1..])[12..]` Ethereum account-address scheme.
pub fn eth_address_from_uncompressed_pubkey(owner: &[u8]) -> String {
    let key_bytes = if owner.len() == 65 { &owner[1..] } else { owner };
    let hash = keccak256(key_bytes);
    format!("0x{}", hex::encode(&hash[12..]))
}

fn keccak256(data: &[u8]) -> [u8; 32] {
    use sha3::{Digest as _, Keccak256};
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_item_id_is_43_chars_for_64_byte_signature() {
        let signature = [7u8; 64];
        let id = data_item_id(&signature);
        assert_eq!(id.len(), 43);
    }

    #[test]
    fn eth_address_has_0x_prefix_and_40_hex_chars() {
        let owner = [4u8; 65];
        let address = eth_address_from_uncompressed_pubkey(&owner);
        assert!(address.starts_with("0x"));
        assert_eq!(address.len(), 42);
    }
}
