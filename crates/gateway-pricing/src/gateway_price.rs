//! Byte-count-to-Winston gateway price (`spec.md` §4.2 "gatewayQuotedPrice",
//! §4.4 "bytesCostInWinc"). The actual AR network fee schedule is out of
//! scope (`spec.md` Non-goals); this approximates it with a flat
//! per-byte rate plus the envelope overhead for the item's signature type,
//! which is the same shape the credit ledger and the x402 engine both quote
//! against.

use gateway_types::ans104::SignatureType;
use gateway_types::money::Winston;

/// Flat approximation of the current AR network storage rate, in winc per byte.
const WINC_PER_BYTE: u128 = 500;

/// Fixed per-item overhead charged regardless of signature type, covering the
/// envelope framing bytes that aren't part of the caller's declared payload
/// size (tags, flags, anchor).
const BASE_OVERHEAD_WINC: u128 = 50_000;

/// The ANS-104 signature + owner bytes are part of what gets bundled and
/// posted on-chain, so they're priced too.
pub fn signature_overhead_bytes(sig_type: SignatureType) -> u64 {
    let info = sig_type.info();
    (info.signature_len + info.owner_len) as u64
}

/// The gateway's own quoted price for storing `byte_count` bytes of payload
/// signed with `sig_type`, before any x402 pricing buffer is applied.
pub fn gateway_quoted_price(byte_count: u64, sig_type: SignatureType) -> Winston {
    let billable_bytes = byte_count + signature_overhead_bytes(sig_type);
    Winston::new(BASE_OVERHEAD_WINC + billable_bytes as u128 * WINC_PER_BYTE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_scales_with_byte_count() {
        let small = gateway_quoted_price(1_000, SignatureType::Arweave);
        let large = gateway_quoted_price(10_000, SignatureType::Arweave);
        assert!(large.as_u128() > small.as_u128());
    }

    #[test]
    fn signature_type_changes_overhead() {
        let arweave = gateway_quoted_price(0, SignatureType::Arweave);
        let ethereum = gateway_quoted_price(0, SignatureType::Ethereum);
        assert!(arweave.as_u128() > ethereum.as_u128());
    }

    #[test]
    fn overhead_bytes_match_signature_and_owner_lengths() {
        assert_eq!(signature_overhead_bytes(SignatureType::Ethereum), 65 + 65);
    }
}
