//! EIP-712 domain construction and ERC-3009 signature recovery.
//!
//! Generalizes the teacher's `x402-chain-eip155::v1_eip155_exact` typed-data
//! handling: the same `sol!`-generated `TransferWithAuthorization` struct and
//! `eip712_domain!` construction, but used only to *recover* the signer
//! (`spec.md` §4.2's `verifyPayment`) rather than also to sign client-side.

use alloy_primitives::{Address, FixedBytes, Signature, U256};
use alloy_sol_types::{SolStruct, eip712_domain};
use gateway_types::x402::ExactEvmPayloadAuthorization;

use super::EngineError;

alloy_sol_types::sol! {
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
}

/// Parsed, chain-typed form of [`ExactEvmPayloadAuthorization`]. The wire
/// type keeps every field a `String` (`spec.md` §4.2: "strings required for
/// validAfter/validBefore"); this is the typed view used for verification.
pub struct ParsedAuthorization {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub valid_after: U256,
    pub valid_before: U256,
    pub nonce: FixedBytes<32>,
}

impl ParsedAuthorization {
    pub fn parse(auth: &ExactEvmPayloadAuthorization) -> Result<Self, EngineError> {
        let from = auth
            .from
            .parse::<Address>()
            .map_err(|e| EngineError::Malformed(format!("from: {e}")))?;
        let to = auth
            .to
            .parse::<Address>()
            .map_err(|e| EngineError::Malformed(format!("to: {e}")))?;
        let value = auth
            .value
            .parse::<U256>()
            .map_err(|e| EngineError::Malformed(format!("value: {e}")))?;
        let valid_after = auth
            .valid_after
            .parse::<U256>()
            .map_err(|e| EngineError::Malformed(format!("validAfter: {e}")))?;
        let valid_before = auth
            .valid_before
            .parse::<U256>()
            .map_err(|e| EngineError::Malformed(format!("validBefore: {e}")))?;
        let nonce_bytes = hex::decode(auth.nonce.trim_start_matches("0x"))
            .map_err(|e| EngineError::Malformed(format!("nonce: {e}")))?;
        if nonce_bytes.len() != 32 {
            return Err(EngineError::Malformed("nonce must be 32 bytes".to_string()));
        }
        Ok(Self {
            from,
            to,
            value,
            valid_after,
            valid_before,
            nonce: FixedBytes::from_slice(&nonce_bytes),
        })
    }
}

/// Builds the EIP-712 domain `{name, version, chainId, verifyingContract=asset}`
/// (`spec.md` §4.2, §9: "the facilitator's recommended `extra.version` is used").
pub fn domain(name: &str, version: &str, chain_id: u64, verifying_contract: Address) -> alloy_sol_types::Eip712Domain {
    eip712_domain! {
        name: name.to_string(),
        version: version.to_string(),
        chain_id: chain_id,
        verifying_contract: verifying_contract,
    }
}

/// Recovers the signer address from the EIP-3009 signature over
/// `TransferWithAuthorization`. Returns the recovered address so the caller
/// can compare it against `authorization.from` (`spec.md` §4.2).
pub fn recover_signer(
    auth: &ParsedAuthorization,
    domain: &alloy_sol_types::Eip712Domain,
    signature_hex: &str,
) -> Result<Address, EngineError> {
    let transfer = TransferWithAuthorization {
        from: auth.from,
        to: auth.to,
        value: auth.value,
        validAfter: auth.valid_after,
        validBefore: auth.valid_before,
        nonce: auth.nonce,
    };
    let signing_hash = transfer.eip712_signing_hash(domain);

    let sig_bytes = hex::decode(signature_hex.trim_start_matches("0x"))
        .map_err(|e| EngineError::Malformed(format!("signature: {e}")))?;
    let signature = Signature::try_from(sig_bytes.as_slice())
        .map_err(|e| EngineError::Malformed(format!("signature: {e}")))?;

    signature
        .recover_address_from_prehash(&signing_hash)
        .map_err(|e| EngineError::VerificationFailed(format!("signature recovery failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_malformed_nonce() {
        let auth = ExactEvmPayloadAuthorization {
            from: "0x0000000000000000000000000000000000000001".to_string(),
            to: "0x0000000000000000000000000000000000000002".to_string(),
            value: "1000".to_string(),
            valid_after: "0".to_string(),
            valid_before: "9999999999".to_string(),
            nonce: "0xdead".to_string(),
        };
        assert!(ParsedAuthorization::parse(&auth).is_err());
    }
}
