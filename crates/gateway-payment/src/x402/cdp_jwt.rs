//! CDP-style bearer JWT construction (`spec.md` §4.2, §9).
//!
//! No precedent for this exists in the teacher pack — Coinbase's CDP
//! facilitator API key scheme is authored from the specification text: an
//! ES256 JWT with `kid`/`sub` set to the configured API key id, a 60-second
//! validity window, bound to `aud = ["cdp_service"]`. The private key may
//! arrive raw base64 or PEM-wrapped; both are handled.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum CdpJwtError {
    #[error("invalid CDP API key secret: {0}")]
    InvalidKey(String),
    #[error("failed to encode JWT: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),
}

#[derive(Serialize)]
struct CdpClaims<'a> {
    sub: &'a str,
    iss: &'static str,
    aud: [&'static str; 1],
    nbf: i64,
    exp: i64,
}

/// Builds the ES256 bearer JWT attached to every facilitator `/verify` and
/// `/settle` request when a CDP API key is configured (`spec.md` §9):
/// `kid = sub = <API key id>`, `iss = "cdp"`, `aud = ["cdp_service"]`,
/// `nbf = now`, `exp = now + 60`.
pub fn build_cdp_jwt(api_key_id: &str, api_key_secret: &str, now_unix: i64) -> Result<String, CdpJwtError> {
    let encoding_key = parse_es256_key(api_key_secret)?;

    let mut header = Header::new(Algorithm::ES256);
    header.kid = Some(api_key_id.to_string());

    let claims = CdpClaims {
        sub: api_key_id,
        iss: "cdp",
        aud: ["cdp_service"],
        nbf: now_unix,
        exp: now_unix + 60,
    };

    Ok(encode(&header, &claims, &encoding_key)?)
}

/// Accepts either a PEM-wrapped EC private key or a raw base64-encoded one.
fn parse_es256_key(secret: &str) -> Result<EncodingKey, CdpJwtError> {
    let trimmed = secret.trim();
    if trimmed.contains("BEGIN") {
        return EncodingKey::from_ec_pem(trimmed.as_bytes())
            .map_err(|e| CdpJwtError::InvalidKey(e.to_string()));
    }
    let der = STANDARD
        .decode(trimmed)
        .map_err(|e| CdpJwtError::InvalidKey(format!("base64 decode: {e}")))?;
    EncodingKey::from_ec_der(&der).map_err(|e| CdpJwtError::InvalidKey(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_garbage_secret() {
        let err = build_cdp_jwt("key-id", "not a valid key", 1_700_000_000);
        assert!(err.is_err());
    }
}
