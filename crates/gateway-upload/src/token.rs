//! Parses the `<currency>-<network>` token the upload-service's raw-ingest
//! and price-quote routes are addressed by (`spec.md` §6), e.g.
//! `usdc-base-sepolia`. The network name itself may contain hyphens, so the
//! split happens on the first one only; `usdc` is the only currency the x402
//! engine prices against today.

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token must be of the form <currency>-<network>, got {0:?}")]
    Malformed(String),
    #[error("unsupported currency {0:?}, only usdc is accepted")]
    UnsupportedCurrency(String),
}

pub struct PaymentToken {
    pub currency: String,
    pub network: String,
}

pub fn parse(token: &str) -> Result<PaymentToken, TokenError> {
    let (currency, network) = token.split_once('-').ok_or_else(|| TokenError::Malformed(token.to_string()))?;
    if network.is_empty() {
        return Err(TokenError::Malformed(token.to_string()));
    }
    if !currency.eq_ignore_ascii_case("usdc") {
        return Err(TokenError::UnsupportedCurrency(currency.to_string()));
    }
    Ok(PaymentToken {
        currency: currency.to_ascii_lowercase(),
        network: network.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_the_first_hyphen_only() {
        let token = parse("usdc-base-sepolia").unwrap();
        assert_eq!(token.currency, "usdc");
        assert_eq!(token.network, "base-sepolia");
    }

    #[test]
    fn rejects_a_token_with_no_hyphen() {
        assert!(parse("usdcbase").is_err());
    }

    #[test]
    fn rejects_a_non_usdc_currency() {
        assert!(parse("eth-base").is_err());
    }
}
