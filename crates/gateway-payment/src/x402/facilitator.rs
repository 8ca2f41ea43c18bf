//! Facilitator HTTP client (`spec.md` §4.2, §9), generalizing the teacher's
//! `x402-axum::facilitator_client::FacilitatorClient` to also attach a CDP
//! bearer JWT when an API key is configured.

use std::time::Duration;

use gateway_types::x402::{
    FacilitatorSettleRequest, FacilitatorSettleResponse, FacilitatorVerifyRequest, FacilitatorVerifyResponse,
};
use reqwest::Client;
use url::Url;

use super::cdp_jwt::build_cdp_jwt;

/// Verification calls time out after 10s, settlement after 30s (`spec.md` §5).
const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);
const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum FacilitatorError {
    #[error("facilitator URL error: {0}")]
    Url(#[from] url::ParseError),
    #[error("facilitator request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("CDP JWT construction failed: {0}")]
    Jwt(#[from] super::cdp_jwt::CdpJwtError),
}

#[derive(Clone)]
pub struct CdpCredentials {
    pub api_key_id: String,
    pub api_key_secret: String,
}

#[derive(Clone)]
pub struct FacilitatorClient {
    client: Client,
    verify_url: Url,
    settle_url: Url,
    cdp: Option<CdpCredentials>,
}

impl FacilitatorClient {
    pub fn new(base_url: &str, cdp: Option<CdpCredentials>) -> Result<Self, FacilitatorError> {
        let mut normalized = base_url.trim_end_matches('/').to_string();
        normalized.push('/');
        let base = Url::parse(&normalized)?;
        Ok(Self {
            client: Client::new(),
            verify_url: base.join("verify")?,
            settle_url: base.join("settle")?,
            cdp,
        })
    }

    fn bearer_jwt(&self) -> Result<Option<String>, FacilitatorError> {
        match &self.cdp {
            None => Ok(None),
            Some(creds) => {
                let now = chrono::Utc::now().timestamp();
                Ok(Some(build_cdp_jwt(&creds.api_key_id, &creds.api_key_secret, now)?))
            }
        }
    }

    /// `POST {facilitator}/verify` — a second, facilitator-side verification
    /// layered on top of the local EIP-712 check (`spec.md` §4.2).
    pub async fn verify(
        &self,
        request: &FacilitatorVerifyRequest,
    ) -> Result<FacilitatorVerifyResponse, FacilitatorError> {
        let mut req = self.client.post(self.verify_url.clone()).json(request).timeout(VERIFY_TIMEOUT);
        if let Some(jwt) = self.bearer_jwt()? {
            req = req.bearer_auth(jwt);
        }
        Ok(req.send().await?.error_for_status()?.json().await?)
    }

    /// `POST {facilitator}/settle` (`spec.md` §4.2). The presence of a
    /// transaction hash in the response is the success condition; local
    /// (non-facilitated) settlement is not implemented.
    pub async fn settle(
        &self,
        request: &FacilitatorSettleRequest,
    ) -> Result<FacilitatorSettleResponse, FacilitatorError> {
        let mut req = self.client.post(self.settle_url.clone()).json(request).timeout(SETTLE_TIMEOUT);
        if let Some(jwt) = self.bearer_jwt()? {
            req = req.bearer_auth(jwt);
        }
        Ok(req.send().await?.error_for_status()?.json().await?)
    }
}
