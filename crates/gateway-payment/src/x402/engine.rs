//! The x402 payment engine (`spec.md` §4.2): pricing quotes, local EIP-712
//! verification plus delegated facilitator verification, settlement, the
//! three payment modes, and post-upload finalization.
//!
//! Generalizes the teacher's `scheme::v1_eip155_exact` (built to verify and
//! settle exactly one transfer against one resource) by adding the
//! pricing-quote and ledger-reconciliation steps the teacher — a pure
//! facilitator — has no reason to have.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use gateway_pricing::PriceOracle;
use gateway_types::ans104::SignatureType;
use gateway_types::money::Winston;
use gateway_types::user::{ChangeReason, UserAddressType};
use gateway_types::x402::{
    self, FacilitatorSettleRequest, PaymentMode, PaymentPayload, PaymentRequirements, PaymentRequirementsExtra,
    PriceQuote, X402Payment, X402PaymentStatus,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::{Config, NetworkConfig};
use crate::ledger::Ledger;

use super::eip712::{self, ParsedAuthorization};
use super::facilitator::{CdpCredentials, FacilitatorClient};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("malformed payment payload: {0}")]
    Malformed(String),
    #[error("payment verification failed: {0}")]
    VerificationFailed(String),
    #[error("no network configured matching the request")]
    NoMatchingNetwork,
    #[error("facilitator error: {0}")]
    Facilitator(#[from] super::facilitator::FacilitatorError),
    #[error("settlement did not return a transaction hash")]
    SettlementIncomplete,
    #[error("duplicate transaction hash")]
    DuplicateTxHash,
    #[error("pricing oracle error: {0}")]
    Pricing(#[from] gateway_pricing::PricingError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("ledger error: {0}")]
    Ledger(#[from] crate::ledger::LedgerError),
    #[error("no reservation found for {0}")]
    ReservationNotFound(String),
    #[error("fraud detected: declared {declared}, actual {actual}")]
    FraudPenalty { declared: u64, actual: u64 },
}

pub struct Engine {
    pool: PgPool,
    ledger: Ledger,
    oracle: Arc<dyn PriceOracle>,
    networks: HashMap<String, NetworkConfig>,
    facilitators: HashMap<String, FacilitatorClient>,
    pricing_buffer_percent: u8,
    fraud_tolerance_percent: u8,
    payment_timeout_ms: u64,
}

impl Engine {
    pub fn new(pool: PgPool, config: &Config, oracle: Arc<dyn PriceOracle>) -> Result<Self, EngineError> {
        let networks = config
            .networks()
            .map_err(|e| EngineError::Malformed(e.to_string()))?
            .into_iter()
            .map(|n| (n.name.clone(), n))
            .collect::<HashMap<_, _>>();

        let cdp = match (&config.cdp_api_key_id, &config.cdp_api_key_secret) {
            (Some(id), Some(secret)) => Some(CdpCredentials {
                api_key_id: id.clone(),
                api_key_secret: secret.clone(),
            }),
            _ => None,
        };

        let facilitators = networks
            .values()
            .map(|n| Ok((n.name.clone(), FacilitatorClient::new(&n.facilitator_url, cdp.clone())?)))
            .collect::<Result<HashMap<_, _>, EngineError>>()?;

        Ok(Self {
            ledger: Ledger::new(pool.clone()),
            pool,
            oracle,
            networks,
            facilitators,
            pricing_buffer_percent: config.x402_pricing_buffer_percent,
            fraud_tolerance_percent: config.x402_fraud_tolerance_percent,
            payment_timeout_ms: config.x402_payment_timeout_ms,
        })
    }

    /// `GET /x402/price/<sigType>/<address>` (`spec.md` §4.2): always a `402`
    /// quote, one `accepts[]` entry per enabled network.
    pub async fn quote(&self, sig_type: SignatureType, address: &str, byte_count: u64) -> Result<PriceQuote, EngineError> {
        if self.networks.is_empty() {
            return Err(EngineError::NoMatchingNetwork);
        }
        let mut accepts = Vec::with_capacity(self.networks.len());
        for network in self.networks.values() {
            let (_, atomic_units) =
                gateway_pricing::quote_usdc_atomic_units(&*self.oracle, sig_type, byte_count, self.pricing_buffer_percent)
                    .await?;
            accepts.push(PaymentRequirements {
                scheme: x402::SCHEME_EXACT.to_string(),
                network: network.name.clone(),
                max_amount_required: atomic_units.to_string(),
                resource: format!("/x402/top-up/{sig_type:?}/{address}").to_lowercase(),
                description: "permanent storage upload".to_string(),
                mime_type: "application/octet-stream".to_string(),
                pay_to: network.pay_to.clone(),
                max_timeout_seconds: self.payment_timeout_ms / 1000,
                asset: network.usdc_address.clone(),
                extra: PaymentRequirementsExtra {
                    name: network.usdc_name.clone(),
                    version: network.usdc_version.clone(),
                },
            });
        }
        Ok(PriceQuote {
            x402_version: x402::X402_VERSION,
            accepts,
        })
    }

    fn find_requirements<'a>(
        &self,
        payload: &PaymentPayload,
        accepts: &'a [PaymentRequirements],
    ) -> Result<&'a PaymentRequirements, EngineError> {
        accepts
            .iter()
            .find(|r| r.network == payload.network && r.scheme == payload.scheme)
            .ok_or(EngineError::NoMatchingNetwork)
    }

    /// `verifyPayment` (`spec.md` §4.2): local EIP-712 recovery plus, when a
    /// facilitator is configured for the network, a delegated HTTPS check.
    async fn verify_payment(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<(), EngineError> {
        if payload.x402_version != x402::X402_VERSION {
            return Err(EngineError::VerificationFailed("unsupported x402Version".to_string()));
        }
        if payload.scheme != requirements.scheme {
            return Err(EngineError::VerificationFailed("scheme mismatch".to_string()));
        }
        let network = self
            .networks
            .get(&payload.network)
            .ok_or(EngineError::NoMatchingNetwork)?;

        let auth = ParsedAuthorization::parse(&payload.payload.authorization)
            .map_err(|e| EngineError::VerificationFailed(e.to_string()))?;

        let max_amount_required: alloy_primitives::U256 = requirements
            .max_amount_required
            .parse()
            .map_err(|_| EngineError::VerificationFailed("invalid maxAmountRequired".to_string()))?;
        if auth.value < max_amount_required {
            return Err(EngineError::VerificationFailed("insufficient authorized value".to_string()));
        }

        let pay_to: alloy_primitives::Address = requirements
            .pay_to
            .parse()
            .map_err(|_| EngineError::VerificationFailed("invalid payTo".to_string()))?;
        if auth.to != pay_to {
            return Err(EngineError::VerificationFailed("recipient mismatch".to_string()));
        }

        let now = alloy_primitives::U256::from(Utc::now().timestamp());
        let grace = alloy_primitives::U256::from(requirements.max_timeout_seconds);
        if auth.valid_before < now + grace {
            return Err(EngineError::VerificationFailed("authorization expired or expiring imminently".to_string()));
        }
        if auth.valid_after > now {
            return Err(EngineError::VerificationFailed("authorization not yet valid".to_string()));
        }

        let asset: alloy_primitives::Address = requirements
            .asset
            .parse()
            .map_err(|_| EngineError::VerificationFailed("invalid asset address".to_string()))?;
        let domain = eip712::domain(&requirements.extra.name, &requirements.extra.version, network.chain_id, asset);
        let recovered = eip712::recover_signer(&auth, &domain, &payload.payload.signature)
            .map_err(|e| EngineError::VerificationFailed(e.to_string()))?;
        if recovered != auth.from {
            return Err(EngineError::VerificationFailed("signature does not recover to authorization.from".to_string()));
        }

        if let Some(facilitator) = self.facilitators.get(&payload.network) {
            let request = FacilitatorSettleRequest {
                x402_version: payload.x402_version,
                payment_payload: payload.clone(),
                payment_requirements: requirements.clone(),
            };
            let response = facilitator.verify(&request).await?;
            if !response.is_valid {
                return Err(EngineError::VerificationFailed(
                    response.invalid_reason.unwrap_or_else(|| "facilitator rejected payment".to_string()),
                ));
            }
        }

        Ok(())
    }

    /// `settlePayment` (`spec.md` §4.2): always delegated to the configured
    /// facilitator; local settlement is not implemented.
    async fn settle_payment(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<String, EngineError> {
        let facilitator = self
            .facilitators
            .get(&payload.network)
            .ok_or(EngineError::NoMatchingNetwork)?;
        let request = FacilitatorSettleRequest {
            x402_version: payload.x402_version,
            payment_payload: payload.clone(),
            payment_requirements: requirements.clone(),
        };
        let response = facilitator.settle(&request).await?;
        if !response.success {
            return Err(EngineError::SettlementIncomplete);
        }
        response.tx_hash.ok_or(EngineError::SettlementIncomplete)
    }

    /// Verifies and settles a payment for one of the three modes
    /// (`spec.md` §4.2). Returns the persisted [`X402Payment`] row.
    #[allow(clippy::too_many_arguments)]
    pub async fn pay(
        &self,
        sig_type: SignatureType,
        user_address: &str,
        payload: PaymentPayload,
        mode: PaymentMode,
        data_item_id: Option<String>,
        declared_byte_count: Option<u64>,
    ) -> Result<X402Payment, EngineError> {
        let quote = self.quote(sig_type, user_address, declared_byte_count.unwrap_or(0)).await?;
        let requirements = self.find_requirements(&payload, &quote.accepts)?.clone();

        self.verify_payment(&payload, &requirements).await?;

        // The amount actually authorized may exceed `maxAmountRequired` (the
        // hybrid overpay case, `spec.md` §8 scenario 3); that is what gets
        // transferred and what the ledger must reconcile against.
        let authorized_usdc_amount = ParsedAuthorization::parse(&payload.payload.authorization)
            .map_err(|e| EngineError::VerificationFailed(e.to_string()))?
            .value
            .to::<u64>();

        let tx_hash = self.settle_payment(&payload, &requirements).await?;

        if let Some(existing) = self.find_payment_by_tx_hash(&tx_hash).await? {
            return Ok(existing);
        }

        let (quoted_winc, quoted_usdc_atomic) =
            gateway_pricing::quote_usdc_atomic_units(&*self.oracle, sig_type, declared_byte_count.unwrap_or(0), self.pricing_buffer_percent)
                .await?;
        let usdc_amount = authorized_usdc_amount;
        // Scale winc proportionally to what was actually paid vs. quoted, so
        // hybrid overpay credits the exact excess rather than zero.
        let winc_amount = Winston::new(
            (quoted_winc.as_u128() * usdc_amount as u128) / quoted_usdc_atomic.max(1) as u128,
        );

        let payment_id = Uuid::new_v4();
        let mode_str = mode_str(mode);
        let user_address_type = UserAddressType::from(sig_type);
        let user_address_type_str = serde_json::to_value(user_address_type)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "ethereum".to_string());

        let payment = sqlx::query_as::<_, X402Payment>(
            "INSERT INTO x402_payments
                (id, user_address, user_address_type, tx_hash, network, token_address, usdc_amount,
                 winc_amount, mode, data_item_id, declared_byte_count, payer_address, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'pending')
             RETURNING *",
        )
        .bind(payment_id)
        .bind(user_address)
        .bind(&user_address_type_str)
        .bind(&tx_hash)
        .bind(&requirements.network)
        .bind(&requirements.asset)
        .bind(usdc_amount.to_string())
        .bind(winc_amount.to_string())
        .bind(&mode_str)
        .bind(&data_item_id)
        .bind(declared_byte_count.map(|b| b as i64))
        .bind(user_address)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => EngineError::DuplicateTxHash,
            other => EngineError::Database(other),
        })?;

        match mode {
            PaymentMode::Payg => {
                let Some(data_item_id) = data_item_id.clone() else {
                    return Err(EngineError::Malformed("payg requires dataItemId".to_string()));
                };
                self.create_x402_reservation(&data_item_id, payment_id).await?;
            }
            PaymentMode::Topup => {
                self.ledger
                    .adjust_balance(user_address, user_address_type, winc_amount.as_u128() as i128, ChangeReason::X402Topup)
                    .await?;
                self.mark_confirmed(payment_id).await?;
            }
            PaymentMode::Hybrid => {
                let Some(data_item_id) = data_item_id.clone() else {
                    return Err(EngineError::Malformed("hybrid requires dataItemId".to_string()));
                };
                let excess = winc_amount.saturating_sub(quoted_winc);
                if excess > Winston::ZERO {
                    self.ledger
                        .adjust_balance(user_address, user_address_type, excess.as_u128() as i128, ChangeReason::X402HybridExcess)
                        .await?;
                }
                self.create_x402_reservation(&data_item_id, payment_id).await?;
            }
        }

        self.find_payment_by_id(payment_id).await?.ok_or(EngineError::SettlementIncomplete)
    }

    async fn create_x402_reservation(&self, data_item_id: &str, payment_id: Uuid) -> Result<(), EngineError> {
        let expires_at = Utc::now() + ChronoDuration::seconds(x402::X402_RESERVATION_TTL_SECS);
        sqlx::query(
            "INSERT INTO x402_reservations (data_item_id, payment_id, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(data_item_id)
        .bind(payment_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_confirmed(&self, payment_id: Uuid) -> Result<(), EngineError> {
        sqlx::query("UPDATE x402_payments SET status = 'confirmed', finalized_at = now() WHERE id = $1")
            .bind(payment_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn find_payment_by_tx_hash(&self, tx_hash: &str) -> Result<Option<X402Payment>, EngineError> {
        Ok(sqlx::query_as::<_, X402Payment>("SELECT * FROM x402_payments WHERE tx_hash = $1")
            .bind(tx_hash)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn find_payment_by_id(&self, id: Uuid) -> Result<Option<X402Payment>, EngineError> {
        Ok(sqlx::query_as::<_, X402Payment>("SELECT * FROM x402_payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_payment_by_data_item(&self, data_item_id: &str) -> Result<X402Payment, EngineError> {
        sqlx::query_as::<_, X402Payment>("SELECT * FROM x402_payments WHERE data_item_id = $1")
            .bind(data_item_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| EngineError::ReservationNotFound(data_item_id.to_string()))
    }

    /// `POST /x402/finalize {dataItemId, actualByteCount}` (`spec.md` §4.2):
    /// re-prices at the actual byte count and classifies the outcome per the
    /// finalization table.
    pub async fn finalize(&self, data_item_id: &str, actual_byte_count: u64) -> Result<x402::FinalizeOutcome, EngineError> {
        let payment = self.find_payment_by_data_item(data_item_id).await?;
        if payment.status().map(X402PaymentStatus::is_terminal).unwrap_or(true) {
            return match payment.status() {
                Some(X402PaymentStatus::Confirmed) => Ok(x402::FinalizeOutcome::Confirmed),
                _ => Err(EngineError::Malformed("payment already finalized".to_string())),
            };
        }
        let declared = payment.declared_byte_count.unwrap_or(0) as u64;
        let sig_type_for_network = self.sig_type_for_network(&payment.network);
        let (actual_cost, _) = gateway_pricing::quote_usdc_atomic_units(
            &*self.oracle,
            sig_type_for_network,
            actual_byte_count,
            self.pricing_buffer_percent,
        )
        .await?;
        let quoted_cost = payment.winc_amount;

        let outcome = x402::classify_finalization(declared, actual_byte_count, self.fraud_tolerance_percent, quoted_cost, actual_cost);

        match &outcome {
            x402::FinalizeOutcome::Confirmed => {
                self.mark_confirmed(payment.id).await?;
                self.remove_x402_reservation(data_item_id).await?;
            }
            x402::FinalizeOutcome::Refunded { refund_winc } => {
                let user_address_type = parse_address_type(&payment.user_address_type);
                self.ledger
                    .adjust_balance(&payment.user_address, user_address_type, refund_winc.as_u128() as i128, ChangeReason::X402Refund)
                    .await?;
                sqlx::query("UPDATE x402_payments SET status = 'refunded', finalized_at = now() WHERE id = $1")
                    .bind(payment.id)
                    .execute(&self.pool)
                    .await?;
                self.remove_x402_reservation(data_item_id).await?;
            }
            x402::FinalizeOutcome::FraudPenalty { .. } => {
                sqlx::query("UPDATE x402_payments SET status = 'fraud_penalty', finalized_at = now() WHERE id = $1")
                    .bind(payment.id)
                    .execute(&self.pool)
                    .await?;
                self.remove_x402_reservation(data_item_id).await?;
            }
        }

        Ok(outcome)
    }

    async fn remove_x402_reservation(&self, data_item_id: &str) -> Result<(), EngineError> {
        sqlx::query("DELETE FROM x402_reservations WHERE data_item_id = $1")
            .bind(data_item_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn sig_type_for_network(&self, _network: &str) -> SignatureType {
        SignatureType::Ethereum
    }

    /// Background sweeper: deletes x402 reservations older than one hour
    /// (`spec.md` §4.2).
    pub async fn sweep_expired_reservations(&self) -> Result<u64, EngineError> {
        let result = sqlx::query("DELETE FROM x402_reservations WHERE expires_at < now()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn mode_str(mode: PaymentMode) -> String {
    serde_json::to_value(mode)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "hybrid".to_string())
}

fn parse_address_type(s: &str) -> UserAddressType {
    match s {
        "arweave" => UserAddressType::Arweave,
        "solana" => UserAddressType::Solana,
        "kyve" => UserAddressType::Kyve,
        "aptos" => UserAddressType::Aptos,
        _ => UserAddressType::Ethereum,
    }
}
