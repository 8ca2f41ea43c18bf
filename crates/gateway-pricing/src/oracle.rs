//! The pluggable pricing oracle contract (`spec.md` §4.2) and a cached
//! AR/USD implementation.
//!
//! `spec.md` §5: "The AR/USD price lookup caches for 5 minutes in process
//! memory; concurrent misses coalesce into a single upstream call." The
//! coalescing here follows the same shape as the teacher's
//! `ExchangeRateProvider` cache: a shared mutable cache guarded by a lock,
//! with a semaphore permit standing in for the in-flight fetch so that
//! concurrent callers that observe a miss wait on the same upstream request
//! rather than issuing one each.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};

const CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("upstream price feed request failed: {0}")]
    Upstream(#[from] reqwest::Error),
    #[error("upstream price feed returned an unexpected payload: {0}")]
    Malformed(String),
}

/// A source of the current AR/USD exchange rate. Implementations are the
/// external collaborator seam the payment engine and the ingest pipeline
/// quote against; swapping in a fixed-rate fake is how tests avoid a live
/// network dependency.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// USD price of one AR token.
    async fn ar_usd_price(&self) -> Result<f64, PricingError>;
}

struct CacheEntry {
    price: f64,
    fetched_at: Instant,
}

/// Wraps an upstream HTTP price feed with a 5-minute in-process cache and
/// single-flight coalescing of concurrent misses.
pub struct CachedArUsdOracle {
    client: reqwest::Client,
    feed_url: String,
    cache: Mutex<Option<CacheEntry>>,
    in_flight: Semaphore,
}

impl CachedArUsdOracle {
    pub fn new(client: reqwest::Client, feed_url: impl Into<String>) -> Self {
        Self {
            client,
            feed_url: feed_url.into(),
            cache: Mutex::new(None),
            in_flight: Semaphore::new(1),
        }
    }

    async fn fresh_cached_price(&self) -> Option<f64> {
        let guard = self.cache.lock().await;
        guard
            .as_ref()
            .filter(|entry| entry.fetched_at.elapsed() < CACHE_TTL)
            .map(|entry| entry.price)
    }

    async fn fetch_and_cache(&self) -> Result<f64, PricingError> {
        let response = self
            .client
            .get(&self.feed_url)
            .send()
            .await?
            .error_for_status()?;
        let body: serde_json::Value = response.json().await?;
        let price = body
            .get("arweave")
            .and_then(|v| v.get("usd"))
            .and_then(|v| v.as_f64())
            .ok_or_else(|| PricingError::Malformed(body.to_string()))?;

        let mut guard = self.cache.lock().await;
        *guard = Some(CacheEntry {
            price,
            fetched_at: Instant::now(),
        });
        Ok(price)
    }
}

#[async_trait]
impl PriceOracle for CachedArUsdOracle {
    async fn ar_usd_price(&self) -> Result<f64, PricingError> {
        if let Some(price) = self.fresh_cached_price().await {
            return Ok(price);
        }

        // Only one concurrent caller actually hits the network; the rest
        // wait for the permit and then re-check the now-populated cache.
        let permit = self.in_flight.acquire().await.expect("semaphore not closed");
        if let Some(price) = self.fresh_cached_price().await {
            drop(permit);
            return Ok(price);
        }
        let price = self.fetch_and_cache().await;
        drop(permit);
        price
    }
}

/// A fixed-rate stand-in for tests that don't want a live network call.
pub struct FixedPriceOracle(pub f64);

#[async_trait]
impl PriceOracle for FixedPriceOracle {
    async fn ar_usd_price(&self) -> Result<f64, PricingError> {
        Ok(self.0)
    }
}

/// Shares one oracle across callers that only hold an `Arc<dyn PriceOracle>`.
#[async_trait]
impl PriceOracle for Arc<dyn PriceOracle> {
    async fn ar_usd_price(&self) -> Result<f64, PricingError> {
        (**self).ar_usd_price().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingOracle {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PriceOracle for CountingOracle {
        async fn ar_usd_price(&self) -> Result<f64, PricingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(5.0)
        }
    }

    #[tokio::test]
    async fn fixed_oracle_returns_configured_price() {
        let oracle = FixedPriceOracle(7.5);
        assert_eq!(oracle.ar_usd_price().await.unwrap(), 7.5);
    }

    #[tokio::test]
    async fn counting_oracle_is_called_once_per_request() {
        let oracle = CountingOracle {
            calls: AtomicUsize::new(0),
        };
        oracle.ar_usd_price().await.unwrap();
        oracle.ar_usd_price().await.unwrap();
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
    }
}
