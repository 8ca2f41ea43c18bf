//! The pluggable fiat/token pricing oracle (`spec.md` §4.2, §6) plus the
//! byte-count-to-Winston gateway price function shared by the credit ledger
//! (`spec.md` §4.4) and the x402 quote (`spec.md` §4.2).

mod gateway_price;
mod oracle;

pub use gateway_price::{gateway_quoted_price, signature_overhead_bytes};
pub use oracle::{CachedArUsdOracle, PriceOracle, PricingError};

use gateway_types::ans104::SignatureType;
use gateway_types::money::Winston;

/// `spec.md` §6 default.
pub const DEFAULT_PRICING_BUFFER_PERCENT: u8 = 15;
pub const MIN_USDC_ATOMIC_UNITS: u64 = 1_000;
const USDC_DECIMALS: u32 = 6;
const AR_WINSTON_EXPONENT: u32 = 12;

/// Computes the full x402 quote: the Winston cost of `byte_count` bytes plus
/// the `pricingBufferPercent` markup, converted to USDC atomic units via the
/// oracle, floored at [`MIN_USDC_ATOMIC_UNITS`] (`spec.md` §4.2).
pub async fn quote_usdc_atomic_units<O: PriceOracle + ?Sized>(
    oracle: &O,
    sig_type: SignatureType,
    byte_count: u64,
    pricing_buffer_percent: u8,
) -> Result<(Winston, u64), PricingError> {
    let winc = gateway_quoted_price(byte_count, sig_type);
    let buffered_winc = apply_buffer(winc, pricing_buffer_percent);
    let ar_usd = oracle.ar_usd_price().await?;
    let atomic = winston_to_usdc_atomic(buffered_winc, ar_usd);
    Ok((buffered_winc, atomic.max(MIN_USDC_ATOMIC_UNITS)))
}

fn apply_buffer(winc: Winston, buffer_percent: u8) -> Winston {
    let extra = winc.as_u128() * buffer_percent as u128 / 100;
    Winston::new(winc.as_u128() + extra)
}

/// Winston -> AR -> USD -> USDC(atomic, 6 decimals).
fn winston_to_usdc_atomic(winc: Winston, ar_usd_price: f64) -> u64 {
    let ar = winc.as_u128() as f64 / 10f64.powi(AR_WINSTON_EXPONENT as i32);
    let usd = ar * ar_usd_price;
    let atomic = usd * 10f64.powi(USDC_DECIMALS as i32);
    atomic.round().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_adds_configured_percent() {
        let buffered = apply_buffer(Winston::new(1_000_000), 15);
        assert_eq!(buffered.as_u128(), 1_150_000);
    }

    #[test]
    fn one_ar_at_one_dollar_is_one_million_atomic_units() {
        let atomic = winston_to_usdc_atomic(Winston::new(10u128.pow(12)), 1.0);
        assert_eq!(atomic, 1_000_000);
    }
}
