//! Winston (winc): the smallest unit of the native cost token. `1 AR = 10^12 winc`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};
use std::str::FromStr;

/// A non-negative amount of Winston.
///
/// Serialized as a decimal string (wire-compatible with the Arweave convention
/// of passing Winston as a string to avoid precision loss in JSON numbers).
#[derive(Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Default)]
pub struct Winston(u128);

#[derive(Debug, thiserror::Error)]
pub enum WinstonError {
    #[error("invalid winston amount: {0}")]
    Parse(String),
    #[error("winston arithmetic would underflow below zero")]
    Underflow,
    #[error("winston arithmetic would overflow")]
    Overflow,
}

impl Winston {
    pub const ZERO: Winston = Winston(0);

    pub fn new(value: u128) -> Self {
        Winston(value)
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }

    pub fn checked_add(self, other: Winston) -> Result<Winston, WinstonError> {
        self.0
            .checked_add(other.0)
            .map(Winston)
            .ok_or(WinstonError::Overflow)
    }

    pub fn checked_sub(self, other: Winston) -> Result<Winston, WinstonError> {
        self.0
            .checked_sub(other.0)
            .map(Winston)
            .ok_or(WinstonError::Underflow)
    }

    pub fn saturating_sub(self, other: Winston) -> Winston {
        Winston(self.0.saturating_sub(other.0))
    }
}

impl Add for Winston {
    type Output = Winston;
    fn add(self, rhs: Self) -> Self::Output {
        Winston(self.0 + rhs.0)
    }
}

impl Sub for Winston {
    type Output = Winston;
    fn sub(self, rhs: Self) -> Self::Output {
        Winston(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Winston {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Winston::ZERO, |acc, w| acc.checked_add(w).unwrap_or(Winston(u128::MAX)))
    }
}

impl fmt::Display for Winston {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Winston {
    type Err = WinstonError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u128>()
            .map(Winston)
            .map_err(|_| WinstonError::Parse(s.to_string()))
    }
}

impl TryFrom<String> for Winston {
    type Error = WinstonError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Winston> for String {
    fn from(w: Winston) -> Self {
        w.to_string()
    }
}

impl Serialize for Winston {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Winston {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Winston::from_str(&s).map_err(serde::de::Error::custom)
    }
}

// Winston amounts exceed i64/NUMERIC-without-precision-loss territory at
// reasonable AR quantities, so the column is `TEXT` and this newtype owns the
// string <-> u128 conversion, the same way the teacher stores `U256` amounts
// as decimal strings over the wire (`x402-types::util::money_amount`).
impl sqlx::Type<sqlx::Postgres> for Winston {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Winston {
    fn decode(
        value: sqlx::postgres::PgValueRef<'r>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync + 'static>> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Winston::from_str(&s)?)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for Winston {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode(self.to_string(), buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_decimal_string() {
        let amount = Winston::new(400_000);
        assert_eq!(serde_json::to_string(&amount).unwrap(), "\"400000\"");
    }

    #[test]
    fn checked_sub_never_goes_negative() {
        let balance = Winston::new(100);
        assert!(balance.checked_sub(Winston::new(200)).is_err());
    }
}
