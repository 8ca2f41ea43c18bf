//! CAIP-2 style chain identifiers (`eip155:8453`) and patterns over them,
//! used by the per-network x402 configuration table of `spec.md` §6.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainId {
    pub namespace: String,
    pub reference: String,
}

impl ChainId {
    pub fn new<N: Into<String>, R: Into<String>>(namespace: N, reference: R) -> Self {
        Self {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }

    pub fn eip155(chain_id: u64) -> Self {
        Self::new("eip155", chain_id.to_string())
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid chain id format: {0}")]
pub struct ChainIdFormatError(String);

impl FromStr for ChainId {
    type Err = ChainIdFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, reference) = s.split_once(':').ok_or_else(|| ChainIdFormatError(s.into()))?;
        Ok(ChainId::new(namespace, reference))
    }
}

impl Serialize for ChainId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ChainId::from_str(&s).map_err(de::Error::custom)
    }
}

/// A pattern matching one or more [`ChainId`]s within a namespace — used to
/// bind a payment scheme to "all EVM chains" or a specific set of them.
#[derive(Debug, Clone)]
pub enum ChainIdPattern {
    Wildcard { namespace: String },
    Exact { namespace: String, reference: String },
    Set { namespace: String, references: HashSet<String> },
}

impl ChainIdPattern {
    pub fn matches(&self, chain_id: &ChainId) -> bool {
        match self {
            ChainIdPattern::Wildcard { namespace } => chain_id.namespace == *namespace,
            ChainIdPattern::Exact { namespace, reference } => {
                chain_id.namespace == *namespace && chain_id.reference == *reference
            }
            ChainIdPattern::Set { namespace, references } => {
                chain_id.namespace == *namespace && references.contains(&chain_id.reference)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_as_caip2() {
        assert_eq!(ChainId::eip155(8453).to_string(), "eip155:8453");
    }

    #[test]
    fn wildcard_matches_same_namespace_only() {
        let pattern = ChainIdPattern::Wildcard {
            namespace: "eip155".into(),
        };
        assert!(pattern.matches(&ChainId::eip155(1)));
        assert!(!pattern.matches(&ChainId::new("solana", "mainnet")));
    }
}
