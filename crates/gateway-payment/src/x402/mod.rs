//! The x402 payment engine (`spec.md` §4.2): EIP-712 verification, the CDP
//! bearer JWT, the facilitator HTTP client, and the engine tying them
//! together with the credit ledger.

mod cdp_jwt;
mod eip712;
mod engine;
mod facilitator;

pub use cdp_jwt::{CdpJwtError, build_cdp_jwt};
pub use engine::{Engine, EngineError};
pub use facilitator::{CdpCredentials, FacilitatorClient, FacilitatorError};
