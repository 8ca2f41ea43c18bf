//! Shared axum state for the upload service.

use std::sync::Arc;

use gateway_pricing::PriceOracle;
use gateway_storage::OffsetsStore;

use crate::bundle::repository::LifecycleRepository;
use crate::config::Config;
use crate::ingress::IngestState;
use crate::multipart::MultipartRepository;

#[derive(Clone)]
pub struct AppState {
    pub ingest: IngestState,
    pub lifecycle_repository: LifecycleRepository,
    pub multipart_repository: MultipartRepository,
    pub offsets_store: OffsetsStore,
    /// Backs the upload-service's own `/v1/price/x402/*` routes, which quote
    /// a single network by `token` rather than round-tripping through the
    /// payment-service's per-address quote endpoint (`spec.md` §6).
    pub oracle: Arc<dyn PriceOracle>,
    pub config: Arc<Config>,
}
