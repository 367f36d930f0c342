//! Recognition-backend contract.
//!
//! One [`FaceProvider`] implementation exists per [`ProviderType`]. The
//! engine never raises a provider failure to its own callers: extraction
//! errors become "skip / pending" and comparison errors become a 0.0
//! score at the call sites in `search` and `batch`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use thiserror::Error;

use crate::types::{ImageInput, ProviderConfig, ProviderType};

/// A transient backend failure. Carried so callers can distinguish "needs
/// retry later" from "definitively no match", but never propagated past
/// the engine boundary.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Vendor-specific gating: the account must be granted access to the
    /// recognition feature before calls succeed.
    #[error("backend authorization required: {0}")]
    AuthorizationRequired(String),
    /// The request never produced a response (connect, TLS, timeout).
    #[error("backend request failed: {0}")]
    Request(String),
    /// The backend answered with a non-success status.
    #[error("backend rejected request (HTTP {status}): {detail}")]
    Status { status: u16, detail: String },
    /// The image reference could not be materialized into a payload.
    #[error("unusable image payload: {0}")]
    Payload(String),
    /// The backend answered 2xx but the body was not understood.
    #[error("malformed backend response: {0}")]
    Response(String),
}

impl ProviderError {
    /// Coarse failure category, used to deduplicate batch-report errors.
    pub fn category(&self) -> &'static str {
        match self {
            ProviderError::AuthorizationRequired(_) => "authorization",
            ProviderError::Request(_) => "request",
            ProviderError::Status { .. } => "backend",
            ProviderError::Payload(_) => "payload",
            ProviderError::Response(_) => "response",
        }
    }
}

/// A pluggable recognition backend.
///
/// Descriptor ids are opaque strings, meaningful only under the provider
/// type that produced them. Implementations must be cheap to construct
/// and safe for concurrent use.
#[async_trait]
pub trait FaceProvider: Send + Sync {
    fn provider_type(&self) -> ProviderType;

    /// How long a descriptor id stays valid on the backend, if it expires
    /// at all. Stored ids older than this are treated as known-expired
    /// and re-extracted before use.
    fn descriptor_validity(&self) -> Option<Duration> {
        None
    }

    /// Produce a descriptor id for the face in `image`.
    ///
    /// `Ok(None)` means the backend processed the image but found no
    /// usable face; `Err` means the attempt itself failed (retryable).
    async fn extract(&self, image: &ImageInput) -> Result<Option<String>, ProviderError>;

    /// Similarity in [0, 1] between two descriptors of this provider type.
    ///
    /// `candidate_image` is the image the candidate descriptor came from;
    /// backends whose ids expire re-extract a fresh side-B descriptor from
    /// it instead of trusting `candidate_id`.
    async fn compare(
        &self,
        probe_id: &str,
        candidate_id: &str,
        candidate_image: &ImageInput,
    ) -> Result<f32, ProviderError>;
}

/// Maps an active config onto the provider implementation for its type.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, config: &ProviderConfig) -> Arc<dyn FaceProvider>;
}
