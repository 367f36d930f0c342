//! Persistence seams consumed by the engine.
//!
//! The engine owns none of these backends; it sees the descriptor corpus,
//! the candidate corpus, and the provider-config store only through these
//! traits. Persistence failures are the one error category the engine
//! lets propagate to callers.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{CandidateEntity, DescriptorRecord, ProviderConfig};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persistence failure: {0}")]
    Backend(String),
    #[error("corrupt record for {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Durable descriptor corpus, one record per entity, latest write wins.
#[async_trait]
pub trait DescriptorStore: Send + Sync {
    /// Insert or replace the record for `record.entity_id`. A failed
    /// extraction is still written (`status = pending`, no descriptor id)
    /// so batch reprocessing can find entities needing work with one query.
    async fn upsert(&self, record: DescriptorRecord) -> Result<(), StoreError>;

    async fn get(&self, entity_id: &str) -> Result<Option<DescriptorRecord>, StoreError>;

    /// Records whose extraction has not succeeded yet (`pending` or `none`).
    async fn list_needing_descriptor(&self) -> Result<Vec<DescriptorRecord>, StoreError>;

    /// Cascade path: invoked when the owning entity is deleted.
    async fn remove(&self, entity_id: &str) -> Result<(), StoreError>;
}

/// Accessor for the external entity corpus: every entity with a non-empty
/// registered photo, with display metadata. Candidate order is preserved
/// all the way into ranked results, so it must be deterministic.
#[async_trait]
pub trait CandidateCorpus: Send + Sync {
    async fn candidates(&self) -> Result<Vec<CandidateEntity>, StoreError>;
}

/// Backing store for provider configurations.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// The single config that is both active and enabled, if any.
    /// Implementations enforce the at-most-one-active invariant on write.
    async fn load_active(&self) -> Result<Option<ProviderConfig>, StoreError>;
}
