//! Rate-limited bulk (re)population of the descriptor corpus.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::provider::{FaceProvider, ProviderFactory};
use crate::registry::ProviderRegistry;
use crate::store::{CandidateCorpus, DescriptorStore, StoreError};
use crate::types::{CandidateEntity, DescriptorRecord, ImageInput};

/// Candidates processed concurrently per batch. Together with
/// [`DEFAULT_BATCH_DELAY`] this is the engine's rate-limiting mechanism
/// against vendor throttling; batches run strictly sequentially.
pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum BatchError {
    /// No config is both active and enabled. The only condition that
    /// aborts a run before it starts; per-candidate failures never do.
    #[error("no active recognition provider; regeneration unavailable")]
    ProviderUnavailable,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a regeneration run. `success + failed` always equals the
/// number of candidates processed; `errors` holds one advisory line per
/// failure category rather than one per candidate.
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

struct CandidateFailure {
    category: &'static str,
    message: String,
}

/// Re-extracts descriptors for every entity with a registered photo.
/// Used after activating a new provider or to recover from prior
/// soft failures.
pub struct BatchRegenerationJob {
    registry: Arc<ProviderRegistry>,
    factory: Arc<dyn ProviderFactory>,
    corpus: Arc<dyn CandidateCorpus>,
    store: Arc<dyn DescriptorStore>,
    batch_size: usize,
    batch_delay: Duration,
}

impl BatchRegenerationJob {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        factory: Arc<dyn ProviderFactory>,
        corpus: Arc<dyn CandidateCorpus>,
        store: Arc<dyn DescriptorStore>,
    ) -> Self {
        Self {
            registry,
            factory,
            corpus,
            store,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
        }
    }

    pub fn with_pacing(mut self, batch_size: usize, batch_delay: Duration) -> Self {
        self.batch_size = batch_size.max(1);
        self.batch_delay = batch_delay;
        self
    }

    /// Process the whole corpus in fixed-size batches: concurrent within a
    /// batch, sequential across batches with a fixed inter-batch delay.
    pub async fn run(&self) -> Result<BatchReport, BatchError> {
        let config = self
            .registry
            .get_active()
            .await?
            .ok_or(BatchError::ProviderUnavailable)?;
        let provider = self.factory.create(&config);

        let candidates = self.corpus.candidates().await?;
        let total = candidates.len();
        tracing::info!(
            candidates = total,
            provider = %config.provider_type(),
            batch_size = self.batch_size,
            "descriptor regeneration starting"
        );

        let mut report = BatchReport::default();
        // category -> (representative message, affected count)
        let mut failures: BTreeMap<&'static str, (String, usize)> = BTreeMap::new();

        for (index, batch) in candidates.chunks(self.batch_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.batch_delay).await;
            }

            let outcomes = futures::future::join_all(
                batch
                    .iter()
                    .map(|candidate| self.process_candidate(Arc::clone(&provider), candidate)),
            )
            .await;

            for outcome in outcomes {
                match outcome {
                    Ok(()) => report.success += 1,
                    Err(failure) => {
                        report.failed += 1;
                        let entry = failures
                            .entry(failure.category)
                            .or_insert_with(|| (failure.message, 0));
                        entry.1 += 1;
                    }
                }
            }

            tracing::debug!(
                batch = index,
                done = report.success + report.failed,
                total,
                "batch processed"
            );
        }

        report.errors = failures
            .into_values()
            .map(|(message, count)| format!("{message} ({count} affected)"))
            .collect();

        debug_assert_eq!(report.success + report.failed, total);
        tracing::info!(
            success = report.success,
            failed = report.failed,
            "descriptor regeneration finished"
        );
        Ok(report)
    }

    /// Extract one candidate's descriptor and persist the outcome.
    ///
    /// A soft extraction failure still writes a `pending` record so later
    /// runs find the entity again; only the persisted-successfully case
    /// counts as success.
    async fn process_candidate(
        &self,
        provider: Arc<dyn FaceProvider>,
        candidate: &CandidateEntity,
    ) -> Result<(), CandidateFailure> {
        let image = ImageInput::parse(&candidate.photo_url);

        let record = match provider.extract(&image).await {
            Ok(Some(descriptor_id)) => DescriptorRecord::extracted(
                candidate.entity_id.as_str(),
                provider.provider_type(),
                candidate.photo_url.as_str(),
                descriptor_id,
            ),
            Ok(None) => {
                tracing::debug!(entity = %candidate.entity_id, "no usable face; marked pending");
                self.persist_pending(&provider, candidate).await?;
                return Err(CandidateFailure {
                    category: "no_face",
                    message: "no usable face found in registered photo".into(),
                });
            }
            Err(err) => {
                tracing::warn!(
                    entity = %candidate.entity_id,
                    error = %err,
                    "extraction failed; marked pending"
                );
                let failure = CandidateFailure {
                    category: err.category(),
                    message: err.to_string(),
                };
                self.persist_pending(&provider, candidate).await?;
                return Err(failure);
            }
        };

        self.store.upsert(record).await.map_err(|err| {
            tracing::warn!(entity = %candidate.entity_id, error = %err, "descriptor write failed");
            CandidateFailure {
                category: "persistence",
                message: format!("failed to persist descriptor record: {err}"),
            }
        })
    }

    async fn persist_pending(
        &self,
        provider: &Arc<dyn FaceProvider>,
        candidate: &CandidateEntity,
    ) -> Result<(), CandidateFailure> {
        self.store
            .upsert(DescriptorRecord::pending(
                candidate.entity_id.as_str(),
                provider.provider_type(),
                candidate.photo_url.as_str(),
            ))
            .await
            .map_err(|err| {
                tracing::warn!(entity = %candidate.entity_id, error = %err, "pending write failed");
                CandidateFailure {
                    category: "persistence",
                    message: format!("failed to persist descriptor record: {err}"),
                }
            })
    }
}
