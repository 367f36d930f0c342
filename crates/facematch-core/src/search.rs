//! Similarity-ranked search over the registered descriptor corpus.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use thiserror::Error;

use crate::provider::{FaceProvider, ProviderFactory};
use crate::registry::ProviderRegistry;
use crate::store::{CandidateCorpus, DescriptorStore, StoreError};
use crate::types::{CandidateEntity, DescriptorRecord, ImageInput, MatchResult, ProviderType};

/// Cap on concurrent candidate comparisons within one search. Keeps a
/// single query from overwhelming the backend when the corpus is large.
pub const DEFAULT_COMPARE_CONCURRENCY: usize = 4;

#[derive(Debug, Error)]
pub enum SearchError {
    /// The query image yielded no descriptor, so there is nothing to
    /// search for. Distinct from "no matches found", which is an empty
    /// result list.
    #[error("no face detected in query image")]
    NoFaceDetected,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Orchestrates extraction, comparison, ranking and thresholding for a
/// single query image.
pub struct MatchSearch {
    registry: Arc<ProviderRegistry>,
    factory: Arc<dyn ProviderFactory>,
    corpus: Arc<dyn CandidateCorpus>,
    store: Arc<dyn DescriptorStore>,
    compare_concurrency: usize,
}

impl MatchSearch {
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
            compare_concurrency: DEFAULT_COMPARE_CONCURRENCY,
        }
    }

    pub fn with_compare_concurrency(mut self, concurrency: usize) -> Self {
        self.compare_concurrency = concurrency.max(1);
        self
    }

    /// Find registered entities whose face matches the query image.
    ///
    /// Results are sorted by similarity descending (ties keep original
    /// candidate order), filtered at `threshold_override` (falling back
    /// to the active config's threshold) and truncated to the config's
    /// `max_results`.
    ///
    /// An empty list is returned both when no provider is active and when
    /// nothing scored above the threshold; callers that need to tell the
    /// two apart must consult [`ProviderRegistry::get_active`] separately.
    pub async fn search(
        &self,
        query: &ImageInput,
        threshold_override: Option<f32>,
    ) -> Result<Vec<MatchResult>, SearchError> {
        let Some(config) = self.registry.get_active().await? else {
            tracing::debug!("no active provider; search unavailable");
            return Ok(Vec::new());
        };
        let provider = self.factory.create(&config);

        let probe = match provider.extract(query).await {
            Ok(Some(id)) => id,
            Ok(None) => return Err(SearchError::NoFaceDetected),
            Err(err) => {
                tracing::warn!(error = %err, "query extraction failed");
                return Err(SearchError::NoFaceDetected);
            }
        };

        let candidates = self.corpus.candidates().await?;
        let total = candidates.len();
        let threshold = threshold_override.unwrap_or(config.similarity_threshold);

        let scored: Vec<Result<Option<MatchResult>, StoreError>> = futures::stream::iter(
            candidates
                .into_iter()
                .map(|candidate| self.score_candidate(Arc::clone(&provider), probe.clone(), candidate)),
        )
        .buffered(self.compare_concurrency)
        .collect()
        .await;

        let mut results = Vec::new();
        for outcome in scored {
            if let Some(result) = outcome? {
                if result.similarity >= threshold {
                    results.push(result);
                }
            }
        }

        // Stable sort: equal scores keep original candidate order, so
        // results are deterministic across runs.
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });
        results.truncate(config.max_results);

        tracing::info!(
            candidates = total,
            matched = results.len(),
            threshold,
            "search complete"
        );
        Ok(results)
    }

    /// Score one candidate against the probe descriptor.
    ///
    /// `Ok(None)` means the candidate was skipped because no descriptor
    /// could be obtained for it; skipping keeps an "unknown" from
    /// polluting results as a guaranteed non-match. Comparison failures,
    /// by contrast, score 0.0: "no evidence of a match".
    async fn score_candidate(
        &self,
        provider: Arc<dyn FaceProvider>,
        probe: String,
        candidate: CandidateEntity,
    ) -> Result<Option<MatchResult>, StoreError> {
        let image = ImageInput::parse(&candidate.photo_url);

        let stored = self.store.get(&candidate.entity_id).await?;
        let descriptor = match stored.as_ref().and_then(|record| {
            record.usable_descriptor(
                provider.provider_type(),
                provider.descriptor_validity(),
                Utc::now(),
            )
        }) {
            Some(id) => id.to_string(),
            None => match provider.extract(&image).await {
                Ok(Some(id)) => {
                    self.cache_fill(&candidate, provider.provider_type(), &id).await;
                    id
                }
                Ok(None) => {
                    tracing::debug!(
                        entity = %candidate.entity_id,
                        "no face in candidate photo; skipping"
                    );
                    return Ok(None);
                }
                Err(err) => {
                    tracing::warn!(
                        entity = %candidate.entity_id,
                        error = %err,
                        "candidate extraction failed; skipping"
                    );
                    return Ok(None);
                }
            },
        };

        let similarity = match provider.compare(&probe, &descriptor, &image).await {
            Ok(score) => score.clamp(0.0, 1.0),
            Err(err) => {
                tracing::warn!(
                    entity = %candidate.entity_id,
                    error = %err,
                    "comparison failed; scoring as no evidence of a match"
                );
                0.0
            }
        };

        Ok(Some(MatchResult {
            similarity,
            entity: candidate,
        }))
    }

    /// Persist a freshly extracted candidate descriptor so the next search
    /// can reuse it. Best-effort: a write failure degrades the cache, not
    /// the search.
    async fn cache_fill(
        &self,
        candidate: &CandidateEntity,
        provider_type: ProviderType,
        descriptor_id: &str,
    ) {
        let record = DescriptorRecord::extracted(
            candidate.entity_id.as_str(),
            provider_type,
            candidate.photo_url.as_str(),
            descriptor_id,
        );
        if let Err(err) = self.store.upsert(record).await {
            tracing::warn!(
                entity = %candidate.entity_id,
                error = %err,
                "descriptor cache fill failed"
            );
        }
    }
}
