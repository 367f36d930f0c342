//! Zero-dependency fallback backend.
//!
//! Computes a deterministic pseudo-descriptor from the image payload with
//! a rolling hash. Extraction always succeeds, but the descriptor only
//! captures near-byte-identical inputs — not facial similarity — so
//! comparison scores are deliberately scaled into a conservative range.

use async_trait::async_trait;
use facematch_core::{FaceProvider, ImageInput, ProviderError, ProviderType};

/// Bytes of the payload fed into the hash.
const HASH_INPUT_LIMIT: usize = 2048;
/// One 16-bit hash word is emitted per window, so descriptors are at most
/// `HASH_INPUT_LIMIT / HASH_WINDOW * 4` hex chars (128).
const HASH_WINDOW: usize = 64;
const HASH_BASE: u32 = 31;

/// Score for byte-identical descriptors. Intentionally below 1.0: equal
/// hashes mark an obvious special case, not cryptographic certainty.
const EXACT_MATCH_SCORE: f32 = 0.95;
/// Ceiling for non-identical descriptors. The hash is weak evidence, so
/// it never reports high confidence.
const SIMILARITY_CEILING: f32 = 0.75;

pub struct LocalFallbackProvider;

impl LocalFallbackProvider {
    pub fn new() -> Self {
        Self
    }

    /// The payload "as given": inline bytes when available, otherwise the
    /// textual reference itself. Never fails; an unreadable path or a
    /// malformed data URI degrades to hashing the reference string.
    async fn payload(&self, image: &ImageInput) -> Vec<u8> {
        match image {
            ImageInput::Inline(bytes) => bytes.clone(),
            ImageInput::DataUri(uri) => crate::payload::decode_data_uri(uri)
                .unwrap_or_else(|_| uri.as_bytes().to_vec()),
            ImageInput::Url(url) => url.as_bytes().to_vec(),
            ImageInput::Path(path) => match tokio::fs::read(path).await {
                Ok(bytes) => bytes,
                Err(_) => path.to_string_lossy().as_bytes().to_vec(),
            },
        }
    }
}

impl Default for LocalFallbackProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Rolling hash over the first [`HASH_INPUT_LIMIT`] bytes, one hex word
/// per [`HASH_WINDOW`]-byte window.
fn pseudo_descriptor(payload: &[u8]) -> String {
    let take = &payload[..payload.len().min(HASH_INPUT_LIMIT)];
    if take.is_empty() {
        return "0000".to_string();
    }
    let mut out = String::with_capacity(take.len().div_ceil(HASH_WINDOW) * 4);
    for window in take.chunks(HASH_WINDOW) {
        let mut acc: u32 = 0;
        for &byte in window {
            acc = acc.wrapping_mul(HASH_BASE).wrapping_add(u32::from(byte));
        }
        out.push_str(&format!("{:04x}", acc & 0xffff));
    }
    out
}

/// Normalized edit-distance similarity between two hash strings, scaled
/// under [`SIMILARITY_CEILING`]; identical strings score
/// [`EXACT_MATCH_SCORE`]. Symmetric by construction.
fn hash_similarity(a: &str, b: &str) -> f32 {
    if a == b {
        return EXACT_MATCH_SCORE;
    }
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return EXACT_MATCH_SCORE;
    }
    let distance = levenshtein(a.as_bytes(), b.as_bytes());
    (1.0 - distance as f32 / max_len as f32) * SIMILARITY_CEILING
}

/// Classic two-row Levenshtein distance.
fn levenshtein(a: &[u8], b: &[u8]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

#[async_trait]
impl FaceProvider for LocalFallbackProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::LocalFallback
    }

    async fn extract(&self, image: &ImageInput) -> Result<Option<String>, ProviderError> {
        Ok(Some(pseudo_descriptor(&self.payload(image).await)))
    }

    async fn compare(
        &self,
        probe_id: &str,
        candidate_id: &str,
        _candidate_image: &ImageInput,
    ) -> Result<f32, ProviderError> {
        Ok(hash_similarity(probe_id, candidate_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn descriptor(bytes: &[u8]) -> String {
        LocalFallbackProvider::new()
            .extract(&ImageInput::Inline(bytes.to_vec()))
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn extraction_always_succeeds() {
        let provider = LocalFallbackProvider::new();
        for input in [
            ImageInput::Inline(vec![1, 2, 3]),
            ImageInput::Inline(Vec::new()),
            ImageInput::Url("https://photos.test/a.jpg".into()),
            ImageInput::DataUri("data:image/jpeg;base64,not-base64!!".into()),
            ImageInput::Path("/definitely/not/a/file.jpg".into()),
        ] {
            assert!(provider.extract(&input).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn descriptors_are_deterministic_and_bounded() {
        let a = descriptor(b"same payload").await;
        let b = descriptor(b"same payload").await;
        assert_eq!(a, b);

        let huge = descriptor(&vec![0xAB; 1 << 20]).await;
        assert!(huge.len() <= HASH_INPUT_LIMIT / HASH_WINDOW * 4);
    }

    #[tokio::test]
    async fn identical_hashes_score_exact_match_value() {
        let provider = LocalFallbackProvider::new();
        let h = descriptor(b"payload").await;
        let score = provider
            .compare(&h, &h, &ImageInput::Inline(Vec::new()))
            .await
            .unwrap();
        assert_eq!(score, EXACT_MATCH_SCORE);
        assert!(score < 1.0);
    }

    #[test]
    fn similarity_is_symmetric() {
        let h1 = pseudo_descriptor(b"first payload with some bytes");
        let h2 = pseudo_descriptor(b"second payload, rather different");
        assert_eq!(hash_similarity(&h1, &h2), hash_similarity(&h2, &h1));
        assert_eq!(hash_similarity("", ""), EXACT_MATCH_SCORE);
    }

    #[test]
    fn non_identical_hashes_never_report_high_confidence() {
        let h1 = pseudo_descriptor(b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        let h2 = pseudo_descriptor(b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaab");
        let score = hash_similarity(&h1, &h2);
        assert!(score <= SIMILARITY_CEILING);
        assert!(score >= 0.0);
    }

    #[test]
    fn near_identical_payloads_outscore_disjoint_ones() {
        let base: Vec<u8> = (0..=255u8).cycle().take(512).collect();
        let mut tweaked = base.clone();
        tweaked[500] ^= 0xFF;
        let disjoint: Vec<u8> = base.iter().map(|b| b.wrapping_add(97)).collect();

        let h_base = pseudo_descriptor(&base);
        let near = hash_similarity(&h_base, &pseudo_descriptor(&tweaked));
        let far = hash_similarity(&h_base, &pseudo_descriptor(&disjoint));
        assert!(near > far, "near={near} far={far}");
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein(b"kitten", b"sitting"), 3);
        assert_eq!(levenshtein(b"", b"abc"), 3);
        assert_eq!(levenshtein(b"abc", b"abc"), 0);
    }
}
