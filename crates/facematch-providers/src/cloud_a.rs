//! cloud_a adapter — collection-indexing backend, signed-key auth family.
//!
//! Descriptor ids are face ids indexed into a server-side collection and
//! do not expire. Similarity comes back on a 0–100 scale and is normalized
//! here. This adapter speaks the backend's REST shape directly; a
//! production deployment swaps in the vendor SDK behind the same
//! [`FaceProvider`] surface without touching search or batch code.

use std::time::Duration;

use async_trait::async_trait;
use facematch_core::{FaceProvider, ImageInput, ProviderError, ProviderType};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::http::{join_url, request_err, require_success};
use crate::payload;

const INDEX_PATH: &str = "/v1/faces:index";
const COMPARE_PATH: &str = "/v1/faces:compare";

pub struct CloudAProvider {
    client: Client,
    access_key_id: String,
    secret_access_key: String,
    endpoint: String,
    http_timeout: Duration,
}

impl CloudAProvider {
    pub fn new(
        access_key_id: String,
        secret_access_key: String,
        region: String,
        http_timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            access_key_id,
            secret_access_key,
            endpoint: format!("https://faces.{region}.cloud-a.example.com"),
            http_timeout,
        }
    }
}

#[derive(Serialize)]
struct IndexRequest {
    image: String,
}

#[derive(Deserialize)]
struct IndexResponse {
    face_records: Vec<FaceRecord>,
}

#[derive(Deserialize)]
struct FaceRecord {
    face_id: String,
}

#[derive(Serialize)]
struct CompareRequest<'a> {
    source_face_id: &'a str,
    target_face_id: &'a str,
}

#[derive(Deserialize)]
struct CompareResponse {
    /// Vendor scale: 0–100.
    similarity: f32,
}

#[async_trait]
impl FaceProvider for CloudAProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::CloudA
    }

    async fn extract(&self, image: &ImageInput) -> Result<Option<String>, ProviderError> {
        let bytes = payload::load_bytes(&self.client, self.http_timeout, image).await?;
        let body = IndexRequest {
            image: payload::to_base64(&payload::normalize_jpeg(&bytes)),
        };

        let resp = self
            .client
            .post(join_url(&self.endpoint, INDEX_PATH))
            .timeout(self.http_timeout)
            .header("X-Access-Key-Id", &self.access_key_id)
            .header("X-Secret-Access-Key", &self.secret_access_key)
            .json(&body)
            .send()
            .await
            .map_err(request_err)?;
        let resp = require_success(resp).await?;

        let parsed: IndexResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Response(e.to_string()))?;
        Ok(parsed.face_records.into_iter().next().map(|r| r.face_id))
    }

    async fn compare(
        &self,
        probe_id: &str,
        candidate_id: &str,
        _candidate_image: &ImageInput,
    ) -> Result<f32, ProviderError> {
        let body = CompareRequest {
            source_face_id: probe_id,
            target_face_id: candidate_id,
        };

        let resp = self
            .client
            .post(join_url(&self.endpoint, COMPARE_PATH))
            .timeout(self.http_timeout)
            .header("X-Access-Key-Id", &self.access_key_id)
            .header("X-Secret-Access-Key", &self.secret_access_key)
            .json(&body)
            .send()
            .await
            .map_err(request_err)?;
        let resp = require_success(resp).await?;

        let parsed: CompareResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Response(e.to_string()))?;
        Ok((parsed.similarity / 100.0).clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_response_takes_first_face() {
        let parsed: IndexResponse = serde_json::from_str(
            r#"{"face_records": [{"face_id": "f-1"}, {"face_id": "f-2"}]}"#,
        )
        .unwrap();
        assert_eq!(
            parsed.face_records.into_iter().next().map(|r| r.face_id),
            Some("f-1".to_string())
        );
    }

    #[test]
    fn similarity_normalizes_vendor_scale() {
        let parsed: CompareResponse = serde_json::from_str(r#"{"similarity": 87.5}"#).unwrap();
        assert!(((parsed.similarity / 100.0) - 0.875).abs() < 1e-6);
    }

    #[test]
    fn endpoint_derives_from_region() {
        let provider = CloudAProvider::new(
            "ak".into(),
            "sk".into(),
            "eu-west-1".into(),
            Duration::from_secs(5),
        );
        assert_eq!(
            provider.endpoint,
            "https://faces.eu-west-1.cloud-a.example.com"
        );
    }
}
