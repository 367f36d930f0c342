//! cloud_b adapter — detect/verify backend with expiring face ids.
//!
//! Detected face ids are only valid for 24 hours on the backend. Stored
//! descriptors past that window are screened out by the engine, and
//! `compare` never trusts the stored side-B id at all: it re-detects a
//! fresh id from the candidate image before calling the verify primitive.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use facematch_core::{FaceProvider, ImageInput, ProviderError, ProviderType};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::http::{join_url, request_err, require_success};
use crate::payload;

const DETECT_PATH: &str = "/face/v1.0/detect";
const VERIFY_PATH: &str = "/face/v1.0/verify";

/// Backend-side lifetime of a detected face id.
pub const DESCRIPTOR_VALIDITY_HOURS: i64 = 24;

pub struct CloudBProvider {
    client: Client,
    endpoint: String,
    subscription_key: String,
    http_timeout: Duration,
}

impl CloudBProvider {
    pub fn new(endpoint: String, subscription_key: String, http_timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            subscription_key,
            http_timeout,
        }
    }

    async fn detect(&self, image: &ImageInput) -> Result<Option<String>, ProviderError> {
        let bytes = payload::load_bytes(&self.client, self.http_timeout, image).await?;
        let bytes = payload::normalize_jpeg(&bytes);

        let resp = self
            .client
            .post(join_url(&self.endpoint, DETECT_PATH))
            .timeout(self.http_timeout)
            .header("Ocp-Apim-Subscription-Key", &self.subscription_key)
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(request_err)?;
        let resp = require_success(resp).await?;

        let faces: Vec<DetectedFace> = resp
            .json()
            .await
            .map_err(|e| ProviderError::Response(e.to_string()))?;
        Ok(faces.into_iter().next().map(|f| f.face_id))
    }
}

#[derive(Deserialize)]
struct DetectedFace {
    #[serde(rename = "faceId")]
    face_id: String,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    #[serde(rename = "faceId1")]
    face_id1: &'a str,
    #[serde(rename = "faceId2")]
    face_id2: &'a str,
}

#[derive(Deserialize)]
struct VerifyResponse {
    confidence: f32,
}

#[async_trait]
impl FaceProvider for CloudBProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::CloudB
    }

    fn descriptor_validity(&self) -> Option<ChronoDuration> {
        Some(ChronoDuration::hours(DESCRIPTOR_VALIDITY_HOURS))
    }

    async fn extract(&self, image: &ImageInput) -> Result<Option<String>, ProviderError> {
        self.detect(image).await
    }

    async fn compare(
        &self,
        probe_id: &str,
        _candidate_id: &str,
        candidate_image: &ImageInput,
    ) -> Result<f32, ProviderError> {
        // The stored side-B id may have expired server-side at any point;
        // a fresh detection is the only id that is guaranteed verifiable.
        let Some(fresh_candidate) = self.detect(candidate_image).await? else {
            return Ok(0.0);
        };

        let body = VerifyRequest {
            face_id1: probe_id,
            face_id2: &fresh_candidate,
        };
        let resp = self
            .client
            .post(join_url(&self.endpoint, VERIFY_PATH))
            .timeout(self.http_timeout)
            .header("Ocp-Apim-Subscription-Key", &self.subscription_key)
            .json(&body)
            .send()
            .await
            .map_err(request_err)?;
        let resp = require_success(resp).await?;

        let parsed: VerifyResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Response(e.to_string()))?;
        Ok(parsed.confidence.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_response_takes_first_face_id() {
        let faces: Vec<DetectedFace> =
            serde_json::from_str(r#"[{"faceId": "b-1"}, {"faceId": "b-2"}]"#).unwrap();
        assert_eq!(
            faces.into_iter().next().map(|f| f.face_id),
            Some("b-1".to_string())
        );
    }

    #[test]
    fn verify_request_uses_vendor_field_names() {
        let body = VerifyRequest {
            face_id1: "a",
            face_id2: "b",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["faceId1"], "a");
        assert_eq!(json["faceId2"], "b");
    }

    #[test]
    fn advertises_24h_descriptor_validity() {
        let provider = CloudBProvider::new(
            "https://face.test".into(),
            "key".into(),
            Duration::from_secs(5),
        );
        assert_eq!(
            provider.descriptor_validity(),
            Some(ChronoDuration::hours(24))
        );
    }
}
