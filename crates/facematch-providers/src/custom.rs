//! custom_http adapter — self-hosted recognition services.
//!
//! Speaks a minimal JSON protocol: `POST /extract` with a base64 image
//! returns `{"descriptor_id": "..."}` (or null when no face is found),
//! `POST /compare` with two descriptor ids returns `{"similarity": 0.x}`.
//! Deployments whose descriptor ids expire declare the window via the
//! `descriptor_ttl_hours` key of the config's `extra` object; compare then
//! re-extracts the candidate side instead of trusting the stored id.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use facematch_core::{FaceProvider, ImageInput, ProviderError, ProviderType};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::http::{join_url, request_err, require_success};
use crate::payload;

const EXTRACT_PATH: &str = "/extract";
const COMPARE_PATH: &str = "/compare";

pub struct CustomHttpProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    descriptor_ttl: Option<ChronoDuration>,
    http_timeout: Duration,
}

impl CustomHttpProvider {
    pub fn new(
        endpoint: String,
        api_key: String,
        extra: &serde_json::Map<String, serde_json::Value>,
        http_timeout: Duration,
    ) -> Self {
        let descriptor_ttl = extra
            .get("descriptor_ttl_hours")
            .and_then(|v| v.as_i64())
            .filter(|hours| *hours > 0)
            .map(ChronoDuration::hours);
        Self {
            client: Client::new(),
            endpoint,
            api_key,
            descriptor_ttl,
            http_timeout,
        }
    }
}

#[derive(Serialize)]
struct ExtractRequest {
    image: String,
}

#[derive(Deserialize)]
struct ExtractResponse {
    descriptor_id: Option<String>,
}

#[derive(Serialize)]
struct CompareRequest<'a> {
    probe_id: &'a str,
    candidate_id: &'a str,
}

#[derive(Deserialize)]
struct CompareResponse {
    similarity: f32,
}

#[async_trait]
impl FaceProvider for CustomHttpProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::CustomHttp
    }

    fn descriptor_validity(&self) -> Option<ChronoDuration> {
        self.descriptor_ttl
    }

    async fn extract(&self, image: &ImageInput) -> Result<Option<String>, ProviderError> {
        let bytes = payload::load_bytes(&self.client, self.http_timeout, image).await?;
        let body = ExtractRequest {
            image: payload::to_base64(&payload::normalize_jpeg(&bytes)),
        };

        let resp = self
            .client
            .post(join_url(&self.endpoint, EXTRACT_PATH))
            .timeout(self.http_timeout)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(request_err)?;
        let resp = require_success(resp).await?;

        let parsed: ExtractResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Response(e.to_string()))?;
        Ok(parsed.descriptor_id)
    }

    async fn compare(
        &self,
        probe_id: &str,
        candidate_id: &str,
        candidate_image: &ImageInput,
    ) -> Result<f32, ProviderError> {
        // For expiring deployments the stored id may be stale; use a fresh
        // extraction as side B, mirroring the expiring cloud backend.
        let fresh;
        let candidate_id = if self.descriptor_ttl.is_some() {
            match self.extract(candidate_image).await? {
                Some(id) => {
                    fresh = id;
                    fresh.as_str()
                }
                None => return Ok(0.0),
            }
        } else {
            candidate_id
        };

        let body = CompareRequest {
            probe_id,
            candidate_id,
        };
        let resp = self
            .client
            .post(join_url(&self.endpoint, COMPARE_PATH))
            .timeout(self.http_timeout)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(request_err)?;
        let resp = require_success(resp).await?;

        let parsed: CompareResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Response(e.to_string()))?;
        Ok(parsed.similarity.clamp(0.0, 1.0))
    }
}
