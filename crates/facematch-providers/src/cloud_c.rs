//! cloud_c adapter — project-scoped annotate/match backend.
//!
//! Authenticates with a bearer token carried in the opaque credentials
//! blob (either a bare token or a JSON object with a `token` field).
//! Descriptor ids are project-scoped annotation names and do not expire.

use std::time::Duration;

use async_trait::async_trait;
use facematch_core::{FaceProvider, ImageInput, ProviderError, ProviderType};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::http::{join_url, request_err, require_success};
use crate::payload;

const BASE_ENDPOINT: &str = "https://vision.cloud-c.example.com";

pub struct CloudCProvider {
    client: Client,
    project_id: String,
    token: String,
    http_timeout: Duration,
}

impl CloudCProvider {
    pub fn new(project_id: String, credentials_json: String, http_timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            project_id,
            token: bearer_token(&credentials_json),
            http_timeout,
        }
    }

    fn annotate_url(&self) -> String {
        join_url(
            BASE_ENDPOINT,
            &format!("/v1/projects/{}/faces:annotate", self.project_id),
        )
    }

    fn match_url(&self) -> String {
        join_url(
            BASE_ENDPOINT,
            &format!("/v1/projects/{}/faces:match", self.project_id),
        )
    }
}

/// The credentials blob is opaque to the engine; this adapter accepts a
/// JSON object carrying a `token` field, or treats the whole blob as the
/// token when it is not such an object.
fn bearer_token(credentials_json: &str) -> String {
    #[derive(Deserialize)]
    struct Credentials {
        token: String,
    }
    match serde_json::from_str::<Credentials>(credentials_json) {
        Ok(creds) => creds.token,
        Err(_) => credentials_json.trim().to_string(),
    }
}

#[derive(Serialize)]
struct AnnotateRequest {
    image: String,
}

#[derive(Deserialize)]
struct AnnotateResponse {
    annotations: Vec<FaceAnnotation>,
}

#[derive(Deserialize)]
struct FaceAnnotation {
    name: String,
}

#[derive(Serialize)]
struct MatchRequest<'a> {
    face_a: &'a str,
    face_b: &'a str,
}

#[derive(Deserialize)]
struct MatchResponse {
    score: f32,
}

#[async_trait]
impl FaceProvider for CloudCProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::CloudC
    }

    async fn extract(&self, image: &ImageInput) -> Result<Option<String>, ProviderError> {
        let bytes = payload::load_bytes(&self.client, self.http_timeout, image).await?;
        let body = AnnotateRequest {
            image: payload::to_base64(&payload::normalize_jpeg(&bytes)),
        };

        let resp = self
            .client
            .post(self.annotate_url())
            .timeout(self.http_timeout)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(request_err)?;
        let resp = require_success(resp).await?;

        let parsed: AnnotateResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Response(e.to_string()))?;
        Ok(parsed.annotations.into_iter().next().map(|a| a.name))
    }

    async fn compare(
        &self,
        probe_id: &str,
        candidate_id: &str,
        _candidate_image: &ImageInput,
    ) -> Result<f32, ProviderError> {
        let body = MatchRequest {
            face_a: probe_id,
            face_b: candidate_id,
        };

        let resp = self
            .client
            .post(self.match_url())
            .timeout(self.http_timeout)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(request_err)?;
        let resp = require_success(resp).await?;

        let parsed: MatchResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Response(e.to_string()))?;
        Ok(parsed.score.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_prefers_json_token_field() {
        assert_eq!(bearer_token(r#"{"token": "tok-123"}"#), "tok-123");
        assert_eq!(bearer_token("  raw-token  "), "raw-token");
    }

    #[test]
    fn urls_are_project_scoped() {
        let provider = CloudCProvider::new(
            "proj-9".into(),
            "tok".into(),
            Duration::from_secs(5),
        );
        assert_eq!(
            provider.annotate_url(),
            "https://vision.cloud-c.example.com/v1/projects/proj-9/faces:annotate"
        );
        assert_eq!(
            provider.match_url(),
            "https://vision.cloud-c.example.com/v1/projects/proj-9/faces:match"
        );
    }

    #[test]
    fn annotate_response_takes_first_annotation() {
        let parsed: AnnotateResponse =
            serde_json::from_str(r#"{"annotations": [{"name": "faces/1"}]}"#).unwrap();
        assert_eq!(
            parsed.annotations.into_iter().next().map(|a| a.name),
            Some("faces/1".to_string())
        );
    }
}
