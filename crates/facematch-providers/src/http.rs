//! Shared HTTP plumbing for the cloud-backed providers.

use facematch_core::ProviderError;

/// Map a completed response into the provider error taxonomy.
///
/// 401/402/403 are treated as authorization gating (the vendor-specific
/// "feature requires authorization" family) so batch reports can collapse
/// them into a single advisory.
pub(crate) async fn require_success(
    resp: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let detail = resp.text().await.unwrap_or_default();
    if matches!(status.as_u16(), 401 | 402 | 403) {
        return Err(ProviderError::AuthorizationRequired(format!(
            "HTTP {status}: {detail}"
        )));
    }
    Err(ProviderError::Status {
        status: status.as_u16(),
        detail,
    })
}

/// Wire-level failure: the request never produced a response.
pub(crate) fn request_err(err: reqwest::Error) -> ProviderError {
    ProviderError::Request(err.to_string())
}

/// Join a configured endpoint with an API path, tolerating trailing slashes.
pub(crate) fn join_url(endpoint: &str, path: &str) -> String {
    format!("{}{path}", endpoint.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_tolerates_trailing_slash() {
        assert_eq!(
            join_url("https://api.test/", "/v1/extract"),
            "https://api.test/v1/extract"
        );
        assert_eq!(
            join_url("https://api.test", "/v1/extract"),
            "https://api.test/v1/extract"
        );
    }
}
