//! facematch-providers — recognition-backend implementations.
//!
//! One [`FaceProvider`] per provider type, plus the factory that maps an
//! active [`ProviderConfig`] onto its implementation. All backends honor
//! the engine's soft-fail contract: transport and gating failures surface
//! as [`facematch_core::ProviderError`] and are absorbed by the engine.

use std::sync::Arc;
use std::time::Duration;

use facematch_core::{FaceProvider, ProviderConfig, ProviderCredentials, ProviderFactory};

mod cloud_a;
mod cloud_b;
mod cloud_c;
mod custom;
mod http;
mod local;
mod payload;

pub use cloud_a::CloudAProvider;
pub use cloud_b::CloudBProvider;
pub use cloud_c::CloudCProvider;
pub use custom::CustomHttpProvider;
pub use local::LocalFallbackProvider;

/// Upper bound on any single backend call. The upstream design carried no
/// per-call timeout; one is required here to bound worst-case search and
/// batch latency.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Maps configs onto provider implementations by their discriminant.
pub struct DefaultProviderFactory {
    http_timeout: Duration,
}

impl DefaultProviderFactory {
    pub fn new() -> Self {
        Self {
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

impl Default for DefaultProviderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderFactory for DefaultProviderFactory {
    fn create(&self, config: &ProviderConfig) -> Arc<dyn FaceProvider> {
        match &config.credentials {
            ProviderCredentials::CloudA {
                access_key_id,
                secret_access_key,
                region,
            } => Arc::new(CloudAProvider::new(
                access_key_id.clone(),
                secret_access_key.clone(),
                region.clone(),
                self.http_timeout,
            )),
            ProviderCredentials::CloudB {
                endpoint,
                subscription_key,
            } => Arc::new(CloudBProvider::new(
                endpoint.clone(),
                subscription_key.clone(),
                self.http_timeout,
            )),
            ProviderCredentials::CloudC {
                project_id,
                credentials_json,
            } => Arc::new(CloudCProvider::new(
                project_id.clone(),
                credentials_json.clone(),
                self.http_timeout,
            )),
            ProviderCredentials::CustomHttp {
                endpoint,
                api_key,
                extra,
            } => Arc::new(CustomHttpProvider::new(
                endpoint.clone(),
                api_key.clone(),
                extra,
                self.http_timeout,
            )),
            ProviderCredentials::LocalFallback => Arc::new(LocalFallbackProvider::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use facematch_core::ProviderType;

    fn config(credentials: ProviderCredentials) -> ProviderConfig {
        ProviderConfig {
            id: "cfg".into(),
            credentials,
            active: true,
            enabled: true,
            similarity_threshold: 0.5,
            max_results: 10,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn factory_covers_every_discriminant() {
        let factory = DefaultProviderFactory::new();
        let cases = [
            (
                ProviderCredentials::CloudA {
                    access_key_id: "ak".into(),
                    secret_access_key: "sk".into(),
                    region: "us-east-1".into(),
                },
                ProviderType::CloudA,
            ),
            (
                ProviderCredentials::CloudB {
                    endpoint: "https://b.test".into(),
                    subscription_key: "k".into(),
                },
                ProviderType::CloudB,
            ),
            (
                ProviderCredentials::CloudC {
                    project_id: "p".into(),
                    credentials_json: "tok".into(),
                },
                ProviderType::CloudC,
            ),
            (
                ProviderCredentials::CustomHttp {
                    endpoint: "https://c.test".into(),
                    api_key: "k".into(),
                    extra: serde_json::Map::new(),
                },
                ProviderType::CustomHttp,
            ),
            (ProviderCredentials::LocalFallback, ProviderType::LocalFallback),
        ];

        for (credentials, expected) in cases {
            let provider = factory.create(&config(credentials));
            assert_eq!(provider.provider_type(), expected);
        }
    }

    #[test]
    fn only_expiring_backends_advertise_validity() {
        let factory = DefaultProviderFactory::new();

        let b = factory.create(&config(ProviderCredentials::CloudB {
            endpoint: "https://b.test".into(),
            subscription_key: "k".into(),
        }));
        assert!(b.descriptor_validity().is_some());

        let local = factory.create(&config(ProviderCredentials::LocalFallback));
        assert!(local.descriptor_validity().is_none());
    }
}
