use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Discriminant for the recognition backend that produced a descriptor.
///
/// Descriptors are opaque strings namespaced by this value: two descriptors
/// are only ever comparable when they carry the same provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    CloudA,
    CloudB,
    CloudC,
    CustomHttp,
    LocalFallback,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::CloudA => "cloud_a",
            ProviderType::CloudB => "cloud_b",
            ProviderType::CloudC => "cloud_c",
            ProviderType::CustomHttp => "custom_http",
            ProviderType::LocalFallback => "local_fallback",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown provider type: {0}")]
pub struct UnknownProviderType(pub String);

impl FromStr for ProviderType {
    type Err = UnknownProviderType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cloud_a" => Ok(ProviderType::CloudA),
            "cloud_b" => Ok(ProviderType::CloudB),
            "cloud_c" => Ok(ProviderType::CloudC),
            "custom_http" => Ok(ProviderType::CustomHttp),
            "local_fallback" => Ok(ProviderType::LocalFallback),
            other => Err(UnknownProviderType(other.to_string())),
        }
    }
}

/// Backend-specific credentials. The serialized form carries the
/// `provider_type` discriminant, so a config blob is self-describing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider_type", rename_all = "snake_case")]
pub enum ProviderCredentials {
    CloudA {
        access_key_id: String,
        secret_access_key: String,
        region: String,
    },
    CloudB {
        endpoint: String,
        subscription_key: String,
    },
    CloudC {
        project_id: String,
        credentials_json: String,
    },
    CustomHttp {
        endpoint: String,
        api_key: String,
        #[serde(default)]
        extra: serde_json::Map<String, serde_json::Value>,
    },
    LocalFallback,
}

impl ProviderCredentials {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderCredentials::CloudA { .. } => ProviderType::CloudA,
            ProviderCredentials::CloudB { .. } => ProviderType::CloudB,
            ProviderCredentials::CloudC { .. } => ProviderType::CloudC,
            ProviderCredentials::CustomHttp { .. } => ProviderType::CustomHttp,
            ProviderCredentials::LocalFallback => ProviderType::LocalFallback,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("similarity_threshold {0} outside [0, 1]")]
    ThresholdOutOfRange(f32),
    #[error("max_results must be at least 1")]
    ZeroMaxResults,
}

fn default_enabled() -> bool {
    true
}

fn default_max_results() -> usize {
    10
}

/// A registered recognition-backend configuration.
///
/// At most one config may be both `active` and `enabled` at any time; the
/// config store enforces that invariant on write. When none qualifies the
/// engine degrades to "no provider available" rather than erroring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub credentials: ProviderCredentials,
    #[serde(default)]
    pub active: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub similarity_threshold: f32,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl ProviderConfig {
    pub fn provider_type(&self) -> ProviderType {
        self.credentials.provider_type()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.similarity_threshold));
        }
        if self.max_results == 0 {
            return Err(ConfigError::ZeroMaxResults);
        }
        Ok(())
    }
}

/// Lifecycle state of an entity's descriptor record.
///
/// `Pending` marks a soft extraction failure: the attempt ran but the
/// backend could not produce a descriptor. Pending records stay retryable
/// forever; re-running extraction can move them to `Extracted` once the
/// backend becomes usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorStatus {
    Extracted,
    Pending,
    None,
}

impl DescriptorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DescriptorStatus::Extracted => "extracted",
            DescriptorStatus::Pending => "pending",
            DescriptorStatus::None => "none",
        }
    }
}

impl fmt::Display for DescriptorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown descriptor status: {0}")]
pub struct UnknownDescriptorStatus(pub String);

impl FromStr for DescriptorStatus {
    type Err = UnknownDescriptorStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "extracted" => Ok(DescriptorStatus::Extracted),
            "pending" => Ok(DescriptorStatus::Pending),
            "none" => Ok(DescriptorStatus::None),
            other => Err(UnknownDescriptorStatus(other.to_string())),
        }
    }
}

/// One descriptor record per entity, keyed by `entity_id`. Latest write
/// wins; there is no history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorRecord {
    pub entity_id: String,
    pub descriptor_id: Option<String>,
    pub provider_type: ProviderType,
    pub source_photo_url: String,
    pub status: DescriptorStatus,
    pub updated_at: DateTime<Utc>,
}

impl DescriptorRecord {
    pub fn extracted(
        entity_id: impl Into<String>,
        provider_type: ProviderType,
        source_photo_url: impl Into<String>,
        descriptor_id: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            descriptor_id: Some(descriptor_id.into()),
            provider_type,
            source_photo_url: source_photo_url.into(),
            status: DescriptorStatus::Extracted,
            updated_at: Utc::now(),
        }
    }

    pub fn pending(
        entity_id: impl Into<String>,
        provider_type: ProviderType,
        source_photo_url: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            descriptor_id: None,
            provider_type,
            source_photo_url: source_photo_url.into(),
            status: DescriptorStatus::Pending,
            updated_at: Utc::now(),
        }
    }

    pub fn unprocessed(
        entity_id: impl Into<String>,
        provider_type: ProviderType,
        source_photo_url: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            descriptor_id: None,
            provider_type,
            source_photo_url: source_photo_url.into(),
            status: DescriptorStatus::None,
            updated_at: Utc::now(),
        }
    }

    /// Return the stored descriptor id if it is directly usable for a
    /// comparison under the given provider type: same backend, extraction
    /// succeeded, and the id is not known-expired under `validity`.
    pub fn usable_descriptor(
        &self,
        provider_type: ProviderType,
        validity: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Option<&str> {
        if self.provider_type != provider_type || self.status != DescriptorStatus::Extracted {
            return None;
        }
        if let Some(window) = validity {
            if now.signed_duration_since(self.updated_at) >= window {
                return None;
            }
        }
        self.descriptor_id.as_deref()
    }
}

/// An entity with a registered photo, as supplied by the external corpus.
/// Display fields are denormalized into match results untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateEntity {
    pub entity_id: String,
    pub photo_url: String,
    pub name: String,
    pub phone: Option<String>,
    pub status: Option<String>,
}

/// A candidate that matched the query above the similarity threshold.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub similarity: f32,
    #[serde(flatten)]
    pub entity: CandidateEntity,
}

/// An image handed to the engine: a fetchable remote URL, an inline byte
/// payload, a `data:` URI, or (for local tooling) a filesystem path.
///
/// Materializing the actual bytes is the provider's concern; fetch and
/// decode failures surface as provider errors and soft-fail at the engine
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInput {
    Url(String),
    DataUri(String),
    Inline(Vec<u8>),
    Path(PathBuf),
}

impl ImageInput {
    /// Classify a raw image reference string.
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("data:") {
            ImageInput::DataUri(raw.to_string())
        } else if raw.starts_with("http://") || raw.starts_with("https://") {
            ImageInput::Url(raw.to_string())
        } else {
            ImageInput::Path(PathBuf::from(raw))
        }
    }
}
