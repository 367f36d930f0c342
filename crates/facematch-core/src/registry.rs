//! Active-provider resolution with a TTL'd snapshot cache.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::time::Instant;

use crate::store::{ConfigStore, StoreError};
use crate::types::ProviderConfig;

/// How long a loaded config snapshot is served before the backing store
/// is consulted again.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

struct CacheSlot {
    loaded_at: Instant,
    config: Option<ProviderConfig>,
}

/// Resolves the single active + enabled provider configuration.
///
/// The cached value is an immutable snapshot: within the TTL window every
/// call clones it without touching the backing store. Refresh races are
/// benign (last write wins) since the value is re-derived idempotently.
///
/// `None` means "no provider available"; callers treat the matching
/// feature as unavailable, never as a fatal condition.
pub struct ProviderRegistry {
    store: Arc<dyn ConfigStore>,
    ttl: Duration,
    cached: RwLock<Option<CacheSlot>>,
}

impl ProviderRegistry {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self::with_ttl(store, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(store: Arc<dyn ConfigStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            cached: RwLock::new(None),
        }
    }

    /// The active config, served from cache within the TTL window.
    pub async fn get_active(&self) -> Result<Option<ProviderConfig>, StoreError> {
        {
            let guard = self.cached.read().unwrap_or_else(|e| e.into_inner());
            if let Some(slot) = guard.as_ref() {
                if slot.loaded_at.elapsed() < self.ttl {
                    return Ok(slot.config.clone());
                }
            }
        }

        let config = self.store.load_active().await?;
        match &config {
            Some(cfg) => tracing::debug!(
                id = %cfg.id,
                provider = %cfg.provider_type(),
                "provider config reloaded"
            ),
            None => tracing::debug!("no active provider config"),
        }

        let mut guard = self.cached.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(CacheSlot {
            loaded_at: Instant::now(),
            config: config.clone(),
        });
        Ok(config)
    }

    /// Drop the cached snapshot so the next call reloads. Used after
    /// config mutations to avoid serving a stale provider for up to a TTL.
    pub fn invalidate(&self) {
        let mut guard = self.cached.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::types::{ProviderCredentials, ProviderConfig};

    struct CountingStore {
        loads: AtomicUsize,
        config: Option<ProviderConfig>,
    }

    impl CountingStore {
        fn new(config: Option<ProviderConfig>) -> Self {
            Self {
                loads: AtomicUsize::new(0),
                config,
            }
        }

        fn load_count(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ConfigStore for CountingStore {
        async fn load_active(&self) -> Result<Option<ProviderConfig>, StoreError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.config.clone())
        }
    }

    fn local_config() -> ProviderConfig {
        ProviderConfig {
            id: "cfg-local".into(),
            credentials: ProviderCredentials::LocalFallback,
            active: true,
            enabled: true,
            similarity_threshold: 0.6,
            max_results: 10,
            updated_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn serves_cached_config_within_ttl() {
        let store = Arc::new(CountingStore::new(Some(local_config())));
        let registry = ProviderRegistry::new(Arc::clone(&store) as Arc<dyn ConfigStore>);

        let first = registry.get_active().await.unwrap().unwrap();
        let second = registry.get_active().await.unwrap().unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.load_count(), 1, "second call must not re-read the store");
    }

    #[tokio::test(start_paused = true)]
    async fn reloads_exactly_once_after_ttl_expiry() {
        let store = Arc::new(CountingStore::new(Some(local_config())));
        let registry = ProviderRegistry::new(Arc::clone(&store) as Arc<dyn ConfigStore>);

        registry.get_active().await.unwrap();
        tokio::time::advance(DEFAULT_CACHE_TTL + Duration::from_secs(1)).await;

        registry.get_active().await.unwrap();
        assert_eq!(store.load_count(), 2);

        // Back within the fresh window: still 2.
        registry.get_active().await.unwrap();
        assert_eq!(store.load_count(), 2);
    }

    #[tokio::test]
    async fn absent_config_is_none_not_error() {
        let store = Arc::new(CountingStore::new(None));
        let registry = ProviderRegistry::new(store as Arc<dyn ConfigStore>);

        assert!(registry.get_active().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn absent_config_is_cached_too() {
        let store = Arc::new(CountingStore::new(None));
        let registry = ProviderRegistry::new(Arc::clone(&store) as Arc<dyn ConfigStore>);

        registry.get_active().await.unwrap();
        registry.get_active().await.unwrap();
        assert_eq!(store.load_count(), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_reload() {
        let store = Arc::new(CountingStore::new(Some(local_config())));
        let registry = ProviderRegistry::new(Arc::clone(&store) as Arc<dyn ConfigStore>);

        registry.get_active().await.unwrap();
        registry.invalidate();
        registry.get_active().await.unwrap();

        assert_eq!(store.load_count(), 2);
    }
}
