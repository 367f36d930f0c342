use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// TTL of the cached active-provider config.
    pub cache_ttl: Duration,
    /// Per-call timeout for backend HTTP requests.
    pub http_timeout: Duration,
    /// Candidates processed concurrently per regeneration batch.
    pub batch_size: usize,
    /// Pause between regeneration batches (vendor rate limiting).
    pub batch_delay: Duration,
    /// Cap on concurrent candidate comparisons during a search.
    pub compare_concurrency: usize,
}

impl Config {
    /// Load configuration from `FACEMATCH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facematch");

        let db_path = std::env::var("FACEMATCH_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("facematch.db"));

        Self {
            db_path,
            cache_ttl: Duration::from_secs(env_u64("FACEMATCH_CACHE_TTL_SECS", 300)),
            http_timeout: Duration::from_secs(env_u64("FACEMATCH_HTTP_TIMEOUT_SECS", 10)),
            batch_size: env_usize("FACEMATCH_BATCH_SIZE", 5),
            batch_delay: Duration::from_millis(env_u64("FACEMATCH_BATCH_DELAY_MS", 1000)),
            compare_concurrency: env_usize("FACEMATCH_COMPARE_CONCURRENCY", 4),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
