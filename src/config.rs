//! Runtime configuration.
//!
//! Both configs follow the same shape: `new()` gives defaults and `from_env()`
//! overrides them from `ACCOUNT_SYNC_*` environment variables. Unparseable
//! values fall back to the default.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default debounce window between the last mutation and the flush.
pub const DEFAULT_DEBOUNCE_MS: u64 = 2_000;

/// Default bound on the offline queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 200;

/// Default number of transient failures before a queued write is dropped.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default time a terminate/unload flush may take before it is abandoned.
pub const DEFAULT_UNLOAD_BUDGET_MS: u64 = 1_500;

/// Default delay before retrying after a flush cycle hit a transient failure.
pub const DEFAULT_RETRY_BASE_MS: u64 = 5_000;

/// Default ceiling for the retry delay.
pub const DEFAULT_RETRY_MAX_MS: u64 = 300_000;

/// Default per-request timeout for the HTTP remote.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

const DEFAULT_CACHE_DIR: &str = ".account-sync/cache";
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 3000);

/// Configuration for the client-side sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Root directory for per-account cache directories.
    ///
    /// Configure via `ACCOUNT_SYNC_CACHE_DIR`.
    pub cache_dir: PathBuf,

    /// Debounce window. Configure via `ACCOUNT_SYNC_DEBOUNCE_MS`.
    pub debounce_delay: Duration,

    /// Offline queue bound. Configure via `ACCOUNT_SYNC_QUEUE_CAPACITY`.
    pub queue_capacity: usize,

    /// Attempts per queued write. Configure via `ACCOUNT_SYNC_MAX_ATTEMPTS`.
    pub max_attempts: u32,

    /// Budget for flushes triggered by terminate/unload.
    ///
    /// Configure via `ACCOUNT_SYNC_UNLOAD_BUDGET_MS`.
    pub unload_flush_budget: Duration,

    /// Per-request timeout for the HTTP remote.
    ///
    /// Configure via `ACCOUNT_SYNC_REQUEST_TIMEOUT_SECS`.
    pub request_timeout: Duration,

    /// Delay before the first retry after a failed cycle; doubles with each
    /// consecutive failed cycle. Configure via `ACCOUNT_SYNC_RETRY_BASE_MS`.
    pub retry_base_delay: Duration,

    /// Upper bound on the retry delay. Configure via `ACCOUNT_SYNC_RETRY_MAX_MS`.
    pub retry_max_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncConfig {
    /// Creates a `SyncConfig` with default values.
    pub fn new() -> Self {
        SyncConfig {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            debounce_delay: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            unload_flush_budget: Duration::from_millis(DEFAULT_UNLOAD_BUDGET_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            retry_base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_MS),
            retry_max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_MS),
        }
    }

    /// Retry delay after `failed_cycles` consecutive failed flush cycles:
    /// `retry_base_delay * 2^failed_cycles`, capped at `retry_max_delay`.
    pub fn retry_delay(&self, failed_cycles: u32) -> Duration {
        let factor = 2u32.saturating_pow(failed_cycles);
        self.retry_base_delay
            .saturating_mul(factor)
            .min(self.retry_max_delay)
    }

    /// Creates a `SyncConfig` rooted at `cache_dir`, other values default.
    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        SyncConfig {
            cache_dir: cache_dir.into(),
            ..Self::new()
        }
    }

    /// Creates a `SyncConfig` from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates a `SyncConfig` from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::new();
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());

        SyncConfig {
            cache_dir: lookup("ACCOUNT_SYNC_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            debounce_delay: parsed("ACCOUNT_SYNC_DEBOUNCE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.debounce_delay),
            queue_capacity: parsed("ACCOUNT_SYNC_QUEUE_CAPACITY")
                .filter(|n| *n > 0)
                .map(|n| n as usize)
                .unwrap_or(defaults.queue_capacity),
            max_attempts: parsed("ACCOUNT_SYNC_MAX_ATTEMPTS")
                .filter(|n| *n > 0)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.max_attempts),
            unload_flush_budget: parsed("ACCOUNT_SYNC_UNLOAD_BUDGET_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.unload_flush_budget),
            request_timeout: parsed("ACCOUNT_SYNC_REQUEST_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            retry_base_delay: parsed("ACCOUNT_SYNC_RETRY_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_base_delay),
            retry_max_delay: parsed("ACCOUNT_SYNC_RETRY_MAX_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_max_delay),
        }
    }
}

/// Configuration for the account service binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen address. Configure via `ACCOUNT_SYNC_BIND_ADDR`.
    pub bind_addr: SocketAddr,

    /// Directory holding the persisted store. Configure via `ACCOUNT_SYNC_DATA_DIR`.
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConfig {
    /// Creates a `ServerConfig` with default values.
    pub fn new() -> Self {
        ServerConfig {
            bind_addr: SocketAddr::from(DEFAULT_BIND_ADDR),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }

    /// Creates a `ServerConfig` from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates a `ServerConfig` from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::new();
        ServerConfig {
            bind_addr: lookup("ACCOUNT_SYNC_BIND_ADDR")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.bind_addr),
            data_dir: lookup("ACCOUNT_SYNC_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
        }
    }

    /// Path of the persisted store file.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("accounts.json")
    }
}
