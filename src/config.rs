//! Configuration for the opcode optimization processor.
//!
//! Defaults mirror production sizing. Every field can be overridden from the
//! environment through [`OptimizerConfig::from_env`]:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `OPFUSION_ENABLED` | `enabled` (`1`/`true`/`yes`/`on`) |
//! | `OPFUSION_WORKERS` | `worker_threads` |
//! | `OPFUSION_QUEUE_CAPACITY` | `queue_capacity` |
//! | `OPFUSION_CACHE_HARD_LIMIT` | `cache_hard_threshold` (bytes) |
//! | `OPFUSION_CACHE_SOFT_LIMIT` | `cache_soft_limit` (bytes) |
//! | `OPFUSION_EVICTION` | `eviction` (`full-clear` or `lru`) |
//!
//! Unparseable or zero values fall back to the default. A soft limit at or
//! above the hard threshold resets both cache limits to their defaults.

use std::fmt;
use std::str::FromStr;

/// Aggregate code size at which the cache starts evicting (1 GiB)
pub const DEFAULT_CACHE_HARD_THRESHOLD: u64 = 1024 * 1024 * 1024;

/// Headroom reserved below the hard threshold (200 MiB).
/// The largest deployed code bodies are around 25 MB.
pub const DEFAULT_CACHE_SOFT_LIMIT: u64 = 200 * 1024 * 1024;

/// Total number of queued tasks across all worker shards
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024 * 1024;

/// Default worker count: three eighths of the available cores, at least one
pub fn default_worker_threads() -> usize {
    (num_cpus::get() * 3 / 8).max(1)
}

/// Which eviction policy the code cache runs when it fills up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionKind {
    /// Drop every entry once the size threshold is crossed
    #[default]
    FullClear,
    /// Drop least recently used entries until the new entry fits
    Lru,
}

impl FromStr for EvictionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full-clear" | "full_clear" | "clear" => Ok(EvictionKind::FullClear),
            "lru" => Ok(EvictionKind::Lru),
            other => Err(format!("unknown eviction policy: {}", other)),
        }
    }
}

impl fmt::Display for EvictionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionKind::FullClear => write!(f, "full-clear"),
            EvictionKind::Lru => write!(f, "lru"),
        }
    }
}

/// Opcode optimizer configuration
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Initial state of the runtime feature gate
    pub enabled: bool,
    /// Number of background optimization workers
    pub worker_threads: usize,
    /// Total task queue capacity, split evenly across worker shards
    pub queue_capacity: usize,
    /// Aggregate cached code size that triggers eviction
    pub cache_hard_threshold: u64,
    /// Headroom kept free below the hard threshold
    pub cache_soft_limit: u64,
    /// Eviction policy for the code cache
    pub eviction: EvictionKind,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            worker_threads: default_worker_threads(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            cache_hard_threshold: DEFAULT_CACHE_HARD_THRESHOLD,
            cache_soft_limit: DEFAULT_CACHE_SOFT_LIMIT,
            eviction: EvictionKind::FullClear,
        }
    }
}

impl OptimizerConfig {
    /// Build a configuration from `OPFUSION_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let mut config = Self {
            enabled: lookup("OPFUSION_ENABLED")
                .and_then(|s| parse_flag(&s))
                .unwrap_or(defaults.enabled),
            worker_threads: parse_nonzero(lookup("OPFUSION_WORKERS"))
                .unwrap_or(defaults.worker_threads),
            queue_capacity: parse_nonzero(lookup("OPFUSION_QUEUE_CAPACITY"))
                .unwrap_or(defaults.queue_capacity),
            cache_hard_threshold: parse_nonzero(lookup("OPFUSION_CACHE_HARD_LIMIT"))
                .unwrap_or(defaults.cache_hard_threshold),
            cache_soft_limit: parse_nonzero(lookup("OPFUSION_CACHE_SOFT_LIMIT"))
                .unwrap_or(defaults.cache_soft_limit),
            eviction: lookup("OPFUSION_EVICTION")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.eviction),
        };

        // soft >= hard would clear the cache on every insert
        if config.cache_soft_limit >= config.cache_hard_threshold {
            config.cache_hard_threshold = defaults.cache_hard_threshold;
            config.cache_soft_limit = defaults.cache_soft_limit;
        }
        config
    }

    /// Start with the optimizer switched on
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the number of background workers (at least one)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.worker_threads = workers.max(1);
        self
    }

    /// Set the total queue capacity (at least one)
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the cache hard threshold and soft limit in bytes
    pub fn with_cache_limits(mut self, hard_threshold: u64, soft_limit: u64) -> Self {
        self.cache_hard_threshold = hard_threshold;
        self.cache_soft_limit = soft_limit;
        self
    }

    /// Select the eviction policy
    pub fn with_eviction(mut self, eviction: EvictionKind) -> Self {
        self.eviction = eviction;
        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_nonzero<T>(value: Option<String>) -> Option<T>
where
    T: FromStr + PartialEq + Default,
{
    value
        .and_then(|s| s.trim().parse::<T>().ok())
        .filter(|v| *v != T::default())
}
