//! Optimized code cache
//!
//! Maps a code identity (contract address plus code hash) to its fused
//! bytecode. The hash is part of the key so a redeployed address never gets
//! code compiled from its previous body.
//!
//! One read-write lock covers both the entry map and the aggregate size
//! counter: readers run concurrently, inserts, removals and evictions are
//! exclusive. The aggregate size always equals the sum of cached lengths.
//!
//! Eviction is delegated to an [`EvictionPolicy`] consulted before each
//! insert. The default policy clears the whole cache once
//! `size + soft_limit > hard_threshold`.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{keccak256, Address, Bytes, B256};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use super::eviction::{policy_for, Eviction, EvictionPolicy};
use crate::config::{OptimizerConfig, DEFAULT_CACHE_HARD_THRESHOLD, DEFAULT_CACHE_SOFT_LIMIT};

/// Cache key: which code body, deployed where
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodeIdentity {
    pub address: Address,
    pub code_hash: B256,
}

impl CodeIdentity {
    pub fn new(address: Address, code_hash: B256) -> Self {
        Self { address, code_hash }
    }

    /// Identity for `code` deployed at `address`, hashing the code with keccak256
    pub fn from_code(address: Address, code: &[u8]) -> Self {
        Self::new(address, keccak256(code))
    }
}

impl fmt::Display for CodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.address, self.code_hash)
    }
}

/// Size thresholds driving eviction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    /// Aggregate size the cache must stay under
    pub hard_threshold: u64,
    /// Headroom reserved below the hard threshold
    pub soft_limit: u64,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_HARD_THRESHOLD, DEFAULT_CACHE_SOFT_LIMIT)
    }
}

impl CacheLimits {
    pub fn new(hard_threshold: u64, soft_limit: u64) -> Self {
        Self {
            hard_threshold,
            soft_limit,
        }
    }

    /// True once `size + soft_limit > hard_threshold`
    #[inline]
    pub fn exceeded(&self, size_bytes: u64) -> bool {
        size_bytes.saturating_add(self.soft_limit) > self.hard_threshold
    }

    /// Largest aggregate size that does not trigger eviction
    #[inline]
    pub fn budget(&self) -> u64 {
        self.hard_threshold.saturating_sub(self.soft_limit)
    }
}

/// Statistics for code cache monitoring
#[derive(Debug, Clone, Default)]
pub struct CodeCacheStats {
    /// Number of cached code bodies
    pub entries: usize,
    /// Sum of cached code lengths
    pub size_bytes: u64,
    /// Lookups that found code
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Inserts that had to evict first
    pub eviction_rounds: u64,
    /// Entries dropped by eviction
    pub evicted_entries: u64,
}

impl CodeCacheStats {
    /// Get the hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CodeIdentity, Bytes>,
    size_bytes: u64,
}

/// Concurrent cache of optimized code
pub struct CodeCache {
    state: RwLock<CacheState>,
    policy: Mutex<Box<dyn EvictionPolicy>>,
    policy_name: &'static str,
    track_access: bool,
    limits: CacheLimits,
    hits: AtomicU64,
    misses: AtomicU64,
    eviction_rounds: AtomicU64,
    evicted_entries: AtomicU64,
}

impl fmt::Debug for CodeCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("CodeCache")
            .field("entries", &state.entries.len())
            .field("size_bytes", &state.size_bytes)
            .field("policy", &self.policy_name)
            .field("limits", &self.limits)
            .finish()
    }
}

impl Default for CodeCache {
    fn default() -> Self {
        Self::with_policy(CacheLimits::default(), policy_for(Default::default()))
    }
}

impl CodeCache {
    /// Create a cache with the default full-clear policy
    pub fn new(limits: CacheLimits) -> Self {
        Self::with_policy(limits, policy_for(Default::default()))
    }

    /// Create a cache with a custom eviction policy
    pub fn with_policy(limits: CacheLimits, policy: Box<dyn EvictionPolicy>) -> Self {
        Self {
            policy_name: policy.name(),
            track_access: policy.tracks_access(),
            policy: Mutex::new(policy),
            state: RwLock::new(CacheState::default()),
            limits,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            eviction_rounds: AtomicU64::new(0),
            evicted_entries: AtomicU64::new(0),
        }
    }

    /// Create a cache sized and configured from optimizer settings
    pub fn from_config(config: &OptimizerConfig) -> Self {
        Self::with_policy(
            CacheLimits::new(config.cache_hard_threshold, config.cache_soft_limit),
            policy_for(config.eviction),
        )
    }

    /// Look up optimized code
    pub fn get(&self, id: &CodeIdentity) -> Option<Bytes> {
        let found = self.state.read().entries.get(id).cloned();
        match found {
            Some(code) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                if self.track_access {
                    self.policy.lock().on_access(id);
                }
                trace!(target: "opfusion::cache", %id, "code cache hit");
                Some(code)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert optimized code, evicting first if the policy asks for it
    ///
    /// Replacing an existing identity releases the old entry's size before
    /// the eviction check.
    pub fn put(&self, id: CodeIdentity, code: Bytes) {
        let len = code.len() as u64;
        let mut state = self.state.write();
        let mut policy = self.policy.lock();

        if let Some(old) = state.entries.remove(&id) {
            state.size_bytes -= old.len() as u64;
            policy.on_remove(&id);
        }

        match policy.select(&state.entries, state.size_bytes, len, &self.limits) {
            Eviction::None => {}
            Eviction::All => {
                warn!(
                    target: "opfusion::cache",
                    entries = state.entries.len(),
                    size_bytes = state.size_bytes,
                    policy = self.policy_name,
                    "code cache full, clearing"
                );
                self.record_eviction(state.entries.len());
                state.entries.clear();
                state.size_bytes = 0;
                policy.on_clear();
            }
            Eviction::Entries(victims) => {
                let mut dropped = 0;
                for victim in &victims {
                    if let Some(old) = state.entries.remove(victim) {
                        state.size_bytes -= old.len() as u64;
                        policy.on_remove(victim);
                        dropped += 1;
                    }
                }
                debug!(
                    target: "opfusion::cache",
                    dropped,
                    size_bytes = state.size_bytes,
                    policy = self.policy_name,
                    "code cache evicted entries"
                );
                self.record_eviction(dropped);
            }
        }

        state.entries.insert(id, code);
        state.size_bytes += len;
        policy.on_add(&id);
    }

    /// Remove an entry, returning whether one was present
    pub fn remove(&self, id: &CodeIdentity) -> bool {
        let mut state = self.state.write();
        if state.entries.is_empty() {
            return false;
        }
        match state.entries.remove(id) {
            Some(old) => {
                state.size_bytes -= old.len() as u64;
                self.policy.lock().on_remove(id);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &CodeIdentity) -> bool {
        self.state.read().entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Sum of the lengths of all cached code bodies
    pub fn size_bytes(&self) -> u64 {
        self.state.read().size_bytes
    }

    /// Drop every entry (mainly for testing)
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.size_bytes = 0;
        self.policy.lock().on_clear();
    }

    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy_name
    }

    pub fn stats(&self) -> CodeCacheStats {
        let (entries, size_bytes) = {
            let state = self.state.read();
            (state.entries.len(), state.size_bytes)
        };
        CodeCacheStats {
            entries,
            size_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            eviction_rounds: self.eviction_rounds.load(Ordering::Relaxed),
            evicted_entries: self.evicted_entries.load(Ordering::Relaxed),
        }
    }

    fn record_eviction(&self, dropped: usize) {
        self.eviction_rounds.fetch_add(1, Ordering::Relaxed);
        self.evicted_entries
            .fetch_add(dropped as u64, Ordering::Relaxed);
    }
}
