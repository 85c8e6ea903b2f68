//! Eviction policies for the code cache.
//!
//! The cache asks its policy what to drop before every insert. The default
//! [`FullClearPolicy`] drops everything once the aggregate size crosses the
//! threshold. [`LruEvictionPolicy`] drops the least recently used entries
//! instead, keeping hot code resident.

use std::collections::HashMap;

use alloy_primitives::Bytes;
use lru::LruCache;

use super::cache::{CacheLimits, CodeIdentity};
use crate::config::EvictionKind;

/// What the cache should drop before inserting a new entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eviction {
    /// Keep everything
    None,
    /// Clear the whole cache
    All,
    /// Drop these entries
    Entries(Vec<CodeIdentity>),
}

/// Eviction policy trait
///
/// Called with the cache write lock held, so implementations see a stable
/// view of the entries.
pub trait EvictionPolicy: Send + Sync {
    /// Short policy name for logs and stats
    fn name(&self) -> &'static str;

    /// Decide what to evict before inserting `incoming_len` bytes
    fn select(
        &mut self,
        entries: &HashMap<CodeIdentity, Bytes>,
        size_bytes: u64,
        incoming_len: u64,
        limits: &CacheLimits,
    ) -> Eviction;

    /// Whether cache hits must be reported through `on_access`
    fn tracks_access(&self) -> bool {
        false
    }

    /// Called when an entry is read
    fn on_access(&mut self, _id: &CodeIdentity) {}

    /// Called when an entry is added
    fn on_add(&mut self, _id: &CodeIdentity) {}

    /// Called when an entry is removed
    fn on_remove(&mut self, _id: &CodeIdentity) {}

    /// Called when the cache is cleared
    fn on_clear(&mut self) {}
}

/// Build the policy selected in configuration
pub fn policy_for(kind: EvictionKind) -> Box<dyn EvictionPolicy> {
    match kind {
        EvictionKind::FullClear => Box::new(FullClearPolicy),
        EvictionKind::Lru => Box::new(LruEvictionPolicy::new()),
    }
}

/// Whole-cache eviction
///
/// Before an insert, if `size + soft_limit > hard_threshold` every entry is
/// dropped. Hot and cold entries go together.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullClearPolicy;

impl EvictionPolicy for FullClearPolicy {
    fn name(&self) -> &'static str {
        "full-clear"
    }

    fn select(
        &mut self,
        _entries: &HashMap<CodeIdentity, Bytes>,
        size_bytes: u64,
        _incoming_len: u64,
        limits: &CacheLimits,
    ) -> Eviction {
        if limits.exceeded(size_bytes) {
            Eviction::All
        } else {
            Eviction::None
        }
    }
}

/// LRU (Least Recently Used) eviction policy
///
/// Triggers on the same threshold as [`FullClearPolicy`], then drops the
/// least recently used entries until the incoming entry fits within
/// `hard_threshold - soft_limit`.
pub struct LruEvictionPolicy {
    order: LruCache<CodeIdentity, ()>,
}

impl LruEvictionPolicy {
    pub fn new() -> Self {
        Self {
            order: LruCache::unbounded(),
        }
    }
}

impl Default for LruEvictionPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl EvictionPolicy for LruEvictionPolicy {
    fn name(&self) -> &'static str {
        "lru"
    }

    fn select(
        &mut self,
        entries: &HashMap<CodeIdentity, Bytes>,
        size_bytes: u64,
        incoming_len: u64,
        limits: &CacheLimits,
    ) -> Eviction {
        if !limits.exceeded(size_bytes) {
            return Eviction::None;
        }

        let budget = limits.budget();
        let mut remaining = size_bytes;
        let mut victims = Vec::new();
        // iter() runs most to least recent
        for (id, _) in self.order.iter().rev() {
            if remaining.saturating_add(incoming_len) <= budget {
                break;
            }
            if let Some(code) = entries.get(id) {
                remaining = remaining.saturating_sub(code.len() as u64);
                victims.push(*id);
            }
        }

        if victims.len() == entries.len() {
            Eviction::All
        } else {
            Eviction::Entries(victims)
        }
    }

    fn tracks_access(&self) -> bool {
        true
    }

    fn on_access(&mut self, id: &CodeIdentity) {
        // Promote only; a concurrent remove may already have dropped it
        self.order.get(id);
    }

    fn on_add(&mut self, id: &CodeIdentity) {
        self.order.put(*id, ());
    }

    fn on_remove(&mut self, id: &CodeIdentity) {
        self.order.pop(id);
    }

    fn on_clear(&mut self) {
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256};

    fn id(n: u8) -> CodeIdentity {
        CodeIdentity::new(Address::repeat_byte(n), B256::repeat_byte(n))
    }

    fn entries(ids: &[(u8, usize)]) -> HashMap<CodeIdentity, Bytes> {
        ids.iter()
            .map(|&(n, len)| (id(n), Bytes::from(vec![0u8; len])))
            .collect()
    }

    #[test]
    fn test_full_clear_threshold() {
        let limits = CacheLimits::new(100, 20);
        let mut policy = FullClearPolicy;
        let map = entries(&[(1, 80)]);

        assert_eq!(policy.select(&map, 80, 10, &limits), Eviction::None);
        assert_eq!(policy.select(&map, 81, 10, &limits), Eviction::All);
    }

    #[test]
    fn test_lru_drops_oldest_first() {
        let limits = CacheLimits::new(100, 20);
        let mut policy = LruEvictionPolicy::new();
        let map = entries(&[(1, 30), (2, 30), (3, 30)]);
        for n in 1..=3 {
            policy.on_add(&id(n));
        }
        // Touch 1 so 2 becomes the oldest
        policy.on_access(&id(1));

        // 90 + 20 > 100: make room for 10 more bytes within 80
        let eviction = policy.select(&map, 90, 10, &limits);
        assert_eq!(eviction, Eviction::Entries(vec![id(2)]));
    }

    #[test]
    fn test_lru_can_drop_everything() {
        let limits = CacheLimits::new(100, 20);
        let mut policy = LruEvictionPolicy::new();
        let map = entries(&[(1, 50), (2, 40)]);
        policy.on_add(&id(1));
        policy.on_add(&id(2));

        assert_eq!(policy.select(&map, 90, 80, &limits), Eviction::All);
    }

    #[test]
    fn test_lru_forgets_removed() {
        let mut policy = LruEvictionPolicy::new();
        policy.on_add(&id(1));
        policy.on_remove(&id(1));
        // Access after removal does not resurrect the entry
        policy.on_access(&id(1));
        assert!(policy.order.is_empty());

        policy.on_add(&id(2));
        policy.on_clear();
        assert!(policy.order.is_empty());
    }

    #[test]
    fn test_policy_for_kind() {
        assert_eq!(policy_for(EvictionKind::FullClear).name(), "full-clear");
        assert_eq!(policy_for(EvictionKind::Lru).name(), "lru");
        assert!(policy_for(EvictionKind::Lru).tracks_access());
        assert!(!policy_for(EvictionKind::FullClear).tracks_access());
    }
}
