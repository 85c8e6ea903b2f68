//! Constant memo table for fused `SHL_AND_SUB` instructions.
//!
//! The fusion engine precomputes `(y << z) - x` for every
//! `PUSH1 x PUSH1 y PUSH1 z SHL SUB` idiom it rewrites and stores the result
//! here, keyed by the three operand bytes. The interpreter reads it back when
//! it executes the synthetic instruction.
//!
//! # Design
//!
//! - Write-once: the first value stored for a key is kept forever
//! - Sharded locking via DashMap, independent of the code cache lock
//! - Never evicted: at most 256^3 keys, 32 bytes each
//! - Hit/miss counters via atomics

use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::U256;
use dashmap::DashMap;
use tracing::trace;

/// Key for memo table entries: the three PUSH1 operands of the idiom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShlAndSubKey {
    pub x: u8,
    pub y: u8,
    pub z: u8,
}

impl ShlAndSubKey {
    pub fn new(x: u8, y: u8, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Evaluate `(y << z) - x` with 256-bit wraparound
    pub fn evaluate(self) -> U256 {
        U256::from(self.y)
            .wrapping_shl(self.z as usize)
            .wrapping_sub(U256::from(self.x))
    }
}

/// Statistics for memo table monitoring
#[derive(Debug, Clone, Default)]
pub struct MemoStats {
    /// Number of stored constants
    pub entries: usize,
    /// Lookups that found a value
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Inserts rejected because the key was already present
    pub duplicate_puts: u64,
}

impl MemoStats {
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

/// Concurrent write-once table of precomputed constants
pub struct ConstantMemoTable {
    values: DashMap<ShlAndSubKey, U256>,
    hits: AtomicU64,
    misses: AtomicU64,
    duplicate_puts: AtomicU64,
}

impl std::fmt::Debug for ConstantMemoTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstantMemoTable")
            .field("entries", &self.values.len())
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for ConstantMemoTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantMemoTable {
    pub fn new() -> Self {
        Self {
            values: DashMap::with_capacity(4096),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            duplicate_puts: AtomicU64::new(0),
        }
    }

    /// Store `value` unless the key already has one
    ///
    /// Returns true if this call inserted the value.
    pub fn put_if_absent(&self, x: u8, y: u8, z: u8, value: U256) -> bool {
        let key = ShlAndSubKey::new(x, y, z);
        let mut inserted = false;
        self.values.entry(key).or_insert_with(|| {
            inserted = true;
            value
        });
        if inserted {
            trace!(target: "opfusion::memo", ?key, %value, "memoized constant");
        } else {
            self.duplicate_puts.fetch_add(1, Ordering::Relaxed);
        }
        inserted
    }

    /// Look up a precomputed constant
    pub fn get(&self, x: u8, y: u8, z: u8) -> Option<U256> {
        match self.values.get(&ShlAndSubKey::new(x, y, z)) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(*entry)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn stats(&self) -> MemoStats {
        MemoStats {
            entries: self.values.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            duplicate_puts: self.duplicate_puts.load(Ordering::Relaxed),
        }
    }
}
