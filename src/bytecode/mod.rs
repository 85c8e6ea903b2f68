//! Bytecode layer: opcode table, instruction scanning, fusion and caches
//!
//! - [`opcodes`]: EVM opcodes plus the synthetic fused opcodes
//! - [`scan`]: instruction walker and disassembler that honors inline data
//! - [`optimizer`]: length-preserving superinstruction fusion
//! - [`memo_cache`]: precomputed constants for fused `SHL_AND_SUB`
//! - [`cache`]: optimized code cache keyed by code identity
//! - [`eviction`]: policies deciding what the code cache drops

pub mod cache;
pub mod eviction;
pub mod memo_cache;
pub mod opcodes;
pub mod optimizer;
pub mod scan;

pub use cache::{CacheLimits, CodeCache, CodeCacheStats, CodeIdentity};
pub use eviction::{Eviction, EvictionPolicy, FullClearPolicy, LruEvictionPolicy};
pub use memo_cache::{ConstantMemoTable, MemoStats};
pub use opcodes::{skip_length, Opcode};
pub use optimizer::{fuse_bytecode, FusionEngine, FusionStats};
pub use scan::{disassemble, instructions, Instruction, InstructionIter};
