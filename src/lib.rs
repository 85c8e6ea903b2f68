//! opfusion - EVM bytecode superinstruction optimizer
//!
//! Rewrites frequently recurring instruction sequences in contract bytecode
//! into synthetic fused opcodes, caches the rewritten code per code identity
//! and precomputes constants for one arithmetic idiom. Optimization runs on a
//! background worker pool and can be switched on and off at runtime.
//!
//! # Architecture
//!
//! 1. **Fusion** (`bytecode::optimizer`)
//!    - Single forward scan, longest idiom first
//!    - Output has the same length as the input; every jump target survives
//!    - Inline PUSH data is never matched
//!
//! 2. **Caches** (`bytecode::cache`, `bytecode::memo_cache`)
//!    - Code cache keyed by (address, code hash), bounded by size thresholds
//!    - Write-once memo table for `SHL_AND_SUB` constants
//!
//! 3. **Coordination** (`processor`)
//!    - Feature gate checked when work actually runs
//!    - Identity-sharded worker queues for generate and flush tasks
//!    - Synchronous compile path for callers that cannot wait
//!
//! # Example
//!
//! ```rust
//! use alloy_primitives::{Address, U256};
//! use opfusion::{CodeIdentity, OpcodeProcessor, OptimizerConfig};
//!
//! let config = OptimizerConfig::default()
//!     .with_workers(1)
//!     .with_queue_capacity(16)
//!     .with_enabled(true);
//! let processor = OpcodeProcessor::new(config);
//! let code = [0x60, 5, 0x60, 3, 0x60, 2, 0x1b, 0x03, 0x00];
//! let identity = CodeIdentity::from_code(Address::ZERO, &code);
//!
//! let fused = processor.compile_sync(identity, &code).unwrap();
//! assert_eq!(fused.len(), code.len());
//! assert_eq!(processor.shl_and_sub_value(5, 3, 2), Some(U256::from(7)));
//! ```

pub mod bytecode;
pub mod config;
pub mod error;
pub mod processor;
pub mod thread_pool;

pub use bytecode::{
    fuse_bytecode, CacheLimits, CodeCache, CodeIdentity, ConstantMemoTable, FusionEngine,
    FusionStats, Opcode,
};
pub use config::{EvictionKind, OptimizerConfig};
pub use error::{OptimizerError, OptimizerResult};
pub use processor::{global_processor, OpcodeProcessor, OptimizeTask, ProcessorStats};
