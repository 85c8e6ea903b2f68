//! Bytecode Fusion Optimizer
//!
//! This module rewrites recurring instruction sequences into single
//! superinstructions. Unlike a shrinking peephole pass it never moves code:
//! every fused span keeps its length, so jump destinations need no fixups.
//!
//! # Fusion Patterns
//!
//! | Span | Pattern | Rewritten as |
//! |------|---------|--------------|
//! | 8 | `PUSH1 x PUSH1 y PUSH1 z SHL SUB` | `SHL_AND_SUB x y z NOP NOP NOP NOP` |
//! | 5 | `AND SWAP1 POP SWAP2 SWAP1` | `AND_SWAP1_POP_SWAP2_SWAP1 NOP*4` |
//! | 5 | `ISZERO PUSH2 hi lo JUMPI` | `JUMP_IF_ZERO NOP hi lo NOP` |
//! | 4 | `SWAP2 SWAP1 POP JUMP` | `SWAP2_SWAP1_POP_JUMP NOP*3` |
//! | 4 | `SWAP1 POP SWAP2 SWAP1` | `SWAP1_POP_SWAP2_SWAP1 NOP*3` |
//! | 4 | `POP SWAP2 SWAP1 POP` | `POP_SWAP2_SWAP1_POP NOP*3` |
//! | 4 | `PUSH2 hi lo JUMP` | `PUSH2_JUMP hi lo NOP` |
//! | 4 | `PUSH2 hi lo JUMPI` | `PUSH2_JUMPI hi lo NOP` |
//! | 4 | `PUSH1 a PUSH1 b` | `PUSH1_PUSH1 a NOP b` |
//! | 3 | `PUSH1 a ADD` / `SHL` / `DUP1` | `PUSH1_ADD a NOP` / ... |
//! | 2 | `SWAP1 POP`, `POP JUMP`, `POP POP`, `SWAP2 SWAP1`, `SWAP2 POP`, `DUP2 LT` | `<fused> NOP` |
//!
//! `SHL_AND_SUB` also stores `(y << z) - x` in the
//! [`ConstantMemoTable`](crate::bytecode::memo_cache::ConstantMemoTable).
//!
//! # Rescan Safety
//!
//! Every synthetic opcode that keeps operand bytes registers them as inline
//! data (see [`Opcode::immediate_size`](crate::bytecode::opcodes::Opcode::immediate_size)),
//! so scanning fused output never decodes filler or operands as instructions.
//!
//! # Example
//!
//! ```ignore
//! let memo = ConstantMemoTable::new();
//! let code = [0x60, 5, 0x60, 3, 0x60, 2, 0x1b, 0x03, 0x00];
//! let (fused, stats) = fuse_bytecode(&code, &memo)?;
//! // fused == [SHL_AND_SUB, 5, 3, 2, NOP, NOP, NOP, NOP, STOP]
//! // memo.get(5, 3, 2) == Some(U256::from(7))
//! ```

mod fusion;
mod helpers;
mod types;

#[cfg(test)]
mod tests;

pub use fusion::{fuse_bytecode, FusionEngine};
pub use helpers::match_idiom;
pub use types::FusionStats;
