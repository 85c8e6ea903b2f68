//! Opcode fusion engine.
//!
//! Rewrites multi-instruction idioms into single superinstructions in one
//! left-to-right scan. The output always has the input's length: the tail of
//! every fused span is either kept operand bytes or `Nop` filler, so absolute
//! jump targets outside fused spans stay valid.
//!
//! When no idiom matches at an offset, the scan steps over the opcode's inline
//! data (push literals, operands of synthetic opcodes already present) so
//! literal bytes are never mistaken for instructions.

use tracing::{debug, trace};

use crate::bytecode::memo_cache::{ConstantMemoTable, ShlAndSubKey};
use crate::bytecode::opcodes::{skip_length, Opcode};
use crate::error::{OptimizerError, OptimizerResult};

use super::helpers::{match_idiom, write_fused};
use super::types::FusionStats;

/// Opcode fusion engine
pub struct FusionEngine {
    /// Statistics accumulated across every call to `fuse`
    stats: FusionStats,
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FusionEngine {
    /// Create a new fusion engine
    pub fn new() -> Self {
        Self {
            stats: FusionStats::new(),
        }
    }

    /// Get fusion statistics
    pub fn stats(&self) -> &FusionStats {
        &self.stats
    }

    /// Fuse `code`, recording precomputed constants in `memo`
    ///
    /// On error the caller keeps executing the raw bytecode; no partially
    /// rewritten stream is ever returned.
    pub fn fuse(&mut self, code: &[u8], memo: &ConstantMemoTable) -> OptimizerResult<Vec<u8>> {
        let mut fused = code.to_vec();
        let len = fused.len();
        let mut offset = 0;

        while offset < len {
            if let Some(op) = match_idiom(&fused[offset..]) {
                let Some(span) = op.fused_span() else {
                    return Err(OptimizerError::preprocessing(format!(
                        "{} has no registered span",
                        op
                    )));
                };

                if op == Opcode::ShlAndSub {
                    let key = ShlAndSubKey::new(
                        fused[offset + 1],
                        fused[offset + 3],
                        fused[offset + 5],
                    );
                    if memo.put_if_absent(key.x, key.y, key.z, key.evaluate()) {
                        self.stats.constants_memoized += 1;
                    }
                }

                trace!(target: "opfusion::fusion", offset, %op, span, "fused idiom");
                self.stats.nops_written += write_fused(&mut fused[offset..offset + span], op);
                self.stats.record(op);
                offset += span;
                continue;
            }

            let skip = skip_length(&fused, offset);
            self.stats.data_bytes_skipped += skip.min(len - offset - 1);
            offset += 1 + skip;
        }

        if fused.len() != code.len() {
            return Err(OptimizerError::preprocessing(format!(
                "length changed from {} to {}",
                code.len(),
                fused.len()
            )));
        }

        self.stats.bytes_scanned += len;
        debug!(
            target: "opfusion::fusion",
            len,
            fusions = self.stats.total_fusions(),
            "fused bytecode"
        );
        Ok(fused)
    }
}

/// Fuse bytecode with a fresh engine
///
/// Convenience wrapper returning the fused code and this run's statistics.
pub fn fuse_bytecode(
    code: &[u8],
    memo: &ConstantMemoTable,
) -> OptimizerResult<(Vec<u8>, FusionStats)> {
    let mut engine = FusionEngine::new();
    let fused = engine.fuse(code, memo)?;
    Ok((fused, engine.stats))
}
