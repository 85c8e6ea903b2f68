//! Background optimization tasks.

use alloy_primitives::Bytes;

use crate::bytecode::cache::CodeIdentity;

/// A unit of queued work, consumed exactly once by one worker
#[derive(Debug, Clone)]
pub enum OptimizeTask {
    /// Fuse `code` and cache it under `identity` unless already cached
    Generate { identity: CodeIdentity, code: Bytes },
    /// Drop the cached entry for `identity`
    Flush { identity: CodeIdentity },
}

impl OptimizeTask {
    /// Identity the task operates on, used to pick its worker shard
    pub fn identity(&self) -> &CodeIdentity {
        match self {
            OptimizeTask::Generate { identity, .. } | OptimizeTask::Flush { identity } => identity,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OptimizeTask::Generate { .. } => "generate",
            OptimizeTask::Flush { .. } => "flush",
        }
    }
}
