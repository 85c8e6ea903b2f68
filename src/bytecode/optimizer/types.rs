//! Statistics for opcode fusion.

use crate::bytecode::opcodes::Opcode;

/// Statistics about fusions performed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FusionStats {
    /// PUSH1 PUSH1 PUSH1 SHL SUB
    pub shl_and_sub: usize,
    /// AND SWAP1 POP SWAP2 SWAP1
    pub and_swap1_pop_swap2_swap1: usize,
    /// ISZERO PUSH2 _ _ JUMPI
    pub jump_if_zero: usize,
    pub swap2_swap1_pop_jump: usize,
    pub swap1_pop_swap2_swap1: usize,
    pub pop_swap2_swap1_pop: usize,
    pub push2_jump: usize,
    pub push2_jumpi: usize,
    pub push1_push1: usize,
    pub push1_add: usize,
    pub push1_shl: usize,
    pub push1_dup1: usize,
    pub swap1_pop: usize,
    pub pop_jump: usize,
    pub pop2: usize,
    pub swap2_swap1: usize,
    pub swap2_pop: usize,
    pub dup2_lt: usize,
    /// Bytes fed through the engine
    pub bytes_scanned: usize,
    /// Literal and inline operand bytes stepped over without decoding
    pub data_bytes_skipped: usize,
    /// Filler bytes written over fused spans
    pub nops_written: usize,
    /// New entries added to the constant memo table
    pub constants_memoized: usize,
}

impl FusionStats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one fusion of `opcode`
    pub(crate) fn record(&mut self, opcode: Opcode) {
        let counter = match opcode {
            Opcode::ShlAndSub => &mut self.shl_and_sub,
            Opcode::AndSwap1PopSwap2Swap1 => &mut self.and_swap1_pop_swap2_swap1,
            Opcode::JumpIfZero => &mut self.jump_if_zero,
            Opcode::Swap2Swap1PopJump => &mut self.swap2_swap1_pop_jump,
            Opcode::Swap1PopSwap2Swap1 => &mut self.swap1_pop_swap2_swap1,
            Opcode::PopSwap2Swap1Pop => &mut self.pop_swap2_swap1_pop,
            Opcode::Push2Jump => &mut self.push2_jump,
            Opcode::Push2JumpI => &mut self.push2_jumpi,
            Opcode::Push1Push1 => &mut self.push1_push1,
            Opcode::Push1Add => &mut self.push1_add,
            Opcode::Push1Shl => &mut self.push1_shl,
            Opcode::Push1Dup1 => &mut self.push1_dup1,
            Opcode::Swap1Pop => &mut self.swap1_pop,
            Opcode::PopJump => &mut self.pop_jump,
            Opcode::Pop2 => &mut self.pop2,
            Opcode::Swap2Swap1 => &mut self.swap2_swap1,
            Opcode::Swap2Pop => &mut self.swap2_pop,
            Opcode::Dup2LT => &mut self.dup2_lt,
            _ => return,
        };
        *counter += 1;
    }

    /// Get total fusions performed
    pub fn total_fusions(&self) -> usize {
        self.shl_and_sub
            + self.and_swap1_pop_swap2_swap1
            + self.jump_if_zero
            + self.swap2_swap1_pop_jump
            + self.swap1_pop_swap2_swap1
            + self.pop_swap2_swap1_pop
            + self.push2_jump
            + self.push2_jumpi
            + self.push1_push1
            + self.push1_add
            + self.push1_shl
            + self.push1_dup1
            + self.swap1_pop
            + self.pop_jump
            + self.pop2
            + self.swap2_swap1
            + self.swap2_pop
            + self.dup2_lt
    }

    /// Fold another run's counters into this one
    pub fn merge(&mut self, other: &FusionStats) {
        self.shl_and_sub += other.shl_and_sub;
        self.and_swap1_pop_swap2_swap1 += other.and_swap1_pop_swap2_swap1;
        self.jump_if_zero += other.jump_if_zero;
        self.swap2_swap1_pop_jump += other.swap2_swap1_pop_jump;
        self.swap1_pop_swap2_swap1 += other.swap1_pop_swap2_swap1;
        self.pop_swap2_swap1_pop += other.pop_swap2_swap1_pop;
        self.push2_jump += other.push2_jump;
        self.push2_jumpi += other.push2_jumpi;
        self.push1_push1 += other.push1_push1;
        self.push1_add += other.push1_add;
        self.push1_shl += other.push1_shl;
        self.push1_dup1 += other.push1_dup1;
        self.swap1_pop += other.swap1_pop;
        self.pop_jump += other.pop_jump;
        self.pop2 += other.pop2;
        self.swap2_swap1 += other.swap2_swap1;
        self.swap2_pop += other.swap2_pop;
        self.dup2_lt += other.dup2_lt;
        self.bytes_scanned += other.bytes_scanned;
        self.data_bytes_skipped += other.data_bytes_skipped;
        self.nops_written += other.nops_written;
        self.constants_memoized += other.constants_memoized;
    }

    /// Non-zero per-idiom counters, longest idiom first
    pub fn by_idiom(&self) -> Vec<(Opcode, usize)> {
        [
            (Opcode::ShlAndSub, self.shl_and_sub),
            (Opcode::AndSwap1PopSwap2Swap1, self.and_swap1_pop_swap2_swap1),
            (Opcode::JumpIfZero, self.jump_if_zero),
            (Opcode::Swap2Swap1PopJump, self.swap2_swap1_pop_jump),
            (Opcode::Swap1PopSwap2Swap1, self.swap1_pop_swap2_swap1),
            (Opcode::PopSwap2Swap1Pop, self.pop_swap2_swap1_pop),
            (Opcode::Push2Jump, self.push2_jump),
            (Opcode::Push2JumpI, self.push2_jumpi),
            (Opcode::Push1Push1, self.push1_push1),
            (Opcode::Push1Add, self.push1_add),
            (Opcode::Push1Shl, self.push1_shl),
            (Opcode::Push1Dup1, self.push1_dup1),
            (Opcode::Swap1Pop, self.swap1_pop),
            (Opcode::PopJump, self.pop_jump),
            (Opcode::Pop2, self.pop2),
            (Opcode::Swap2Swap1, self.swap2_swap1),
            (Opcode::Swap2Pop, self.swap2_pop),
            (Opcode::Dup2LT, self.dup2_lt),
        ]
        .into_iter()
        .filter(|&(_, count)| count > 0)
        .collect()
    }
}
