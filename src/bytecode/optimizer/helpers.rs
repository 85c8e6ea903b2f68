//! Idiom matching and span rewriting for opcode fusion.

use crate::bytecode::opcodes::Opcode;

const ADD: u8 = Opcode::Add as u8;
const SUB: u8 = Opcode::Sub as u8;
const LT: u8 = Opcode::Lt as u8;
const ISZERO: u8 = Opcode::IsZero as u8;
const AND: u8 = Opcode::And as u8;
const SHL: u8 = Opcode::Shl as u8;
const POP: u8 = Opcode::Pop as u8;
const JUMP: u8 = Opcode::Jump as u8;
const JUMPI: u8 = Opcode::JumpI as u8;
const PUSH1: u8 = Opcode::Push1 as u8;
const PUSH2: u8 = Opcode::Push2 as u8;
const DUP1: u8 = Opcode::Dup1 as u8;
const DUP2: u8 = Opcode::Dup2 as u8;
const SWAP1: u8 = Opcode::Swap1 as u8;
const SWAP2: u8 = Opcode::Swap2 as u8;

/// Find the idiom starting at the head of `window`
///
/// Arms are ordered by span length (8, 5, 4, 3, 2) so a longer idiom always
/// wins over a shorter one at the same offset. An arm only matches when the
/// window holds its whole span.
pub fn match_idiom(window: &[u8]) -> Option<Opcode> {
    let fused = match window {
        // 8 bytes
        [PUSH1, _, PUSH1, _, PUSH1, _, SHL, SUB, ..] => Opcode::ShlAndSub,

        // 5 bytes
        [AND, SWAP1, POP, SWAP2, SWAP1, ..] => Opcode::AndSwap1PopSwap2Swap1,
        [ISZERO, PUSH2, _, _, JUMPI, ..] => Opcode::JumpIfZero,

        // 4 bytes
        [SWAP2, SWAP1, POP, JUMP, ..] => Opcode::Swap2Swap1PopJump,
        [SWAP1, POP, SWAP2, SWAP1, ..] => Opcode::Swap1PopSwap2Swap1,
        [POP, SWAP2, SWAP1, POP, ..] => Opcode::PopSwap2Swap1Pop,
        [PUSH2, _, _, JUMP, ..] => Opcode::Push2Jump,
        [PUSH2, _, _, JUMPI, ..] => Opcode::Push2JumpI,
        [PUSH1, _, PUSH1, _, ..] => Opcode::Push1Push1,

        // 3 bytes
        [PUSH1, _, ADD, ..] => Opcode::Push1Add,
        [PUSH1, _, SHL, ..] => Opcode::Push1Shl,
        [PUSH1, _, DUP1, ..] => Opcode::Push1Dup1,

        // 2 bytes
        [SWAP1, POP, ..] => Opcode::Swap1Pop,
        [POP, JUMP, ..] => Opcode::PopJump,
        [POP, POP, ..] => Opcode::Pop2,
        [SWAP2, SWAP1, ..] => Opcode::Swap2Swap1,
        [SWAP2, POP, ..] => Opcode::Swap2Pop,
        [DUP2, LT, ..] => Opcode::Dup2LT,

        _ => return None,
    };
    Some(fused)
}

/// Overwrite a matched span with its superinstruction
///
/// `span` must be exactly the matched idiom. Operand bytes the interpreter
/// needs stay at fixed positions; everything else becomes `Nop`. Returns the
/// number of filler bytes written.
pub fn write_fused(span: &mut [u8], fused: Opcode) -> usize {
    let nop = Opcode::Nop.to_byte();
    // Positions (relative to the span start) that keep their byte
    let keep: &[usize] = match fused {
        Opcode::ShlAndSub => {
            // PUSH1 x PUSH1 y PUSH1 z SHL SUB -> op x y z
            span[2] = span[3];
            span[3] = span[5];
            &[1, 2, 3]
        }
        Opcode::JumpIfZero => &[2, 3],
        Opcode::Push2Jump | Opcode::Push2JumpI => &[1, 2],
        Opcode::Push1Push1 => &[1, 3],
        Opcode::Push1Add | Opcode::Push1Shl | Opcode::Push1Dup1 => &[1],
        _ => &[],
    };

    span[0] = fused.to_byte();
    let mut nops = 0;
    for (i, byte) in span.iter_mut().enumerate().skip(1) {
        if !keep.contains(&i) {
            *byte = nop;
            nops += 1;
        }
    }
    nops
}
