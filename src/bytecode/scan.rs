//! Instruction walker for raw and fused bytecode.
//!
//! Walks a byte stream with the same skip-length rules the fusion engine
//! uses: push data and the inline operands of synthetic opcodes are never
//! decoded as instructions. Immediates running past the end of the buffer
//! are truncated rather than indexed out of bounds.

use std::fmt::Write as _;

use alloy_primitives::hex;

use super::opcodes::Opcode;

/// One decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction<'a> {
    /// Byte offset of the opcode
    pub offset: usize,
    /// Raw opcode byte
    pub byte: u8,
    /// Decoded opcode, `None` for unassigned bytes
    pub opcode: Option<Opcode>,
    /// Inline data following the opcode, possibly truncated at end of code
    pub immediate: &'a [u8],
}

impl Instruction<'_> {
    /// Total bytes this instruction occupies in the stream
    pub fn len(&self) -> usize {
        1 + self.immediate.len()
    }

    /// Always false: an instruction holds at least its opcode byte
    pub fn is_empty(&self) -> bool {
        false
    }

    /// True when the declared immediate ran past the end of the code
    pub fn is_truncated(&self) -> bool {
        self.opcode
            .is_some_and(|op| op.immediate_size() > self.immediate.len())
    }
}

/// Iterator over the instructions of a byte stream
#[derive(Debug, Clone)]
pub struct InstructionIter<'a> {
    code: &'a [u8],
    offset: usize,
}

impl<'a> InstructionIter<'a> {
    pub fn new(code: &'a [u8]) -> Self {
        Self { code, offset: 0 }
    }
}

impl<'a> Iterator for InstructionIter<'a> {
    type Item = Instruction<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.offset;
        let byte = *self.code.get(offset)?;
        let opcode = Opcode::from_byte(byte);
        let declared = opcode.map_or(0, Opcode::immediate_size);
        let start = offset + 1;
        let end = (start + declared).min(self.code.len());
        self.offset = start + declared;
        Some(Instruction {
            offset,
            byte,
            opcode,
            immediate: &self.code[start..end],
        })
    }
}

/// Walk `code` instruction by instruction
pub fn instructions(code: &[u8]) -> InstructionIter<'_> {
    InstructionIter::new(code)
}

/// Offsets at which a scan decodes an opcode
pub fn instruction_offsets(code: &[u8]) -> Vec<usize> {
    instructions(code).map(|inst| inst.offset).collect()
}

/// Render bytecode as one instruction per line
///
/// ```text
/// 0000: SHL_AND_SUB 0x050302b0b0b0b0
/// 0008: STOP
/// ```
pub fn disassemble(code: &[u8]) -> String {
    let mut out = String::new();
    for inst in instructions(code) {
        let _ = write!(out, "{:04x}: ", inst.offset);
        match inst.opcode {
            Some(op) => {
                let _ = write!(out, "{}", op);
            }
            None => {
                let _ = write!(out, "UNKNOWN({:#04x})", inst.byte);
            }
        }
        if !inst.immediate.is_empty() {
            out.push(' ');
            out.push_str(&hex::encode_prefixed(inst.immediate));
        }
        if inst.is_truncated() {
            out.push_str(" (truncated)");
        }
        out.push('\n');
    }
    out
}
