//! Opcode byte space for EVM-style bytecode.
//!
//! This module defines every opcode the fusion engine reads or writes:
//! the standard instruction set (Cancun) plus the synthetic
//! superinstructions that fusion writes over matched idioms.
//!
//! Synthetic opcodes live in `0xB0..=0xC2`, a range left unassigned by the
//! standard instruction set. The interpreter that executes fused code must
//! decode them with the same values.
//!
//! Every opcode carrying inline data reports it through
//! [`Opcode::immediate_size`], which doubles as the skip-length table used
//! when scanning fused or raw code.

use std::fmt;

macro_rules! define_opcodes {
    ($( $(#[$meta:meta])* $name:ident = $byte:literal => $mnemonic:literal, )*) => {
        /// Bytecode opcode enumeration
        ///
        /// Each variant carries its wire value. Bytes outside this set decode
        /// to `None` and are treated as single-byte unknown instructions.
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $( $(#[$meta])* $name = $byte, )*
        }

        impl Opcode {
            /// Every defined opcode, in byte order
            pub const ALL: &'static [Opcode] = &[$( Opcode::$name, )*];

            /// Get the mnemonic name for this opcode
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }
        }
    };
}

define_opcodes! {
    // === Arithmetic (0x00-0x0B) ===
    /// Halt execution
    Stop = 0x00 => "STOP",
    Add = 0x01 => "ADD",
    Mul = 0x02 => "MUL",
    Sub = 0x03 => "SUB",
    Div = 0x04 => "DIV",
    SDiv = 0x05 => "SDIV",
    Mod = 0x06 => "MOD",
    SMod = 0x07 => "SMOD",
    AddMod = 0x08 => "ADDMOD",
    MulMod = 0x09 => "MULMOD",
    Exp = 0x0A => "EXP",
    SignExtend = 0x0B => "SIGNEXTEND",

    // === Comparison and bitwise (0x10-0x1D) ===
    Lt = 0x10 => "LT",
    Gt = 0x11 => "GT",
    SLt = 0x12 => "SLT",
    SGt = 0x13 => "SGT",
    Eq = 0x14 => "EQ",
    IsZero = 0x15 => "ISZERO",
    And = 0x16 => "AND",
    Or = 0x17 => "OR",
    Xor = 0x18 => "XOR",
    Not = 0x19 => "NOT",
    Byte = 0x1A => "BYTE",
    Shl = 0x1B => "SHL",
    Shr = 0x1C => "SHR",
    Sar = 0x1D => "SAR",

    Keccak256 = 0x20 => "KECCAK256",

    // === Environment (0x30-0x3F) ===
    Address = 0x30 => "ADDRESS",
    Balance = 0x31 => "BALANCE",
    Origin = 0x32 => "ORIGIN",
    Caller = 0x33 => "CALLER",
    CallValue = 0x34 => "CALLVALUE",
    CallDataLoad = 0x35 => "CALLDATALOAD",
    CallDataSize = 0x36 => "CALLDATASIZE",
    CallDataCopy = 0x37 => "CALLDATACOPY",
    CodeSize = 0x38 => "CODESIZE",
    CodeCopy = 0x39 => "CODECOPY",
    GasPrice = 0x3A => "GASPRICE",
    ExtCodeSize = 0x3B => "EXTCODESIZE",
    ExtCodeCopy = 0x3C => "EXTCODECOPY",
    ReturnDataSize = 0x3D => "RETURNDATASIZE",
    ReturnDataCopy = 0x3E => "RETURNDATACOPY",
    ExtCodeHash = 0x3F => "EXTCODEHASH",

    // === Block information (0x40-0x4A) ===
    BlockHash = 0x40 => "BLOCKHASH",
    Coinbase = 0x41 => "COINBASE",
    Timestamp = 0x42 => "TIMESTAMP",
    Number = 0x43 => "NUMBER",
    PrevRandao = 0x44 => "PREVRANDAO",
    GasLimit = 0x45 => "GASLIMIT",
    ChainId = 0x46 => "CHAINID",
    SelfBalance = 0x47 => "SELFBALANCE",
    BaseFee = 0x48 => "BASEFEE",
    BlobHash = 0x49 => "BLOBHASH",
    BlobBaseFee = 0x4A => "BLOBBASEFEE",

    // === Stack, memory, storage and flow (0x50-0x5F) ===
    Pop = 0x50 => "POP",
    MLoad = 0x51 => "MLOAD",
    MStore = 0x52 => "MSTORE",
    MStore8 = 0x53 => "MSTORE8",
    SLoad = 0x54 => "SLOAD",
    SStore = 0x55 => "SSTORE",
    /// Unconditional jump to the offset on top of stack
    Jump = 0x56 => "JUMP",
    /// Conditional jump: [dest, cond] -> []
    JumpI = 0x57 => "JUMPI",
    Pc = 0x58 => "PC",
    MSize = 0x59 => "MSIZE",
    Gas = 0x5A => "GAS",
    JumpDest = 0x5B => "JUMPDEST",
    TLoad = 0x5C => "TLOAD",
    TStore = 0x5D => "TSTORE",
    MCopy = 0x5E => "MCOPY",
    Push0 = 0x5F => "PUSH0",

    // === Push (0x60-0x7F), N literal bytes follow ===
    Push1 = 0x60 => "PUSH1",
    Push2 = 0x61 => "PUSH2",
    Push3 = 0x62 => "PUSH3",
    Push4 = 0x63 => "PUSH4",
    Push5 = 0x64 => "PUSH5",
    Push6 = 0x65 => "PUSH6",
    Push7 = 0x66 => "PUSH7",
    Push8 = 0x67 => "PUSH8",
    Push9 = 0x68 => "PUSH9",
    Push10 = 0x69 => "PUSH10",
    Push11 = 0x6A => "PUSH11",
    Push12 = 0x6B => "PUSH12",
    Push13 = 0x6C => "PUSH13",
    Push14 = 0x6D => "PUSH14",
    Push15 = 0x6E => "PUSH15",
    Push16 = 0x6F => "PUSH16",
    Push17 = 0x70 => "PUSH17",
    Push18 = 0x71 => "PUSH18",
    Push19 = 0x72 => "PUSH19",
    Push20 = 0x73 => "PUSH20",
    Push21 = 0x74 => "PUSH21",
    Push22 = 0x75 => "PUSH22",
    Push23 = 0x76 => "PUSH23",
    Push24 = 0x77 => "PUSH24",
    Push25 = 0x78 => "PUSH25",
    Push26 = 0x79 => "PUSH26",
    Push27 = 0x7A => "PUSH27",
    Push28 = 0x7B => "PUSH28",
    Push29 = 0x7C => "PUSH29",
    Push30 = 0x7D => "PUSH30",
    Push31 = 0x7E => "PUSH31",
    Push32 = 0x7F => "PUSH32",

    // === Dup (0x80-0x8F) ===
    Dup1 = 0x80 => "DUP1",
    Dup2 = 0x81 => "DUP2",
    Dup3 = 0x82 => "DUP3",
    Dup4 = 0x83 => "DUP4",
    Dup5 = 0x84 => "DUP5",
    Dup6 = 0x85 => "DUP6",
    Dup7 = 0x86 => "DUP7",
    Dup8 = 0x87 => "DUP8",
    Dup9 = 0x88 => "DUP9",
    Dup10 = 0x89 => "DUP10",
    Dup11 = 0x8A => "DUP11",
    Dup12 = 0x8B => "DUP12",
    Dup13 = 0x8C => "DUP13",
    Dup14 = 0x8D => "DUP14",
    Dup15 = 0x8E => "DUP15",
    Dup16 = 0x8F => "DUP16",

    // === Swap (0x90-0x9F) ===
    Swap1 = 0x90 => "SWAP1",
    Swap2 = 0x91 => "SWAP2",
    Swap3 = 0x92 => "SWAP3",
    Swap4 = 0x93 => "SWAP4",
    Swap5 = 0x94 => "SWAP5",
    Swap6 = 0x95 => "SWAP6",
    Swap7 = 0x96 => "SWAP7",
    Swap8 = 0x97 => "SWAP8",
    Swap9 = 0x98 => "SWAP9",
    Swap10 = 0x99 => "SWAP10",
    Swap11 = 0x9A => "SWAP11",
    Swap12 = 0x9B => "SWAP12",
    Swap13 = 0x9C => "SWAP13",
    Swap14 = 0x9D => "SWAP14",
    Swap15 = 0x9E => "SWAP15",
    Swap16 = 0x9F => "SWAP16",

    // === Logging (0xA0-0xA4) ===
    Log0 = 0xA0 => "LOG0",
    Log1 = 0xA1 => "LOG1",
    Log2 = 0xA2 => "LOG2",
    Log3 = 0xA3 => "LOG3",
    Log4 = 0xA4 => "LOG4",

    // === Synthetic superinstructions (0xB0-0xC2) ===
    /// Filler written over the tail of a fused span
    Nop = 0xB0 => "NOP",
    /// AND SWAP1 POP SWAP2 SWAP1
    AndSwap1PopSwap2Swap1 = 0xB1 => "AND_SWAP1_POP_SWAP2_SWAP1",
    /// SWAP2 SWAP1 POP JUMP
    Swap2Swap1PopJump = 0xB2 => "SWAP2_SWAP1_POP_JUMP",
    /// SWAP1 POP SWAP2 SWAP1
    Swap1PopSwap2Swap1 = 0xB3 => "SWAP1_POP_SWAP2_SWAP1",
    /// POP SWAP2 SWAP1 POP
    PopSwap2Swap1Pop = 0xB4 => "POP_SWAP2_SWAP1_POP",
    /// PUSH2 hi lo JUMP, keeps the two target bytes inline
    Push2Jump = 0xB5 => "PUSH2_JUMP",
    /// PUSH2 hi lo JUMPI, keeps the two target bytes inline
    Push2JumpI = 0xB6 => "PUSH2_JUMPI",
    /// PUSH1 a PUSH1 b, operands at +1 and +3
    Push1Push1 = 0xB7 => "PUSH1_PUSH1",
    /// PUSH1 a ADD
    Push1Add = 0xB8 => "PUSH1_ADD",
    /// PUSH1 a SHL
    Push1Shl = 0xB9 => "PUSH1_SHL",
    /// PUSH1 a DUP1
    Push1Dup1 = 0xBA => "PUSH1_DUP1",
    Swap1Pop = 0xBB => "SWAP1_POP",
    PopJump = 0xBC => "POP_JUMP",
    Pop2 = 0xBD => "POP2",
    Swap2Swap1 = 0xBE => "SWAP2_SWAP1",
    Swap2Pop = 0xBF => "SWAP2_POP",
    Dup2LT = 0xC0 => "DUP2_LT",
    /// ISZERO PUSH2 hi lo JUMPI, target bytes at +2 and +3
    JumpIfZero = 0xC1 => "JUMP_IF_ZERO",
    /// PUSH1 x PUSH1 y PUSH1 z SHL SUB, operands x y z at +1..+3.
    /// The interpreter reads `(y << z) - x` from the constant memo table.
    ShlAndSub = 0xC2 => "SHL_AND_SUB",

    // === System (0xF0-0xFF) ===
    Create = 0xF0 => "CREATE",
    Call = 0xF1 => "CALL",
    CallCode = 0xF2 => "CALLCODE",
    Return = 0xF3 => "RETURN",
    DelegateCall = 0xF4 => "DELEGATECALL",
    Create2 = 0xF5 => "CREATE2",
    StaticCall = 0xFA => "STATICCALL",
    Revert = 0xFD => "REVERT",
    Invalid = 0xFE => "INVALID",
    SelfDestruct = 0xFF => "SELFDESTRUCT",
}

impl Opcode {
    /// Convert byte to opcode, returns None if unassigned
    #[inline]
    pub fn from_byte(byte: u8) -> Option<Self> {
        OPCODE_TABLE[byte as usize]
    }

    /// Convert opcode to byte
    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Number of bytes following this opcode that are data, not instructions
    ///
    /// Push opcodes carry 1..=32 literal bytes. Synthetic opcodes that keep
    /// operands inline report their operand and filler tail so that a rescan
    /// jumps straight past them. Everything else is a single byte.
    #[inline]
    pub fn immediate_size(self) -> usize {
        match self {
            op if op.is_push() => (op.to_byte() - Opcode::Push1.to_byte()) as usize + 1,
            Self::ShlAndSub => 7,
            Self::JumpIfZero => 4,
            Self::Push2Jump | Self::Push2JumpI | Self::Push1Push1 => 3,
            Self::Push1Add | Self::Push1Shl | Self::Push1Dup1 => 2,
            _ => 0,
        }
    }

    /// PUSH1 through PUSH32 (PUSH0 carries no data)
    #[inline]
    pub fn is_push(self) -> bool {
        (Self::Push1.to_byte()..=Self::Push32.to_byte()).contains(&self.to_byte())
    }

    /// True for opcodes written by fusion, including the `Nop` filler
    #[inline]
    pub fn is_synthetic(self) -> bool {
        (Self::Nop.to_byte()..=Self::ShlAndSub.to_byte()).contains(&self.to_byte())
    }

    /// Length of the raw idiom a synthetic opcode replaces
    pub fn fused_span(self) -> Option<usize> {
        match self {
            Self::ShlAndSub => Some(8),
            Self::AndSwap1PopSwap2Swap1 | Self::JumpIfZero => Some(5),
            Self::Swap2Swap1PopJump
            | Self::Swap1PopSwap2Swap1
            | Self::PopSwap2Swap1Pop
            | Self::Push2Jump
            | Self::Push2JumpI
            | Self::Push1Push1 => Some(4),
            Self::Push1Add | Self::Push1Shl | Self::Push1Dup1 => Some(3),
            Self::Swap1Pop
            | Self::PopJump
            | Self::Pop2
            | Self::Swap2Swap1
            | Self::Swap2Pop
            | Self::Dup2LT => Some(2),
            _ => None,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

/// Lookup table for byte -> Opcode conversion
static OPCODE_TABLE: [Option<Opcode>; 256] = {
    let mut table = [None; 256];
    let mut i = 0;
    while i < Opcode::ALL.len() {
        let op = Opcode::ALL[i];
        table[op as u8 as usize] = Some(op);
        i += 1;
    }
    table
};

/// Skip length for the byte at `code[offset]`: how many following bytes are data
///
/// Unknown bytes and offsets past the end report zero.
#[inline]
pub fn skip_length(code: &[u8], offset: usize) -> usize {
    code.get(offset)
        .and_then(|&b| Opcode::from_byte(b))
        .map_or(0, Opcode::immediate_size)
}
