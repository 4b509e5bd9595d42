//! The IR operation vocabulary.
//!
//! The closed set of operations the code generators may emit and the
//! assembler stage consumes. Structural pseudo-ops (`seq`, `with`, `repeat`,
//! label/goto pairs) are expanded by the assembler; everything else maps to
//! one machine instruction or a short fixed sequence.

use std::fmt;

/// An IR operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    // Structure
    /// No-op.
    Pass,
    /// Evaluate children in order; the value is the last child's.
    Seq,
    /// Evaluate children in order without popping intermediate values; the
    /// stack effect is the caller's responsibility.
    SeqUnchecked,
    /// `with name value body`: bind a scratch name for the body.
    With,
    /// `set name value`: rebind an enclosing `with` name.
    Set,
    /// `if cond then [else]`.
    If,
    /// `repeat slot start rounds body`: run `body` a static number of times
    /// with the iteration counter held in the memory word at `slot`.
    Repeat,
    /// Exit the innermost `repeat` early.
    Break,
    /// Unconditional branch to a named label.
    Goto,
    /// A named jump target.
    Label,
    /// Indirect jump to a computed code offset.
    Jump,
    /// Halt and hand `(offset, size)` back through the native return channel.
    Return,
    /// Abort unless the operand is non-zero.
    Assert,
    /// Discard the operand's value.
    Pop,
    /// An aggregate literal: one child per element.
    Multi,

    // Arithmetic
    /// `a + b`.
    Add,
    /// `a - b`.
    Sub,
    /// `a * b`.
    Mul,
    /// Unsigned `a / b`.
    Div,
    /// Signed `a / b`.
    Sdiv,
    /// Unsigned `a % b`.
    Mod,
    /// Signed `a % b`.
    Smod,
    /// `a ** b`.
    Exp,

    // Bitwise
    /// `a & b`.
    And,
    /// `a | b`.
    Or,
    /// `a ^ b`.
    Xor,
    /// `~a`.
    Not,

    // Comparison
    /// Unsigned `a < b`.
    Lt,
    /// Unsigned `a > b`.
    Gt,
    /// Signed `a < b`.
    Slt,
    /// Signed `a > b`.
    Sgt,
    /// Unsigned `a <= b`.
    Le,
    /// Unsigned `a >= b`.
    Ge,
    /// `a == b`.
    Eq,
    /// `a != b`.
    Ne,
    /// `a == 0`.
    IsZero,

    // Checked passthroughs
    /// Pass `a` through, aborting unless unsigned `a < bound`.
    UClampLt,
    /// Pass `a` through, aborting unless unsigned `a <= bound`.
    UClampLe,
    /// Pass `x` through, aborting unless signed `lo <= x <= hi`.
    Clamp,
    /// Pass `a` through, aborting if it is zero.
    ClampNonZero,
    /// Round up to the next multiple of 32.
    Ceil32,

    // Memory
    /// Load a word from memory.
    MLoad,
    /// Store a word to memory.
    MStore,
    /// Store a single byte to memory.
    MStore8,

    // Storage
    /// Load a word from a storage slot.
    SLoad,
    /// Store a word to a storage slot.
    SStore,

    // Calldata
    /// Load a word from the call input region.
    CalldataLoad,
    /// Size of the call input region.
    CalldataSize,
    /// Copy calldata into memory; reads past the end yield zero bytes.
    CalldataCopy,

    // Hashing
    /// Hash `size` bytes of memory starting at `offset`.
    Sha3,
    /// Hash one word (slot derivation for aggregate roots).
    Sha3_32,
    /// Hash two words (slot derivation for mapping entries).
    Sha3_64,

    // Environment
    /// The calling account.
    Caller,
    /// The wei sent with the call.
    CallValue,
    /// Remaining gas.
    Gas,
    /// This contract's account.
    SelfAddress,
    /// Account balance.
    Balance,

    // Calls
    /// `call(gas, addr, value, in_off, in_len, out_off, out_len)`.
    Call,
    /// `staticcall(gas, addr, in_off, in_len, out_off, out_len)`.
    StaticCall,
}

impl Op {
    /// The accepted child count as an inclusive `(min, max)` range; `None`
    /// for unbounded.
    #[must_use]
    pub const fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Self::Pass | Self::Break | Self::CalldataSize | Self::Caller | Self::CallValue
            | Self::Gas | Self::SelfAddress => (0, Some(0)),

            Self::Goto | Self::Label | Self::Jump | Self::Assert | Self::Pop | Self::Not
            | Self::IsZero | Self::ClampNonZero | Self::Ceil32 | Self::MLoad | Self::SLoad
            | Self::CalldataLoad | Self::Sha3_32 | Self::Balance => (1, Some(1)),

            Self::Set | Self::Return | Self::Add | Self::Sub | Self::Mul | Self::Div
            | Self::Sdiv | Self::Mod | Self::Smod | Self::Exp | Self::And | Self::Or
            | Self::Xor | Self::Lt | Self::Gt | Self::Slt | Self::Sgt | Self::Le | Self::Ge
            | Self::Eq | Self::Ne | Self::UClampLt | Self::UClampLe | Self::MStore
            | Self::MStore8 | Self::SStore | Self::Sha3 | Self::Sha3_64 => (2, Some(2)),

            Self::With | Self::Clamp | Self::CalldataCopy => (3, Some(3)),
            Self::If => (2, Some(3)),
            Self::Repeat => (4, Some(4)),
            Self::Seq | Self::SeqUnchecked | Self::Multi => (1, None),
            Self::StaticCall => (6, Some(6)),
            Self::Call => (7, Some(7)),
        }
    }

    /// The number of values this operation leaves behind, or `None` when it
    /// is determined by the children (`seq`, `with`, `if`).
    #[must_use]
    pub const fn valency(&self) -> Option<usize> {
        match self {
            Self::Seq | Self::With | Self::If => None,

            Self::Pass
            | Self::SeqUnchecked
            | Self::Set
            | Self::Repeat
            | Self::Break
            | Self::Goto
            | Self::Label
            | Self::Jump
            | Self::Return
            | Self::Assert
            | Self::Pop
            | Self::MStore
            | Self::MStore8
            | Self::SStore
            | Self::CalldataCopy => Some(0),

            _ => Some(1),
        }
    }

    /// A static per-node base cost, used for the cost estimates carried on
    /// emitted nodes. Loop bodies are scaled by the caller.
    #[must_use]
    pub const fn base_gas(&self) -> u64 {
        match self {
            Self::Pass | Self::Seq | Self::SeqUnchecked | Self::With | Self::Multi
            | Self::Break | Self::Return => 0,
            Self::Label => 1,
            Self::Pop | Self::CalldataSize | Self::Caller | Self::CallValue | Self::Gas
            | Self::SelfAddress => 2,
            Self::Add | Self::Sub | Self::And | Self::Or | Self::Xor | Self::Not | Self::Lt
            | Self::Gt | Self::Slt | Self::Sgt | Self::Eq | Self::IsZero | Self::MLoad
            | Self::MStore | Self::MStore8 | Self::CalldataLoad | Self::CalldataCopy => 3,
            Self::Mul | Self::Div | Self::Sdiv | Self::Mod | Self::Smod => 5,
            Self::Set | Self::Le | Self::Ge | Self::Ne => 6,
            Self::Goto | Self::Jump => 8,
            Self::Exp | Self::If => 10,
            Self::ClampNonZero | Self::Assert => 11,
            Self::UClampLt | Self::UClampLe => 12,
            Self::Repeat => 20,
            Self::Ceil32 | Self::Clamp => 23,
            Self::Sha3 => 30,
            Self::Sha3_32 => 72,
            Self::Sha3_64 => 109,
            Self::SLoad => 200,
            Self::Balance => 400,
            Self::Call | Self::StaticCall => 700,
            Self::SStore => 5000,
        }
    }

    /// Returns the mnemonic for this operation.
    #[must_use]
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Seq => "seq",
            Self::SeqUnchecked => "seq_unchecked",
            Self::With => "with",
            Self::Set => "set",
            Self::If => "if",
            Self::Repeat => "repeat",
            Self::Break => "break",
            Self::Goto => "goto",
            Self::Label => "label",
            Self::Jump => "jump",
            Self::Return => "return",
            Self::Assert => "assert",
            Self::Pop => "pop",
            Self::Multi => "multi",
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Sdiv => "sdiv",
            Self::Mod => "mod",
            Self::Smod => "smod",
            Self::Exp => "exp",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Not => "not",
            Self::Lt => "lt",
            Self::Gt => "gt",
            Self::Slt => "slt",
            Self::Sgt => "sgt",
            Self::Le => "le",
            Self::Ge => "ge",
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::IsZero => "iszero",
            Self::UClampLt => "uclamplt",
            Self::UClampLe => "uclample",
            Self::Clamp => "clamp",
            Self::ClampNonZero => "clamp_nonzero",
            Self::Ceil32 => "ceil32",
            Self::MLoad => "mload",
            Self::MStore => "mstore",
            Self::MStore8 => "mstore8",
            Self::SLoad => "sload",
            Self::SStore => "sstore",
            Self::CalldataLoad => "calldataload",
            Self::CalldataSize => "calldatasize",
            Self::CalldataCopy => "calldatacopy",
            Self::Sha3 => "sha3",
            Self::Sha3_32 => "sha3_32",
            Self::Sha3_64 => "sha3_64",
            Self::Caller => "caller",
            Self::CallValue => "callvalue",
            Self::Gas => "gas",
            Self::SelfAddress => "address",
            Self::Balance => "balance",
            Self::Call => "call",
            Self::StaticCall => "staticcall",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
