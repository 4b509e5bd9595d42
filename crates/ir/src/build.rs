//! Convenience constructors for common node shapes.
//!
//! Code generation composes these instead of spelling out [`IrNode::op`]
//! calls; each helper converts its operands, so literals can be passed as
//! plain integers.

use crate::{IrNode, Op};

macro_rules! binary_ops {
    ($($(#[$attr:meta])* $name:ident => $op:ident;)*) => {
        $(
            $(#[$attr])*
            #[must_use]
            pub fn $name(a: impl Into<IrNode>, b: impl Into<IrNode>) -> IrNode {
                IrNode::op(Op::$op, vec![a.into(), b.into()])
            }
        )*
    };
}

macro_rules! unary_ops {
    ($($(#[$attr:meta])* $name:ident => $op:ident;)*) => {
        $(
            $(#[$attr])*
            #[must_use]
            pub fn $name(a: impl Into<IrNode>) -> IrNode {
                IrNode::op(Op::$op, vec![a.into()])
            }
        )*
    };
}

binary_ops! {
    /// `a + b`.
    add => Add;
    /// `a - b`.
    sub => Sub;
    /// `a * b`.
    mul => Mul;
    /// Unsigned `a / b`.
    div => Div;
    /// `a ** b`.
    exp => Exp;
    /// Unsigned `a < b`.
    lt => Lt;
    /// Unsigned `a > b`.
    gt => Gt;
    /// Unsigned `a <= b`.
    le => Le;
    /// `a == b`.
    eq => Eq;
    /// Pass `a` through, aborting unless unsigned `a < bound`.
    uclamplt => UClampLt;
    /// Store a word to memory.
    mstore => MStore;
    /// Store a word to a storage slot.
    sstore => SStore;
    /// Hash `size` bytes of memory at `offset`.
    sha3 => Sha3;
    /// Hash two words.
    sha3_64 => Sha3_64;
    /// Halt and return `(offset, size)` through the native channel.
    ret => Return;
}

unary_ops! {
    /// Load a word from memory.
    mload => MLoad;
    /// Load a word from a storage slot.
    sload => SLoad;
    /// Load a word from calldata.
    calldataload => CalldataLoad;
    /// Hash one word.
    sha3_32 => Sha3_32;
    /// `a == 0`.
    iszero => IsZero;
    /// Round up to the next multiple of 32.
    ceil32 => Ceil32;
    /// Abort unless non-zero.
    assert_nonzero => Assert;
    /// Discard a value.
    pop => Pop;
    /// Indirect jump to a computed code offset.
    jump => Jump;
}

/// Signed `lo <= x <= hi` passthrough.
#[must_use]
pub fn clamp(lo: impl Into<IrNode>, x: impl Into<IrNode>, hi: impl Into<IrNode>) -> IrNode {
    IrNode::op(Op::Clamp, vec![lo.into(), x.into(), hi.into()])
}

/// The size of the call input region.
#[must_use]
pub fn calldatasize() -> IrNode {
    IrNode::op(Op::CalldataSize, vec![])
}

/// Copy `size` bytes of calldata at `offset` into memory at `dest`.
#[must_use]
pub fn calldatacopy(
    dest: impl Into<IrNode>,
    offset: impl Into<IrNode>,
    size: impl Into<IrNode>,
) -> IrNode {
    IrNode::op(Op::CalldataCopy, vec![dest.into(), offset.into(), size.into()])
}

/// A two-armed conditional statement.
#[must_use]
pub fn if_then(cond: IrNode, then: IrNode) -> IrNode {
    IrNode::op(Op::If, vec![cond, then])
}

/// Rebind an enclosing `with` name.
#[must_use]
pub fn set(name: &str, value: impl Into<IrNode>) -> IrNode {
    IrNode::op(Op::Set, vec![IrNode::var(name), value.into()])
}

/// A named jump target.
#[must_use]
pub fn label(name: &str) -> IrNode {
    IrNode::op(Op::Label, vec![IrNode::var(name)])
}

/// An unconditional branch to a named label.
#[must_use]
pub fn goto(name: &str) -> IrNode {
    IrNode::op(Op::Goto, vec![IrNode::var(name)])
}

/// Exit the innermost `repeat`.
#[must_use]
pub fn break_loop() -> IrNode {
    IrNode::op(Op::Break, vec![])
}

/// A bounded loop with the iteration counter held in memory at `slot`.
#[must_use]
pub fn repeat(slot: usize, start: impl Into<IrNode>, rounds: usize, body: IrNode) -> IrNode {
    IrNode::op(Op::Repeat, vec![slot.into(), start.into(), rounds.into(), body])
}
