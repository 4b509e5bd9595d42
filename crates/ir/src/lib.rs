#![doc = include_str!("../README.md")]

pub mod span;
pub use span::Span;

pub mod location;
pub use location::Location;

pub mod ty;
pub use ty::{AggregateKey, BaseKind, BaseTy, ByteSeqKind, Ty, WORD_SIZE, ceil32};

pub mod op;
pub use op::Op;

pub mod node;
pub use node::{IrNode, NodeKind};

pub mod build;
