//! Typed faults raised during code generation.
//!
//! Every fault is synchronous, carries the source position of the statement
//! being lowered, and aborts compilation of the current unit; nothing is
//! retried or recovered.

use adder_ir::Span;

/// The result of a code-generation step.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A fault raised during code generation.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{kind} at {span}")]
pub struct Error {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Where in the original source.
    pub span: Span,
}

/// The fault taxonomy.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ErrorKind {
    /// Shape, kind, name, or arity disagreement between destination and
    /// source.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    /// A compile-time constant does not fit the destination's representable
    /// range.
    #[error("invalid literal: {0}")]
    InvalidLiteral(String),
    /// A compile-time-constant array index outside `[0, count)`.
    #[error("array index out of bounds: {0}")]
    OutOfBounds(String),
    /// Call-argument arity mismatch or an invalid assignment target.
    #[error("invalid structure: {0}")]
    Structure(String),
    /// A write into read-only data.
    #[error("cannot modify constant data: {0}")]
    Constancy(String),
    /// An invariant an earlier stage should have enforced was violated.
    /// Signals a compiler defect, never a user error.
    #[error("compiler panic: {0}")]
    Internal(String),
}

impl Error {
    /// A [`ErrorKind::TypeMismatch`] fault.
    #[must_use]
    pub fn type_mismatch(msg: impl Into<String>, span: Span) -> Self {
        Self { kind: ErrorKind::TypeMismatch(msg.into()), span }
    }

    /// An [`ErrorKind::InvalidLiteral`] fault.
    #[must_use]
    pub fn invalid_literal(msg: impl Into<String>, span: Span) -> Self {
        Self { kind: ErrorKind::InvalidLiteral(msg.into()), span }
    }

    /// An [`ErrorKind::OutOfBounds`] fault.
    #[must_use]
    pub fn out_of_bounds(msg: impl Into<String>, span: Span) -> Self {
        Self { kind: ErrorKind::OutOfBounds(msg.into()), span }
    }

    /// An [`ErrorKind::Structure`] fault.
    #[must_use]
    pub fn structure(msg: impl Into<String>, span: Span) -> Self {
        Self { kind: ErrorKind::Structure(msg.into()), span }
    }

    /// An [`ErrorKind::Constancy`] fault.
    #[must_use]
    pub fn constancy(msg: impl Into<String>, span: Span) -> Self {
        Self { kind: ErrorKind::Constancy(msg.into()), span }
    }

    /// An [`ErrorKind::Internal`] fault.
    #[must_use]
    pub fn internal(msg: impl Into<String>, span: Span) -> Self {
        Self { kind: ErrorKind::Internal(msg.into()), span }
    }
}
