//! The value-type model.
//!
//! A closed set of variants; every consumer matches exhaustively so the
//! compiler proves no other shape can reach code generation.

use alloy_primitives::{I256, U256};
use indexmap::IndexMap;
use std::fmt;

/// The machine's native addressing and arithmetic unit, in bytes.
pub const WORD_SIZE: usize = 32;

/// Rounds `n` up to the next multiple of 32.
#[must_use]
pub const fn ceil32(n: usize) -> usize {
    n.div_ceil(WORD_SIZE) * WORD_SIZE
}

/// Scalar base kinds.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BaseKind {
    /// Boolean.
    Bool,
    /// Signed integer with the given bit width.
    Int(u16),
    /// Unsigned integer with the given bit width.
    Uint(u16),
    /// Fixed-point decimal scaled by [`DECIMAL_DIVISOR`].
    Decimal,
    /// A 20-byte account address.
    Address,
    /// A single raw word.
    Bytes32,
    /// A reference to a deployed contract, address-shaped on the wire.
    Contract(String),
}

/// The fixed-point scaling factor for [`BaseKind::Decimal`]: 10^10.
pub const DECIMAL_DIVISOR: u64 = 10_000_000_000;

impl BaseKind {
    /// Returns true for signed and unsigned integer kinds.
    #[must_use]
    pub const fn is_integer(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Uint(_))
    }

    /// The representable range of compile-time literals of this kind, as
    /// inclusive signed bounds, or `None` for kinds without a numeric range.
    ///
    /// The literal pool is 256-bit signed, so `uint` widths of 255 bits and
    /// up are capped at the largest representable literal.
    #[must_use]
    pub fn literal_bounds(&self) -> Option<(I256, I256)> {
        let pow2_minus_1 = |bits: usize| {
            debug_assert!(bits < 256);
            I256::from_raw((U256::from(1u8) << bits) - U256::from(1u8))
        };
        let bounds = match self {
            Self::Bool => (I256::ZERO, I256::ONE),
            Self::Int(bits) if *bits >= 256 => (I256::MIN, I256::MAX),
            Self::Int(bits) => {
                let max = pow2_minus_1(*bits as usize - 1);
                (-max - I256::ONE, max)
            }
            Self::Uint(bits) if *bits >= 255 => (I256::ZERO, I256::MAX),
            Self::Uint(bits) => (I256::ZERO, pow2_minus_1(*bits as usize)),
            // Scaled representation: +/- (2^127 - 1) in units of 10^-10.
            Self::Decimal => {
                let max = pow2_minus_1(127);
                (-max, max)
            }
            Self::Address | Self::Bytes32 | Self::Contract(_) => return None,
        };
        Some(bounds)
    }

    /// Returns true if the compile-time literal `value` is representable.
    ///
    /// Kinds without a numeric range accept any word.
    #[must_use]
    pub fn literal_in_bounds(&self, value: I256) -> bool {
        match self.literal_bounds() {
            Some((min, max)) => value >= min && value <= max,
            None => value >= I256::ZERO,
        }
    }
}

impl fmt::Display for BaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Int(bits) => write!(f, "int{bits}"),
            Self::Uint(bits) => write!(f, "uint{bits}"),
            Self::Decimal => f.write_str("decimal"),
            Self::Address => f.write_str("address"),
            Self::Bytes32 => f.write_str("bytes32"),
            Self::Contract(name) => write!(f, "contract {name}"),
        }
    }
}

/// A scalar type: a base kind plus unit metadata and literalness.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseTy {
    /// The scalar kind.
    pub kind: BaseKind,
    /// Optional unit annotation (`wei`, `sec`, ...).
    pub unit: Option<String>,
    /// True for positional units (timestamps rather than durations).
    pub positional: bool,
    /// True if this type was assigned to a compile-time literal.
    pub is_literal: bool,
}

impl BaseTy {
    /// Creates a plain, unit-less, non-literal scalar type.
    #[must_use]
    pub const fn new(kind: BaseKind) -> Self {
        Self { kind, unit: None, positional: false, is_literal: false }
    }

    /// Creates the type of a compile-time literal of the given kind.
    #[must_use]
    pub const fn literal(kind: BaseKind) -> Self {
        Self { kind, unit: None, positional: false, is_literal: true }
    }

    /// Attaches a unit annotation.
    #[must_use]
    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_owned());
        self
    }

    /// Marks the unit as positional.
    #[must_use]
    pub const fn positional(mut self) -> Self {
        self.positional = true;
        self
    }

    /// Unit compatibility: a unit-less, non-positional source converts into
    /// anything; otherwise unit and positionality must match exactly.
    #[must_use]
    pub fn units_compatible_with(&self, dest: &Self) -> bool {
        (self.unit.is_none() && !self.positional)
            || (self.unit == dest.unit && self.positional == dest.positional)
    }
}

impl fmt::Display for BaseTy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)?;
        if let Some(unit) = &self.unit {
            write!(f, "({unit})")?;
        }
        Ok(())
    }
}

/// Whether a variable-length byte sequence is raw bytes or text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ByteSeqKind {
    /// Raw byte payload.
    #[display("bytes")]
    Bytes,
    /// UTF-8 text payload.
    #[display("string")]
    Str,
}

/// A value type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ty {
    /// A scalar.
    Base(BaseTy),
    /// A length-prefixed, variable-length byte sequence bounded by `max_len`.
    ByteArray {
        /// Bytes or text.
        kind: ByteSeqKind,
        /// The static upper bound on the payload length, in bytes.
        max_len: usize,
    },
    /// A fixed-size homogeneous array.
    List {
        /// The element type.
        element: Box<Ty>,
        /// The element count.
        count: usize,
    },
    /// A key-to-value table. Only meaningful in persistent storage; it has
    /// no fixed-size representation and can never be copied as a whole.
    Mapping {
        /// The key type.
        key: Box<Ty>,
        /// The value type.
        value: Box<Ty>,
    },
    /// A nominally-typed aggregate with named, ordered members.
    Struct {
        /// The nominal name; assignment requires it to match.
        name: String,
        /// Ordered member name-to-type map.
        members: IndexMap<String, Ty>,
    },
    /// A structurally-typed aggregate with positional members.
    Tuple(Vec<Ty>),
}

/// The key of one member of a struct or tuple, in member order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateKey<'a> {
    /// A named struct member.
    Member(&'a str),
    /// A positional tuple member.
    Position(usize),
}

impl fmt::Display for AggregateKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Member(name) => f.write_str(name),
            Self::Position(i) => write!(f, "{i}"),
        }
    }
}

impl Ty {
    /// `bool`.
    #[must_use]
    pub const fn bool() -> Self {
        Self::Base(BaseTy::new(BaseKind::Bool))
    }

    /// `int128`, the default signed scalar.
    #[must_use]
    pub const fn int128() -> Self {
        Self::Base(BaseTy::new(BaseKind::Int(128)))
    }

    /// `uint256`, the full machine word.
    #[must_use]
    pub const fn uint256() -> Self {
        Self::Base(BaseTy::new(BaseKind::Uint(256)))
    }

    /// `decimal`.
    #[must_use]
    pub const fn decimal() -> Self {
        Self::Base(BaseTy::new(BaseKind::Decimal))
    }

    /// `address`.
    #[must_use]
    pub const fn address() -> Self {
        Self::Base(BaseTy::new(BaseKind::Address))
    }

    /// `bytes[max_len]`.
    #[must_use]
    pub const fn bytes(max_len: usize) -> Self {
        Self::ByteArray { kind: ByteSeqKind::Bytes, max_len }
    }

    /// `string[max_len]`.
    #[must_use]
    pub const fn string(max_len: usize) -> Self {
        Self::ByteArray { kind: ByteSeqKind::Str, max_len }
    }

    /// `element[count]`.
    #[must_use]
    pub fn list(element: Self, count: usize) -> Self {
        Self::List { element: Box::new(element), count }
    }

    /// `map(key, value)`.
    #[must_use]
    pub fn mapping(key: Self, value: Self) -> Self {
        Self::Mapping { key: Box::new(key), value: Box::new(value) }
    }

    /// A named struct from ordered `(name, type)` pairs.
    #[must_use]
    pub fn strukt<'a>(name: &str, members: impl IntoIterator<Item = (&'a str, Self)>) -> Self {
        Self::Struct {
            name: name.to_owned(),
            members: members.into_iter().map(|(k, v)| (k.to_owned(), v)).collect(),
        }
    }

    /// Returns the scalar type, if this is one.
    #[must_use]
    pub const fn as_base(&self) -> Option<&BaseTy> {
        match self {
            Self::Base(base) => Some(base),
            _ => None,
        }
    }

    /// Returns true if this is a scalar of the given kind.
    #[must_use]
    pub fn is_base_kind(&self, kind: &BaseKind) -> bool {
        matches!(self, Self::Base(base) if base.kind == *kind)
    }

    /// Returns true if this is a signed or unsigned integer scalar.
    #[must_use]
    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Base(base) if base.kind.is_integer())
    }

    /// Returns the byte-sequence bound, if this is a byte sequence.
    #[must_use]
    pub const fn byte_seq(&self) -> Option<(ByteSeqKind, usize)> {
        match self {
            Self::ByteArray { kind, max_len } => Some((*kind, *max_len)),
            _ => None,
        }
    }

    /// The static size of a value of this type, in words.
    ///
    /// Byte sequences reserve their padded payload plus a length word and a
    /// spill word. Mappings have no static size; asking for one is a
    /// compiler defect.
    #[must_use]
    pub fn size_of(&self) -> usize {
        match self {
            Self::Base(_) => 1,
            Self::ByteArray { max_len, .. } => ceil32(*max_len) / WORD_SIZE + 2,
            Self::List { element, count } => element.size_of() * count,
            Self::Mapping { .. } => panic!("mapping types have no static size"),
            Self::Struct { members, .. } => members.values().map(Self::size_of).sum(),
            Self::Tuple(members) => members.iter().map(Self::size_of).sum(),
        }
    }

    /// Returns true if a value of this type contains variable-length data.
    #[must_use]
    pub fn has_dynamic_data(&self) -> bool {
        match self {
            Self::Base(_) => false,
            Self::ByteArray { .. } => true,
            Self::List { element, .. } => element.has_dynamic_data(),
            Self::Mapping { .. } => false,
            Self::Struct { members, .. } => members.values().any(Self::has_dynamic_data),
            Self::Tuple(members) => members.iter().any(Self::has_dynamic_data),
        }
    }

    /// Ordered members of a struct or tuple, or `None` for other types.
    pub fn aggregate_items(&self) -> Option<Vec<(AggregateKey<'_>, &Self)>> {
        match self {
            Self::Struct { members, .. } => {
                Some(members.iter().map(|(k, v)| (AggregateKey::Member(k), v)).collect())
            }
            Self::Tuple(members) => Some(
                members.iter().enumerate().map(|(i, v)| (AggregateKey::Position(i), v)).collect(),
            ),
            _ => None,
        }
    }

    /// The canonical signature name of this type, used for method-identifier
    /// hashing. Aggregates flatten to their tuple form.
    #[must_use]
    pub fn canonical_name(&self) -> String {
        match self {
            Self::Base(base) => match &base.kind {
                BaseKind::Bool => "bool".into(),
                BaseKind::Int(bits) => format!("int{bits}"),
                BaseKind::Uint(bits) => format!("uint{bits}"),
                // 128.10 fixed-point in its external form.
                BaseKind::Decimal => "fixed168x10".into(),
                BaseKind::Address | BaseKind::Contract(_) => "address".into(),
                BaseKind::Bytes32 => "bytes32".into(),
            },
            Self::ByteArray { kind: ByteSeqKind::Bytes, .. } => "bytes".into(),
            Self::ByteArray { kind: ByteSeqKind::Str, .. } => "string".into(),
            Self::List { element, count } => format!("{}[{count}]", element.canonical_name()),
            Self::Mapping { .. } => panic!("mapping types cannot appear in a signature"),
            Self::Struct { members, .. } => {
                let inner: Vec<_> = members.values().map(Self::canonical_name).collect();
                format!("({})", inner.join(","))
            }
            Self::Tuple(members) => {
                let inner: Vec<_> = members.iter().map(Self::canonical_name).collect();
                format!("({})", inner.join(","))
            }
        }
    }

}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base(base) => base.fmt(f),
            Self::ByteArray { kind, max_len } => write!(f, "{kind}[{max_len}]"),
            Self::List { element, count } => write!(f, "{element}[{count}]"),
            Self::Mapping { key, value } => write!(f, "map({key}, {value})"),
            Self::Struct { name, .. } => write!(f, "struct {name}"),
            Self::Tuple(members) => {
                f.write_str("(")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    member.fmt(f)?;
                }
                f.write_str(")")
            }
        }
    }
}
