//! Sub-value address resolution.
//!
//! Takes a located parent node and a member/index key and produces the
//! child's address, in whichever storage class the parent lives. Aggregate
//! roots in storage are hashed once here; callers that access the same
//! aggregate repeatedly rebind the parent as `storage_prehashed` so the hash
//! is not recomputed per member.

use crate::{
    Error, Result,
    convert::{convert, read_location},
};
use adder_ir::{
    AggregateKey, IrNode, Location, Span, Ty, WORD_SIZE,
    build::{add, mload, mul, sha3, sha3_32, sha3_64, uclamplt},
};
use std::fmt;

/// The key selecting a sub-value of a composite parent.
#[derive(Clone, Debug)]
pub enum SubKey<'a> {
    /// A named struct member.
    Member(&'a str),
    /// A positional tuple member.
    Position(usize),
    /// A list index or mapping key.
    Index(IrNode),
}

impl<'a> From<AggregateKey<'a>> for SubKey<'a> {
    fn from(key: AggregateKey<'a>) -> Self {
        match key {
            AggregateKey::Member(name) => Self::Member(name),
            AggregateKey::Position(i) => Self::Position(i),
        }
    }
}

impl fmt::Display for SubKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Member(name) => f.write_str(name),
            Self::Position(i) => write!(f, "{i}"),
            Self::Index(node) => node.fmt(f),
        }
    }
}

/// Descends from a located composite value to one element or member.
///
/// `array_bounds_check` controls list indexing only: callers that have
/// already validated their indices (element-wise aggregate recursion) pass
/// `false` to elide the runtime clamp.
pub fn resolve(
    parent: &IrNode,
    key: SubKey<'_>,
    span: Span,
    array_bounds_check: bool,
) -> Result<IrNode> {
    let ty = parent
        .ty
        .clone()
        .ok_or_else(|| Error::internal("untyped parent in sub-value resolution", span))?;
    let location = parent
        .location
        .ok_or_else(|| Error::internal(format!("unlocated parent of type {ty}"), span))?;
    match &ty {
        Ty::Struct { .. } | Ty::Tuple(_) => resolve_aggregate(parent, &ty, &key, location, span),
        Ty::Mapping { key: key_ty, value } => {
            resolve_mapping(parent, key, key_ty, value, location, span)
        }
        Ty::List { element, count } => {
            resolve_index(parent, key, element, *count, location, span, array_bounds_check)
        }
        _ => Err(Error::type_mismatch(
            format!("cannot access the child of a value of type {ty}"),
            span,
        )),
    }
}

fn resolve_aggregate(
    parent: &IrNode,
    ty: &Ty,
    key: &SubKey<'_>,
    location: Location,
    span: Span,
) -> Result<IrNode> {
    let items = ty
        .aggregate_items()
        .ok_or_else(|| Error::internal(format!("{ty} is not an aggregate"), span))?;
    let (index, annotation) = match (ty, key) {
        (Ty::Struct { name, .. }, SubKey::Member(member)) => {
            let position = items
                .iter()
                .position(|(k, _)| matches!(k, AggregateKey::Member(m) if m == member));
            match position {
                Some(i) => (i, Some((*member).to_owned())),
                None => {
                    let available: Vec<&str> = items
                        .iter()
                        .filter_map(|(k, _)| match k {
                            AggregateKey::Member(m) => Some(*m),
                            AggregateKey::Position(_) => None,
                        })
                        .collect();
                    return Err(Error::type_mismatch(
                        format!(
                            "struct {name} has no member {member}; available: {}",
                            available.join(" ")
                        ),
                        span,
                    ));
                }
            }
        }
        (Ty::Struct { .. }, key) => {
            return Err(Error::type_mismatch(
                format!("expecting a member access; cannot access element {key} of {ty}"),
                span,
            ));
        }
        (Ty::Tuple(_), SubKey::Position(i)) => {
            if *i >= items.len() {
                return Err(Error::internal(
                    format!("position {i} out of range for {ty}"),
                    span,
                ));
            }
            (*i, None)
        }
        (Ty::Tuple(_), key) => {
            return Err(Error::type_mismatch(
                format!("expecting a static position; cannot access element {key} of {ty}"),
                span,
            ));
        }
        _ => unreachable!("aggregate resolution on {ty}"),
    };
    let subtype = items[index].1.clone();
    let mut index_node = IrNode::from(index);
    if let Some(annotation) = &annotation {
        index_node = index_node.annotated(annotation.clone());
    }

    match location {
        // One content hash per aggregate root, then a linear slot offset.
        Location::Storage => Ok(add(sha3_32(parent.clone()), index_node)
            .typed(subtype)
            .located(Location::Storage)
            .spanned(span)),
        // The hash is already applied; offset directly.
        Location::StoragePrehashed => Ok(add(parent.clone(), index_node)
            .typed(subtype)
            .located(Location::Storage)
            .spanned(span)),
        // Byte offsets: skip the full static size of every earlier member.
        Location::Memory | Location::Calldata => {
            let offset: usize =
                items[..index].iter().map(|(_, ty)| WORD_SIZE * ty.size_of()).sum();
            let mut node = add(offset, parent.clone()).typed(subtype).located(location);
            if let Some(annotation) = annotation {
                node = node.annotated(annotation);
            }
            Ok(node.spanned(span))
        }
    }
}

fn resolve_mapping(
    parent: &IrNode,
    key: SubKey<'_>,
    key_ty: &Ty,
    value_ty: &Ty,
    location: Location,
    span: Span,
) -> Result<IrNode> {
    let key_node = match key {
        SubKey::Index(node) => node,
        other => {
            return Err(Error::type_mismatch(
                format!("mappings are accessed by key, not member {other}"),
                span,
            ));
        }
    };

    let derived = match key_node.ty.as_ref().and_then(Ty::byte_seq) {
        // Byte-sequence keys hash the in-memory payload directly instead of
        // converting to a word.
        Some((_, key_max)) => {
            match key_ty.byte_seq() {
                Some((_, declared_max)) if declared_max >= key_max => {}
                _ => {
                    return Err(Error::type_mismatch(
                        format!(
                            "byte-sequence mapping keys cannot be cast; use the exact key type {key_ty}"
                        ),
                        span,
                    ));
                }
            }
            if key_node.location != Some(Location::Memory) {
                return Err(Error::internal(
                    "byte-sequence mapping keys must be materialized in memory",
                    span,
                ));
            }
            sha3(add(key_node.clone(), 32usize), mload(key_node))
        }
        None => convert(key_node, key_ty, span, false)?,
    };

    match location {
        Location::Storage => Ok(sha3_64(parent.clone(), derived)
            .typed(value_ty.clone())
            .located(Location::Storage)
            .spanned(span)),
        Location::Memory | Location::Calldata => Err(Error::type_mismatch(
            "mappings have no fixed-size representation outside storage",
            span,
        )),
        Location::StoragePrehashed => {
            Err(Error::internal("mapping accessed through a prehashed parent", span))
        }
    }
}

fn resolve_index(
    parent: &IrNode,
    key: SubKey<'_>,
    element: &Ty,
    count: usize,
    location: Location,
    span: Span,
    array_bounds_check: bool,
) -> Result<IrNode> {
    let key_node = match key {
        SubKey::Index(node) => node,
        other => {
            return Err(Error::type_mismatch(
                format!("array elements are selected by index, not member {other}"),
                span,
            ));
        }
    };
    let key_ty = key_node
        .ty
        .clone()
        .ok_or_else(|| Error::internal("untyped array index", span))?;
    if !key_ty.is_integer() {
        return Err(Error::type_mismatch(
            format!("invalid type for an array index: {key_ty}"),
            span,
        ));
    }
    let index = read_location(key_node);

    let index = if !array_bounds_check {
        index
    } else if key_ty.as_base().is_some_and(|base| base.is_literal)
        && let Some(value) = index.literal_value()
    {
        // The bound is decidable now; check it and elide the runtime clamp.
        if index.literal_offset().is_none_or(|i| i >= count) {
            return Err(Error::out_of_bounds(
                format!("index is {value} but the array size is {count}"),
                span,
            ));
        }
        index
    } else {
        // In two's complement a negative index reads as a huge unsigned
        // value, so one unsigned clamp rejects both directions.
        uclamplt(index, count)
    };

    match location {
        Location::Storage => Ok(add(sha3_32(parent.clone()), index)
            .typed(element.clone())
            .located(Location::Storage)
            .spanned(span)),
        Location::StoragePrehashed => Ok(add(parent.clone(), index)
            .typed(element.clone())
            .located(Location::Storage)
            .spanned(span)),
        Location::Memory | Location::Calldata => {
            let stride = WORD_SIZE * element.size_of();
            Ok(add(mul(stride, index), parent.clone())
                .typed(element.clone())
                .located(location)
                .spanned(span))
        }
    }
}
