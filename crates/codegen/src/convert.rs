//! Scalar type conversion.
//!
//! The only place a value changes type. Anything that is not one of the
//! sanctioned conversions is a type mismatch; literal operands are
//! range-checked against the destination before anything else happens.

use crate::{Error, Result};
use adder_ir::{
    BaseKind, IrNode, Location, Span, Ty,
    build::{add, clamp, div, exp, mload, sha3_32, sload, sub},
    ty::DECIMAL_DIVISOR,
};

/// Loads a node's value out of its location; immediates pass through.
#[must_use]
pub fn read_location(node: IrNode) -> IrNode {
    use adder_ir::build::{calldataload, mload, sload};
    let ty = node.ty.clone();
    let mut loaded = match node.location {
        Some(Location::Memory) => mload(node),
        Some(Location::Storage | Location::StoragePrehashed) => sload(node),
        Some(Location::Calldata) => calldataload(node),
        None => return node,
    };
    loaded.ty = ty;
    loaded
}

/// Converts `value` to the base type `to`.
///
/// `call_ctx` marks conversions of arguments packed into calls, which
/// additionally require literal operands to carry explicitly matching unit
/// annotations.
pub fn convert(value: IrNode, to: &Ty, span: Span, call_ctx: bool) -> Result<IrNode> {
    let value = read_location(value);
    let (Some(to_base), Some(frm)) = (to.as_base(), value.ty.clone()) else {
        return Err(Error::type_mismatch(
            format!(
                "base type conversion from or to a non-base type: {} -> {to}",
                value.ty.as_ref().map_or("<untyped>".to_owned(), ToString::to_string)
            ),
            span,
        ));
    };
    let Some(frm_base) = frm.as_base() else {
        return Err(Error::type_mismatch(
            format!("base type conversion from or to a non-base type: {frm} -> {to}"),
            span,
        ));
    };

    if frm_base.is_literal && frm_base.kind.is_integer() {
        // Literals must fit the destination's representable range; nothing
        // here ever truncates silently.
        if let Some(v) = value.literal_value()
            && !to_base.kind.literal_in_bounds(v)
        {
            return Err(Error::invalid_literal(format!("number out of range for {to}: {v}"), span));
        }
        // Calls never assume a unit for an unannotated literal argument.
        if call_ctx
            && !(frm_base.unit == to_base.unit && frm_base.positional == to_base.positional)
        {
            return Err(Error::invalid_literal(
                format!("calls require explicit unit annotations on literal arguments; expected {to}"),
                span,
            ));
        }
    }

    // Same kind, compatible units: retag without touching the value.
    if frm_base.kind == to_base.kind && frm_base.units_compatible_with(to_base) {
        return Ok(retag(value, to.clone()));
    }
    // A contract reference is address-shaped on the wire.
    if matches!(frm_base.kind, BaseKind::Contract(_)) && to_base.kind == BaseKind::Address {
        return Ok(retag(value, to.clone()));
    }
    // An in-range integer literal widens into an unsigned destination.
    if frm_base.is_literal
        && frm_base.kind.is_integer()
        && matches!(to_base.kind, BaseKind::Uint(_))
        && value.literal_value().is_some()
    {
        return Ok(retag(value, to.clone()));
    }
    // int128 scales into a fixed-point decimal.
    if frm_base.kind == BaseKind::Int(128)
        && to_base.kind == BaseKind::Decimal
        && frm_base.units_compatible_with(to_base)
    {
        use adder_ir::build::mul;
        return Ok(mul(value, DECIMAL_DIVISOR).typed(to.clone()).spanned(span));
    }

    Err(Error::type_mismatch(format!("no conversion from {frm} to {to}"), span))
}

fn retag(mut node: IrNode, ty: Ty) -> IrNode {
    node.ty = Some(ty);
    node
}

/// Extracts the leading word of a byte sequence of at most 32 bytes as a
/// number, shifting out the unused tail and clamping signed destinations to
/// the `int128` range.
pub fn byte_array_to_num(arg: IrNode, out: &Ty, span: Span) -> Result<IrNode> {
    use crate::context::reserved::{MAX_INT128, MIN_INT128};

    let annotation = format!("bytearray to number ({out})");
    let (length, first_word) = match arg.location {
        Some(Location::Memory) => {
            (mload(IrNode::var("_sub")), mload(add(32usize, IrNode::var("_sub"))))
        }
        Some(Location::Storage) => (
            sload(sha3_32(IrNode::var("_sub"))),
            sload(add(1usize, sha3_32(IrNode::var("_sub")))),
        ),
        _ => {
            return Err(Error::internal(
                "byte-sequence extraction from an unsupported location",
                span,
            ));
        }
    };
    let shifted = div(IrNode::var("_el1"), exp(256u64, sub(32u64, IrNode::var("_len"))));
    let result = match out.as_base().map(|base| &base.kind) {
        Some(BaseKind::Int(128)) => clamp(mload(MIN_INT128), shifted, mload(MAX_INT128)),
        Some(BaseKind::Uint(256)) => shifted,
        _ => {
            return Err(Error::type_mismatch(
                format!("a byte sequence only extracts as int128 or uint256, not {out}"),
                span,
            ));
        }
    };
    Ok(IrNode::with_var(
        "_sub",
        arg,
        IrNode::with_var(
            "_el1",
            first_word,
            IrNode::with_var("_len", clamp(0u64, length, 32u64), result),
        ),
    )
    .typed(out.clone())
    .annotated(annotation)
    .spanned(span))
}
