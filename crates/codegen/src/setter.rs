//! Recursive assignment code generation for all composite types.
//!
//! Scalars convert and store; byte sequences delegate to the copier;
//! lists and aggregates recurse member-wise under shared base bindings so
//! each side's address is evaluated exactly once, with storage roots hashed
//! a single time up front.

use crate::{
    Error, Result,
    convert::convert,
    copy::{make_byte_array_copier, mzero},
    resolve::{SubKey, resolve},
};
use adder_ir::{
    BaseKind, BaseTy, IrNode, Location, Span, Ty, WORD_SIZE,
    build::{add, mload, mstore, sha3_32, sstore},
};
use alloy_primitives::I256;
use tracing::trace;

/// Generates code assigning `right` into the lvalue `left`.
///
/// `location` is the storage class the destination's address refers to;
/// `in_function_call` tightens literal conversions for packed call
/// arguments.
pub fn make_setter(
    left: IrNode,
    right: IrNode,
    location: Location,
    span: Span,
    in_function_call: bool,
) -> Result<IrNode> {
    let left_ty = left
        .ty
        .clone()
        .ok_or_else(|| Error::internal("untyped assignment destination", span))?;
    trace!(dest = %left_ty, %location, "generating assignment");
    match &left_ty {
        Ty::Base(_) => set_base(left, right, &left_ty, location, span, in_function_call),
        Ty::ByteArray { .. } => make_byte_array_copier(left, right, span),
        Ty::Mapping { .. } => Err(Error::type_mismatch(
            "mappings cannot be copied; assign individual elements instead",
            span,
        )),
        Ty::List { element, count } => {
            let element = (**element).clone();
            set_list(left, right, &left_ty, &element, *count, location, span)
        }
        Ty::Struct { .. } | Ty::Tuple(_) => set_aggregate(left, right, &left_ty, location, span),
    }
}

fn set_base(
    left: IrNode,
    right: IrNode,
    dest_ty: &Ty,
    location: Location,
    span: Span,
    in_function_call: bool,
) -> Result<IrNode> {
    let right = convert(right, dest_ty, span, in_function_call)?;
    // A null scalar source stores as zero.
    let right = if right.is_null() {
        IrNode::literal(I256::ZERO).typed(dest_ty.clone())
    } else {
        right
    };
    match location {
        Location::Storage => Ok(sstore(left, right).spanned(span)),
        Location::Memory => Ok(mstore(left, right).spanned(span)),
        Location::Calldata => {
            Err(Error::constancy("cannot assign into the read-only call input region", span))
        }
        Location::StoragePrehashed => {
            Err(Error::internal("scalar store through a prehashed location", span))
        }
    }
}

/// An index literal for element-wise recursion; the bound was already
/// validated, so downstream resolution skips the runtime clamp.
fn index_literal(i: usize) -> IrNode {
    IrNode::from(i).typed(Ty::Base(BaseTy::literal(BaseKind::Int(128))))
}

/// Binds the destination root, hashing it once when it lives in storage so
/// every element resolves against the prehashed base.
fn hash_root(left: IrNode, ty: &Ty) -> (IrNode, IrNode) {
    let mut token = IrNode::var("_L").typed(ty.clone());
    token.location = left.location;
    if left.location == Some(Location::Storage) {
        let hashed = sha3_32(left).typed(ty.clone()).located(Location::StoragePrehashed);
        (hashed, token.located(Location::StoragePrehashed))
    } else {
        (left, token)
    }
}

fn set_list(
    left: IrNode,
    right: IrNode,
    list_ty: &Ty,
    element: &Ty,
    count: usize,
    location: Location,
    span: Span,
) -> Result<IrNode> {
    if left.is_multi() {
        return Err(Error::structure("the target of an assignment must be a single item", span));
    }
    let rty = right
        .ty
        .clone()
        .ok_or_else(|| Error::internal("untyped list source", span))?;
    match &rty {
        Ty::List { count: rcount, .. } => {
            if *rcount != count {
                return Err(Error::type_mismatch(
                    format!("mismatched number of elements: {count} vs {rcount}"),
                    span,
                ));
            }
        }
        other => {
            return Err(Error::type_mismatch(
                format!("assignment type mismatch: destination is {list_ty}, source is {other}"),
                span,
            ));
        }
    }
    let (left, left_token) = hash_root(left, list_ty);

    // Element-literal source.
    if right.is_multi() {
        if right.args.len() != count {
            return Err(Error::type_mismatch("mismatched number of elements", span));
        }
        let mut subs = Vec::with_capacity(count);
        for i in 0..count {
            let dst = resolve(&left_token, SubKey::Index(index_literal(i)), span, false)?;
            subs.push(make_setter(dst, right.args[i].clone(), location, span, false)?);
        }
        return Ok(IrNode::with_var("_L", left, IrNode::seq(subs)).spanned(span));
    }

    // Null source: one zero-fill in memory, element-wise elsewhere.
    if right.is_null() {
        if left.location == Some(Location::Memory) {
            return Ok(mzero(left, (WORD_SIZE * list_ty.size_of()).into()).spanned(span));
        }
        let mut subs = Vec::with_capacity(count);
        for i in 0..count {
            let dst = resolve(&left_token, SubKey::Index(index_literal(i)), span, false)?;
            subs.push(make_setter(dst, IrNode::null(element.clone()), location, span, false)?);
        }
        return Ok(IrNode::with_var("_L", left, IrNode::seq(subs)).spanned(span));
    }

    // Variable source: bind both bases once, then copy per index.
    let right_loc = right
        .location
        .ok_or_else(|| Error::internal("unlocated list source", span))?;
    let right_token = IrNode::var("_R").typed(rty).located(right_loc);
    let mut subs = Vec::with_capacity(count);
    for i in 0..count {
        let dst = resolve(&left_token, SubKey::Index(index_literal(i)), span, false)?;
        let src = resolve(&right_token, SubKey::Index(index_literal(i)), span, false)?;
        subs.push(make_setter(dst, src, location, span, false)?);
    }
    Ok(IrNode::with_var("_L", left, IrNode::with_var("_R", right, IrNode::seq(subs)))
        .spanned(span))
}

fn set_aggregate(
    left: IrNode,
    right: IrNode,
    agg_ty: &Ty,
    location: Location,
    span: Span,
) -> Result<IrNode> {
    let is_struct = matches!(agg_ty, Ty::Struct { .. });
    if left.is_multi() && is_struct {
        return Err(Error::structure("the target of an assignment must be a single item", span));
    }

    if !right.is_null() {
        let rty = right
            .ty
            .as_ref()
            .ok_or_else(|| Error::internal("untyped aggregate source", span))?;
        match (agg_ty, rty) {
            (
                Ty::Struct { name: left_name, members: left_members },
                Ty::Struct { name: right_name, members: right_members },
            ) => {
                for key in left_members.keys() {
                    if !right_members.contains_key(key) {
                        return Err(Error::type_mismatch(
                            format!("keys don't match for structs, missing {key}"),
                            span,
                        ));
                    }
                }
                for key in right_members.keys() {
                    if !left_members.contains_key(key) {
                        return Err(Error::type_mismatch(
                            format!("keys don't match for structs, extra {key}"),
                            span,
                        ));
                    }
                }
                // Structs are nominal: same members under a different name
                // still do not assign.
                if left_name != right_name {
                    return Err(Error::type_mismatch(
                        format!("expected {agg_ty}, got {rty}"),
                        span,
                    ));
                }
            }
            (Ty::Tuple(left_members), Ty::Tuple(right_members)) => {
                if left_members.len() != right_members.len() {
                    return Err(Error::type_mismatch(
                        format!(
                            "tuple lengths don't match: {} vs {}",
                            left_members.len(),
                            right_members.len()
                        ),
                        span,
                    ));
                }
            }
            _ => {
                return Err(Error::type_mismatch(
                    format!("assignment type mismatch: destination is {agg_ty}, source is {rty}"),
                    span,
                ));
            }
        }
        if is_struct && right.is_multi() {
            for arg in &right.args {
                if arg.is_null() {
                    return Err(Error::internal("null member in a struct literal", span));
                }
            }
        }
    }

    let (left, left_token) = hash_root(left, agg_ty);
    let items = agg_ty
        .aggregate_items()
        .ok_or_else(|| Error::internal(format!("{agg_ty} is not an aggregate"), span))?;
    // Aggregate-literal targets carry a location per member; addressable
    // targets share the caller's.
    let locations: Vec<Location> = if left.is_multi() {
        left.args
            .iter()
            .map(|arg| {
                arg.location.ok_or_else(|| {
                    Error::internal("unlocated member of an aggregate assignment target", span)
                })
            })
            .collect::<Result<_>>()?
    } else {
        vec![location; items.len()]
    };

    // Element-literal source.
    if right.is_multi() {
        if right.args.len() != items.len() {
            return Err(Error::type_mismatch("mismatched number of elements", span));
        }
        let mut subs = Vec::with_capacity(items.len());
        for (i, ((key, _), loc)) in items.iter().zip(&locations).enumerate() {
            let dst = resolve(&left_token, SubKey::from(*key), span, true)?;
            subs.push(make_setter(dst, right.args[i].clone(), *loc, span, false)?);
        }
        return Ok(IrNode::with_var("_L", left, IrNode::seq(subs)).spanned(span));
    }

    // Null source.
    if right.is_null() {
        if left.location == Some(Location::Memory) {
            return Ok(mzero(left, (WORD_SIZE * agg_ty.size_of()).into()).spanned(span));
        }
        let mut subs = Vec::with_capacity(items.len());
        for ((key, member_ty), loc) in items.iter().zip(&locations) {
            let dst = resolve(&left_token, SubKey::from(*key), span, true)?;
            subs.push(make_setter(dst, IrNode::null((*member_ty).clone()), *loc, span, false)?);
        }
        return Ok(IrNode::with_var("_L", left, IrNode::seq(subs)).spanned(span));
    }

    // Packed positional-tuple source: the private calling convention lays a
    // returned tuple out as successive words, with byte sequences as an
    // offset pointer into the same buffer.
    if left.is_multi() && matches!(agg_ty, Ty::Tuple(_)) {
        let Some(Ty::Tuple(right_members)) = right.ty.clone() else {
            return Err(Error::internal("packed source is not tuple-typed", span));
        };
        if left.args.len() != right_members.len() {
            return Err(Error::internal("packed tuple arity drifted from its type", span));
        }
        for target in &left.args {
            if target.location == Some(Location::Calldata) {
                return Err(Error::constancy(
                    format!(
                        "cannot modify function argument: {}",
                        target.annotation.clone().unwrap_or_else(|| target.to_string())
                    ),
                    span,
                ));
            }
        }
        let mut subs = Vec::with_capacity(left.args.len());
        let mut offset = 0usize;
        for ((target, member_ty), loc) in left.args.iter().zip(&right_members).zip(&locations) {
            let source = if let Some((kind, max_len)) = member_ty.byte_seq() {
                let node = add(IrNode::var("_R"), mload(add(IrNode::var("_R"), offset)))
                    .typed(Ty::ByteArray { kind, max_len })
                    .located(Location::Memory)
                    .spanned(span);
                offset += WORD_SIZE;
                node
            } else {
                let node = mload(add(IrNode::var("_R"), offset))
                    .typed(member_ty.clone())
                    .spanned(span);
                offset += WORD_SIZE * member_ty.size_of();
                node
            };
            subs.push(make_setter(target.clone(), source, *loc, span, false)?);
        }
        return Ok(IrNode::with_var("_R", right, IrNode::seq(subs))
            .annotated("Tuple assignment")
            .spanned(span));
    }

    // Variable source.
    let right_loc = right
        .location
        .ok_or_else(|| Error::internal("unlocated aggregate source", span))?;
    let rty = right
        .ty
        .clone()
        .ok_or_else(|| Error::internal("untyped aggregate source", span))?;
    let right_token = IrNode::var("_R").typed(rty).located(right_loc);
    let mut subs = Vec::with_capacity(items.len());
    for ((key, _), loc) in items.iter().zip(&locations) {
        let dst = resolve(&left_token, SubKey::from(*key), span, true)?;
        let src = resolve(&right_token, SubKey::from(*key), span, true)?;
        subs.push(make_setter(dst, src, *loc, span, false)?);
    }
    Ok(IrNode::with_var("_L", left, IrNode::with_var("_R", right, IrNode::seq(subs)))
        .spanned(span))
}
