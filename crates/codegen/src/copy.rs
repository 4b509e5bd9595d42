//! Copy and zero code for variable-length byte sequences.
//!
//! Memory-to-memory copies go through the identity precompile in one call;
//! anything touching storage runs a bounded word loop that reads the runtime
//! length once and skips writes past it. Zeroing a memory destination reads
//! past the end of calldata, which deterministically yields zero bytes.

use crate::{Error, Result, context::reserved::FREE_LOOP_INDEX};
use adder_ir::{
    IrNode, Location, Op, Span, Ty, WORD_SIZE,
    build::{
        add, assert_nonzero, break_loop, calldatacopy, calldatasize, ceil32, div, gt, if_then,
        mload, mstore, mul, pop, repeat, sha3_32, sload, sstore, sub,
    },
    ceil32 as ceil32_const,
};

/// Base cost of one identity-precompile invocation.
pub const GAS_IDENTITY: u64 = 15;
/// Identity-precompile cost per word copied.
pub const GAS_IDENTITY_WORD: u64 = 3;

/// Generates code copying the byte sequence at `src` over `dest`, or
/// clearing `dest` when `src` is null.
///
/// The source bound must not exceed the destination's; clearing requires
/// equal bounds so it can never silently truncate.
pub fn make_byte_array_copier(dest: IrNode, src: IrNode, span: Span) -> Result<IrNode> {
    let dest_ty = dest
        .ty
        .clone()
        .ok_or_else(|| Error::internal("untyped copy destination", span))?;
    let (dest_kind, dest_max) = dest_ty
        .byte_seq()
        .ok_or_else(|| Error::internal(format!("copy destination of type {dest_ty}"), span))?;
    let Some((_, src_max)) = src.ty.as_ref().and_then(Ty::byte_seq) else {
        return Err(Error::type_mismatch(
            format!("can only set a {dest_kind} to another {dest_kind}"),
            span,
        ));
    };
    if src_max > dest_max {
        return Err(Error::type_mismatch(
            format!("cannot cast from greater max-length {src_max} to shorter max-length {dest_max}"),
            span,
        ));
    }
    if src.is_null() && src_max != dest_max {
        return Err(Error::type_mismatch(
            format!(
                "bad type for clearing bytes: expected {dest_ty} but got {}",
                src.ty.as_ref().map_or("<untyped>".to_owned(), ToString::to_string)
            ),
            span,
        ));
    }

    // Fast path: one length-prefixed identity copy sized to the bound.
    if src.location == Some(Location::Memory) && dest.location == Some(Location::Memory) {
        let words = (ceil32_const(src_max) / WORD_SIZE) as u64;
        let size = add(32usize, mload(IrNode::var("_source")));
        let call = IrNode::op(
            Op::Call,
            vec![
                add(18usize, div(IrNode::var("_sz"), 10usize)),
                4usize.into(),
                0usize.into(),
                IrNode::var("_source"),
                IrNode::var("_sz"),
                dest,
                IrNode::var("_sz"),
            ],
        );
        return Ok(IrNode::with_var(
            "_source",
            src,
            IrNode::with_var("_sz", size, assert_nonzero(call)),
        )
        .annotated("Memory copy")
        .with_added_gas(GAS_IDENTITY + GAS_IDENTITY_WORD * words)
        .spanned(span));
    }

    let (pos_node, length) = if src.is_null() {
        (src.clone(), IrNode::from(1u64))
    } else {
        let src_ty = src.ty.clone().ok_or_else(|| Error::internal("untyped copy source", span))?;
        let raw = IrNode::var("_pos").typed(src_ty.clone());
        match src.location {
            Some(Location::Memory) => (
                raw.located(Location::Memory),
                add(mload(IrNode::var("_pos")), 32usize),
            ),
            // Hash the root once; the loop then reads the length and every
            // payload word from the derived base.
            Some(Location::Storage) => (
                sha3_32(raw).typed(src_ty).located(Location::Storage),
                add(sload(IrNode::var("_pos")), 32usize),
            ),
            _ => {
                return Err(Error::internal(
                    format!("unsupported copy source location: {src}"),
                    span,
                ));
            }
        }
    };

    let dest = if dest.location == Some(Location::Storage) {
        sha3_32(dest).typed(dest_ty).located(Location::Storage)
    } else {
        dest
    };

    let max_length = if src.is_null() {
        // A cleared memory destination zero-fills its whole static extent;
        // clearing storage only rewrites the length word.
        if dest.location == Some(Location::Memory) {
            WORD_SIZE + ceil32_const(dest_max)
        } else {
            WORD_SIZE
        }
    } else {
        src_max + WORD_SIZE
    };

    let outer = if src.is_null() { IrNode::from(0u64) } else { src };
    let copier = make_byte_slice_copier(dest, pos_node, length, max_length, span)?;
    Ok(IrNode::with_var("_pos", outer, copier).spanned(span))
}

/// Generates code copying `length` bytes from `src` to `dest`, given the
/// static bound `max_length` (both positions are start-of-sequence
/// addresses; `length` includes the length word).
pub fn make_byte_slice_copier(
    dest: IrNode,
    src: IrNode,
    length: IrNode,
    max_length: usize,
    span: Span,
) -> Result<IrNode> {
    // Memory to memory: the identity precompile moves everything at once.
    if src.location == Some(Location::Memory) && dest.location == Some(Location::Memory) {
        let annotation = format!("copy byte slice dest: {dest}");
        let call = IrNode::op(
            Op::Call,
            vec![
                (18 + max_length / 10).into(),
                4usize.into(),
                0usize.into(),
                src,
                IrNode::var("_l"),
                dest,
                IrNode::var("_l"),
            ],
        );
        return Ok(IrNode::with_var("_l", max_length.into(), pop(call))
            .annotated(annotation)
            .spanned(span));
    }

    if src.is_null() && dest.location == Some(Location::Memory) {
        return Ok(mzero(dest, max_length.into()).spanned(span));
    }

    let annotation = format!("copy byte slice src: {src} dst: {dest}");

    let loader = if src.is_null() {
        IrNode::from(0u64)
    } else {
        match src.location {
            Some(Location::Memory) => mload(add(
                IrNode::var("_pos"),
                mul(32usize, mload(FREE_LOOP_INDEX)),
            )),
            Some(Location::Storage) => {
                sload(add(IrNode::var("_pos"), mload(FREE_LOOP_INDEX)))
            }
            _ => {
                return Err(Error::internal(
                    format!("unsupported copy source location: {src}"),
                    span,
                ));
            }
        }
    };
    let store = match dest.location {
        Some(Location::Memory) => mstore(
            add(IrNode::var("_opos"), mul(32usize, mload(FREE_LOOP_INDEX))),
            loader,
        ),
        Some(Location::Storage) => {
            sstore(add(IrNode::var("_opos"), mload(FREE_LOOP_INDEX)), loader)
        }
        _ => {
            return Err(Error::internal(
                format!("unsupported copy destination location: {dest}"),
                span,
            ));
        }
    };
    // The loop always runs the static word count; this guard skips writes
    // past the runtime length.
    let checker = if_then(
        gt(mul(32usize, mload(FREE_LOOP_INDEX)), IrNode::var("_actual_len")),
        break_loop(),
    );

    let start: IrNode = if src.is_null() { 0u64.into() } else { src };
    let rounds = max_length.div_ceil(WORD_SIZE);
    Ok(IrNode::with_var(
        "_pos",
        start,
        IrNode::with_var(
            "_opos",
            dest,
            IrNode::with_var(
                "_actual_len",
                length,
                repeat(FREE_LOOP_INDEX, 0u64, rounds, IrNode::seq(vec![checker, store])),
            ),
        ),
    )
    .annotated(annotation)
    .spanned(span))
}

/// Zero-fills `nbytes` of memory at `dest` by copying from past the end of
/// the read-only call input region.
#[must_use]
pub fn mzero(dest: IrNode, nbytes: IrNode) -> IrNode {
    calldatacopy(dest, calldatasize(), nbytes).annotated("mzero")
}

/// Right-pads the last word of the byte sequence at `placeholder` with zero
/// bytes up to the next word boundary, as the ABI requires.
#[must_use]
pub fn zero_pad(placeholder: IrNode) -> IrNode {
    let length = mload(placeholder.clone());
    let dest = add(add(placeholder, 32usize), IrNode::var("len"));
    let padding = sub(ceil32(IrNode::var("len")), IrNode::var("len"));
    IrNode::with_var(
        "len",
        length,
        IrNode::with_var("dst", dest, mzero(IrNode::var("dst"), padding)),
    )
    .annotated("zero pad")
}

/// Reads the runtime length of a located byte sequence.
pub fn get_length(arg: IrNode, span: Span) -> Result<IrNode> {
    match arg.location {
        Some(Location::Memory) => Ok(mload(arg).typed(Ty::int128())),
        Some(Location::Storage) => Ok(sload(sha3_32(arg)).typed(Ty::int128())),
        _ => Err(Error::internal(format!("cannot read a length from {arg}"), span)),
    }
}
