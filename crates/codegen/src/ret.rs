//! ABI return encoding and the function epilogue.
//!
//! Externally visible functions halt through the native return channel.
//! Internally callable ("private") functions execute in the caller's frame:
//! their epilogue releases the reentrancy guard, pushes the encoded result
//! onto the operand stack word-by-word in reverse order, and jumps back
//! through the caller-supplied callback pointer.

use crate::{
    Context, Error, Result,
    copy::zero_pad,
    resolve::{SubKey, resolve},
    setter::make_setter,
};
use adder_ir::{
    IrNode, Location, NodeKind, Op, Span, Ty, WORD_SIZE,
    build::{add, ceil32, goto, if_then, iszero, jump, label, le, mload, mstore, ret, sload,
        sstore, sub, assert_nonzero},
};
use tracing::debug;

/// The acquire/release pair for the function's reentrancy guard, or two
/// no-ops when it is unguarded.
///
/// Acquire aborts if the flag is already set, then sets it; release clears
/// it and is emitted on every exit path.
pub fn nonreentrant_lock(ctx: &mut Context) -> (IrNode, IrNode) {
    match ctx.sig.nonreentrant_key.clone() {
        None => (IrNode::pass(), IrNode::pass()),
        Some(key) => {
            let slot = ctx.globals.reentrancy_slot(&key);
            let pre = IrNode::seq(vec![
                assert_nonzero(iszero(sload(slot))),
                sstore(slot, 1u64),
            ])
            .annotated(format!("nonreentrant lock ({key})"));
            let post = sstore(slot, 0u64).annotated(format!("nonreentrant unlock ({key})"));
            (pre, post)
        }
    }
}

/// Emits the epilogue handing `(begin_pos, size)` back to the caller under
/// the function's calling convention.
pub fn make_return_stmt(
    ctx: &mut Context,
    span: Span,
    begin_pos: IrNode,
    size: IrNode,
    loop_memory_position: Option<usize>,
) -> Result<IrNode> {
    let (_, unlock) = nonreentrant_lock(ctx);

    if !ctx.sig.is_private {
        return Ok(IrNode::op(Op::SeqUnchecked, vec![unlock, ret(begin_pos, size)]).spanned(span));
    }

    let callback = ctx
        .callback_ptr
        .ok_or_else(|| Error::internal("private function without a callback slot", span))?;
    let loop_mem =
        loop_memory_position.unwrap_or_else(|| ctx.new_placeholder(&Ty::uint256()));

    // Static extent: unroll the loads, highest word first so the caller
    // pops them in order.
    if let (Some(begin), Some(len)) = (begin_pos.literal_offset(), size.literal_offset()) {
        let mut stmts = vec![unlock];
        let mut positions: Vec<usize> = (begin..begin + len).step_by(WORD_SIZE).collect();
        positions.reverse();
        for pos in positions {
            stmts.push(mload(pos));
        }
        stmts.push(jump(mload(callback)));
        return Ok(IrNode::op(Op::SeqUnchecked, stmts)
            .annotated("private return (unrolled)")
            .spanned(span));
    }

    // Dynamic extent: count down a scratch word, pushing from the end.
    let start_label = ctx.fresh_label("return_pop_start");
    let exit_label = ctx.fresh_label("return_pop_exit");
    let stmts = vec![
        unlock,
        mstore(loop_mem, size),
        label(&start_label),
        if_then(le(mload(loop_mem), 0u64), goto(&exit_label)),
        mload(add(begin_pos, sub(mload(loop_mem), 32u64))),
        mstore(loop_mem, sub(mload(loop_mem), 32u64)),
        goto(&start_label),
        label(&exit_label),
        jump(mload(callback)),
    ];
    Ok(IrNode::op(Op::SeqUnchecked, stmts)
        .annotated("private return (loop)")
        .spanned(span))
}

/// Encodes `value` as the function's ABI return payload and emits the
/// epilogue.
pub fn gen_tuple_return(ctx: &mut Context, span: Span, value: IrNode) -> Result<IrNode> {
    // A public-call result is already ABI-encoded at a known extent;
    // re-emit it directly.
    let from_external_call = value
        .args
        .first()
        .and_then(|node| node.args.first())
        .is_some_and(|node| matches!(node.kind, NodeKind::Op(Op::Call | Op::StaticCall)));
    if from_external_call {
        let ty = value
            .ty
            .clone()
            .ok_or_else(|| Error::internal("untyped call result", span))?;
        let size = ty.size_of() * WORD_SIZE;
        return Ok(ret(value, size).typed(ty).spanned(span));
    }

    // A private-call result is already laid out in the private convention;
    // pad the last byte-sequence payload and re-emit.
    if value.annotation.as_deref().is_some_and(|a| a.contains("private call")) {
        let ty = value
            .ty
            .clone()
            .ok_or_else(|| Error::internal("untyped private call result", span))?;
        let items = ty.aggregate_items().ok_or_else(|| {
            Error::type_mismatch(format!("trying to return {ty} when expecting a tuple"), span)
        })?;
        let mem_pos = if matches!(value.kind, NodeKind::Op(Op::SeqUnchecked)) {
            value.args.last().cloned()
        } else {
            value.args.first().and_then(|node| node.args.last().cloned())
        }
        .ok_or_else(|| Error::internal("private call result with no payload position", span))?;
        let mem_size = ty.size_of() * WORD_SIZE;

        let last_byte_member = items
            .iter()
            .enumerate()
            .filter(|(_, (_, member))| member.byte_seq().is_some())
            .next_back();
        let zero_padder = match last_byte_member {
            Some((i, _)) => zero_pad(add(
                mem_pos.clone(),
                mload(add(mem_pos.clone(), i * WORD_SIZE)),
            )),
            None => IrNode::pass(),
        };
        let epilogue = make_return_stmt(ctx, span, mem_pos, mem_size.into(), None)?;
        return Ok(IrNode::seq(vec![value, zero_padder, epilogue]).typed(ty).spanned(span));
    }

    // General case: lay out head words and dynamic tails in fresh scratch.
    let return_ty = ctx.sig.return_ty.clone().ok_or_else(|| {
        Error::type_mismatch("function does not declare a return type", span)
    })?;
    let items = return_ty.aggregate_items().ok_or_else(|| {
        Error::type_mismatch(
            format!(
                "trying to return {} when expecting {return_ty}",
                value.ty.as_ref().map_or("<untyped>".to_owned(), ToString::to_string)
            ),
            span,
        )
    })?;
    debug!(return_ty = %return_ty, private = ctx.sig.is_private, "encoding tuple return");

    // Placeholder order matters for layout stability: the pop-loop counter
    // first, then the dynamic-offset counter, then the encode buffer.
    let loop_mem = if ctx.sig.is_private {
        Some(ctx.new_placeholder(&Ty::uint256()))
    } else {
        None
    };
    let counter_slot = ctx.new_placeholder(&Ty::uint256());
    let counter = IrNode::from(counter_slot).annotated("dynamic offset counter");
    let buffer_slot = ctx.new_placeholder(&return_ty);
    let buffer = IrNode::from(buffer_slot)
        .typed(return_ty.clone())
        .located(Location::Memory)
        .annotated("return buffer");
    let left_token = IrNode::var("_loc").typed(return_ty.clone()).located(Location::Memory);
    let dynamic_start = WORD_SIZE * items.len();

    let mut subs = Vec::new();
    for (i, (key, member_ty)) in items.iter().enumerate() {
        let head = add(WORD_SIZE * i, left_token.clone())
            .typed((*member_ty).clone())
            .annotated("head word");
        let arg = if value.is_multi() {
            value.args.get(i).cloned().ok_or_else(|| {
                Error::type_mismatch("mismatched number of elements in return value", span)
            })?
        } else {
            resolve(&value, SubKey::from(*key), span, true)?
        };
        match member_ty {
            Ty::ByteArray { .. } => {
                subs.push(mstore(head, mload(counter.clone())));
                let dynamic_spot = add(left_token.clone(), mload(counter.clone()))
                    .typed((*member_ty).clone())
                    .located(Location::Memory)
                    .annotated("dynamic spot");
                subs.push(make_setter(dynamic_spot.clone(), arg, Location::Memory, span, false)?);
                // ABI: the payload's last word is right-padded with zeros.
                subs.push(zero_pad(dynamic_spot.clone()));
                subs.push(mstore(
                    counter.clone(),
                    add(add(ceil32(mload(dynamic_spot)), 32u64), mload(counter.clone())),
                ));
            }
            Ty::Base(_) => {
                subs.push(make_setter(head, arg, Location::Memory, span, false)?);
            }
            Ty::Struct { .. } | Ty::Tuple(_) => {
                // Nested aggregates encode flat; nested dynamic data has no
                // head/tail slot here.
                if member_ty.has_dynamic_data() {
                    return Err(Error::type_mismatch(
                        "cannot encode variable-length data inside a nested aggregate return",
                        span,
                    ));
                }
                subs.push(make_setter(
                    head.located(Location::Memory),
                    arg,
                    Location::Memory,
                    span,
                    false,
                )?);
            }
            ty => {
                return Err(Error::type_mismatch(
                    format!("cannot return a value of type {ty} as part of a tuple"),
                    span,
                ));
            }
        }
    }

    let encode = IrNode::seq(vec![
        mstore(counter.clone(), dynamic_start),
        IrNode::with_var("_loc", buffer, IrNode::seq(subs)),
    ]);
    let epilogue =
        make_return_stmt(ctx, span, IrNode::from(buffer_slot), mload(counter), loop_mem)?;
    Ok(IrNode::seq(vec![encode, epilogue]).spanned(span))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, Signature, context::reserved::RESERVED_MEMORY};

    const SPAN: Span = Span::DUMMY;

    fn public_ctx(return_ty: Option<Ty>) -> Context {
        Context::new(Signature::new("f", vec![], return_ty))
    }

    fn private_ctx(return_ty: Option<Ty>) -> Context {
        Context::new(Signature::new("f", vec![], return_ty).private())
    }

    #[test]
    fn public_epilogue_uses_the_native_channel() {
        let mut ctx = public_ctx(None);
        let out =
            make_return_stmt(&mut ctx, SPAN, IrNode::from(0x200u64), IrNode::from(64u64), None)
                .unwrap();
        assert_eq!(out.to_string(), "(seq_unchecked pass (return 512 64))");
    }

    #[test]
    fn private_epilogue_unrolls_static_extents_in_reverse() {
        let mut ctx = private_ctx(None);
        let out =
            make_return_stmt(&mut ctx, SPAN, IrNode::from(0x200u64), IrNode::from(64u64), None)
                .unwrap();
        let printed = out.to_flat_string();
        // Two pushes: the higher word first, then the jump through the
        // callback slot.
        let high = printed.find("(mload 544)").unwrap();
        let low = printed.find("(mload 512)").unwrap();
        assert!(high < low, "{printed}");
        assert!(
            printed.contains(&format!("(jump (mload {}))", ctx.callback_ptr.unwrap())),
            "{printed}"
        );
    }

    #[test]
    fn private_epilogue_loops_over_dynamic_extents() {
        let mut ctx = private_ctx(None);
        let size = mload(0x180u64);
        let out = make_return_stmt(&mut ctx, SPAN, IrNode::from(0x200u64), size, None).unwrap();
        let printed = out.to_flat_string();
        assert!(printed.contains("(label return_pop_start_"), "{printed}");
        assert!(printed.contains("(goto return_pop_exit_"), "{printed}");
        assert!(printed.contains("(mload (add 512 (sub (mload"), "{printed}");
        assert!(printed.contains("jump"), "{printed}");
    }

    #[test]
    fn guard_release_precedes_the_pushes() {
        let mut ctx =
            Context::new(Signature::new("f", vec![], None).private().nonreentrant("lock"));
        let out =
            make_return_stmt(&mut ctx, SPAN, IrNode::from(0x200u64), IrNode::from(32u64), None)
                .unwrap();
        let printed = out.to_flat_string();
        let unlock = printed.find("(sstore 0 0)").unwrap();
        let push = printed.find("(mload 512)").unwrap();
        assert!(unlock < push, "{printed}");
    }

    #[test]
    fn external_call_results_reemit_directly() {
        let ty = Ty::Tuple(vec![Ty::int128(), Ty::int128()]);
        let call = IrNode::op(
            Op::Call,
            vec![
                IrNode::from(100u64),
                IrNode::from(2u64),
                IrNode::from(0u64),
                IrNode::from(0x200u64),
                IrNode::from(64u64),
                IrNode::from(0x300u64),
                IrNode::from(64u64),
            ],
        );
        let value = IrNode::seq(vec![
            IrNode::seq(vec![call, IrNode::from(0x300u64)]),
        ])
        .typed(ty);
        let mut ctx = public_ctx(None);
        let out = gen_tuple_return(&mut ctx, SPAN, value).unwrap();
        let printed = out.to_flat_string();
        assert!(printed.starts_with("(return "), "{printed}");
        assert!(printed.contains("64)"), "{printed}");
    }

    #[test]
    fn private_call_results_get_a_tail_pad() {
        let ty = Ty::Tuple(vec![Ty::int128(), Ty::bytes(32)]);
        let value = IrNode::op(
            Op::SeqUnchecked,
            vec![IrNode::pass(), IrNode::from(0x400u64)],
        )
        .typed(ty)
        .annotated("private call: g");
        let mut ctx = public_ctx(None);
        let out = gen_tuple_return(&mut ctx, SPAN, value).unwrap();
        let printed = out.to_flat_string();
        // Pad the byte-sequence member at head index 1.
        assert!(printed.contains("(add 1024 (mload (add 1024 32)))"), "{printed}");
        assert!(printed.contains("zero pad"), "{printed}");
        assert!(printed.contains("(return 1024 128)"), "{printed}");
    }

    #[test]
    fn general_case_encodes_head_then_tail() {
        let return_ty = Ty::Tuple(vec![Ty::int128(), Ty::bytes(32)]);
        let mut ctx = public_ctx(Some(return_ty.clone()));
        let value = IrNode::from(0x600u64).typed(return_ty).located(Location::Memory);
        let out = gen_tuple_return(&mut ctx, SPAN, value).unwrap();
        let printed = out.to_flat_string();
        // Counter seeded with the head size.
        let counter = RESERVED_MEMORY;
        assert!(printed.contains(&format!("(mstore {counter} /* dynamic offset counter */ 64)")), "{printed}");
        // Head word for the scalar, offset pointer for the byte sequence.
        assert!(printed.contains("(mstore (add 0 _loc)"), "{printed}");
        assert!(printed.contains("(mstore (add 32 _loc)"), "{printed}");
        assert!(printed.contains("zero pad"), "{printed}");
        assert!(printed.contains("(return"), "{printed}");
    }

    #[test]
    fn scalar_return_types_are_not_tuples() {
        let mut ctx = public_ctx(Some(Ty::int128()));
        let value = IrNode::from(0x600u64).typed(Ty::int128()).located(Location::Memory);
        let err = gen_tuple_return(&mut ctx, SPAN, value).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::TypeMismatch(_)), "{err}");
    }

    #[test]
    fn nested_dynamic_members_are_rejected() {
        let return_ty = Ty::Tuple(vec![Ty::Tuple(vec![Ty::bytes(8)])]);
        let mut ctx = public_ctx(Some(return_ty.clone()));
        let value = IrNode::from(0x600u64).typed(return_ty).located(Location::Memory);
        let err = gen_tuple_return(&mut ctx, SPAN, value).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::TypeMismatch(_)), "{err}");
    }
}
