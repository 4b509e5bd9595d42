//! Call-argument packing.
//!
//! Builds an ABI-encoded call payload in one scratch placeholder: a leading
//! selector word, head words at fixed offsets, and byte-sequence payloads
//! appended at a running tail offset.

use crate::{
    Context, Error, Result, Signature,
    copy::{get_length, make_byte_array_copier},
    setter::make_setter,
};
use adder_ir::{
    IrNode, Location, Span, Ty, WORD_SIZE,
    build::{add, ceil32, mstore, set},
};
use tracing::debug;

/// Packs `args` for a call to `sig`.
///
/// Returns the encoded buffer (valued at the selector position when
/// `return_placeholder` is set), the payload's maximum byte length, and the
/// offset just past the selector word for callers that want the raw
/// arguments.
pub fn pack_arguments(
    sig: &Signature,
    args: &[IrNode],
    ctx: &mut Context,
    span: Span,
    return_placeholder: bool,
) -> Result<(IrNode, usize, usize)> {
    debug!(callee = %sig.name, args = args.len(), "packing call arguments");
    let head_words: usize = sig.params.iter().map(|param| param.ty.size_of()).sum();
    let placeholder_ty = Ty::bytes(head_words * WORD_SIZE + WORD_SIZE);
    let placeholder = ctx.new_placeholder(&placeholder_ty);

    if args.len() != sig.params.len() {
        return Err(Error::structure(
            format!(
                "wrong number of arguments for {}: {} given, expected {}",
                sig.name,
                args.len(),
                sig.params.len()
            ),
            span,
        ));
    }

    let mut setters = vec![mstore(placeholder, u64::from(sig.method_id))];
    let mut needs_tail = false;
    let mut static_offset = 0usize;

    for (i, (arg, param)) in args.iter().zip(&sig.params).enumerate() {
        let head = placeholder + static_offset + WORD_SIZE + i * WORD_SIZE;
        match &param.ty {
            Ty::Base(_) => {
                let dst = IrNode::from(head).typed(param.ty.clone());
                setters.push(make_setter(dst, arg.clone(), Location::Memory, span, true)?);
            }
            Ty::ByteArray { .. } => {
                // Head word points at the running tail offset; the payload
                // follows at that offset and advances it, word-aligned.
                setters.push(mstore(head, IrNode::var("_poz")));
                let arg_ty = arg
                    .ty
                    .clone()
                    .ok_or_else(|| Error::internal("untyped byte-sequence argument", span))?;
                let arg_loc = arg.location.ok_or_else(|| {
                    Error::internal("unlocated byte-sequence argument", span)
                })?;
                let arg_copy = IrNode::var("_s").typed(arg_ty).located(arg_loc);
                let target = add(placeholder + WORD_SIZE, IrNode::var("_poz"))
                    .typed(param.ty.clone())
                    .located(Location::Memory);
                let copier = make_byte_array_copier(target, arg_copy.clone(), span)?;
                let advance = set(
                    "_poz",
                    add(32usize, ceil32(add(IrNode::var("_poz"), get_length(arg_copy, span)?))),
                );
                setters.push(IrNode::with_var(
                    "_s",
                    arg.clone(),
                    IrNode::seq(vec![copier, advance]),
                ));
                needs_tail = true;
            }
            Ty::Struct { members, .. } => {
                if param.ty.has_dynamic_data() {
                    return Err(Error::type_mismatch(
                        "cannot pack variable-length data inside an aggregate argument",
                        span,
                    ));
                }
                let dst = IrNode::from(head).typed(param.ty.clone()).located(Location::Memory);
                setters.push(make_setter(dst, arg.clone(), Location::Memory, span, false)?);
                static_offset += WORD_SIZE * (members.len() - 1);
            }
            Ty::List { count, .. } => {
                if param.ty.has_dynamic_data() {
                    return Err(Error::type_mismatch(
                        "cannot pack variable-length data inside an aggregate argument",
                        span,
                    ));
                }
                let dst = IrNode::from(head).typed(param.ty.clone()).located(Location::Memory);
                setters.push(make_setter(dst, arg.clone(), Location::Memory, span, false)?);
                static_offset += WORD_SIZE * (count - 1);
            }
            ty => {
                return Err(Error::type_mismatch(
                    format!("cannot pack an argument of type {ty}"),
                    span,
                ));
            }
        }
    }

    if return_placeholder {
        setters.push(IrNode::from(placeholder + 28));
    }
    let body = if needs_tail {
        // The tail starts just past every head word.
        IrNode::with_var(
            "_poz",
            (args.len() * WORD_SIZE + static_offset).into(),
            IrNode::seq(setters),
        )
    } else {
        IrNode::seq(setters)
    };
    let Ty::ByteArray { max_len, .. } = placeholder_ty else {
        return Err(Error::internal("argument buffer lost its type", span));
    };
    let encoded = body
        .typed(Ty::bytes(max_len))
        .located(Location::Memory)
        .spanned(span);
    Ok((encoded, max_len - 28, placeholder + WORD_SIZE))
}
