//! Per-function compilation context.
//!
//! The explicit capability object threaded through every component that
//! needs scratch memory: the bump allocator over the volatile region, the
//! current function's signature, and the compilation-wide reentrancy-guard
//! slot table.

use adder_ir::{Ty, WORD_SIZE};
use alloy_primitives::keccak256;
use rustc_hash::FxHashMap;

/// The reserved low-memory layout.
///
/// These words sit below every placeholder and are owned by the assembler's
/// expansions of the clamp pseudo-ops and the copy loops.
pub mod reserved {
    /// Word holding the address-size bound used by address clamps.
    pub const ADDR_SIZE: usize = 32;
    /// Word holding the largest `int128` value.
    pub const MAX_INT128: usize = 64;
    /// Word holding the smallest `int128` value.
    pub const MIN_INT128: usize = 96;
    /// Word holding the largest scaled `decimal` value.
    pub const MAX_DECIMAL: usize = 128;
    /// Word holding the smallest scaled `decimal` value.
    pub const MIN_DECIMAL: usize = 160;
    /// Scratch word for single-word hashing.
    pub const FREE_VAR_SPACE: usize = 192;
    /// Second scratch word for two-word hashing.
    pub const FREE_VAR_SPACE2: usize = 224;
    /// Always-zero spill word.
    pub const BLANK_SPACE: usize = 256;
    /// The iteration counter shared by all bounded copy loops.
    pub const FREE_LOOP_INDEX: usize = 288;
    /// First byte available to the placeholder allocator.
    pub const RESERVED_MEMORY: usize = 320;
}

/// One declared parameter.
#[derive(Clone, Debug)]
pub struct Param {
    /// The parameter name.
    pub name: String,
    /// The resolved parameter type.
    pub ty: Ty,
}

impl Param {
    /// Creates a parameter.
    #[must_use]
    pub fn new(name: &str, ty: Ty) -> Self {
        Self { name: name.to_owned(), ty }
    }
}

/// The current function's signature, as resolved by the front end.
#[derive(Clone, Debug)]
pub struct Signature {
    /// The function name.
    pub name: String,
    /// Declared parameters, in order.
    pub params: Vec<Param>,
    /// The declared return type, if any.
    pub return_ty: Option<Ty>,
    /// True for internally-callable functions that execute in the caller's
    /// frame and return through the callback pointer.
    pub is_private: bool,
    /// The reentrancy-guard key, when the function is guarded.
    pub nonreentrant_key: Option<String>,
    /// The 4-byte method identifier, as a word-sized integer.
    pub method_id: u32,
}

impl Signature {
    /// Creates a public signature; the method identifier is derived from the
    /// canonical form of the name and parameter types.
    #[must_use]
    pub fn new(name: &str, params: Vec<Param>, return_ty: Option<Ty>) -> Self {
        let tys: Vec<Ty> = params.iter().map(|p| p.ty.clone()).collect();
        let method_id = u32::from_be_bytes(compute_selector(name, &tys));
        Self {
            name: name.to_owned(),
            params,
            return_ty,
            is_private: false,
            nonreentrant_key: None,
            method_id,
        }
    }

    /// Marks the function as internally callable.
    #[must_use]
    pub fn private(mut self) -> Self {
        self.is_private = true;
        self
    }

    /// Attaches a reentrancy-guard key.
    #[must_use]
    pub fn nonreentrant(mut self, key: &str) -> Self {
        self.nonreentrant_key = Some(key.to_owned());
        self
    }
}

/// Computes the 4-byte method identifier from the canonical signature.
#[must_use]
pub fn compute_selector(name: &str, params: &[Ty]) -> [u8; 4] {
    let args: Vec<String> = params.iter().map(Ty::canonical_name).collect();
    let sig = format!("{name}({})", args.join(","));
    let hash = keccak256(sig.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Compilation-wide state shared by every function of one contract.
#[derive(Clone, Debug, Default)]
pub struct GlobalContext {
    reentrancy_slots: FxHashMap<String, usize>,
    next_guard_slot: usize,
}

impl GlobalContext {
    /// Creates the shared state; guard slots are allocated upward from
    /// `first_free_slot`, just past the contract's own storage layout.
    #[must_use]
    pub fn new(first_free_slot: usize) -> Self {
        Self { reentrancy_slots: FxHashMap::default(), next_guard_slot: first_free_slot }
    }

    /// The storage slot backing the named reentrancy guard. The same key
    /// always maps to the same slot, so every function guarded by it shares
    /// one flag.
    pub fn reentrancy_slot(&mut self, key: &str) -> usize {
        if let Some(slot) = self.reentrancy_slots.get(key) {
            return *slot;
        }
        let slot = self.next_guard_slot;
        self.next_guard_slot += 1;
        self.reentrancy_slots.insert(key.to_owned(), slot);
        slot
    }
}

/// The per-function compilation context.
#[derive(Clone, Debug)]
pub struct Context {
    /// The function being compiled.
    pub sig: Signature,
    /// Shared contract-wide state.
    pub globals: GlobalContext,
    /// Memory word holding the caller-supplied return address, for private
    /// functions only.
    pub callback_ptr: Option<usize>,
    next_mem: usize,
    label_counter: u32,
}

impl Context {
    /// Creates a context with fresh shared state.
    #[must_use]
    pub fn new(sig: Signature) -> Self {
        Self::with_globals(sig, GlobalContext::default())
    }

    /// Creates a context sharing previously accumulated contract-wide state.
    #[must_use]
    pub fn with_globals(sig: Signature, globals: GlobalContext) -> Self {
        let mut ctx = Self {
            sig,
            globals,
            callback_ptr: None,
            next_mem: reserved::RESERVED_MEMORY,
            label_counter: 0,
        };
        if ctx.sig.is_private {
            ctx.callback_ptr = Some(ctx.new_placeholder(&Ty::uint256()));
        }
        ctx
    }

    /// Hands the shared state back, for compiling the next function.
    #[must_use]
    pub fn into_globals(self) -> GlobalContext {
        self.globals
    }

    /// Reserves `32 * size_of(ty)` bytes of scratch memory and returns the
    /// fixed offset. Never reclaimed within this function's compilation.
    pub fn new_placeholder(&mut self, ty: &Ty) -> usize {
        let pos = self.next_mem;
        self.next_mem += WORD_SIZE * ty.size_of();
        pos
    }

    /// The first unallocated scratch byte.
    #[must_use]
    pub const fn memory_watermark(&self) -> usize {
        self.next_mem
    }

    /// A function-unique label name built from the method identifier.
    pub fn fresh_label(&mut self, stem: &str) -> String {
        let id = self.label_counter;
        self.label_counter += 1;
        format!("{stem}_{}_{id}", self.sig.method_id)
    }
}
