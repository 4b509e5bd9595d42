//! A word-machine evaluator for emitted IR trees.
//!
//! Executes the data-movement subset of the operation vocabulary against
//! simulated memory, storage, and calldata, with the same semantics the VM
//! guarantees: reads past the end of calldata yield zero bytes, the
//! identity precompile copies its input, and failed clamps abort.
//!
//! Label/goto pairs are resolved within the enclosing `seq_unchecked`; an
//! indirect jump surfaces as [`Halt::Jumped`] so epilogue tests can inspect
//! the operand stack.
#![allow(dead_code)]

use adder_codegen::ir::{IrNode, NodeKind, Op};
use alloy_primitives::{I256, U256, keccak256};
use rustc_hash::FxHashMap;

/// Why evaluation stopped early.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Halt {
    /// A clamp or assertion failed.
    Revert,
    /// `break` reached outside its loop body.
    Break,
    /// `goto` propagating up to the sequence holding its label.
    Goto(String),
    /// The native return channel fired; the payload is in
    /// [`Vm::returned`].
    Returned,
    /// An indirect jump to the given code offset.
    Jumped(U256),
}

/// Evaluation result: a value for expressions, nothing for statements.
pub type Outcome = Result<Option<U256>, Halt>;

/// The simulated machine.
#[derive(Default)]
pub struct Vm {
    /// Byte-addressed volatile memory.
    pub memory: Vec<u8>,
    /// Word-addressed persistent storage.
    pub storage: FxHashMap<U256, U256>,
    /// The read-only call input region.
    pub calldata: Vec<u8>,
    /// Residue left by `seq_unchecked` pushes.
    pub stack: Vec<U256>,
    /// `(offset, size)` captured from the native return channel.
    pub returned: Option<(usize, usize)>,
    bindings: Vec<(String, U256)>,
}

/// Hash of one 32-byte word, as the slot-derivation op computes it.
pub fn hash_word(word: U256) -> U256 {
    U256::from_be_bytes(keccak256(word.to_be_bytes::<32>()).0)
}

/// Hash of two words.
pub fn hash_two(a: U256, b: U256) -> U256 {
    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(&a.to_be_bytes::<32>());
    bytes[32..].copy_from_slice(&b.to_be_bytes::<32>());
    U256::from_be_bytes(keccak256(bytes).0)
}

fn to_addr(value: U256) -> usize {
    usize::try_from(u64::try_from(value).expect("address out of range")).unwrap()
}

fn bool_word(b: bool) -> U256 {
    U256::from(u8::from(b))
}

impl Vm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates a tree, returning its value if it has one.
    pub fn run(&mut self, node: &IrNode) -> Outcome {
        self.eval(node)
    }

    /// Evaluates a tree and expects it to complete without halting.
    pub fn run_ok(&mut self, node: &IrNode) {
        match self.run(node) {
            Ok(_) => {}
            Err(halt) => panic!("unexpected halt: {halt:?} while running\n{node}"),
        }
    }

    fn ensure(&mut self, len: usize) {
        if self.memory.len() < len {
            self.memory.resize(len.next_multiple_of(32), 0);
        }
    }

    /// Reads the memory word at `addr`.
    pub fn mem_word(&mut self, addr: usize) -> U256 {
        self.ensure(addr + 32);
        U256::from_be_slice(&self.memory[addr..addr + 32])
    }

    /// Writes the memory word at `addr`.
    pub fn set_mem_word(&mut self, addr: usize, value: U256) {
        self.ensure(addr + 32);
        self.memory[addr..addr + 32].copy_from_slice(&value.to_be_bytes::<32>());
    }

    /// Reads a memory byte range.
    pub fn mem_slice(&mut self, addr: usize, len: usize) -> Vec<u8> {
        self.ensure(addr + len);
        self.memory[addr..addr + len].to_vec()
    }

    /// Writes raw bytes into memory.
    pub fn set_mem_slice(&mut self, addr: usize, bytes: &[u8]) {
        self.ensure(addr + bytes.len());
        self.memory[addr..addr + bytes.len()].copy_from_slice(bytes);
    }

    /// Fills a memory range with a marker byte, for padding assertions.
    pub fn poison(&mut self, addr: usize, len: usize, marker: u8) {
        self.ensure(addr + len);
        self.memory[addr..addr + len].fill(marker);
    }

    /// Writes a length-prefixed byte sequence into memory at `addr`.
    pub fn set_mem_bytes(&mut self, addr: usize, payload: &[u8]) {
        self.set_mem_word(addr, U256::from(payload.len()));
        self.set_mem_slice(addr + 32, payload);
    }

    /// Reads a length-prefixed byte sequence from memory at `addr`.
    pub fn mem_bytes(&mut self, addr: usize) -> Vec<u8> {
        let len = to_addr(self.mem_word(addr));
        self.mem_slice(addr + 32, len)
    }

    /// Reads the storage word at `slot`.
    pub fn storage_word(&self, slot: U256) -> U256 {
        self.storage.get(&slot).copied().unwrap_or_default()
    }

    /// Writes the storage word at `slot`.
    pub fn set_storage_word(&mut self, slot: U256, value: U256) {
        self.storage.insert(slot, value);
    }

    /// Writes a length-prefixed byte sequence under the hashed base of
    /// `slot`, the storage layout the copy loops expect.
    pub fn set_storage_bytes(&mut self, slot: U256, payload: &[u8]) {
        let base = hash_word(slot);
        self.set_storage_word(base, U256::from(payload.len()));
        for (i, chunk) in payload.chunks(32).enumerate() {
            let mut word = [0u8; 32];
            word[..chunk.len()].copy_from_slice(chunk);
            self.set_storage_word(base + U256::from(i + 1), U256::from_be_bytes(word));
        }
    }

    /// Reads a length-prefixed byte sequence stored under the hashed base
    /// of `slot`.
    pub fn storage_bytes(&self, slot: U256) -> Vec<u8> {
        let base = hash_word(slot);
        let len = to_addr(self.storage_word(base));
        let mut out = Vec::with_capacity(len);
        for i in 0..len.div_ceil(32) {
            let word = self.storage_word(base + U256::from(i + 1)).to_be_bytes::<32>();
            out.extend_from_slice(&word);
        }
        out.truncate(len);
        out
    }

    fn lookup(&self, name: &str) -> U256 {
        self.bindings
            .iter()
            .rev()
            .find(|(bound, _)| bound == name)
            .map(|(_, value)| *value)
            .unwrap_or_else(|| panic!("unbound name {name}"))
    }

    fn rebind(&mut self, name: &str, value: U256) {
        let slot = self
            .bindings
            .iter_mut()
            .rev()
            .find(|(bound, _)| bound == name)
            .unwrap_or_else(|| panic!("unbound name {name}"));
        slot.1 = value;
    }

    fn value(&mut self, node: &IrNode) -> Result<U256, Halt> {
        Ok(self.eval(node)?.unwrap_or_else(|| panic!("no value from {node}")))
    }

    fn var_name(node: &IrNode) -> &str {
        match &node.kind {
            NodeKind::Var(name) => name,
            other => panic!("expected a name, got {other:?}"),
        }
    }

    fn eval(&mut self, node: &IrNode) -> Outcome {
        match &node.kind {
            NodeKind::Literal(value) => Ok(Some(value.into_raw())),
            NodeKind::Var(name) => Ok(Some(self.lookup(name))),
            NodeKind::Null => panic!("null node reached the evaluator: {node}"),
            NodeKind::Op(op) => self.eval_op(node, *op),
        }
    }

    fn eval_op(&mut self, node: &IrNode, op: Op) -> Outcome {
        let args = &node.args;
        match op {
            Op::Pass => Ok(None),
            Op::Seq => {
                let mut last = None;
                for arg in args {
                    last = self.eval(arg)?;
                }
                Ok(last)
            }
            Op::SeqUnchecked => {
                let labels: FxHashMap<&str, usize> = args
                    .iter()
                    .enumerate()
                    .filter(|(_, arg)| matches!(arg.kind, NodeKind::Op(Op::Label)))
                    .map(|(i, arg)| (Self::var_name(&arg.args[0]), i))
                    .collect();
                let mut i = 0;
                let mut steps = 0usize;
                while i < args.len() {
                    steps += 1;
                    assert!(steps < 100_000, "runaway label loop in {node}");
                    match self.eval(&args[i]) {
                        Ok(Some(value)) => self.stack.push(value),
                        Ok(None) => {}
                        Err(Halt::Goto(target)) if labels.contains_key(target.as_str()) => {
                            i = labels[target.as_str()] + 1;
                            continue;
                        }
                        Err(halt) => return Err(halt),
                    }
                    i += 1;
                }
                Ok(None)
            }
            Op::With => {
                let name = Self::var_name(&args[0]).to_owned();
                let value = self.value(&args[1])?;
                self.bindings.push((name, value));
                let result = self.eval(&args[2]);
                self.bindings.pop();
                result
            }
            Op::Set => {
                let value = self.value(&args[1])?;
                self.rebind(Self::var_name(&args[0]), value);
                Ok(None)
            }
            Op::If => {
                if !self.value(&args[0])?.is_zero() {
                    self.eval(&args[1])
                } else if args.len() == 3 {
                    self.eval(&args[2])
                } else {
                    Ok(None)
                }
            }
            Op::Repeat => {
                let slot = args[0].literal_offset().expect("static loop slot");
                let start = self.value(&args[1])?;
                let rounds = args[2].literal_offset().expect("static round count");
                self.set_mem_word(slot, start);
                for _ in 0..rounds {
                    match self.eval(&args[3]) {
                        Err(Halt::Break) => break,
                        Err(halt) => return Err(halt),
                        Ok(_) => {}
                    }
                    let next = self.mem_word(slot) + U256::from(1u8);
                    self.set_mem_word(slot, next);
                }
                Ok(None)
            }
            Op::Break => Err(Halt::Break),
            Op::Goto => Err(Halt::Goto(Self::var_name(&args[0]).to_owned())),
            Op::Label => Ok(None),
            Op::Jump => {
                let target = self.value(&args[0])?;
                Err(Halt::Jumped(target))
            }
            Op::Return => {
                let offset = to_addr(self.value(&args[0])?);
                let size = to_addr(self.value(&args[1])?);
                self.returned = Some((offset, size));
                Err(Halt::Returned)
            }
            Op::Assert => {
                if self.value(&args[0])?.is_zero() {
                    Err(Halt::Revert)
                } else {
                    Ok(None)
                }
            }
            Op::Pop => {
                self.value(&args[0])?;
                Ok(None)
            }
            Op::Multi => panic!("aggregate literals are consumed before emission: {node}"),

            Op::Add => self.binary(args, |a, b| a.wrapping_add(b)),
            Op::Sub => self.binary(args, |a, b| a.wrapping_sub(b)),
            Op::Mul => self.binary(args, |a, b| a.wrapping_mul(b)),
            Op::Div => self.binary(args, |a, b| a.checked_div(b).unwrap_or_default()),
            Op::Mod => self.binary(args, |a, b| a.checked_rem(b).unwrap_or_default()),
            Op::Exp => self.binary(args, U256::wrapping_pow),
            Op::Sdiv => self.binary_signed(args, |a, b| {
                a.checked_div(b).unwrap_or(I256::ZERO)
            }),
            Op::Smod => self.binary_signed(args, |a, b| {
                a.checked_rem(b).unwrap_or(I256::ZERO)
            }),
            Op::And => self.binary(args, |a, b| a & b),
            Op::Or => self.binary(args, |a, b| a | b),
            Op::Xor => self.binary(args, |a, b| a ^ b),
            Op::Not => {
                let a = self.value(&args[0])?;
                Ok(Some(!a))
            }
            Op::Lt => self.compare(args, |a, b| a < b),
            Op::Gt => self.compare(args, |a, b| a > b),
            Op::Le => self.compare(args, |a, b| a <= b),
            Op::Ge => self.compare(args, |a, b| a >= b),
            Op::Eq => self.compare(args, |a, b| a == b),
            Op::Ne => self.compare(args, |a, b| a != b),
            Op::Slt => {
                let (a, b) = self.signed_pair(args)?;
                Ok(Some(bool_word(a < b)))
            }
            Op::Sgt => {
                let (a, b) = self.signed_pair(args)?;
                Ok(Some(bool_word(a > b)))
            }
            Op::IsZero => {
                let a = self.value(&args[0])?;
                Ok(Some(bool_word(a.is_zero())))
            }
            Op::UClampLt => {
                let value = self.value(&args[0])?;
                let bound = self.value(&args[1])?;
                if value < bound { Ok(Some(value)) } else { Err(Halt::Revert) }
            }
            Op::UClampLe => {
                let value = self.value(&args[0])?;
                let bound = self.value(&args[1])?;
                if value <= bound { Ok(Some(value)) } else { Err(Halt::Revert) }
            }
            Op::Clamp => {
                let lo = I256::from_raw(self.value(&args[0])?);
                let value = self.value(&args[1])?;
                let hi = I256::from_raw(self.value(&args[2])?);
                let signed = I256::from_raw(value);
                if lo <= signed && signed <= hi { Ok(Some(value)) } else { Err(Halt::Revert) }
            }
            Op::ClampNonZero => {
                let value = self.value(&args[0])?;
                if value.is_zero() { Err(Halt::Revert) } else { Ok(Some(value)) }
            }
            Op::Ceil32 => {
                let value = self.value(&args[0])?;
                let word = U256::from(32u8);
                Ok(Some(value.div_ceil(word).wrapping_mul(word)))
            }

            Op::MLoad => {
                let addr = to_addr(self.value(&args[0])?);
                Ok(Some(self.mem_word(addr)))
            }
            Op::MStore => {
                let addr = to_addr(self.value(&args[0])?);
                let value = self.value(&args[1])?;
                self.set_mem_word(addr, value);
                Ok(None)
            }
            Op::MStore8 => {
                let addr = to_addr(self.value(&args[0])?);
                let value = self.value(&args[1])?;
                self.ensure(addr + 1);
                self.memory[addr] = value.to_be_bytes::<32>()[31];
                Ok(None)
            }
            Op::SLoad => {
                let slot = self.value(&args[0])?;
                Ok(Some(self.storage_word(slot)))
            }
            Op::SStore => {
                let slot = self.value(&args[0])?;
                let value = self.value(&args[1])?;
                self.set_storage_word(slot, value);
                Ok(None)
            }
            Op::CalldataLoad => {
                let offset = to_addr(self.value(&args[0])?);
                let mut word = [0u8; 32];
                for (i, byte) in word.iter_mut().enumerate() {
                    *byte = self.calldata.get(offset + i).copied().unwrap_or(0);
                }
                Ok(Some(U256::from_be_bytes(word)))
            }
            Op::CalldataSize => Ok(Some(U256::from(self.calldata.len()))),
            Op::CalldataCopy => {
                let dest = to_addr(self.value(&args[0])?);
                let offset = to_addr(self.value(&args[1])?);
                let size = to_addr(self.value(&args[2])?);
                // Reads past the end of calldata deterministically yield
                // zero bytes.
                let bytes: Vec<u8> = (0..size)
                    .map(|i| self.calldata.get(offset + i).copied().unwrap_or(0))
                    .collect();
                self.set_mem_slice(dest, &bytes);
                Ok(None)
            }
            Op::Sha3 => {
                let offset = to_addr(self.value(&args[0])?);
                let size = to_addr(self.value(&args[1])?);
                let bytes = self.mem_slice(offset, size);
                Ok(Some(U256::from_be_bytes(keccak256(bytes).0)))
            }
            Op::Sha3_32 => {
                let word = self.value(&args[0])?;
                Ok(Some(hash_word(word)))
            }
            Op::Sha3_64 => {
                let a = self.value(&args[0])?;
                let b = self.value(&args[1])?;
                Ok(Some(hash_two(a, b)))
            }

            Op::Call => {
                let _gas = self.value(&args[0])?;
                let addr = self.value(&args[1])?;
                let _value = self.value(&args[2])?;
                let in_offset = to_addr(self.value(&args[3])?);
                let in_size = to_addr(self.value(&args[4])?);
                let out_offset = to_addr(self.value(&args[5])?);
                let out_size = to_addr(self.value(&args[6])?);
                assert_eq!(addr, U256::from(4u8), "only the identity precompile is simulated");
                let bytes = self.mem_slice(in_offset, in_size);
                self.set_mem_slice(out_offset, &bytes[..out_size.min(bytes.len())]);
                Ok(Some(U256::from(1u8)))
            }

            Op::Caller
            | Op::CallValue
            | Op::Gas
            | Op::SelfAddress
            | Op::Balance
            | Op::StaticCall => {
                panic!("environment op {op} is not emitted by this layer")
            }
        }
    }

    fn binary(&mut self, args: &[IrNode], f: impl Fn(U256, U256) -> U256) -> Outcome {
        let a = self.value(&args[0])?;
        let b = self.value(&args[1])?;
        Ok(Some(f(a, b)))
    }

    fn binary_signed(&mut self, args: &[IrNode], f: impl Fn(I256, I256) -> I256) -> Outcome {
        let (a, b) = self.signed_pair(args)?;
        Ok(Some(f(a, b).into_raw()))
    }

    fn signed_pair(&mut self, args: &[IrNode]) -> Result<(I256, I256), Halt> {
        let a = I256::from_raw(self.value(&args[0])?);
        let b = I256::from_raw(self.value(&args[1])?);
        Ok((a, b))
    }

    fn compare(&mut self, args: &[IrNode], f: impl Fn(U256, U256) -> bool) -> Outcome {
        let a = self.value(&args[0])?;
        let b = self.value(&args[1])?;
        Ok(Some(bool_word(f(a, b))))
    }
}
