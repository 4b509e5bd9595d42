#![doc = include_str!("../README.md")]
#![cfg_attr(test, allow(unused_crate_dependencies))]

pub use adder_ir as ir;

pub mod error;
pub use error::{Error, ErrorKind, Result};

pub mod context;
pub use context::{Context, GlobalContext, Param, Signature, compute_selector, reserved};

pub mod resolve;
pub use resolve::{SubKey, resolve};

pub mod convert;
pub use convert::{byte_array_to_num, convert, read_location};

pub mod copy;
pub use copy::{get_length, make_byte_array_copier, make_byte_slice_copier, mzero, zero_pad};

pub mod setter;
pub use setter::make_setter;

pub mod pack;
pub use pack::pack_arguments;

pub mod ret;
pub use ret::{gen_tuple_return, make_return_stmt, nonreentrant_lock};
