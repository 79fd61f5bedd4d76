//! Squirrel VM: a compact embedded scripting engine
//!
//! The engine speaks a Squirrel dialect and is driven entirely through the
//! `sq_*` C API in [`api`]: one value stack per VM, reference-counted
//! handles for tables, arrays and closures, and native functions that
//! receive the VM and work on its stack.
//!
//! Key pieces:
//! - `SqValue`: what lives in stack slots and containers
//! - `SQVM`: stack, root table, last error and the embedder reference table
//! - `api`: the C ABI, built as `staticlib` for C hosts and `rlib` for Rust

pub mod abi;
pub mod api;
pub mod ast;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod vm;

pub use abi::*;
pub use api::*;
pub use error::{CompileError, format_panic_payload};
pub use object::SqValue;
pub use vm::{MAX_CALL_DEPTH, SQVM};
