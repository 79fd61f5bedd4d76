//! Squirrel Bridge: Rust values and lifetimes over an embedded Squirrel VM
//!
//! The bridge owns the VM's reference counting and stack discipline so that
//! host code works with plain Rust values:
//!
//! - [`Vm`] opens and closes a VM and runs scripts
//! - [`Value`] is the host view of a VM value
//! - [`Object`] retains a table, array or closure for as long as it lives
//! - [`Table`], [`Array`] and [`Closure`] are typed views over objects
//! - [`Stack`] and [`StackGuard`] implement the push/pop protocol
//!
//! Every bridge operation leaves the VM stack at the depth it found it.
//! Objects borrow their `Vm`, so no handle can outlive the VM it came from.
//!
//! ```text
//! let vm = Vm::new();
//! let add = vm.execute("return function(a, b) { return a + b }")?;
//! let sum = add.as_closure().unwrap().call(&[1.into(), 2.into()])?;
//! assert_eq!(sum, Value::Int(3));
//! ```

pub mod array;
pub mod closure;
pub mod compiler;
pub mod config;
pub mod error;
pub mod iter;
pub mod native;
pub mod object;
mod registry;
pub mod stack;
pub mod table;
pub mod value;
pub mod vm;

pub use array::Array;
pub use closure::Closure;
pub use compiler::Compiler;
pub use config::{DEFAULT_BUFFER_NAME, DEFAULT_STACK_SIZE, VmConfig};
pub use error::{ConfigError, Error};
pub use iter::{Collection, Iter};
pub use object::{Object, ObjectKind};
pub use stack::{Stack, StackGuard};
pub use table::Table;
pub use value::{Repr, Value};
pub use vm::Vm;
