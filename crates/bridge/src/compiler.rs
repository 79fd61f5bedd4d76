//! Script compilation and execution
//!
//! Sources are compiled under the buffer name from the VM's [`VmConfig`],
//! so compile errors read `"<buffer>:<line>:<column>: <message>"`.
//!
//! [`VmConfig`]: crate::config::VmConfig

use crate::closure::Closure;
use crate::error::Error;
use crate::value::Value;
use crate::vm::Vm;
use squirrel_vm::{
    SQ_FAILED, SQChar, SQInteger, SQTrue, sq_call, sq_compilebuffer, sq_pushroottable,
};
use std::ffi::CString;
use tracing::debug;

pub struct Compiler<'vm> {
    vm: &'vm Vm,
}

impl<'vm> Compiler<'vm> {
    pub(crate) fn new(vm: &'vm Vm) -> Self {
        Compiler { vm }
    }

    /// Compile `script` into a closure without running it
    pub fn compile(&self, script: &str) -> Result<Closure<'vm>, Error> {
        let stack = self.vm.stack();
        let _guard = stack.guard();
        self.push_compiled(script)?;
        match stack.closure_at(-1) {
            Some(closure) => Ok(closure),
            None => unreachable!("a successful compile pushes a closure"),
        }
    }

    /// Compile `script` and run it with the root table as `this`
    ///
    /// Returns the script's top-level `return` value, or Null when it
    /// returns nothing.
    pub fn execute(&self, script: &str) -> Result<Value<'vm>, Error> {
        let vm = self.vm;
        let stack = vm.stack();
        let _guard = stack.guard();
        self.push_compiled(script)?;

        unsafe { sq_pushroottable(vm.raw()) };
        if SQ_FAILED(unsafe { sq_call(vm.raw(), 1, SQTrue, SQTrue) }) {
            let message = vm.last_error();
            debug!("Script execution failed: {}", message);
            return Err(Error::Runtime(message));
        }
        Ok(stack.read(-1))
    }

    /// Leaves the compiled closure on top on success
    fn push_compiled(&self, script: &str) -> Result<(), Error> {
        let vm = self.vm;
        // Interior NULs cannot be represented; fall back to the default name
        let name = CString::new(vm.config().buffer_name.as_str()).unwrap_or_default();
        let res = unsafe {
            sq_compilebuffer(
                vm.raw(),
                script.as_ptr() as *const SQChar,
                script.len() as SQInteger,
                name.as_ptr(),
                SQTrue,
            )
        };
        if SQ_FAILED(res) {
            let message = vm.last_error();
            debug!("Compilation failed: {}", message);
            return Err(Error::Compile(message));
        }
        Ok(())
    }
}
