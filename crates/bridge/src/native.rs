//! Host functions callable from scripts
//!
//! Each registered function becomes a native closure in the root table
//! whose single free variable is the function's index in the owning VM's
//! table of natives. Every native closure shares one trampoline: it finds
//! the `Vm` through the registry, reads the arguments and dispatches on the
//! index. Errors and panics surface in the script as runtime errors.

use crate::stack::Stack;
use crate::value::Value;
use crate::vm::Vm;
use squirrel_vm::{
    HSQUIRRELVM, SQ_SUCCEEDED, SQChar, SQFalse, SQInteger, format_panic_payload, sq_newclosure,
    sq_newslot, sq_pushroottable, sq_throwerror,
};
use std::ffi::CString;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;
use tracing::{debug, warn};

/// A host function as stored by the VM
///
/// Receives the calling VM and the call arguments (the receiver excluded).
pub(crate) type NativeFn = Rc<dyn for<'a> Fn(&'a Vm, &[Value<'a>]) -> Result<Value<'a>, String>>;

impl Vm {
    /// Expose `f` to scripts as the global `name`
    ///
    /// An `Err` returned by `f` is raised in the script as a runtime error,
    /// as is a panic. Returns false if the global could not be created.
    ///
    /// Functions are owned by the VM. A function that captures a clone of
    /// this `Vm` keeps it open until the process exits.
    pub fn register_function<F>(&self, name: &str, f: F) -> bool
    where
        F: for<'a> Fn(&'a Vm, &[Value<'a>]) -> Result<Value<'a>, String> + 'static,
    {
        let index = {
            let mut natives = self.inner.natives.borrow_mut();
            natives.push(Rc::new(f));
            natives.len() - 1
        };

        let raw = self.raw();
        let stack = self.stack();
        let _guard = stack.guard();
        unsafe { sq_pushroottable(raw) };
        stack.push(&Value::from(name));
        stack.push(&Value::Int(index as i64));
        unsafe { sq_newclosure(raw, trampoline, 1) };
        SQ_SUCCEEDED(unsafe { sq_newslot(raw, -3, SQFalse) })
    }

    pub(crate) fn native(&self, index: usize) -> Option<NativeFn> {
        self.inner.natives.borrow().get(index).cloned()
    }
}

/// Raise `message` in `raw` and report failure to the VM
unsafe fn throw(raw: HSQUIRRELVM, message: &str) -> SQInteger {
    let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
    unsafe { sq_throwerror(raw, message.as_ptr() as *const SQChar) }
}

unsafe extern "C" fn trampoline(raw: HSQUIRRELVM) -> SQInteger {
    let Some(vm) = (unsafe { Vm::from_raw(raw) }) else {
        warn!("Native call on VM {:p} with no live bridge", raw);
        return unsafe { throw(raw, "native call on a VM without a bridge") };
    };

    let result = catch_unwind(AssertUnwindSafe(|| dispatch(&vm)));
    match result {
        Ok(Ok(())) => 1,
        Ok(Err(message)) => {
            debug!("Native function failed: {}", message);
            unsafe { throw(raw, &message) }
        }
        Err(payload) => {
            let message = format_panic_payload(&payload);
            warn!("Native function panicked: {}", message);
            unsafe { throw(raw, &format!("native function panicked: {}", message)) }
        }
    }
}

/// Run the native for the current frame and push its result
///
/// The frame holds the receiver at 1, the arguments, and the function
/// index as the last slot.
fn dispatch(vm: &Vm) -> Result<(), String> {
    let stack: Stack<'_> = vm.stack();
    let top = stack.top() as SQInteger;
    let index = stack
        .integer_at(top)
        .ok_or_else(|| "native closure lost its function index".to_string())?;
    let native = vm
        .native(index as usize)
        .ok_or_else(|| format!("no native function at index {}", index))?;

    let args: Vec<Value<'_>> = (2..top).map(|idx| stack.read(idx)).collect();
    let value = native(vm, &args)?;
    if let Value::Object(obj) = &value {
        if obj.vm() != vm {
            return Err("native function returned an object from another VM".to_string());
        }
    }
    stack.push(&value);
    Ok(())
}
