//! VM instances
//!
//! A `Vm` is a cheap, clonable handle to one open VM. All clones share the
//! same `VmInner`, which is the single authoritative wrapper for the raw
//! handle: the registry hands it back to native functions, and dropping the
//! last clone tears the VM down (registry first, then `sq_close`).
//!
//! VMs are single-threaded; `Vm` is neither `Send` nor `Sync`.

use crate::compiler::Compiler;
use crate::config::VmConfig;
use crate::error::Error;
use crate::native::NativeFn;
use crate::registry;
use crate::stack::Stack;
use crate::table::Table;
use crate::value::Value;
use squirrel_vm::{HSQUIRRELVM, SQInteger, sq_close, sq_getlasterror, sq_open, sq_pushroottable};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::trace;

pub(crate) struct VmInner {
    pub(crate) raw: HSQUIRRELVM,
    pub(crate) config: VmConfig,
    /// Host functions reachable from the VM, indexed by their native closure
    pub(crate) natives: RefCell<Vec<NativeFn>>,
}

impl Drop for VmInner {
    fn drop(&mut self) {
        registry::unregister(self.raw);
        trace!("Closing VM {:p}", self.raw);
        unsafe { sq_close(self.raw) };
    }
}

#[derive(Clone)]
pub struct Vm {
    pub(crate) inner: Rc<VmInner>,
}

impl Vm {
    /// Open a VM with the default configuration
    pub fn new() -> Self {
        Self::with_config(&VmConfig::default())
    }

    /// Open a VM with a caller-chosen initial stack capacity
    pub fn with_stack_size(stack_size: usize) -> Self {
        Self::with_config(&VmConfig {
            stack_size,
            ..VmConfig::default()
        })
    }

    pub fn with_config(config: &VmConfig) -> Self {
        let raw = unsafe { sq_open(config.stack_size as SQInteger) };
        let inner = Rc::new(VmInner {
            raw,
            config: config.clone(),
            natives: RefCell::new(Vec::new()),
        });
        registry::register(&inner);
        trace!("Opened VM {:p} (stack size {})", raw, config.stack_size);
        Vm { inner }
    }

    /// The wrapper registered for a raw VM handle
    ///
    /// Returns a handle to the same instance that opened the VM, or `None`
    /// when that instance is gone or the VM was not opened by this crate.
    ///
    /// # Safety
    /// `raw` must be an open VM whose foreign pointer is either null or was
    /// set by this crate.
    pub unsafe fn from_raw(raw: HSQUIRRELVM) -> Option<Vm> {
        unsafe { registry::lookup(raw) }.map(|inner| Vm { inner })
    }

    pub fn raw(&self) -> HSQUIRRELVM {
        self.inner.raw
    }

    pub fn config(&self) -> &VmConfig {
        &self.inner.config
    }

    pub fn stack(&self) -> Stack<'_> {
        Stack::new(self)
    }

    /// The table that holds script globals
    pub fn root_table(&self) -> Table<'_> {
        let stack = self.stack();
        let _guard = stack.guard();
        unsafe { sq_pushroottable(self.raw()) };
        match stack.table_at(-1) {
            Some(table) => table,
            None => unreachable!("the root slot always holds a table"),
        }
    }

    pub fn compiler(&self) -> Compiler<'_> {
        Compiler::new(self)
    }

    /// Compile `script` and run it with the root table as `this`
    pub fn execute(&self, script: &str) -> Result<Value<'_>, Error> {
        self.compiler().execute(script)
    }

    /// Message of the VM's last error, empty when there is none
    pub(crate) fn last_error(&self) -> String {
        let stack = self.stack();
        let _guard = stack.guard();
        unsafe { sq_getlasterror(self.raw()) };
        match stack.read(-1) {
            Value::Null => String::new(),
            Value::String(message) => message,
            other => other.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn strong_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

/// Handles are equal when they refer to the same VM instance
impl PartialEq for Vm {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Vm {}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("raw", &self.inner.raw)
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_instance() {
        let vm = Vm::new();
        let other = vm.clone();
        assert_eq!(vm, other);
        assert_ne!(vm, Vm::new());
    }

    #[test]
    fn test_with_config() {
        let config = VmConfig {
            stack_size: 16,
            buffer_name: "main.nut".to_string(),
        };
        let vm = Vm::with_config(&config);
        assert_eq!(vm.config(), &config);
        assert_eq!(Vm::with_stack_size(8).config().stack_size, 8);
    }

    #[test]
    fn test_root_table_is_stack_neutral() {
        let vm = Vm::new();
        let root = vm.root_table();
        assert_eq!(vm.stack().top(), 0);
        assert_eq!(root, vm.root_table());
    }

    #[test]
    fn test_last_error_empty_by_default() {
        let vm = Vm::new();
        assert_eq!(vm.last_error(), "");
    }
}
