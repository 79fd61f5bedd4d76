//! VM state
//!
//! One `SQVM` owns the value stack, the root table, the last-error slot and
//! the reference table that backs `sq_addref`/`sq_release`.
//!
//! Every API function receives the VM through a raw pointer, and native
//! functions re-enter the API while a call is in progress. All state is
//! therefore behind `Cell`/`RefCell` and methods take `&self`; no borrow is
//! held across a call into script or native code.
//!
//! # Stack frames
//!
//! Positive stack indices are 1-based and relative to the current frame
//! base. The base is 0 for the embedder and moves up while a native
//! function runs, so index 1 is always the native's `this`.

use crate::abi::{HSQUIRRELVM, SQInteger, SQUserPointer};
use crate::interp;
use crate::object::{Object, SqValue};
use crate::parser;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// Nested calls allowed before a call fails with "stack overflow"
pub const MAX_CALL_DEPTH: usize = 100;

pub struct SQVM {
    pub(crate) stack: RefCell<Vec<SqValue>>,
    base: Cell<usize>,
    pub(crate) root: SqValue,
    pub(crate) last_error: RefCell<SqValue>,
    /// Strong references taken through `sq_addref`, with their counts
    pub(crate) refs: RefCell<HashMap<*const Object, (Rc<Object>, usize)>>,
    pub(crate) foreign_ptr: Cell<SQUserPointer>,
    call_depth: Cell<usize>,
}

impl SQVM {
    pub fn new(initial_stack_size: usize) -> Self {
        SQVM {
            stack: RefCell::new(Vec::with_capacity(initial_stack_size)),
            base: Cell::new(0),
            root: SqValue::new_table(),
            last_error: RefCell::new(SqValue::Null),
            refs: RefCell::new(HashMap::new()),
            foreign_ptr: Cell::new(std::ptr::null_mut()),
            call_depth: Cell::new(0),
        }
    }

    pub fn push(&self, value: SqValue) {
        self.stack.borrow_mut().push(value);
    }

    /// Number of slots in the current frame
    pub fn top(&self) -> usize {
        self.stack.borrow().len() - self.base.get()
    }

    /// Pop up to `n` slots, never below the frame base
    pub fn pop(&self, n: usize) {
        let mut stack = self.stack.borrow_mut();
        let keep = stack.len() - n.min(stack.len() - self.base.get());
        stack.truncate(keep);
    }

    /// Grow with nulls or shrink the current frame to `n` slots
    pub fn set_top(&self, n: usize) {
        let base = self.base.get();
        self.stack.borrow_mut().resize(base + n, SqValue::Null);
    }

    /// Absolute position of a frame-relative index
    ///
    /// Positive indices count from the frame base (1 is the first slot),
    /// negative ones from the top (-1 is the topmost slot).
    pub fn abs_index(&self, idx: SQInteger) -> Option<usize> {
        let len = self.stack.borrow().len();
        let base = self.base.get();
        if idx > 0 {
            let pos = base + (idx as usize) - 1;
            (pos < len).then_some(pos)
        } else if idx < 0 {
            let back = idx.unsigned_abs() as usize;
            (back <= len - base).then(|| len - back)
        } else {
            None
        }
    }

    /// Value at `idx`, or null when the index is out of range
    pub fn get(&self, idx: SQInteger) -> SqValue {
        self.abs_index(idx)
            .and_then(|pos| self.stack.borrow().get(pos).cloned())
            .unwrap_or(SqValue::Null)
    }

    pub fn remove(&self, idx: SQInteger) -> Option<SqValue> {
        let pos = self.abs_index(idx)?;
        Some(self.stack.borrow_mut().remove(pos))
    }

    /// Replace the value at `idx`
    pub fn replace(&self, idx: SQInteger, value: SqValue) -> bool {
        match self.abs_index(idx) {
            Some(pos) => {
                self.stack.borrow_mut()[pos] = value;
                true
            }
            None => false,
        }
    }

    pub fn set_error(&self, message: &str) {
        *self.last_error.borrow_mut() = SqValue::string(message);
    }

    pub fn last_error_message(&self) -> String {
        self.last_error.borrow().to_string()
    }

    /// Compile a buffer into a closure taking no parameters
    pub fn compile(&self, source: &str, name: &str) -> Result<SqValue, String> {
        let main = parser::parse(source, name).map_err(|e| e.with_source(name))?;
        Ok(interp::make_closure(Rc::new(main), None))
    }

    /// Call a closure or native closure
    pub fn call_value(
        &self,
        func: &SqValue,
        this: SqValue,
        args: Vec<SqValue>,
    ) -> Result<SqValue, String> {
        let SqValue::Ref(obj) = func else {
            return Err(format!("attempt to call '{}'", func.type_name()));
        };

        let depth = self.call_depth.get();
        if depth >= MAX_CALL_DEPTH {
            return Err("stack overflow".to_string());
        }
        self.call_depth.set(depth + 1);

        let result = match obj.as_ref() {
            Object::Closure(closure) => interp::call_closure(self, closure, this, args),
            Object::NativeClosure(_) => self.call_native(obj, this, args),
            _ => Err(format!("attempt to call '{}'", func.type_name())),
        };

        self.call_depth.set(depth);
        result
    }

    /// Run a native function in its own frame: `this`, args, free variables
    fn call_native(
        &self,
        obj: &Rc<Object>,
        this: SqValue,
        args: Vec<SqValue>,
    ) -> Result<SqValue, String> {
        let Object::NativeClosure(native) = obj.as_ref() else {
            return Err("attempt to call a non native closure".to_string());
        };

        let frame_base = self.stack.borrow().len();
        {
            let mut stack = self.stack.borrow_mut();
            stack.push(this);
            stack.extend(args);
            stack.extend(native.free_vars.iter().cloned());
        }
        let saved_base = self.base.replace(frame_base);

        let vm = self as *const SQVM as HSQUIRRELVM;
        let ret = unsafe { (native.func)(vm) };

        let result = if ret < 0 {
            Err(self.last_error_message())
        } else if ret > 0 && self.top() > 0 {
            Ok(self.get(-1))
        } else {
            Ok(SqValue::Null)
        };

        self.stack.borrow_mut().truncate(frame_base);
        self.base.set(saved_base);
        result
    }

    /// Take a strong reference on behalf of the embedder
    pub fn add_ref(&self, value: SqValue) {
        if let SqValue::Ref(obj) = value {
            let ptr = Rc::as_ptr(&obj);
            self.refs.borrow_mut().entry(ptr).or_insert((obj, 0)).1 += 1;
        }
    }

    /// Give back one embedder reference. Returns true once none remain.
    pub fn release(&self, ptr: *const Object) -> bool {
        let mut refs = self.refs.borrow_mut();
        let remaining = match refs.get_mut(&ptr) {
            Some(entry) => {
                entry.1 -= 1;
                entry.1
            }
            None => return true,
        };
        if remaining == 0 {
            refs.remove(&ptr);
        }
        remaining == 0
    }

    pub fn ref_count(&self, ptr: *const Object) -> usize {
        self.refs.borrow().get(&ptr).map_or(0, |entry| entry.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_are_frame_relative() {
        let vm = SQVM::new(16);
        vm.push(SqValue::Integer(1));
        vm.push(SqValue::Integer(2));
        vm.push(SqValue::Integer(3));
        assert!(matches!(vm.get(1), SqValue::Integer(1)));
        assert!(matches!(vm.get(-1), SqValue::Integer(3)));
        assert!(matches!(vm.get(-3), SqValue::Integer(1)));
        assert!(matches!(vm.get(4), SqValue::Null));
        assert!(matches!(vm.get(-4), SqValue::Null));
        assert!(matches!(vm.get(0), SqValue::Null));
    }

    #[test]
    fn test_pop_and_set_top() {
        let vm = SQVM::new(16);
        vm.set_top(3);
        assert_eq!(vm.top(), 3);
        vm.pop(10);
        assert_eq!(vm.top(), 0);
        vm.push(SqValue::Bool(true));
        vm.set_top(0);
        assert_eq!(vm.top(), 0);
    }

    #[test]
    fn test_compile_and_call() {
        let vm = SQVM::new(16);
        let main = vm.compile("return 40 + 2", "buffer").unwrap();
        let result = vm.call_value(&main, vm.root.clone(), vec![]).unwrap();
        assert!(matches!(result, SqValue::Integer(42)));
    }

    #[test]
    fn test_compile_error_names_buffer() {
        let vm = SQVM::new(16);
        let err = vm.compile("return )", "script.nut").unwrap_err();
        assert!(err.starts_with("script.nut:1:8: "), "got {}", err);
    }

    #[test]
    fn test_ref_table_counts() {
        let vm = SQVM::new(16);
        let table = SqValue::new_table();
        let SqValue::Ref(obj) = &table else {
            panic!("table should be a reference")
        };
        let ptr = Rc::as_ptr(obj);
        vm.add_ref(table.clone());
        vm.add_ref(table.clone());
        assert_eq!(vm.ref_count(ptr), 2);
        assert!(!vm.release(ptr));
        assert!(vm.release(ptr));
        assert_eq!(vm.ref_count(ptr), 0);
    }

    #[test]
    fn test_calling_a_non_function_fails() {
        let vm = SQVM::new(16);
        let err = vm
            .call_value(&SqValue::Integer(1), SqValue::Null, vec![])
            .unwrap_err();
        assert_eq!(err, "attempt to call 'integer'");
    }
}
