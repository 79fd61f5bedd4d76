//! Stack protocol over the VM's shared value stack
//!
//! Indices follow the VM: positive indices are 1-based from the bottom,
//! negative ones count from the top (-1 is the topmost slot).
//!
//! Only `push` changes the depth for good. Every other bridge operation
//! runs under a [`StackGuard`], which puts the top back where it was on
//! every exit path, including early returns and panics.

use crate::array::Array;
use crate::closure::Closure;
use crate::object::Object;
use crate::table::Table;
use crate::value::{Repr, Value};
use crate::vm::Vm;
use squirrel_vm::{
    OT_ARRAY, OT_BOOL, OT_CLOSURE, OT_FLOAT, OT_INTEGER, OT_NATIVECLOSURE, OT_STRING, OT_TABLE,
    SQ_SUCCEEDED, SQBool, SQChar, SQFalse, SQFloat, SQInteger, sq_getbool, sq_getfloat,
    sq_getinteger, sq_getstringandsize, sq_gettop, sq_gettype, sq_pop, sq_pushbool,
    sq_pushfloat, sq_pushinteger, sq_pushnull, sq_pushobject, sq_pushstring, sq_settop,
};

#[derive(Clone, Copy)]
pub struct Stack<'vm> {
    vm: &'vm Vm,
}

impl<'vm> Stack<'vm> {
    pub(crate) fn new(vm: &'vm Vm) -> Self {
        Stack { vm }
    }

    /// Current depth
    pub fn top(&self) -> usize {
        unsafe { sq_gettop(self.vm.raw()) as usize }
    }

    /// Grow with nulls or shrink to `top` slots
    pub fn set_top(&self, top: usize) {
        unsafe { sq_settop(self.vm.raw(), top as SQInteger) };
    }

    /// Push a value (+1)
    ///
    /// # Panics
    /// If the value is an object that belongs to another VM.
    pub fn push(&self, value: &Value<'vm>) {
        let raw = self.vm.raw();
        if let Value::Object(obj) = value {
            assert!(
                obj.vm() == self.vm,
                "cannot push an object from another VM instance"
            );
        }
        unsafe {
            match value.repr() {
                Repr::Integer(n) => sq_pushinteger(raw, n),
                Repr::Float(f) => sq_pushfloat(raw, f),
                Repr::Bool(b) => sq_pushbool(raw, b),
                Repr::String(s) => {
                    sq_pushstring(raw, s.as_ptr() as *const SQChar, s.len() as SQInteger)
                }
                Repr::Object(handle) => sq_pushobject(raw, handle),
                Repr::Null => sq_pushnull(raw),
            }
        }
    }

    /// Pop `n` slots (-n)
    ///
    /// # Panics
    /// If `n` exceeds the current depth.
    pub fn pop(&self, n: usize) {
        let top = self.top();
        assert!(n <= top, "pop({}) on a stack of depth {}", n, top);
        unsafe { sq_pop(self.vm.raw(), n as SQInteger) };
    }

    /// Read the slot at `idx` without changing the stack
    ///
    /// Types the bridge does not model (user pointers, anything unknown)
    /// read as `Null`.
    pub fn read(&self, idx: SQInteger) -> Value<'vm> {
        let t = unsafe { sq_gettype(self.vm.raw(), idx) };
        match t {
            OT_INTEGER => self.integer_at(idx).map_or(Value::Null, Value::Int),
            OT_FLOAT => self.float_at(idx).map_or(Value::Null, Value::Float),
            OT_BOOL => self.bool_at(idx).map_or(Value::Null, Value::Bool),
            OT_STRING => self.string_at(idx).map_or(Value::Null, Value::String),
            OT_TABLE | OT_ARRAY | OT_CLOSURE | OT_NATIVECLOSURE => {
                self.object_at(idx).map_or(Value::Null, Value::Object)
            }
            _ => Value::Null,
        }
    }

    /// Integer at `idx`; floats are truncated toward zero
    pub fn integer_at(&self, idx: SQInteger) -> Option<i64> {
        let mut n: SQInteger = 0;
        SQ_SUCCEEDED(unsafe { sq_getinteger(self.vm.raw(), idx, &mut n) }).then_some(n)
    }

    /// Float at `idx`; integers are widened
    pub fn float_at(&self, idx: SQInteger) -> Option<f64> {
        let mut f: SQFloat = 0.0;
        SQ_SUCCEEDED(unsafe { sq_getfloat(self.vm.raw(), idx, &mut f) }).then_some(f)
    }

    pub fn bool_at(&self, idx: SQInteger) -> Option<bool> {
        let mut b: SQBool = SQFalse;
        SQ_SUCCEEDED(unsafe { sq_getbool(self.vm.raw(), idx, &mut b) }).then_some(b != SQFalse)
    }

    /// Copy of the string at `idx`; invalid UTF-8 is replaced
    pub fn string_at(&self, idx: SQInteger) -> Option<String> {
        let mut ptr: *const SQChar = std::ptr::null();
        let mut len: SQInteger = 0;
        let res = unsafe { sq_getstringandsize(self.vm.raw(), idx, &mut ptr, &mut len) };
        if !SQ_SUCCEEDED(res) || ptr.is_null() {
            return None;
        }
        let bytes = unsafe { std::slice::from_raw_parts(ptr as *const u8, len as usize) };
        Some(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn object_at(&self, idx: SQInteger) -> Option<Object<'vm>> {
        Object::from_stack(self.vm, idx)
    }

    pub fn table_at(&self, idx: SQInteger) -> Option<Table<'vm>> {
        self.object_at(idx).and_then(|obj| Table::try_from(obj).ok())
    }

    pub fn array_at(&self, idx: SQInteger) -> Option<Array<'vm>> {
        self.object_at(idx).and_then(|obj| Array::try_from(obj).ok())
    }

    pub fn closure_at(&self, idx: SQInteger) -> Option<Closure<'vm>> {
        self.object_at(idx).and_then(|obj| Closure::try_from(obj).ok())
    }

    /// Record the current depth and restore it when the guard drops
    pub fn guard(&self) -> StackGuard<'vm> {
        StackGuard {
            stack: *self,
            top: self.top(),
        }
    }
}

/// Scoped depth restorer returned by [`Stack::guard`]
#[must_use = "the stack is restored when the guard is dropped"]
pub struct StackGuard<'vm> {
    stack: Stack<'vm>,
    top: usize,
}

impl StackGuard<'_> {
    /// Depth that will be restored
    pub fn saved_top(&self) -> usize {
        self.top
    }
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        self.stack.set_top(self.top);
    }
}
