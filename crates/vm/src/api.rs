//! The `sq_*` C API
//!
//! These functions are the only way embedders talk to the VM. Names,
//! argument order and stack effects follow Squirrel's `squirrel.h`.
//!
//! # Safety Contract
//!
//! Every function taking an `HSQUIRRELVM` requires a pointer returned by
//! [`sq_open`] that has not been passed to [`sq_close`]. Output pointers
//! must be valid for writes. Stack indices are checked: an index outside
//! the current frame reads as null or makes the call return `SQ_ERROR`,
//! never undefined behavior.
//!
//! Failing operations store a message in the VM's last-error slot, which
//! [`sq_getlasterror`] pushes onto the stack.

use crate::abi::{
    HSQOBJECT, HSQUIRRELVM, SQBool, SQChar, SQFUNCTION, SQFalse, SQFloat, SQInteger, SQObjectType,
    SQRESULT, SQ_ERROR, SQ_OK, SQTrue, SQUnsignedInteger, SQUserPointer, is_ref_counted,
};
use crate::interp;
use crate::object::{NativeClosure, Object, SqValue};
use crate::vm::SQVM;
use std::cmp::Ordering;
use std::ffi::CStr;
use std::rc::Rc;

const DEFAULT_SOURCE_NAME: &str = "unnamedbuffer";

unsafe fn vm_ref<'a>(v: HSQUIRRELVM) -> &'a SQVM {
    unsafe { &*v }
}

fn fail(vm: &SQVM, message: &str) -> SQRESULT {
    vm.set_error(message);
    SQ_ERROR
}

fn bool_result(ok: bool) -> SQBool {
    if ok { SQTrue } else { SQFalse }
}

// VM lifecycle

/// Create a VM whose stack initially reserves `initialstacksize` slots
///
/// # Safety
/// Always safe to call. The returned VM must be released with [`sq_close`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_open(initialstacksize: SQInteger) -> HSQUIRRELVM {
    let vm = SQVM::new(initialstacksize.max(0) as usize);
    Box::into_raw(Box::new(vm))
}

/// Destroy a VM and every value it still owns
///
/// # Safety
/// `v` must come from [`sq_open`] and must not be used afterwards.
/// A null pointer is ignored.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_close(v: HSQUIRRELVM) {
    if !v.is_null() {
        drop(unsafe { Box::from_raw(v) });
    }
}

/// Store an arbitrary embedder pointer in the VM
///
/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_setforeignptr(v: HSQUIRRELVM, p: SQUserPointer) {
    unsafe { vm_ref(v) }.foreign_ptr.set(p);
}

/// Pointer previously stored with [`sq_setforeignptr`], null by default
///
/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_getforeignptr(v: HSQUIRRELVM) -> SQUserPointer {
    unsafe { vm_ref(v) }.foreign_ptr.get()
}

// Stack manipulation

/// Number of slots in the current frame
///
/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_gettop(v: HSQUIRRELVM) -> SQInteger {
    unsafe { vm_ref(v) }.top() as SQInteger
}

/// Resize the current frame, filling new slots with null
///
/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_settop(v: HSQUIRRELVM, newtop: SQInteger) {
    unsafe { vm_ref(v) }.set_top(newtop.max(0) as usize);
}

/// Pop `nelemstopop` slots
///
/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_pop(v: HSQUIRRELVM, nelemstopop: SQInteger) {
    unsafe { vm_ref(v) }.pop(nelemstopop.max(0) as usize);
}

/// Pop the topmost slot
///
/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_poptop(v: HSQUIRRELVM) {
    unsafe { vm_ref(v) }.pop(1);
}

/// Push a copy of the slot at `idx`
///
/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_push(v: HSQUIRRELVM, idx: SQInteger) {
    let vm = unsafe { vm_ref(v) };
    vm.push(vm.get(idx));
}

/// Remove the slot at `idx`, shifting the slots above it down
///
/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_remove(v: HSQUIRRELVM, idx: SQInteger) {
    unsafe { vm_ref(v) }.remove(idx);
}

// Pushing values

/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_pushnull(v: HSQUIRRELVM) {
    unsafe { vm_ref(v) }.push(SqValue::Null);
}

/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_pushinteger(v: HSQUIRRELVM, n: SQInteger) {
    unsafe { vm_ref(v) }.push(SqValue::Integer(n));
}

/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_pushfloat(v: HSQUIRRELVM, f: SQFloat) {
    unsafe { vm_ref(v) }.push(SqValue::Float(f));
}

/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_pushbool(v: HSQUIRRELVM, b: SQBool) {
    unsafe { vm_ref(v) }.push(SqValue::Bool(b != SQFalse));
}

/// Push a copy of a string
///
/// A negative `len` means `s` is NUL-terminated. A null `s` pushes null.
///
/// # Safety
/// `v` must be a valid VM. `s` must point to `len` readable bytes, or to a
/// NUL-terminated string when `len` is negative.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_pushstring(v: HSQUIRRELVM, s: *const SQChar, len: SQInteger) {
    let vm = unsafe { vm_ref(v) };
    if s.is_null() {
        vm.push(SqValue::Null);
        return;
    }
    let bytes = if len < 0 {
        unsafe { CStr::from_ptr(s) }.to_bytes()
    } else {
        unsafe { std::slice::from_raw_parts(s as *const u8, len as usize) }
    };
    vm.push(SqValue::from_bytes(bytes));
}

/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_pushuserpointer(v: HSQUIRRELVM, p: SQUserPointer) {
    unsafe { vm_ref(v) }.push(SqValue::UserPointer(p));
}

/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_pushroottable(v: HSQUIRRELVM) {
    let vm = unsafe { vm_ref(v) };
    vm.push(vm.root.clone());
}

/// Push the value a handle refers to
///
/// # Safety
/// `v` must be a valid VM. A reference-counted handle must refer to an
/// object that is still alive in this VM (on the stack, in a container or
/// retained with [`sq_addref`]).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_pushobject(v: HSQUIRRELVM, obj: HSQOBJECT) {
    let vm = unsafe { vm_ref(v) };
    vm.push(unsafe { SqValue::from_handle(&obj) });
}

// Reading values

/// Type tag of the slot at `idx`
///
/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_gettype(v: HSQUIRRELVM, idx: SQInteger) -> SQObjectType {
    unsafe { vm_ref(v) }.get(idx).type_tag()
}

/// Read a numeric slot as an integer, truncating floats
///
/// # Safety
/// `v` must be a valid VM and `i` valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_getinteger(
    v: HSQUIRRELVM,
    idx: SQInteger,
    i: *mut SQInteger,
) -> SQRESULT {
    match unsafe { vm_ref(v) }.get(idx) {
        SqValue::Integer(n) => unsafe { *i = n },
        SqValue::Float(f) => unsafe { *i = f as SQInteger },
        _ => return SQ_ERROR,
    }
    SQ_OK
}

/// Read a numeric slot as a float, widening integers
///
/// # Safety
/// `v` must be a valid VM and `f` valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_getfloat(v: HSQUIRRELVM, idx: SQInteger, f: *mut SQFloat) -> SQRESULT {
    match unsafe { vm_ref(v) }.get(idx) {
        SqValue::Integer(n) => unsafe { *f = n as SQFloat },
        SqValue::Float(x) => unsafe { *f = x },
        _ => return SQ_ERROR,
    }
    SQ_OK
}

/// # Safety
/// `v` must be a valid VM and `b` valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_getbool(v: HSQUIRRELVM, idx: SQInteger, b: *mut SQBool) -> SQRESULT {
    match unsafe { vm_ref(v) }.get(idx) {
        SqValue::Bool(value) => {
            unsafe { *b = bool_result(value) };
            SQ_OK
        }
        _ => SQ_ERROR,
    }
}

/// Pointer to a string slot's bytes and their length
///
/// The bytes are NUL-terminated and stay valid while the string is
/// referenced by the VM.
///
/// # Safety
/// `v` must be a valid VM; `c` and `size` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_getstringandsize(
    v: HSQUIRRELVM,
    idx: SQInteger,
    c: *mut *const SQChar,
    size: *mut SQInteger,
) -> SQRESULT {
    let value = unsafe { vm_ref(v) }.get(idx);
    match value.as_sq_string() {
        Some(s) => {
            unsafe {
                *c = s.as_ptr() as *const SQChar;
                *size = s.len() as SQInteger;
            }
            SQ_OK
        }
        None => SQ_ERROR,
    }
}

/// Like [`sq_getstringandsize`] without the length
///
/// # Safety
/// `v` must be a valid VM and `c` valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_getstring(
    v: HSQUIRRELVM,
    idx: SQInteger,
    c: *mut *const SQChar,
) -> SQRESULT {
    let mut size = 0;
    unsafe { sq_getstringandsize(v, idx, c, &mut size) }
}

/// # Safety
/// `v` must be a valid VM and `p` valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_getuserpointer(
    v: HSQUIRRELVM,
    idx: SQInteger,
    p: *mut SQUserPointer,
) -> SQRESULT {
    match unsafe { vm_ref(v) }.get(idx) {
        SqValue::UserPointer(ptr) => {
            unsafe { *p = ptr };
            SQ_OK
        }
        _ => SQ_ERROR,
    }
}

/// Fill `po` with a non-owning handle to the slot at `idx`
///
/// # Safety
/// `v` must be a valid VM and `po` valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_getstackobj(
    v: HSQUIRRELVM,
    idx: SQInteger,
    po: *mut HSQOBJECT,
) -> SQRESULT {
    let vm = unsafe { vm_ref(v) };
    if vm.abs_index(idx).is_none() {
        return fail(vm, "invalid stack index");
    }
    unsafe { *po = vm.get(idx).to_handle() };
    SQ_OK
}

// Objects and handles

/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_newtable(v: HSQUIRRELVM) {
    unsafe { vm_ref(v) }.push(SqValue::new_table());
}

/// Push an array of `size` nulls
///
/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_newarray(v: HSQUIRRELVM, size: SQInteger) {
    let items = vec![SqValue::Null; size.max(0) as usize];
    unsafe { vm_ref(v) }.push(SqValue::new_array(items));
}

/// Create a native closure, popping `nfreevars` values as its free variables
///
/// # Safety
/// `v` must be a valid VM and `func` must follow the [`SQFUNCTION`]
/// contract.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_newclosure(
    v: HSQUIRRELVM,
    func: SQFUNCTION,
    nfreevars: SQUnsignedInteger,
) {
    let vm = unsafe { vm_ref(v) };
    let count = (nfreevars as usize).min(vm.top());
    let free_vars = {
        let mut stack = vm.stack.borrow_mut();
        let split = stack.len() - count;
        stack.split_off(split)
    };
    let native = NativeClosure { func, free_vars };
    vm.push(SqValue::Ref(Rc::new(Object::NativeClosure(native))));
}

/// Retain the object `po` refers to on behalf of the embedder
///
/// Scalars are not reference counted and are ignored.
///
/// # Safety
/// `v` must be a valid VM. `po` must point to a handle whose object is
/// alive in this VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_addref(v: HSQUIRRELVM, po: *mut HSQOBJECT) {
    let vm = unsafe { vm_ref(v) };
    let handle = unsafe { &*po };
    if is_ref_counted(handle._type) {
        vm.add_ref(unsafe { SqValue::from_handle(handle) });
    }
}

/// Release one reference taken with [`sq_addref`]
///
/// Returns `SQTrue` when the embedder no longer holds any reference to the
/// object. The handle itself is left untouched.
///
/// # Safety
/// `v` must be a valid VM and `po` a valid handle pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_release(v: HSQUIRRELVM, po: *mut HSQOBJECT) -> SQBool {
    let vm = unsafe { vm_ref(v) };
    let handle = unsafe { &*po };
    if !is_ref_counted(handle._type) {
        return SQTrue;
    }
    bool_result(vm.release(unsafe { handle._unVal.p_ref_counted }))
}

/// Number of embedder references held on the object
///
/// # Safety
/// `v` must be a valid VM and `po` a valid handle pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_getrefcount(v: HSQUIRRELVM, po: *mut HSQOBJECT) -> SQUnsignedInteger {
    let vm = unsafe { vm_ref(v) };
    let handle = unsafe { &*po };
    if !is_ref_counted(handle._type) {
        return 0;
    }
    vm.ref_count(unsafe { handle._unVal.p_ref_counted }) as SQUnsignedInteger
}

/// Reset a handle to null without releasing it
///
/// # Safety
/// `po` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_resetobject(po: *mut HSQOBJECT) {
    unsafe { *po = HSQOBJECT::default() };
}

/// Compare the two topmost slots
///
/// Returns 0 when equal, a negative value when the slot at -2 orders first
/// and a positive value otherwise. Numbers compare numerically, strings by
/// content, everything else by identity.
///
/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_cmp(v: HSQUIRRELVM) -> SQInteger {
    let vm = unsafe { vm_ref(v) };
    let (a, b) = (vm.get(-2), vm.get(-1));
    if a.sq_equals(&b) {
        return 0;
    }
    let ordering = interp::binary_op(crate::ast::BinaryOp::Lt, &a, &b)
        .ok()
        .map(|lt| {
            if lt.is_truthy() {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        })
        .unwrap_or_else(|| identity_bits(&a).cmp(&identity_bits(&b)));
    match ordering {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

fn identity_bits(value: &SqValue) -> (SQObjectType, i64) {
    let handle = value.to_handle();
    (handle._type, unsafe { handle._unVal.n_integer })
}

// Slots

/// Pop a key and push `container[key]`
///
/// On failure the key is still popped and nothing is pushed.
///
/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_get(v: HSQUIRRELVM, idx: SQInteger) -> SQRESULT {
    let vm = unsafe { vm_ref(v) };
    let container = vm.get(idx);
    let key = vm.get(-1);
    vm.pop(1);
    match interp::get_slot(&container, &key) {
        Ok(value) => {
            vm.push(value);
            SQ_OK
        }
        Err(message) => fail(vm, &message),
    }
}

/// Pop a key and a value and overwrite an existing slot
///
/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_set(v: HSQUIRRELVM, idx: SQInteger) -> SQRESULT {
    let vm = unsafe { vm_ref(v) };
    let container = vm.get(idx);
    let (key, value) = (vm.get(-2), vm.get(-1));
    vm.pop(2);
    match interp::set_slot(&container, &key, value) {
        Ok(()) => SQ_OK,
        Err(message) => fail(vm, &message),
    }
}

/// Pop a key and a value and create or overwrite a table slot
///
/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_newslot(v: HSQUIRRELVM, idx: SQInteger, _bstatic: SQBool) -> SQRESULT {
    let vm = unsafe { vm_ref(v) };
    let container = vm.get(idx);
    let (key, value) = (vm.get(-2), vm.get(-1));
    vm.pop(2);
    match interp::new_slot(&container, key, value) {
        Ok(()) => SQ_OK,
        Err(message) => fail(vm, &message),
    }
}

/// Pop a key and remove it from a table, optionally pushing the old value
///
/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_deleteslot(
    v: HSQUIRRELVM,
    idx: SQInteger,
    pushval: SQBool,
) -> SQRESULT {
    let vm = unsafe { vm_ref(v) };
    let container = vm.get(idx);
    let key = vm.get(-1);
    vm.pop(1);
    let Some(table) = container.as_table() else {
        return fail(vm, "delete only works on tables");
    };
    let removed = table.borrow_mut().remove(&key);
    match removed {
        Some(value) => {
            if pushval != SQFalse {
                vm.push(value);
            }
            SQ_OK
        }
        None => fail(vm, &format!("the index '{}' does not exist", key)),
    }
}

/// Entry count of a table, length of an array or byte length of a string
///
/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_getsize(v: HSQUIRRELVM, idx: SQInteger) -> SQInteger {
    let vm = unsafe { vm_ref(v) };
    let value = vm.get(idx);
    if let Some(table) = value.as_table() {
        table.borrow().len() as SQInteger
    } else if let Some(array) = value.as_array() {
        array.borrow().len() as SQInteger
    } else if let Some(s) = value.as_sq_string() {
        s.len() as SQInteger
    } else {
        fail(vm, "size only works on tables, arrays and strings")
    }
}

/// Advance an iteration over the container at `idx`
///
/// The slot at the top is the cursor: null to start, then whatever the
/// previous call left there. On success the cursor is updated in place and
/// the key and value are pushed. Past the last entry nothing is pushed and
/// `SQ_ERROR` is returned.
///
/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_next(v: HSQUIRRELVM, idx: SQInteger) -> SQRESULT {
    let vm = unsafe { vm_ref(v) };
    let container = vm.get(idx);
    let position = match vm.get(-1) {
        SqValue::Null => 0,
        SqValue::Integer(n) if n >= 0 => n as usize,
        _ => return fail(vm, "invalid iterator cursor"),
    };
    match interp::entry_at(&container, position) {
        Ok(Some((key, value))) => {
            vm.replace(-1, SqValue::Integer(position as SQInteger + 1));
            vm.push(key);
            vm.push(value);
            SQ_OK
        }
        Ok(None) => SQ_ERROR,
        Err(message) => fail(vm, &message),
    }
}

/// Pop a value and append it to the array at `idx`
///
/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_arrayappend(v: HSQUIRRELVM, idx: SQInteger) -> SQRESULT {
    let vm = unsafe { vm_ref(v) };
    let container = vm.get(idx);
    let value = vm.get(-1);
    vm.pop(1);
    match container.as_array() {
        Some(array) => {
            array.borrow_mut().push(value);
            SQ_OK
        }
        None => fail(vm, "append only works on arrays"),
    }
}

/// Remove the last element of the array at `idx`, optionally pushing it
///
/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_arraypop(v: HSQUIRRELVM, idx: SQInteger, pushval: SQBool) -> SQRESULT {
    let vm = unsafe { vm_ref(v) };
    let container = vm.get(idx);
    let Some(array) = container.as_array() else {
        return fail(vm, "pop only works on arrays");
    };
    let popped = array.borrow_mut().pop();
    match popped {
        Some(value) => {
            if pushval != SQFalse {
                vm.push(value);
            }
            SQ_OK
        }
        None => fail(vm, "empty array"),
    }
}

// Execution

/// Compile a buffer and push the resulting closure
///
/// On failure nothing is pushed and the last error holds
/// `"<sourcename>:<line>:<column>: <message>"`.
///
/// # Safety
/// `v` must be a valid VM; `s` must point to `size` readable bytes and
/// `sourcename` must be null or NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_compilebuffer(
    v: HSQUIRRELVM,
    s: *const SQChar,
    size: SQInteger,
    sourcename: *const SQChar,
    _raiseerror: SQBool,
) -> SQRESULT {
    let vm = unsafe { vm_ref(v) };
    let bytes = if s.is_null() || size <= 0 {
        &[][..]
    } else {
        unsafe { std::slice::from_raw_parts(s as *const u8, size as usize) }
    };
    let source = String::from_utf8_lossy(bytes);
    let name = if sourcename.is_null() {
        DEFAULT_SOURCE_NAME.into()
    } else {
        unsafe { CStr::from_ptr(sourcename) }.to_string_lossy()
    };

    match vm.compile(&source, &name) {
        Ok(closure) => {
            vm.push(closure);
            SQ_OK
        }
        Err(message) => fail(vm, &message),
    }
}

/// Call the closure sitting below the top `params` slots
///
/// The first parameter is the receiver (`this`). The parameters are popped
/// and the closure stays on the stack. When `retval` is set the return
/// value is pushed on success.
///
/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_call(
    v: HSQUIRRELVM,
    params: SQInteger,
    retval: SQBool,
    _raiseerror: SQBool,
) -> SQRESULT {
    let vm = unsafe { vm_ref(v) };
    let params = params.max(0) as usize;
    if vm.top() < params + 1 {
        return fail(vm, "not enough parameters on the stack");
    }

    let closure = vm.get(-(params as SQInteger) - 1);
    let mut args = {
        let mut stack = vm.stack.borrow_mut();
        let split = stack.len() - params;
        stack.split_off(split)
    };
    let this = if args.is_empty() {
        SqValue::Null
    } else {
        args.remove(0)
    };

    match vm.call_value(&closure, this, args) {
        Ok(result) => {
            if retval != SQFalse {
                vm.push(result);
            }
            SQ_OK
        }
        Err(message) => fail(vm, &message),
    }
}

/// Raise an error from a native function
///
/// Returns `SQ_ERROR` so a native can `return sq_throwerror(v, msg)`.
///
/// # Safety
/// `v` must be a valid VM and `err` null or NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_throwerror(v: HSQUIRRELVM, err: *const SQChar) -> SQRESULT {
    let vm = unsafe { vm_ref(v) };
    if err.is_null() {
        *vm.last_error.borrow_mut() = SqValue::Null;
        return SQ_ERROR;
    }
    let message = unsafe { CStr::from_ptr(err) }.to_string_lossy();
    fail(vm, &message)
}

/// Push the last error, null when there is none
///
/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_getlasterror(v: HSQUIRRELVM) {
    let vm = unsafe { vm_ref(v) };
    let error = vm.last_error.borrow().clone();
    vm.push(error);
}

/// # Safety
/// `v` must be a valid VM.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sq_reseterror(v: HSQUIRRELVM) {
    *unsafe { vm_ref(v) }.last_error.borrow_mut() = SqValue::Null;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{OT_INTEGER, OT_NULL, OT_TABLE, SQ_FAILED, SQ_SUCCEEDED};

    #[test]
    fn test_push_and_read_integer() {
        unsafe {
            let v = sq_open(16);
            sq_pushinteger(v, 42);
            assert_eq!(sq_gettype(v, -1), OT_INTEGER);
            let mut n = 0;
            assert_eq!(sq_getinteger(v, -1, &mut n), SQ_OK);
            assert_eq!(n, 42);
            sq_close(v);
        }
    }

    #[test]
    fn test_get_missing_key_pops_key() {
        unsafe {
            let v = sq_open(16);
            sq_newtable(v);
            sq_pushstring(v, c"missing".as_ptr(), -1);
            assert!(SQ_FAILED(sq_get(v, -2)));
            assert_eq!(sq_gettop(v), 1);
            sq_close(v);
        }
    }

    #[test]
    fn test_next_walks_table_in_insertion_order() {
        unsafe {
            let v = sq_open(16);
            sq_newtable(v);
            for (k, n) in [(c"b", 1), (c"a", 2)] {
                sq_pushstring(v, k.as_ptr(), -1);
                sq_pushinteger(v, n);
                assert!(SQ_SUCCEEDED(sq_newslot(v, -3, SQFalse)));
            }
            sq_pushnull(v);
            let mut seen = Vec::new();
            while SQ_SUCCEEDED(sq_next(v, -2)) {
                let mut n = 0;
                sq_getinteger(v, -1, &mut n);
                seen.push(n);
                sq_pop(v, 2);
            }
            assert_eq!(seen, vec![1, 2]);
            assert_eq!(sq_gettop(v), 2);
            sq_close(v);
        }
    }

    #[test]
    fn test_out_of_range_reads_as_null() {
        unsafe {
            let v = sq_open(16);
            assert_eq!(sq_gettype(v, 5), OT_NULL);
            let mut handle = HSQOBJECT::default();
            assert!(SQ_FAILED(sq_getstackobj(v, 1, &mut handle)));
            sq_close(v);
        }
    }

    #[test]
    fn test_addref_release_counts() {
        unsafe {
            let v = sq_open(16);
            sq_newtable(v);
            let mut handle = HSQOBJECT::default();
            sq_getstackobj(v, -1, &mut handle);
            assert_eq!(handle._type, OT_TABLE);
            sq_addref(v, &mut handle);
            sq_addref(v, &mut handle);
            assert_eq!(sq_getrefcount(v, &mut handle), 2);
            sq_pop(v, 1);
            // Still alive through the reference table
            sq_pushobject(v, handle);
            assert_eq!(sq_gettype(v, -1), OT_TABLE);
            sq_pop(v, 1);
            assert_eq!(sq_release(v, &mut handle), SQFalse);
            assert_eq!(sq_release(v, &mut handle), SQTrue);
            sq_close(v);
        }
    }
}
