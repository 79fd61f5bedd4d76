//! Back-reference from a raw VM handle to its owning [`Vm`]
//!
//! The VM's foreign pointer slot holds a `Weak<VmInner>` leaked with
//! `Weak::into_raw`. Native functions only receive the raw handle; looking
//! the pointer up gives them the same `Vm` that opened the VM. The weak
//! reference never keeps the wrapper alive, and it is reclaimed before the
//! VM is closed.

use crate::vm::VmInner;
use squirrel_vm::{HSQUIRRELVM, SQUserPointer, sq_getforeignptr, sq_setforeignptr};
use std::mem::ManuallyDrop;
use std::rc::{Rc, Weak};

/// Store a weak back-reference in `inner.raw`'s foreign pointer slot
pub(crate) fn register(inner: &Rc<VmInner>) {
    let weak = Rc::downgrade(inner);
    let ptr = Weak::into_raw(weak) as SQUserPointer;
    unsafe { sq_setforeignptr(inner.raw, ptr) };
}

/// Clear the slot and reclaim the weak reference
pub(crate) fn unregister(raw: HSQUIRRELVM) {
    unsafe {
        let ptr = sq_getforeignptr(raw);
        if ptr.is_null() {
            return;
        }
        sq_setforeignptr(raw, std::ptr::null_mut());
        drop(Weak::from_raw(ptr as *const VmInner));
    }
}

/// The live wrapper registered for `raw`, if any
///
/// # Safety
/// `raw` must be an open VM whose foreign pointer is null or was set by
/// [`register`].
pub(crate) unsafe fn lookup(raw: HSQUIRRELVM) -> Option<Rc<VmInner>> {
    let ptr = unsafe { sq_getforeignptr(raw) };
    if ptr.is_null() {
        return None;
    }
    // The slot keeps its own weak count; only borrow it here
    let weak = ManuallyDrop::new(unsafe { Weak::from_raw(ptr as *const VmInner) });
    weak.upgrade()
}
