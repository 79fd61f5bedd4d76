//! Owning handles to VM objects
//!
//! An `Object` holds one VM reference on its handle: retained exactly once
//! when created, released exactly once when dropped or replaced. Cloning
//! retains again, so every clone is independent.
//!
//! The `'vm` lifetime borrows the owning [`Vm`], so a handle can never
//! outlive the VM that issued it.

use crate::vm::Vm;
use squirrel_vm::{
    HSQOBJECT, OT_ARRAY, OT_CLOSURE, OT_NATIVECLOSURE, OT_TABLE, SQ_FAILED, SQInteger,
    SQObjectType, sq_addref, sq_cmp, sq_getrefcount, sq_getstackobj, sq_poptop, sq_pushobject,
    sq_release,
};
use std::fmt;

/// Composite VM types a handle can refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Table,
    Array,
    Closure,
    NativeClosure,
}

impl ObjectKind {
    pub fn from_type(t: SQObjectType) -> Option<Self> {
        match t {
            OT_TABLE => Some(ObjectKind::Table),
            OT_ARRAY => Some(ObjectKind::Array),
            OT_CLOSURE => Some(ObjectKind::Closure),
            OT_NATIVECLOSURE => Some(ObjectKind::NativeClosure),
            _ => None,
        }
    }

    pub fn type_tag(self) -> SQObjectType {
        match self {
            ObjectKind::Table => OT_TABLE,
            ObjectKind::Array => OT_ARRAY,
            ObjectKind::Closure => OT_CLOSURE,
            ObjectKind::NativeClosure => OT_NATIVECLOSURE,
        }
    }

    pub fn is_callable(self) -> bool {
        matches!(self, ObjectKind::Closure | ObjectKind::NativeClosure)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::Table => "table",
            ObjectKind::Array => "array",
            ObjectKind::Closure => "closure",
            ObjectKind::NativeClosure => "native closure",
        };
        write!(f, "{}", name)
    }
}

pub struct Object<'vm> {
    vm: &'vm Vm,
    handle: HSQOBJECT,
}

impl<'vm> Object<'vm> {
    /// Wrap an existing handle, retaining it once
    ///
    /// # Safety
    /// `handle` must refer to a live object of `vm`.
    pub unsafe fn from_handle(vm: &'vm Vm, handle: HSQOBJECT) -> Self {
        let mut handle = handle;
        unsafe { sq_addref(vm.raw(), &mut handle) };
        Object { vm, handle }
    }

    /// Handle to the table, array or closure at `idx`, `None` for any other
    /// slot
    pub fn from_stack(vm: &'vm Vm, idx: SQInteger) -> Option<Self> {
        let mut handle = HSQOBJECT::default();
        if SQ_FAILED(unsafe { sq_getstackobj(vm.raw(), idx, &mut handle) }) {
            return None;
        }
        ObjectKind::from_type(handle._type)?;
        // The slot keeps the object alive until it is retained
        Some(unsafe { Object::from_handle(vm, handle) })
    }

    /// Retain the freshly pushed object at the top and pop it
    pub(crate) fn pop_new(vm: &'vm Vm) -> Self {
        let mut handle = HSQOBJECT::default();
        if SQ_FAILED(unsafe { sq_getstackobj(vm.raw(), -1, &mut handle) }) {
            unreachable!("a freshly pushed object is always on top");
        }
        unsafe {
            let object = Object::from_handle(vm, handle);
            sq_poptop(vm.raw());
            object
        }
    }

    pub fn vm(&self) -> &'vm Vm {
        self.vm
    }

    pub fn handle(&self) -> &HSQOBJECT {
        &self.handle
    }

    pub fn kind(&self) -> Option<ObjectKind> {
        ObjectKind::from_type(self.handle._type)
    }

    /// References the host holds on this object across all handles
    pub fn ref_count(&self) -> usize {
        let mut handle = self.handle;
        unsafe { sq_getrefcount(self.vm.raw(), &mut handle) as usize }
    }

    /// Point this handle at `other`'s object
    ///
    /// The current reference is released before the new one is retained.
    pub fn replace(&mut self, other: &Object<'vm>) {
        assert!(
            self.vm == other.vm,
            "cannot move a handle between VM instances"
        );
        unsafe {
            sq_release(self.vm.raw(), &mut self.handle);
            self.handle = other.handle;
            sq_addref(self.vm.raw(), &mut self.handle);
        }
    }

    /// Push the object onto its VM's stack (+1)
    pub(crate) fn push(&self) {
        unsafe { sq_pushobject(self.vm.raw(), self.handle) };
    }
}

impl Clone for Object<'_> {
    fn clone(&self) -> Self {
        unsafe { Object::from_handle(self.vm, self.handle) }
    }
}

impl Drop for Object<'_> {
    fn drop(&mut self) {
        unsafe { sq_release(self.vm.raw(), &mut self.handle) };
    }
}

/// Same VM instance and equal according to the VM
impl PartialEq for Object<'_> {
    fn eq(&self, other: &Self) -> bool {
        if self.vm != other.vm {
            return false;
        }
        let stack = self.vm.stack();
        let _guard = stack.guard();
        self.push();
        other.push();
        unsafe { sq_cmp(self.vm.raw()) == 0 }
    }
}

impl fmt::Debug for Object<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("kind", &self.kind())
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            ObjectKind::Table,
            ObjectKind::Array,
            ObjectKind::Closure,
            ObjectKind::NativeClosure,
        ] {
            assert_eq!(ObjectKind::from_type(kind.type_tag()), Some(kind));
        }
        assert_eq!(ObjectKind::from_type(squirrel_vm::OT_STRING), None);
    }

    #[test]
    fn test_pop_new_retains_once_and_pops() {
        let vm = Vm::new();
        unsafe { squirrel_vm::sq_newarray(vm.raw(), 2) };
        assert_eq!(vm.stack().top(), 1);
        let array = Object::pop_new(&vm);
        assert_eq!(vm.stack().top(), 0);
        assert_eq!(array.kind(), Some(ObjectKind::Array));
        assert_eq!(array.ref_count(), 1);
    }

    #[test]
    fn test_clone_and_drop_balance_references() {
        let vm = Vm::new();
        let table = Table::new(&vm);
        assert_eq!(table.ref_count(), 1);
        let copy = table.clone();
        assert_eq!(table.ref_count(), 2);
        drop(copy);
        assert_eq!(table.ref_count(), 1);
    }

    #[test]
    fn test_replace_moves_reference() {
        let vm = Vm::new();
        let first = Table::new(&vm);
        let second = Table::new(&vm);
        let mut handle: Object = (*first).clone();
        assert_eq!(first.ref_count(), 2);

        handle.replace(&second);
        assert_eq!(first.ref_count(), 1);
        assert_eq!(second.ref_count(), 2);
        assert_eq!(handle, *second);
    }

    #[test]
    fn test_objects_from_different_vms_differ() {
        let vm1 = Vm::new();
        let vm2 = Vm::new();
        let a = vm1.root_table();
        let b = vm2.root_table();
        assert_ne!(*a, *b);
    }
}
