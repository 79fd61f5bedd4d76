//! Collections and their iteration
//!
//! Iteration follows the VM's `sq_next` cursor protocol. The first call to
//! `next` pushes the collection and a null cursor; every step reads the key
//! and value the VM pushed and pops them again; exhaustion (or dropping the
//! iterator early) removes the two-slot footprint exactly once.
//!
//! The footprint must stay on top of the stack between steps. Bridge
//! operations are stack-neutral, so calling them from a loop body is fine;
//! leaving extra values pushed is a precondition violation and panics.

use crate::object::Object;
use crate::value::Value;
use squirrel_vm::{SQ_SUCCEEDED, sq_getsize, sq_next, sq_pushnull};

/// Tables and arrays: sized and iterable
pub trait Collection<'vm> {
    fn as_object(&self) -> &Object<'vm>;

    /// Number of entries (table slots or array elements)
    fn len(&self) -> usize {
        let object = self.as_object();
        let stack = object.vm().stack();
        let _guard = stack.guard();
        object.push();
        let size = unsafe { sq_getsize(object.vm().raw(), -1) };
        size.max(0) as usize
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lazy iterator over `(key, value)` pairs
    fn entries(&self) -> Iter<'vm, '_> {
        Iter::new(self.as_object())
    }
}

enum State {
    Pending,
    Running { base: usize },
    Finished,
}

/// Single-pass iterator over a collection's `(key, value)` pairs
pub struct Iter<'vm, 'c> {
    object: &'c Object<'vm>,
    state: State,
}

impl<'vm, 'c> Iter<'vm, 'c> {
    pub(crate) fn new(object: &'c Object<'vm>) -> Self {
        Iter {
            object,
            state: State::Pending,
        }
    }
}

impl<'vm> Iterator for Iter<'vm, '_> {
    type Item = (Value<'vm>, Value<'vm>);

    fn next(&mut self) -> Option<Self::Item> {
        let vm = self.object.vm();
        let stack = vm.stack();
        let base = match self.state {
            State::Finished => return None,
            State::Running { base } => base,
            State::Pending => {
                let base = stack.top();
                self.object.push();
                unsafe { sq_pushnull(vm.raw()) };
                self.state = State::Running { base };
                base
            }
        };
        assert_eq!(
            stack.top(),
            base + 2,
            "stack depth changed while iterating a collection"
        );

        if SQ_SUCCEEDED(unsafe { sq_next(vm.raw(), -2) }) {
            let key = stack.read(-2);
            let value = stack.read(-1);
            stack.pop(2);
            Some((key, value))
        } else {
            stack.pop(2);
            self.state = State::Finished;
            None
        }
    }
}

impl Drop for Iter<'_, '_> {
    fn drop(&mut self) {
        if let State::Running { base } = self.state {
            self.object.vm().stack().set_top(base);
        }
    }
}
