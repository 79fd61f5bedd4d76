//! Closure invocation
//!
//! A call lays the stack out as
//!
//! ```text
//! placeholder | closure | receiver | arg 1 .. arg n
//! ```
//!
//! and asks the VM to call with `n + 1` parameters (the receiver is the
//! first). The return value is read from the top and the stack is restored
//! to its depth before the call, on success and on failure.

use crate::error::Error;
use crate::object::{Object, ObjectKind};
use crate::value::Value;
use squirrel_vm::{SQ_FAILED, SQInteger, SQTrue, sq_call};
use std::ops::Deref;
use tracing::debug;

/// Script closure or native closure
#[derive(Debug, Clone, PartialEq)]
pub struct Closure<'vm> {
    object: Object<'vm>,
}

impl<'vm> Closure<'vm> {
    /// Call with the root table as `this`
    ///
    /// The root table is looked up once per call.
    pub fn call(&self, args: &[Value<'vm>]) -> Result<Value<'vm>, Error> {
        let root = self.vm().root_table();
        self.call_with(&root, args)
    }

    /// Call with an explicit `this`
    pub fn call_with(&self, this: &Object<'vm>, args: &[Value<'vm>]) -> Result<Value<'vm>, Error> {
        let vm = self.vm();
        let stack = vm.stack();
        let _guard = stack.guard();

        stack.push(&Value::Null);
        self.push();
        stack.push(&Value::Object(this.clone()));
        for arg in args {
            stack.push(arg);
        }

        let params = args.len() as SQInteger + 1;
        if SQ_FAILED(unsafe { sq_call(vm.raw(), params, SQTrue, SQTrue) }) {
            let message = vm.last_error();
            debug!("Closure call failed: {}", message);
            return Err(Error::Runtime(message));
        }
        Ok(stack.read(-1))
    }
}

impl<'vm> Deref for Closure<'vm> {
    type Target = Object<'vm>;

    fn deref(&self) -> &Object<'vm> {
        &self.object
    }
}

/// Accepts script and native closures; fails with the original object
/// otherwise
impl<'vm> TryFrom<Object<'vm>> for Closure<'vm> {
    type Error = Object<'vm>;

    fn try_from(object: Object<'vm>) -> Result<Self, Object<'vm>> {
        if object.kind().is_some_and(ObjectKind::is_callable) {
            Ok(Closure { object })
        } else {
            Err(object)
        }
    }
}

impl<'vm> From<Closure<'vm>> for Object<'vm> {
    fn from(closure: Closure<'vm>) -> Self {
        closure.object
    }
}

#[cfg(test)]
mod tests {
    use crate::value::Value;
    use crate::vm::Vm;

    #[test]
    fn test_call_restores_stack_on_failure() {
        let vm = Vm::new();
        let closure = vm
            .execute("return function(x) { return x.missing }")
            .unwrap()
            .as_closure()
            .unwrap();
        let err = closure.call(&[Value::Int(1)]).unwrap_err();
        assert!(err.message().contains("missing"));
        assert_eq!(vm.stack().top(), 0);
    }

    #[test]
    fn test_value_less_return_is_null() {
        let vm = Vm::new();
        let closure = vm
            .execute("return function() { local a = 1 }")
            .unwrap()
            .as_closure()
            .unwrap();
        assert_eq!(closure.call(&[]).unwrap(), Value::Null);
        assert_eq!(vm.stack().top(), 0);
    }
}
