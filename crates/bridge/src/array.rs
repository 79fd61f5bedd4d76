//! Array bridge

use crate::iter::{Collection, Iter};
use crate::object::{Object, ObjectKind};
use crate::value::Value;
use crate::vm::Vm;
use squirrel_vm::{
    SQ_SUCCEEDED, SQInteger, SQTrue, sq_arrayappend, sq_arraypop, sq_get, sq_newarray, sq_set,
};
use std::ops::Deref;

#[derive(Debug, Clone, PartialEq)]
pub struct Array<'vm> {
    object: Object<'vm>,
}

impl<'vm> Array<'vm> {
    /// Allocate an empty array in `vm`
    pub fn new(vm: &'vm Vm) -> Self {
        Self::with_len(vm, 0)
    }

    /// Allocate an array of `len` nulls
    pub fn with_len(vm: &'vm Vm, len: usize) -> Self {
        unsafe { sq_newarray(vm.raw(), len as SQInteger) };
        Array {
            object: Object::pop_new(vm),
        }
    }

    /// Element at `index`, Null when out of range
    pub fn get(&self, index: usize) -> Value<'vm> {
        let stack = self.vm().stack();
        let _guard = stack.guard();
        self.object.push();
        stack.push(&Value::Int(index as i64));
        if SQ_SUCCEEDED(unsafe { sq_get(self.vm().raw(), -2) }) {
            stack.read(-1)
        } else {
            Value::Null
        }
    }

    /// Overwrite the element at `index`; false when out of range
    pub fn set(&self, index: usize, value: impl Into<Value<'vm>>) -> bool {
        let value = value.into();
        let stack = self.vm().stack();
        let _guard = stack.guard();
        self.object.push();
        stack.push(&Value::Int(index as i64));
        stack.push(&value);
        SQ_SUCCEEDED(unsafe { sq_set(self.vm().raw(), -3) })
    }

    /// Append at the end
    pub fn push(&self, value: impl Into<Value<'vm>>) -> bool {
        let value = value.into();
        let stack = self.vm().stack();
        let _guard = stack.guard();
        self.object.push();
        stack.push(&value);
        SQ_SUCCEEDED(unsafe { sq_arrayappend(self.vm().raw(), -2) })
    }

    /// Remove and return the last element, Null when empty
    pub fn pop(&self) -> Value<'vm> {
        let stack = self.vm().stack();
        let _guard = stack.guard();
        self.object.push();
        if SQ_SUCCEEDED(unsafe { sq_arraypop(self.vm().raw(), -1, SQTrue) }) {
            stack.read(-1)
        } else {
            Value::Null
        }
    }

    /// `(index, value)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (usize, Value<'vm>)> + '_ {
        self.entries()
            .map(|(index, value)| (index.as_int().unwrap_or_default() as usize, value))
    }

    /// Copy every element out
    pub fn to_vec(&self) -> Vec<Value<'vm>> {
        self.entries().map(|(_, value)| value).collect()
    }
}

impl<'vm> Collection<'vm> for Array<'vm> {
    fn as_object(&self) -> &Object<'vm> {
        &self.object
    }
}

impl<'vm> Deref for Array<'vm> {
    type Target = Object<'vm>;

    fn deref(&self) -> &Object<'vm> {
        &self.object
    }
}

/// Fails with the original object when the VM does not report an array
impl<'vm> TryFrom<Object<'vm>> for Array<'vm> {
    type Error = Object<'vm>;

    fn try_from(object: Object<'vm>) -> Result<Self, Object<'vm>> {
        if object.kind() == Some(ObjectKind::Array) {
            Ok(Array { object })
        } else {
            Err(object)
        }
    }
}

impl<'vm> From<Array<'vm>> for Object<'vm> {
    fn from(array: Array<'vm>) -> Self {
        array.object
    }
}

impl<'a, 'vm> IntoIterator for &'a Array<'vm> {
    type Item = (Value<'vm>, Value<'vm>);
    type IntoIter = Iter<'vm, 'a>;

    fn into_iter(self) -> Iter<'vm, 'a> {
        self.entries()
    }
}

/// Element-wise comparison against a host slice
impl<'vm, T> PartialEq<[T]> for Array<'vm>
where
    T: Clone + Into<Value<'vm>>,
{
    fn eq(&self, other: &[T]) -> bool {
        self.len() == other.len()
            && other
                .iter()
                .enumerate()
                .all(|(i, item)| self.get(i) == item.clone().into())
    }
}

impl<'vm, T> PartialEq<Vec<T>> for Array<'vm>
where
    T: Clone + Into<Value<'vm>>,
{
    fn eq(&self, other: &Vec<T>) -> bool {
        *self == other[..]
    }
}

impl<'vm, T> PartialEq<Array<'vm>> for [T]
where
    T: Clone + Into<Value<'vm>>,
{
    fn eq(&self, other: &Array<'vm>) -> bool {
        *other == *self
    }
}

impl<'vm, T> PartialEq<Array<'vm>> for Vec<T>
where
    T: Clone + Into<Value<'vm>>,
{
    fn eq(&self, other: &Array<'vm>) -> bool {
        *other == self[..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_len_is_null_filled() {
        let vm = Vm::new();
        let array = Array::with_len(&vm, 3);
        assert_eq!(array.len(), 3);
        assert!(array.to_vec().iter().all(Value::is_null));
        assert_eq!(vm.stack().top(), 0);
    }

    #[test]
    fn test_push_pop() {
        let vm = Vm::new();
        let array = Array::new(&vm);
        assert!(array.push(1));
        assert!(array.push("two"));
        assert_eq!(array.len(), 2);
        assert_eq!(array.pop(), Value::from("two"));
        assert_eq!(array.pop(), Value::Int(1));
        assert_eq!(array.pop(), Value::Null);
        assert_eq!(vm.stack().top(), 0);
    }

    #[test]
    fn test_set_out_of_range_fails() {
        let vm = Vm::new();
        let array = Array::with_len(&vm, 1);
        assert!(array.set(0, 5));
        assert!(!array.set(1, 5));
        assert_eq!(array.get(0), Value::Int(5));
        assert_eq!(array.get(1), Value::Null);
        assert_eq!(vm.stack().top(), 0);
    }
}
