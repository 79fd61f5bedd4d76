//! Table bridge
//!
//! Every operation pushes the table and its operands, runs one VM call and
//! restores the stack, whatever the outcome.

use crate::iter::{Collection, Iter};
use crate::object::{Object, ObjectKind};
use crate::value::Value;
use crate::vm::Vm;
use squirrel_vm::{
    SQ_SUCCEEDED, SQFalse, SQTrue, sq_deleteslot, sq_get, sq_newslot, sq_newtable, sq_set,
};
use std::collections::HashMap;
use std::hash::Hash;
use std::ops::Deref;

#[derive(Debug, Clone, PartialEq)]
pub struct Table<'vm> {
    object: Object<'vm>,
}

impl<'vm> Table<'vm> {
    /// Allocate an empty table in `vm`
    pub fn new(vm: &'vm Vm) -> Self {
        unsafe { sq_newtable(vm.raw()) };
        Table {
            object: Object::pop_new(vm),
        }
    }

    /// Value stored under `key`, Null when absent
    pub fn get(&self, key: impl Into<Value<'vm>>) -> Value<'vm> {
        let key = key.into();
        let stack = self.vm().stack();
        let _guard = stack.guard();
        self.push();
        stack.push(&key);
        if SQ_SUCCEEDED(unsafe { sq_get(self.vm().raw(), -2) }) {
            stack.read(-1)
        } else {
            Value::Null
        }
    }

    pub fn contains_key(&self, key: impl Into<Value<'vm>>) -> bool {
        let key = key.into();
        let stack = self.vm().stack();
        let _guard = stack.guard();
        self.push();
        stack.push(&key);
        SQ_SUCCEEDED(unsafe { sq_get(self.vm().raw(), -2) })
    }

    /// Overwrite an existing slot; false if `key` is absent
    pub fn set(&self, key: impl Into<Value<'vm>>, value: impl Into<Value<'vm>>) -> bool {
        self.store(key.into(), value.into(), |raw| unsafe { sq_set(raw, -3) })
    }

    /// Create the slot or overwrite it
    pub fn insert(&self, key: impl Into<Value<'vm>>, value: impl Into<Value<'vm>>) -> bool {
        self.store(key.into(), value.into(), |raw| unsafe {
            sq_newslot(raw, -3, SQFalse)
        })
    }

    /// Remove `key`, returning its value or Null when it was absent
    pub fn remove(&self, key: impl Into<Value<'vm>>) -> Value<'vm> {
        let key = key.into();
        let stack = self.vm().stack();
        let _guard = stack.guard();
        self.push();
        stack.push(&key);
        if SQ_SUCCEEDED(unsafe { sq_deleteslot(self.vm().raw(), -2, SQTrue) }) {
            stack.read(-1)
        } else {
            Value::Null
        }
    }

    pub fn iter(&self) -> Iter<'vm, '_> {
        self.entries()
    }

    fn store(
        &self,
        key: Value<'vm>,
        value: Value<'vm>,
        op: impl FnOnce(squirrel_vm::HSQUIRRELVM) -> squirrel_vm::SQRESULT,
    ) -> bool {
        let stack = self.vm().stack();
        let _guard = stack.guard();
        self.push();
        stack.push(&key);
        stack.push(&value);
        SQ_SUCCEEDED(op(self.vm().raw()))
    }
}

impl<'vm> Collection<'vm> for Table<'vm> {
    fn as_object(&self) -> &Object<'vm> {
        &self.object
    }
}

impl<'vm> Deref for Table<'vm> {
    type Target = Object<'vm>;

    fn deref(&self) -> &Object<'vm> {
        &self.object
    }
}

/// Fails with the original object when the VM does not report a table
impl<'vm> TryFrom<Object<'vm>> for Table<'vm> {
    type Error = Object<'vm>;

    fn try_from(object: Object<'vm>) -> Result<Self, Object<'vm>> {
        if object.kind() == Some(ObjectKind::Table) {
            Ok(Table { object })
        } else {
            Err(object)
        }
    }
}

impl<'vm> From<Table<'vm>> for Object<'vm> {
    fn from(table: Table<'vm>) -> Self {
        table.object
    }
}

impl<'a, 'vm> IntoIterator for &'a Table<'vm> {
    type Item = (Value<'vm>, Value<'vm>);
    type IntoIter = Iter<'vm, 'a>;

    fn into_iter(self) -> Iter<'vm, 'a> {
        self.entries()
    }
}

/// Same number of entries and an equal value for every host key
impl<'vm, K, V> PartialEq<HashMap<K, V>> for Table<'vm>
where
    K: Clone + Eq + Hash + Into<Value<'vm>>,
    V: Clone + Into<Value<'vm>>,
{
    fn eq(&self, other: &HashMap<K, V>) -> bool {
        self.len() == other.len()
            && other.iter().all(|(k, v)| {
                self.contains_key(k.clone()) && self.get(k.clone()) == v.clone().into()
            })
    }
}

impl<'vm, K, V> PartialEq<Table<'vm>> for HashMap<K, V>
where
    K: Clone + Eq + Hash + Into<Value<'vm>>,
    V: Clone + Into<Value<'vm>>,
{
    fn eq(&self, other: &Table<'vm>) -> bool {
        *other == *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_requires_existing_slot() {
        let vm = Vm::new();
        let table = Table::new(&vm);
        assert!(!table.set("x", 1));
        assert!(table.is_empty());
        assert!(table.insert("x", 1));
        assert!(table.set("x", 2));
        assert_eq!(table.get("x"), Value::Int(2));
        assert_eq!(vm.stack().top(), 0);
    }

    #[test]
    fn test_rewriting_a_key_keeps_size() {
        let vm = Vm::new();
        let table = Table::new(&vm);
        assert!(table.insert("k", 1));
        assert_eq!(table.len(), 1);
        assert!(table.insert("k", 2));
        assert_eq!(table.len(), 1);
        assert!(table.set("k", 3));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("k"), Value::Int(3));
        assert_eq!(vm.stack().top(), 0);
    }

    #[test]
    fn test_remove() {
        let vm = Vm::new();
        let table = Table::new(&vm);
        table.insert(1, "one");
        assert_eq!(table.remove(1), Value::from("one"));
        assert_eq!(table.remove(1), Value::Null);
        assert!(table.is_empty());
        assert_eq!(vm.stack().top(), 0);
    }

    #[test]
    fn test_null_key_is_rejected() {
        let vm = Vm::new();
        let table = Table::new(&vm);
        assert!(!table.insert(Value::Null, 1));
        assert_eq!(vm.stack().top(), 0);
    }

    #[test]
    fn test_try_from_checks_kind() {
        let vm = Vm::new();
        let array = crate::array::Array::new(&vm);
        let object: Object = (*array).clone();
        assert!(Table::try_from(object).is_err());
    }
}
