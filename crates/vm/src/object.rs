//! VM-side value model
//!
//! `SqValue` is what lives in stack slots, table entries and array elements.
//! Scalars are stored inline; strings, tables, arrays and closures are
//! reference-counted `Object`s shared through `Rc`.
//!
//! # Handles
//!
//! An `HSQOBJECT` carries a borrowed `*const Object` for reference-counted
//! types. The pointer stays valid as long as something else owns the object:
//! a stack slot, a container, or the VM's reference table (`sq_addref`).

use crate::abi::{
    HSQOBJECT, OT_ARRAY, OT_BOOL, OT_CLOSURE, OT_FLOAT, OT_INTEGER, OT_NATIVECLOSURE, OT_NULL,
    OT_STRING, OT_TABLE, OT_USERPOINTER, SQFUNCTION, SQObjectType, SQObjectValue, SQUserPointer,
    is_ref_counted,
};
use crate::ast::FunctionDef;
use crate::interp::Scope;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// A value stored in the VM
#[derive(Clone)]
pub enum SqValue {
    Null,
    Integer(i64),
    Float(f64),
    Bool(bool),
    UserPointer(SQUserPointer),
    Ref(Rc<Object>),
}

/// Heap objects shared by reference
pub enum Object {
    String(SqString),
    Table(RefCell<Table>),
    Array(RefCell<Vec<SqValue>>),
    Closure(Closure),
    NativeClosure(NativeClosure),
}

/// Immutable byte string with a trailing NUL so its pointer can be handed to C
pub struct SqString {
    bytes: Box<[u8]>,
}

impl SqString {
    pub fn new(content: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(content.len() + 1);
        bytes.extend_from_slice(content);
        bytes.push(0);
        SqString {
            bytes: bytes.into_boxed_slice(),
        }
    }

    /// Content without the trailing NUL
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.bytes.len() - 1]
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.bytes.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.bytes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }
}

/// Script closure: a compiled function plus the lexical scope it was created in
pub struct Closure {
    pub func: Rc<FunctionDef>,
    pub env: Option<Rc<Scope>>,
}

/// Host function registered through `sq_newclosure`
pub struct NativeClosure {
    pub func: SQFUNCTION,
    /// Pushed after the call arguments when the function is invoked
    pub free_vars: Vec<SqValue>,
}

/// Hashable identity of a table key
///
/// Strings hash by content, numbers and bools by value, everything
/// reference-counted by object identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Integer(i64),
    Float(u64),
    Bool(bool),
    String(Box<[u8]>),
    Pointer(usize),
}

impl Key {
    fn from_value(value: &SqValue) -> Option<Key> {
        match value {
            SqValue::Null => None,
            SqValue::Integer(n) => Some(Key::Integer(*n)),
            SqValue::Float(f) => Some(Key::Float(f.to_bits())),
            SqValue::Bool(b) => Some(Key::Bool(*b)),
            SqValue::UserPointer(p) => Some(Key::Pointer(*p as usize)),
            SqValue::Ref(obj) => match obj.as_ref() {
                Object::String(s) => Some(Key::String(s.as_bytes().into())),
                _ => Some(Key::Pointer(Rc::as_ptr(obj) as usize)),
            },
        }
    }
}

/// Insertion-ordered hash table
///
/// Entries keep the order in which their keys were first created, which is
/// also the order `sq_next` and `foreach` visit them in.
#[derive(Default)]
pub struct Table {
    entries: Vec<(SqValue, SqValue)>,
    index: HashMap<Key, usize>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &SqValue) -> Option<SqValue> {
        let key = Key::from_value(key)?;
        self.index.get(&key).map(|&i| self.entries[i].1.clone())
    }

    pub fn contains(&self, key: &SqValue) -> bool {
        Key::from_value(key).is_some_and(|k| self.index.contains_key(&k))
    }

    /// Overwrite an existing slot. Returns false when the key is absent.
    pub fn set(&mut self, key: &SqValue, value: SqValue) -> bool {
        let Some(key) = Key::from_value(key) else {
            return false;
        };
        match self.index.get(&key) {
            Some(&i) => {
                self.entries[i].1 = value;
                true
            }
            None => false,
        }
    }

    /// Create or overwrite a slot
    pub fn new_slot(&mut self, key: SqValue, value: SqValue) -> Result<(), String> {
        let Some(k) = Key::from_value(&key) else {
            return Err("null cannot be used as index".to_string());
        };
        match self.index.get(&k) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(k, self.entries.len());
                self.entries.push((key, value));
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &SqValue) -> Option<SqValue> {
        let k = Key::from_value(key)?;
        let i = self.index.remove(&k)?;
        let (_, value) = self.entries.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Some(value)
    }

    /// Entry at insertion position `i`, used by iteration
    pub fn entry_at(&self, i: usize) -> Option<(SqValue, SqValue)> {
        self.entries.get(i).cloned()
    }
}

impl SqValue {
    pub fn string(content: &str) -> SqValue {
        SqValue::from_bytes(content.as_bytes())
    }

    pub fn from_bytes(content: &[u8]) -> SqValue {
        SqValue::Ref(Rc::new(Object::String(SqString::new(content))))
    }

    pub fn new_table() -> SqValue {
        SqValue::Ref(Rc::new(Object::Table(RefCell::new(Table::new()))))
    }

    pub fn new_array(items: Vec<SqValue>) -> SqValue {
        SqValue::Ref(Rc::new(Object::Array(RefCell::new(items))))
    }

    pub fn type_tag(&self) -> SQObjectType {
        match self {
            SqValue::Null => OT_NULL,
            SqValue::Integer(_) => OT_INTEGER,
            SqValue::Float(_) => OT_FLOAT,
            SqValue::Bool(_) => OT_BOOL,
            SqValue::UserPointer(_) => OT_USERPOINTER,
            SqValue::Ref(obj) => match obj.as_ref() {
                Object::String(_) => OT_STRING,
                Object::Table(_) => OT_TABLE,
                Object::Array(_) => OT_ARRAY,
                Object::Closure(_) => OT_CLOSURE,
                Object::NativeClosure(_) => OT_NATIVECLOSURE,
            },
        }
    }

    /// Name reported by `typeof`
    pub fn type_name(&self) -> &'static str {
        match self {
            SqValue::Null => "null",
            SqValue::Integer(_) => "integer",
            SqValue::Float(_) => "float",
            SqValue::Bool(_) => "bool",
            SqValue::UserPointer(_) => "userpointer",
            SqValue::Ref(obj) => match obj.as_ref() {
                Object::String(_) => "string",
                Object::Table(_) => "table",
                Object::Array(_) => "array",
                Object::Closure(_) | Object::NativeClosure(_) => "function",
            },
        }
    }

    /// Squirrel truthiness: null, false, 0 and 0.0 are false
    pub fn is_truthy(&self) -> bool {
        match self {
            SqValue::Null => false,
            SqValue::Integer(n) => *n != 0,
            SqValue::Float(f) => *f != 0.0,
            SqValue::Bool(b) => *b,
            SqValue::UserPointer(p) => !p.is_null(),
            SqValue::Ref(_) => true,
        }
    }

    pub fn as_table(&self) -> Option<&RefCell<Table>> {
        match self {
            SqValue::Ref(obj) => match obj.as_ref() {
                Object::Table(t) => Some(t),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&RefCell<Vec<SqValue>>> {
        match self {
            SqValue::Ref(obj) => match obj.as_ref() {
                Object::Array(a) => Some(a),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_sq_string(&self) -> Option<&SqString> {
        match self {
            SqValue::Ref(obj) => match obj.as_ref() {
                Object::String(s) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    /// Equality as used by `==` and `sq_cmp`
    ///
    /// Numbers compare by numeric value across integer/float, strings by
    /// content, other objects by identity.
    pub fn sq_equals(&self, other: &SqValue) -> bool {
        match (self, other) {
            (SqValue::Null, SqValue::Null) => true,
            (SqValue::Integer(a), SqValue::Integer(b)) => a == b,
            (SqValue::Float(a), SqValue::Float(b)) => a == b,
            (SqValue::Integer(a), SqValue::Float(b)) | (SqValue::Float(b), SqValue::Integer(a)) => {
                (*a as f64) == *b
            }
            (SqValue::Bool(a), SqValue::Bool(b)) => a == b,
            (SqValue::UserPointer(a), SqValue::UserPointer(b)) => a == b,
            (SqValue::Ref(a), SqValue::Ref(b)) => match (a.as_ref(), b.as_ref()) {
                (Object::String(x), Object::String(y)) => x.as_bytes() == y.as_bytes(),
                _ => Rc::ptr_eq(a, b),
            },
            _ => false,
        }
    }

    /// Non-owning handle for this value
    pub fn to_handle(&self) -> HSQOBJECT {
        let value = match self {
            SqValue::Null => SQObjectValue { n_integer: 0 },
            SqValue::Integer(n) => SQObjectValue { n_integer: *n },
            SqValue::Float(f) => SQObjectValue { f_float: *f },
            SqValue::Bool(b) => SQObjectValue {
                b_bool: if *b { 1 } else { 0 },
            },
            SqValue::UserPointer(p) => SQObjectValue { p_user_pointer: *p },
            SqValue::Ref(obj) => SQObjectValue {
                p_ref_counted: Rc::as_ptr(obj),
            },
        };
        HSQOBJECT {
            _type: self.type_tag(),
            _unVal: value,
        }
    }

    /// Rebuild a value from a handle, taking a new strong reference
    ///
    /// # Safety
    /// For reference-counted types the handle's pointer must refer to a live
    /// object owned elsewhere (stack slot, container or reference table).
    pub unsafe fn from_handle(handle: &HSQOBJECT) -> SqValue {
        unsafe {
            match handle._type {
                OT_INTEGER => SqValue::Integer(handle._unVal.n_integer),
                OT_FLOAT => SqValue::Float(handle._unVal.f_float),
                OT_BOOL => SqValue::Bool(handle._unVal.b_bool != 0),
                OT_USERPOINTER => SqValue::UserPointer(handle._unVal.p_user_pointer),
                t if is_ref_counted(t) => {
                    let ptr = handle._unVal.p_ref_counted;
                    if ptr.is_null() {
                        return SqValue::Null;
                    }
                    Rc::increment_strong_count(ptr);
                    SqValue::Ref(Rc::from_raw(ptr))
                }
                _ => SqValue::Null,
            }
        }
    }
}

impl fmt::Display for SqValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqValue::Null => write!(f, "null"),
            SqValue::Integer(n) => write!(f, "{}", n),
            SqValue::Float(x) => write!(f, "{}", x),
            SqValue::Bool(b) => write!(f, "{}", b),
            SqValue::UserPointer(p) => write!(f, "(userpointer : {:p})", *p),
            SqValue::Ref(obj) => match obj.as_ref() {
                Object::String(s) => write!(f, "{}", s.to_string_lossy()),
                _ => write!(f, "({} : {:p})", self.type_name(), Rc::as_ptr(obj)),
            },
        }
    }
}

impl fmt::Debug for SqValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqValue::Ref(obj) if matches!(obj.as_ref(), Object::String(_)) => {
                write!(f, "{:?}", self.to_string())
            }
            _ => write!(f, "{}", self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_new_slot_and_set() {
        let mut table = Table::new();
        assert!(!table.set(&SqValue::string("x"), SqValue::Integer(1)));
        table
            .new_slot(SqValue::string("x"), SqValue::Integer(1))
            .unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.set(&SqValue::string("x"), SqValue::Integer(2)));
        assert_eq!(table.len(), 1);
        match table.get(&SqValue::string("x")) {
            Some(SqValue::Integer(2)) => {}
            other => panic!("Expected Integer(2), got {:?}", other),
        }
    }

    #[test]
    fn test_table_rejects_null_key() {
        let mut table = Table::new();
        assert!(table.new_slot(SqValue::Null, SqValue::Integer(1)).is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn test_table_remove_keeps_order() {
        let mut table = Table::new();
        for i in 0..4 {
            table
                .new_slot(SqValue::Integer(i), SqValue::Integer(i * 10))
                .unwrap();
        }
        assert!(table.remove(&SqValue::Integer(1)).is_some());
        let keys: Vec<i64> = (0..table.len())
            .map(|i| match table.entry_at(i) {
                Some((SqValue::Integer(k), _)) => k,
                other => panic!("unexpected entry {:?}", other.map(|e| e.0)),
            })
            .collect();
        assert_eq!(keys, vec![0, 2, 3]);
        assert!(matches!(
            table.get(&SqValue::Integer(3)),
            Some(SqValue::Integer(30))
        ));
    }

    #[test]
    fn test_string_keys_hash_by_content() {
        let mut table = Table::new();
        table
            .new_slot(SqValue::string("key"), SqValue::Bool(true))
            .unwrap();
        assert!(table.contains(&SqValue::string("key")));
    }

    #[test]
    fn test_sq_equals_numeric_and_identity() {
        assert!(SqValue::Integer(1).sq_equals(&SqValue::Float(1.0)));
        assert!(SqValue::string("a").sq_equals(&SqValue::string("a")));
        let t1 = SqValue::new_table();
        let t2 = SqValue::new_table();
        assert!(t1.sq_equals(&t1.clone()));
        assert!(!t1.sq_equals(&t2));
    }

    #[test]
    fn test_truthiness() {
        assert!(!SqValue::Null.is_truthy());
        assert!(!SqValue::Integer(0).is_truthy());
        assert!(!SqValue::Float(0.0).is_truthy());
        assert!(SqValue::string("").is_truthy());
        assert!(SqValue::new_array(vec![]).is_truthy());
    }

    #[test]
    fn test_handle_round_trip_takes_reference() {
        let table = SqValue::new_table();
        let handle = table.to_handle();
        let SqValue::Ref(obj) = &table else {
            panic!("table should be a reference")
        };
        assert_eq!(Rc::strong_count(obj), 1);
        let copy = unsafe { SqValue::from_handle(&handle) };
        assert_eq!(Rc::strong_count(obj), 2);
        assert!(copy.sq_equals(&table));
    }
}
