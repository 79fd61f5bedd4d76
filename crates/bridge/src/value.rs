//! Host-side view of VM values
//!
//! A `Value` is a snapshot: scalars and strings are copied out of the VM,
//! composite objects are held through an [`Object`] handle that keeps them
//! alive. Values never change after construction.
//!
//! # Equality
//!
//! `==` compares variant and payload. Values of different variants are
//! never equal, so `Int(1) != Float(1.0)`; use [`Value::as_int`] or
//! [`Value::as_float`] to compare numerically. Objects compare through the
//! VM (see [`Object`]).

use crate::array::Array;
use crate::closure::Closure;
use crate::object::Object;
use crate::table::Table;
use squirrel_vm::{HSQOBJECT, SQBool, SQFalse, SQFloat, SQInteger, SQTrue};
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

#[derive(Debug, Clone, PartialEq)]
pub enum Value<'vm> {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    /// Table, array or closure owned through a retained handle
    Object(Object<'vm>),
    Null,
}

/// Machine representation of a value, ready to be pushed
#[derive(Debug, Clone, Copy)]
pub enum Repr<'a> {
    Integer(SQInteger),
    Float(SQFloat),
    Bool(SQBool),
    String(&'a str),
    Object(HSQOBJECT),
    Null,
}

impl<'vm> Value<'vm> {
    /// Convert to the VM's machine representation
    pub fn repr(&self) -> Repr<'_> {
        match self {
            Value::Int(n) => Repr::Integer(*n),
            Value::Float(f) => Repr::Float(*f),
            Value::Bool(b) => Repr::Bool(if *b { SQTrue } else { SQFalse }),
            Value::String(s) => Repr::String(s),
            Value::Object(obj) => Repr::Object(*obj.handle()),
            Value::Null => Repr::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer value; floats are truncated toward zero
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    /// Float value; integers are widened
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object<'vm>> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<Object<'vm>> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Typed view, `None` unless the VM reports a table
    pub fn as_table(&self) -> Option<Table<'vm>> {
        self.as_object()
            .and_then(|obj| Table::try_from(obj.clone()).ok())
    }

    /// Typed view, `None` unless the VM reports an array
    pub fn as_array(&self) -> Option<Array<'vm>> {
        self.as_object()
            .and_then(|obj| Array::try_from(obj.clone()).ok())
    }

    /// Typed view, `None` unless the VM reports a script or native closure
    pub fn as_closure(&self) -> Option<Closure<'vm>> {
        self.as_object()
            .and_then(|obj| Closure::try_from(obj.clone()).ok())
    }

    fn arithmetic(
        self,
        rhs: Value<'vm>,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> Value<'vm> {
        match (self, rhs) {
            (Value::Int(a), Value::Int(b)) => int_op(a, b).map_or(Value::Null, Value::Int),
            (Value::Int(a), Value::Float(b)) => Value::Float(float_op(a as f64, b)),
            (Value::Float(a), Value::Int(b)) => Value::Float(float_op(a, b as f64)),
            (Value::Float(a), Value::Float(b)) => Value::Float(float_op(a, b)),
            _ => Value::Null,
        }
    }
}

/// Int + Int stays Int, any float operand gives Float, strings concatenate.
/// Any other combination yields Null.
impl<'vm> Add for Value<'vm> {
    type Output = Value<'vm>;

    fn add(self, rhs: Value<'vm>) -> Value<'vm> {
        match (self, rhs) {
            (Value::String(a), Value::String(b)) => Value::String(a + &b),
            (a, b) => a.arithmetic(b, |x, y| Some(x.wrapping_add(y)), |x, y| x + y),
        }
    }
}

impl<'vm> Sub for Value<'vm> {
    type Output = Value<'vm>;

    fn sub(self, rhs: Value<'vm>) -> Value<'vm> {
        self.arithmetic(rhs, |x, y| Some(x.wrapping_sub(y)), |x, y| x - y)
    }
}

impl<'vm> Mul for Value<'vm> {
    type Output = Value<'vm>;

    fn mul(self, rhs: Value<'vm>) -> Value<'vm> {
        self.arithmetic(rhs, |x, y| Some(x.wrapping_mul(y)), |x, y| x * y)
    }
}

/// Integer division by zero yields Null
impl<'vm> Div for Value<'vm> {
    type Output = Value<'vm>;

    fn div(self, rhs: Value<'vm>) -> Value<'vm> {
        self.arithmetic(
            rhs,
            |x, y| if y == 0 { None } else { Some(x.wrapping_div(y)) },
            |x, y| x / y,
        )
    }
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Bool(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{}", s),
            Value::Object(obj) => match obj.kind() {
                Some(kind) => write!(f, "<{}>", kind),
                None => write!(f, "<object>"),
            },
            Value::Null => write!(f, "null"),
        }
    }
}

impl From<i64> for Value<'_> {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value<'_> {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value<'_> {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value<'_> {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value<'_> {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value<'_> {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<'vm> From<Object<'vm>> for Value<'vm> {
    fn from(obj: Object<'vm>) -> Self {
        Value::Object(obj)
    }
}

impl<'vm> From<Table<'vm>> for Value<'vm> {
    fn from(table: Table<'vm>) -> Self {
        Value::Object(table.into())
    }
}

impl<'vm> From<Array<'vm>> for Value<'vm> {
    fn from(array: Array<'vm>) -> Self {
        Value::Object(array.into())
    }
}

impl<'vm> From<Closure<'vm>> for Value<'vm> {
    fn from(closure: Closure<'vm>) -> Self {
        Value::Object(closure.into())
    }
}

impl<'vm, T: Into<Value<'vm>>> From<Option<T>> for Value<'vm> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_conversions() {
        assert_eq!(Value::Float(1.0).as_int(), Some(1));
        assert_eq!(Value::Float(-2.7).as_int(), Some(-2));
        assert_eq!(Value::Int(1).as_float(), Some(1.0));
        assert_eq!(Value::Bool(true).as_int(), None);
        assert_eq!(Value::String("1".into()).as_float(), None);
        assert_eq!(Value::Int(1).as_bool(), None);
    }

    #[test]
    fn test_cross_variant_equality_is_false() {
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Int(0), Value::Bool(false));
        assert_ne!(Value::Null, Value::Int(0));
        assert_eq!(Value::String("a".into()), Value::from("a"));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(Value::Int(2) + Value::Int(3), Value::Int(5));
        assert_eq!(Value::Int(2) + Value::Float(0.5), Value::Float(2.5));
        assert_eq!(Value::Float(3.0) * Value::Int(2), Value::Float(6.0));
        assert_eq!(Value::Int(7) - Value::Int(10), Value::Int(-3));
        assert_eq!(
            Value::from("foo") + Value::from("bar"),
            Value::String("foobar".into())
        );
        assert_eq!(Value::from("foo") - Value::from("bar"), Value::Null);
        assert_eq!(Value::Bool(true) + Value::Int(1), Value::Null);
    }

    #[test]
    fn test_float_arithmetic_stays_float() {
        assert_eq!(Value::Float(1.5) + Value::Float(2.0), Value::Float(3.5));
        assert_eq!(Value::Float(1.5) - Value::Float(2.0), Value::Float(-0.5));
        assert_eq!(Value::Float(1.5) * Value::Float(2.0), Value::Float(3.0));
        assert_eq!(Value::Float(3.0) / Value::Float(2.0), Value::Float(1.5));
    }

    #[test]
    fn test_typed_views_check_kind() {
        let vm = crate::vm::Vm::new();
        let table = Value::from(Table::new(&vm));
        let array = Value::from(Array::new(&vm));
        assert!(table.as_table().is_some());
        assert!(table.as_array().is_none());
        assert!(table.as_closure().is_none());
        assert!(array.as_array().is_some());
        assert!(array.as_table().is_none());
        assert!(Value::Int(1).as_table().is_none());
        assert_eq!(vm.stack().top(), 0);
    }

    #[test]
    fn test_division() {
        assert_eq!(Value::Int(7) / Value::Int(2), Value::Int(3));
        assert_eq!(Value::Int(1) / Value::Int(0), Value::Null);
        assert_eq!(Value::Float(1.0) / Value::Int(4), Value::Float(0.25));
    }

    #[test]
    fn test_repr() {
        assert!(matches!(Value::Int(5).repr(), Repr::Integer(5)));
        assert!(matches!(Value::Bool(true).repr(), Repr::Bool(SQTrue)));
        assert!(matches!(Value::from("x").repr(), Repr::String("x")));
        assert!(matches!(Value::Null.repr(), Repr::Null));
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(3)), Value::Int(3));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Int(3).to_string(), "3");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::from("s").to_string(), "s");
    }
}
