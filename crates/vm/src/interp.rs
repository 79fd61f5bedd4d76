//! Tree-walking evaluator
//!
//! A compiled buffer is a closure over its `FunctionDef`. Calling a closure
//! creates a fresh scope chained to the scope the closure was created in,
//! binds the parameters, and executes the body with a `this` receiver.
//!
//! Name resolution for a bare identifier walks the local scopes first, then
//! the slots of `this`, then the root table. Runtime errors are plain
//! strings; the VM stores them in its last-error slot.

use crate::ast::{AssignOp, BinaryOp, Expr, FunctionDef, Literal, Stmt, UnaryOp};
use crate::object::{Closure, Object, SqValue};
use crate::vm::SQVM;
use std::cell::RefCell;
use std::rc::Rc;

/// A lexical scope holding local variables
pub struct Scope {
    vars: RefCell<Vec<(Rc<str>, SqValue)>>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    pub fn new(parent: Option<Rc<Scope>>) -> Rc<Scope> {
        Rc::new(Scope {
            vars: RefCell::new(Vec::new()),
            parent,
        })
    }

    /// Declare a local in this scope, shadowing outer ones
    pub fn declare(&self, name: Rc<str>, value: SqValue) {
        let mut vars = self.vars.borrow_mut();
        match vars.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => vars.push((name, value)),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<SqValue> {
        let mut scope = Some(self);
        while let Some(s) = scope {
            if let Some((_, v)) = s.vars.borrow().iter().find(|(n, _)| &**n == name) {
                return Some(v.clone());
            }
            scope = s.parent.as_deref();
        }
        None
    }

    /// Overwrite the nearest local named `name`. Returns false if none exists.
    pub fn assign(&self, name: &str, value: SqValue) -> bool {
        let mut scope = Some(self);
        while let Some(s) = scope {
            if let Some(slot) = s.vars.borrow_mut().iter_mut().find(|(n, _)| &**n == name) {
                slot.1 = value;
                return true;
            }
            scope = s.parent.as_deref();
        }
        false
    }
}

enum Flow {
    Normal,
    Return(SqValue),
    Break,
    Continue,
}

/// Wrap a function definition into a closure value
pub fn make_closure(func: Rc<FunctionDef>, env: Option<Rc<Scope>>) -> SqValue {
    SqValue::Ref(Rc::new(Object::Closure(Closure { func, env })))
}

/// Execute a script closure
pub fn call_closure(
    vm: &SQVM,
    closure: &Closure,
    this: SqValue,
    args: Vec<SqValue>,
) -> Result<SqValue, String> {
    if args.len() != closure.func.params.len() {
        return Err("wrong number of parameters".to_string());
    }

    let scope = Scope::new(closure.env.clone());
    for (name, value) in closure.func.params.iter().zip(args) {
        scope.declare(name.clone(), value);
    }

    let frame = Frame { vm, this };
    match frame.exec_block(&closure.func.body, &scope)? {
        Flow::Return(value) => Ok(value),
        Flow::Normal => Ok(SqValue::Null),
        Flow::Break => Err("'break' has to be in a loop block".to_string()),
        Flow::Continue => Err("'continue' has to be in a loop block".to_string()),
    }
}

struct Frame<'a> {
    vm: &'a SQVM,
    this: SqValue,
}

impl Frame<'_> {
    fn exec_block(&self, stmts: &[Stmt], scope: &Rc<Scope>) -> Result<Flow, String> {
        for stmt in stmts {
            match self.exec(stmt, scope)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&self, stmt: &Stmt, scope: &Rc<Scope>) -> Result<Flow, String> {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr, scope)?;
                Ok(Flow::Normal)
            }
            Stmt::Local(bindings) => {
                for (name, init) in bindings {
                    let value = match init {
                        Some(expr) => self.eval(expr, scope)?,
                        None => SqValue::Null,
                    };
                    scope.declare(name.clone(), value);
                }
                Ok(Flow::Normal)
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, scope)?,
                    None => SqValue::Null,
                };
                Ok(Flow::Return(value))
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.eval(cond, scope)?.is_truthy() {
                    self.exec_nested(then_branch, scope)
                } else if let Some(branch) = else_branch {
                    self.exec_nested(branch, scope)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { cond, body } => {
                while self.eval(cond, scope)?.is_truthy() {
                    match self.exec_nested(body, scope)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Foreach {
                key,
                value,
                iterable,
                body,
            } => {
                let container = self.eval(iterable, scope)?;
                let mut position = 0;
                while let Some((k, v)) = entry_at(&container, position)? {
                    position += 1;
                    let inner = Scope::new(Some(scope.clone()));
                    if let Some(key) = key {
                        inner.declare(key.clone(), k);
                    }
                    inner.declare(value.clone(), v);
                    match self.exec(body, &inner)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Block(stmts) => self.exec_block(stmts, &Scope::new(Some(scope.clone()))),
            Stmt::Empty => Ok(Flow::Normal),
        }
    }

    /// Branch and loop bodies get their own scope
    fn exec_nested(&self, stmt: &Stmt, scope: &Rc<Scope>) -> Result<Flow, String> {
        match stmt {
            Stmt::Block(_) => self.exec(stmt, scope),
            _ => self.exec(stmt, &Scope::new(Some(scope.clone()))),
        }
    }

    fn eval(&self, expr: &Expr, scope: &Rc<Scope>) -> Result<SqValue, String> {
        match expr {
            Expr::Literal(lit) => Ok(match lit {
                Literal::Null => SqValue::Null,
                Literal::Integer(n) => SqValue::Integer(*n),
                Literal::Float(f) => SqValue::Float(*f),
                Literal::Bool(b) => SqValue::Bool(*b),
                Literal::String(s) => SqValue::string(s),
            }),
            Expr::Ident(name) => self.lookup(name, scope),
            Expr::Root(name) => get_slot(&self.vm.root, &SqValue::string(name)),
            Expr::This => Ok(self.this.clone()),
            Expr::Table(entries) => {
                let table = SqValue::new_table();
                for (k, v) in entries {
                    let key = self.eval(k, scope)?;
                    let value = self.eval(v, scope)?;
                    new_slot(&table, key, value)?;
                }
                Ok(table)
            }
            Expr::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(SqValue::new_array(values))
            }
            Expr::Function(func) => Ok(make_closure(func.clone(), Some(scope.clone()))),
            Expr::Member(obj, name) => {
                let container = self.eval(obj, scope)?;
                get_slot(&container, &SqValue::string(name))
            }
            Expr::Index(obj, key) => {
                let container = self.eval(obj, scope)?;
                let key = self.eval(key, scope)?;
                get_slot(&container, &key)
            }
            Expr::Call(callee, args) => {
                let (func, this) = match callee.as_ref() {
                    Expr::Member(obj, name) => {
                        let receiver = self.eval(obj, scope)?;
                        (get_slot(&receiver, &SqValue::string(name))?, receiver)
                    }
                    Expr::Index(obj, key) => {
                        let receiver = self.eval(obj, scope)?;
                        let key = self.eval(key, scope)?;
                        (get_slot(&receiver, &key)?, receiver)
                    }
                    other => (self.eval(other, scope)?, self.this.clone()),
                };
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                self.vm.call_value(&func, this, args)
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand, scope)?;
                match op {
                    UnaryOp::Not => Ok(SqValue::Bool(!value.is_truthy())),
                    UnaryOp::TypeOf => Ok(SqValue::string(value.type_name())),
                    UnaryOp::Neg => match value {
                        SqValue::Integer(n) => Ok(SqValue::Integer(n.wrapping_neg())),
                        SqValue::Float(f) => Ok(SqValue::Float(-f)),
                        other => Err(format!("attempt to negate a '{}'", other.type_name())),
                    },
                }
            }
            Expr::Binary(op, lhs, rhs) => {
                let a = self.eval(lhs, scope)?;
                let b = self.eval(rhs, scope)?;
                binary_op(*op, &a, &b)
            }
            Expr::And(lhs, rhs) => {
                let a = self.eval(lhs, scope)?;
                if a.is_truthy() {
                    self.eval(rhs, scope)
                } else {
                    Ok(a)
                }
            }
            Expr::Or(lhs, rhs) => {
                let a = self.eval(lhs, scope)?;
                if a.is_truthy() {
                    Ok(a)
                } else {
                    self.eval(rhs, scope)
                }
            }
            Expr::Ternary(cond, then_value, else_value) => {
                if self.eval(cond, scope)?.is_truthy() {
                    self.eval(then_value, scope)
                } else {
                    self.eval(else_value, scope)
                }
            }
            Expr::Assign { op, target, value } => self.assign(*op, target, value, scope),
        }
    }

    fn lookup(&self, name: &str, scope: &Rc<Scope>) -> Result<SqValue, String> {
        if let Some(value) = scope.lookup(name) {
            return Ok(value);
        }
        let key = SqValue::string(name);
        for container in [&self.this, &self.vm.root] {
            let found = container.as_table().and_then(|t| t.borrow().get(&key));
            if let Some(value) = found {
                return Ok(value);
            }
        }
        Err(missing_index(&key))
    }

    fn assign(
        &self,
        op: AssignOp,
        target: &Expr,
        value: &Expr,
        scope: &Rc<Scope>,
    ) -> Result<SqValue, String> {
        // Resolve the container and key before evaluating the right-hand side
        let (container, key) = match target {
            Expr::Ident(name) => {
                if let Some(current) = scope.lookup(name) {
                    if op == AssignOp::NewSlot {
                        return Err("can't 'create' a local slot".to_string());
                    }
                    let rhs = self.eval(value, scope)?;
                    let result = combine(op, &current, rhs)?;
                    scope.assign(name, result.clone());
                    return Ok(result);
                }
                let key = SqValue::string(name);
                let container = match op {
                    AssignOp::NewSlot => self.this.clone(),
                    _ => self.owner_of(&key)?,
                };
                (container, key)
            }
            Expr::Root(name) => (self.vm.root.clone(), SqValue::string(name)),
            Expr::Member(obj, name) => (self.eval(obj, scope)?, SqValue::string(name)),
            Expr::Index(obj, key) => (self.eval(obj, scope)?, self.eval(key, scope)?),
            _ => return Err("can't assign expression".to_string()),
        };

        let rhs = self.eval(value, scope)?;
        match op {
            AssignOp::NewSlot => {
                new_slot(&container, key, rhs.clone())?;
                Ok(rhs)
            }
            AssignOp::Set => {
                set_slot(&container, &key, rhs.clone())?;
                Ok(rhs)
            }
            AssignOp::AddSet | AssignOp::SubSet => {
                let current = get_slot(&container, &key)?;
                let result = combine(op, &current, rhs)?;
                set_slot(&container, &key, result.clone())?;
                Ok(result)
            }
        }
    }

    /// The table (`this` or root) that already holds `key`
    fn owner_of(&self, key: &SqValue) -> Result<SqValue, String> {
        [&self.this, &self.vm.root]
            .into_iter()
            .find(|c| c.as_table().is_some_and(|t| t.borrow().contains(key)))
            .cloned()
            .ok_or_else(|| missing_index(key))
    }
}

fn combine(op: AssignOp, current: &SqValue, rhs: SqValue) -> Result<SqValue, String> {
    match op {
        AssignOp::AddSet => binary_op(BinaryOp::Add, current, &rhs),
        AssignOp::SubSet => binary_op(BinaryOp::Sub, current, &rhs),
        AssignOp::NewSlot | AssignOp::Set => Ok(rhs),
    }
}

fn missing_index(key: &SqValue) -> String {
    format!("the index '{}' does not exist", key)
}

/// Read `container[key]`
pub fn get_slot(container: &SqValue, key: &SqValue) -> Result<SqValue, String> {
    if let Some(table) = container.as_table() {
        return table.borrow().get(key).ok_or_else(|| missing_index(key));
    }
    if let Some(array) = container.as_array() {
        return array_index(&array.borrow(), key)
            .and_then(|i| array.borrow().get(i).cloned())
            .ok_or_else(|| missing_index(key));
    }
    if let Some(s) = container.as_sq_string() {
        return match key {
            SqValue::Integer(i) if *i >= 0 => s
                .as_bytes()
                .get(*i as usize)
                .map(|b| SqValue::Integer(*b as i64))
                .ok_or_else(|| missing_index(key)),
            _ => Err(missing_index(key)),
        };
    }
    Err(format!(
        "the index '{}' does not exist in '{}'",
        key,
        container.type_name()
    ))
}

/// Overwrite an existing `container[key]`
pub fn set_slot(container: &SqValue, key: &SqValue, value: SqValue) -> Result<(), String> {
    if let Some(table) = container.as_table() {
        return if table.borrow_mut().set(key, value) {
            Ok(())
        } else {
            Err(missing_index(key))
        };
    }
    if let Some(array) = container.as_array() {
        let mut items = array.borrow_mut();
        return match array_index(&items, key) {
            Some(i) => {
                items[i] = value;
                Ok(())
            }
            None => Err(missing_index(key)),
        };
    }
    Err(format!("cannot set a slot of '{}'", container.type_name()))
}

/// Create or overwrite `container[key]`; only tables grow new slots
pub fn new_slot(container: &SqValue, key: SqValue, value: SqValue) -> Result<(), String> {
    match container.as_table() {
        Some(table) => table.borrow_mut().new_slot(key, value),
        None => Err(format!(
            "trying to create a slot in a '{}'",
            container.type_name()
        )),
    }
}

fn array_index(items: &[SqValue], key: &SqValue) -> Option<usize> {
    match key {
        SqValue::Integer(i) if *i >= 0 && (*i as usize) < items.len() => Some(*i as usize),
        _ => None,
    }
}

/// Key/value pair at iteration position `i`, or None past the end
pub fn entry_at(container: &SqValue, i: usize) -> Result<Option<(SqValue, SqValue)>, String> {
    if let Some(table) = container.as_table() {
        return Ok(table.borrow().entry_at(i));
    }
    if let Some(array) = container.as_array() {
        return Ok(array
            .borrow()
            .get(i)
            .map(|v| (SqValue::Integer(i as i64), v.clone())));
    }
    if let Some(s) = container.as_sq_string() {
        return Ok(s
            .as_bytes()
            .get(i)
            .map(|b| (SqValue::Integer(i as i64), SqValue::Integer(*b as i64))));
    }
    Err(format!("cannot iterate {}", container.type_name()))
}

/// Evaluate a binary operator
pub fn binary_op(op: BinaryOp, a: &SqValue, b: &SqValue) -> Result<SqValue, String> {
    use SqValue::{Float, Integer};

    match op {
        BinaryOp::Eq => return Ok(SqValue::Bool(a.sq_equals(b))),
        BinaryOp::Ne => return Ok(SqValue::Bool(!a.sq_equals(b))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(a, b)?;
            return Ok(SqValue::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }));
        }
        _ => {}
    }

    if op == BinaryOp::Add && (a.as_sq_string().is_some() || b.as_sq_string().is_some()) {
        return Ok(SqValue::string(&format!("{}{}", a, b)));
    }

    match (a, b) {
        (Integer(x), Integer(y)) => match op {
            BinaryOp::Add => Ok(Integer(x.wrapping_add(*y))),
            BinaryOp::Sub => Ok(Integer(x.wrapping_sub(*y))),
            BinaryOp::Mul => Ok(Integer(x.wrapping_mul(*y))),
            BinaryOp::Div if *y == 0 => Err("division by zero".to_string()),
            BinaryOp::Mod if *y == 0 => Err("modulo by zero".to_string()),
            BinaryOp::Div => Ok(Integer(x.wrapping_div(*y))),
            _ => Ok(Integer(x.wrapping_rem(*y))),
        },
        (Integer(_) | Float(_), Integer(_) | Float(_)) => {
            let (x, y) = (as_f64(a), as_f64(b));
            Ok(Float(match op {
                BinaryOp::Add => x + y,
                BinaryOp::Sub => x - y,
                BinaryOp::Mul => x * y,
                BinaryOp::Div => x / y,
                _ => x % y,
            }))
        }
        _ => Err(format!(
            "arith op {} on between '{}' and '{}'",
            op.symbol(),
            a.type_name(),
            b.type_name()
        )),
    }
}

fn as_f64(v: &SqValue) -> f64 {
    match v {
        SqValue::Integer(n) => *n as f64,
        SqValue::Float(f) => *f,
        _ => f64::NAN,
    }
}

fn compare(a: &SqValue, b: &SqValue) -> Result<std::cmp::Ordering, String> {
    match (a, b) {
        (SqValue::Integer(x), SqValue::Integer(y)) => Ok(x.cmp(y)),
        (SqValue::Integer(_) | SqValue::Float(_), SqValue::Integer(_) | SqValue::Float(_)) => {
            as_f64(a)
                .partial_cmp(&as_f64(b))
                .ok_or_else(|| "comparison with NaN".to_string())
        }
        _ => match (a.as_sq_string(), b.as_sq_string()) {
            (Some(x), Some(y)) => Ok(x.as_bytes().cmp(y.as_bytes())),
            _ => Err(format!(
                "comparison between '{}' and '{}'",
                a.type_name(),
                b.type_name()
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_shadowing_and_assign() {
        let outer = Scope::new(None);
        outer.declare("x".into(), SqValue::Integer(1));
        let inner = Scope::new(Some(outer.clone()));
        assert!(matches!(inner.lookup("x"), Some(SqValue::Integer(1))));

        inner.declare("x".into(), SqValue::Integer(2));
        assert!(matches!(inner.lookup("x"), Some(SqValue::Integer(2))));
        assert!(matches!(outer.lookup("x"), Some(SqValue::Integer(1))));

        assert!(inner.assign("x", SqValue::Integer(3)));
        assert!(matches!(outer.lookup("x"), Some(SqValue::Integer(1))));
        assert!(!inner.assign("missing", SqValue::Null));
    }

    #[test]
    fn test_integer_arithmetic() {
        let r = binary_op(BinaryOp::Add, &SqValue::Integer(2), &SqValue::Integer(3)).unwrap();
        assert!(matches!(r, SqValue::Integer(5)));
        let r = binary_op(BinaryOp::Div, &SqValue::Integer(7), &SqValue::Integer(2)).unwrap();
        assert!(matches!(r, SqValue::Integer(3)));
    }

    #[test]
    fn test_mixed_arithmetic_promotes_to_float() {
        let r = binary_op(BinaryOp::Mul, &SqValue::Integer(2), &SqValue::Float(1.5)).unwrap();
        assert!(matches!(r, SqValue::Float(f) if f == 3.0));
    }

    #[test]
    fn test_division_by_zero() {
        let err = binary_op(BinaryOp::Div, &SqValue::Integer(1), &SqValue::Integer(0)).unwrap_err();
        assert_eq!(err, "division by zero");
        let r = binary_op(BinaryOp::Div, &SqValue::Float(1.0), &SqValue::Integer(0)).unwrap();
        assert!(matches!(r, SqValue::Float(f) if f.is_infinite()));
    }

    #[test]
    fn test_string_concatenation() {
        let r = binary_op(BinaryOp::Add, &SqValue::string("a"), &SqValue::Integer(1)).unwrap();
        assert_eq!(r.to_string(), "a1");
    }

    #[test]
    fn test_arith_type_error() {
        let err = binary_op(BinaryOp::Sub, &SqValue::new_table(), &SqValue::Integer(1)).unwrap_err();
        assert_eq!(err, "arith op - on between 'table' and 'integer'");
    }

    #[test]
    fn test_comparisons() {
        let r = binary_op(BinaryOp::Lt, &SqValue::Integer(1), &SqValue::Float(1.5)).unwrap();
        assert!(matches!(r, SqValue::Bool(true)));
        let r = binary_op(BinaryOp::Ge, &SqValue::string("b"), &SqValue::string("a")).unwrap();
        assert!(matches!(r, SqValue::Bool(true)));
        assert!(binary_op(BinaryOp::Lt, &SqValue::Null, &SqValue::Integer(1)).is_err());
    }

    #[test]
    fn test_slots_on_arrays() {
        let array = SqValue::new_array(vec![SqValue::Integer(10)]);
        assert!(matches!(
            get_slot(&array, &SqValue::Integer(0)),
            Ok(SqValue::Integer(10))
        ));
        assert!(get_slot(&array, &SqValue::Integer(1)).is_err());
        assert!(set_slot(&array, &SqValue::Integer(0), SqValue::Bool(true)).is_ok());
        assert!(new_slot(&array, SqValue::Integer(1), SqValue::Null).is_err());
    }

    #[test]
    fn test_entry_at_rejects_scalars() {
        assert!(entry_at(&SqValue::Integer(1), 0).is_err());
        let array = SqValue::new_array(vec![SqValue::Integer(10)]);
        assert!(entry_at(&array, 1).unwrap().is_none());
    }
}
