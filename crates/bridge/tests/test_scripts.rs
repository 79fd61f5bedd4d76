//! Running scripts, calling closures and exposing host functions

use squirrel::{Collection, Error, Table, Value, Vm};

#[test]
fn test_execute_returns_values() {
    let vm = Vm::new();
    assert_eq!(vm.execute("return 123").unwrap(), Value::Int(123));
    assert_eq!(vm.execute("return true").unwrap(), Value::Bool(true));
    assert_eq!(vm.execute("return 1.5").unwrap(), Value::Float(1.5));
    assert_eq!(vm.execute("return \"text\"").unwrap(), Value::from("text"));
    assert_eq!(vm.execute("return").unwrap(), Value::Null);
    assert_eq!(vm.execute("local a = 1").unwrap(), Value::Null);
    assert_eq!(vm.stack().top(), 0);
}

#[test]
fn test_execute_returns_table() {
    let vm = Vm::new();
    let table = vm
        .execute("return { x = 123, y = true }")
        .unwrap()
        .as_table()
        .unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.get("x"), Value::Int(123));
    assert_eq!(table.get("y"), Value::Bool(true));
    assert_eq!(table.get("z"), Value::Null);
    assert_eq!(vm.stack().top(), 0);
}

#[test]
fn test_compile_error() {
    let vm = Vm::new();
    let err = vm.execute("&*^$!@").unwrap_err();
    assert!(matches!(err, Error::Compile(_)), "got {:?}", err);
    assert!(!err.message().is_empty());
    assert!(err.to_string().starts_with("Compile error: buffer:1:1: "));
    assert_eq!(vm.stack().top(), 0);
}

#[test]
fn test_runtime_error_leaves_stack_balanced() {
    let vm = Vm::new();
    let err = vm.execute("return missing").unwrap_err();
    assert_eq!(
        err,
        Error::Runtime("the index 'missing' does not exist".to_string())
    );
    assert_eq!(vm.stack().top(), 0);

    // The VM stays usable
    assert_eq!(vm.execute("return 2").unwrap(), Value::Int(2));
}

#[test]
fn test_closure_receiver() {
    let vm = Vm::new();
    let closure = vm
        .execute("a <- 123; return function(b) { return this.a + b }")
        .unwrap()
        .as_closure()
        .unwrap();

    assert_eq!(closure.call(&[Value::Int(1)]).unwrap(), Value::Int(124));

    let receiver = Table::new(&vm);
    receiver.insert("a", 456);
    assert_eq!(
        closure.call_with(&receiver, &[Value::Int(1)]).unwrap(),
        Value::Int(457)
    );
    assert_eq!(vm.stack().top(), 0);
}

#[test]
fn test_closure_arguments_and_errors() {
    let vm = Vm::new();
    let add = vm
        .execute("return function(a, b) { return a + b }")
        .unwrap()
        .as_closure()
        .unwrap();
    assert_eq!(add.call(&[1.into(), 2.into()]).unwrap(), Value::Int(3));
    assert_eq!(
        add.call(&["a".into(), "b".into()]).unwrap(),
        Value::from("ab")
    );

    let err = add.call(&[Value::Int(1)]).unwrap_err();
    assert!(matches!(err, Error::Runtime(_)));
    assert_eq!(vm.stack().top(), 0);
}

#[test]
fn test_closures_returned_from_closures() {
    let vm = Vm::new();
    let make = vm
        .execute(
            "return function(start) {
                local n = start
                return function() { n += 1; return n }
            }",
        )
        .unwrap()
        .as_closure()
        .unwrap();
    let counter = make.call(&[Value::Int(10)]).unwrap().as_closure().unwrap();
    drop(make);
    assert_eq!(counter.call(&[]).unwrap(), Value::Int(11));
    assert_eq!(counter.call(&[]).unwrap(), Value::Int(12));
    assert_eq!(vm.stack().top(), 0);
}

fn length<'a>(_: &'a Vm, args: &[Value<'a>]) -> Result<Value<'a>, String> {
    match args {
        [Value::String(s)] => Ok(Value::Int(s.chars().count() as i64)),
        _ => Err("length expects one string".to_string()),
    }
}

#[test]
fn test_native_function_item() {
    let vm = Vm::new();
    assert!(vm.register_function("length", length));
    assert_eq!(
        vm.execute("return length(\"héllo\")").unwrap(),
        Value::Int(5)
    );

    let err = vm.execute("return length(1, 2)").unwrap_err();
    assert_eq!(err.message(), "length expects one string");
    assert_eq!(vm.stack().top(), 0);
}

#[test]
fn test_native_panic_becomes_runtime_error() {
    let vm = Vm::new();
    vm.register_function("explode", |_, _| panic!("boom"));
    let err = vm.execute("return explode()").unwrap_err();
    assert!(matches!(err, Error::Runtime(_)));
    assert!(err.message().contains("boom"), "got {}", err);
    assert_eq!(vm.stack().top(), 0);

    assert_eq!(vm.execute("return 1").unwrap(), Value::Int(1));
}

#[test]
fn test_native_returns_objects() {
    let vm = Vm::new();
    vm.register_function("pair", |vm, args| {
        let table = Table::new(vm);
        table.insert("first", args.first().cloned().unwrap_or(Value::Null));
        table.insert("second", args.get(1).cloned().unwrap_or(Value::Null));
        Ok(table.into())
    });
    let result = vm
        .execute("local p = pair(1, \"b\"); return p.first + p.second")
        .unwrap();
    assert_eq!(result, Value::from("1b"));
    assert_eq!(vm.stack().top(), 0);
}

#[test]
fn test_native_is_visible_from_host_closure() {
    let vm = Vm::new();
    vm.register_function("double", |_, args| {
        Ok(args.first().cloned().unwrap_or(Value::Null) * Value::Int(2))
    });
    let native = vm.root_table().get("double").as_closure().unwrap();
    assert_eq!(native.call(&[Value::Int(21)]).unwrap(), Value::Int(42));
    assert_eq!(vm.stack().top(), 0);
}
