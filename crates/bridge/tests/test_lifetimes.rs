//! Handle lifetimes, reference counts and VM configuration

use squirrel::{Error, Object, ObjectKind, Table, Value, Vm, VmConfig};
use squirrel_vm::{sq_pushuserpointer, sq_settop};
use std::io::Write;

#[test]
fn test_handles_to_same_slot_are_equal() {
    let vm = Vm::new();
    vm.execute("data <- { n = 1 }").unwrap();
    let root = vm.root_table();
    let a = root.get("data").into_object().unwrap();
    let b = root.get("data").into_object().unwrap();
    assert_eq!(a, b);
    assert_eq!(a.kind(), Some(ObjectKind::Table));
    assert_eq!(a.ref_count(), 2);

    drop(a);
    assert_eq!(b.ref_count(), 1);
    let table = Table::try_from(b).unwrap();
    assert_eq!(table.get("n"), Value::Int(1));
}

#[test]
fn test_handle_outlives_script_reference() {
    let vm = Vm::new();
    vm.execute("cache <- { hits = 3 }").unwrap();
    let cache = vm.root_table().get("cache").as_table().unwrap();

    vm.root_table().remove("cache");
    assert!(vm.execute("return cache").is_err());
    assert_eq!(cache.get("hits"), Value::Int(3));
}

#[test]
fn test_replace_moves_reference() {
    let vm = Vm::new();
    let first: Object = Table::new(&vm).into();
    let second: Object = Table::new(&vm).into();
    let mut handle = first.clone();
    assert_eq!(first.ref_count(), 2);

    handle.replace(&second);
    assert_eq!(first.ref_count(), 1);
    assert_eq!(second.ref_count(), 2);
    assert_eq!(handle, second);
    assert_ne!(handle, first);
}

#[test]
fn test_objects_from_different_vms() {
    let vm1 = Vm::new();
    let vm2 = Vm::new();
    let a: Object = Table::new(&vm1).into();
    let b: Object = Table::new(&vm2).into();
    assert_ne!(a, b);
}

#[test]
#[should_panic(expected = "another VM")]
fn test_push_foreign_object_panics() {
    let vm1 = Vm::new();
    let vm2 = Vm::new();
    let table = Table::new(&vm1);
    vm2.stack().push(&Value::from(table));
}

#[test]
fn test_unmodelled_types_read_as_null() {
    let vm = Vm::new();
    let stack = vm.stack();
    unsafe { sq_pushuserpointer(vm.raw(), std::ptr::null_mut()) };
    assert_eq!(stack.top(), 1);
    assert_eq!(stack.read(-1), Value::Null);
    assert!(stack.object_at(-1).is_none());
    unsafe { sq_settop(vm.raw(), 0) };
}

#[test]
fn test_stack_guard_restores_depth() {
    let vm = Vm::new();
    let stack = vm.stack();
    stack.push(&Value::Int(1));
    {
        let guard = stack.guard();
        assert_eq!(guard.saved_top(), 1);
        stack.push(&Value::Int(2));
        stack.push(&Value::Int(3));
        assert_eq!(stack.top(), 3);
    }
    assert_eq!(stack.top(), 1);
    stack.pop(1);
    assert_eq!(stack.top(), 0);
}

#[test]
fn test_vm_drop_after_handles() {
    let vm = Vm::new();
    {
        let table = Table::new(&vm);
        table.insert("nested", Table::new(&vm));
        let _closure = vm
            .execute("return function() { return 1 }")
            .unwrap()
            .as_closure()
            .unwrap();
    }
    drop(vm);
}

#[test]
fn test_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "stack_size = 64").unwrap();
    writeln!(file, "buffer_name = \"boot.nut\"").unwrap();

    let config = VmConfig::load(file.path()).unwrap();
    assert_eq!(config.stack_size, 64);
    assert_eq!(config.buffer_name, "boot.nut");

    let vm = Vm::with_config(&config);
    let err = vm.execute("return )").unwrap_err();
    assert!(matches!(err, Error::Compile(_)));
    assert!(err.message().starts_with("boot.nut:1:"), "got {}", err);
}

#[test]
fn test_config_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = VmConfig::load(dir.path().join("absent.toml"));
    assert!(result.is_err());
}
