//! End-to-end tests for host bindings driven through scripts

use nutbind::{
    Array, Class, Error, Function, Instance, Libs, Null, Object, ObjectType, Result, Table,
    ToScript, Vm, VmOptions,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Debug)]
struct Point {
    x: i64,
    y: i64,
}

/// Routes library logs to the test output; filter with `RUST_LOG`
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn eval(vm: &Vm, source: &str) -> Result<Object> {
    init_tracing();
    let script = vm.compile_source(source, "test.nut")?;
    vm.evaluate(&script)
}

fn run(vm: &Vm, source: &str) -> Result<()> {
    init_tracing();
    let script = vm.compile_source(source, "test.nut")?;
    vm.run(&script)
}

fn register_point(vm: &Vm) -> Class {
    let class = vm
        .add_class("Point", |x: i64, y: i64| Point { x, y })
        .unwrap();
    class
        .add_var("x", |p: &Point| p.x, |p: &mut Point, v: i64| p.x = v)
        .unwrap();
    class
        .add_var("y", |p: &Point| p.y, |p: &mut Point, v: i64| p.y = v)
        .unwrap();
    class
}

// ===== Classes =====

#[test]
fn test_bound_class_member_variable() {
    let vm = Vm::default();
    register_point(&vm);
    let value = eval(&vm, "local p = Point(3, 4); return p.x").unwrap();
    assert_eq!(value.to::<i64>().unwrap(), 3);
}

#[test]
fn test_member_variable_write_reaches_host_object() {
    let vm = Vm::default();
    register_point(&vm);
    let value = eval(&vm, "local p = Point(1, 2); p.y = 10; return p").unwrap();
    let instance = Instance::try_from(value).unwrap();
    let point = instance.borrow::<Point>().unwrap();
    assert_eq!(point.borrow().x, 1);
    assert_eq!(point.borrow().y, 10);
}

#[test]
fn test_methods_and_static_functions() {
    let vm = Vm::default();
    let class = register_point(&vm);
    class
        .add_func("len2", |p: &mut Point| p.x * p.x + p.y * p.y, false)
        .unwrap();
    class
        .add_func(
            "shift",
            |p: &mut Point, dx: i64, dy: i64| {
                p.x += dx;
                p.y += dy;
            },
            false,
        )
        .unwrap();
    class
        .add_static_func("describe", |x: i64, y: i64| format!("({}, {})", x, y))
        .unwrap();

    let value = eval(&vm, "local p = Point(3, 4); p.shift(1, 1); return p.len2()").unwrap();
    assert_eq!(value.to::<i64>().unwrap(), 41);

    let text = eval(&vm, "return Point.describe(1, 2)").unwrap();
    assert_eq!(text.to::<String>().unwrap(), "(1, 2)");
    assert_eq!(class.find_func("len2").unwrap().get_num_of_params().unwrap(), 0);
}

#[test]
fn test_const_var_rejects_writes() {
    let vm = Vm::default();
    let class = register_point(&vm);
    class.add_const_var("sum", |p: &Point| p.x + p.y).unwrap();

    let value = eval(&vm, "return Point(2, 5).sum").unwrap();
    assert_eq!(value.to::<i64>().unwrap(), 7);

    let err = run(&vm, "local p = Point(1, 1)\np.sum = 3").unwrap_err();
    match err {
        Error::Runtime { message, line, .. } => {
            assert_eq!(message, "member variable 'sum' is read-only");
            assert_eq!(line, 2);
        }
        other => panic!("expected a runtime error, got {:?}", other),
    }

    let err = run(&vm, "local p = Point(1, 1)\np.nope = 3").unwrap_err();
    assert!(err.to_string().ends_with("the index 'nope' does not exist"));
}

#[test]
fn test_class_chain() {
    struct A;
    struct B;
    struct C;
    struct D;

    let vm = Vm::default();
    let a = vm.add_abstract_class::<A>("A").unwrap();
    let b = vm.add_abstract_class_with_base::<B>("B", &a).unwrap();
    let c = vm.add_abstract_class_with_base::<C>("C", &b).unwrap();
    let d = vm.add_abstract_class::<D>("D").unwrap();

    assert!(c.is_derived_from(&a).unwrap());
    assert!(c.is_derived_from(&b).unwrap());
    assert!(b.is_derived_from(&a).unwrap());
    assert!(!a.is_derived_from(&c).unwrap());
    assert!(!a.is_derived_from(&b).unwrap());
    for class in [&a, &b, &c] {
        assert!(!d.is_derived_from(class).unwrap());
        assert!(!class.is_derived_from(&d).unwrap());
    }
    assert!(!c.is_derived_from(&c).unwrap());

    assert_eq!(c.get_base().unwrap(), b);
    assert_eq!(a.get_base().unwrap(), Class::default());
    assert_eq!(vm.find_class("C").unwrap(), c);
}

#[test]
fn test_base_variables_bound_later_reach_subclass() {
    struct Shape {
        id: i64,
        side: i64,
    }

    let vm = Vm::default();
    let base = vm.add_class("Shape", |side: i64| Shape { id: 1, side }).unwrap();
    let square = vm
        .add_class_with_base("Square", &base, |side: i64| Shape { id: 2, side })
        .unwrap();
    square
        .add_const_var("area", |s: &Shape| s.side * s.side)
        .unwrap();
    base.add_var("id", |s: &Shape| s.id, |s: &mut Shape, v: i64| s.id = v)
        .unwrap();

    assert_eq!(eval(&vm, "return Square(4).id").unwrap().to::<i64>().unwrap(), 2);
    let value = eval(&vm, "local s = Square(4); s.id = 7; return s.area + s.id").unwrap();
    assert_eq!(value.to::<i64>().unwrap(), 23);

    let err = eval(&vm, "return Square(1).missing").unwrap_err();
    assert!(err.to_string().contains("the index 'missing' does not exist"));
}

#[test]
fn test_script_class_extends_bound_class() {
    let vm = Vm::default();
    register_point(&vm);
    let source = r#"
        class Point3 extends Point {
            function sum() { return this.x + this.y }
        }
        local p = Point3(2, 3)
        return p.sum()
    "#;
    assert_eq!(eval(&vm, source).unwrap().to::<i64>().unwrap(), 5);
}

#[test]
fn test_release_class_drops_host_object_with_instance() {
    struct Tracked(Rc<Cell<bool>>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.set(true);
        }
    }

    let dropped = Rc::new(Cell::new(false));
    let vm = Vm::default();
    let flag = dropped.clone();
    vm.add_class("Tracked", move || Tracked(flag.clone())).unwrap();

    run(&vm, "local t = Tracked()").unwrap();
    assert!(dropped.get());
}

#[test]
fn test_no_release_class_shares_host_object() {
    struct Counter {
        hits: i64,
    }

    let shared = Rc::new(RefCell::new(Counter { hits: 0 }));
    let vm = Vm::default();
    let handed_out = shared.clone();
    let class = vm
        .add_class_no_release("Counter", move || handed_out.clone())
        .unwrap();
    class
        .add_func(
            "hit",
            |c: &mut Counter| {
                c.hits += 1;
                c.hits
            },
            false,
        )
        .unwrap();

    run(&vm, "local c = Counter(); c.hit(); c.hit()").unwrap();
    assert_eq!(shared.borrow().hits, 2);

    vm.close();
    assert_eq!(Rc::strong_count(&shared), 1);
    assert_eq!(shared.borrow().hits, 2);
}

#[test]
fn test_host_objects_cross_the_boundary() {
    let vm = Vm::default();
    register_point(&vm);
    vm.add_func("origin", || Rc::new(RefCell::new(Point { x: 0, y: 7 })))
        .unwrap();
    vm.add_func("manhattan", |p: Rc<RefCell<Point>>| {
        let p = p.borrow();
        p.x.abs() + p.y.abs()
    })
    .unwrap();

    assert_eq!(eval(&vm, "return origin().y").unwrap().to::<i64>().unwrap(), 7);
    assert_eq!(
        eval(&vm, "return manhattan(Point(-2, 3))").unwrap().to::<i64>().unwrap(),
        5
    );

    let err = run(&vm, "manhattan({})").unwrap_err();
    assert!(matches!(err, Error::Runtime { .. }));
}

#[test]
fn test_instance_view() {
    struct Other;

    let vm = Vm::default();
    let class = register_point(&vm);
    let instance: Instance = eval(&vm, "return Point(5, 6)").unwrap().try_into().unwrap();
    assert_eq!(instance.get_class().unwrap(), class);
    assert_eq!(instance.borrow::<Point>().unwrap().borrow().x, 5);
    assert!(matches!(
        instance.borrow::<Other>(),
        Err(Error::Type { .. })
    ));
}

// ===== Functions =====

#[test]
fn test_param_check_runs_before_host_code() {
    let vm = Vm::default();
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    vm.add_func("twice", move |n: i64| {
        counter.set(counter.get() + 1);
        n * 2
    })
    .unwrap();

    let err = run(&vm, "twice(\"text\")").unwrap_err();
    match err {
        Error::Runtime { message, .. } => {
            assert_eq!(
                message,
                "parameter 1 has an invalid type 'string' ; expected: 'integer'"
            );
        }
        other => panic!("expected a runtime error, got {:?}", other),
    }
    assert!(run(&vm, "twice(1, 2)").is_err());
    assert!(run(&vm, "twice()").is_err());
    assert_eq!(calls.get(), 0);

    assert_eq!(eval(&vm, "return twice(21)").unwrap().to::<i64>().unwrap(), 42);
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_host_error_becomes_script_error() {
    let vm = Vm::default();
    vm.add_func("fail", |reason: String| -> std::result::Result<i64, String> {
        Err(reason)
    })
    .unwrap();

    let caught = eval(
        &vm,
        r#"
        local caught = null
        try { fail("disk full") } catch (e) { caught = e }
        return caught
        "#,
    )
    .unwrap();
    assert_eq!(caught.to::<String>().unwrap(), "disk full");

    let err = run(&vm, "fail(\"boom\")").unwrap_err();
    assert_eq!(
        err,
        Error::Runtime {
            message: "boom".to_string(),
            source_name: "test.nut".to_string(),
            function: "unknown".to_string(),
            line: 1,
        }
    );
    assert_eq!(vm.last_runtime_error(), Some(err));
}

#[test]
fn test_host_panic_becomes_script_error() {
    let vm = Vm::default();
    vm.add_func("explode", || -> i64 { panic!("kaboom") }).unwrap();
    let caught = eval(
        &vm,
        "local m = null\ntry { explode() } catch (e) { m = e }\nreturn m",
    )
    .unwrap();
    assert_eq!(caught.to::<String>().unwrap(), "kaboom");
    assert_eq!(vm.get_top(), 0);
}

#[test]
fn test_call_script_function_from_host() {
    let vm = Vm::default();
    run(&vm, "function greet(name, times) { return name + times }").unwrap();
    let greet = vm.find_func("greet").unwrap();
    assert_eq!(greet.get_num_of_params().unwrap(), 2);

    let result = vm.call_func(&greet, &vm.root_table(), ("x", 3)).unwrap();
    assert_eq!(result.to::<String>().unwrap(), "x3");
    assert_eq!(vm.get_top(), 0);
}

#[test]
fn test_failed_call_reports_runtime_error() {
    let vm = Vm::default();
    run(&vm, "function broken() {\n  return missing + 1\n}").unwrap();
    let broken = vm.find_func("broken").unwrap();
    let err = broken.call(&vm.root_table(), ()).unwrap_err();
    assert_eq!(
        err,
        Error::Runtime {
            message: "the index 'missing' does not exist".to_string(),
            source_name: "test.nut".to_string(),
            function: "broken".to_string(),
            line: 2,
        }
    );
}

#[test]
fn test_reentrant_calls_are_bounded() {
    let vm = Vm::new(VmOptions {
        max_call_depth: 32,
        ..VmOptions::default()
    });
    let root = vm.root_table();
    vm.add_func("recurse", move |n: i64| -> Result<i64> {
        let down: Function = root.find_func("down")?;
        down.call(&root, (n + 1,))?.to::<i64>()
    })
    .unwrap();
    run(&vm, "function down(n) { return recurse(n) }").unwrap();

    let err = run(&vm, "down(0)").unwrap_err();
    assert!(err.to_string().contains("stack overflow"), "{}", err);
    assert_eq!(vm.get_top(), 0);
    assert_eq!(eval(&vm, "return 1").unwrap().to::<i64>().unwrap(), 1);
}

// ===== Errors =====

#[test]
fn test_compile_error_carries_location() {
    let vm = Vm::default();
    let err = vm
        .compile_source("local x = 1\nlocal = 2", "bad.nut")
        .unwrap_err();
    match &err {
        Error::Compile {
            source_name, line, ..
        } => {
            assert_eq!(source_name, "bad.nut");
            assert_eq!(*line, 2);
        }
        other => panic!("expected a compile error, got {:?}", other),
    }
    assert_eq!(vm.last_compile_error(), Some(err));
}

#[test]
fn test_deeply_nested_source_is_a_compile_error() {
    let vm = Vm::default();
    let source = format!("return {}1{}", "(".repeat(200_000), ")".repeat(200_000));
    match vm.compile_source(&source, "deep.nut").unwrap_err() {
        Error::Compile {
            message,
            source_name,
            line,
            ..
        } => {
            assert!(message.contains("nesting too deep"));
            assert_eq!(source_name, "deep.nut");
            assert_eq!(line, 1);
        }
        other => panic!("expected a compile error, got {:?}", other),
    }
    assert_eq!(vm.get_top(), 0);
}

#[test]
fn test_undefined_function_has_unknown_caller() {
    let vm = Vm::default();
    let err = run(&vm, "local a = 1\nundefined_fn()").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Runtime error at (unknown) test.nut:2: the index 'undefined_fn' does not exist"
    );
}

#[test]
fn test_error_slots_keep_the_latest_error() {
    let vm = Vm::default();
    assert!(vm.last_runtime_error().is_none());
    run(&vm, "first()").unwrap_err();
    run(&vm, "second()").unwrap_err();
    match vm.last_runtime_error() {
        Some(Error::Runtime { message, .. }) => {
            assert_eq!(message, "the index 'second' does not exist")
        }
        other => panic!("unexpected slot {:?}", other),
    }
}

#[test]
fn test_compile_file() {
    use std::io::Write;

    let vm = Vm::default();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "local n = 6").unwrap();
    writeln!(file, "return n * 7").unwrap();

    let script = vm.compile_file(file.path()).unwrap();
    assert_eq!(vm.evaluate(&script).unwrap().to::<i64>().unwrap(), 42);

    let missing = file.path().with_extension("missing");
    match vm.compile_file(&missing).unwrap_err() {
        Error::Compile { line, column, .. } => assert_eq!((line, column), (0, 0)),
        other => panic!("expected a compile error, got {:?}", other),
    }
}

// ===== Handles =====

#[test]
fn test_table_round_trip() {
    let vm = Vm::default();
    let table = Table::new(&vm).unwrap();
    table.set("name", "nut").unwrap();
    table.set("count", 3).unwrap();
    table.set("nothing", Null).unwrap();
    assert_eq!(table.get::<String>("name").unwrap(), "nut");
    assert_eq!(table.get::<i64>("count").unwrap(), 3);
    assert!(table.get::<Option<i64>>("nothing").unwrap().is_none());
    assert_eq!(table.size().unwrap(), 3);

    let err = table.get::<i64>("name").unwrap_err();
    assert_eq!(err.to_string(), "Type error bad cast expected: INTEGER got: STRING");
}

#[test]
fn test_array_methods_with_conversion_traits_in_scope() {
    fn push_all<V: ToScript + Clone>(array: &Array, values: &[V]) {
        for value in values {
            array.push(value.clone()).unwrap();
        }
    }

    let vm = Vm::default();
    let array = Array::new(&vm, 0).unwrap();
    push_all(&array, &[3i64, 5, 8]);
    array.push("tail").unwrap();
    assert_eq!(array.pop::<String>().unwrap(), "tail");
    assert_eq!(array.to_vec::<i64>().unwrap(), vec![3, 5, 8]);

    vm.set("fib", array.clone()).unwrap();
    let sum = eval(&vm, "local t = 0; foreach (v in fib) t += v; return t").unwrap();
    assert_eq!(sum.to::<i64>().unwrap(), 16);
}

#[test]
fn test_reference_counting() {
    let vm = Vm::default();
    let table = Table::new(&vm).unwrap();
    assert_eq!(table.ref_count(), 1);

    let copy = table.clone();
    assert_eq!(table.ref_count(), 2);
    drop(copy);
    assert_eq!(table.ref_count(), 1);

    vm.set("global", &table).unwrap();
    assert_eq!(table.ref_count(), 2);
    let moved = table;
    assert_eq!(moved.ref_count(), 2);
}

#[test]
fn test_typed_view_mismatch() {
    let vm = Vm::default();
    let object = eval(&vm, "return [1, 2]").unwrap();
    assert_eq!(object.get_type(), ObjectType::Array);
    let err = Table::try_from(object.clone()).unwrap_err();
    assert_eq!(err.to_string(), "Type error bad cast expected: TABLE got: ARRAY");

    let array = Array::try_from(object).unwrap();
    assert_eq!(array.to_vec::<i64>().unwrap(), vec![1, 2]);
}

#[test]
fn test_handles_fail_after_close() {
    let vm = Vm::default();
    let table = vm.add_table("config").unwrap();
    table.set("level", 1).unwrap();
    vm.close();

    assert_eq!(table.get::<i64>("level").unwrap_err(), Error::Runtime {
        message: "VM is not initialised".to_string(),
        source_name: "null".to_string(),
        function: "unknown".to_string(),
        line: 0,
    });
    assert!(Table::new(&vm).is_err());

    let orphan = {
        let vm = Vm::default();
        vm.root_table()
    };
    assert!(orphan.size().is_err());
}

#[test]
fn test_enums_and_libs() {
    let vm = Vm::new(VmOptions {
        libs: Libs::MATH,
        ..VmOptions::default()
    });
    let level = vm.add_enum("Level").unwrap();
    level.add_slot("High", 9).unwrap();
    assert_eq!(eval(&vm, "return abs(-Level.High)").unwrap().to::<i64>().unwrap(), 9);

    let plain = Vm::default();
    assert!(eval(&plain, "return abs(-1)").is_err());
}

#[test]
fn test_print_func_override() {
    let vm = Vm::default();
    let out = Rc::new(RefCell::new(Vec::new()));
    let sink = out.clone();
    vm.set_print_func(move |s| sink.borrow_mut().push(s.to_string()));
    run(&vm, "print(\"hi\")").unwrap();
    assert_eq!(*out.borrow(), vec!["hi".to_string()]);
}
