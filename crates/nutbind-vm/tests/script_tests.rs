//! End-to-end tests for the interpreter driven through the stack API

use nutbind_vm::{RawVm, RuntimeErrorInfo, Value, VmError, VmOptions, VmResult};
use std::cell::RefCell;
use std::rc::Rc;

fn run(vm: &RawVm, source: &str) -> VmResult<Value> {
    vm.compile_buffer(source, "test.nut", true)
        .map_err(|e| VmError::msg(e.to_string()))?;
    vm.push_root_table();
    let result = vm.call(1, true, true);
    let value = match result {
        Ok(()) => {
            let value = vm.stack_value(-1)?;
            vm.pop(1);
            Ok(value)
        }
        Err(err) => Err(err),
    };
    vm.pop(1);
    value
}

fn int(vm: &RawVm, source: &str) -> i64 {
    match run(vm, source).unwrap() {
        Value::Integer(i) => i,
        other => panic!("expected integer, got {:?}", other),
    }
}

fn open() -> RawVm {
    RawVm::open(VmOptions::default())
}

// ===== Expressions =====

#[test]
fn test_arithmetic_and_precedence() {
    let vm = open();
    assert_eq!(int(&vm, "return 1 + 2 * 3 - 4 / 2"), 5);
    assert_eq!(int(&vm, "return (1 + 2) * 3 % 5"), 4);
    assert_eq!(int(&vm, "return -3 + 10"), 7);
}

#[test]
fn test_mixed_numbers_promote_to_float() {
    let vm = open();
    let value = run(&vm, "return 1 + 0.5").unwrap();
    assert!(value.raw_equal(&Value::Float(1.5)));
}

#[test]
fn test_string_concatenation() {
    let vm = open();
    let value = run(&vm, "return \"n=\" + 4").unwrap();
    assert_eq!(value.to_display_string(), "n=4");
}

#[test]
fn test_division_by_zero_is_an_error() {
    let vm = open();
    let err = run(&vm, "return 1 / 0").unwrap_err();
    assert_eq!(err.to_string(), "division by zero");
}

#[test]
fn test_logical_operators_short_circuit() {
    let vm = open();
    assert_eq!(int(&vm, "local x = 0; false && (x = 1); return x"), 0);
    assert_eq!(int(&vm, "return null || 7"), 7);
    assert_eq!(int(&vm, "return 1 < 2 ? 10 : 20"), 10);
}

#[test]
fn test_typeof() {
    let vm = open();
    let value = run(&vm, "return typeof [1, 2]").unwrap();
    assert_eq!(value.to_display_string(), "array");
}

// ===== Statements =====

#[test]
fn test_functions_and_recursion() {
    let vm = open();
    let source = r#"
        function fib(n) {
            if (n < 2) return n
            return fib(n - 1) + fib(n - 2)
        }
        return fib(10)
    "#;
    assert_eq!(int(&vm, source), 55);
}

#[test]
fn test_loops() {
    let vm = open();
    let source = r#"
        local total = 0
        for (local i = 0; i < 10; i++) {
            if (i == 5) continue
            if (i == 8) break
            total += i
        }
        local j = 0
        while (j < 3) j++
        return total + j
    "#;
    assert_eq!(int(&vm, source), 1 + 2 + 3 + 4 + 6 + 7 + 3);
}

#[test]
fn test_foreach_over_table_and_array() {
    let vm = open();
    let source = r#"
        local sum = 0
        foreach (v in [1, 2, 3]) sum += v
        foreach (k, v in { a = 10, b = 20 }) sum += v
        return sum
    "#;
    assert_eq!(int(&vm, source), 36);
}

#[test]
fn test_try_catch_receives_thrown_value() {
    let vm = open();
    let source = r#"
        local caught = null
        try {
            throw "boom"
        } catch (e) {
            caught = e
        }
        return caught
    "#;
    assert_eq!(run(&vm, source).unwrap().to_display_string(), "boom");
}

#[test]
fn test_assigning_undeclared_global_fails() {
    let vm = open();
    let err = run(&vm, "undeclared = 1").unwrap_err();
    assert_eq!(err.to_string(), "the index 'undeclared' does not exist");
    assert_eq!(int(&vm, "declared <- 1; declared = 2; return declared"), 2);
}

// ===== Classes =====

#[test]
fn test_class_constructor_and_methods() {
    let vm = open();
    let source = r#"
        class Counter {
            count = 0
            static created = 0
            constructor(start) { count = start }
            function bump() { count += 1; return count }
        }
        local c = Counter(5)
        c.bump()
        return c.bump()
    "#;
    assert_eq!(int(&vm, source), 7);
}

#[test]
fn test_class_inheritance() {
    let vm = open();
    let source = r#"
        class Animal { function legs() { return 4 } }
        class Bird extends Animal { function wings() { return 2 } }
        local b = Bird()
        return b.legs() + b.wings()
    "#;
    assert_eq!(int(&vm, source), 6);
}

#[test]
fn test_instances_reject_unknown_fields() {
    let vm = open();
    let err = run(&vm, "class P { x = 1 }\nlocal p = P()\np.y = 2").unwrap_err();
    assert_eq!(err.to_string(), "the index 'y' does not exist");
}

#[test]
fn test_get_and_set_metamethods() {
    let vm = open();
    let source = r#"
        class Proxy {
            store = null
            constructor() { store = {} }
            function _get(key) { return store[key] }
            function _set(key, value) { store[key] <- value }
        }
        local p = Proxy()
        p.answer = 42
        return p.answer
    "#;
    assert_eq!(int(&vm, source), 42);
}

// ===== Errors =====

#[test]
fn test_runtime_error_handler_reports_innermost_frame() {
    let vm = open();
    let seen: Rc<RefCell<Vec<RuntimeErrorInfo>>> = Rc::default();
    let sink = seen.clone();
    vm.set_runtime_error_handler(Some(Rc::new(move |info: &RuntimeErrorInfo| {
        sink.borrow_mut().push(info.clone());
    })));

    let source = "function inner() {\n  return missing()\n}\ninner()";
    run(&vm, source).unwrap_err();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].function.as_deref(), Some("inner"));
    assert_eq!(seen[0].line, 2);
    assert_eq!(&*seen[0].source_name, "test.nut");
}

#[test]
fn test_main_chunk_has_no_function_name() {
    let vm = open();
    let seen: Rc<RefCell<Option<RuntimeErrorInfo>>> = Rc::default();
    let sink = seen.clone();
    vm.set_runtime_error_handler(Some(Rc::new(move |info: &RuntimeErrorInfo| {
        *sink.borrow_mut() = Some(info.clone());
    })));

    run(&vm, "local a = 1\nundefined_fn()").unwrap_err();
    let info = seen.borrow().clone().unwrap();
    assert!(info.function.is_none());
    assert_eq!(info.line, 2);
    assert_eq!(
        info.error.to_display_string(),
        "the index 'undefined_fn' does not exist"
    );
}

#[test]
fn test_caught_errors_are_not_reported() {
    let vm = open();
    let reported = Rc::new(RefCell::new(0));
    let count = reported.clone();
    vm.set_runtime_error_handler(Some(Rc::new(move |_: &RuntimeErrorInfo| {
        *count.borrow_mut() += 1;
    })));
    let source = "function f() { throw \"x\" }\ntry { f() } catch (e) {}\nreturn 1";
    assert_eq!(int(&vm, source), 1);
    assert_eq!(*reported.borrow(), 0);
}

#[test]
fn test_call_depth_is_bounded() {
    let vm = RawVm::open(VmOptions {
        max_call_depth: 16,
        ..VmOptions::default()
    });
    let err = run(&vm, "function down(n) { return down(n + 1) }\ndown(0)").unwrap_err();
    assert_eq!(err.to_string(), "stack overflow");
    // The depth counter unwinds with the error
    assert_eq!(int(&vm, "return 1"), 1);
}

#[test]
fn test_compile_error_handler() {
    let vm = open();
    let seen = Rc::new(RefCell::new(None));
    let sink = seen.clone();
    vm.set_compiler_error_handler(Some(Rc::new(move |err: &nutbind_vm::CompileError| {
        *sink.borrow_mut() = Some(err.clone());
    })));

    let err = vm
        .compile_buffer("local x = 1\nlocal = 3", "bad.nut", true)
        .unwrap_err();
    assert_eq!(err.line, 2);
    assert_eq!(err.source_name, "bad.nut");
    assert_eq!(seen.borrow().as_ref(), Some(&err));
    assert_eq!(vm.top(), 0);
}

// ===== Native closures =====

fn native_add(vm: &RawVm) -> VmResult<usize> {
    let a = vm.get_integer(2)?;
    let b = vm.get_integer(3)?;
    // Free variable sits after the arguments
    let bonus = vm.get_integer(-1)?;
    vm.push_integer(a + b + bonus);
    Ok(1)
}

#[test]
fn test_native_closure_with_free_variable_and_params_check() {
    let vm = open();
    vm.push_root_table();
    vm.push_string("add");
    vm.push_integer(100);
    vm.new_closure(native_add, 1).unwrap();
    vm.set_params_check(3, ".ii").unwrap();
    vm.set_native_closure_name(-1, "add").unwrap();
    vm.new_slot(-3, false).unwrap();
    vm.pop(1);

    assert_eq!(int(&vm, "return add(1, 2)"), 103);
    assert_eq!(
        run(&vm, "return add(1)").unwrap_err().to_string(),
        "wrong number of parameters"
    );
    assert_eq!(
        run(&vm, "return add(1, \"x\")").unwrap_err().to_string(),
        "parameter 2 has an invalid type 'string' ; expected: 'integer'"
    );
    assert_eq!(vm.top(), 0);
}

fn native_fail(vm: &RawVm) -> VmResult<usize> {
    Err(vm.throw_error("host says no"))
}

#[test]
fn test_native_error_is_catchable_by_script() {
    let vm = open();
    vm.push_root_table();
    vm.push_string("fail");
    vm.new_closure(native_fail, 0).unwrap();
    vm.new_slot(-3, false).unwrap();
    vm.pop(1);

    let source = "local m = null\ntry { fail() } catch (e) { m = e }\nreturn m";
    assert_eq!(run(&vm, source).unwrap().to_display_string(), "host says no");
    assert_eq!(vm.last_error().to_display_string(), "host says no");
}

#[test]
fn test_native_error_without_script_frame_has_null_source() {
    let vm = open();
    let seen: Rc<RefCell<Option<RuntimeErrorInfo>>> = Rc::default();
    let sink = seen.clone();
    vm.set_runtime_error_handler(Some(Rc::new(move |info: &RuntimeErrorInfo| {
        *sink.borrow_mut() = Some(info.clone());
    })));

    vm.new_closure(native_fail, 0).unwrap();
    vm.set_native_closure_name(-1, "fail").unwrap();
    vm.push_root_table();
    vm.call(1, false, true).unwrap_err();
    vm.pop(1);

    let seen = seen.borrow();
    let info = seen.as_ref().unwrap();
    assert_eq!(&*info.source_name, "null");
    assert_eq!(info.function.as_deref(), Some("fail"));
    assert_eq!(info.line, 0);
    assert_eq!(vm.top(), 0);
}

// ===== Libraries =====

#[test]
fn test_base_print_uses_print_func() {
    let vm = open();
    let out = Rc::new(RefCell::new(Vec::new()));
    let sink = out.clone();
    vm.set_print_func(Rc::new(move |s: &str| sink.borrow_mut().push(s.to_string())));
    run(&vm, "print(\"hello\"); print(3)").unwrap();
    assert_eq!(*out.borrow(), vec!["hello".to_string(), "3".to_string()]);
}

#[test]
fn test_math_library() {
    let vm = open();
    vm.register_math_lib();
    assert_eq!(int(&vm, "return floor(sqrt(17.0)).tointeger()"), 4);
    assert_eq!(int(&vm, "return abs(-9)"), 9);
    assert!(run(&vm, "return PI").unwrap().raw_equal(&Value::Float(std::f64::consts::PI)));
}

#[test]
fn test_string_library() {
    let vm = open();
    vm.register_string_lib();
    assert_eq!(
        run(&vm, "return strip(\"  pad  \")").unwrap().to_display_string(),
        "pad"
    );
    assert_eq!(int(&vm, "return split(\"a,b;c\", \",;\").len()"), 3);
    assert_eq!(
        run(&vm, "return format(\"%s=%d (%.2f)\", \"x\", 3, 0.5)")
            .unwrap()
            .to_display_string(),
        "x=3 (0.50)"
    );
}

#[test]
fn test_delegates() {
    let vm = open();
    assert_eq!(int(&vm, "local a = [1]; a.append(2); a.push(3); return a.len()"), 3);
    assert_eq!(int(&vm, "return \"hello\".slice(1, 3).len()"), 2);
    assert_eq!(int(&vm, "return \"42\".tointeger() + 1"), 43);
    assert_eq!(int(&vm, "return { a = 1, b = 2 }.len()"), 2);
}
