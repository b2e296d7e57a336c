use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nutbind::Vm;

struct Vec2 {
    x: f64,
    y: f64,
}

fn bench_host_calls(c: &mut Criterion) {
    let vm = Vm::default();
    vm.add_func("add", |a: i64, b: i64| a + b).unwrap();
    let script = vm
        .compile_source(
            "local t = 0\nfor (local i = 0; i < 1000; i++) t = add(t, i)\nreturn t",
            "bench.nut",
        )
        .unwrap();

    c.bench_function("script_to_host_1000", |b| {
        b.iter(|| vm.evaluate(black_box(&script)).unwrap());
    });
}

fn bench_script_calls(c: &mut Criterion) {
    let vm = Vm::default();
    let define = vm
        .compile_source("function mul(a, b) { return a * b }", "bench.nut")
        .unwrap();
    vm.run(&define).unwrap();
    let mul = vm.find_func("mul").unwrap();
    let root = vm.root_table();

    c.bench_function("host_to_script", |b| {
        b.iter(|| mul.call(&root, (black_box(6), black_box(7))).unwrap());
    });
}

fn bench_member_access(c: &mut Criterion) {
    let vm = Vm::default();
    let class = vm
        .add_class("Vec2", |x: f64, y: f64| Vec2 { x, y })
        .unwrap();
    class
        .add_var("x", |v: &Vec2| v.x, |v: &mut Vec2, x: f64| v.x = x)
        .unwrap();
    class
        .add_func("dot", |v: &mut Vec2| v.x * v.x + v.y * v.y, false)
        .unwrap();
    let script = vm
        .compile_source(
            "local v = Vec2(1.0, 2.0)\nlocal s = 0.0\nfor (local i = 0; i < 1000; i++) { v.x = v.x + 1.0; s += v.dot() }\nreturn s",
            "bench.nut",
        )
        .unwrap();

    c.bench_function("bound_class_1000", |b| {
        b.iter(|| vm.evaluate(black_box(&script)).unwrap());
    });
}

criterion_group!(benches, bench_host_calls, bench_script_calls, bench_member_access);
criterion_main!(benches);
