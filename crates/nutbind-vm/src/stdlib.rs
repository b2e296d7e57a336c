//! Built-in libraries and type delegates

use crate::error::{VmError, VmResult};
use crate::value::{Array, NativeClosure, NativeFn, ParamsCheck, Table, Value};
use crate::vm::{Delegates, RawVm};
use std::rc::Rc;

fn native(name: &str, func: NativeFn, nparams: i64, typemask: &str) -> Value {
    let closure = NativeClosure::new(func, Vec::new());
    *closure.name.borrow_mut() = Some(Rc::from(name));
    if let Ok(check) = ParamsCheck::new(nparams, typemask) {
        *closure.params.borrow_mut() = Some(check);
    }
    Value::NativeClosure(Rc::new(closure))
}

fn register(table: &Table, name: &str, func: NativeFn, nparams: i64, typemask: &str) {
    table.insert_str(name, native(name, func, nparams, typemask));
}

// ============================================================================
// Base library
// ============================================================================

pub(crate) fn register_base_lib(vm: &RawVm) {
    let root = vm.root_table();
    register(&root, "print", base_print, 2, ".");
    register(&root, "error", base_error, 2, ".");
    register(&root, "type", base_type, 2, ".");
    register(&root, "assert", base_assert, -2, "..s");
    register(&root, "array", base_array, -2, ".n");
    register(&root, "getroottable", base_getroottable, 1, ".");
    register(&root, "getconsttable", base_getconsttable, 1, ".");
}

fn base_print(vm: &RawVm) -> VmResult<usize> {
    let value = vm.stack_value(2)?;
    vm.print(&value.to_display_string());
    Ok(0)
}

fn base_error(vm: &RawVm) -> VmResult<usize> {
    let value = vm.stack_value(2)?;
    vm.print_error(&value.to_display_string());
    Ok(0)
}

fn base_type(vm: &RawVm) -> VmResult<usize> {
    let value = vm.stack_value(2)?;
    vm.push_string(value.type_name());
    Ok(1)
}

fn base_assert(vm: &RawVm) -> VmResult<usize> {
    if vm.stack_value(2)?.is_truthy() {
        return Ok(0);
    }
    match vm.stack_value(3) {
        Ok(Value::String(message)) => Err(VmError::msg(&*message)),
        _ => Err(VmError::msg("assertion failed")),
    }
}

fn base_array(vm: &RawVm) -> VmResult<usize> {
    let size = usize::try_from(vm.get_integer(2)?).map_err(|_| VmError::msg("negative size"))?;
    let fill = vm.stack_value(3).unwrap_or_default();
    vm.push(Value::Array(Rc::new(Array::new(vec![fill; size]))));
    Ok(1)
}

fn base_getroottable(vm: &RawVm) -> VmResult<usize> {
    vm.push_root_table();
    Ok(1)
}

fn base_getconsttable(vm: &RawVm) -> VmResult<usize> {
    vm.push_const_table();
    Ok(1)
}

// ============================================================================
// Math library
// ============================================================================

macro_rules! float_fn {
    ($name:ident, $op:expr) => {
        fn $name(vm: &RawVm) -> VmResult<usize> {
            let x = vm.get_float(2)?;
            let op: fn(f64) -> f64 = $op;
            vm.push_float(op(x));
            Ok(1)
        }
    };
}

float_fn!(math_sqrt, f64::sqrt);
float_fn!(math_sin, f64::sin);
float_fn!(math_cos, f64::cos);
float_fn!(math_tan, f64::tan);
float_fn!(math_asin, f64::asin);
float_fn!(math_acos, f64::acos);
float_fn!(math_atan, f64::atan);
float_fn!(math_floor, f64::floor);
float_fn!(math_ceil, f64::ceil);
float_fn!(math_exp, f64::exp);
float_fn!(math_log, f64::ln);
float_fn!(math_log10, f64::log10);
float_fn!(math_fabs, f64::abs);

fn math_pow(vm: &RawVm) -> VmResult<usize> {
    let (x, y) = (vm.get_float(2)?, vm.get_float(3)?);
    vm.push_float(x.powf(y));
    Ok(1)
}

fn math_atan2(vm: &RawVm) -> VmResult<usize> {
    let (y, x) = (vm.get_float(2)?, vm.get_float(3)?);
    vm.push_float(y.atan2(x));
    Ok(1)
}

fn math_abs(vm: &RawVm) -> VmResult<usize> {
    let x = vm.get_integer(2)?;
    vm.push_integer(x.wrapping_abs());
    Ok(1)
}

pub(crate) fn register_math_lib(vm: &RawVm) {
    tracing::debug!("registering math library");
    let root = vm.root_table();
    let unary: [(&str, NativeFn); 13] = [
        ("sqrt", math_sqrt),
        ("sin", math_sin),
        ("cos", math_cos),
        ("tan", math_tan),
        ("asin", math_asin),
        ("acos", math_acos),
        ("atan", math_atan),
        ("floor", math_floor),
        ("ceil", math_ceil),
        ("exp", math_exp),
        ("log", math_log),
        ("log10", math_log10),
        ("fabs", math_fabs),
    ];
    for (name, func) in unary {
        register(&root, name, func, 2, ".n");
    }
    register(&root, "pow", math_pow, 3, ".nn");
    register(&root, "atan2", math_atan2, 3, ".nn");
    register(&root, "abs", math_abs, 2, ".n");
    root.insert_str("PI", Value::Float(std::f64::consts::PI));
}

// ============================================================================
// String library
// ============================================================================

fn string_arg(vm: &RawVm, idx: isize) -> VmResult<Rc<str>> {
    vm.get_string(idx)
}

fn str_strip(vm: &RawVm) -> VmResult<usize> {
    let s = string_arg(vm, 2)?;
    vm.push_string(s.trim());
    Ok(1)
}

fn str_lstrip(vm: &RawVm) -> VmResult<usize> {
    let s = string_arg(vm, 2)?;
    vm.push_string(s.trim_start());
    Ok(1)
}

fn str_rstrip(vm: &RawVm) -> VmResult<usize> {
    let s = string_arg(vm, 2)?;
    vm.push_string(s.trim_end());
    Ok(1)
}

/// `split(str, separators)`: every character of `separators` splits; empty pieces are kept
fn str_split(vm: &RawVm) -> VmResult<usize> {
    let s = string_arg(vm, 2)?;
    let separators = string_arg(vm, 3)?;
    let parts = s
        .split(|c: char| separators.contains(c))
        .map(Value::string)
        .collect();
    vm.push(Value::Array(Rc::new(Array::new(parts))));
    Ok(1)
}

fn str_startswith(vm: &RawVm) -> VmResult<usize> {
    let (s, prefix) = (string_arg(vm, 2)?, string_arg(vm, 3)?);
    vm.push_bool(s.starts_with(&*prefix));
    Ok(1)
}

fn str_endswith(vm: &RawVm) -> VmResult<usize> {
    let (s, suffix) = (string_arg(vm, 2)?, string_arg(vm, 3)?);
    vm.push_bool(s.ends_with(&*suffix));
    Ok(1)
}

/// `format(fmt, ...)` with `%d`, `%i`, `%s`, `%f`, `%.Nf` and `%%`
fn str_format(vm: &RawVm) -> VmResult<usize> {
    let fmt = string_arg(vm, 2)?;
    let mut out = String::with_capacity(fmt.len());
    let mut next_arg = 3;
    let mut chars = fmt.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                digits.push(d);
                chars.next();
            }
            precision = digits.parse::<usize>().ok();
        }
        let spec = chars
            .next()
            .ok_or_else(|| VmError::msg("incomplete format"))?;
        if spec == '%' {
            out.push('%');
            continue;
        }
        let arg = vm
            .stack_value(next_arg)
            .map_err(|_| VmError::msg("not enough parameters for the given format string"))?;
        next_arg += 1;
        match spec {
            'd' | 'i' => match arg {
                Value::Integer(i) => out.push_str(&i.to_string()),
                Value::Float(f) => out.push_str(&(f as i64).to_string()),
                other => return Err(format_type_error(spec, &other)),
            },
            'f' => {
                let f = match arg {
                    Value::Integer(i) => i as f64,
                    Value::Float(f) => f,
                    other => return Err(format_type_error(spec, &other)),
                };
                out.push_str(&format!("{:.*}", precision.unwrap_or(6), f));
            }
            's' => out.push_str(&arg.to_display_string()),
            other => {
                return Err(VmError::msg(format!("invalid format '%{}'", other)));
            }
        }
    }

    vm.push_string(&out);
    Ok(1)
}

fn format_type_error(spec: char, arg: &Value) -> VmError {
    VmError::msg(format!(
        "invalid parameter for '%{}': {}",
        spec,
        arg.type_name()
    ))
}

pub(crate) fn register_string_lib(vm: &RawVm) {
    tracing::debug!("registering string library");
    let root = vm.root_table();
    register(&root, "strip", str_strip, 2, ".s");
    register(&root, "lstrip", str_lstrip, 2, ".s");
    register(&root, "rstrip", str_rstrip, 2, ".s");
    register(&root, "split", str_split, 3, ".ss");
    register(&root, "startswith", str_startswith, 3, ".ss");
    register(&root, "endswith", str_endswith, 3, ".ss");
    register(&root, "format", str_format, -2, ".s");
}

// ============================================================================
// Delegates
// ============================================================================

fn this_len(vm: &RawVm) -> VmResult<usize> {
    let n = vm.size(1)?;
    vm.push_integer(n as i64);
    Ok(1)
}

fn table_rawget(vm: &RawVm) -> VmResult<usize> {
    vm.push(vm.stack_value(2)?);
    vm.raw_get(1)?;
    Ok(1)
}

fn table_rawin(vm: &RawVm) -> VmResult<usize> {
    let found = match vm.stack_value(1)? {
        Value::Table(t) => t.contains(&vm.stack_value(2)?)?,
        _ => false,
    };
    vm.push_bool(found);
    Ok(1)
}

fn array_append(vm: &RawVm) -> VmResult<usize> {
    vm.push(vm.stack_value(2)?);
    vm.array_append(1)?;
    Ok(0)
}

fn array_pop(vm: &RawVm) -> VmResult<usize> {
    vm.array_pop(1, true)?;
    Ok(1)
}

fn array_top(vm: &RawVm) -> VmResult<usize> {
    match vm.stack_value(1)? {
        Value::Array(a) => {
            let last = a.len().checked_sub(1).and_then(|i| a.get(i as i64));
            vm.push(last.ok_or_else(|| VmError::msg("empty array"))?);
            Ok(1)
        }
        _ => Err(VmError::msg("expected array")),
    }
}

fn string_toupper(vm: &RawVm) -> VmResult<usize> {
    let s = vm.get_string(1)?;
    vm.push_string(&s.to_uppercase());
    Ok(1)
}

fn string_tolower(vm: &RawVm) -> VmResult<usize> {
    let s = vm.get_string(1)?;
    vm.push_string(&s.to_lowercase());
    Ok(1)
}

fn string_slice(vm: &RawVm) -> VmResult<usize> {
    let s = vm.get_string(1)?;
    let len = s.len() as i64;
    let resolve = |i: i64| if i < 0 { len + i } else { i };
    let start = resolve(vm.get_integer(2)?);
    let end = match vm.stack_value(3) {
        Ok(Value::Integer(e)) => resolve(e),
        _ => len,
    };
    if start < 0 || end > len || start > end {
        return Err(VmError::msg("slice out of range"));
    }
    let piece = s
        .get(start as usize..end as usize)
        .ok_or_else(|| VmError::msg("slice out of range"))?;
    vm.push_string(piece);
    Ok(1)
}

fn string_find(vm: &RawVm) -> VmResult<usize> {
    let s = vm.get_string(1)?;
    let needle = vm.get_string(2)?;
    match s.find(&*needle) {
        Some(pos) => vm.push_integer(pos as i64),
        None => vm.push_null(),
    }
    Ok(1)
}

fn to_integer(vm: &RawVm) -> VmResult<usize> {
    let value = match vm.stack_value(1)? {
        Value::Integer(i) => i,
        Value::Float(f) => f as i64,
        Value::Bool(b) => b as i64,
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .or_else(|_| s.trim().parse::<f64>().map(|f| f as i64))
            .map_err(|_| VmError::msg("cannot convert the string"))?,
        other => return Err(VmError::msg(format!("cannot convert a {}", other.type_name()))),
    };
    vm.push_integer(value);
    Ok(1)
}

fn to_float(vm: &RawVm) -> VmResult<usize> {
    let value = match vm.stack_value(1)? {
        Value::Integer(i) => i as f64,
        Value::Float(f) => f,
        Value::Bool(b) => b as i64 as f64,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| VmError::msg("cannot convert the string"))?,
        other => return Err(VmError::msg(format!("cannot convert a {}", other.type_name()))),
    };
    vm.push_float(value);
    Ok(1)
}

fn to_string(vm: &RawVm) -> VmResult<usize> {
    let text = vm.stack_value(1)?.to_display_string();
    vm.push_string(&text);
    Ok(1)
}

pub(crate) fn delegates() -> Delegates {
    let table = Table::new();
    register(&table, "len", this_len, 1, "t");
    register(&table, "rawget", table_rawget, 2, "t.");
    register(&table, "rawin", table_rawin, 2, "t.");

    let array = Table::new();
    register(&array, "len", this_len, 1, "a");
    register(&array, "append", array_append, 2, "a.");
    register(&array, "push", array_append, 2, "a.");
    register(&array, "pop", array_pop, 1, "a");
    register(&array, "top", array_top, 1, "a");

    let string = Table::new();
    register(&string, "len", this_len, 1, "s");
    register(&string, "toupper", string_toupper, 1, "s");
    register(&string, "tolower", string_tolower, 1, "s");
    register(&string, "slice", string_slice, -2, "sii");
    register(&string, "find", string_find, 2, "ss");
    register(&string, "tointeger", to_integer, 1, "s");
    register(&string, "tofloat", to_float, 1, "s");
    register(&string, "tostring", to_string, 1, "s");

    let number = Table::new();
    register(&number, "tointeger", to_integer, 1, ".");
    register(&number, "tofloat", to_float, 1, ".");
    register(&number, "tostring", to_string, 1, ".");

    Delegates {
        table: Rc::new(table),
        array: Rc::new(array),
        string: Rc::new(string),
        number: Rc::new(number),
    }
}
