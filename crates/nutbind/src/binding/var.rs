//! Member variable accessors
//!
//! Bound member variables are not instance fields. A class with bound variables
//! gets `_get` and `_set` stubs whose free variables are accessor tables mapping
//! each variable name to a getter or setter closure, plus the base class. The VM
//! only calls the stubs when the key is not an ordinary field.

use super::already_borrowed;
use super::callable::Entry;
use crate::context::{VarTables, VmContext};
use crate::convert::{instance_payload, FromScript, ToScript};
use crate::error::Result;
use crate::tags::WILDCARD;
use nutbind_vm::{RawVm, Value, VmError, VmResult};

/// Installs `getter` and, when given, `setter` for member `name` of `class`
pub(crate) fn bind_var<T, V, G, S>(
    ctx: &VmContext,
    class: &Value,
    name: &str,
    getter: G,
    setter: Option<S>,
) -> Result<()>
where
    T: 'static,
    V: ToScript + FromScript + 'static,
    G: Fn(&T) -> V + 'static,
    S: Fn(&mut T, V) + 'static,
{
    let tables = var_tables(ctx, class)?;
    let raw = ctx.raw();
    let _guard = ctx.guard();

    raw.push(tables.getters.clone());
    raw.push_string(name);
    Entry {
        name: format!("get {}", name),
        nparams: 1,
        mask: "x".to_string(),
        invoke: Box::new(move |ctx: &VmContext| {
            let receiver = instance_payload::<T>(ctx, 1).map_err(|e| e.to_string())?;
            let value = {
                let target = receiver.try_borrow().map_err(|_| already_borrowed::<T>())?;
                getter(&target)
            };
            value.push_to_stack(ctx).map_err(|e| e.to_string())?;
            Ok(1)
        }),
    }
    .push(ctx)?;
    raw.new_slot(-3, false)?;
    raw.pop(1);

    if let Some(setter) = setter {
        raw.push(tables.setters.clone());
        raw.push_string(name);
        Entry {
            name: format!("set {}", name),
            nparams: 2,
            mask: format!("x{}", WILDCARD),
            invoke: Box::new(move |ctx: &VmContext| {
                let value = V::from_stack(ctx, 2).map_err(|e| e.to_string())?;
                let receiver = instance_payload::<T>(ctx, 1).map_err(|e| e.to_string())?;
                let mut target = receiver
                    .try_borrow_mut()
                    .map_err(|_| already_borrowed::<T>())?;
                setter(&mut target, value);
                Ok(0)
            }),
        }
        .push(ctx)?;
        raw.new_slot(-3, false)?;
    }
    Ok(())
}

/// Accessor tables of `class`, installing the stubs on first use. The stubs
/// fall back to the base class's stubs on a miss, so accessors bound on the
/// base later are still found.
fn var_tables(ctx: &VmContext, class: &Value) -> Result<VarTables> {
    if let Some(tables) = ctx.var_tables(class) {
        return Ok(tables);
    }
    let raw = ctx.raw();
    let _guard = ctx.guard();

    raw.new_table();
    let getters = raw.stack_value(-1)?;
    raw.new_table();
    let setters = raw.stack_value(-1)?;

    raw.push(class.clone());
    raw.get_base(-1)?;
    let base = raw.stack_value(-1)?;
    raw.pop(1);

    // stack: getters setters class
    raw.push_string("_get");
    raw.push(getters.clone());
    raw.push(base.clone());
    raw.new_closure(var_get_stub, 2)?;
    raw.set_native_closure_name(-1, "_get")?;
    raw.new_slot(-3, false)?;

    raw.push_string("_set");
    raw.push(getters.clone());
    raw.push(setters.clone());
    raw.push(base);
    raw.new_closure(var_set_stub, 3)?;
    raw.set_native_closure_name(-1, "_set")?;
    raw.new_slot(-3, false)?;

    let tables = VarTables {
        class: class.clone(),
        getters,
        setters,
    };
    ctx.add_var_tables(tables.clone());
    Ok(tables)
}

/// Pushes the stub `name` inherited by the base class at `base_idx`. Returns
/// false, leaving the stack as it was, when there is none.
fn push_inherited_stub(raw: &RawVm, base_idx: isize, name: &str) -> VmResult<bool> {
    if !matches!(raw.stack_value(base_idx)?, Value::Class(_)) {
        return Ok(false);
    }
    raw.push(raw.stack_value(base_idx)?);
    raw.push_string(name);
    if raw.raw_get(-2).is_err() {
        raw.pop(1);
        return Ok(false);
    }
    raw.remove(-2)?;
    Ok(true)
}

fn missing_member(raw: &RawVm, key: &Value) -> VmError {
    raw.throw_error(&format!("the index '{}' does not exist", key.to_display_string()))
}

/// `_get(key)`: frame is `this, key, getters, base`
fn var_get_stub(raw: &RawVm) -> VmResult<usize> {
    let key = raw.stack_value(2)?;
    raw.push(key.clone());
    if raw.raw_get(3).is_ok() {
        raw.push(raw.stack_value(1)?);
        raw.call(1, true, false)?;
        return Ok(1);
    }
    if !push_inherited_stub(raw, 4, "_get")? {
        return Err(missing_member(raw, &key));
    }
    raw.push(raw.stack_value(1)?);
    raw.push(key);
    raw.call(2, true, false)?;
    Ok(1)
}

/// `_set(key, value)`: frame is `this, key, value, getters, setters, base`
fn var_set_stub(raw: &RawVm) -> VmResult<usize> {
    let key = raw.stack_value(2)?;
    raw.push(key.clone());
    if raw.raw_get(5).is_ok() {
        raw.push(raw.stack_value(1)?);
        raw.push(raw.stack_value(3)?);
        raw.call(2, false, false)?;
        return Ok(0);
    }
    raw.push(key.clone());
    if raw.raw_get(4).is_ok() {
        return Err(raw.throw_error(&format!(
            "member variable '{}' is read-only",
            key.to_display_string()
        )));
    }
    if !push_inherited_stub(raw, 6, "_set")? {
        return Err(missing_member(raw, &key));
    }
    raw.push(raw.stack_value(1)?);
    raw.push(key);
    raw.push(raw.stack_value(3)?);
    raw.call(3, false, false)?;
    Ok(0)
}
