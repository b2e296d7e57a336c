//! Typed views over [`Object`](crate::Object)
//!
//! A view is a handle whose VM type was checked once, when it was converted from
//! a generic [`Object`](crate::Object) with `TryFrom`.

mod array;
mod class;
mod enums;
mod function;
mod instance;
mod script;
mod table;

pub use array::Array;
pub use class::Class;
pub use enums::Enum;
pub use function::Function;
pub use instance::Instance;
pub use script::Script;
pub use table::Table;

use crate::context::VmContext;
use crate::error::Result;
use crate::object::Object;
use nutbind_vm::Value;

/// Pushes the container and a fresh iterator
fn begin_iteration(ctx: &VmContext, container: &Value) {
    ctx.raw().push(container.clone());
    ctx.raw().push_null();
}

/// Advances the iterator pushed by [`begin_iteration`]
fn next_iteration(ctx: &VmContext, key: &mut Object, value: &mut Object) -> Result<bool> {
    let raw = ctx.raw();
    if !raw.next(-2)? {
        return Ok(false);
    }
    *key = ctx.object_at(-2)?;
    *value = ctx.object_at(-1)?;
    raw.pop(2);
    Ok(true)
}

fn end_iteration(ctx: &VmContext) {
    ctx.raw().pop(2);
}

/// Creates a value with `create` and returns a handle to it
fn create_with(
    ctx: &VmContext,
    create: impl FnOnce(&nutbind_vm::RawVm) -> nutbind_vm::VmResult<()>,
) -> Result<Object> {
    let _guard = ctx.guard();
    create(ctx.raw())?;
    ctx.object_at(-1)
}
