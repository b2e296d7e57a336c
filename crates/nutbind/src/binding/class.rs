//! Class registration and constructor adapters

use super::callable::Entry;
use super::signature::HostFunction;
use super::release_instance;
use crate::context::VmContext;
use crate::error::Result;
use crate::types::Class;
use nutbind_vm::Value;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::rc::Rc;

/// Allocator adapter installed as a class's `constructor`
pub(crate) struct Constructor(Entry);

impl Constructor {
    /// The VM owns the constructed object and releases it with the instance
    pub fn release<T, Args, F>(class_name: &str, ctor: F) -> Self
    where
        T: 'static,
        Args: 'static,
        F: HostFunction<Args, Output = T>,
    {
        Self::build::<Args, F, _>(class_name, move |ctx, ctor| {
            let payload = Rc::new(RefCell::new(ctor.call_with(ctx, 2)?));
            attach(ctx, payload, true)
        }, ctor)
    }

    /// The host allocates and keeps the object; the instance only shares it
    pub fn no_release<T, Args, F>(class_name: &str, ctor: F) -> Self
    where
        T: 'static,
        Args: 'static,
        F: HostFunction<Args, Output = Rc<RefCell<T>>>,
    {
        Self::build::<Args, F, _>(class_name, move |ctx, ctor| {
            let payload = ctor.call_with(ctx, 2)?;
            attach(ctx, payload, false)
        }, ctor)
    }

    fn build<Args, F, R>(class_name: &str, run: R, ctor: F) -> Self
    where
        Args: 'static,
        F: HostFunction<Args>,
        R: Fn(&VmContext, &F) -> Result<()> + 'static,
    {
        let mut mask = String::from('x');
        mask.push_str(&F::param_tags());
        Constructor(Entry {
            name: class_name.to_string(),
            nparams: F::arity() + 1,
            mask,
            invoke: Box::new(move |ctx: &VmContext| {
                run(ctx, &ctor).map_err(|e| e.to_string())?;
                Ok(0)
            }),
        })
    }
}

/// Stores `payload` in the instance being constructed (`this`)
fn attach<T: 'static>(ctx: &VmContext, payload: Rc<RefCell<T>>, release: bool) -> Result<()> {
    let raw = ctx.raw();
    raw.set_instance_up(1, payload as Rc<dyn Any>)?;
    if release {
        raw.set_release_hook(1, Box::new(release_instance))?;
    }
    Ok(())
}

/// Creates a class tagged with `type_id`, records it in the class registry and
/// stores it as `name` in `container`.
///
/// Without a constructor the class is abstract: scripts can subclass it, but its
/// instances carry no host object.
pub(crate) fn register_class(
    ctx: &VmContext,
    container: &Value,
    name: &str,
    type_id: TypeId,
    base: Option<&Class>,
    ctor: Option<Constructor>,
) -> Result<Class> {
    tracing::debug!(class = name, has_base = base.is_some(), "registering class");
    let raw = ctx.raw();
    let _guard = ctx.guard();

    raw.push(container.clone());
    raw.push_string(name);
    if let Some(base) = base {
        raw.push(base.raw().clone());
    }
    raw.new_class(base.is_some())?;
    raw.set_type_tag(-1, type_id)?;
    ctx.register_class(type_id, raw.stack_value(-1)?);
    let class = Class::try_from(ctx.object_at(-1)?)?;

    if let Some(Constructor(entry)) = ctor {
        raw.push_string("constructor");
        entry.push(ctx)?;
        raw.new_slot(-3, false)?;
    }
    raw.new_slot(-3, false)?;
    Ok(class)
}
