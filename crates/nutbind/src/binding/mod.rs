//! Marshaling of host callables into native closures
//!
//! Registration turns a host callable into an [`Entry`]: a parameter check mask
//! derived from the callable's signature plus an erased body. The VM runs its
//! parameter check before the body is entered, so arity and type mismatches
//! never reach host code.

mod callable;
mod class;
mod signature;
mod var;

pub use callable::IntoReturn;
pub use signature::{HostFunction, HostMethod};

pub(crate) use callable::Entry;
pub(crate) use class::{register_class, Constructor};
pub(crate) use var::bind_var;

use crate::context::VmContext;
use crate::convert::instance_payload;
use crate::tags::WILDCARD;
use std::rc::Rc;

/// Entry for a function whose `this` is ignored
pub(crate) fn function_entry<Args, F>(name: &str, func: F) -> Entry
where
    Args: 'static,
    F: HostFunction<Args>,
    F::Output: IntoReturn,
{
    let mut mask = String::from(WILDCARD);
    mask.push_str(&F::param_tags());
    Entry {
        name: name.to_string(),
        nparams: F::arity() + 1,
        mask,
        invoke: Box::new(move |ctx: &VmContext| {
            let output = func.call_with(ctx, 2).map_err(|e| e.to_string())?;
            output.into_return(ctx)
        }),
    }
}

/// Entry for a method called on an instance holding a `T`
pub(crate) fn method_entry<T, Args, F>(name: &str, method: F) -> Entry
where
    T: 'static,
    Args: 'static,
    F: HostMethod<T, Args>,
    F::Output: IntoReturn,
{
    let mut mask = String::from('x');
    mask.push_str(&F::param_tags());
    Entry {
        name: name.to_string(),
        nparams: F::arity() + 1,
        mask,
        invoke: Box::new(move |ctx: &VmContext| {
            let receiver = instance_payload::<T>(ctx, 1).map_err(|e| e.to_string())?;
            let output = {
                let mut target = receiver
                    .try_borrow_mut()
                    .map_err(|_| already_borrowed::<T>())?;
                method
                    .call_with(ctx, &mut target, 2)
                    .map_err(|e| e.to_string())?
            };
            output.into_return(ctx)
        }),
    }
}

pub(crate) fn already_borrowed<T>() -> String {
    format!("{} is already borrowed", std::any::type_name::<T>())
}

/// Keeps `payload` alive only as long as the instance that holds it
pub(crate) fn release_instance(payload: Rc<dyn std::any::Any>) {
    tracing::trace!(refs = Rc::strong_count(&payload), "releasing host object");
}
