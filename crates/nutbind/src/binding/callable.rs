//! Type-erased host callables and the native entry point that runs them
//!
//! A bound host callable lives in a userdata value that becomes the single free
//! variable of a native closure. When the VM calls the closure, [`dispatch`] takes
//! the callable back out of the userdata, runs it, and turns any failure into a
//! script error. Nothing the host does can unwind through the VM.

use crate::context::VmContext;
use crate::convert::ToScript;
use nutbind_vm::{RawVm, VmResult};
use std::any::Any;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

/// Erased body of a bound callable. Returns the number of values it pushed, or the
/// message to raise in the script.
pub(crate) type Invoke = Box<dyn Fn(&VmContext) -> Result<usize, String>>;

/// Userdata payload behind a bound native closure
pub(crate) struct Callable {
    name: Rc<str>,
    ctx: Weak<VmContext>,
    invoke: Invoke,
}

/// Everything needed to push a bound native closure
pub(crate) struct Entry {
    pub name: String,
    /// Parameter count including `this`
    pub nparams: usize,
    /// Parameter check mask, `this` first
    pub mask: String,
    pub invoke: Invoke,
}

impl Entry {
    /// Pushes the native closure for this entry
    pub fn push(self, ctx: &VmContext) -> crate::Result<()> {
        let raw = ctx.raw();
        tracing::trace!(name = %self.name, mask = %self.mask, "binding host callable");
        raw.new_user_data(Rc::new(Callable {
            name: Rc::from(self.name.as_str()),
            ctx: ctx.weak(),
            invoke: self.invoke,
        }));
        raw.set_release_hook(-1, Box::new(release_callable))?;
        raw.new_closure(dispatch, 1)?;
        raw.set_params_check(self.nparams as i64, &self.mask)?;
        raw.set_native_closure_name(-1, &self.name)?;
        Ok(())
    }
}

fn release_callable(payload: Rc<dyn Any>) {
    if let Some(callable) = payload.downcast_ref::<Callable>() {
        tracing::trace!(name = %callable.name, "releasing host callable");
    }
}

/// Native entry point shared by every bound callable
pub(crate) fn dispatch(raw: &RawVm) -> VmResult<usize> {
    let (payload, _) = raw.get_user_data(-1)?;
    let Ok(callable) = payload.downcast::<Callable>() else {
        return Err(raw.throw_error("native closure has no host callable"));
    };
    let Some(ctx) = callable.ctx.upgrade() else {
        return Err(raw.throw_error("VM is not initialised"));
    };
    tracing::trace!(name = %callable.name, "calling host callable");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| (callable.invoke)(&ctx)));
    let message = match outcome {
        Ok(Ok(pushed)) => return Ok(pushed),
        Ok(Err(message)) => message,
        Err(payload) => panic_message(payload),
    };
    tracing::debug!(name = %callable.name, error = %message, "host callable failed");
    Err(raw.throw_error(&message))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Return values of bound callables
pub trait IntoReturn {
    /// Pushes the value and returns how many values were pushed, or the message
    /// to raise in the script
    fn into_return(self, ctx: &VmContext) -> Result<usize, String>;
}

impl IntoReturn for () {
    fn into_return(self, _ctx: &VmContext) -> Result<usize, String> {
        Ok(0)
    }
}

impl<T: ToScript> IntoReturn for T {
    fn into_return(self, ctx: &VmContext) -> Result<usize, String> {
        self.push_to_stack(ctx).map_err(|e| e.to_string())?;
        Ok(1)
    }
}

/// `Err` is raised in the script with its `Display` text
impl<T: IntoReturn, E: Display> IntoReturn for Result<T, E> {
    fn into_return(self, ctx: &VmContext) -> Result<usize, String> {
        match self {
            Ok(value) => value.into_return(ctx),
            Err(err) => Err(err.to_string()),
        }
    }
}
