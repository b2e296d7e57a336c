use crate::convert::ScriptArgs;
use crate::error::Result;
use crate::object::{object_view, Object};
use nutbind_vm::ObjectType;

object_view!(
    /// Handle to a script or native closure
    Function,
    "CLOSURE",
    [ObjectType::Closure, ObjectType::NativeClosure]
);

impl Function {
    /// Number of declared parameters, not counting `this`
    pub fn get_num_of_params(&self) -> Result<usize> {
        let ctx = self.context()?;
        let _guard = ctx.guard();
        ctx.raw().push(self.raw().clone());
        let nparams = ctx.raw().closure_nparams(-1)?;
        Ok(usize::try_from(nparams.saturating_sub(1)).unwrap_or(0))
    }

    /// Calls the function with `env` bound to `this`
    pub fn call<A: ScriptArgs>(&self, env: &Object, args: A) -> Result<Object> {
        self.context()?.call_func(self, env, args)
    }
}
