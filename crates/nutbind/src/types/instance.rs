use super::Class;
use crate::convert::instance_payload;
use crate::error::Result;
use crate::object::object_view;
use nutbind_vm::ObjectType;
use std::cell::RefCell;
use std::rc::Rc;

object_view!(
    /// Handle to a class instance
    Instance,
    "INSTANCE",
    [ObjectType::Instance]
);

impl Instance {
    /// The class this instance was created from
    pub fn get_class(&self) -> Result<Class> {
        let ctx = self.context()?;
        let _guard = ctx.guard();
        ctx.raw().push(self.raw().clone());
        ctx.raw().get_class(-1)?;
        Class::try_from(ctx.object_at(-1)?)
    }

    /// The host object behind this instance. Fails with a Type error when the
    /// instance holds no `T`.
    pub fn borrow<T: 'static>(&self) -> Result<Rc<RefCell<T>>> {
        let ctx = self.context()?;
        let _guard = ctx.guard();
        ctx.raw().push(self.raw().clone());
        instance_payload::<T>(&ctx, -1)
    }
}
