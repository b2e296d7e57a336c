use crate::convert::ToScript;
use crate::error::Result;
use crate::object::object_view;
use nutbind_vm::ObjectType;

object_view!(
    /// Named constants visible to scripts compiled after registration
    Enum,
    "TABLE",
    [ObjectType::Table]
);

impl Enum {
    /// Adds constant `name`
    pub fn add_slot<V: ToScript>(&self, name: &str, value: V) -> Result<()> {
        let ctx = self.context()?;
        let raw = ctx.raw();
        let _guard = ctx.guard();
        raw.push(self.raw().clone());
        raw.push_string(name);
        value.push_to_stack(&ctx)?;
        raw.new_slot(-3, false)?;
        Ok(())
    }
}
