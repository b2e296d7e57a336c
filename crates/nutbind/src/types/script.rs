use crate::object::object_view;
use nutbind_vm::ObjectType;

object_view!(
    /// Compiled main function of a source buffer or file. Run it with
    /// [`Vm::run`](crate::Vm::run) or [`Vm::evaluate`](crate::Vm::evaluate).
    Script,
    "CLOSURE",
    [ObjectType::Closure]
);
