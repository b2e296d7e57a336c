use super::{begin_iteration, create_with, end_iteration, next_iteration, Class, Function};
use crate::binding::{self, register_class, Constructor, HostFunction, IntoReturn};
use crate::context::VmContext;
use crate::convert::{FromScript, ToScript};
use crate::error::{Error, Result};
use crate::object::{object_view, Object};
use crate::vm::Vm;
use nutbind_vm::{ObjectType, Value};
use std::any::TypeId;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

object_view!(
    /// Handle to a VM table
    Table,
    "TABLE",
    [ObjectType::Table]
);

impl Table {
    /// The root table of `ctx`
    pub(crate) fn root(ctx: &VmContext) -> Self {
        Table(ctx.object(Value::Table(ctx.raw().root_table())))
    }

    /// Creates an empty table
    pub fn new(vm: &Vm) -> Result<Self> {
        let ctx = vm.context();
        if ctx.is_closed() {
            return Err(Error::not_initialised());
        }
        Table::try_from(create_with(ctx, |raw| {
            raw.new_table();
            Ok(())
        })?)
    }

    /// Finds a function slot
    pub fn find_func(&self, name: &str) -> Result<Function> {
        Function::try_from(self.find(name)?)
    }

    /// Finds a class slot
    pub fn find_class(&self, name: &str) -> Result<Class> {
        Class::try_from(self.find(name)?)
    }

    /// Reads slot `name`
    pub fn get<T: FromScript>(&self, name: &str) -> Result<T> {
        self.find(name)?.to()
    }

    /// Creates or overwrites slot `name`
    pub fn set<V: ToScript>(&self, name: &str, value: V) -> Result<()> {
        let ctx = self.context()?;
        let raw = ctx.raw();
        let _guard = ctx.guard();
        raw.push(self.raw().clone());
        raw.push_string(name);
        value.push_to_stack(&ctx)?;
        raw.new_slot(-3, false)?;
        Ok(())
    }

    /// Number of slots
    pub fn size(&self) -> Result<usize> {
        let ctx = self.context()?;
        let _guard = ctx.guard();
        ctx.raw().push(self.raw().clone());
        Ok(ctx.raw().size(-1)?)
    }

    /// Creates an empty table in slot `name`
    pub fn add_table(&self, name: &str) -> Result<Table> {
        let ctx = self.context()?;
        let table = Table::try_from(create_with(&ctx, |raw| {
            raw.new_table();
            Ok(())
        })?)?;
        self.set(name, &table)?;
        Ok(table)
    }

    /// Binds a host function to slot `name`
    pub fn add_func<Args, F>(&self, name: &str, func: F) -> Result<Function>
    where
        Args: 'static,
        F: HostFunction<Args>,
        F::Output: IntoReturn,
    {
        let ctx = self.context()?;
        let raw = ctx.raw();
        let _guard = ctx.guard();
        raw.push(self.raw().clone());
        raw.push_string(name);
        binding::function_entry(name, func).push(&ctx)?;
        let function = Function::try_from(ctx.object_at(-1)?)?;
        raw.new_slot(-3, false)?;
        Ok(function)
    }

    // ========================================================================
    // Classes
    // ========================================================================

    /// Registers host type `T` as class `name`. Calling the class runs `ctor` and
    /// the instance owns the result.
    pub fn add_class<T, Args, F>(&self, name: &str, ctor: F) -> Result<Class>
    where
        T: 'static,
        Args: 'static,
        F: HostFunction<Args, Output = T>,
    {
        let ctor = Constructor::release::<T, Args, F>(name, ctor);
        self.register::<T>(name, None, Some(ctor))
    }

    /// Like [`Table::add_class`], deriving from `base`
    pub fn add_class_with_base<T, Args, F>(&self, name: &str, base: &Class, ctor: F) -> Result<Class>
    where
        T: 'static,
        Args: 'static,
        F: HostFunction<Args, Output = T>,
    {
        let ctor = Constructor::release::<T, Args, F>(name, ctor);
        self.register::<T>(name, Some(base), Some(ctor))
    }

    /// Registers host type `T` as class `name` with a constructor that hands out
    /// host-owned objects. The VM shares them and never owns the last reference.
    pub fn add_class_no_release<T, Args, F>(&self, name: &str, ctor: F) -> Result<Class>
    where
        T: 'static,
        Args: 'static,
        F: HostFunction<Args, Output = Rc<RefCell<T>>>,
    {
        let ctor = Constructor::no_release::<T, Args, F>(name, ctor);
        self.register::<T>(name, None, Some(ctor))
    }

    /// Like [`Table::add_class_no_release`], deriving from `base`
    pub fn add_class_no_release_with_base<T, Args, F>(
        &self,
        name: &str,
        base: &Class,
        ctor: F,
    ) -> Result<Class>
    where
        T: 'static,
        Args: 'static,
        F: HostFunction<Args, Output = Rc<RefCell<T>>>,
    {
        let ctor = Constructor::no_release::<T, Args, F>(name, ctor);
        self.register::<T>(name, Some(base), Some(ctor))
    }

    /// Registers host type `T` as class `name` without a constructor
    pub fn add_abstract_class<T: 'static>(&self, name: &str) -> Result<Class> {
        self.register::<T>(name, None, None)
    }

    /// Like [`Table::add_abstract_class`], deriving from `base`
    pub fn add_abstract_class_with_base<T: 'static>(&self, name: &str, base: &Class) -> Result<Class> {
        self.register::<T>(name, Some(base), None)
    }

    fn register<T: 'static>(
        &self,
        name: &str,
        base: Option<&Class>,
        ctor: Option<Constructor>,
    ) -> Result<Class> {
        let ctx = self.context()?;
        register_class(&ctx, self.raw(), name, TypeId::of::<T>(), base, ctor)
    }

    // ========================================================================
    // Iteration
    // ========================================================================

    /// Starts iterating. Must be paired with [`Table::end_iteration`].
    pub fn begin_iteration(&self) -> Result<()> {
        let ctx = self.context()?;
        begin_iteration(&ctx, self.raw());
        Ok(())
    }

    /// Moves to the next slot; `false` once every slot was visited
    pub fn next_iteration(&self, key: &mut Object, value: &mut Object) -> Result<bool> {
        next_iteration(&*self.context()?, key, value)
    }

    pub fn end_iteration(&self) -> Result<()> {
        end_iteration(&*self.context()?);
        Ok(())
    }

    /// Copies every slot into a map keyed by the slot's text form
    pub fn read_table(&self) -> Result<BTreeMap<String, Object>> {
        let mut map = BTreeMap::new();
        let mut key = Object::default();
        let mut value = Object::default();
        self.begin_iteration()?;
        let visited = (|| -> Result<()> {
            while self.next_iteration(&mut key, &mut value)? {
                let name = match key.get_type() {
                    ObjectType::String => key.to::<String>()?,
                    _ => key.raw().to_display_string(),
                };
                map.insert(name, value.clone());
            }
            Ok(())
        })();
        self.end_iteration()?;
        visited.map(|()| map)
    }
}
