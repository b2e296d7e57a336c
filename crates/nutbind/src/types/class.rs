use super::{begin_iteration, create_with, end_iteration, next_iteration, Function};
use crate::binding::{self, bind_var, HostFunction, HostMethod, IntoReturn};
use crate::convert::{FromScript, ToScript};
use crate::error::{Error, Result};
use crate::object::{object_view, Object};
use crate::vm::Vm;
use nutbind_vm::ObjectType;

object_view!(
    /// Handle to a VM class
    Class,
    "CLASS",
    [ObjectType::Class]
);

/// The empty class returned by [`Class::get_base`] for a class without a parent
impl Default for Class {
    fn default() -> Self {
        Class(Object::default())
    }
}

impl Class {
    /// Creates a class that is not bound to any host type
    pub fn new(vm: &Vm) -> Result<Self> {
        let ctx = vm.context();
        if ctx.is_closed() {
            return Err(Error::not_initialised());
        }
        Class::try_from(create_with(ctx, |raw| raw.new_class(false))?)
    }

    /// Finds a member function, searching base classes too
    pub fn find_func(&self, name: &str) -> Result<Function> {
        Function::try_from(self.find(name)?)
    }

    /// Binds `method` as member `name`. Calls must be made on an instance whose
    /// host object is a `T`.
    pub fn add_func<T, Args, F>(&self, name: &str, method: F, is_static: bool) -> Result<Function>
    where
        T: 'static,
        Args: 'static,
        F: HostMethod<T, Args>,
        F::Output: IntoReturn,
    {
        self.add_entry(name, binding::method_entry::<T, Args, F>(name, method), is_static)
    }

    /// Binds a function that ignores `this` as static member `name`
    pub fn add_static_func<Args, F>(&self, name: &str, func: F) -> Result<Function>
    where
        Args: 'static,
        F: HostFunction<Args>,
        F::Output: IntoReturn,
    {
        self.add_entry(name, binding::function_entry(name, func), true)
    }

    fn add_entry(&self, name: &str, entry: binding::Entry, is_static: bool) -> Result<Function> {
        let ctx = self.context()?;
        let raw = ctx.raw();
        let _guard = ctx.guard();
        raw.push(self.raw().clone());
        raw.push_string(name);
        entry.push(&ctx)?;
        let function = Function::try_from(ctx.object_at(-1)?)?;
        raw.new_slot(-3, is_static)?;
        Ok(function)
    }

    /// Binds member variable `name` of host type `T` through `getter` and `setter`
    pub fn add_var<T, V, G, S>(&self, name: &str, getter: G, setter: S) -> Result<()>
    where
        T: 'static,
        V: ToScript + FromScript + 'static,
        G: Fn(&T) -> V + 'static,
        S: Fn(&mut T, V) + 'static,
    {
        let ctx = self.context()?;
        bind_var(&ctx, self.raw(), name, getter, Some(setter))
    }

    /// Binds a read-only member variable. Assigning it raises a script error.
    pub fn add_const_var<T, V, G>(&self, name: &str, getter: G) -> Result<()>
    where
        T: 'static,
        V: ToScript + FromScript + 'static,
        G: Fn(&T) -> V + 'static,
    {
        let ctx = self.context()?;
        bind_var::<T, V, G, fn(&mut T, V)>(&ctx, self.raw(), name, getter, None)
    }

    /// Creates or overwrites a static member shared by every instance
    pub fn set_static<V: ToScript>(&self, name: &str, value: V) -> Result<()> {
        let ctx = self.context()?;
        let raw = ctx.raw();
        let _guard = ctx.guard();
        raw.push(self.raw().clone());
        raw.push_string(name);
        value.push_to_stack(&ctx)?;
        raw.new_slot(-3, true)?;
        Ok(())
    }

    /// The parent class, or the empty class when there is none
    pub fn get_base(&self) -> Result<Class> {
        let ctx = self.context()?;
        let raw = ctx.raw();
        let _guard = ctx.guard();
        raw.push(self.raw().clone());
        raw.get_base(-1)?;
        let base = ctx.object_at(-1)?;
        if base.get_type() == ObjectType::Class {
            Class::try_from(base)
        } else {
            Ok(Class::default())
        }
    }

    /// True when `parent` appears in this class's base chain. A class is not
    /// derived from itself.
    pub fn is_derived_from(&self, parent: &Class) -> Result<bool> {
        let empty = Class::default();
        let mut base = self.get_base()?;
        while base != empty {
            if base == *parent {
                return Ok(true);
            }
            base = base.get_base()?;
        }
        Ok(false)
    }

    // ========================================================================
    // Iteration
    // ========================================================================

    /// Starts iterating over the class's own members
    pub fn begin_iteration(&self) -> Result<()> {
        let ctx = self.context()?;
        begin_iteration(&ctx, self.raw());
        Ok(())
    }

    pub fn next_iteration(&self, key: &mut Object, value: &mut Object) -> Result<bool> {
        next_iteration(&*self.context()?, key, value)
    }

    pub fn end_iteration(&self) -> Result<()> {
        end_iteration(&*self.context()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_without_base_returns_empty_class() {
        let vm = Vm::default();
        let class = Class::new(&vm).unwrap();
        let base = class.get_base().unwrap();
        assert!(base.is_empty());
        assert_eq!(base, Class::default());
        assert!(!class.is_derived_from(&class).unwrap());
    }

    #[test]
    fn test_static_members_are_visible_on_the_class() {
        let vm = Vm::default();
        let class = Class::new(&vm).unwrap();
        class.set_static("limit", 10).unwrap();
        assert_eq!(class.find("limit").unwrap().to::<i64>().unwrap(), 10);
    }

    #[test]
    fn test_iteration_visits_members() {
        let vm = Vm::default();
        let class = Class::new(&vm).unwrap();
        class.set_static("a", 1).unwrap();
        class.set_static("b", 2).unwrap();

        let mut key = Object::default();
        let mut value = Object::default();
        let mut seen = Vec::new();
        class.begin_iteration().unwrap();
        while class.next_iteration(&mut key, &mut value).unwrap() {
            seen.push((key.to::<String>().unwrap(), value.to::<i64>().unwrap()));
        }
        class.end_iteration().unwrap();

        assert_eq!(seen, vec![("a".to_string(), 1), ("b".to_string(), 2)]);
        assert_eq!(vm.get_top(), 0);
    }
}
