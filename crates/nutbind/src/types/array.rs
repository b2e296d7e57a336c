use super::create_with;
use crate::convert::{FromScript, ToScript};
use crate::error::{Error, Result};
use crate::object::object_view;
use crate::vm::Vm;
use nutbind_vm::ObjectType;

object_view!(
    /// Handle to a VM array
    Array,
    "ARRAY",
    [ObjectType::Array]
);

impl Array {
    /// Creates an array of `len` nulls
    pub fn new(vm: &Vm, len: usize) -> Result<Self> {
        let ctx = vm.context();
        if ctx.is_closed() {
            return Err(Error::not_initialised());
        }
        Array::try_from(create_with(ctx, |raw| {
            raw.new_array(len);
            Ok(())
        })?)
    }

    pub fn size(&self) -> Result<usize> {
        let ctx = self.context()?;
        let _guard = ctx.guard();
        ctx.raw().push(self.raw().clone());
        Ok(ctx.raw().size(-1)?)
    }

    /// Appends `value`
    pub fn push<V: ToScript>(&self, value: V) -> Result<()> {
        let ctx = self.context()?;
        let raw = ctx.raw();
        let _guard = ctx.guard();
        raw.push(self.raw().clone());
        value.push_to_stack(&ctx)?;
        raw.array_append(-2)?;
        Ok(())
    }

    /// Removes and returns the last element
    pub fn pop<T: FromScript>(&self) -> Result<T> {
        let ctx = self.context()?;
        let raw = ctx.raw();
        let _guard = ctx.guard();
        raw.push(self.raw().clone());
        if raw.size(-1)? == 0 {
            return Err(Error::not_found("-1"));
        }
        raw.array_pop(-1, true)?;
        T::from_stack(&ctx, -1)
    }

    /// Element at `index`
    pub fn get<T: FromScript>(&self, index: usize) -> Result<T> {
        let ctx = self.context()?;
        let raw = ctx.raw();
        let _guard = ctx.guard();
        raw.push(self.raw().clone());
        raw.push_integer(to_key(index)?);
        if raw.raw_get(-2).is_err() {
            return Err(Error::not_found(index.to_string()));
        }
        T::from_stack(&ctx, -1)
    }

    /// Overwrites the element at `index`
    pub fn set<V: ToScript>(&self, index: usize, value: V) -> Result<()> {
        let ctx = self.context()?;
        let raw = ctx.raw();
        let _guard = ctx.guard();
        raw.push(self.raw().clone());
        raw.push_integer(to_key(index)?);
        value.push_to_stack(&ctx)?;
        raw.set(-3).map_err(|_| Error::not_found(index.to_string()))
    }

    /// Converts every element
    pub fn to_vec<T: FromScript>(&self) -> Result<Vec<T>> {
        self.to::<Vec<T>>()
    }
}

fn to_key(index: usize) -> Result<i64> {
    i64::try_from(index).map_err(|_| Error::not_found(index.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_get_set_pop() {
        let vm = Vm::default();
        let array = Array::new(&vm, 0).unwrap();
        array.push(1).unwrap();
        array.push("two").unwrap();
        assert_eq!(array.size().unwrap(), 2);
        assert_eq!(array.get::<i64>(0).unwrap(), 1);

        array.set(0, 10).unwrap();
        assert_eq!(array.get::<i64>(0).unwrap(), 10);
        assert_eq!(array.pop::<String>().unwrap(), "two");
        assert_eq!(array.size().unwrap(), 1);
    }

    #[test]
    fn test_out_of_range() {
        let vm = Vm::default();
        let array = Array::new(&vm, 2).unwrap();
        assert!(array.get::<Option<i64>>(1).unwrap().is_none());
        assert_eq!(
            array.get::<i64>(5).unwrap_err(),
            Error::NotFound {
                name: "5".to_string()
            }
        );
        assert!(matches!(array.set(2, 0), Err(Error::NotFound { .. })));
        array.pop::<Option<i64>>().unwrap();
        array.pop::<Option<i64>>().unwrap();
        assert!(matches!(array.pop::<i64>(), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_to_vec() {
        let vm = Vm::default();
        let array = Array::new(&vm, 0).unwrap();
        for i in 0..4 {
            array.push(i * i).unwrap();
        }
        assert_eq!(array.to_vec::<i32>().unwrap(), vec![0, 1, 4, 9]);
    }
}
