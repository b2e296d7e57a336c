//! Conversion between host values and VM stack slots
//!
//! [`ToScript`] pushes a host value onto the VM stack and [`FromScript`] reads a
//! stack slot back into a host value. Every marshaled argument and return value
//! goes through these two traits.

use crate::context::VmContext;
use crate::error::{Error, Result};
use crate::object::{type_to_str, Object};
use nutbind_vm::{ObjectType, Value};
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::rc::Rc;

/// The script `null` value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Null;

/// Host values that can be pushed onto the VM stack
pub trait ToScript {
    fn push_to_stack(self, ctx: &VmContext) -> Result<()>;
}

/// Host values that can be read from a VM stack slot
pub trait FromScript: Sized {
    fn from_stack(ctx: &VmContext, idx: isize) -> Result<Self>;
}

/// Argument lists for calls into the VM
pub trait ScriptArgs {
    /// Pushes every argument and returns how many were pushed
    fn push_all(self, ctx: &VmContext) -> Result<usize>;
}

fn slot_type(ctx: &VmContext, idx: isize) -> Result<ObjectType> {
    Ok(ctx.raw().get_type(idx)?)
}

fn mismatch(ctx: &VmContext, idx: isize, expected: ObjectType) -> Error {
    let actual = ctx
        .raw()
        .get_type(idx)
        .map(type_to_str)
        .unwrap_or("NONE");
    Error::bad_cast(type_to_str(expected), actual)
}

// ============================================================================
// Primitives
// ============================================================================

macro_rules! impl_integer {
    ($($t:ty),*) => {
        $(
            impl ToScript for $t {
                fn push_to_stack(self, ctx: &VmContext) -> Result<()> {
                    let value = i64::try_from(self).map_err(|_| Error::Type {
                        message: "integer out of range".to_string(),
                        expected: "INTEGER".to_string(),
                        actual: stringify!($t).to_string(),
                    })?;
                    ctx.raw().push_integer(value);
                    Ok(())
                }
            }

            impl FromScript for $t {
                fn from_stack(ctx: &VmContext, idx: isize) -> Result<Self> {
                    match ctx.raw().stack_value(idx)? {
                        Value::Integer(i) => <$t>::try_from(i).map_err(|_| Error::Type {
                            message: format!("integer {} out of range", i),
                            expected: stringify!($t).to_string(),
                            actual: "INTEGER".to_string(),
                        }),
                        _ => Err(mismatch(ctx, idx, ObjectType::Integer)),
                    }
                }
            }
        )*
    };
}

impl_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl ToScript for f64 {
    fn push_to_stack(self, ctx: &VmContext) -> Result<()> {
        ctx.raw().push_float(self);
        Ok(())
    }
}

impl FromScript for f64 {
    fn from_stack(ctx: &VmContext, idx: isize) -> Result<Self> {
        match slot_type(ctx, idx)? {
            ObjectType::Float | ObjectType::Integer => Ok(ctx.raw().get_float(idx)?),
            _ => Err(mismatch(ctx, idx, ObjectType::Float)),
        }
    }
}

impl ToScript for f32 {
    fn push_to_stack(self, ctx: &VmContext) -> Result<()> {
        f64::from(self).push_to_stack(ctx)
    }
}

impl FromScript for f32 {
    fn from_stack(ctx: &VmContext, idx: isize) -> Result<Self> {
        Ok(f64::from_stack(ctx, idx)? as f32)
    }
}

impl ToScript for bool {
    fn push_to_stack(self, ctx: &VmContext) -> Result<()> {
        ctx.raw().push_bool(self);
        Ok(())
    }
}

impl FromScript for bool {
    fn from_stack(ctx: &VmContext, idx: isize) -> Result<Self> {
        match slot_type(ctx, idx)? {
            ObjectType::Bool => Ok(ctx.raw().get_bool(idx)?),
            _ => Err(mismatch(ctx, idx, ObjectType::Bool)),
        }
    }
}

impl ToScript for &str {
    fn push_to_stack(self, ctx: &VmContext) -> Result<()> {
        ctx.raw().push_string(self);
        Ok(())
    }
}

impl ToScript for String {
    fn push_to_stack(self, ctx: &VmContext) -> Result<()> {
        self.as_str().push_to_stack(ctx)
    }
}

impl ToScript for &String {
    fn push_to_stack(self, ctx: &VmContext) -> Result<()> {
        self.as_str().push_to_stack(ctx)
    }
}

impl FromScript for String {
    fn from_stack(ctx: &VmContext, idx: isize) -> Result<Self> {
        match slot_type(ctx, idx)? {
            ObjectType::String => Ok(ctx.raw().get_string(idx)?.to_string()),
            _ => Err(mismatch(ctx, idx, ObjectType::String)),
        }
    }
}

impl ToScript for Null {
    fn push_to_stack(self, ctx: &VmContext) -> Result<()> {
        ctx.raw().push_null();
        Ok(())
    }
}

impl FromScript for Null {
    fn from_stack(ctx: &VmContext, idx: isize) -> Result<Self> {
        match slot_type(ctx, idx)? {
            ObjectType::Null => Ok(Null),
            _ => Err(mismatch(ctx, idx, ObjectType::Null)),
        }
    }
}

impl<T: ToScript> ToScript for Option<T> {
    fn push_to_stack(self, ctx: &VmContext) -> Result<()> {
        match self {
            Some(value) => value.push_to_stack(ctx),
            None => Null.push_to_stack(ctx),
        }
    }
}

/// `null` reads as `None`
impl<T: FromScript> FromScript for Option<T> {
    fn from_stack(ctx: &VmContext, idx: isize) -> Result<Self> {
        match slot_type(ctx, idx)? {
            ObjectType::Null => Ok(None),
            _ => T::from_stack(ctx, idx).map(Some),
        }
    }
}

// ============================================================================
// Handles and views
// ============================================================================

impl ToScript for Object {
    fn push_to_stack(self, ctx: &VmContext) -> Result<()> {
        ctx.raw().push(self.raw().clone());
        Ok(())
    }
}

impl ToScript for &Object {
    fn push_to_stack(self, ctx: &VmContext) -> Result<()> {
        ctx.raw().push(self.raw().clone());
        Ok(())
    }
}

impl FromScript for Object {
    fn from_stack(ctx: &VmContext, idx: isize) -> Result<Self> {
        ctx.object_at(idx)
    }
}

macro_rules! impl_view_conversions {
    ($($view:ty),*) => {
        $(
            impl ToScript for $view {
                fn push_to_stack(self, ctx: &VmContext) -> Result<()> {
                    Object::from(self).push_to_stack(ctx)
                }
            }

            impl ToScript for &$view {
                fn push_to_stack(self, ctx: &VmContext) -> Result<()> {
                    ctx.raw().push(self.raw().clone());
                    Ok(())
                }
            }

            impl FromScript for $view {
                fn from_stack(ctx: &VmContext, idx: isize) -> Result<Self> {
                    <$view>::try_from(ctx.object_at(idx)?)
                }
            }
        )*
    };
}

impl_view_conversions!(
    crate::types::Table,
    crate::types::Array,
    crate::types::Class,
    crate::types::Function,
    crate::types::Instance,
    crate::types::Enum
);

// ============================================================================
// Aggregates
// ============================================================================

impl<T: ToScript> ToScript for Vec<T> {
    fn push_to_stack(self, ctx: &VmContext) -> Result<()> {
        let raw = ctx.raw();
        raw.new_array(0);
        for item in self {
            if let Err(err) = item.push_to_stack(ctx) {
                raw.pop(1);
                return Err(err);
            }
            raw.array_append(-2)?;
        }
        Ok(())
    }
}

impl<T: FromScript> FromScript for Vec<T> {
    fn from_stack(ctx: &VmContext, idx: isize) -> Result<Self> {
        if slot_type(ctx, idx)? != ObjectType::Array {
            return Err(mismatch(ctx, idx, ObjectType::Array));
        }
        let raw = ctx.raw();
        let _guard = ctx.guard();
        raw.push(raw.stack_value(idx)?);
        let len = raw.size(-1)?;
        let mut items = Vec::with_capacity(len);
        for i in 0..len {
            raw.push_integer(i as i64);
            raw.raw_get(-2)?;
            items.push(T::from_stack(ctx, -1)?);
            raw.pop(1);
        }
        Ok(items)
    }
}

// ============================================================================
// Bound host objects
// ============================================================================

/// Pushes a new instance of the class registered for `T`. The VM shares the
/// object with the host and never runs a release hook for it.
impl<T: 'static> ToScript for Rc<RefCell<T>> {
    fn push_to_stack(self, ctx: &VmContext) -> Result<()> {
        let class = ctx
            .class_for(TypeId::of::<T>())
            .ok_or_else(|| Error::not_found(std::any::type_name::<T>()))?;
        let raw = ctx.raw();
        raw.push(class);
        raw.create_instance(-1)?;
        raw.remove(-2)?;
        raw.set_instance_up(-1, self as Rc<dyn Any>)?;
        Ok(())
    }
}

/// Reads the host object behind an instance of the class registered for `T`
impl<T: 'static> FromScript for Rc<RefCell<T>> {
    fn from_stack(ctx: &VmContext, idx: isize) -> Result<Self> {
        if slot_type(ctx, idx)? != ObjectType::Instance {
            return Err(mismatch(ctx, idx, ObjectType::Instance));
        }
        instance_payload::<T>(ctx, idx)
    }
}

/// Host object stored in the instance at `idx`
pub(crate) fn instance_payload<T: 'static>(ctx: &VmContext, idx: isize) -> Result<Rc<RefCell<T>>> {
    let expected = std::any::type_name::<T>();
    let payload = ctx
        .raw()
        .get_instance_up(idx, Some(TypeId::of::<T>()))
        .map_err(|_| Error::bad_cast(expected, "INSTANCE"))?
        .ok_or_else(|| Error::Type {
            message: "instance has no host object".to_string(),
            expected: expected.to_string(),
            actual: "INSTANCE".to_string(),
        })?;
    payload
        .downcast::<RefCell<T>>()
        .map_err(|_| Error::bad_cast(expected, "INSTANCE"))
}

// ============================================================================
// Argument tuples
// ============================================================================

macro_rules! impl_script_args {
    ($($arg:ident),*) => {
        impl<$($arg: ToScript),*> ScriptArgs for ($($arg,)*) {
            #[allow(non_snake_case, unused_variables)]
            fn push_all(self, ctx: &VmContext) -> Result<usize> {
                let ($($arg,)*) = self;
                let mut count = 0;
                $(
                    $arg.push_to_stack(ctx)?;
                    count += 1;
                )*
                Ok(count)
            }
        }
    };
}

impl_script_args!();
impl_script_args!(A1);
impl_script_args!(A1, A2);
impl_script_args!(A1, A2, A3);
impl_script_args!(A1, A2, A3, A4);
impl_script_args!(A1, A2, A3, A4, A5);
impl_script_args!(A1, A2, A3, A4, A5, A6);
impl_script_args!(A1, A2, A3, A4, A5, A6, A7);
impl_script_args!(A1, A2, A3, A4, A5, A6, A7, A8);
impl_script_args!(A1, A2, A3, A4, A5, A6, A7, A8, A9);
impl_script_args!(A1, A2, A3, A4, A5, A6, A7, A8, A9, A10);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vm;

    fn read_back<T: ToScript, U: FromScript>(vm: &Vm, value: T) -> Result<U> {
        let ctx = vm.context();
        let _guard = ctx.guard();
        value.push_to_stack(ctx)?;
        U::from_stack(ctx, -1)
    }

    #[test]
    fn test_integers_keep_their_value() {
        let vm = Vm::default();
        assert_eq!(read_back::<i32, i32>(&vm, -17).unwrap(), -17);
        assert_eq!(read_back::<u8, u8>(&vm, 200).unwrap(), 200);
        assert_eq!(read_back::<i64, i64>(&vm, i64::MIN).unwrap(), i64::MIN);
    }

    #[test]
    fn test_integer_out_of_range() {
        let vm = Vm::default();
        let err = read_back::<i64, u8>(&vm, 300).unwrap_err();
        assert!(matches!(err, Error::Type { .. }));
        let err = read_back::<u64, u64>(&vm, u64::MAX).unwrap_err();
        assert!(matches!(err, Error::Type { .. }));
    }

    #[test]
    fn test_integer_widens_to_float() {
        let vm = Vm::default();
        assert_eq!(read_back::<i64, f64>(&vm, 3).unwrap(), 3.0);
        let err = read_back::<f64, i64>(&vm, 3.5).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Type error bad cast expected: INTEGER got: FLOAT"
        );
    }

    #[test]
    fn test_floats_bools_and_null() {
        let vm = Vm::default();
        assert_eq!(read_back::<f64, f64>(&vm, -2.75).unwrap(), -2.75);
        assert_eq!(read_back::<f32, f32>(&vm, 1.5).unwrap(), 1.5);
        assert!(read_back::<bool, bool>(&vm, true).unwrap());
        assert!(!read_back::<bool, bool>(&vm, false).unwrap());
        assert_eq!(read_back::<Null, Null>(&vm, Null).unwrap(), Null);
        assert_eq!(
            read_back::<i64, bool>(&vm, 1).unwrap_err().to_string(),
            "Type error bad cast expected: BOOL got: INTEGER"
        );
        assert!(read_back::<Null, i64>(&vm, Null).is_err());
    }

    #[test]
    fn test_strings_and_options() {
        let vm = Vm::default();
        assert_eq!(read_back::<&str, String>(&vm, "hi").unwrap(), "hi");
        assert_eq!(read_back::<Option<i64>, Option<i64>>(&vm, None).unwrap(), None);
        assert_eq!(read_back::<Option<i64>, Option<i64>>(&vm, Some(4)).unwrap(), Some(4));
        assert!(read_back::<bool, String>(&vm, true).is_err());
    }

    #[test]
    fn test_vectors() {
        let vm = Vm::default();
        let back: Vec<String> = read_back(&vm, vec!["a", "b"]).unwrap();
        assert_eq!(back, vec!["a".to_string(), "b".to_string()]);
        assert!(read_back::<Vec<i64>, Vec<String>>(&vm, vec![1]).is_err());
    }

    #[test]
    fn test_guard_restores_stack() {
        let vm = Vm::default();
        let before = vm.get_top();
        let _: i64 = read_back(&vm, 5i64).unwrap();
        assert_eq!(vm.get_top(), before);
    }

    #[test]
    fn test_unregistered_host_type_cannot_be_pushed() {
        struct Unbound;
        let vm = Vm::default();
        let err = read_back::<_, Object>(&vm, Rc::new(RefCell::new(Unbound))).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
