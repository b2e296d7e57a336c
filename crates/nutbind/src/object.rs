//! Reference-counted value handle
//!
//! An [`Object`] owns one reference to a VM value. Cloning takes another reference
//! and dropping releases it; moving a handle leaves the count untouched. Handles
//! compare by identity of the underlying value.

use crate::context::VmContext;
use crate::convert::FromScript;
use crate::error::{Error, Result};
use nutbind_vm::{ObjectType, Value};
use std::fmt;
use std::rc::{Rc, Weak};

/// Upper-case name of a VM type, as used in type errors
pub fn type_to_str(ty: ObjectType) -> &'static str {
    match ty {
        ObjectType::Null => "NULL",
        ObjectType::Bool => "BOOL",
        ObjectType::Integer => "INTEGER",
        ObjectType::Float => "FLOAT",
        ObjectType::String => "STRING",
        ObjectType::Table => "TABLE",
        ObjectType::Array => "ARRAY",
        ObjectType::Closure => "CLOSURE",
        ObjectType::NativeClosure => "NATIVECLOSURE",
        ObjectType::Class => "CLASS",
        ObjectType::Instance => "INSTANCE",
        ObjectType::UserData => "USERDATA",
    }
}

/// Handle to one VM value
#[derive(Clone, Default)]
pub struct Object {
    vm: Option<Weak<VmContext>>,
    raw: Value,
}

impl Object {
    pub(crate) fn from_raw(vm: Weak<VmContext>, raw: Value) -> Self {
        Self { vm: Some(vm), raw }
    }

    /// The wrapped VM value
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// True for a handle that is not bound to any VM
    pub fn is_empty(&self) -> bool {
        self.vm.is_none()
    }

    pub fn is_null(&self) -> bool {
        self.raw.is_null()
    }

    pub fn get_type(&self) -> ObjectType {
        self.raw.object_type()
    }

    pub fn type_name(&self) -> &'static str {
        type_to_str(self.get_type())
    }

    /// References currently held on the value, this handle included. Primitives
    /// report 0.
    pub fn ref_count(&self) -> usize {
        self.raw.ref_count()
    }

    /// The owning VM context, failing once the VM is closed
    pub(crate) fn context(&self) -> Result<Rc<VmContext>> {
        let ctx = self
            .vm
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(Error::not_initialised)?;
        if ctx.is_closed() {
            return Err(Error::not_initialised());
        }
        Ok(ctx)
    }

    /// Looks up `name` in this table, class or instance without delegates
    pub fn find(&self, name: &str) -> Result<Object> {
        let ctx = self.context()?;
        let raw = ctx.raw();
        let _guard = ctx.guard();
        raw.push(self.raw.clone());
        raw.push_string(name);
        if raw.raw_get(-2).is_err() {
            return Err(Error::not_found(name));
        }
        ctx.object_at(-1)
    }

    /// Converts the value to a host type
    pub fn to<T: FromScript>(&self) -> Result<T> {
        let ctx = self.context()?;
        let _guard = ctx.guard();
        ctx.raw().push(self.raw.clone());
        T::from_stack(&ctx, -1)
    }

    /// Fails with a Type error unless the value has one of `accepted` types
    pub(crate) fn expect_type(&self, expected: &str, accepted: &[ObjectType]) -> Result<()> {
        if accepted.contains(&self.get_type()) {
            Ok(())
        } else {
            Err(Error::bad_cast(expected, self.type_name()))
        }
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.raw.raw_equal(&other.raw)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("type", &self.type_name())
            .field("value", &self.raw)
            .finish()
    }
}

/// Defines a typed view over [`Object`]
macro_rules! object_view {
    ($(#[$meta:meta])* $name:ident, $expected:literal, [$($ty:path),+]) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq)]
        pub struct $name(crate::object::Object);

        impl std::ops::Deref for $name {
            type Target = crate::object::Object;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl TryFrom<crate::object::Object> for $name {
            type Error = crate::error::Error;

            fn try_from(object: crate::object::Object) -> crate::error::Result<Self> {
                object.expect_type($expected, &[$($ty),+])?;
                Ok($name(object))
            }
        }

        impl From<$name> for crate::object::Object {
            fn from(view: $name) -> Self {
                view.0
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.0).finish()
            }
        }
    };
}

pub(crate) use object_view;
