//! nutbind - host bindings for the nutbind scripting VM
//!
//! Register host functions, types and values with an embedded VM and call back
//! into scripts, with arguments and results converted automatically.
//!
//! # Example
//!
//! ```ignore
//! use nutbind::{Vm, Result};
//!
//! struct Point {
//!     x: i64,
//!     y: i64,
//! }
//!
//! fn main() -> Result<()> {
//!     let vm = Vm::default();
//!     let class = vm.add_class("Point", |x: i64, y: i64| Point { x, y })?;
//!     class.add_var("x", |p: &Point| p.x, |p: &mut Point, v: i64| p.x = v)?;
//!     class.add_func("len2", |p: &mut Point| p.x * p.x + p.y * p.y, false)?;
//!
//!     let script = vm.compile_source("local p = Point(3, 4); return p.len2()", "main.nut")?;
//!     assert_eq!(vm.evaluate(&script)?.to::<i64>()?, 25);
//!     Ok(())
//! }
//! ```
//!
//! # Ownership
//!
//! [`Object`] and the typed views hold one VM reference each. Host objects bound to
//! instances live in `Rc<RefCell<T>>`; depending on how the class was registered the
//! VM either owns them or only shares them with the host.
//!
//! # Errors
//!
//! Host callables never unwind into the VM. An `Err` return or a panic becomes a
//! script error carrying the message, which scripts can catch with `try`/`catch`.

mod binding;
mod context;
mod convert;
mod error;
mod object;
mod tags;
mod types;
mod vm;

pub use binding::{HostFunction, HostMethod, IntoReturn};
pub use context::VmContext;
pub use convert::{FromScript, Null, ScriptArgs, ToScript};
pub use error::{Error, Result};
pub use object::{type_to_str, Object};
pub use tags::{param_tag, WILDCARD};
pub use types::{Array, Class, Enum, Function, Instance, Script, Table};
pub use vm::{Libs, Vm, VmOptions};

pub use nutbind_vm::ObjectType;
