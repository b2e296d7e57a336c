//! nutbind-vm - embedded stack-based scripting VM
//!
//! A small interpreter for a Squirrel-flavoured scripting language with a
//! reference-counted value heap. Host programs drive it through [`RawVm`], a
//! stack API in the style of classic embeddable interpreters: values are pushed,
//! operated on by index, and popped; native closures read their arguments from the
//! stack frame prepared for them.
//!
//! ```ignore
//! use nutbind_vm::{RawVm, VmOptions};
//!
//! let vm = RawVm::open(VmOptions::default());
//! vm.compile_buffer("return 1 + 2", "main.nut", true)?;
//! vm.push_root_table();
//! vm.call(1, true, true)?;
//! assert_eq!(vm.get_integer(-1)?, 3);
//! ```

pub mod ast;
pub mod error;
mod interp;
pub mod lexer;
pub mod parser;
mod stdlib;
pub mod value;
mod vm;

pub use error::{CompileError, RuntimeErrorInfo, VmError, VmResult};
pub use value::{
    Array, Class, Closure, Instance, Key, NativeClosure, NativeFn, ObjectType, ParamsCheck,
    ReleaseHook, Table, UserData, Value,
};
pub use vm::{CompileErrorHandler, PrintFn, RawVm, RuntimeErrorHandler, VmOptions};
