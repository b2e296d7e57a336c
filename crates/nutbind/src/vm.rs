//! VM lifecycle, compilation and error capture

use crate::context::VmContext;
use crate::convert::ScriptArgs;
use crate::error::{Error, Result};
use crate::object::{type_to_str, Object};
use crate::types::{Enum, Function, Script, Table};
use std::ops::{BitOr, Deref};
use std::path::Path;
use std::rc::Rc;

/// Optional standard libraries registered when a VM opens
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Libs(u8);

impl Libs {
    pub const MATH: Libs = Libs(1);
    pub const STRING: Libs = Libs(1 << 1);
    pub const ALL: Libs = Libs(Self::MATH.0 | Self::STRING.0);

    pub const fn empty() -> Self {
        Libs(0)
    }

    pub const fn contains(self, other: Libs) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Libs {
    type Output = Libs;

    fn bitor(self, rhs: Libs) -> Libs {
        Libs(self.0 | rhs.0)
    }
}

/// Options for [`Vm::new`]
#[derive(Debug, Clone)]
pub struct VmOptions {
    /// Maximum number of values on the evaluation stack
    pub stack_size: usize,
    /// Maximum nesting of calls, host re-entry included
    pub max_call_depth: usize,
    pub libs: Libs,
}

impl Default for VmOptions {
    fn default() -> Self {
        let raw = nutbind_vm::VmOptions::default();
        Self {
            stack_size: raw.stack_size,
            max_call_depth: raw.max_call_depth,
            libs: Libs::empty(),
        }
    }
}

/// An open VM and its root table
///
/// `Vm` dereferences to the root [`Table`], so globals are registered directly on
/// it. Dropping the VM closes it; handles that outlive it fail with a runtime
/// error.
///
/// A VM is single-threaded. The last compile and runtime errors are kept in one
/// slot each, overwritten by the next failure of the same kind.
pub struct Vm {
    ctx: Rc<VmContext>,
    root: Table,
}

impl Vm {
    pub fn new(options: VmOptions) -> Self {
        let libs = options.libs;
        let ctx = VmContext::open(nutbind_vm::VmOptions {
            stack_size: options.stack_size,
            max_call_depth: options.max_call_depth,
        });
        if libs.contains(Libs::MATH) {
            ctx.raw().register_math_lib();
        }
        if libs.contains(Libs::STRING) {
            ctx.raw().register_string_lib();
        }
        let root = Table::root(&ctx);
        tracing::debug!(?libs, "vm ready");
        Self { ctx, root }
    }

    /// Shared state used by handles and bound callables
    pub fn context(&self) -> &VmContext {
        &self.ctx
    }

    /// The global namespace
    pub fn root_table(&self) -> Table {
        self.root.clone()
    }

    /// Number of values on the stack. Every library call leaves it unchanged.
    pub fn get_top(&self) -> usize {
        self.ctx.raw().top()
    }

    // ========================================================================
    // Compilation and execution
    // ========================================================================

    /// Compiles `source`; `name` appears in error locations
    pub fn compile_source(&self, source: &str, name: &str) -> Result<Script> {
        self.check_open()?;
        tracing::debug!(source_name = name, "compiling script");
        let raw = self.ctx.raw();
        let _guard = self.ctx.guard();
        if raw.compile_buffer(source, name, true).is_err() {
            return Err(self.ctx.compile_failure(name));
        }
        Script::try_from(self.ctx.object_at(-1)?)
    }

    /// Compiles a script file. A file that cannot be read is a Compile error at
    /// line 0.
    pub fn compile_file(&self, path: impl AsRef<Path>) -> Result<Script> {
        self.check_open()?;
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "compiling script file");
        let raw = self.ctx.raw();
        let _guard = self.ctx.guard();
        if raw.compile_file(path, true).is_err() {
            return Err(self.ctx.compile_failure(&path.display().to_string()));
        }
        Script::try_from(self.ctx.object_at(-1)?)
    }

    /// Runs `script` with the root table as `this`
    pub fn run(&self, script: &Script) -> Result<()> {
        self.execute(script, false).map(drop)
    }

    /// Runs `script` and returns the value of its top-level `return`
    pub fn evaluate(&self, script: &Script) -> Result<Object> {
        self.execute(script, true)
            .map(|value| value.unwrap_or_default())
    }

    fn execute(&self, script: &Script, retval: bool) -> Result<Option<Object>> {
        self.check_open()?;
        let raw = self.ctx.raw();
        let _guard = self.ctx.guard();
        raw.push(script.raw().clone());
        raw.push_root_table();
        if raw.call(1, retval, true).is_err() {
            return Err(self.ctx.runtime_failure());
        }
        if retval {
            Ok(Some(self.ctx.object_at(-1)?))
        } else {
            Ok(None)
        }
    }

    /// Calls `func` with `env` as `this`
    pub fn call_func<A: ScriptArgs>(&self, func: &Function, env: &Object, args: A) -> Result<Object> {
        self.check_open()?;
        self.ctx.call_func(func, env, args)
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Creates an enum in the const table. Scripts read its slots as
    /// `Name.slot` unless a global of the same name shadows it.
    pub fn add_enum(&self, name: &str) -> Result<Enum> {
        self.check_open()?;
        let raw = self.ctx.raw();
        let _guard = self.ctx.guard();
        raw.push_const_table();
        raw.push_string(name);
        raw.new_table();
        let table = Enum::try_from(self.ctx.object_at(-1)?)?;
        raw.new_slot(-3, false)?;
        Ok(table)
    }

    // ========================================================================
    // Errors and output
    // ========================================================================

    /// The most recent compile error, if any
    pub fn last_compile_error(&self) -> Option<Error> {
        self.ctx.errors.compile.borrow().clone()
    }

    /// The most recent uncaught runtime error, if any
    pub fn last_runtime_error(&self) -> Option<Error> {
        self.ctx.errors.runtime.borrow().clone()
    }

    /// Replaces the function behind the script `print`
    pub fn set_print_func(&self, f: impl Fn(&str) + 'static) {
        self.ctx.raw().set_print_func(Rc::new(f));
    }

    /// Replaces the function behind the script `error`
    pub fn set_error_func(&self, f: impl Fn(&str) + 'static) {
        self.ctx.raw().set_error_func(Rc::new(f));
    }

    /// Prints the type of every stack slot through the print function
    pub fn debug_stack(&self) {
        let raw = self.ctx.raw();
        for idx in 1..=raw.top() {
            let Ok(ty) = raw.get_type(idx as isize) else {
                continue;
            };
            raw.print(&format!("stack index: {} type: {}", idx, type_to_str(ty)));
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub fn is_closed(&self) -> bool {
        self.ctx.is_closed()
    }

    /// Releases the class registry and every VM value. Handles still alive fail
    /// from now on.
    pub fn close(&self) {
        if self.ctx.is_closed() {
            return;
        }
        self.ctx.close();
    }

    fn check_open(&self) -> Result<()> {
        if self.ctx.is_closed() {
            Err(Error::not_initialised())
        } else {
            Ok(())
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new(VmOptions::default())
    }
}

impl Deref for Vm {
    type Target = Table;

    fn deref(&self) -> &Table {
        &self.root
    }
}

impl Drop for Vm {
    fn drop(&mut self) {
        self.close();
    }
}
