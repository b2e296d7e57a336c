//! Shared state behind a [`Vm`](crate::Vm)
//!
//! Handles and bound callables reach the VM through a `Weak<VmContext>`. Once the
//! owning `Vm` is closed or dropped, every such access fails with a runtime error
//! instead of touching freed state.

use crate::convert::ScriptArgs;
use crate::error::{Error, Result};
use crate::object::Object;
use crate::types::Function;
use nutbind_vm::{RawVm, RuntimeErrorInfo, Value, VmOptions};
use rustc_hash::FxHashMap;
use std::any::TypeId;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Last compile and runtime errors. Each slot holds only the most recent error.
#[derive(Default)]
pub(crate) struct ErrorSlots {
    pub compile: RefCell<Option<Error>>,
    pub runtime: RefCell<Option<Error>>,
}

/// Accessor tables behind a class's `_get` and `_set` stubs
#[derive(Clone)]
pub(crate) struct VarTables {
    pub class: Value,
    pub getters: Value,
    pub setters: Value,
}

/// Interpreter plus the host-side state that belongs to it
pub struct VmContext {
    raw: RawVm,
    this: Weak<VmContext>,
    classes: RefCell<FxHashMap<TypeId, Value>>,
    var_tables: RefCell<Vec<VarTables>>,
    pub(crate) errors: Rc<ErrorSlots>,
}

impl VmContext {
    pub(crate) fn open(options: VmOptions) -> Rc<Self> {
        let errors = Rc::new(ErrorSlots::default());
        let raw = RawVm::open(options);

        let slots = errors.clone();
        raw.set_compiler_error_handler(Some(Rc::new(move |err: &nutbind_vm::CompileError| {
            *slots.compile.borrow_mut() = Some(Error::from(err));
        })));
        let slots = errors.clone();
        raw.set_runtime_error_handler(Some(Rc::new(move |info: &RuntimeErrorInfo| {
            *slots.runtime.borrow_mut() = Some(Error::from(info));
        })));

        Rc::new_cyclic(|this| VmContext {
            raw,
            this: this.clone(),
            classes: RefCell::new(FxHashMap::default()),
            var_tables: RefCell::new(Vec::new()),
            errors,
        })
    }

    /// The underlying stack API
    pub fn raw(&self) -> &RawVm {
        &self.raw
    }

    pub fn is_closed(&self) -> bool {
        self.raw.is_closed()
    }

    pub(crate) fn weak(&self) -> Weak<VmContext> {
        self.this.clone()
    }

    /// Wraps a VM value in a handle bound to this context
    pub(crate) fn object(&self, raw: Value) -> Object {
        Object::from_raw(self.weak(), raw)
    }

    /// Handle to the value at `idx`
    pub(crate) fn object_at(&self, idx: isize) -> Result<Object> {
        Ok(self.object(self.raw.stack_value(idx)?))
    }

    /// Saves the stack top and restores it when the guard drops
    pub(crate) fn guard(&self) -> StackGuard<'_> {
        StackGuard {
            raw: &self.raw,
            top: self.raw.top(),
        }
    }

    // ========================================================================
    // Class registry
    // ========================================================================

    pub(crate) fn register_class(&self, id: TypeId, class: Value) {
        self.classes.borrow_mut().insert(id, class);
    }

    /// Class registered for host type `id`
    pub(crate) fn class_for(&self, id: TypeId) -> Option<Value> {
        self.classes.borrow().get(&id).cloned()
    }

    pub(crate) fn var_tables(&self, class: &Value) -> Option<VarTables> {
        self.var_tables
            .borrow()
            .iter()
            .find(|t| t.class.raw_equal(class))
            .cloned()
    }

    pub(crate) fn add_var_tables(&self, tables: VarTables) {
        self.var_tables.borrow_mut().push(tables);
    }

    // ========================================================================
    // Errors
    // ========================================================================

    /// Error for a failed call: the captured runtime error, or a generic one
    pub(crate) fn runtime_failure(&self) -> Error {
        self.errors
            .runtime
            .borrow()
            .clone()
            .unwrap_or_else(|| Error::runtime("Unknown squirrel runtime error"))
    }

    /// Error for a failed compile: the captured compile error, or a generic one
    pub(crate) fn compile_failure(&self, source_name: &str) -> Error {
        self.errors
            .compile
            .borrow()
            .clone()
            .unwrap_or_else(|| Error::Compile {
                message: "Source cannot be compiled!".to_string(),
                source_name: source_name.to_string(),
                line: 0,
                column: 0,
            })
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Calls `func` with `env` as `this` and returns its result
    pub(crate) fn call_func<A: ScriptArgs>(
        &self,
        func: &Function,
        env: &Object,
        args: A,
    ) -> Result<Object> {
        let _guard = self.guard();
        self.raw.push(func.raw().clone());
        self.raw.push(env.raw().clone());
        let nargs = args.push_all(self)?;
        tracing::trace!(nargs, "calling script function");
        if self.raw.call(1 + nargs, true, true).is_err() {
            return Err(self.runtime_failure());
        }
        self.object_at(-1)
    }

    pub(crate) fn close(&self) {
        if self.raw.is_closed() {
            return;
        }
        // Registry values are released before the VM graph is broken up
        let classes = std::mem::take(&mut *self.classes.borrow_mut());
        let tables = std::mem::take(&mut *self.var_tables.borrow_mut());
        drop(classes);
        drop(tables);
        self.raw.close();
    }
}

/// Restores the stack top of a frame on drop
pub(crate) struct StackGuard<'a> {
    raw: &'a RawVm,
    top: usize,
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        if !self.raw.is_closed() {
            self.raw.set_top(self.top);
        }
    }
}
