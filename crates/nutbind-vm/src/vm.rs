//! Stack API of the VM
//!
//! [`RawVm`] is the surface embedders program against: values are moved through
//! an explicit evaluation stack, and native closures read their arguments from the
//! stack frame the VM sets up for them. Stack indexes are 1-based from the frame
//! base when positive and relative to the top when negative.
//!
//! Every method takes `&self` so a native closure can re-enter the VM while it is
//! being called. No interior borrow is held across a call into script or host code.

use crate::ast::FunctionProto;
use crate::error::{CompileError, RuntimeErrorInfo, VmError, VmResult};
use crate::parser;
use crate::stdlib;
use crate::value::{
    clear_graph, Array, Class, Closure, Instance, NativeClosure, NativeFn, ObjectType,
    ParamsCheck, ReleaseHook, Table, UserData, Value,
};
use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;

/// Options for opening a VM
#[derive(Debug, Clone)]
pub struct VmOptions {
    /// Maximum number of values on the evaluation stack
    pub stack_size: usize,

    /// Maximum nesting of function calls
    pub max_call_depth: usize,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            stack_size: 1024,
            max_call_depth: 128,
        }
    }
}

pub type PrintFn = Rc<dyn Fn(&str)>;
pub type CompileErrorHandler = Rc<dyn Fn(&CompileError)>;
pub type RuntimeErrorHandler = Rc<dyn Fn(&RuntimeErrorInfo)>;

/// Location of the script function currently executing
#[derive(Debug, Clone)]
pub(crate) struct FrameInfo {
    pub name: Option<Rc<str>>,
    pub source: Rc<str>,
    pub line: u32,
}

/// Built-in methods looked up on non-container values
pub(crate) struct Delegates {
    pub table: Rc<Table>,
    pub array: Rc<Table>,
    pub string: Rc<Table>,
    pub number: Rc<Table>,
}

/// An embedded VM instance
pub struct RawVm {
    pub(crate) options: VmOptions,
    pub(crate) stack: RefCell<Vec<Value>>,
    pub(crate) base: Cell<usize>,
    pub(crate) depth: Cell<usize>,
    pub(crate) root: Rc<Table>,
    pub(crate) consts: Rc<Table>,
    pub(crate) delegates: Delegates,
    pub(crate) frames: RefCell<Vec<FrameInfo>>,
    pub(crate) error_site: RefCell<Option<RuntimeErrorInfo>>,
    last_error: RefCell<Value>,
    print_fn: RefCell<PrintFn>,
    error_fn: RefCell<PrintFn>,
    compile_handler: RefCell<Option<CompileErrorHandler>>,
    runtime_handler: RefCell<Option<RuntimeErrorHandler>>,
    closed: Cell<bool>,
}

impl RawVm {
    /// Opens a VM with the base library registered
    pub fn open(options: VmOptions) -> Self {
        tracing::debug!(
            stack_size = options.stack_size,
            max_call_depth = options.max_call_depth,
            "opening vm"
        );
        let vm = Self {
            options,
            stack: RefCell::new(Vec::new()),
            base: Cell::new(0),
            depth: Cell::new(0),
            root: Rc::new(Table::new()),
            consts: Rc::new(Table::new()),
            delegates: stdlib::delegates(),
            frames: RefCell::new(Vec::new()),
            error_site: RefCell::new(None),
            last_error: RefCell::new(Value::Null),
            print_fn: RefCell::new(Rc::new(|s: &str| println!("{}", s)) as PrintFn),
            error_fn: RefCell::new(Rc::new(|s: &str| eprintln!("{}", s)) as PrintFn),
            compile_handler: RefCell::new(None),
            runtime_handler: RefCell::new(None),
            closed: Cell::new(false),
        };
        stdlib::register_base_lib(&vm);
        vm
    }

    /// Releases every value owned by the VM. Reference cycles among VM values are
    /// broken here; afterwards the VM is empty.
    pub fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        tracing::debug!("closing vm");
        let mut roots: Vec<Value> = std::mem::take(&mut *self.stack.borrow_mut());
        roots.push(Value::Table(self.root.clone()));
        roots.push(Value::Table(self.consts.clone()));
        roots.push(Value::Table(self.delegates.table.clone()));
        roots.push(Value::Table(self.delegates.array.clone()));
        roots.push(Value::Table(self.delegates.string.clone()));
        roots.push(Value::Table(self.delegates.number.clone()));
        roots.push(std::mem::take(&mut *self.last_error.borrow_mut()));
        self.base.set(0);
        self.compile_handler.borrow_mut().take();
        self.runtime_handler.borrow_mut().take();
        clear_graph(roots);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    // ========================================================================
    // Stack
    // ========================================================================

    fn abs_index(&self, idx: isize) -> VmResult<usize> {
        let len = self.stack.borrow().len();
        let base = self.base.get();
        let abs = if idx > 0 {
            Some(base + idx as usize - 1)
        } else if idx < 0 {
            len.checked_sub(idx.unsigned_abs())
        } else {
            None
        };
        match abs {
            Some(i) if i >= base && i < len => Ok(i),
            _ => Err(VmError::msg(format!("invalid stack index {}", idx))),
        }
    }

    /// Number of values in the current frame
    pub fn top(&self) -> usize {
        self.stack.borrow().len().saturating_sub(self.base.get())
    }

    /// Truncates or null-extends the current frame to `n` values
    pub fn set_top(&self, n: usize) {
        let target = self.base.get() + n;
        let removed = {
            let mut stack = self.stack.borrow_mut();
            if target < stack.len() {
                stack.split_off(target)
            } else {
                stack.resize(target, Value::Null);
                Vec::new()
            }
        };
        drop(removed);
    }

    pub fn pop(&self, n: usize) {
        let top = self.top();
        self.set_top(top.saturating_sub(n));
    }

    pub fn remove(&self, idx: isize) -> VmResult<()> {
        let i = self.abs_index(idx)?;
        let removed = self.stack.borrow_mut().remove(i);
        drop(removed);
        Ok(())
    }

    pub fn push(&self, value: Value) {
        self.stack.borrow_mut().push(value);
    }

    pub fn push_null(&self) {
        self.push(Value::Null);
    }

    pub fn push_bool(&self, b: bool) {
        self.push(Value::Bool(b));
    }

    pub fn push_integer(&self, i: i64) {
        self.push(Value::Integer(i));
    }

    pub fn push_float(&self, f: f64) {
        self.push(Value::Float(f));
    }

    pub fn push_string(&self, s: &str) {
        self.push(Value::string(s));
    }

    pub fn push_root_table(&self) {
        self.push(Value::Table(self.root.clone()));
    }

    pub fn push_const_table(&self) {
        self.push(Value::Table(self.consts.clone()));
    }

    pub fn root_table(&self) -> Rc<Table> {
        self.root.clone()
    }

    pub fn const_table(&self) -> Rc<Table> {
        self.consts.clone()
    }

    pub fn stack_value(&self, idx: isize) -> VmResult<Value> {
        let i = self.abs_index(idx)?;
        Ok(self.stack.borrow()[i].clone())
    }

    /// Values of the current frame, bottom first
    pub fn frame_values(&self) -> Vec<Value> {
        let base = self.base.get();
        self.stack.borrow().get(base..).map(<[Value]>::to_vec).unwrap_or_default()
    }

    pub fn get_type(&self, idx: isize) -> VmResult<ObjectType> {
        Ok(self.stack_value(idx)?.object_type())
    }

    /// Integer at `idx`; floats are truncated
    pub fn get_integer(&self, idx: isize) -> VmResult<i64> {
        match self.stack_value(idx)? {
            Value::Integer(i) => Ok(i),
            Value::Float(f) => Ok(f as i64),
            other => Err(type_error("integer", &other)),
        }
    }

    /// Float at `idx`; integers are widened
    pub fn get_float(&self, idx: isize) -> VmResult<f64> {
        match self.stack_value(idx)? {
            Value::Float(f) => Ok(f),
            Value::Integer(i) => Ok(i as f64),
            other => Err(type_error("float", &other)),
        }
    }

    pub fn get_bool(&self, idx: isize) -> VmResult<bool> {
        match self.stack_value(idx)? {
            Value::Bool(b) => Ok(b),
            other => Err(type_error("bool", &other)),
        }
    }

    pub fn get_string(&self, idx: isize) -> VmResult<Rc<str>> {
        match self.stack_value(idx)? {
            Value::String(s) => Ok(s),
            other => Err(type_error("string", &other)),
        }
    }

    // ========================================================================
    // Object creation
    // ========================================================================

    pub fn new_table(&self) {
        self.push(Value::Table(Rc::new(Table::new())));
    }

    /// Pushes an array of `size` nulls
    pub fn new_array(&self, size: usize) {
        self.push(Value::Array(Rc::new(Array::new(vec![Value::Null; size]))));
    }

    /// Pushes a new class. With `has_base` the base class is popped from the top first.
    pub fn new_class(&self, has_base: bool) -> VmResult<()> {
        let base = if has_base {
            match self.stack_value(-1)? {
                Value::Class(base) => {
                    self.pop(1);
                    Some(base)
                }
                other => return Err(type_error("class", &other)),
            }
        } else {
            None
        };
        self.push(Value::Class(Rc::new(Class::new(base))));
        Ok(())
    }

    /// Pops `nfree` values and pushes a native closure carrying them as free variables
    pub fn new_closure(&self, func: NativeFn, nfree: usize) -> VmResult<()> {
        let outers = {
            let mut stack = self.stack.borrow_mut();
            let start = stack
                .len()
                .checked_sub(nfree)
                .filter(|start| *start >= self.base.get())
                .ok_or_else(|| VmError::msg("not enough free variables on the stack"))?;
            stack.split_off(start)
        };
        self.push(Value::NativeClosure(Rc::new(NativeClosure::new(func, outers))));
        Ok(())
    }

    pub fn new_user_data(&self, data: Rc<dyn Any>) {
        self.push(Value::UserData(Rc::new(UserData::new(data))));
    }

    /// Sets the hook run when the userdata or instance payload at `idx` is released
    pub fn set_release_hook(&self, idx: isize, hook: ReleaseHook) -> VmResult<()> {
        match self.stack_value(idx)? {
            Value::UserData(ud) => *ud.release.borrow_mut() = Some(hook),
            Value::Instance(inst) => *inst.release.borrow_mut() = Some(hook),
            other => return Err(type_error("userdata or instance", &other)),
        }
        Ok(())
    }

    pub fn get_user_data(&self, idx: isize) -> VmResult<(Rc<dyn Any>, Option<TypeId>)> {
        match self.stack_value(idx)? {
            Value::UserData(ud) => Ok((ud.data(), ud.type_tag())),
            other => Err(type_error("userdata", &other)),
        }
    }

    // ========================================================================
    // Type tags and closures
    // ========================================================================

    pub fn set_type_tag(&self, idx: isize, tag: TypeId) -> VmResult<()> {
        match self.stack_value(idx)? {
            Value::Class(class) => class.type_tag.set(Some(tag)),
            Value::UserData(ud) => ud.type_tag.set(Some(tag)),
            other => return Err(type_error("class or userdata", &other)),
        }
        Ok(())
    }

    /// Tag of a class, an instance's class, or a userdata
    pub fn get_type_tag(&self, idx: isize) -> VmResult<Option<TypeId>> {
        match self.stack_value(idx)? {
            Value::Class(class) => Ok(class.type_tag()),
            Value::Instance(inst) => Ok(inst.class.type_tag()),
            Value::UserData(ud) => Ok(ud.type_tag()),
            other => Err(type_error("class, instance or userdata", &other)),
        }
    }

    /// Installs the argument check on the native closure at the top of the stack
    pub fn set_params_check(&self, nparams: i64, typemask: &str) -> VmResult<()> {
        match self.stack_value(-1)? {
            Value::NativeClosure(nc) => {
                *nc.params.borrow_mut() = Some(ParamsCheck::new(nparams, typemask)?);
                Ok(())
            }
            other => Err(type_error("native closure", &other)),
        }
    }

    pub fn set_native_closure_name(&self, idx: isize, name: &str) -> VmResult<()> {
        match self.stack_value(idx)? {
            Value::NativeClosure(nc) => {
                *nc.name.borrow_mut() = Some(Rc::from(name));
                Ok(())
            }
            other => Err(type_error("native closure", &other)),
        }
    }

    /// Declared parameter count, `this` included
    pub fn closure_nparams(&self, idx: isize) -> VmResult<i64> {
        match self.stack_value(idx)? {
            Value::Closure(c) => Ok(c.proto.params.len() as i64 + 1),
            Value::NativeClosure(nc) => Ok(nc.nparams()),
            other => Err(type_error("closure", &other)),
        }
    }

    // ========================================================================
    // Classes and instances
    // ========================================================================

    /// Pushes a new instance of the class at `idx` without running its constructor
    pub fn create_instance(&self, idx: isize) -> VmResult<()> {
        match self.stack_value(idx)? {
            Value::Class(class) => {
                let inst = self.instantiate(&class)?;
                self.push(Value::Instance(inst));
                Ok(())
            }
            other => Err(type_error("class", &other)),
        }
    }

    pub(crate) fn instantiate(&self, class: &Rc<Class>) -> VmResult<Rc<Instance>> {
        let fields = Table::new();
        class.field_defaults(&fields)?;
        Ok(Rc::new(Instance {
            class: class.clone(),
            fields,
            user_pointer: RefCell::new(None),
            release: RefCell::new(None),
        }))
    }

    pub fn set_instance_up(&self, idx: isize, up: Rc<dyn Any>) -> VmResult<()> {
        match self.stack_value(idx)? {
            Value::Instance(inst) => {
                let old = inst.user_pointer.replace(Some(up));
                drop(old);
                Ok(())
            }
            other => Err(type_error("instance", &other)),
        }
    }

    /// Payload of the instance at `idx`. With `tag`, the instance's class chain must
    /// carry that tag.
    pub fn get_instance_up(
        &self,
        idx: isize,
        tag: Option<TypeId>,
    ) -> VmResult<Option<Rc<dyn Any>>> {
        match self.stack_value(idx)? {
            Value::Instance(inst) => {
                if let Some(tag) = tag {
                    if !class_chain_has_tag(&inst.class, tag) {
                        return Err(VmError::msg("invalid type tag"));
                    }
                }
                Ok(inst.user_pointer())
            }
            other => Err(type_error("instance", &other)),
        }
    }

    /// Pushes the base of the class at `idx`, or null
    pub fn get_base(&self, idx: isize) -> VmResult<()> {
        match self.stack_value(idx)? {
            Value::Class(class) => {
                self.push(class.base().map(Value::Class).unwrap_or_default());
                Ok(())
            }
            other => Err(type_error("class", &other)),
        }
    }

    /// Pushes the class of the instance at `idx`
    pub fn get_class(&self, idx: isize) -> VmResult<()> {
        match self.stack_value(idx)? {
            Value::Instance(inst) => {
                self.push(Value::Class(inst.class()));
                Ok(())
            }
            other => Err(type_error("instance", &other)),
        }
    }

    // ========================================================================
    // Slots
    // ========================================================================

    fn pop_value(&self) -> VmResult<Value> {
        let value = self.stack_value(-1)?;
        self.pop(1);
        Ok(value)
    }

    /// Pops a key and pushes `container[key]`, consulting delegates and `_get`
    pub fn get(&self, idx: isize) -> VmResult<()> {
        let container = self.stack_value(idx)?;
        let key = self.pop_value()?;
        let value = self.get_slot(&container, &key)?;
        self.push(value);
        Ok(())
    }

    /// Like [`RawVm::get`] without delegates or metamethods
    pub fn raw_get(&self, idx: isize) -> VmResult<()> {
        let container = self.stack_value(idx)?;
        let key = self.pop_value()?;
        let found = match &container {
            Value::Table(t) => t.get(&key)?,
            Value::Class(c) => c.get(&key)?,
            Value::Instance(i) => i.raw_get(&key)?,
            Value::Array(a) => match key {
                Value::Integer(i) => a.get(i),
                _ => None,
            },
            other => return Err(type_error("table, class, instance or array", other)),
        };
        match found {
            Some(value) => {
                self.push(value);
                Ok(())
            }
            None => Err(index_error(&key)),
        }
    }

    /// Pops a value and a key and assigns an existing slot
    pub fn set(&self, idx: isize) -> VmResult<()> {
        let container = self.stack_value(idx)?;
        let value = self.pop_value()?;
        let key = self.pop_value()?;
        self.set_slot(&container, &key, value)
    }

    /// Pops a value and a key and creates or overwrites the slot
    pub fn new_slot(&self, idx: isize, is_static: bool) -> VmResult<()> {
        let container = self.stack_value(idx)?;
        let value = self.pop_value()?;
        let key = self.pop_value()?;
        self.new_slot_in(&container, key, value, is_static)
    }

    /// Advances the iterator at the top of the stack over the container at `idx`.
    ///
    /// The iterator starts as null. On success the iterator slot is updated and the
    /// key and value are pushed; at the end nothing is pushed and `false` is returned.
    pub fn next(&self, idx: isize) -> VmResult<bool> {
        let container = self.stack_value(idx)?;
        let pos = match self.stack_value(-1)? {
            Value::Null => 0,
            Value::Integer(p) => usize::try_from(p).unwrap_or(usize::MAX),
            other => return Err(type_error("iterator", &other)),
        };
        let entry = match &container {
            Value::Table(t) => t.entry_at(pos),
            Value::Class(c) => c.members.entry_at(pos),
            Value::Instance(i) => i.fields.entry_at(pos),
            Value::Array(a) => a.get(pos as i64).map(|v| (Value::Integer(pos as i64), v)),
            other => return Err(type_error("table, class, instance or array", other)),
        };
        let Some((key, value)) = entry else {
            return Ok(false);
        };
        let iter = self.abs_index(-1)?;
        self.stack.borrow_mut()[iter] = Value::Integer(pos as i64 + 1);
        self.push(key);
        self.push(value);
        Ok(true)
    }

    pub fn size(&self, idx: isize) -> VmResult<usize> {
        match self.stack_value(idx)? {
            Value::Table(t) => Ok(t.len()),
            Value::Array(a) => Ok(a.len()),
            Value::Class(c) => Ok(c.members.len()),
            Value::Instance(i) => Ok(i.fields.len()),
            Value::String(s) => Ok(s.len()),
            other => Err(type_error("sized object", &other)),
        }
    }

    /// Pops a value and appends it to the array at `idx`
    pub fn array_append(&self, idx: isize) -> VmResult<()> {
        let array = self.stack_value(idx)?;
        let value = self.pop_value()?;
        match array {
            Value::Array(a) => {
                a.push(value);
                Ok(())
            }
            other => Err(type_error("array", &other)),
        }
    }

    /// Removes the last element of the array at `idx`, pushing it when `push_value`
    pub fn array_pop(&self, idx: isize, push_value: bool) -> VmResult<()> {
        match self.stack_value(idx)? {
            Value::Array(a) => {
                let value = a.pop().ok_or_else(|| VmError::msg("empty array"))?;
                if push_value {
                    self.push(value);
                }
                Ok(())
            }
            other => Err(type_error("array", &other)),
        }
    }

    // ========================================================================
    // Calls and compilation
    // ========================================================================

    /// Calls the closure sitting below `nparams` values (`this` first).
    ///
    /// The arguments are popped, the closure is left on the stack, and with `retval`
    /// the result is pushed. With `raise_error`, an uncaught error is reported to the
    /// runtime error handler before it is returned.
    pub fn call(&self, nparams: usize, retval: bool, raise_error: bool) -> VmResult<()> {
        let (func, this, args) = {
            let mut stack = self.stack.borrow_mut();
            let len = stack.len();
            if nparams == 0 || len < self.base.get() + nparams + 1 {
                return Err(VmError::msg("not enough arguments on the stack"));
            }
            let mut args = stack.split_off(len - nparams);
            let this = args.remove(0);
            (stack[len - nparams - 1].clone(), this, args)
        };

        match self.call_value(&func, this, args) {
            Ok(value) => {
                if retval {
                    self.push(value);
                }
                Ok(())
            }
            Err(err) => {
                let site = self.error_site.borrow_mut().take();
                if raise_error {
                    let info = site.unwrap_or_else(|| RuntimeErrorInfo {
                        error: err.0.clone(),
                        source_name: Rc::from("null"),
                        function: callee_name(&func),
                        line: 0,
                    });
                    self.report_runtime_error(&info);
                }
                *self.last_error.borrow_mut() = err.0.clone();
                Err(err)
            }
        }
    }

    fn report_runtime_error(&self, info: &RuntimeErrorInfo) {
        tracing::debug!(
            source = %info.source_name,
            line = info.line,
            error = %info.error.to_display_string(),
            "uncaught script error"
        );
        let handler = self.runtime_handler.borrow().clone();
        if let Some(handler) = handler {
            handler(info);
        }
    }

    /// Compiles `source` and pushes the resulting main closure
    pub fn compile_buffer(
        &self,
        source: &str,
        name: &str,
        raise_error: bool,
    ) -> Result<(), CompileError> {
        match parser::parse(source, name) {
            Ok(proto) => {
                self.push_main(proto);
                Ok(())
            }
            Err(err) => {
                let error = CompileError {
                    description: err.message,
                    source_name: name.to_string(),
                    line: err.span.line,
                    column: err.span.column,
                };
                if raise_error {
                    let handler = self.compile_handler.borrow().clone();
                    if let Some(handler) = handler {
                        handler(&error);
                    }
                }
                Err(error)
            }
        }
    }

    /// Reads and compiles a script file, pushing the main closure
    pub fn compile_file(&self, path: &Path, raise_error: bool) -> Result<(), CompileError> {
        let name = path.display().to_string();
        match std::fs::read_to_string(path) {
            Ok(source) => self.compile_buffer(&source, &name, raise_error),
            Err(err) => {
                let error = CompileError {
                    description: format!("cannot read file: {}", err),
                    source_name: name,
                    line: 0,
                    column: 0,
                };
                if raise_error {
                    let handler = self.compile_handler.borrow().clone();
                    if let Some(handler) = handler {
                        handler(&error);
                    }
                }
                Err(error)
            }
        }
    }

    fn push_main(&self, proto: FunctionProto) {
        self.push(Value::Closure(Rc::new(Closure {
            proto: Rc::new(proto),
        })));
    }

    /// Records `message` as the current error and returns it for the native closure
    /// to propagate
    pub fn throw_error(&self, message: &str) -> VmError {
        let err = VmError::msg(message);
        *self.last_error.borrow_mut() = err.0.clone();
        err
    }

    pub fn last_error(&self) -> Value {
        self.last_error.borrow().clone()
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    pub fn set_print_func(&self, f: PrintFn) {
        *self.print_fn.borrow_mut() = f;
    }

    pub fn set_error_func(&self, f: PrintFn) {
        *self.error_fn.borrow_mut() = f;
    }

    pub fn print(&self, text: &str) {
        let f = self.print_fn.borrow().clone();
        f(text);
    }

    pub fn print_error(&self, text: &str) {
        let f = self.error_fn.borrow().clone();
        f(text);
    }

    pub fn set_compiler_error_handler(&self, handler: Option<CompileErrorHandler>) {
        *self.compile_handler.borrow_mut() = handler;
    }

    pub fn set_runtime_error_handler(&self, handler: Option<RuntimeErrorHandler>) {
        *self.runtime_handler.borrow_mut() = handler;
    }

    pub fn register_math_lib(&self) {
        stdlib::register_math_lib(self);
    }

    pub fn register_string_lib(&self) {
        stdlib::register_string_lib(self);
    }
}

impl Drop for RawVm {
    fn drop(&mut self) {
        self.close();
    }
}

fn class_chain_has_tag(class: &Rc<Class>, tag: TypeId) -> bool {
    let mut current = Some(class.clone());
    while let Some(class) = current {
        if class.type_tag.get() == Some(tag) {
            return true;
        }
        current = class.base();
    }
    false
}

fn callee_name(func: &Value) -> Option<Rc<str>> {
    match func {
        Value::NativeClosure(nc) => nc.name(),
        Value::Closure(c) => c.proto.name.clone(),
        _ => None,
    }
}

pub(crate) fn type_error(expected: &str, actual: &Value) -> VmError {
    VmError::msg(format!(
        "expected {}, got '{}'",
        expected,
        actual.type_name()
    ))
}

pub(crate) fn index_error(key: &Value) -> VmError {
    VmError::msg(format!(
        "the index '{}' does not exist",
        key.to_display_string()
    ))
}
