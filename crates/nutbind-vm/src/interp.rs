//! Tree-walking evaluator
//!
//! Script frames keep their locals in a flat list that is truncated when a block
//! ends. Native closures get a stack frame: `this`, the arguments, then the
//! closure's free variables.

use crate::ast::{AssignOp, BinaryOp, Expr, ExprKind, Stmt, UnaryOp};
use crate::error::{RuntimeErrorInfo, VmError, VmResult};
use crate::value::{Array, Class, Closure, NativeClosure, Table, Value};
use crate::vm::{index_error, FrameInfo, RawVm};
use std::cell::Cell;
use std::rc::Rc;

struct Frame {
    this: Value,
    locals: Vec<(Rc<str>, Value)>,
}

impl Frame {
    fn local_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.locals
            .iter_mut()
            .rev()
            .find(|(n, _)| &**n == name)
            .map(|(_, v)| v)
    }
}

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Decrements the call depth when a call returns or unwinds
struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

impl RawVm {
    fn enter(&self) -> VmResult<DepthGuard<'_>> {
        let depth = self.depth.get();
        if depth >= self.options.max_call_depth {
            return Err(VmError::msg("stack overflow"));
        }
        self.depth.set(depth + 1);
        Ok(DepthGuard(&self.depth))
    }

    pub(crate) fn call_value(&self, func: &Value, this: Value, args: Vec<Value>) -> VmResult<Value> {
        match func {
            Value::Closure(closure) => self.call_closure(closure, this, args),
            Value::NativeClosure(native) => self.call_native(native, this, args),
            Value::Class(class) => self.construct(class, args),
            other => Err(VmError::msg(format!(
                "attempt to call '{}'",
                other.type_name()
            ))),
        }
    }

    fn call_closure(&self, closure: &Closure, this: Value, args: Vec<Value>) -> VmResult<Value> {
        let proto = closure.proto.clone();
        if args.len() != proto.params.len() {
            return Err(VmError::msg("wrong number of parameters"));
        }
        let _guard = self.enter()?;

        let mut frame = Frame {
            this,
            locals: proto.params.iter().cloned().zip(args).collect(),
        };
        self.frames.borrow_mut().push(FrameInfo {
            name: proto.name.clone(),
            source: proto.source.clone(),
            line: proto.line,
        });

        let result = self.exec_block(&proto.body, &mut frame);
        if let Err(err) = &result {
            self.note_error_site(err);
        }
        self.frames.borrow_mut().pop();

        match result? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::Null),
        }
    }

    fn call_native(&self, native: &NativeClosure, this: Value, args: Vec<Value>) -> VmResult<Value> {
        let mut slots = Vec::with_capacity(args.len() + 1);
        slots.push(this);
        slots.extend(args);
        {
            let params = native.params.borrow();
            if let Some(check) = params.as_ref() {
                check.check(&slots)?;
            }
        }
        let _guard = self.enter()?;

        let outers = native.outers.borrow().clone();
        let frame_base = self.stack.borrow().len();
        if frame_base + slots.len() + outers.len() > self.options.stack_size {
            return Err(VmError::msg("stack overflow"));
        }
        let saved_base = self.base.replace(frame_base);
        {
            let mut stack = self.stack.borrow_mut();
            stack.extend(slots);
            stack.extend(outers);
        }

        let result = (native.func)(self);
        let returned = match &result {
            Ok(n) if *n > 0 => self.stack.borrow().last().cloned().unwrap_or_default(),
            _ => Value::Null,
        };

        let discarded = {
            let mut stack = self.stack.borrow_mut();
            let keep = frame_base.min(stack.len());
            stack.split_off(keep)
        };
        self.base.set(saved_base);
        drop(discarded);

        result.map(|_| returned)
    }

    fn construct(&self, class: &Rc<Class>, args: Vec<Value>) -> VmResult<Value> {
        let instance = Value::Instance(self.instantiate(class)?);
        match class.get(&Value::string("constructor"))? {
            Some(ctor) => {
                self.call_value(&ctor, instance.clone(), args)?;
            }
            None if !args.is_empty() => return Err(VmError::msg("wrong number of parameters")),
            None => {}
        }
        Ok(instance)
    }

    /// Remembers where an error first left a script frame
    fn note_error_site(&self, err: &VmError) {
        let mut site = self.error_site.borrow_mut();
        if site.is_some() {
            return;
        }
        if let Some(frame) = self.frames.borrow().last() {
            *site = Some(RuntimeErrorInfo {
                error: err.0.clone(),
                source_name: frame.source.clone(),
                function: frame.name.clone(),
                line: frame.line,
            });
        }
    }

    fn set_line(&self, line: u32) {
        if let Some(frame) = self.frames.borrow_mut().last_mut() {
            frame.line = line;
        }
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn exec_block(&self, stmts: &[Stmt], frame: &mut Frame) -> VmResult<Flow> {
        let mark = frame.locals.len();
        for stmt in stmts {
            let flow = self.exec_stmt(stmt, frame)?;
            if !matches!(flow, Flow::Normal) {
                frame.locals.truncate(mark);
                return Ok(flow);
            }
        }
        frame.locals.truncate(mark);
        Ok(Flow::Normal)
    }

    fn exec_stmt(&self, stmt: &Stmt, frame: &mut Frame) -> VmResult<Flow> {
        match stmt {
            Stmt::Local { names, line } => {
                self.set_line(*line);
                for (name, init) in names {
                    let value = match init {
                        Some(expr) => self.eval(expr, frame)?,
                        None => Value::Null,
                    };
                    frame.locals.push((name.clone(), value));
                }
                Ok(Flow::Normal)
            }
            Stmt::Expr(expr) => {
                self.set_line(expr.line);
                self.eval(expr, frame)?;
                Ok(Flow::Normal)
            }
            Stmt::Return(value, line) => {
                self.set_line(*line);
                let value = match value {
                    Some(expr) => self.eval(expr, frame)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.set_line(cond.line);
                if self.eval(cond, frame)?.is_truthy() {
                    self.exec_scoped(then_branch, frame)
                } else if let Some(else_branch) = else_branch {
                    self.exec_scoped(else_branch, frame)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { cond, body } => {
                loop {
                    self.set_line(cond.line);
                    if !self.eval(cond, frame)?.is_truthy() {
                        break;
                    }
                    match self.exec_scoped(body, frame)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                let mark = frame.locals.len();
                let flow = self.exec_for(init.as_deref(), cond.as_ref(), step.as_ref(), body, frame);
                frame.locals.truncate(mark);
                flow
            }
            Stmt::Foreach {
                key,
                value,
                iterable,
                body,
            } => {
                self.set_line(iterable.line);
                let container = self.eval(iterable, frame)?;
                for (k, v) in iteration_entries(&container)? {
                    let mark = frame.locals.len();
                    if let Some(key) = key {
                        frame.locals.push((key.clone(), k));
                    }
                    frame.locals.push((value.clone(), v));
                    let flow = self.exec_stmt(body, frame);
                    frame.locals.truncate(mark);
                    match flow? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Break(_) => Ok(Flow::Break),
            Stmt::Continue(_) => Ok(Flow::Continue),
            Stmt::Block(stmts) => self.exec_block(stmts, frame),
            Stmt::Throw(expr, line) => {
                self.set_line(*line);
                let value = self.eval(expr, frame)?;
                Err(VmError(value))
            }
            Stmt::Try { body, var, handler } => {
                let mark = frame.locals.len();
                match self.exec_scoped(body, frame) {
                    Ok(flow) => Ok(flow),
                    Err(err) => {
                        frame.locals.truncate(mark);
                        self.error_site.borrow_mut().take();
                        frame.locals.push((var.clone(), err.0));
                        let flow = self.exec_scoped(handler, frame);
                        frame.locals.truncate(mark);
                        flow
                    }
                }
            }
        }
    }

    /// Runs a statement in its own scope
    fn exec_scoped(&self, stmt: &Stmt, frame: &mut Frame) -> VmResult<Flow> {
        let mark = frame.locals.len();
        let flow = self.exec_stmt(stmt, frame);
        frame.locals.truncate(mark);
        flow
    }

    fn exec_for(
        &self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        step: Option<&Expr>,
        body: &Stmt,
        frame: &mut Frame,
    ) -> VmResult<Flow> {
        if let Some(init) = init {
            self.exec_stmt(init, frame)?;
        }
        loop {
            if let Some(cond) = cond {
                self.set_line(cond.line);
                if !self.eval(cond, frame)?.is_truthy() {
                    break;
                }
            }
            match self.exec_scoped(body, frame)? {
                Flow::Break => break,
                Flow::Return(v) => return Ok(Flow::Return(v)),
                Flow::Normal | Flow::Continue => {}
            }
            if let Some(step) = step {
                self.eval(step, frame)?;
            }
        }
        Ok(Flow::Normal)
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn eval(&self, expr: &Expr, frame: &mut Frame) -> VmResult<Value> {
        match &expr.kind {
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Integer(i) => Ok(Value::Integer(*i)),
            ExprKind::Float(f) => Ok(Value::Float(*f)),
            ExprKind::String(s) => Ok(Value::String(s.clone())),
            ExprKind::Ident(name) => self.lookup(name, frame),
            ExprKind::This => Ok(frame.this.clone()),
            ExprKind::Table(slots) => {
                let table = Table::new();
                for (key, value) in slots {
                    let key = self.eval(key, frame)?;
                    let value = self.eval(value, frame)?;
                    table.insert(key, value)?;
                }
                Ok(Value::Table(Rc::new(table)))
            }
            ExprKind::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, frame)?);
                }
                Ok(Value::Array(Rc::new(Array::new(values))))
            }
            ExprKind::Function(proto) => Ok(Value::Closure(Rc::new(Closure {
                proto: proto.clone(),
            }))),
            ExprKind::Class { base, members } => {
                let base = match base {
                    Some(expr) => match self.eval(expr, frame)? {
                        Value::Class(class) => Some(class),
                        other => {
                            return Err(VmError::msg(format!(
                                "cannot inherit from a {}",
                                other.type_name()
                            )))
                        }
                    },
                    None => None,
                };
                let class = Class::new(base);
                for member in members {
                    let key = self.eval(&member.key, frame)?;
                    let value = self.eval(&member.value, frame)?;
                    class.new_slot(key, value, member.is_static)?;
                }
                Ok(Value::Class(Rc::new(class)))
            }
            ExprKind::Unary(op, operand) => {
                let value = self.eval(operand, frame)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Typeof => Ok(Value::string(value.type_name())),
                    UnaryOp::Neg => match value {
                        Value::Integer(i) => Ok(Value::Integer(i.wrapping_neg())),
                        Value::Float(f) => Ok(Value::Float(-f)),
                        other => Err(VmError::msg(format!(
                            "attempt to negate a {}",
                            other.type_name()
                        ))),
                    },
                }
            }
            ExprKind::Binary(BinaryOp::And, left, right) => {
                let left = self.eval(left, frame)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right, frame)
            }
            ExprKind::Binary(BinaryOp::Or, left, right) => {
                let left = self.eval(left, frame)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right, frame)
            }
            ExprKind::Binary(op, left, right) => {
                let left = self.eval(left, frame)?;
                let right = self.eval(right, frame)?;
                arith(*op, &left, &right)
            }
            ExprKind::Ternary(cond, then_value, else_value) => {
                if self.eval(cond, frame)?.is_truthy() {
                    self.eval(then_value, frame)
                } else {
                    self.eval(else_value, frame)
                }
            }
            ExprKind::Index(object, key) => {
                let object = self.eval(object, frame)?;
                let key = self.eval(key, frame)?;
                self.get_slot(&object, &key)
            }
            ExprKind::Call(callee, args) => {
                let (func, this) = match &callee.kind {
                    ExprKind::Index(object, key) => {
                        let object = self.eval(object, frame)?;
                        let key = self.eval(key, frame)?;
                        (self.get_slot(&object, &key)?, object)
                    }
                    _ => (self.eval(callee, frame)?, frame.this.clone()),
                };
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, frame)?);
                }
                self.set_line(expr.line);
                self.call_value(&func, this, values)
            }
            ExprKind::Assign { op, target, value } => self.eval_assign(*op, target, value, frame),
            ExprKind::Increment {
                target,
                delta,
                postfix,
            } => {
                let old = self.read_target(target, frame)?;
                let new = arith(BinaryOp::Add, &old, &Value::Integer(*delta))?;
                self.write_target(target, new.clone(), frame)?;
                Ok(if *postfix { old } else { new })
            }
        }
    }

    fn eval_assign(&self, op: AssignOp, target: &Expr, value: &Expr, frame: &mut Frame) -> VmResult<Value> {
        match op {
            AssignOp::NewSlot => {
                let (container, key) = match &target.kind {
                    ExprKind::Ident(name) => {
                        let container = match &frame.this {
                            this @ (Value::Table(_) | Value::Class(_)) => this.clone(),
                            _ => Value::Table(self.root.clone()),
                        };
                        (container, Value::String(name.clone()))
                    }
                    ExprKind::Index(object, key) => {
                        (self.eval(object, frame)?, self.eval(key, frame)?)
                    }
                    _ => return Err(VmError::msg("can't assign expression")),
                };
                let value = self.eval(value, frame)?;
                self.new_slot_in(&container, key, value.clone(), false)?;
                Ok(value)
            }
            AssignOp::Set => {
                let value = self.eval(value, frame)?;
                self.write_target(target, value.clone(), frame)?;
                Ok(value)
            }
            AssignOp::Add | AssignOp::Sub => {
                let current = self.read_target(target, frame)?;
                let rhs = self.eval(value, frame)?;
                let bop = if op == AssignOp::Add {
                    BinaryOp::Add
                } else {
                    BinaryOp::Sub
                };
                let value = arith(bop, &current, &rhs)?;
                self.write_target(target, value.clone(), frame)?;
                Ok(value)
            }
        }
    }

    fn read_target(&self, target: &Expr, frame: &mut Frame) -> VmResult<Value> {
        self.eval(target, frame)
    }

    fn write_target(&self, target: &Expr, value: Value, frame: &mut Frame) -> VmResult<()> {
        match &target.kind {
            ExprKind::Ident(name) => self.assign_ident(name, value, frame),
            ExprKind::Index(object, key) => {
                let object = self.eval(object, frame)?;
                let key = self.eval(key, frame)?;
                self.set_slot(&object, &key, value)
            }
            _ => Err(VmError::msg("can't assign expression")),
        }
    }

    fn lookup(&self, name: &Rc<str>, frame: &mut Frame) -> VmResult<Value> {
        if let Some(value) = frame.local_mut(name) {
            return Ok(value.clone());
        }
        let key = Value::String(name.clone());
        let from_this = match &frame.this {
            Value::Table(t) if !Rc::ptr_eq(t, &self.root) => t.get(&key)?,
            Value::Instance(inst) => inst.raw_get(&key)?,
            Value::Class(class) => class.get(&key)?,
            _ => None,
        };
        if let Some(value) = from_this {
            return Ok(value);
        }
        if let Some(value) = self.root.get(&key)? {
            return Ok(value);
        }
        if let Some(value) = self.consts.get(&key)? {
            return Ok(value);
        }
        Err(index_error(&key))
    }

    fn assign_ident(&self, name: &Rc<str>, value: Value, frame: &mut Frame) -> VmResult<()> {
        if let Some(slot) = frame.local_mut(name) {
            *slot = value;
            return Ok(());
        }
        let key = Value::String(name.clone());
        let this = frame.this.clone();
        let assigned = match &this {
            Value::Table(t) => t.set(&key, value.clone())?,
            Value::Instance(inst) => inst.fields.set(&key, value.clone())?,
            Value::Class(class) => class.set(&key, value.clone())?,
            _ => false,
        };
        if assigned || self.root.set(&key, value)? {
            return Ok(());
        }
        Err(index_error(&key))
    }

    // ========================================================================
    // Slot access shared with the stack API
    // ========================================================================

    pub(crate) fn get_slot(&self, object: &Value, key: &Value) -> VmResult<Value> {
        let found = match object {
            Value::Table(t) => t.get(key)?,
            Value::Array(a) => match key {
                Value::Integer(i) => Some(a.get(*i).ok_or_else(|| index_error(key))?),
                _ => None,
            },
            Value::String(s) => match key {
                Value::Integer(i) => {
                    let byte = usize::try_from(*i).ok().and_then(|i| s.as_bytes().get(i).copied());
                    Some(Value::Integer(byte.ok_or_else(|| index_error(key))? as i64))
                }
                _ => None,
            },
            Value::Instance(inst) => match inst.raw_get(key)? {
                Some(value) => Some(value),
                None => match inst.class.get(&Value::string("_get"))? {
                    Some(getter) => {
                        return self.call_value(&getter, object.clone(), vec![key.clone()])
                    }
                    None => None,
                },
            },
            Value::Class(class) => class.get(key)?,
            _ => None,
        };
        if let Some(value) = found {
            return Ok(value);
        }

        let delegate = match object {
            Value::Table(_) => Some(&self.delegates.table),
            Value::Array(_) => Some(&self.delegates.array),
            Value::String(_) => Some(&self.delegates.string),
            Value::Integer(_) | Value::Float(_) | Value::Bool(_) => Some(&self.delegates.number),
            _ => None,
        };
        match delegate {
            Some(delegate) => delegate.get(key)?.ok_or_else(|| index_error(key)),
            None => Err(index_error(key)),
        }
    }

    pub(crate) fn set_slot(&self, object: &Value, key: &Value, value: Value) -> VmResult<()> {
        let assigned = match object {
            Value::Table(t) => t.set(key, value)?,
            Value::Array(a) => match key {
                Value::Integer(i) => a.set(*i, value),
                _ => false,
            },
            Value::Instance(inst) => {
                if inst.fields.set(key, value.clone())? {
                    return Ok(());
                }
                match inst.class.get(&Value::string("_set"))? {
                    Some(setter) => {
                        self.call_value(&setter, object.clone(), vec![key.clone(), value])?;
                        return Ok(());
                    }
                    None => false,
                }
            }
            Value::Class(class) => class.set(key, value)?,
            _ => false,
        };
        if assigned {
            Ok(())
        } else {
            Err(index_error(key))
        }
    }

    pub(crate) fn new_slot_in(&self, object: &Value, key: Value, value: Value, is_static: bool) -> VmResult<()> {
        match object {
            Value::Table(t) => t.insert(key, value),
            Value::Class(class) => class.new_slot(key, value, is_static),
            Value::Instance(_) => Err(VmError::msg(
                "class instances do not support the new slot operator",
            )),
            other => Err(VmError::msg(format!(
                "cannot create a slot in a {}",
                other.type_name()
            ))),
        }
    }
}

fn iteration_entries(container: &Value) -> VmResult<Vec<(Value, Value)>> {
    match container {
        Value::Table(t) => Ok(t.entries()),
        Value::Array(a) => Ok(a
            .to_vec()
            .into_iter()
            .enumerate()
            .map(|(i, v)| (Value::Integer(i as i64), v))
            .collect()),
        Value::Class(c) => Ok(c.members().entries()),
        Value::Instance(i) => Ok(i.fields().entries()),
        Value::String(s) => Ok(s
            .bytes()
            .enumerate()
            .map(|(i, b)| (Value::Integer(i as i64), Value::Integer(b as i64)))
            .collect()),
        other => Err(VmError::msg(format!(
            "cannot iterate a {}",
            other.type_name()
        ))),
    }
}

fn arith(op: BinaryOp, left: &Value, right: &Value) -> VmResult<Value> {
    use Value::{Float, Integer};

    match op {
        BinaryOp::Eq => return Ok(Value::Bool(left.raw_equal(right))),
        BinaryOp::Ne => return Ok(Value::Bool(!left.raw_equal(right))),
        BinaryOp::Add => {
            if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
                let mut s = left.to_display_string();
                s.push_str(&right.to_display_string());
                return Ok(Value::string(&s));
            }
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                (Integer(a), Integer(b)) => Some(a.cmp(b)),
                (Integer(_) | Float(_), Integer(_) | Float(_)) => {
                    as_float(left).partial_cmp(&as_float(right))
                }
                _ => None,
            };
            let Some(ordering) = ordering else {
                return Err(VmError::msg(format!(
                    "comparison between '{}' and '{}'",
                    left.type_name(),
                    right.type_name()
                )));
            };
            let result = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            return Ok(Value::Bool(result));
        }
        _ => {}
    }

    match (left, right) {
        (Integer(a), Integer(b)) => match op {
            BinaryOp::Add => Ok(Integer(a.wrapping_add(*b))),
            BinaryOp::Sub => Ok(Integer(a.wrapping_sub(*b))),
            BinaryOp::Mul => Ok(Integer(a.wrapping_mul(*b))),
            BinaryOp::Div | BinaryOp::Mod if *b == 0 => Err(VmError::msg("division by zero")),
            BinaryOp::Div => Ok(Integer(a.wrapping_div(*b))),
            BinaryOp::Mod => Ok(Integer(a.wrapping_rem(*b))),
            _ => Err(arith_error(op, left, right)),
        },
        (Integer(_) | Float(_), Integer(_) | Float(_)) => {
            let (a, b) = (as_float(left), as_float(right));
            match op {
                BinaryOp::Add => Ok(Float(a + b)),
                BinaryOp::Sub => Ok(Float(a - b)),
                BinaryOp::Mul => Ok(Float(a * b)),
                BinaryOp::Div => Ok(Float(a / b)),
                BinaryOp::Mod => Ok(Float(a % b)),
                _ => Err(arith_error(op, left, right)),
            }
        }
        _ => Err(arith_error(op, left, right)),
    }
}

fn as_float(value: &Value) -> f64 {
    match value {
        Value::Integer(i) => *i as f64,
        Value::Float(f) => *f,
        _ => 0.0,
    }
}

fn arith_error(op: BinaryOp, left: &Value, right: &Value) -> VmError {
    let symbol = match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        _ => "?",
    };
    VmError::msg(format!(
        "arith op {} on between '{}' and '{}'",
        symbol,
        left.type_name(),
        right.type_name()
    ))
}
