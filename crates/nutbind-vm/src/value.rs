//! Value representation
//!
//! Every VM value is a [`Value`]. Primitive kinds are stored inline and heap kinds are
//! shared through `Rc`, so cloning a `Value` is how the VM takes a reference and
//! dropping it is how the reference is released. Heap values compare by identity.

use crate::ast::FunctionProto;
use crate::error::{VmError, VmResult};
use crate::RawVm;
use rustc_hash::{FxHashMap, FxHashSet};
use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Entry point of a native closure. Returns the number of values it pushed (0 or 1).
pub type NativeFn = fn(&RawVm) -> VmResult<usize>;

/// Hook run when a userdata or instance payload is released by the VM.
pub type ReleaseHook = Box<dyn FnOnce(Rc<dyn Any>)>;

/// VM-level type discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Null,
    Bool,
    Integer,
    Float,
    String,
    Table,
    Array,
    Closure,
    NativeClosure,
    Class,
    Instance,
    UserData,
}

impl ObjectType {
    /// Name reported by `typeof` and in parameter check errors
    pub fn name(self) -> &'static str {
        match self {
            ObjectType::Null => "null",
            ObjectType::Bool => "bool",
            ObjectType::Integer => "integer",
            ObjectType::Float => "float",
            ObjectType::String => "string",
            ObjectType::Table => "table",
            ObjectType::Array => "array",
            ObjectType::Closure | ObjectType::NativeClosure => "function",
            ObjectType::Class => "class",
            ObjectType::Instance => "instance",
            ObjectType::UserData => "userdata",
        }
    }

    /// Character used by parameter type masks
    pub fn mask_char(self) -> char {
        match self {
            ObjectType::Null => 'o',
            ObjectType::Bool => 'b',
            ObjectType::Integer => 'i',
            ObjectType::Float => 'f',
            ObjectType::String => 's',
            ObjectType::Table => 't',
            ObjectType::Array => 'a',
            ObjectType::Closure | ObjectType::NativeClosure => 'c',
            ObjectType::Class => 'y',
            ObjectType::Instance => 'x',
            ObjectType::UserData => 'u',
        }
    }
}

/// A VM value
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(Rc<str>),
    Table(Rc<Table>),
    Array(Rc<Array>),
    Closure(Rc<Closure>),
    NativeClosure(Rc<NativeClosure>),
    Class(Rc<Class>),
    Instance(Rc<Instance>),
    UserData(Rc<UserData>),
}

impl Value {
    pub fn string(s: &str) -> Self {
        Value::String(Rc::from(s))
    }

    pub fn object_type(&self) -> ObjectType {
        match self {
            Value::Null => ObjectType::Null,
            Value::Bool(_) => ObjectType::Bool,
            Value::Integer(_) => ObjectType::Integer,
            Value::Float(_) => ObjectType::Float,
            Value::String(_) => ObjectType::String,
            Value::Table(_) => ObjectType::Table,
            Value::Array(_) => ObjectType::Array,
            Value::Closure(_) => ObjectType::Closure,
            Value::NativeClosure(_) => ObjectType::NativeClosure,
            Value::Class(_) => ObjectType::Class,
            Value::Instance(_) => ObjectType::Instance,
            Value::UserData(_) => ObjectType::UserData,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.object_type().name()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness: null, false, 0 and 0.0 are false
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            _ => true,
        }
    }

    /// Identity for heap values, value equality for primitives
    pub fn raw_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            _ => match (self.heap_addr(), other.heap_addr()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Address of the shared allocation, `None` for primitives and strings
    pub fn heap_addr(&self) -> Option<usize> {
        let addr = match self {
            Value::Table(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::Array(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::Closure(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::NativeClosure(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::Class(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::Instance(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::UserData(rc) => Rc::as_ptr(rc) as *const () as usize,
            _ => return None,
        };
        Some(addr)
    }

    /// Number of live references to a heap value. Primitives report 0.
    pub fn ref_count(&self) -> usize {
        match self {
            Value::String(rc) => Rc::strong_count(rc),
            Value::Table(rc) => Rc::strong_count(rc),
            Value::Array(rc) => Rc::strong_count(rc),
            Value::Closure(rc) => Rc::strong_count(rc),
            Value::NativeClosure(rc) => Rc::strong_count(rc),
            Value::Class(rc) => Rc::strong_count(rc),
            Value::Instance(rc) => Rc::strong_count(rc),
            Value::UserData(rc) => Rc::strong_count(rc),
            _ => 0,
        }
    }

    pub fn to_key(&self) -> VmResult<Key> {
        Ok(match self {
            Value::Null => return Err(VmError::msg("null cannot be used as index")),
            Value::Bool(b) => Key::Bool(*b),
            Value::Integer(i) => Key::Int(*i),
            Value::Float(f) => Key::Float(f.to_bits()),
            Value::String(s) => Key::Str(s.clone()),
            other => match other.heap_addr() {
                Some(addr) => Key::Ref(addr),
                None => return Err(VmError::msg("invalid index type")),
            },
        })
    }

    /// Text form used by `print` and string concatenation
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{:.1}", f)
                } else {
                    f.to_string()
                }
            }
            Value::String(s) => s.to_string(),
            other => format!(
                "({} : 0x{:08x})",
                other.type_name(),
                other.heap_addr().unwrap_or_default()
            ),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            other => f.write_str(&other.to_display_string()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

/// Hashable form of a slot key. Heap keys hash by address; the key value itself is
/// kept alive by the owning container so the address stays unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Ref(usize),
}

// ============================================================================
// Table
// ============================================================================

/// Insertion-ordered associative container
#[derive(Default)]
pub struct Table {
    entries: RefCell<Vec<(Value, Value)>>,
    index: RefCell<FxHashMap<Key, usize>>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &Value) -> VmResult<bool> {
        Ok(self.index.borrow().contains_key(&key.to_key()?))
    }

    pub fn get(&self, key: &Value) -> VmResult<Option<Value>> {
        let k = key.to_key()?;
        let pos = self.index.borrow().get(&k).copied();
        Ok(pos.and_then(|pos| self.entries.borrow().get(pos).map(|(_, v)| v.clone())))
    }

    pub fn get_str(&self, key: &str) -> Option<Value> {
        self.get(&Value::string(key)).ok().flatten()
    }

    /// Overwrites an existing slot. Returns `false` when the key is absent.
    pub fn set(&self, key: &Value, value: Value) -> VmResult<bool> {
        let k = key.to_key()?;
        let pos = self.index.borrow().get(&k).copied();
        match pos {
            Some(pos) => {
                // The previous value is dropped after the borrow ends
                let old = std::mem::replace(&mut self.entries.borrow_mut()[pos].1, value);
                drop(old);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Creates the slot if needed, otherwise overwrites it
    pub fn insert(&self, key: Value, value: Value) -> VmResult<()> {
        if self.set(&key, value.clone())? {
            return Ok(());
        }
        let k = key.to_key()?;
        let mut entries = self.entries.borrow_mut();
        self.index.borrow_mut().insert(k, entries.len());
        entries.push((key, value));
        Ok(())
    }

    /// Inserts under a string key, which can never be rejected
    pub fn insert_str(&self, name: &str, value: Value) {
        let key: Rc<str> = Rc::from(name);
        let k = Key::Str(key.clone());
        let pos = self.index.borrow().get(&k).copied();
        let mut entries = self.entries.borrow_mut();
        match pos {
            Some(pos) => entries[pos].1 = value,
            None => {
                self.index.borrow_mut().insert(k, entries.len());
                entries.push((Value::String(key), value));
            }
        }
    }

    pub fn entry_at(&self, pos: usize) -> Option<(Value, Value)> {
        self.entries.borrow().get(pos).cloned()
    }

    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.entries.borrow().clone()
    }

    pub(crate) fn take_all(&self) -> Vec<(Value, Value)> {
        self.index.borrow_mut().clear();
        std::mem::take(&mut *self.entries.borrow_mut())
    }
}

// ============================================================================
// Array
// ============================================================================

#[derive(Default)]
pub struct Array {
    items: RefCell<Vec<Value>>,
}

impl Array {
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items: RefCell::new(items),
        }
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, idx: i64) -> Option<Value> {
        usize::try_from(idx)
            .ok()
            .and_then(|i| self.items.borrow().get(i).cloned())
    }

    pub fn set(&self, idx: i64, value: Value) -> bool {
        let Ok(i) = usize::try_from(idx) else {
            return false;
        };
        let old = match self.items.borrow_mut().get_mut(i) {
            Some(slot) => std::mem::replace(slot, value),
            None => return false,
        };
        drop(old);
        true
    }

    pub fn push(&self, value: Value) {
        self.items.borrow_mut().push(value);
    }

    pub fn pop(&self) -> Option<Value> {
        self.items.borrow_mut().pop()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.items.borrow().clone()
    }

    pub(crate) fn take_all(&self) -> Vec<Value> {
        std::mem::take(&mut *self.items.borrow_mut())
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Script function value
pub struct Closure {
    pub proto: Rc<FunctionProto>,
}

/// Argument-count and type check consulted before a native closure runs
#[derive(Debug, Clone, PartialEq)]
pub struct ParamsCheck {
    /// Exact count when positive, minimum count when negative, unchecked when zero.
    /// Counts include `this`.
    pub nparams: i64,
    /// One entry per slot; each entry is a set of accepted mask characters
    pub mask: Vec<String>,
}

impl ParamsCheck {
    /// Parses a type mask such as `".is|o"`
    pub fn new(nparams: i64, typemask: &str) -> VmResult<Self> {
        let mut mask = Vec::new();
        let mut current = String::new();
        let mut chars = typemask.chars().peekable();
        while let Some(c) = chars.next() {
            if !matches!(c, 'o' | 'i' | 'f' | 'n' | 's' | 't' | 'a' | 'u' | 'c' | 'x' | 'y' | 'b' | '.') {
                return Err(VmError::msg(format!("invalid typemask character '{}'", c)));
            }
            current.push(c);
            if chars.peek() == Some(&'|') {
                chars.next();
                continue;
            }
            mask.push(std::mem::take(&mut current));
        }
        Ok(Self { nparams, mask })
    }

    /// Checks the call arguments, `this` included
    pub fn check(&self, args: &[Value]) -> VmResult<()> {
        let n = args.len() as i64;
        let count_ok = match self.nparams {
            0 => true,
            p if p > 0 => n == p,
            p => n >= -p,
        };
        if !count_ok {
            return Err(VmError::msg("wrong number of parameters"));
        }
        for (i, (arg, accepted)) in args.iter().zip(self.mask.iter()).enumerate() {
            if accepted.contains('.') {
                continue;
            }
            let actual = arg.object_type();
            let ok = accepted.chars().any(|c| match c {
                'n' => matches!(actual, ObjectType::Integer | ObjectType::Float),
                c => actual.mask_char() == c,
            });
            if !ok {
                return Err(VmError::msg(format!(
                    "parameter {} has an invalid type '{}' ; expected: '{}'",
                    i,
                    actual.name(),
                    describe_mask(accepted)
                )));
            }
        }
        Ok(())
    }
}

fn describe_mask(accepted: &str) -> String {
    accepted
        .chars()
        .map(|c| match c {
            'o' => "null",
            'i' => "integer",
            'f' => "float",
            'n' => "integer|float",
            's' => "string",
            't' => "table",
            'a' => "array",
            'u' => "userdata",
            'c' => "closure",
            'x' => "instance",
            'y' => "class",
            'b' => "bool",
            _ => "any",
        })
        .collect::<Vec<_>>()
        .join("|")
}

/// Host function value. Free variables are appended after the call arguments.
pub struct NativeClosure {
    pub func: NativeFn,
    pub(crate) outers: RefCell<Vec<Value>>,
    pub(crate) name: RefCell<Option<Rc<str>>>,
    pub(crate) params: RefCell<Option<ParamsCheck>>,
}

impl NativeClosure {
    pub fn new(func: NativeFn, outers: Vec<Value>) -> Self {
        Self {
            func,
            outers: RefCell::new(outers),
            name: RefCell::new(None),
            params: RefCell::new(None),
        }
    }

    pub fn name(&self) -> Option<Rc<str>> {
        self.name.borrow().clone()
    }

    pub fn nparams(&self) -> i64 {
        self.params.borrow().as_ref().map(|p| p.nparams).unwrap_or(0)
    }
}

// ============================================================================
// Classes and instances
// ============================================================================

pub struct Class {
    pub(crate) base: Option<Rc<Class>>,
    pub(crate) members: Table,
    pub(crate) statics: RefCell<FxHashSet<Key>>,
    pub(crate) type_tag: Cell<Option<TypeId>>,
}

impl Class {
    pub fn new(base: Option<Rc<Class>>) -> Self {
        Self {
            base,
            members: Table::new(),
            statics: RefCell::new(FxHashSet::default()),
            type_tag: Cell::new(None),
        }
    }

    pub fn base(&self) -> Option<Rc<Class>> {
        self.base.clone()
    }

    pub fn members(&self) -> &Table {
        &self.members
    }

    /// Own tag, or the nearest tagged ancestor's
    pub fn type_tag(&self) -> Option<TypeId> {
        self.type_tag
            .get()
            .or_else(|| self.base.as_ref().and_then(|b| b.type_tag()))
    }

    /// Looks a member up through the base chain
    pub fn get(&self, key: &Value) -> VmResult<Option<Value>> {
        match self.members.get(key)? {
            Some(v) => Ok(Some(v)),
            None => match &self.base {
                Some(base) => base.get(key),
                None => Ok(None),
            },
        }
    }

    /// Adds or replaces a member. Non-static, non-function members become instance fields.
    pub fn new_slot(&self, key: Value, value: Value, is_static: bool) -> VmResult<()> {
        let k = key.to_key()?;
        if is_static {
            self.statics.borrow_mut().insert(k);
        }
        self.members.insert(key, value)
    }

    /// Overwrites an existing member anywhere in the chain
    pub fn set(&self, key: &Value, value: Value) -> VmResult<bool> {
        if self.members.set(key, value.clone())? {
            return Ok(true);
        }
        match &self.base {
            Some(base) => base.set(key, value),
            None => Ok(false),
        }
    }

    fn is_field(&self, key: &Value, value: &Value) -> bool {
        let is_static = key
            .to_key()
            .map(|k| self.statics.borrow().contains(&k))
            .unwrap_or(false);
        !is_static
            && !matches!(
                value,
                Value::Closure(_) | Value::NativeClosure(_) | Value::Class(_)
            )
    }

    /// Default field values for a new instance, base class first
    pub(crate) fn field_defaults(&self, out: &Table) -> VmResult<()> {
        if let Some(base) = &self.base {
            base.field_defaults(out)?;
        }
        for (k, v) in self.members.entries() {
            if self.is_field(&k, &v) {
                out.insert(k, v)?;
            }
        }
        Ok(())
    }

    pub fn is_subclass_of(self: &Rc<Self>, other: &Rc<Class>) -> bool {
        let mut current = Some(self.clone());
        while let Some(class) = current {
            if Rc::ptr_eq(&class, other) {
                return true;
            }
            current = class.base.clone();
        }
        false
    }
}

pub struct Instance {
    pub(crate) class: Rc<Class>,
    pub(crate) fields: Table,
    pub(crate) user_pointer: RefCell<Option<Rc<dyn Any>>>,
    pub(crate) release: RefCell<Option<ReleaseHook>>,
}

impl Instance {
    pub fn class(&self) -> Rc<Class> {
        self.class.clone()
    }

    pub fn fields(&self) -> &Table {
        &self.fields
    }

    pub fn user_pointer(&self) -> Option<Rc<dyn Any>> {
        self.user_pointer.borrow().clone()
    }

    /// Member lookup without metamethods: fields first, then the class chain
    pub fn raw_get(&self, key: &Value) -> VmResult<Option<Value>> {
        match self.fields.get(key)? {
            Some(v) => Ok(Some(v)),
            None => self.class.get(key),
        }
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        let hook = self.release.get_mut().take();
        let up = self.user_pointer.get_mut().take();
        if let (Some(hook), Some(up)) = (hook, up) {
            hook(up);
        }
    }
}

/// Opaque host payload
pub struct UserData {
    pub(crate) data: Rc<dyn Any>,
    pub(crate) type_tag: Cell<Option<TypeId>>,
    pub(crate) release: RefCell<Option<ReleaseHook>>,
}

impl UserData {
    pub fn new(data: Rc<dyn Any>) -> Self {
        Self {
            data,
            type_tag: Cell::new(None),
            release: RefCell::new(None),
        }
    }

    pub fn data(&self) -> Rc<dyn Any> {
        self.data.clone()
    }

    pub fn type_tag(&self) -> Option<TypeId> {
        self.type_tag.get()
    }
}

impl Drop for UserData {
    fn drop(&mut self) {
        if let Some(hook) = self.release.get_mut().take() {
            hook(self.data.clone());
        }
    }
}

// ============================================================================
// Cycle breaking
// ============================================================================

/// Empties every container reachable from `roots` so reference cycles fall apart.
///
/// The VM has no tracing collector; this runs when the VM closes.
pub(crate) fn clear_graph(roots: Vec<Value>) {
    let mut seen: FxHashSet<usize> = FxHashSet::default();
    let mut pending = roots;
    // Detached values are dropped only after the walk so release hooks never observe
    // a half-cleared graph through a live borrow.
    let mut detached: Vec<Value> = Vec::new();
    let mut detached_payloads: Vec<Rc<dyn Any>> = Vec::new();

    while let Some(value) = pending.pop() {
        let Some(addr) = value.heap_addr() else {
            continue;
        };
        if !seen.insert(addr) {
            continue;
        }
        match &value {
            Value::Table(t) => {
                for (k, v) in t.take_all() {
                    pending.push(k.clone());
                    pending.push(v.clone());
                    detached.push(k);
                    detached.push(v);
                }
            }
            Value::Array(a) => {
                for v in a.take_all() {
                    pending.push(v.clone());
                    detached.push(v);
                }
            }
            Value::NativeClosure(nc) => {
                for v in std::mem::take(&mut *nc.outers.borrow_mut()) {
                    pending.push(v.clone());
                    detached.push(v);
                }
            }
            Value::Class(c) => {
                for (k, v) in c.members.take_all() {
                    pending.push(v.clone());
                    detached.push(k);
                    detached.push(v);
                }
                if let Some(base) = &c.base {
                    pending.push(Value::Class(base.clone()));
                }
            }
            Value::Instance(inst) => {
                for (k, v) in inst.fields.take_all() {
                    pending.push(v.clone());
                    detached.push(k);
                    detached.push(v);
                }
                pending.push(Value::Class(inst.class.clone()));
            }
            Value::UserData(ud) => {
                detached_payloads.push(ud.data.clone());
            }
            _ => {}
        }
        detached.push(value);
    }
    drop(detached);
    drop(detached_payloads);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_preserves_insertion_order() {
        let t = Table::new();
        t.insert(Value::string("b"), Value::Integer(2)).unwrap();
        t.insert(Value::string("a"), Value::Integer(1)).unwrap();
        t.insert(Value::string("b"), Value::Integer(3)).unwrap();

        assert_eq!(t.len(), 2);
        let (k, v) = t.entry_at(0).unwrap();
        assert_eq!(k.to_display_string(), "b");
        assert!(v.raw_equal(&Value::Integer(3)));
    }

    #[test]
    fn test_table_set_requires_existing_key() {
        let t = Table::new();
        assert!(!t.set(&Value::string("missing"), Value::Null).unwrap());
        assert!(t.set(&Value::Null, Value::Null).is_err());
    }

    #[test]
    fn test_raw_equal_uses_identity_for_heap_values() {
        let a = Value::Table(Rc::new(Table::new()));
        let b = Value::Table(Rc::new(Table::new()));
        assert!(a.raw_equal(&a.clone()));
        assert!(!a.raw_equal(&b));
        assert!(Value::Integer(1).raw_equal(&Value::Float(1.0)));
    }

    #[test]
    fn test_params_check_messages() {
        let check = ParamsCheck::new(3, ".is").unwrap();
        let args = vec![Value::Null, Value::Integer(1)];
        assert_eq!(
            check.check(&args).unwrap_err().to_string(),
            "wrong number of parameters"
        );

        let args = vec![Value::Null, Value::string("x"), Value::string("y")];
        assert_eq!(
            check.check(&args).unwrap_err().to_string(),
            "parameter 1 has an invalid type 'string' ; expected: 'integer'"
        );
    }

    #[test]
    fn test_params_check_alternatives_and_minimum() {
        let check = ParamsCheck::new(-2, ".i|f").unwrap();
        assert!(check.check(&[Value::Null, Value::Float(1.5)]).is_ok());
        assert!(check
            .check(&[Value::Null, Value::Integer(1), Value::Null])
            .is_ok());
        assert!(check.check(&[Value::Null]).is_err());
    }

    #[test]
    fn test_clear_graph_breaks_self_cycle() {
        let t = Rc::new(Table::new());
        let weak = Rc::downgrade(&t);
        t.insert(Value::string("self"), Value::Table(t.clone()))
            .unwrap();
        clear_graph(vec![Value::Table(t)]);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_userdata_release_hook_runs_on_drop() {
        let released = Rc::new(Cell::new(false));
        let flag = released.clone();
        let ud = UserData::new(Rc::new(5i32));
        *ud.release.borrow_mut() = Some(Box::new(move |data: Rc<dyn Any>| {
            flag.set(data.downcast_ref::<i32>() == Some(&5));
        }));
        drop(ud);
        assert!(released.get());
    }
}
