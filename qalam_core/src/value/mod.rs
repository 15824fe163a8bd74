//! The runtime value model.
//!
//! `Value` is a tagged variant covering every case the data model names.
//! Mutable, sharable collections use `Rc<RefCell<..>>` — single-threaded
//! shared mutability for values that live inside one context tree.
//! Cross-thread handles (`Task`, `Channel`, `Actor`) use `Arc` instead,
//! since those genuinely cross OS-thread boundaries.

mod number;

pub use number::DynamicNumber;

use crate::context::ContextId;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

pub type ListRef = Rc<RefCell<Vec<Value>>>;
pub type OrderedMapRef = Rc<RefCell<IndexMap<MapKey, Value>>>;
pub type UnorderedMapRef = Rc<RefCell<std::collections::HashMap<MapKey, Value>>>;
pub type OrderedSetRef = Rc<RefCell<indexmap::IndexSet<MapKey>>>;
pub type UnorderedSetRef = Rc<RefCell<std::collections::HashSet<MapKey>>>;

/// A value restricted to the subset usable as a map/set key: structural
/// equality and hashing must be total, which rules out `List`/`Object`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    None,
    Bool(bool),
    Char(char),
    Number(NumberKey),
    Text(String),
    Bytes(Vec<u8>),
    Tuple(Vec<MapKey>),
}

/// Wraps `DynamicNumber` so it can derive `Eq`/`Hash` via its canonical
/// key (floats aren't `Eq`, but the canonical-string hash makes the
/// numeric tower usable as a map key).
#[derive(Debug, Clone)]
pub struct NumberKey(pub DynamicNumber);

impl PartialEq for NumberKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.numeric_eq(&other.0)
    }
}
impl Eq for NumberKey {}
impl std::hash::Hash for NumberKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::None => write!(f, "none"),
            MapKey::Bool(b) => write!(f, "{}", b),
            MapKey::Char(c) => write!(f, "{}", c),
            MapKey::Number(n) => write!(f, "{}", n.0),
            MapKey::Text(s) => write!(f, "{}", s),
            MapKey::Bytes(b) => write!(f, "{:?}", b),
            MapKey::Tuple(t) => {
                write!(f, "(")?;
                for (i, v) in t.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TupleValue(pub Rc<Vec<Value>>);

impl TupleValue {
    pub fn new(values: Vec<Value>) -> Self {
        TupleValue(Rc::new(values))
    }
    pub fn arity(&self) -> usize {
        self.0.len()
    }
}

/// An object literal: an ordered mapping from field name to a declared
/// variable.
pub type ObjectFields = Rc<RefCell<IndexMap<String, crate::decl::DeclaredVariable>>>;

#[derive(Debug, Clone)]
pub struct ObjectValue {
    pub type_name: Option<String>,
    pub fields: ObjectFields,
}

/// Opaque handle into the host's object space.
#[derive(Debug, Clone)]
pub struct HostRef {
    pub qualified_type: String,
    pub handle: usize,
}

/// A runtime type token, returned by `type-of` and consumed by
/// `instance-of`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    None,
    NaN,
    Bool,
    Char,
    Number,
    Text,
    Bytes,
    List,
    OrderedSet,
    UnorderedSet,
    OrderedMap,
    UnorderedMap,
    Tuple,
    Object(Option<String>),
    Actor,
    Channel,
    Task,
    Result,
    Option,
    TemporalPoint,
    TemporalAmount,
    Host(String),
    Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemporalPoint {
    /// Nanoseconds since the Unix epoch.
    pub epoch_nanos: i128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemporalAmount {
    pub nanos: i128,
}

/// A message-processing handle; identity-compared.
#[derive(Debug, Clone)]
pub struct ActorHandle {
    pub id: u64,
    pub mailbox: crossbeam_channel::Sender<Value>,
}

/// A typed mailbox; identity-compared.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    pub id: u64,
    pub sender: crossbeam_channel::Sender<Value>,
    pub receiver: crossbeam_channel::Receiver<Value>,
}

/// A future-of-`Value` produced by `spawn`; identity-compared.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub id: u64,
    pub owner_context: ContextId,
    pub result: Arc<parking_lot::Mutex<Option<RuntimeResultValue>>>,
    pub done: Arc<(parking_lot::Mutex<bool>, parking_lot::Condvar)>,
    pub cancel: Arc<std::sync::atomic::AtomicBool>,
}

pub type RuntimeResultValue = crate::error::RuntimeResult<Value>;

impl TaskHandle {
    pub fn is_done(&self) -> bool {
        *self.done.0.lock()
    }

    pub fn request_cancel(&self) {
        self.cancel.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Blocks the calling OS thread until the task completes — `await`
    /// is a blocking join, not a cooperative yield back to a scheduler.
    pub fn join(&self) -> RuntimeResultValue {
        let (lock, cvar) = &*self.done;
        let mut done = lock.lock();
        while !*done {
            cvar.wait(&mut done);
        }
        self.result
            .lock()
            .clone()
            .unwrap_or_else(|| Ok(Value::None))
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    None,
    NaN,
    Bool(bool),
    Char(char),
    Number(DynamicNumber),
    Text(Rc<String>),
    Bytes(Rc<Vec<u8>>),
    List(ListRef),
    OrderedSet(OrderedSetRef),
    UnorderedSet(UnorderedSetRef),
    OrderedMap(OrderedMapRef),
    UnorderedMap(UnorderedMapRef),
    Tuple(TupleValue),
    Object(ObjectValue),
    Actor(ActorHandle),
    Channel(ChannelHandle),
    Task(TaskHandle),
    ResultOk(Box<Value>),
    ResultError(Box<Value>),
    OptionSome(Box<Value>),
    OptionNone,
    TemporalPoint(TemporalPoint),
    TemporalAmount(TemporalAmount),
    HostRef(HostRef),
    TypeDescriptor(TypeDescriptor),
}

// SAFETY: `Value`'s `Rc<RefCell<..>>`-backed variants are not `Sync`
// or `Send` by default, but a `Value` only ever crosses a thread
// boundary via `TaskHandle::result`/`join`, and `crate::gil` ensures at
// most one thread is ever actively evaluating (and therefore
// dereferencing a `Value`'s `Rc`) at a time.
unsafe impl Send for Value {}
unsafe impl Sync for Value {}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(Rc::new(s.into()))
    }

    pub fn list(values: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(values)))
    }

    pub fn tuple(values: Vec<Value>) -> Self {
        Value::Tuple(TupleValue::new(values))
    }

    pub fn int(v: i64) -> Self {
        Value::Number(DynamicNumber::from_i128(v as i128))
    }

    /// Truthiness rules for the language's falsy set.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None | Value::NaN => false,
            Value::Bool(b) => *b,
            Value::Number(n) => !n.is_zero(),
            Value::Text(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::List(l) => !l.borrow().is_empty(),
            Value::OrderedSet(s) => !s.borrow().is_empty(),
            Value::UnorderedSet(s) => !s.borrow().is_empty(),
            Value::OrderedMap(m) => !m.borrow().is_empty(),
            Value::UnorderedMap(m) => !m.borrow().is_empty(),
            Value::OptionNone => false,
            Value::ResultError(_) => false,
            _ => true,
        }
    }

    pub fn type_descriptor(&self) -> TypeDescriptor {
        match self {
            Value::None => TypeDescriptor::None,
            Value::NaN => TypeDescriptor::NaN,
            Value::Bool(_) => TypeDescriptor::Bool,
            Value::Char(_) => TypeDescriptor::Char,
            Value::Number(_) => TypeDescriptor::Number,
            Value::Text(_) => TypeDescriptor::Text,
            Value::Bytes(_) => TypeDescriptor::Bytes,
            Value::List(_) => TypeDescriptor::List,
            Value::OrderedSet(_) => TypeDescriptor::OrderedSet,
            Value::UnorderedSet(_) => TypeDescriptor::UnorderedSet,
            Value::OrderedMap(_) => TypeDescriptor::OrderedMap,
            Value::UnorderedMap(_) => TypeDescriptor::UnorderedMap,
            Value::Tuple(_) => TypeDescriptor::Tuple,
            Value::Object(o) => TypeDescriptor::Object(o.type_name.clone()),
            Value::Actor(_) => TypeDescriptor::Actor,
            Value::Channel(_) => TypeDescriptor::Channel,
            Value::Task(_) => TypeDescriptor::Task,
            Value::ResultOk(_) | Value::ResultError(_) => TypeDescriptor::Result,
            Value::OptionSome(_) | Value::OptionNone => TypeDescriptor::Option,
            Value::TemporalPoint(_) => TypeDescriptor::TemporalPoint,
            Value::TemporalAmount(_) => TypeDescriptor::TemporalAmount,
            Value::HostRef(h) => TypeDescriptor::Host(h.qualified_type.clone()),
            Value::TypeDescriptor(_) => TypeDescriptor::Type,
        }
    }

    /// Try to reduce this value to a key usable in a map/set; returns
    /// `None` for unhashable kinds (collections, objects, handles).
    pub fn as_map_key(&self) -> Option<MapKey> {
        match self {
            Value::None => Some(MapKey::None),
            Value::Bool(b) => Some(MapKey::Bool(*b)),
            Value::Char(c) => Some(MapKey::Char(*c)),
            Value::Number(n) => Some(MapKey::Number(NumberKey(n.clone()))),
            Value::Text(s) => Some(MapKey::Text(s.as_str().to_string())),
            Value::Bytes(b) => Some(MapKey::Bytes(b.as_ref().clone())),
            Value::Tuple(t) => {
                let mut keys = Vec::with_capacity(t.0.len());
                for v in t.0.iter() {
                    keys.push(v.as_map_key()?);
                }
                Some(MapKey::Tuple(keys))
            }
            _ => None,
        }
    }

    /// Structural equality for collections, identity for handles,
    /// numeric-value equality across the dynamic-number family.
    pub fn structural_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::NaN, Value::NaN) => false, // NaN != NaN, same as IEEE 754
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a.numeric_eq(b),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.structural_eq(y))
            }
            (Value::Tuple(a), Value::Tuple(b)) => {
                a.0.len() == b.0.len()
                    && a.0.iter().zip(b.0.iter()).all(|(x, y)| x.structural_eq(y))
            }
            (Value::OrderedMap(a), Value::OrderedMap(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && va.structural_eq(vb))
            }
            (Value::UnorderedMap(a), Value::UnorderedMap(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|bv| v.structural_eq(bv)))
            }
            (Value::OrderedSet(a), Value::OrderedSet(b)) => *a.borrow() == *b.borrow(),
            (Value::UnorderedSet(a), Value::UnorderedSet(b)) => *a.borrow() == *b.borrow(),
            (Value::OptionNone, Value::OptionNone) => true,
            (Value::OptionSome(a), Value::OptionSome(b)) => a.structural_eq(b),
            (Value::ResultOk(a), Value::ResultOk(b)) => a.structural_eq(b),
            (Value::ResultError(a), Value::ResultError(b)) => a.structural_eq(b),
            (Value::TemporalPoint(a), Value::TemporalPoint(b)) => a == b,
            (Value::TemporalAmount(a), Value::TemporalAmount(b)) => a == b,
            (Value::TypeDescriptor(a), Value::TypeDescriptor(b)) => a == b,
            // identity for Actor/Channel/Task
            (Value::Actor(a), Value::Actor(b)) => a.id == b.id,
            (Value::Channel(a), Value::Channel(b)) => a.id == b.id,
            (Value::Task(a), Value::Task(b)) => a.id == b.id,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "none"),
            Value::NaN => write!(f, "NaN"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Char(c) => write!(f, "{}", c),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "{:?}", b),
            Value::List(l) => {
                write!(f, "[")?;
                for (i, v) in l.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Tuple(t) => {
                write!(f, "(")?;
                for (i, v) in t.0.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, ")")
            }
            Value::Object(o) => {
                write!(f, "{}{{", o.type_name.as_deref().unwrap_or("object"))?;
                for (i, (name, var)) in o.fields.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, var.value)?;
                }
                write!(f, "}}")
            }
            Value::OrderedSet(s) => {
                write!(f, "{{")?;
                for (i, v) in s.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "}}")
            }
            Value::UnorderedSet(s) => {
                write!(f, "{{")?;
                for (i, v) in s.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "}}")
            }
            Value::OrderedMap(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} => {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::UnorderedMap(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} => {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Actor(a) => write!(f, "Actor#{}", a.id),
            Value::Channel(c) => write!(f, "Channel#{}", c.id),
            Value::Task(t) => write!(f, "Task#{}", t.id),
            Value::ResultOk(v) => write!(f, "ok({})", v),
            Value::ResultError(e) => write!(f, "error({})", e),
            Value::OptionSome(v) => write!(f, "some({})", v),
            Value::OptionNone => write!(f, "none"),
            Value::TemporalPoint(t) => write!(f, "TemporalPoint({})", t.epoch_nanos),
            Value::TemporalAmount(t) => write!(f, "TemporalAmount({})", t.nanos),
            Value::HostRef(h) => write!(f, "HostRef<{}>#{}", h.qualified_type, h.handle),
            Value::TypeDescriptor(t) => write!(f, "{:?}", t),
        }
    }
}
