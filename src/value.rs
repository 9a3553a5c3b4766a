//! Runtime Value Model
//!
//! Values are what compiled procedures compute over: the constants linked
//! into a compile pass, the positional arguments of an invocation, and the
//! contents of the mutable objects that generated code reads and writes.
//!
//! Shared variants (`List`, `Object`, `Native`) are reference handles —
//! cloning a [`Value`] clones the handle, not the payload. The whole model is
//! `Rc`/`RefCell` based because the compiler core runs on exactly one logical
//! thread of control (see the crate docs); there is nothing to lock.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

/// Signature of a native routine callable from generated code.
pub type NativeFn = dyn Fn(&[Value]) -> Value;

/// A dynamically typed runtime value.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    /// Shared, mutable ordered sequence.
    List(Rc<RefCell<Vec<Value>>>),
    /// Shared, mutable string-keyed map; the target of scope save/restore.
    Object(Rc<RefCell<FxHashMap<String, Value>>>),
    /// Externally owned callable injected into generated code.
    Native(Rc<NativeFn>),
}

impl Value {
    /// Builds a string value.
    #[must_use]
    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    /// Builds a shared list from the given items.
    #[must_use]
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    /// Builds an empty shared object.
    #[must_use]
    pub fn object() -> Self {
        Value::Object(Rc::new(RefCell::new(FxHashMap::default())))
    }

    /// Wraps a closure as a native callable value.
    pub fn native(f: impl Fn(&[Value]) -> Value + 'static) -> Self {
        Value::Native(Rc::new(f))
    }

    /// Reads `self[key]`, degrading to `Null` when the step cannot resolve.
    ///
    /// Objects look the key up directly; lists accept decimal keys. Every
    /// other receiver yields `Null` — missing data is not an error here.
    #[must_use]
    pub fn get_key(&self, key: &str) -> Value {
        match self {
            Value::Object(map) => map.borrow().get(key).cloned().unwrap_or(Value::Null),
            Value::List(items) => key
                .parse::<usize>()
                .ok()
                .and_then(|i| items.borrow().get(i).cloned())
                .unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    /// Reads `self[index]` on a list, degrading to `Null` otherwise.
    #[must_use]
    pub fn get_index(&self, index: usize) -> Value {
        match self {
            Value::List(items) => items.borrow().get(index).cloned().unwrap_or(Value::Null),
            Value::Object(map) => map
                .borrow()
                .get(index.to_string().as_str())
                .cloned()
                .unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    /// Writes `self[key] = value`.
    ///
    /// # Panics
    ///
    /// Panics if `self` is not an object; storing through a non-object
    /// receiver is a programming error in the generated program.
    pub fn set_key(&self, key: &str, value: Value) {
        match self {
            Value::Object(map) => {
                map.borrow_mut().insert(key.to_owned(), value);
            }
            other => panic!("property store on non-object value {other}"),
        }
    }

    /// Truth test used by generated conditionals: `Null`, `false`, zero and
    /// the empty string are falsy; everything else is truthy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(_) | Value::Object(_) | Value::Native(_) => true,
        }
    }

    /// Identity comparison used by constant-pool deduplication: scalars and
    /// strings compare by content, shared variants by handle identity.
    #[must_use]
    pub fn identity_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// Structural equality, mainly for tests and diagnostics. Natives compare by
// identity since closures have no content to compare.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (Value::Object(a), Value::Object(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            _ => self.identity_eq(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(items) => write!(f, "<list:{}>", items.borrow().len()),
            Value::Object(map) => write!(f, "<object:{}>", map.borrow().len()),
            Value::Native(_) => write!(f, "<native>"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::str(v)
    }
}
