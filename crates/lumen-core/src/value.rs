//! Runtime value representation
//!
//! Values are dynamically typed. Scalars (`Int`, `Float`, `Str`) compare by
//! value; aggregates (`Array`, `Mapping`) and lightweight instances compare
//! by reference identity, so two structurally identical arrays are still
//! distinct values. The zero value is `Int(0)`.

use crate::error::{LwError, LwResult};
use crate::instance::LwoRef;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Shared, mutable array of values
pub type ArrayRef = Arc<RwLock<Vec<Value>>>;

/// Shared, mutable mapping from scalar keys to values
pub type MappingRef = Arc<RwLock<FxHashMap<MapKey, Value>>>;

/// A dynamically typed runtime value
#[derive(Clone)]
pub enum Value {
    /// Signed integer (also the zero/absent value)
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Immutable string
    Str(Arc<str>),
    /// Shared array
    Array(ArrayRef),
    /// Shared mapping
    Mapping(MappingRef),
    /// Lightweight object instance
    Lwo(LwoRef),
}

impl Value {
    /// The zero value, used for uninitialized slots and failed lookups
    pub const fn zero() -> Self {
        Value::Int(0)
    }

    /// Build a string value
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Value::Str(s.into())
    }

    /// Build an array value from its elements
    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(Arc::new(RwLock::new(elements)))
    }

    /// Build an empty mapping value
    pub fn mapping() -> Self {
        Value::Mapping(Arc::new(RwLock::new(FxHashMap::default())))
    }

    /// True for every value except `Int(0)`
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Int(0))
    }

    /// Extract an integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Extract a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Extract an array reference
    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Extract a mapping reference
    pub fn as_mapping(&self) -> Option<&MappingRef> {
        match self {
            Value::Mapping(m) => Some(m),
            _ => None,
        }
    }

    /// Extract a lightweight instance reference
    pub fn as_lwo(&self) -> Option<&LwoRef> {
        match self {
            Value::Lwo(l) => Some(l),
            _ => None,
        }
    }

    /// Reference identity for aggregates and instances
    ///
    /// Scalars have no identity. Used as the key of visited sets during
    /// graph walks (deep copy, serialization, cycle collection).
    pub(crate) fn identity(&self) -> Option<usize> {
        match self {
            Value::Array(a) => Some(Arc::as_ptr(a) as *const () as usize),
            Value::Mapping(m) => Some(Arc::as_ptr(m) as *const () as usize),
            Value::Lwo(l) => Some(Arc::as_ptr(l) as *const () as usize),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::zero()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Mapping(a), Value::Mapping(b)) => Arc::ptr_eq(a, b),
            (Value::Lwo(a), Value::Lwo(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

/// Scalar key of a mapping
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MapKey {
    /// Integer key
    Int(i64),
    /// String key
    Str(Arc<str>),
}

impl MapKey {
    /// Build a string key
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        MapKey::Str(s.into())
    }
}

impl PartialOrd for MapKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MapKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (MapKey::Int(a), MapKey::Int(b)) => a.cmp(b),
            (MapKey::Str(a), MapKey::Str(b)) => a.cmp(b),
            (MapKey::Int(_), MapKey::Str(_)) => Ordering::Less,
            (MapKey::Str(_), MapKey::Int(_)) => Ordering::Greater,
        }
    }
}

impl TryFrom<&Value> for MapKey {
    type Error = LwError;

    fn try_from(value: &Value) -> LwResult<Self> {
        match value {
            Value::Int(i) => Ok(MapKey::Int(*i)),
            Value::Str(s) => Ok(MapKey::Str(s.clone())),
            _ => Err(LwError::Runtime("unhashable mapping key".to_string())),
        }
    }
}

impl From<MapKey> for Value {
    fn from(key: MapKey) -> Self {
        match key {
            MapKey::Int(i) => Value::Int(i),
            MapKey::Str(s) => Value::Str(s),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut seen = Vec::new();
        fmt_value(self, f, &mut seen)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Recursive printer with a cycle guard keyed on aggregate identity
fn fmt_value(value: &Value, f: &mut fmt::Formatter<'_>, seen: &mut Vec<usize>) -> fmt::Result {
    if let Some(id) = value.identity() {
        if seen.contains(&id) {
            return write!(f, "<cycle>");
        }
        seen.push(id);
    }
    let result = match value {
        Value::Int(i) => write!(f, "{}", i),
        Value::Float(x) => write!(f, "{:?}", x),
        Value::Str(s) => {
            let mut escaped = String::new();
            crate::save::escape_into(&mut escaped, s);
            write!(f, "\"{}\"", escaped)
        }
        Value::Array(a) => {
            let items = a.read().clone();
            write!(f, "({{")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                fmt_value(item, f, seen)?;
            }
            write!(f, "}})")
        }
        Value::Mapping(m) => {
            let mut pairs: Vec<(MapKey, Value)> =
                m.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            write!(f, "([")?;
            for (i, (k, v)) in pairs.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                fmt_value(&Value::from(k.clone()), f, seen)?;
                write!(f, ":")?;
                fmt_value(v, f, seen)?;
            }
            write!(f, "])")
        }
        Value::Lwo(l) => write!(f, "lwobject({})", l.load_name()),
    };
    if value.identity().is_some() {
        seen.pop();
    }
    result
}
