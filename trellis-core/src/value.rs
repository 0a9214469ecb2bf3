//! Plain Data Model
//!
//! Reactive state, virtual-node props, and the host interface all share one
//! value representation. A `Value` is either a scalar, a handle to a
//! structured object (`RawObject`), or an event handler.
//!
//! # Change Detection
//!
//! Writes notify subscribers only when the stored value actually changed.
//! Equality follows `PartialEq` on this type: numbers compare by IEEE
//! `==`, so a NaN never equals anything including itself, and a write
//! involving NaN always counts as a change. Objects and handlers compare
//! by identity, not by content.
//!
//! # Object Identity
//!
//! A `RawObject` carries a unique id allocated at creation. The dependency
//! store keys its subscriber registry by that id, and the object purges
//! its entries when dropped, so the registry never keeps dead objects
//! alive.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::Error;
use crate::reactive::store;

/// An event handler carried inside props.
///
/// Handlers are cloneable and compare by identity, which is what the
/// props differ needs: re-rendering with the same handler instance is not
/// a prop change, while a freshly created closure is.
#[derive(Clone)]
pub struct Handler(Arc<dyn Fn(Value) -> Result<(), Error> + Send + Sync>);

impl Handler {
    /// Wrap a fallible callback.
    pub fn new(f: impl Fn(Value) -> Result<(), Error> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Invoke the handler with a payload.
    pub fn call(&self, payload: Value) -> Result<(), Error> {
        (self.0)(payload)
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler")
    }
}

/// A single piece of plain data.
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// Absent / unset. Reading a missing key yields `Null`.
    #[default]
    Null,
    Bool(bool),
    Num(f64),
    Str(Arc<str>),
    /// Handle to a structured object (map or list).
    Obj(Arc<RawObject>),
    /// An event handler (props only).
    Func(Handler),
}

impl Value {
    /// Build a string value.
    pub fn str(s: impl AsRef<str>) -> Self {
        Self::Str(Arc::from(s.as_ref()))
    }

    /// The contained object handle, if this value is an object.
    pub fn as_obj(&self) -> Option<&Arc<RawObject>> {
        match self {
            Self::Obj(raw) => Some(raw),
            _ => None,
        }
    }

    /// The contained handler, if this value is one.
    pub fn as_func(&self) -> Option<&Handler> {
        match self {
            Self::Func(h) => Some(h),
            _ => None,
        }
    }

    /// The contained number, if this value is one.
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Self::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// The contained string, if this value is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            // IEEE semantics: NaN != NaN, so NaN writes always notify.
            (Self::Num(a), Self::Num(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Obj(a), Self::Obj(b)) => Arc::ptr_eq(a, b),
            (Self::Func(a), Self::Func(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Num(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Self::Str(s) => f.write_str(s),
            Self::Obj(_) => f.write_str("[object]"),
            Self::Func(_) => f.write_str("[handler]"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Num(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Num(v as f64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Num(v as f64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Self::Num(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(Arc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(Arc::from(v.as_str()))
    }
}

impl From<Arc<RawObject>> for Value {
    fn from(v: Arc<RawObject>) -> Self {
        Self::Obj(v)
    }
}

impl From<Handler> for Value {
    fn from(v: Handler) -> Self {
        Self::Func(v)
    }
}

/// Structured payload of a `RawObject`.
#[derive(Debug)]
pub enum ObjectData {
    /// String-keyed fields with stable insertion order.
    Map(IndexMap<String, Value>),
    /// An ordered list.
    List(Vec<Value>),
}

/// One structured data object, identified for dependency tracking.
#[derive(Debug)]
pub struct RawObject {
    /// Unique identifier, keyed into the dependency store.
    id: u64,

    /// The payload behind a single lock.
    data: RwLock<ObjectData>,
}

impl RawObject {
    /// Create an empty map object.
    pub fn map() -> Arc<Self> {
        Self::from_data(ObjectData::Map(IndexMap::new()))
    }

    /// Create an empty list object.
    pub fn list() -> Arc<Self> {
        Self::from_data(ObjectData::List(Vec::new()))
    }

    /// Create a map object from key/value pairs.
    pub fn from_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Arc<Self>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let fields = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::from_data(ObjectData::Map(fields))
    }

    /// Create a list object from values.
    pub fn from_values<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Arc<Self> {
        let items = values.into_iter().map(Into::into).collect();
        Self::from_data(ObjectData::List(items))
    }

    fn from_data(data: ObjectData) -> Arc<Self> {
        Arc::new(Self {
            id: store::next_target_id(),
            data: RwLock::new(data),
        })
    }

    /// The object's unique id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the payload is a list.
    pub fn is_list(&self) -> bool {
        matches!(*self.data.read(), ObjectData::List(_))
    }

    pub(crate) fn data(&self) -> &RwLock<ObjectData> {
        &self.data
    }
}

impl Drop for RawObject {
    fn drop(&mut self) {
        // Explicit unregister-on-drop: the dependency store must not
        // outlive the objects it indexes.
        store::purge_target(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_never_equals_itself() {
        let a = Value::Num(f64::NAN);
        let b = Value::Num(f64::NAN);
        assert_ne!(a, b);
        assert_ne!(a, a.clone());
    }

    #[test]
    fn numbers_compare_by_value() {
        assert_eq!(Value::from(3), Value::from(3.0));
        assert_ne!(Value::from(3), Value::from(4));
    }

    #[test]
    fn objects_compare_by_identity() {
        let a = RawObject::from_entries([("x", 1)]);
        let b = RawObject::from_entries([("x", 1)]);
        assert_eq!(Value::Obj(a.clone()), Value::Obj(a.clone()));
        assert_ne!(Value::Obj(a), Value::Obj(b));
    }

    #[test]
    fn handlers_compare_by_identity() {
        let h1 = Handler::new(|_| Ok(()));
        let h2 = h1.clone();
        let h3 = Handler::new(|_| Ok(()));
        assert_eq!(Value::Func(h1.clone()), Value::Func(h2));
        assert_ne!(Value::Func(h1), Value::Func(h3));
    }

    #[test]
    fn object_ids_are_unique() {
        let a = RawObject::map();
        let b = RawObject::list();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn display_formats_integral_numbers_without_fraction() {
        assert_eq!(Value::from(5).to_string(), "5");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
        assert_eq!(Value::str("hi").to_string(), "hi");
        assert_eq!(Value::Null.to_string(), "");
    }
}
