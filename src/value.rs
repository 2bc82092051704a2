//! Values exchanged with the host through the accessor facade.
//!
//! The host's object graph is opaque to the core. Live objects are referred
//! to by `ObjectHandle`, host types by `TypeHandle`, and everything the core
//! actually reads is projected into the `Value` enum.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::builder::ObjectBuilder;
use crate::lock::ResourceLock;

/// Opaque handle to a live host object.
///
/// Identity only: two handles are equal when they name the same host object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectHandle(u64);

impl ObjectHandle {
    /// Wraps a raw host object identifier.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw host object identifier.
    #[must_use]
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

/// Handle to a resolved host type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeHandle {
    namespace: String,
    class_name: String,
}

impl TypeHandle {
    /// Creates a handle for `namespace.class_name`.
    #[must_use]
    pub fn new(namespace: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            class_name: class_name.into(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Fully qualified name, `namespace.class_name` (or just the class when
    /// the namespace is empty).
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.class_name.clone()
        } else {
            format!("{}.{}", self.namespace, self.class_name)
        }
    }
}

impl fmt::Display for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// A value read from, or passed to, the host.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Object(ObjectHandle),
    /// Set- or list-shaped host collection.
    Collection(Vec<Value>),
    /// Keyed host collection, in host iteration order.
    Map(Vec<(Value, Value)>),
    /// A serializable builder payload.
    Builder(ObjectBuilder),
    /// A host-owned reader/writer lock.
    Lock(Arc<ResourceLock>),
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_object(&self) -> Option<ObjectHandle> {
        match self {
            Self::Object(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&[Value]> {
        match self {
            Self::Collection(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Self::Map(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_builder(&self) -> Option<&ObjectBuilder> {
        match self {
            Self::Builder(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_lock(&self) -> Option<&Arc<ResourceLock>> {
        match self {
            Self::Lock(v) => Some(v),
            _ => None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Object(_) => "object",
            Self::Collection(_) => "collection",
            Self::Map(_) => "map",
            Self::Builder(_) => "builder",
            Self::Lock(_) => "lock",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Collection(a), Self::Collection(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Builder(a), Self::Builder(b)) => a == b,
            // Host locks compare by identity.
            (Self::Lock(a), Self::Lock(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Object(v) => write!(f, "{v}"),
            Self::Collection(v) => write!(f, "collection[{}]", v.len()),
            Self::Map(v) => write!(f, "map[{}]", v.len()),
            Self::Builder(v) => write!(f, "builder:{}", v.type_id),
            Self::Lock(l) => write!(f, "lock(owned={})", l.owned()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<ObjectHandle> for Value {
    fn from(v: ObjectHandle) -> Self {
        Self::Object(v)
    }
}

impl From<ObjectBuilder> for Value {
    fn from(v: ObjectBuilder) -> Self {
        Self::Builder(v)
    }
}

impl From<Arc<ResourceLock>> for Value {
    fn from(v: Arc<ResourceLock>) -> Self {
        Self::Lock(v)
    }
}
