//! Raw staging containers.
//!
//! Before host data is typed, each pull copies the raw host collection into
//! one of three containers, chosen by the store's `BackingKind`. A pass
//! always clears and refills its container; containers are never patched.
//! Each container has its own lock so the write phase of a pull does not
//! block readers of the other containers.

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;

use crate::builder::ObjectBuilder;
use crate::value::{ObjectHandle, Value};

/// Shape of the host collection a store mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackingKind {
    /// Unique host objects.
    #[default]
    Set,
    /// Ordered host objects, duplicates allowed.
    List,
    /// Host objects keyed to their builder payloads.
    KeyedBuilderMap,
}

/// The three staging containers of one store.
#[derive(Debug, Default)]
pub struct Staging {
    pub(crate) set: RwLock<IndexSet<ObjectHandle>>,
    pub(crate) list: RwLock<Vec<ObjectHandle>>,
    pub(crate) builders: RwLock<IndexMap<ObjectHandle, ObjectBuilder>>,
}

impl Staging {
    /// Whether any staging container is held for writing.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.set.is_locked_exclusive()
            || self.list.is_locked_exclusive()
            || self.builders.is_locked_exclusive()
    }
}

/// Read-only snapshot of the staging containers, handed to a category while
/// it rebuilds the keyed collection.
#[derive(Debug, Clone, Copy)]
pub struct StagingView<'a> {
    pub kind: BackingKind,
    pub set: &'a IndexSet<ObjectHandle>,
    pub list: &'a [ObjectHandle],
    pub builders: &'a IndexMap<ObjectHandle, ObjectBuilder>,
}

impl StagingView<'_> {
    /// Staged host objects for the active backing kind, in staging order.
    pub fn objects(&self) -> Box<dyn Iterator<Item = ObjectHandle> + '_> {
        match self.kind {
            BackingKind::Set => Box::new(self.set.iter().copied()),
            BackingKind::List => Box::new(self.list.iter().copied()),
            BackingKind::KeyedBuilderMap => Box::new(self.builders.keys().copied()),
        }
    }

    /// Number of staged entries for the active backing kind.
    #[must_use]
    pub fn len(&self) -> usize {
        match self.kind {
            BackingKind::Set => self.set.len(),
            BackingKind::List => self.list.len(),
            BackingKind::KeyedBuilderMap => self.builders.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Host objects in a set- or list-shaped raw value. Non-object entries are
/// skipped.
pub(crate) fn raw_objects(raw: &Value) -> Option<impl Iterator<Item = ObjectHandle> + '_> {
    raw.as_collection()
        .map(|items| items.iter().filter_map(Value::as_object))
}

/// `(object, builder)` pairs in a keyed raw value. Pairs of any other shape
/// are skipped.
pub(crate) fn raw_builder_pairs(
    raw: &Value,
) -> Option<impl Iterator<Item = (ObjectHandle, &ObjectBuilder)> + '_> {
    raw.as_map().map(|pairs| {
        pairs
            .iter()
            .filter_map(|(k, v)| Some((k.as_object()?, v.as_builder()?)))
    })
}
