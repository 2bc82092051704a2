//! Mirrored entities.
//!
//! A mirrored entity wraps exactly one `ObjectBuilder`. Stores hold entities
//! as `Arc<dyn Entity>` and recover the concrete type on typed reads.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::builder::ObjectBuilder;

/// Key of an entity in a store's keyed collection.
///
/// Process-local: assigned sequentially per store and not stable across
/// reloads.
pub type EntityKey = i64;

/// Upcast helpers, implemented for every sized entity type.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A clean domain object mirrored from the host.
pub trait Entity: AsAny + fmt::Debug {
    /// Wraps a builder payload. Used by `new_entry` and bulk loads.
    fn from_builder(builder: ObjectBuilder) -> Self
    where
        Self: Sized;

    /// Snapshot of the builder payload, used for persistence.
    fn builder(&self) -> ObjectBuilder;

    /// Whether the entity has unsaved edits.
    fn is_changed(&self) -> bool {
        false
    }

    /// Releases whatever the entity holds. Called once when it is deleted
    /// from a store.
    fn dispose(&self) {}
}

/// Downcasts a shared entity to its concrete type.
#[must_use]
pub fn downcast_entity<T: Entity>(entity: &Arc<dyn Entity>) -> Option<Arc<T>> {
    let inner: &dyn Entity = entity.as_ref();
    if !inner.as_any().is::<T>() {
        return None;
    }
    AsAny::into_any_arc(Arc::clone(entity)).downcast::<T>().ok()
}

/// Reusable state for entity implementations: a builder behind a lock plus
/// dirty and disposed flags.
#[derive(Default)]
pub struct EntityCore {
    builder: RwLock<ObjectBuilder>,
    changed: AtomicBool,
    disposed: AtomicBool,
}

impl EntityCore {
    #[must_use]
    pub fn new(builder: ObjectBuilder) -> Self {
        Self {
            builder: RwLock::new(builder),
            changed: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    /// Snapshot of the builder.
    #[must_use]
    pub fn builder(&self) -> ObjectBuilder {
        self.builder.read().clone()
    }

    /// Reads one builder property.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<String> {
        self.builder.read().property(name).map(str::to_string)
    }

    /// Writes one builder property and marks the entity changed.
    pub fn set_property(&self, name: &str, value: impl Into<String>) {
        self.builder.write().set_property(name, value);
        self.changed.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_changed(&self) -> bool {
        self.changed.load(Ordering::Acquire)
    }

    pub fn clear_changed(&self) {
        self.changed.store(false, Ordering::Release);
    }

    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for EntityCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCore")
            .field("builder", &*self.builder.read())
            .field("changed", &self.is_changed())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
