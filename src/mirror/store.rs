//! Mirror store: a typed, keyed snapshot of one category of host entities.
//!
//! Readers only ever take the main read lock. A refresh pulls the raw host
//! collection into a staging container under that container's write lock,
//! drops it, then rebuilds the keyed collection while holding the main write
//! lock together with staging read locks. The staging write phase is always
//! finished before the main write lock is requested.
//!
//! Structural mutation (`new_entry`, `add_entry`, `delete_*`, `load`) takes
//! the main write lock itself; callers do not need to serialize it.

use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, trace, warn};

use crate::accessor::{read_member, MemberKind};
use crate::builder::ObjectBuilder;
use crate::error::{AccessorError, MirrorResult, PersistenceError};
use crate::host::session::HostSession;
use crate::mirror::entity::{downcast_entity, Entity, EntityKey};
use crate::mirror::persist::{
    load_content_file, locate_builder_field, save_content_file, ContainerField, Definitions,
    DefinitionsContainer,
};
use crate::mirror::schedule::RefreshSchedule;
use crate::mirror::staging::{raw_builder_pairs, raw_objects, BackingKind, Staging, StagingView};
use crate::value::{ObjectHandle, Value};

/// Per-category behavior plugged into a store.
pub trait MirrorCategory: Send + Sync + 'static {
    /// Stable category name; keys the session-wide refresh counters.
    fn name(&self) -> &str;

    /// Admission filter applied while staging raw host objects.
    fn is_valid_entity(&self, _object: ObjectHandle) -> bool {
        true
    }

    /// Rebuilds the keyed collection from staged host data. Runs with the
    /// main write lock and the staging read locks held.
    fn load_dynamic(&self, _staging: &StagingView<'_>, _entities: &mut KeyedEntities) {}
}

/// Category for keyed-builder backings: every staged builder becomes one `T`.
pub struct BuilderCategory<T> {
    name: String,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> BuilderCategory<T> {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _entity: PhantomData,
        }
    }
}

impl<T> fmt::Debug for BuilderCategory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderCategory").field("name", &self.name).finish()
    }
}

impl<T: Entity> MirrorCategory for BuilderCategory<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn load_dynamic(&self, staging: &StagingView<'_>, entities: &mut KeyedEntities) {
        entities.replace_all(
            staging
                .builders
                .values()
                .map(|b| Arc::new(T::from_builder(b.clone())) as Arc<dyn Entity>),
        );
    }
}

/// The clean keyed collection.
///
/// Keys are handed out by a monotonic counter that only resets on a full
/// reload, so keys of deleted entries are never reused.
#[derive(Debug, Default)]
pub struct KeyedEntities {
    map: IndexMap<EntityKey, Arc<dyn Entity>>,
    next_key: EntityKey,
}

impl KeyedEntities {
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: EntityKey) -> Option<&Arc<dyn Entity>> {
        self.map.get(&key)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityKey, &Arc<dyn Entity>)> {
        self.map.iter().map(|(k, v)| (*k, v))
    }

    pub fn values(&self) -> impl Iterator<Item = &Arc<dyn Entity>> {
        self.map.values()
    }

    /// Inserts under the next key and returns it.
    pub fn push(&mut self, entity: Arc<dyn Entity>) -> EntityKey {
        let key = self.next_key;
        self.map.insert(key, entity);
        self.next_key += 1;
        key
    }

    /// Replaces everything; keys restart at 0.
    pub fn replace_all<I>(&mut self, entities: I)
    where
        I: IntoIterator<Item = Arc<dyn Entity>>,
    {
        self.map.clear();
        self.next_key = 0;
        for entity in entities {
            self.push(entity);
        }
    }

    fn remove(&mut self, key: EntityKey) -> Option<Arc<dyn Entity>> {
        self.map.shift_remove(&key)
    }

    fn key_of(&self, entity: &Arc<dyn Entity>) -> Option<EntityKey> {
        self.map
            .iter()
            .find(|(_, e)| std::ptr::addr_eq(Arc::as_ptr(e), Arc::as_ptr(entity)))
            .map(|(k, _)| *k)
    }
}

/// Where a dynamic store pulls its raw collection from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backing {
    pub object: ObjectHandle,
    pub member: String,
    pub member_kind: MemberKind,
    pub kind: BackingKind,
}

struct StoreInner<C> {
    session: Arc<HostSession>,
    category: Arc<dyn MirrorCategory>,
    backing: RwLock<Option<Backing>>,
    dynamic: AtomicBool,
    mutable: AtomicBool,
    changed: AtomicBool,
    pull_pending: AtomicBool,
    schedule: Mutex<RefreshSchedule>,
    entities: RwLock<KeyedEntities>,
    staging: Staging,
    file_target: Mutex<Option<PathBuf>>,
    container_field: Option<ContainerField>,
    _container: PhantomData<fn() -> C>,
}

/// Cache of one category of host entities. Cloning shares the store.
pub struct MirrorStore<C: DefinitionsContainer = Definitions> {
    inner: Arc<StoreInner<C>>,
}

impl<C: DefinitionsContainer> Clone for MirrorStore<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: DefinitionsContainer> MirrorStore<C> {
    /// Creates a static (non-refreshing), mutable, empty store.
    pub fn new(session: Arc<HostSession>, category: Arc<dyn MirrorCategory>) -> Self {
        let container_field = locate_builder_field::<C>();
        if container_field.is_none() {
            warn!(
                container = C::ROOT,
                category = category.name(),
                "definitions container has no builder array field; saving will fail"
            );
        }
        let initial_interval = session.config().refresh_base_interval();
        Self {
            inner: Arc::new(StoreInner {
                session,
                category,
                backing: RwLock::new(None),
                dynamic: AtomicBool::new(false),
                mutable: AtomicBool::new(true),
                changed: AtomicBool::new(false),
                pull_pending: AtomicBool::new(false),
                schedule: Mutex::new(RefreshSchedule::new(initial_interval)),
                entities: RwLock::new(KeyedEntities::default()),
                staging: Staging::default(),
                file_target: Mutex::new(None),
                container_field,
                _container: PhantomData,
            }),
        }
    }

    /// Creates a dynamic store mirroring `member` of `object`.
    pub fn with_backing(
        session: Arc<HostSession>,
        category: Arc<dyn MirrorCategory>,
        object: ObjectHandle,
        member: impl Into<String>,
        member_kind: MemberKind,
        kind: BackingKind,
    ) -> Self {
        let store = Self::new(session, category);
        store.set_backing(object, member, member_kind, kind);
        store
    }

    // Properties

    #[must_use]
    pub fn category_name(&self) -> &str {
        self.inner.category.name()
    }

    #[must_use]
    pub fn session(&self) -> &Arc<HostSession> {
        &self.inner.session
    }

    /// Points the store at a live host collection and makes it dynamic.
    pub fn set_backing(
        &self,
        object: ObjectHandle,
        member: impl Into<String>,
        member_kind: MemberKind,
        kind: BackingKind,
    ) {
        *self.inner.backing.write() = Some(Backing {
            object,
            member: member.into(),
            member_kind,
            kind,
        });
        self.inner.dynamic.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn backing(&self) -> Option<Backing> {
        self.inner.backing.read().clone()
    }

    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.inner.dynamic.load(Ordering::Acquire)
    }

    pub fn set_dynamic(&self, dynamic: bool) {
        self.inner.dynamic.store(dynamic, Ordering::Release);
    }

    #[must_use]
    pub fn is_mutable(&self) -> bool {
        self.inner.mutable.load(Ordering::Acquire)
    }

    pub fn set_mutable(&self, mutable: bool) {
        self.inner.mutable.store(mutable, Ordering::Release);
    }

    /// True if the collection was structurally modified since the last save
    /// or any contained entity reports unsaved edits.
    #[must_use]
    pub fn is_changed(&self) -> bool {
        if self.inner.changed.load(Ordering::Acquire) {
            return true;
        }
        self.inner.entities.read().values().any(|e| e.is_changed())
    }

    #[must_use]
    pub fn file_target(&self) -> Option<PathBuf> {
        self.inner.file_target.lock().clone()
    }

    pub fn set_file_target(&self, path: impl Into<PathBuf>) {
        *self.inner.file_target.lock() = Some(path.into());
    }

    /// Whether the main lock is held for writing.
    #[must_use]
    pub fn is_resource_locked(&self) -> bool {
        self.inner.entities.is_locked_exclusive()
    }

    /// Whether any staging container is held for writing.
    #[must_use]
    pub fn is_staging_locked(&self) -> bool {
        self.inner.staging.is_locked()
    }

    #[must_use]
    pub fn can_refresh(&self) -> bool {
        self.inner.can_refresh()
    }

    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        self.inner.schedule.lock().interval()
    }

    #[must_use]
    pub fn last_refresh(&self) -> Option<Instant> {
        self.inner.schedule.lock().last_refresh()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.entities.read().len()
    }

    /// Keys in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<EntityKey> {
        self.inner.entities.read().iter().map(|(k, _)| k).collect()
    }

    // Refresh

    /// Requests a refresh. Returns true if a pull was handed to the host main
    /// thread; the pull itself runs later and this call never waits for it.
    pub fn refresh(&self) -> bool {
        let inner = &self.inner;
        if !inner.can_refresh() {
            return false;
        }
        if !inner.schedule.lock().try_claim(Instant::now()) {
            return false;
        }
        if inner.pull_pending.swap(true, Ordering::AcqRel) {
            return false;
        }

        let weak: Weak<StoreInner<C>> = Arc::downgrade(inner);
        let queued = inner.session.runtime().enqueue_main_thread(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                let _pending = PendingPull(&inner.pull_pending);
                inner.pull_and_rebuild();
            }
        }));
        if let Err(e) = queued {
            inner.pull_pending.store(false, Ordering::Release);
            warn!(category = inner.category.name(), error = %e, "failed to queue refresh");
            return false;
        }

        let interval = inner.session.stats().record_dispatch(inner.category.name());
        inner.schedule.lock().set_interval(interval);
        trace!(
            category = inner.category.name(),
            interval_ms = interval.as_millis() as u64,
            "refresh dispatched"
        );
        true
    }

    // Reads

    #[must_use]
    pub fn get_entry(&self, key: EntityKey) -> Option<Arc<dyn Entity>> {
        self.inner.entities.read().get(key).cloned()
    }

    /// Copies every entity of runtime type `T`, in insertion order, then asks
    /// for a refresh so the next read sees fresher data.
    #[must_use]
    pub fn get_typed_data<T: Entity>(&self) -> Vec<Arc<T>> {
        let snapshot: Vec<Arc<T>> = {
            let entities = self.inner.entities.read();
            entities.values().filter_map(downcast_entity::<T>).collect()
        };
        self.refresh();
        snapshot
    }

    // Mutation

    /// Adds a fresh entity wrapping a new entity-base builder. `None` when
    /// the store is immutable.
    pub fn new_entry<T: Entity>(&self) -> Option<Arc<T>> {
        self.new_entry_with(ObjectBuilder::entity_base())
    }

    /// Adds a fresh entity wrapping `builder`.
    pub fn new_entry_with<T: Entity>(&self, builder: ObjectBuilder) -> Option<Arc<T>> {
        if !self.is_mutable() {
            return None;
        }
        let entry = Arc::new(T::from_builder(builder));
        self.insert(Arc::clone(&entry) as Arc<dyn Entity>);
        Some(entry)
    }

    /// Adds a fresh entity whose builder is a copy of `source`'s.
    pub fn new_entry_from<T: Entity>(&self, source: &T) -> Option<Arc<T>> {
        self.new_entry_with(source.builder())
    }

    /// Inserts an existing entity under the next key.
    pub fn add_entry(&self, entity: Arc<dyn Entity>) -> Option<EntityKey> {
        if !self.is_mutable() {
            return None;
        }
        Some(self.insert(entity))
    }

    fn insert(&self, entity: Arc<dyn Entity>) -> EntityKey {
        let key = self.inner.entities.write().push(entity);
        self.inner.changed.store(true, Ordering::Release);
        key
    }

    /// Removes and disposes the entity under `key`.
    pub fn delete_entry(&self, key: EntityKey) -> bool {
        if !self.is_mutable() {
            return false;
        }
        let removed = self.inner.entities.write().remove(key);
        self.finish_delete(removed)
    }

    /// Removes and disposes `entity`, matched by identity.
    pub fn delete_entry_matching(&self, entity: &Arc<dyn Entity>) -> bool {
        if !self.is_mutable() {
            return false;
        }
        let removed = {
            let mut entities = self.inner.entities.write();
            entities.key_of(entity).and_then(|key| entities.remove(key))
        };
        self.finish_delete(removed)
    }

    /// Deletes each entity by identity; returns how many were removed.
    pub fn delete_entries<'a, I>(&self, entities: I) -> usize
    where
        I: IntoIterator<Item = &'a Arc<dyn Entity>>,
    {
        if !self.is_mutable() {
            return 0;
        }
        entities
            .into_iter()
            .filter(|e| self.delete_entry_matching(e))
            .count()
    }

    /// Deletes each key; returns how many were removed.
    pub fn delete_keys<I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = EntityKey>,
    {
        if !self.is_mutable() {
            return 0;
        }
        keys.into_iter().filter(|k| self.delete_entry(*k)).count()
    }

    fn finish_delete(&self, removed: Option<Arc<dyn Entity>>) -> bool {
        match removed {
            Some(entity) => {
                entity.dispose();
                self.inner.changed.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Replaces the keyed collection; keys become `0..n`.
    pub fn load<I>(&self, entities: I)
    where
        I: IntoIterator<Item = Arc<dyn Entity>>,
    {
        let mut guard = self.inner.entities.write();
        guard.replace_all(entities);
        debug!(category = self.category_name(), count = guard.len(), "loaded entities");
    }

    /// Wraps every builder as a `T` and loads them.
    pub fn load_builders<T: Entity>(&self, builders: impl IntoIterator<Item = ObjectBuilder>) {
        self.load(
            builders
                .into_iter()
                .map(|b| Arc::new(T::from_builder(b)) as Arc<dyn Entity>),
        );
    }

    // Persistence

    /// Loads the builder array of a definitions file as `T` entities and
    /// binds the file as the save target. Returns the entity count.
    pub fn load_file<T: Entity>(&self, path: &Path) -> MirrorResult<usize> {
        let field = self.require_container_field()?;
        let container: C = load_content_file(path)?;
        let builders = container
            .builders(field.name)
            .map(<[ObjectBuilder]>::to_vec)
            .unwrap_or_default();
        let count = builders.len();
        self.load_builders::<T>(builders);
        self.set_file_target(path);
        Ok(count)
    }

    /// Writes every entity's builder to the bound file. Returns false without
    /// touching the file unless the store is changed, mutable and bound.
    pub fn save(&self) -> MirrorResult<bool> {
        if !self.is_changed() || !self.is_mutable() {
            return Ok(false);
        }
        let Some(path) = self.file_target() else {
            return Ok(false);
        };
        let field = self.require_container_field()?;

        let builders: Vec<ObjectBuilder> = self
            .inner
            .entities
            .read()
            .values()
            .map(|e| e.builder())
            .collect();
        let count = builders.len();

        let mut container = C::default();
        if !container.set_builders(field.name, builders) {
            return Err(PersistenceError::ConfigurationInvalid {
                reason: format!("container `{}` rejected field `{}`", C::ROOT, field.name),
            }
            .into());
        }
        save_content_file(&container, &path)?;
        self.inner.changed.store(false, Ordering::Release);
        info!(
            category = self.category_name(),
            path = %path.display(),
            count,
            "saved definitions"
        );
        Ok(true)
    }

    fn require_container_field(&self) -> MirrorResult<ContainerField> {
        self.inner.container_field.ok_or_else(|| {
            PersistenceError::ConfigurationInvalid {
                reason: format!("no builder array field in container `{}`", C::ROOT),
            }
            .into()
        })
    }
}

impl<C: DefinitionsContainer> fmt::Debug for MirrorStore<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorStore")
            .field("category", &self.category_name())
            .field("backing", &*self.inner.backing.read())
            .field("dynamic", &self.is_dynamic())
            .field("mutable", &self.is_mutable())
            .field("count", &self.count())
            .finish_non_exhaustive()
    }
}

impl<C: DefinitionsContainer> StoreInner<C> {
    /// Refresh guard, minus the pending-pull check.
    fn guard_open(&self) -> bool {
        self.dynamic.load(Ordering::Acquire)
            && self.mutable.load(Ordering::Acquire)
            && !self.entities.is_locked_exclusive()
            && !self.staging.is_locked()
            && self.session.is_running()
            && self.session.save_window_clear()
    }

    fn can_refresh(&self) -> bool {
        !self.pull_pending.load(Ordering::Acquire) && self.guard_open()
    }

    /// Runs on the host main thread.
    fn pull_and_rebuild(&self) {
        let category = self.category.name();
        if !self.guard_open() {
            trace!(category, "refresh skipped at pull time");
            return;
        }
        let Some(backing) = self.backing.read().clone() else {
            return;
        };

        let started = Instant::now();
        if let Err(e) = self.pull(&backing) {
            error!(category, error = %e, "failed to pull host data; keeping previous snapshot");
            return;
        }
        self.rebuild(backing.kind);
        self.session.stats().record_pull(category, started.elapsed());
    }

    fn pull(&self, backing: &Backing) -> Result<(), AccessorError> {
        let accessor = self.session.accessor();
        let fetch = || read_member(accessor, backing.object, &backing.member, backing.member_kind);

        match backing.kind {
            BackingKind::Set => {
                let mut set = self.staging.set.write();
                let raw = fetch()?;
                let items = raw_objects(&raw).ok_or_else(|| unexpected(backing, "collection", &raw))?;
                set.clear();
                set.extend(items.filter(|o| self.category.is_valid_entity(*o)));
            }
            BackingKind::List => {
                let mut list = self.staging.list.write();
                let raw = fetch()?;
                let items = raw_objects(&raw).ok_or_else(|| unexpected(backing, "collection", &raw))?;
                list.clear();
                list.extend(items.filter(|o| self.category.is_valid_entity(*o)));
            }
            BackingKind::KeyedBuilderMap => {
                let mut builders = self.staging.builders.write();
                let raw = fetch()?;
                let pairs = raw_builder_pairs(&raw).ok_or_else(|| unexpected(backing, "map", &raw))?;
                builders.clear();
                builders.extend(
                    pairs
                        .filter(|(o, _)| self.category.is_valid_entity(*o))
                        .map(|(o, b)| (o, b.clone())),
                );
            }
        }
        Ok(())
    }

    fn rebuild(&self, kind: BackingKind) {
        let mut entities = self.entities.write();
        let set = self.staging.set.read();
        let list = self.staging.list.read();
        let builders = self.staging.builders.read();
        let view = StagingView {
            kind,
            set: &set,
            list: &list,
            builders: &builders,
        };
        self.category.load_dynamic(&view, &mut entities);
    }
}

fn unexpected(backing: &Backing, expected: &'static str, actual: &Value) -> AccessorError {
    AccessorError::UnexpectedValue {
        member: backing.member.clone(),
        expected,
        actual: actual.type_name().to_string(),
    }
}

/// Clears the pending-pull flag when the pull job ends, on every path.
struct PendingPull<'a>(&'a AtomicBool);

impl Drop for PendingPull<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
