//! In-memory fake host shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use livemirror::{
    Accessor, AccessorError, Entity, EntityCore, HostBindings, HostSession, MainThreadExecutor,
    MemberKind, MirrorConfig, ObjectBuilder, ObjectHandle, ResourceLock, TypeHandle, Value,
};

pub type MethodFn = Arc<dyn Fn(&[Value]) -> Result<Value, AccessorError> + Send + Sync>;

pub const SESSION: ObjectHandle = ObjectHandle::from_raw(1);
pub const STATS: ObjectHandle = ObjectHandle::from_raw(2);
pub const GRID: ObjectHandle = ObjectHandle::from_raw(10);

/// Scriptable host object graph.
#[derive(Default)]
pub struct FakeHost {
    types: RwLock<HashSet<(String, String)>>,
    members: RwLock<HashSet<(String, String, MemberKind)>>,
    static_fields: RwLock<HashMap<(String, String), Value>>,
    instance_fields: RwLock<HashMap<(ObjectHandle, String), Value>>,
    static_methods: RwLock<HashMap<(String, String), MethodFn>>,
    instance_methods: RwLock<HashMap<(ObjectHandle, String), MethodFn>>,
    calls: Mutex<Vec<String>>,
}

impl FakeHost {
    pub fn add_type(&self, namespace: &str, class_name: &str) -> TypeHandle {
        self.types
            .write()
            .insert((namespace.to_string(), class_name.to_string()));
        TypeHandle::new(namespace, class_name)
    }

    pub fn remove_type(&self, namespace: &str, class_name: &str) {
        self.types
            .write()
            .remove(&(namespace.to_string(), class_name.to_string()));
    }

    pub fn set_static_field(&self, ty: &TypeHandle, field: &str, value: Value) {
        self.declare(ty, field, MemberKind::Field);
        self.static_fields
            .write()
            .insert((ty.full_name(), field.to_string()), value);
    }

    pub fn set_instance_field(&self, obj: ObjectHandle, field: &str, value: Value) {
        self.instance_fields
            .write()
            .insert((obj, field.to_string()), value);
    }

    pub fn on_static<F>(&self, ty: &TypeHandle, method: &str, f: F)
    where
        F: Fn(&[Value]) -> Result<Value, AccessorError> + Send + Sync + 'static,
    {
        self.declare(ty, method, MemberKind::Method);
        self.static_methods
            .write()
            .insert((ty.full_name(), method.to_string()), Arc::new(f));
    }

    pub fn on_instance<F>(&self, obj: ObjectHandle, method: &str, f: F)
    where
        F: Fn(&[Value]) -> Result<Value, AccessorError> + Send + Sync + 'static,
    {
        self.instance_methods
            .write()
            .insert((obj, method.to_string()), Arc::new(f));
    }

    pub fn declare(&self, ty: &TypeHandle, member: &str, kind: MemberKind) {
        self.members
            .write()
            .insert((ty.full_name(), member.to_string(), kind));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, member: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == member).count()
    }

    fn record(&self, member: &str) {
        self.calls.lock().push(member.to_string());
    }
}

impl Accessor for FakeHost {
    fn resolve_type(&self, namespace: &str, class_name: &str) -> Result<TypeHandle, AccessorError> {
        if self
            .types
            .read()
            .contains(&(namespace.to_string(), class_name.to_string()))
        {
            Ok(TypeHandle::new(namespace, class_name))
        } else {
            Err(AccessorError::TypeNotFound {
                namespace: namespace.to_string(),
                class_name: class_name.to_string(),
            })
        }
    }

    fn get_static_field(&self, ty: &TypeHandle, field: &str) -> Result<Value, AccessorError> {
        self.record(field);
        self.static_fields
            .read()
            .get(&(ty.full_name(), field.to_string()))
            .cloned()
            .ok_or_else(|| AccessorError::MemberNotFound {
                type_name: ty.full_name(),
                member: field.to_string(),
            })
    }

    fn get_instance_field(&self, obj: ObjectHandle, field: &str) -> Result<Value, AccessorError> {
        self.record(field);
        self.instance_fields
            .read()
            .get(&(obj, field.to_string()))
            .cloned()
            .ok_or_else(|| AccessorError::MemberNotFound {
                type_name: obj.to_string(),
                member: field.to_string(),
            })
    }

    fn invoke_instance(
        &self,
        obj: ObjectHandle,
        method: &str,
        args: &[Value],
        _arg_types: &[&str],
    ) -> Result<Value, AccessorError> {
        self.record(method);
        let f = self
            .instance_methods
            .read()
            .get(&(obj, method.to_string()))
            .cloned()
            .ok_or_else(|| AccessorError::MemberNotFound {
                type_name: obj.to_string(),
                member: method.to_string(),
            })?;
        f(args)
    }

    fn invoke_static(&self, ty: &TypeHandle, method: &str, args: &[Value]) -> Result<Value, AccessorError> {
        self.record(method);
        let f = self
            .static_methods
            .read()
            .get(&(ty.full_name(), method.to_string()))
            .cloned()
            .ok_or_else(|| AccessorError::MemberNotFound {
                type_name: ty.full_name(),
                member: method.to_string(),
            })?;
        f(args)
    }

    fn has_member(&self, ty: &TypeHandle, member: &str, kind: MemberKind) -> bool {
        self.members
            .read()
            .contains(&(ty.full_name(), member.to_string(), kind))
    }
}

/// Test entity over one builder.
#[derive(Debug)]
pub struct CubeBlock(pub EntityCore);

impl Entity for CubeBlock {
    fn from_builder(builder: ObjectBuilder) -> Self {
        Self(EntityCore::new(builder))
    }

    fn builder(&self) -> ObjectBuilder {
        self.0.builder()
    }

    fn is_changed(&self) -> bool {
        self.0.is_changed()
    }

    fn dispose(&self) {
        self.0.dispose();
    }
}

/// A second entity type, for type-filtered reads.
#[derive(Debug)]
pub struct InventoryItem(pub EntityCore);

impl Entity for InventoryItem {
    fn from_builder(builder: ObjectBuilder) -> Self {
        Self(EntityCore::new(builder))
    }

    fn builder(&self) -> ObjectBuilder {
        self.0.builder()
    }
}

/// Short timeouts so protocol tests finish quickly.
pub fn fast_config() -> MirrorConfig {
    MirrorConfig {
        save_acquire_timeout_ms: 150,
        save_release_timeout_ms: 400,
        sync_save_timeout_ms: 2_000,
        ..MirrorConfig::default()
    }
}

/// A fake host wired with every default binding, plus its session.
pub struct Harness {
    pub host: Arc<FakeHost>,
    pub runtime: Arc<MainThreadExecutor>,
    pub session: Arc<HostSession>,
    pub save_lock: Arc<ResourceLock>,
    pub bindings: HostBindings,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    pub fn with_config(config: MirrorConfig) -> Self {
        let bindings = HostBindings::default();
        let host = Arc::new(FakeHost::default());
        let save_lock = Arc::new(ResourceLock::new());
        let b = &bindings;

        let session_ty = host.add_type(&b.session_namespace, &b.session_class);
        host.set_static_field(&session_ty, &b.session_instance_field, Value::Object(SESSION));
        host.declare(&session_ty, &b.session_name_method, MemberKind::Method);
        host.declare(&session_ty, &b.session_save_method, MemberKind::Method);
        host.on_instance(SESSION, &b.session_name_method, |_| {
            Ok(Value::String("Test World".to_string()))
        });
        host.on_instance(SESSION, &b.session_save_method, |_| Ok(Value::Bool(true)));

        let snapshot_ty = host.add_type(&b.snapshot_namespace, &b.snapshot_class);
        host.set_static_field(&snapshot_ty, &b.snapshot_lock_field, Value::Lock(Arc::clone(&save_lock)));

        let async_ty = host.add_type(&b.async_save_namespace, &b.async_save_class);
        host.declare(&async_ty, &b.async_save_method, MemberKind::Method);

        let stats_ty = host.add_type(&b.game_stats_namespace, &b.game_stats_class);
        host.on_static(&stats_ty, &b.game_stats_instance_method, |_| Ok(Value::Object(STATS)));
        host.declare(&stats_ty, &b.updates_per_second_field, MemberKind::Field);
        host.set_instance_field(STATS, &b.updates_per_second_field, Value::Int(60));

        let runtime = Arc::new(MainThreadExecutor::start(config.main_queue_capacity).unwrap());
        let session = HostSession::new(
            Arc::clone(&host) as Arc<dyn Accessor>,
            Arc::clone(&runtime) as Arc<dyn livemirror::HostRuntime>,
            bindings.clone(),
            config,
        )
        .unwrap();

        Self {
            host,
            runtime,
            session,
            save_lock,
            bindings,
        }
    }

    pub fn async_save_type(&self) -> TypeHandle {
        TypeHandle::new(
            &self.bindings.async_save_namespace,
            &self.bindings.async_save_class,
        )
    }

    /// Scripts the async save entry point to take the save lock after
    /// `acquire_after` and hold it for `hold_for`, on a host worker thread.
    pub fn script_async_save(&self, acquire_after: Duration, hold_for: Duration) {
        let lock = Arc::clone(&self.save_lock);
        self.host.on_static(&self.async_save_type(), &self.bindings.async_save_method, move |_| {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                thread::sleep(acquire_after);
                let _guard = lock.exclusive();
                thread::sleep(hold_for);
            });
            Ok(Value::Null)
        });
    }

    /// Scripts the synchronous save entry point.
    pub fn script_sync_save<F>(&self, f: F)
    where
        F: Fn(&[Value]) -> Result<Value, AccessorError> + Send + Sync + 'static,
    {
        self.host.on_instance(SESSION, &self.bindings.session_save_method, f);
    }
}
