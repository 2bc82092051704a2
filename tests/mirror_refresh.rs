//! Refresh guard, time gate, pull+rebuild and typed reads against a fake host.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use common::{CubeBlock, Harness, InventoryItem, GRID};
use livemirror::{
    AccessorError, BackingKind, BuilderCategory, Entity, HostRuntime, KeyedEntities, MemberKind,
    MirrorCategory, MirrorConfig, MirrorStore, ObjectBuilder, ObjectHandle, StagingView, Value,
};

const GET_BUILDERS: &str = "GetObjectBuilders";
const GET_ENTITIES: &str = "GetEntities";

fn instant_refresh_config() -> MirrorConfig {
    MirrorConfig {
        refresh_base_interval_ms: 0,
        refresh_interval_scale_ms: 0,
        ..common::fast_config()
    }
}

fn builder_map(types: &[&str]) -> Value {
    Value::Map(
        types
            .iter()
            .enumerate()
            .map(|(i, t)| {
                (
                    Value::Object(ObjectHandle::from_raw(100 + i as u64)),
                    Value::Builder(ObjectBuilder::new(*t)),
                )
            })
            .collect(),
    )
}

/// Serves whatever value is currently scripted.
fn serve(h: &Harness, member: &str, value: Value) -> Arc<Mutex<Value>> {
    let current = Arc::new(Mutex::new(value));
    let served = Arc::clone(&current);
    h.host
        .on_instance(GRID, member, move |_| Ok(served.lock().clone()));
    current
}

fn block_store(h: &Harness) -> MirrorStore {
    MirrorStore::with_backing(
        Arc::clone(&h.session),
        Arc::new(BuilderCategory::<CubeBlock>::new("cube_blocks")),
        GRID,
        GET_BUILDERS,
        MemberKind::Method,
        BackingKind::KeyedBuilderMap,
    )
}

/// Maps staged set objects to blocks named after their handle and skips
/// handle 13.
struct GridEntities;

impl MirrorCategory for GridEntities {
    fn name(&self) -> &str {
        "grid_entities"
    }

    fn is_valid_entity(&self, object: ObjectHandle) -> bool {
        object.raw() != 13
    }

    fn load_dynamic(&self, staging: &StagingView<'_>, entities: &mut KeyedEntities) {
        entities.replace_all(staging.objects().map(|o| {
            Arc::new(CubeBlock::from_builder(ObjectBuilder::new(o.to_string()))) as Arc<dyn Entity>
        }));
    }
}

/// Rebuilds from staged builders one entity at a time. Once armed, it parks
/// after the first entity until resumed.
struct HalfwayBlocks {
    armed: AtomicBool,
    reached: Sender<()>,
    resume: Receiver<()>,
}

impl MirrorCategory for HalfwayBlocks {
    fn name(&self) -> &str {
        "halfway_blocks"
    }

    fn load_dynamic(&self, staging: &StagingView<'_>, entities: &mut KeyedEntities) {
        entities.replace_all(std::iter::empty::<Arc<dyn Entity>>());
        for (i, builder) in staging.builders.values().enumerate() {
            if i == 1 && self.armed.load(Ordering::SeqCst) {
                let _ = self.reached.send(());
                let _ = self.resume.recv_timeout(Duration::from_secs(5));
            }
            entities.push(Arc::new(CubeBlock::from_builder(builder.clone())));
        }
    }
}

fn type_ids(blocks: &[Arc<CubeBlock>]) -> Vec<String> {
    blocks.iter().map(|b| b.builder().type_id).collect()
}

#[test]
fn test_refresh_pulls_on_main_thread_and_rebuilds() {
    let h = Harness::new();
    serve(&h, GET_BUILDERS, builder_map(&["Armor", "Reactor"]));
    let store = block_store(&h);

    assert!(store.get_typed_data::<CubeBlock>().is_empty());
    h.runtime.sync().unwrap();

    let blocks = store.get_typed_data::<CubeBlock>();
    assert_eq!(type_ids(&blocks), vec!["Armor", "Reactor"]);
    assert_eq!(store.keys(), vec![0, 1]);
}

#[test]
fn test_second_refresh_within_interval_is_gated() {
    let h = Harness::new();
    serve(&h, GET_BUILDERS, builder_map(&["Armor"]));
    let store = block_store(&h);

    assert!(store.refresh());
    assert!(!store.refresh());
    h.runtime.sync().unwrap();

    assert_eq!(h.host.call_count(GET_BUILDERS), 1);
    assert!(store.last_refresh().is_some());
}

#[test]
fn test_first_dispatch_sets_full_backoff_interval() {
    let h = Harness::with_config(MirrorConfig {
        refresh_base_interval_ms: 250,
        refresh_interval_scale_ms: 850,
        ..common::fast_config()
    });
    serve(&h, GET_BUILDERS, builder_map(&[]));
    let store = block_store(&h);

    assert_eq!(store.refresh_interval(), Duration::from_millis(250));
    assert!(store.refresh());
    assert_eq!(store.refresh_interval(), Duration::from_millis(1100));
    assert_eq!(h.session.stats().total(), 1);
    assert_eq!(h.session.stats().count_for("cube_blocks"), 1);
}

#[test]
fn test_dispatch_counts_even_when_pull_is_skipped() {
    let h = Harness::with_config(instant_refresh_config());
    serve(&h, GET_BUILDERS, builder_map(&["Armor"]));
    let store = block_store(&h);

    // Hold the main thread so the pull cannot run before the host stops.
    let (release_tx, release_rx) = bounded::<()>(1);
    h.runtime
        .enqueue_main_thread(Box::new(move || {
            let _ = release_rx.recv_timeout(Duration::from_secs(5));
        }))
        .unwrap();

    assert!(store.refresh());
    h.runtime.set_running(false);
    release_tx.send(()).unwrap();
    h.runtime.sync().unwrap();

    assert_eq!(h.host.call_count(GET_BUILDERS), 0);
    assert_eq!(h.session.stats().total(), 1);
    assert_eq!(store.count(), 0);
}

#[test]
fn test_refresh_waits_for_queued_pull() {
    let h = Harness::with_config(instant_refresh_config());
    serve(&h, GET_BUILDERS, builder_map(&["Armor"]));
    let store = block_store(&h);

    let (release_tx, release_rx) = bounded::<()>(1);
    h.runtime
        .enqueue_main_thread(Box::new(move || {
            let _ = release_rx.recv_timeout(Duration::from_secs(5));
        }))
        .unwrap();

    assert!(store.refresh());
    // The interval has run out but the first pull is still queued.
    thread::sleep(Duration::from_millis(10));
    assert!(!store.can_refresh());
    assert!(!store.refresh());
    assert!(store.get_typed_data::<CubeBlock>().is_empty());

    release_tx.send(()).unwrap();
    h.runtime.sync().unwrap();
    assert_eq!(h.host.call_count(GET_BUILDERS), 1);
    assert_eq!(h.session.stats().total(), 1);
    assert_eq!(store.count(), 1);

    assert!(store.refresh());
    h.runtime.sync().unwrap();
    assert_eq!(h.host.call_count(GET_BUILDERS), 2);
}

#[test]
fn test_refresh_waits_for_running_pull() {
    let h = Harness::with_config(instant_refresh_config());
    let (entered_tx, entered_rx) = bounded::<()>(1);
    let (resume_tx, resume_rx) = bounded::<()>(1);
    h.host.on_instance(GRID, GET_BUILDERS, move |_| {
        let _ = entered_tx.try_send(());
        let _ = resume_rx.recv_timeout(Duration::from_secs(5));
        Ok(builder_map(&["Armor", "Reactor"]))
    });
    let store = block_store(&h);

    assert!(store.refresh());
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    // The pull holds the staging container it fills.
    assert!(store.is_staging_locked());
    assert!(!store.is_resource_locked());
    assert!(!store.can_refresh());
    assert!(!store.refresh());

    resume_tx.send(()).unwrap();
    h.runtime.sync().unwrap();
    assert!(!store.is_staging_locked());
    assert_eq!(h.host.call_count(GET_BUILDERS), 1);
    assert_eq!(store.count(), 2);
}

#[test]
fn test_readers_never_see_a_partial_rebuild() {
    let h = Harness::with_config(instant_refresh_config());
    let current = serve(&h, GET_BUILDERS, builder_map(&["Armor", "Reactor"]));
    let (reached_tx, reached_rx) = bounded::<()>(1);
    let (resume_tx, resume_rx) = bounded::<()>(1);
    let category = Arc::new(HalfwayBlocks {
        armed: AtomicBool::new(false),
        reached: reached_tx,
        resume: resume_rx,
    });
    let store: MirrorStore = MirrorStore::with_backing(
        Arc::clone(&h.session),
        Arc::clone(&category) as Arc<dyn MirrorCategory>,
        GRID,
        GET_BUILDERS,
        MemberKind::Method,
        BackingKind::KeyedBuilderMap,
    );

    assert!(store.refresh());
    h.runtime.sync().unwrap();
    assert_eq!(type_ids(&store.get_typed_data::<CubeBlock>()), vec!["Armor", "Reactor"]);
    // Let the pull queued by that read finish.
    h.runtime.sync().unwrap();

    *current.lock() = builder_map(&["Battery", "Cockpit", "Drill"]);
    category.armed.store(true, Ordering::SeqCst);
    assert!(store.refresh());
    reached_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    // One entity in: the main lock is held for the whole rebuild.
    assert!(store.is_resource_locked());
    assert!(!store.can_refresh());
    let reader = store.clone();
    let read = thread::spawn(move || type_ids(&reader.get_typed_data::<CubeBlock>()));
    thread::sleep(Duration::from_millis(20));
    assert!(!read.is_finished());

    // The reader may queue one more pull; let that one run straight through.
    category.armed.store(false, Ordering::SeqCst);
    resume_tx.send(()).unwrap();
    h.runtime.sync().unwrap();
    assert_eq!(read.join().unwrap(), vec!["Battery", "Cockpit", "Drill"]);
    h.runtime.sync().unwrap();
    assert!(!store.is_resource_locked());
    assert_eq!(store.keys(), vec![0, 1, 2]);
}

#[test]
fn test_validity_filter_applies_while_staging() {
    let h = Harness::with_config(instant_refresh_config());
    serve(
        &h,
        GET_ENTITIES,
        Value::Collection(vec![
            Value::Object(ObjectHandle::from_raw(11)),
            Value::Object(ObjectHandle::from_raw(13)),
            Value::Object(ObjectHandle::from_raw(12)),
        ]),
    );
    let store: MirrorStore = MirrorStore::with_backing(
        Arc::clone(&h.session),
        Arc::new(GridEntities),
        GRID,
        GET_ENTITIES,
        MemberKind::Method,
        BackingKind::Set,
    );

    assert!(store.refresh());
    h.runtime.sync().unwrap();

    let blocks = store.get_typed_data::<CubeBlock>();
    assert_eq!(type_ids(&blocks), vec!["obj#11", "obj#12"]);
}

#[test]
fn test_list_backing_reads_instance_field() {
    let h = Harness::with_config(instant_refresh_config());
    h.host.set_instance_field(
        GRID,
        "m_entities",
        Value::Collection(vec![
            Value::Object(ObjectHandle::from_raw(11)),
            Value::Object(ObjectHandle::from_raw(11)),
        ]),
    );
    let store: MirrorStore = MirrorStore::with_backing(
        Arc::clone(&h.session),
        Arc::new(GridEntities),
        GRID,
        "m_entities",
        MemberKind::Field,
        BackingKind::List,
    );

    assert!(store.refresh());
    h.runtime.sync().unwrap();
    // Lists keep duplicates.
    assert_eq!(store.count(), 2);
}

#[test]
fn test_failed_pull_keeps_previous_snapshot() {
    let h = Harness::with_config(instant_refresh_config());
    serve(&h, GET_BUILDERS, builder_map(&["Armor", "Reactor"]));
    let store = block_store(&h);

    assert!(store.refresh());
    h.runtime.sync().unwrap();
    assert_eq!(store.count(), 2);

    h.host.on_instance(GRID, GET_BUILDERS, |_| {
        Err(AccessorError::InvocationFailed {
            member: GET_BUILDERS.to_string(),
            reason: "grid closed".to_string(),
        })
    });
    assert!(store.refresh());
    h.runtime.sync().unwrap();
    assert_eq!(store.count(), 2);

    // A non-map value is rejected the same way.
    serve(&h, GET_BUILDERS, Value::Int(7));
    assert!(store.refresh());
    h.runtime.sync().unwrap();
    assert_eq!(type_ids(&store.get_typed_data::<CubeBlock>()), vec!["Armor", "Reactor"]);
}

#[test]
fn test_later_pulls_replace_the_snapshot() {
    let h = Harness::with_config(instant_refresh_config());
    let current = serve(&h, GET_BUILDERS, builder_map(&["Armor", "Reactor"]));
    let store = block_store(&h);

    assert!(store.refresh());
    h.runtime.sync().unwrap();
    *current.lock() = builder_map(&["Battery"]);
    assert!(store.refresh());
    h.runtime.sync().unwrap();

    assert_eq!(type_ids(&store.get_typed_data::<CubeBlock>()), vec!["Battery"]);
    assert_eq!(store.keys(), vec![0]);
}

#[test]
fn test_guard_blocks_refresh() {
    let h = Harness::with_config(instant_refresh_config());
    serve(&h, GET_BUILDERS, builder_map(&["Armor"]));
    let store = block_store(&h);

    // Host save lock owned.
    {
        let _held = h.save_lock.exclusive();
        assert!(!store.can_refresh());
        assert!(!store.refresh());
    }
    assert!(store.can_refresh());

    // Immutable.
    store.set_mutable(false);
    assert!(!store.refresh());
    store.set_mutable(true);

    // Not dynamic.
    store.set_dynamic(false);
    assert!(!store.refresh());
    store.set_dynamic(true);

    // Host loop stopped.
    h.runtime.set_running(false);
    assert!(!store.refresh());
    h.runtime.set_running(true);

    // Save lock unresolvable.
    h.host
        .remove_type(&h.bindings.snapshot_namespace, &h.bindings.snapshot_class);
    assert!(!store.refresh());

    h.runtime.sync().unwrap();
    assert_eq!(h.host.call_count(GET_BUILDERS), 0);
}

#[test]
fn test_static_store_never_refreshes() {
    let h = Harness::new();
    let store: MirrorStore = MirrorStore::new(
        Arc::clone(&h.session),
        Arc::new(BuilderCategory::<CubeBlock>::new("static_blocks")),
    );
    assert!(!store.is_dynamic());
    assert!(!store.refresh());
    assert!(store.backing().is_none());
}

#[test]
fn test_typed_reads_filter_by_runtime_type_and_copy() {
    let h = Harness::new();
    let store: MirrorStore = MirrorStore::new(
        Arc::clone(&h.session),
        Arc::new(BuilderCategory::<CubeBlock>::new("mixed")),
    );
    store.new_entry_with::<CubeBlock>(ObjectBuilder::new("Armor")).unwrap();
    store
        .new_entry_with::<InventoryItem>(ObjectBuilder::new("Ore"))
        .unwrap();
    store.new_entry_with::<CubeBlock>(ObjectBuilder::new("Reactor")).unwrap();

    let mut blocks = store.get_typed_data::<CubeBlock>();
    assert_eq!(type_ids(&blocks), vec!["Armor", "Reactor"]);
    assert_eq!(store.get_typed_data::<InventoryItem>().len(), 1);

    blocks.clear();
    assert_eq!(store.count(), 3);
}
