//! # livemirror - Live Mirror Cache for Foreign Host Processes
//!
//! livemirror keeps an in-process, strongly-typed snapshot of state owned by
//! an external, continuously running host. Snapshots are refreshed on an
//! adaptive schedule, pulls are marshalled onto the host's main thread, and
//! saves are coordinated against the host's own save lock without blocking
//! its update loop.
//!
//! ## Core Concepts
//!
//! - **Accessor**: name-based, fallible access to host types and members
//! - **HostSession**: explicit context shared by every store of one session
//! - **MirrorStore**: per-category keyed cache of `Entity` values
//! - **RefreshStats**: session-wide counters behind the adaptive interval
//! - **SaveOrchestrator**: infers host save completion from its save lock
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use livemirror::{
//!     BackingKind, BuilderCategory, HostBindings, HostSession, MainThreadExecutor, MemberKind,
//!     MirrorConfig, MirrorStore, SaveOrchestrator,
//! };
//!
//! let runtime = Arc::new(MainThreadExecutor::start(1024)?);
//! let session = HostSession::new(accessor, runtime, HostBindings::default(), MirrorConfig::default())?;
//!
//! let blocks: MirrorStore = MirrorStore::with_backing(
//!     Arc::clone(&session),
//!     Arc::new(BuilderCategory::<CubeBlock>::new("cube_blocks")),
//!     grid,
//!     "GetObjectBuilders",
//!     MemberKind::Method,
//!     BackingKind::KeyedBuilderMap,
//! );
//! let snapshot = blocks.get_typed_data::<CubeBlock>();
//!
//! let saves = SaveOrchestrator::new(session);
//! saves.subscribe(|| println!("world saved"));
//! saves.request_async_save();
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Host-facing primitives
pub mod accessor;
pub mod builder;
pub mod config;
pub mod error;
pub mod lock;
pub mod value;

// Session context, mirror stores and save orchestration
pub mod host;
pub mod mirror;
pub mod save;

// Re-export primary types at crate root for convenience
pub use accessor::{Accessor, MemberKind};
pub use builder::{BuilderProperty, ObjectBuilder};
pub use config::{HostBindings, MirrorConfig};
pub use error::{AccessorError, ExecutionError, MirrorError, MirrorResult, PersistenceError};
pub use lock::ResourceLock;
pub use value::{ObjectHandle, TypeHandle, Value};

pub use host::{
    self_check, BindingCheck, HostRuntime, HostSession, MainThreadExecutor, MainThreadJob,
    SelfCheckReport,
};
pub use mirror::{
    BackingKind, BuilderCategory, Definitions, DefinitionsContainer, Entity, EntityCore,
    EntityKey, KeyedEntities, MirrorCategory, MirrorStore, RefreshStats, StagingView,
};
pub use save::{ListenerId, SaveOrchestrator, SaveState, SaveTicket};
