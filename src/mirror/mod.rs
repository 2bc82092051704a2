//! The live-mirror cache: stores, their entities, staging, refresh pacing and
//! file persistence.

pub mod entity;
pub mod persist;
pub mod schedule;
pub mod staging;
pub mod store;

pub use entity::{downcast_entity, AsAny, Entity, EntityCore, EntityKey};
pub use persist::{
    load_content_file, locate_builder_field, save_content_file, ContainerField, Definitions,
    DefinitionsContainer, FieldKind,
};
pub use schedule::{interval_for_share, RefreshSchedule, RefreshStats};
pub use staging::{BackingKind, Staging, StagingView};
pub use store::{Backing, BuilderCategory, KeyedEntities, MirrorCategory, MirrorStore};
