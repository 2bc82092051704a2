//! Host session context.
//!
//! One `HostSession` exists per attached host session. It owns the accessor
//! facade, the host runtime, the name bindings, the tunables, the
//! session-wide refresh statistics and the "mid-save" flag, and is passed
//! explicitly to every mirror store and to the save orchestrator.
//!
//! Property getters here never fail: accessor errors are logged and a safe
//! default is returned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::accessor::{expect_object, Accessor, MemberKind};
use crate::config::{HostBindings, MirrorConfig};
use crate::error::{AccessorError, MirrorResult};
use crate::host::runtime::HostRuntime;
use crate::lock::ResourceLock;
use crate::mirror::schedule::RefreshStats;
use crate::value::{ObjectHandle, TypeHandle, Value};

/// Explicit context shared by the stores and the save orchestrator of one
/// host session.
pub struct HostSession {
    accessor: Arc<dyn Accessor>,
    runtime: Arc<dyn HostRuntime>,
    bindings: HostBindings,
    config: MirrorConfig,
    stats: RefreshStats,
    saving: AtomicBool,
}

impl HostSession {
    /// Creates a session context after validating `config`.
    pub fn new(
        accessor: Arc<dyn Accessor>,
        runtime: Arc<dyn HostRuntime>,
        bindings: HostBindings,
        config: MirrorConfig,
    ) -> MirrorResult<Arc<Self>> {
        config.validate()?;
        let stats = RefreshStats::new(&config);
        Ok(Arc::new(Self {
            accessor,
            runtime,
            bindings,
            config,
            stats,
            saving: AtomicBool::new(false),
        }))
    }

    #[must_use]
    pub fn accessor(&self) -> &dyn Accessor {
        self.accessor.as_ref()
    }

    #[must_use]
    pub fn runtime(&self) -> &dyn HostRuntime {
        self.runtime.as_ref()
    }

    #[must_use]
    pub const fn bindings(&self) -> &HostBindings {
        &self.bindings
    }

    #[must_use]
    pub const fn config(&self) -> &MirrorConfig {
        &self.config
    }

    #[must_use]
    pub const fn stats(&self) -> &RefreshStats {
        &self.stats
    }

    /// Whether the host update loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.runtime.is_running()
    }

    /// Whether a save driven by this session is in flight.
    #[must_use]
    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::Acquire)
    }

    /// Single-flight entry: true if this caller now owns the save slot.
    pub(crate) fn try_begin_save(&self) -> bool {
        self.saving
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn end_save(&self) {
        self.saving.store(false, Ordering::Release);
    }

    /// True when nothing save-related blocks a refresh: no save in flight
    /// here, and the host save lock resolves and is unowned.
    #[must_use]
    pub fn save_window_clear(&self) -> bool {
        if self.is_saving() {
            return false;
        }
        // Polled on every refresh check; keep the failure quiet.
        match self.resolve_save_lock() {
            Ok(lock) => !lock.owned(),
            Err(e) => {
                debug!(error = %e, "save lock unresolved; refresh window closed");
                false
            }
        }
    }

    /// The host's save lock, or `None` if it cannot be resolved.
    #[must_use]
    pub fn save_lock(&self) -> Option<Arc<ResourceLock>> {
        match self.resolve_save_lock() {
            Ok(lock) => Some(lock),
            Err(e) => {
                warn!(error = %e, "failed to resolve host save lock");
                None
            }
        }
    }

    /// The live session object, or `None` if it cannot be resolved.
    #[must_use]
    pub fn session_object(&self) -> Option<ObjectHandle> {
        match self.resolve_session_object() {
            Ok(obj) => Some(obj),
            Err(e) => {
                warn!(error = %e, "failed to resolve host session object");
                None
            }
        }
    }

    /// The session's display name; empty when unavailable.
    #[must_use]
    pub fn session_name(&self) -> String {
        let Some(obj) = self.session_object() else {
            return String::new();
        };
        match self
            .accessor
            .invoke_instance(obj, &self.bindings.session_name_method, &[], &[])
        {
            Ok(Value::String(name)) => name,
            Ok(other) => {
                warn!(value = %other, "session name getter returned a non-string");
                String::new()
            }
            Err(e) => {
                warn!(error = %e, "failed to read session name");
                String::new()
            }
        }
    }

    /// Host simulation updates per second; 0 when unavailable.
    #[must_use]
    pub fn updates_per_second(&self) -> i64 {
        match self.resolve_updates_per_second() {
            Ok(ups) => ups,
            Err(e) => {
                warn!(error = %e, "failed to read host updates per second");
                0
            }
        }
    }

    pub(crate) fn session_type(&self) -> Result<TypeHandle, AccessorError> {
        self.accessor
            .resolve_type(&self.bindings.session_namespace, &self.bindings.session_class)
    }

    pub(crate) fn resolve_session_object(&self) -> Result<ObjectHandle, AccessorError> {
        let ty = self.session_type()?;
        let field = &self.bindings.session_instance_field;
        expect_object(field, self.accessor.get_static_field(&ty, field)?)
    }

    fn resolve_save_lock(&self) -> Result<Arc<ResourceLock>, AccessorError> {
        let b = &self.bindings;
        let ty = self
            .accessor
            .resolve_type(&b.snapshot_namespace, &b.snapshot_class)?;
        let value = self.accessor.get_static_field(&ty, &b.snapshot_lock_field)?;
        match value {
            Value::Lock(lock) => Ok(lock),
            other => Err(AccessorError::UnexpectedValue {
                member: b.snapshot_lock_field.clone(),
                expected: "lock",
                actual: other.type_name().to_string(),
            }),
        }
    }

    fn resolve_updates_per_second(&self) -> Result<i64, AccessorError> {
        let b = &self.bindings;
        let ty = self
            .accessor
            .resolve_type(&b.game_stats_namespace, &b.game_stats_class)?;
        let stats = expect_object(
            &b.game_stats_instance_method,
            self.accessor
                .invoke_static(&ty, &b.game_stats_instance_method, &[])?,
        )?;
        let value = crate::accessor::read_member(
            self.accessor.as_ref(),
            stats,
            &b.updates_per_second_field,
            MemberKind::Field,
        )?;
        value.as_int().ok_or_else(|| AccessorError::UnexpectedValue {
            member: b.updates_per_second_field.clone(),
            expected: "int",
            actual: value.type_name().to_string(),
        })
    }
}

impl std::fmt::Debug for HostSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostSession")
            .field("bindings", &self.bindings)
            .field("config", &self.config)
            .field("saving", &self.is_saving())
            .finish_non_exhaustive()
    }
}
