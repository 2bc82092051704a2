//! Configuration for the mirror core.
//!
//! `MirrorConfig` carries the tunables (refresh pacing, save timeouts, queue
//! sizes) and `HostBindings` carries every host type and member name the
//! core resolves. Both have defaults matching a stock host and can be loaded
//! from JSON, where missing keys fall back to those defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MirrorError, MirrorResult};

/// Tunables for refresh scheduling and save orchestration.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Floor of the adaptive refresh interval.
    pub refresh_base_interval_ms: u64,
    /// Interval growth for a category that accounts for all refresh traffic.
    pub refresh_interval_scale_ms: u64,
    /// How long to wait for the host save lock to become owned.
    pub save_acquire_timeout_ms: u64,
    /// How long (from the same start) to wait for it to be released again.
    pub save_release_timeout_ms: u64,
    /// Sleep between save lock polls.
    pub save_poll_interval_ms: u64,
    /// Upper bound on waiting for the synchronous save entry point.
    pub sync_save_timeout_ms: u64,
    /// Minimum spacing of refresh profiling log lines.
    pub profiling_output_interval_secs: u64,
    /// Capacity of the in-process main thread queue.
    pub main_queue_capacity: usize,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            refresh_base_interval_ms: 250,
            refresh_interval_scale_ms: 850,
            save_acquire_timeout_ms: 20_000,
            save_release_timeout_ms: 60_000,
            save_poll_interval_ms: 1,
            sync_save_timeout_ms: 120_000,
            profiling_output_interval_secs: 30,
            main_queue_capacity: 1024,
        }
    }
}

impl MirrorConfig {
    /// Parses a JSON document; absent keys keep their defaults.
    pub fn from_json_str(text: &str) -> MirrorResult<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| MirrorError::invalid_configuration(format!("mirror config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that would make polling spin or never time out.
    pub fn validate(&self) -> MirrorResult<()> {
        if self.save_poll_interval_ms == 0 {
            return Err(MirrorError::invalid_configuration(
                "save_poll_interval_ms must be non-zero",
            ));
        }
        if self.save_acquire_timeout_ms == 0 || self.save_release_timeout_ms == 0 {
            return Err(MirrorError::invalid_configuration("save timeouts must be non-zero"));
        }
        if self.save_release_timeout_ms < self.save_acquire_timeout_ms {
            return Err(MirrorError::invalid_configuration(
                "save_release_timeout_ms must not be shorter than save_acquire_timeout_ms",
            ));
        }
        if self.sync_save_timeout_ms == 0 {
            return Err(MirrorError::invalid_configuration("sync_save_timeout_ms must be non-zero"));
        }
        if self.main_queue_capacity == 0 {
            return Err(MirrorError::invalid_configuration("main_queue_capacity must be non-zero"));
        }
        Ok(())
    }

    #[must_use]
    pub const fn refresh_base_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_base_interval_ms)
    }

    #[must_use]
    pub const fn save_acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.save_acquire_timeout_ms)
    }

    #[must_use]
    pub const fn save_release_timeout(&self) -> Duration {
        Duration::from_millis(self.save_release_timeout_ms)
    }

    #[must_use]
    pub const fn save_poll_interval(&self) -> Duration {
        Duration::from_millis(self.save_poll_interval_ms)
    }

    #[must_use]
    pub const fn sync_save_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_save_timeout_ms)
    }

    #[must_use]
    pub const fn profiling_output_interval(&self) -> Duration {
        Duration::from_secs(self.profiling_output_interval_secs)
    }
}

/// Host type and member names resolved through the accessor facade.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostBindings {
    pub session_namespace: String,
    pub session_class: String,
    /// Static field holding the live session instance.
    pub session_instance_field: String,
    pub session_name_method: String,
    /// Blocking save; takes one string argument and returns a bool.
    pub session_save_method: String,
    pub session_save_arg_type: String,

    pub async_save_namespace: String,
    pub async_save_class: String,
    /// Static entry point that starts a background save.
    pub async_save_method: String,

    pub snapshot_namespace: String,
    pub snapshot_class: String,
    /// Static field holding the host's save lock.
    pub snapshot_lock_field: String,

    pub game_stats_namespace: String,
    pub game_stats_class: String,
    pub game_stats_instance_method: String,
    pub updates_per_second_field: String,
}

impl Default for HostBindings {
    fn default() -> Self {
        Self {
            session_namespace: "Sandbox.Game.World".to_string(),
            session_class: "MySession".to_string(),
            session_instance_field: "<Static>k__BackingField".to_string(),
            session_name_method: "get_Name".to_string(),
            session_save_method: "Save".to_string(),
            session_save_arg_type: "System.String".to_string(),

            async_save_namespace: "Sandbox.Game.Screens.Helpers".to_string(),
            async_save_class: "MyAsyncSaving".to_string(),
            async_save_method: "Start".to_string(),

            snapshot_namespace: "Sandbox.Game.World".to_string(),
            snapshot_class: "MySessionSnapshot".to_string(),
            snapshot_lock_field: "m_savingLock".to_string(),

            game_stats_namespace: "Sandbox.Game".to_string(),
            game_stats_class: "MyGameStats".to_string(),
            game_stats_instance_method: "get_Static".to_string(),
            updates_per_second_field: "<UpdatesPerSecond>k__BackingField".to_string(),
        }
    }
}

impl HostBindings {
    /// Parses a JSON document; absent keys keep their defaults.
    pub fn from_json_str(text: &str) -> MirrorResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| MirrorError::invalid_configuration(format!("host bindings: {e}")))
    }
}
