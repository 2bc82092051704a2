//! Adaptive refresh pacing.
//!
//! Every dispatched refresh is counted twice: once in a process-wide total
//! and once for the category that dispatched it. A category's next interval
//! grows linearly with its share of all refresh traffic:
//!
//! ```text
//! interval = (category_count / total_count) * scale + base
//! ```
//!
//! so a category that refreshes more often than its peers backs off harder.
//! `RefreshStats` is shared by every store of one host session; each store
//! keeps its own `RefreshSchedule`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::config::MirrorConfig;

#[derive(Debug)]
struct StatsState {
    total: u64,
    per_category: HashMap<String, u64>,
    average_pull_ms: f64,
    last_profile_output: Instant,
}

/// Session-wide refresh counters.
#[derive(Debug)]
pub struct RefreshStats {
    state: Mutex<StatsState>,
    base: Duration,
    scale: Duration,
    profiling_interval: Duration,
}

impl RefreshStats {
    #[must_use]
    pub fn new(config: &MirrorConfig) -> Self {
        Self {
            state: Mutex::new(StatsState {
                total: 0,
                per_category: HashMap::new(),
                average_pull_ms: 0.0,
                last_profile_output: Instant::now(),
            }),
            base: config.refresh_base_interval(),
            scale: Duration::from_millis(config.refresh_interval_scale_ms),
            profiling_interval: config.profiling_output_interval(),
        }
    }

    /// Counts one dispatched refresh for `category` and returns the
    /// category's next interval.
    pub fn record_dispatch(&self, category: &str) -> Duration {
        let mut state = self.state.lock();
        state.total += 1;
        let count = {
            let entry = state.per_category.entry(category.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        interval_for_share(count, state.total, self.base, self.scale)
    }

    /// Total refreshes dispatched across all categories.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.state.lock().total
    }

    /// Refreshes dispatched for one category.
    #[must_use]
    pub fn count_for(&self, category: &str) -> u64 {
        self.state.lock().per_category.get(category).copied().unwrap_or(0)
    }

    /// The interval `category` would get from the current counters.
    #[must_use]
    pub fn current_interval(&self, category: &str) -> Duration {
        let state = self.state.lock();
        let count = state.per_category.get(category).copied().unwrap_or(0);
        interval_for_share(count, state.total, self.base, self.scale)
    }

    /// Folds one pull+rebuild duration into the running average and logs it
    /// at most once per profiling interval.
    pub fn record_pull(&self, category: &str, elapsed: Duration) {
        let mut state = self.state.lock();
        let ms = elapsed.as_secs_f64() * 1000.0;
        state.average_pull_ms = (state.average_pull_ms + ms) / 2.0;
        if state.last_profile_output.elapsed() > self.profiling_interval {
            state.last_profile_output = Instant::now();
            debug!(
                category,
                average_ms = (state.average_pull_ms * 100.0).round() / 100.0,
                "average time to refresh mirrored data"
            );
        }
    }

    /// Running average of pull+rebuild time.
    #[must_use]
    pub fn average_pull_time(&self) -> Duration {
        Duration::from_secs_f64(self.state.lock().average_pull_ms.max(0.0) / 1000.0)
    }
}

/// `(count / total) * scale + base`, with an empty total yielding `base`.
#[must_use]
pub fn interval_for_share(count: u64, total: u64, base: Duration, scale: Duration) -> Duration {
    if total == 0 {
        return base;
    }
    #[allow(clippy::cast_precision_loss)]
    let share = (count.min(total) as f64) / (total as f64);
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let extra_ns = (scale.as_nanos() as f64 * share).round() as u64;
    base + Duration::from_nanos(extra_ns)
}

/// Per-store time gate.
#[derive(Debug, Clone)]
pub struct RefreshSchedule {
    interval: Duration,
    last_refresh: Option<Instant>,
}

impl RefreshSchedule {
    #[must_use]
    pub const fn new(initial_interval: Duration) -> Self {
        Self {
            interval: initial_interval,
            last_refresh: None,
        }
    }

    /// Claims the slot at `now` if the interval has elapsed since the last
    /// claim. A schedule that never refreshed is always due.
    pub fn try_claim(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_refresh {
            if now.saturating_duration_since(last) < self.interval {
                return false;
            }
        }
        self.last_refresh = Some(now);
        true
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub const fn last_refresh(&self) -> Option<Instant> {
        self.last_refresh
    }
}
