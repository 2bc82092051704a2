//! "World saved" listener registry.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

/// Callback run once per completed save. Carries no payload.
pub type SaveListener = Arc<dyn Fn() + Send + Sync + 'static>;

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(Uuid);

impl ListenerId {
    /// Create a new random listener id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Ordered listener list. Listeners run in registration order on the thread
/// that completes the save.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    listeners: Mutex<Vec<(ListenerId, SaveListener)>>,
}

impl ListenerRegistry {
    pub(crate) fn subscribe(&self, listener: SaveListener) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.lock().push((id, listener));
        id
    }

    pub(crate) fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Runs every listener. The list is copied first so listeners may
    /// subscribe or unsubscribe without deadlocking. A panicking listener is
    /// logged and the rest still run.
    pub(crate) fn notify(&self) {
        let snapshot: Vec<(ListenerId, SaveListener)> = self
            .listeners
            .lock()
            .iter()
            .map(|(id, l)| (*id, Arc::clone(l)))
            .collect();
        for (id, listener) in snapshot {
            if panic::catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
                error!(listener = %id, "save listener panicked");
            }
        }
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}
