//! Save orchestration.
//!
//! The host's asynchronous save has no completion hook. Completion is
//! inferred from its save lock: the orchestrator queues the host's async
//! save entry point on the main thread, then polls the lock from its own
//! thread until it is seen owned and later seen released again.
//!
//! ```text
//! Idle -> SaveRequested -> WaitingForLockAcquired -> WaitingForLockReleased -> Completed
//!                                   |                          |
//!                                   +--------> TimedOut <------+
//! ```
//!
//! Both polling deadlines are measured from the start of the request. A timed
//! out save is abandoned silently: the single-flight flag is cleared and no
//! listener runs.
//!
//! The synchronous path, [`SaveOrchestrator::save_world`], calls the host's
//! blocking save on the main thread and waits for its success flag.

mod listeners;

pub use listeners::{ListenerId, SaveListener};

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::accessor::expect_bool;
use crate::error::AccessorError;
use crate::host::session::HostSession;
use crate::lock::ResourceLock;
use crate::value::Value;

use listeners::ListenerRegistry;

/// Where the orchestrator is in the save protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveState {
    #[default]
    Idle,
    SaveRequested,
    WaitingForLockAcquired,
    WaitingForLockReleased,
    Completed,
    TimedOut,
    /// The host rejected or failed the save, or it could not be reached.
    Failed,
}

impl SaveState {
    /// Whether the state ends a save attempt.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::Failed)
    }
}

/// Handle to the polling thread of one async save.
#[derive(Debug)]
pub struct SaveTicket {
    handle: JoinHandle<SaveState>,
}

impl SaveTicket {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the polling thread and returns the terminal state.
    pub fn join(self) -> SaveState {
        self.handle.join().unwrap_or(SaveState::Failed)
    }
}

#[derive(Debug)]
struct OrchestratorInner {
    session: Arc<HostSession>,
    state: Mutex<SaveState>,
    listeners: ListenerRegistry,
    last_completed_at: Mutex<Option<DateTime<Utc>>>,
}

/// Drives host saves for one session. Cloning shares the orchestrator.
#[derive(Debug, Clone)]
pub struct SaveOrchestrator {
    inner: Arc<OrchestratorInner>,
}

impl SaveOrchestrator {
    #[must_use]
    pub fn new(session: Arc<HostSession>) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                session,
                state: Mutex::new(SaveState::Idle),
                listeners: ListenerRegistry::default(),
                last_completed_at: Mutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn state(&self) -> SaveState {
        *self.inner.state.lock()
    }

    /// Whether a save is in flight.
    #[must_use]
    pub fn is_saving(&self) -> bool {
        self.inner.session.is_saving()
    }

    /// When the last save completed, if any did.
    #[must_use]
    pub fn last_completed_at(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_completed_at.lock()
    }

    /// Registers a "world saved" listener.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(Arc::new(listener))
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.listeners.unsubscribe(id)
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Starts the host's asynchronous save and watches its lock on a
    /// background thread. Returns `None` if a save is already in flight or
    /// the thread could not be started.
    pub fn request_async_save(&self) -> Option<SaveTicket> {
        let Some(flag) = SaveFlag::acquire(&self.inner.session) else {
            debug!("save already in flight; request dropped");
            return None;
        };
        self.inner.set_state(SaveState::SaveRequested);

        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name("livemirror-save-poll".to_string())
            .spawn(move || {
                let _flag = flag;
                inner.run_async_save()
            });

        match spawned {
            Ok(handle) => Some(SaveTicket { handle }),
            Err(e) => {
                error!(error = %e, "failed to spawn save polling thread");
                self.inner.set_state(SaveState::Failed);
                None
            }
        }
    }

    /// Runs the host's blocking save on the main thread and waits for it.
    /// Returns true when the host reported success. Dropped (false) if a save
    /// is already in flight.
    pub fn save_world(&self) -> bool {
        let inner = &self.inner;
        let Some(_flag) = SaveFlag::acquire(&inner.session) else {
            debug!("save already in flight; request dropped");
            return false;
        };
        inner.set_state(SaveState::SaveRequested);

        let outcome = if inner.session.runtime().is_main_thread() {
            Some(invoke_sync_save(&inner.session))
        } else {
            inner.save_on_main_thread()
        };

        match outcome {
            Some(Ok(true)) => {
                inner.complete();
                true
            }
            Some(Ok(false)) => {
                warn!("host save reported failure");
                inner.set_state(SaveState::Failed);
                false
            }
            Some(Err(e)) => {
                warn!(error = %e, "host save call failed");
                inner.set_state(SaveState::Failed);
                false
            }
            // State already recorded.
            None => false,
        }
    }
}

impl OrchestratorInner {
    fn set_state(&self, state: SaveState) {
        *self.state.lock() = state;
    }

    fn finish(&self, state: SaveState) -> SaveState {
        self.set_state(state);
        state
    }

    fn complete(&self) -> SaveState {
        let now = Utc::now();
        *self.last_completed_at.lock() = Some(now);
        self.set_state(SaveState::Completed);
        info!(completed_at = %now, "world saved");
        self.listeners.notify();
        SaveState::Completed
    }

    /// Body of the polling thread.
    fn run_async_save(&self) -> SaveState {
        let started = Instant::now();
        let config = self.session.config();
        let poll = config.save_poll_interval();

        let Some(lock) = self.session.save_lock() else {
            return self.finish(SaveState::Failed);
        };

        let (start_tx, start_rx) = bounded::<Result<(), AccessorError>>(1);
        let session = Arc::clone(&self.session);
        let queued = self.session.runtime().enqueue_main_thread(Box::new(move || {
            let _ = start_tx.send(start_async_save(&session));
        }));
        if let Err(e) = queued {
            warn!(error = %e, "failed to queue host async save");
            return self.finish(SaveState::Failed);
        }

        self.set_state(SaveState::WaitingForLockAcquired);
        match poll_lock(&lock, true, started + config.save_acquire_timeout(), poll, &start_rx) {
            Poll::Reached => {}
            Poll::TimedOut => {
                warn!(
                    timeout_ms = config.save_acquire_timeout_ms,
                    "host save never took its lock; abandoning"
                );
                return self.finish(SaveState::TimedOut);
            }
            Poll::Aborted(e) => {
                warn!(error = %e, "host async save failed to start");
                return self.finish(SaveState::Failed);
            }
        }

        self.set_state(SaveState::WaitingForLockReleased);
        match poll_lock(&lock, false, started + config.save_release_timeout(), poll, &start_rx) {
            Poll::Reached => self.complete(),
            Poll::TimedOut => {
                warn!(
                    timeout_ms = config.save_release_timeout_ms,
                    "host save still holds its lock; abandoning"
                );
                self.finish(SaveState::TimedOut)
            }
            Poll::Aborted(e) => {
                warn!(error = %e, "host async save failed");
                self.finish(SaveState::Failed)
            }
        }
    }

    /// Marshals the blocking save and waits for its result. `None` means the
    /// call never produced one; the state has been set accordingly.
    fn save_on_main_thread(&self) -> Option<Result<bool, AccessorError>> {
        let timeout = self.session.config().sync_save_timeout();
        let (tx, rx) = bounded::<Result<bool, AccessorError>>(1);
        let session = Arc::clone(&self.session);
        let queued = self.session.runtime().enqueue_main_thread(Box::new(move || {
            let _ = tx.send(invoke_sync_save(&session));
        }));
        if let Err(e) = queued {
            warn!(error = %e, "failed to queue host save");
            self.set_state(SaveState::Failed);
            return None;
        }

        match rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "host save did not return in time");
                self.set_state(SaveState::TimedOut);
                None
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("host save job dropped before it ran");
                self.set_state(SaveState::Failed);
                None
            }
        }
    }
}

enum Poll {
    Reached,
    TimedOut,
    Aborted(AccessorError),
}

/// Polls `lock.owned()` until it equals `target`, the deadline passes, or the
/// host reports that the save entry point failed.
fn poll_lock(
    lock: &ResourceLock,
    target: bool,
    deadline: Instant,
    interval: Duration,
    start_result: &Receiver<Result<(), AccessorError>>,
) -> Poll {
    loop {
        if lock.owned() == target {
            return Poll::Reached;
        }
        match start_result.try_recv() {
            Ok(Err(e)) => return Poll::Aborted(e),
            Ok(Ok(())) | Err(TryRecvError::Empty | TryRecvError::Disconnected) => {}
        }
        if Instant::now() >= deadline {
            return Poll::TimedOut;
        }
        thread::sleep(interval);
    }
}

fn start_async_save(session: &HostSession) -> Result<(), AccessorError> {
    let b = session.bindings();
    let accessor = session.accessor();
    let ty = accessor.resolve_type(&b.async_save_namespace, &b.async_save_class)?;
    accessor.invoke_static(&ty, &b.async_save_method, &[Value::Null, Value::Null])?;
    Ok(())
}

fn invoke_sync_save(session: &HostSession) -> Result<bool, AccessorError> {
    let b = session.bindings();
    let obj = session.resolve_session_object()?;
    let result = session.accessor().invoke_instance(
        obj,
        &b.session_save_method,
        &[Value::Null],
        &[b.session_save_arg_type.as_str()],
    )?;
    expect_bool(&b.session_save_method, result)
}

/// Owns the session's single-flight save slot; releases it on drop.
struct SaveFlag(Arc<HostSession>);

impl SaveFlag {
    fn acquire(session: &Arc<HostSession>) -> Option<Self> {
        session
            .try_begin_save()
            .then(|| Self(Arc::clone(session)))
    }
}

impl Drop for SaveFlag {
    fn drop(&mut self) {
        self.0.end_save();
    }
}
