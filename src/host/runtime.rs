//! Host main-thread marshalling.
//!
//! Anything that touches host-owned state runs on the host's single main
//! thread. The core hands zero-argument closures to a `HostRuntime`, which
//! queues them FIFO and runs them whenever the host drains its queue.
//! `MainThreadExecutor` is an in-process runtime with one dedicated thread,
//! used when embedding the core without a foreign host loop and in tests.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::error;

use crate::error::{ExecutionError, MirrorError, MirrorResult};

/// Unit of work marshalled onto the host main thread.
pub type MainThreadJob = Box<dyn FnOnce() + Send + 'static>;

/// The host's action queue plus its liveness.
pub trait HostRuntime: Send + Sync {
    /// Queue `job` for the host main thread. Fire-and-forget: returns once
    /// queued, not once run. Fails with `HostNotRunning` while the update
    /// loop is stopped.
    fn enqueue_main_thread(&self, job: MainThreadJob) -> MirrorResult<()>;

    /// Whether the host's update loop is currently running.
    fn is_running(&self) -> bool;

    /// Whether the calling thread is the host main thread.
    fn is_main_thread(&self) -> bool {
        false
    }
}

enum Job {
    Run(MainThreadJob),
    Barrier(Sender<()>),
}

const PATH: &str = "main_thread";

/// Single-threaded in-process host runtime.
pub struct MainThreadExecutor {
    tx: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    running: AtomicBool,
    queue_capacity: usize,
}

impl MainThreadExecutor {
    /// Spawn the main thread with a bounded queue. The runtime starts in the
    /// running state.
    pub fn start(queue_capacity: usize) -> MirrorResult<Self> {
        let queue_capacity = queue_capacity.max(1);
        let (tx, rx) = bounded::<Job>(queue_capacity);

        let handle = thread::Builder::new()
            .name("livemirror-main".to_string())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    match job {
                        Job::Run(run) => {
                            if panic::catch_unwind(AssertUnwindSafe(run)).is_err() {
                                error!("main thread job panicked");
                            }
                        }
                        Job::Barrier(reply) => {
                            let _ = reply.send(());
                        }
                    }
                }
            })
            .map_err(|e| MirrorError::internal(format!("failed to spawn main thread: {e}")))?;

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            worker_id: handle.thread().id(),
            worker: Mutex::new(Some(handle)),
            running: AtomicBool::new(true),
            queue_capacity,
        })
    }

    /// Mark the host update loop as started or stopped. Jobs queued before a
    /// stop still run; new ones are refused until restarted.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    /// Block until every job queued before this call has run.
    pub fn sync(&self) -> MirrorResult<()> {
        self.sync_timeout(Duration::from_secs(30))
    }

    /// [`sync`](Self::sync) with an explicit bound.
    pub fn sync_timeout(&self, timeout: Duration) -> MirrorResult<()> {
        if self.is_main_thread() {
            return Err(MirrorError::internal("sync called from the main thread"));
        }
        let (reply_tx, reply_rx) = bounded::<()>(1);
        self.sender()?
            .send_timeout(Job::Barrier(reply_tx), timeout)
            .map_err(|_| disconnected())?;
        reply_rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => MirrorError::Execution(ExecutionError::Timeout {
                duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            }),
            RecvTimeoutError::Disconnected => disconnected(),
        })
    }

    /// Close the queue, let the thread drain it, and join.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        drop(self.tx.lock().take());
        if let Some(handle) = self.worker.lock().take() {
            if thread::current().id() != self.worker_id {
                let _ = handle.join();
            }
        }
    }

    fn sender(&self) -> MirrorResult<Sender<Job>> {
        self.tx.lock().clone().ok_or_else(disconnected)
    }
}

impl HostRuntime for MainThreadExecutor {
    fn enqueue_main_thread(&self, job: MainThreadJob) -> MirrorResult<()> {
        let tx = self.sender()?;
        if !self.is_running() {
            return Err(MirrorError::Execution(ExecutionError::HostNotRunning));
        }
        match tx.try_send(Job::Run(job)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(MirrorError::Execution(ExecutionError::QueueFull {
                path: PATH.to_string(),
                capacity: self.queue_capacity,
            })),
            Err(TrySendError::Disconnected(_)) => Err(disconnected()),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn is_main_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }
}

impl Drop for MainThreadExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn disconnected() -> MirrorError {
    MirrorError::Execution(ExecutionError::Disconnected {
        path: PATH.to_string(),
    })
}
