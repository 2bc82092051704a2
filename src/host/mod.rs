//! Host-facing plumbing: the session context, main-thread marshalling and
//! the startup self-check.

/// Startup binding self-check.
pub mod diagnostics;
/// Main-thread queue abstraction and in-process executor.
pub mod runtime;
/// Explicit per-session context.
pub mod session;

pub use diagnostics::{self_check, BindingCheck, SelfCheckReport};
pub use runtime::{HostRuntime, MainThreadExecutor, MainThreadJob};
pub use session::HostSession;
