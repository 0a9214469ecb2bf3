//! Error Handling
//!
//! The runtime distinguishes two classes of failure:
//!
//! - User-code faults: an error returned from a setup function, render
//!   function, watcher, or event handler. These are caught at the call
//!   boundary, logged with a source tag, and the failing unit is skipped
//!   for the current cycle. The rest of the flush continues.
//!
//! - Scheduler overflow: a job re-queueing itself past the recursion
//!   ceiling. This indicates a real update-loop bug that no local recovery
//!   can resolve, so it is the one error that propagates out of a flush.
//!
//! Non-fatal invariant violations (writes to readonly wrappers, duplicate
//! keys among siblings, re-mounting a mounted app) are not errors at all;
//! they are reported through `tracing::warn!` and execution continues with
//! best-effort behavior.

use thiserror::Error;

/// Errors surfaced by the runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// A job exceeded the recursion ceiling within a single flush.
    #[error("recursive update limit exceeded for job {id}; this is likely an infinite update loop")]
    RecursiveUpdate {
        /// Identifier of the offending job.
        id: u64,
    },

    /// A fault produced by user code inside a hook.
    #[error("{origin}: {message}")]
    Hook {
        /// Which kind of hook produced the fault.
        origin: ErrorSource,
        /// Human-readable description of the fault.
        message: String,
    },
}

impl Error {
    /// Create a user-code fault with the given source tag.
    pub fn hook(origin: ErrorSource, message: impl Into<String>) -> Self {
        Self::Hook {
            origin,
            message: message.into(),
        }
    }
}

/// Categorized origin of a user-code fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSource {
    SetupFunction,
    RenderFunction,
    WatchGetter,
    WatchCallback,
    WatchCleanup,
    NativeEventHandler,
    ComponentEventHandler,
}

impl ErrorSource {
    /// Stable string form used in log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SetupFunction => "setup function",
            Self::RenderFunction => "render function",
            Self::WatchGetter => "watcher getter",
            Self::WatchCallback => "watch callback",
            Self::WatchCleanup => "watch cleanup function",
            Self::NativeEventHandler => "native event handler",
            Self::ComponentEventHandler => "component event handler",
        }
    }
}

impl std::fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run a fallible user closure, converting a fault into a logged skip.
///
/// Returns `Some` with the closure's result, or `None` if the closure
/// reported an error. The error never propagates past this boundary.
pub fn call_with_error_handling<T>(
    source: ErrorSource,
    f: impl FnOnce() -> Result<T, Error>,
) -> Option<T> {
    match f() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::error!(source = source.as_str(), error = %err, "user code fault");
            None
        }
    }
}
