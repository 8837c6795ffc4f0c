//! Error types for atrium-core.

use thiserror::Error;
use uuid::Uuid;

/// Core error type.
///
/// Lookups that race a concurrent teardown (write/resize/destroy on an id
/// that is already gone) are deliberately not errors; they resolve as
/// silent no-ops at the call site. Only failures the caller can act on
/// surface here.
#[derive(Debug, Error)]
pub enum Error {
    /// The terminal process could not be started. Nothing was registered.
    #[error("failed to spawn terminal: {0}")]
    TerminalSpawn(String),

    /// Too many live terminal sessions.
    #[error("terminal limit reached ({0} active)")]
    TerminalLimit(usize),

    /// The filesystem watcher could not be created.
    #[error("failed to watch {path}: {reason}")]
    WatchSetup {
        /// Path that was being watched
        path: String,
        /// Underlying watcher error
        reason: String,
    },

    /// Completion referenced a task id that was never submitted.
    #[error("task {0} not found")]
    TaskNotFound(Uuid),

    /// An executor tried to complete or fail a task twice. The first
    /// result stands.
    #[error("task {0} already reached a terminal state")]
    TaskAlreadyFinished(Uuid),

    /// Filesystem error from the file API.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
