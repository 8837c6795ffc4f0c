//! WebSocket wire protocol.
//!
//! Every message on the socket is a tagged JSON frame. Client frames are
//! requests; server frames are either direct replies or unsolicited
//! events forwarded from the workspace event bus.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use atrium_core::{EventScope, SystemMetricsSnapshot, Task, TaskKind, WorkspaceEvent};

/// Client → Server frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Spawn a new terminal session
    CreateTerminal {
        /// Initial columns (default 80)
        #[serde(default)]
        cols: Option<u16>,
        /// Initial rows (default 24)
        #[serde(default)]
        rows: Option<u16>,
    },
    /// Send input bytes to a terminal
    TerminalInput {
        /// Target session
        session_id: Uuid,
        /// Input data
        data: String,
    },
    /// Change a terminal's window geometry
    ResizeTerminal {
        /// Target session
        session_id: Uuid,
        /// New columns
        cols: u16,
        /// New rows
        rows: u16,
    },
    /// Tear down a terminal session
    CloseTerminal {
        /// Target session
        session_id: Uuid,
    },
    /// Start watching a file for changes
    WatchFile {
        /// Path, absolute or relative to the workspace root
        path: String,
    },
    /// Stop a watch
    UnwatchFile {
        /// Watch to release
        watch_id: Uuid,
    },
    /// Submit a long-running task
    SubmitTask {
        /// Work category
        kind: TaskKind,
        /// Opaque request payload handed to the executor
        #[serde(default)]
        request: Value,
    },
}

/// Server → Client frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A terminal was spawned for this connection
    TerminalCreated {
        /// New session id
        session_id: Uuid,
    },
    /// Output from one of this connection's terminals
    TerminalOutput {
        /// Producing session
        session_id: Uuid,
        /// Output chunk
        data: String,
    },
    /// One of this connection's terminals ended
    TerminalClosed {
        /// Closed session
        session_id: Uuid,
    },
    /// A watch was established
    WatchStarted {
        /// New watch id
        watch_id: Uuid,
        /// Resolved watched path
        path: String,
    },
    /// A watched file changed
    FileChanged {
        /// Watched path
        path: String,
        /// Full content after the change
        content: String,
    },
    /// A task was accepted for execution
    TaskAccepted {
        /// Tracked task id
        task_id: Uuid,
    },
    /// A task changed status (visible to every connection)
    TaskUpdated {
        /// Full task record
        task: Task,
    },
    /// Periodic host metrics
    SystemMetrics {
        /// Latest snapshot
        snapshot: SystemMetricsSnapshot,
    },
    /// A request could not be served
    Error {
        /// Human-readable reason
        message: String,
    },
}

/// Convert a bus event into the frame a given connection should receive.
///
/// Returns `None` when the event is not addressed to `connection_id`:
/// owner-scoped events (terminal output, file changes) reach only their
/// owner, global events (tasks, metrics) reach everyone.
pub fn convert_event(connection_id: Uuid, event: &WorkspaceEvent) -> Option<ServerFrame> {
    match event.scope() {
        EventScope::Global => {}
        EventScope::Connection(owner) if owner == connection_id => {}
        EventScope::Connection(_) => return None,
    }

    match event {
        WorkspaceEvent::TerminalOutput {
            session_id, data, ..
        } => Some(ServerFrame::TerminalOutput {
            session_id: *session_id,
            data: data.clone(),
        }),
        WorkspaceEvent::TerminalClosed { session_id, .. } => Some(ServerFrame::TerminalClosed {
            session_id: *session_id,
        }),
        WorkspaceEvent::FileChanged { path, content, .. } => Some(ServerFrame::FileChanged {
            path: path.clone(),
            content: content.clone(),
        }),
        // Release is observable through resource enumeration; no frame.
        WorkspaceEvent::WatchStopped { .. } => None,
        WorkspaceEvent::TaskUpdated { task } => Some(ServerFrame::TaskUpdated { task: task.clone() }),
        WorkspaceEvent::Metrics { snapshot } => Some(ServerFrame::SystemMetrics {
            snapshot: snapshot.clone(),
        }),
    }
}
