//! PTY-backed terminal session management.
//!
//! Each session is one interactive shell attached to a PTY. A pump task
//! owns the PTY and the child process: it forwards output chunks to the
//! event bus, applies write/resize requests in arrival order and watches
//! for process exit. Every teardown path (explicit destroy, process exit,
//! connection cascade) funnels through the registry's atomic `remove`,
//! and only the path that wins the removal emits `TerminalClosed`.

use chrono::{DateTime, Utc};
use pty_process::Size;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::event_bus::{EventBus, WorkspaceEvent};
use crate::registry::ResourceRegistry;

/// Lifecycle state of a terminal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Spawned, pump not yet running
    Starting,
    /// Pump attached, accepting input
    Running,
    /// Process terminated on its own
    Exited,
    /// Torn down by request or cascade
    Destroyed,
}

/// Terminal spawn configuration.
#[derive(Debug, Clone)]
pub struct TerminalConfig {
    /// Shell binary to spawn
    pub shell: String,
    /// Working directory for new sessions
    pub cwd: Option<PathBuf>,
    /// Maximum concurrently live sessions
    pub max_sessions: usize,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            shell: std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string()),
            cwd: None,
            max_sessions: 32,
        }
    }
}

/// Summary view of a live session.
#[derive(Debug, Clone, Serialize)]
pub struct TerminalInfo {
    /// Session id
    pub id: Uuid,
    /// Owning connection
    pub connection_id: Uuid,
    /// Current geometry (columns, rows)
    pub cols: u16,
    /// Current geometry rows
    pub rows: u16,
    /// Lifecycle state
    pub state: SessionState,
    /// Spawn timestamp
    pub created_at: DateTime<Utc>,
}

enum PtyRequest {
    Write(Vec<u8>),
    Resize { cols: u16, rows: u16 },
}

/// Registered handle for one live session.
struct TerminalHandle {
    id: Uuid,
    owner: Uuid,
    cmd_tx: mpsc::UnboundedSender<PtyRequest>,
    cancel: CancellationToken,
    size: Mutex<(u16, u16)>,
    state: Mutex<SessionState>,
    created_at: DateTime<Utc>,
}

impl TerminalHandle {
    fn info(&self) -> TerminalInfo {
        let (cols, rows) = *self.size.lock().unwrap_or_else(|e| e.into_inner());
        TerminalInfo {
            id: self.id,
            connection_id: self.owner,
            cols,
            rows,
            state: *self.state.lock().unwrap_or_else(|e| e.into_inner()),
            created_at: self.created_at,
        }
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }
}

/// Owns terminal session lifecycles: spawn, write, resize, destroy.
pub struct TerminalManager {
    registry: Arc<ResourceRegistry<Arc<TerminalHandle>>>,
    bus: EventBus,
    config: TerminalConfig,
}

impl TerminalManager {
    /// Create a manager publishing on `bus`.
    pub fn new(bus: EventBus, config: TerminalConfig) -> Self {
        Self {
            registry: Arc::new(ResourceRegistry::new()),
            bus,
            config,
        }
    }

    /// Spawn a shell session owned by `connection_id`.
    ///
    /// On success the session is registered and its pump is running; on
    /// failure nothing is registered.
    pub async fn create(&self, connection_id: Uuid, cols: u16, rows: u16) -> Result<Uuid> {
        if self.registry.len().await >= self.config.max_sessions {
            return Err(Error::TerminalLimit(self.config.max_sessions));
        }

        let (pty, pts) =
            pty_process::open().map_err(|e| Error::TerminalSpawn(e.to_string()))?;
        pty.resize(Size::new(rows, cols))
            .map_err(|e| Error::TerminalSpawn(e.to_string()))?;

        let mut cmd = pty_process::Command::new(&self.config.shell)
            .env("TERM", "xterm-256color");
        if let Some(dir) = &self.config.cwd {
            cmd = cmd.current_dir(dir);
        }
        let child = cmd
            .spawn(pts)
            .map_err(|e| Error::TerminalSpawn(e.to_string()))?;

        let session_id = Uuid::new_v4();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = Arc::new(TerminalHandle {
            id: session_id,
            owner: connection_id,
            cmd_tx,
            cancel: cancel.clone(),
            size: Mutex::new((cols, rows)),
            state: Mutex::new(SessionState::Starting),
            created_at: Utc::now(),
        });
        self.registry.insert(session_id, Arc::clone(&handle)).await;

        tokio::spawn(pump(
            session_id,
            connection_id,
            pty,
            child,
            cmd_rx,
            cancel,
            Arc::clone(&self.registry),
            self.bus.clone(),
        ));
        handle.set_state(SessionState::Running);
        debug!(session_id = %session_id, connection_id = %connection_id, "Terminal spawned");

        Ok(session_id)
    }

    /// Forward input bytes to a session.
    ///
    /// Silent no-op when the session is gone; clients legitimately race
    /// stale ids against asynchronous closes.
    pub async fn write(&self, session_id: Uuid, data: impl Into<Vec<u8>>) {
        if let Some(handle) = self.registry.get(session_id).await {
            let _ = handle.cmd_tx.send(PtyRequest::Write(data.into()));
        }
    }

    /// Update a session's window geometry. Silent no-op when absent.
    pub async fn resize(&self, session_id: Uuid, cols: u16, rows: u16) {
        if let Some(handle) = self.registry.get(session_id).await {
            *handle.size.lock().unwrap_or_else(|e| e.into_inner()) = (cols, rows);
            let _ = handle.cmd_tx.send(PtyRequest::Resize { cols, rows });
        }
    }

    /// Tear down a session.
    ///
    /// Whoever wins the registry removal kills the process and emits
    /// `TerminalClosed`; a loser (the session already exited or was
    /// destroyed) does nothing, so the event fires at most once.
    pub async fn destroy(&self, session_id: Uuid) {
        if let Some(handle) = self.registry.remove(session_id).await {
            self.release(&handle);
        }
    }

    /// Tear down every session owned by `connection_id`.
    pub async fn destroy_all_owned_by(&self, connection_id: Uuid) {
        let drained = self
            .registry
            .remove_where(|h| h.owner == connection_id)
            .await;
        for (_, handle) in drained {
            self.release(&handle);
        }
    }

    /// Snapshot of live sessions.
    pub async fn list(&self) -> Vec<TerminalInfo> {
        self.registry
            .values()
            .await
            .iter()
            .map(|h| h.info())
            .collect()
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.registry.len().await
    }

    fn release(&self, handle: &TerminalHandle) {
        handle.set_state(SessionState::Destroyed);
        handle.cancel.cancel();
        self.bus.publish(WorkspaceEvent::TerminalClosed {
            connection_id: handle.owner,
            session_id: handle.id,
        });
    }
}

/// Per-session pump: owns the PTY and the child until the session ends.
#[allow(clippy::too_many_arguments)]
async fn pump(
    session_id: Uuid,
    connection_id: Uuid,
    mut pty: pty_process::Pty,
    mut child: tokio::process::Child,
    mut cmd_rx: mpsc::UnboundedReceiver<PtyRequest>,
    cancel: CancellationToken,
    registry: Arc<ResourceRegistry<Arc<TerminalHandle>>>,
    bus: EventBus,
) {
    let mut buf = [0u8; 4096];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                break;
            }
            read = pty.read(&mut buf) => match read {
                // EOF/EIO: the child side of the PTY is gone
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    bus.publish(WorkspaceEvent::TerminalOutput {
                        connection_id,
                        session_id,
                        data: String::from_utf8_lossy(&buf[..n]).to_string(),
                    });
                }
            },
            req = cmd_rx.recv() => match req {
                Some(PtyRequest::Write(bytes)) => {
                    if let Err(e) = pty.write_all(&bytes).await {
                        warn!(session_id = %session_id, error = %e, "PTY write failed");
                        break;
                    }
                }
                Some(PtyRequest::Resize { cols, rows }) => {
                    if let Err(e) = pty.resize(Size::new(rows, cols)) {
                        warn!(session_id = %session_id, error = %e, "PTY resize failed");
                    }
                }
                None => {
                    let _ = child.kill().await;
                    break;
                }
            },
            status = child.wait() => {
                // Child exited on its own; drain whatever the PTY still holds
                loop {
                    match pty.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            bus.publish(WorkspaceEvent::TerminalOutput {
                                connection_id,
                                session_id,
                                data: String::from_utf8_lossy(&buf[..n]).to_string(),
                            });
                        }
                    }
                }
                debug!(session_id = %session_id, status = ?status, "Terminal process exited");
                break;
            }
        }
    }

    // Reap in case we broke out of the loop before wait() resolved.
    let _ = child.kill().await;

    // At-most-once close: only the remover emits. If an explicit destroy
    // or a cascade got here first the entry is already gone and the event
    // has already been sent.
    if let Some(handle) = registry.remove(session_id).await {
        handle.set_state(SessionState::Exited);
        bus.publish(WorkspaceEvent::TerminalClosed {
            connection_id,
            session_id,
        });
    }
}
