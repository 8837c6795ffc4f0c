//! ConnectionHub and the per-connection WebSocket handler.
//!
//! The hub tracks live connections, dispatches inbound frames to the
//! owning manager and drives cascade teardown on detach. The handler is a
//! select loop over the socket, the event bus subscription and a
//! heartbeat timer; every exit path funnels into `detach`, which releases
//! everything the connection owns exactly once.

use axum::extract::ws::{Message, WebSocket};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use atrium_core::{
    EventBus, MetricsCache, ResourceRegistry, TaskTracker, TerminalManager, WatchManager,
};

use super::protocol::{convert_event, ClientFrame, ServerFrame};

/// Max time without receiving a message before considering the connection
/// dead.
pub const HEARTBEAT_TIMEOUT_SECS: u64 = 60;
/// How often to send server-side pings.
pub const PING_INTERVAL_SECS: u64 = 30;

/// One live client attachment.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Connection id
    pub id: Uuid,
    /// Attach timestamp
    pub connected_at: DateTime<Utc>,
}

/// Tracks live connections and routes their requests to the managers.
pub struct ConnectionHub {
    connections: ResourceRegistry<ConnectionInfo>,
    bus: EventBus,
    terminals: Arc<TerminalManager>,
    watches: Arc<WatchManager>,
    tasks: TaskTracker,
    metrics: Arc<MetricsCache>,
    workspace_root: PathBuf,
}

impl ConnectionHub {
    /// Create a hub over the given managers.
    pub fn new(
        bus: EventBus,
        terminals: Arc<TerminalManager>,
        watches: Arc<WatchManager>,
        tasks: TaskTracker,
        metrics: Arc<MetricsCache>,
        workspace_root: PathBuf,
    ) -> Self {
        Self {
            connections: ResourceRegistry::new(),
            bus,
            terminals,
            watches,
            tasks,
            metrics,
            workspace_root,
        }
    }

    /// Register a new connection.
    pub async fn attach(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.connections
            .insert(
                id,
                ConnectionInfo {
                    id,
                    connected_at: Utc::now(),
                },
            )
            .await;
        id
    }

    /// Release a connection and everything it owns.
    ///
    /// Safe to call concurrently with in-flight requests from the same
    /// connection and idempotent: the registry removal decides which
    /// caller performs the cascade.
    pub async fn detach(&self, connection_id: Uuid) {
        if self.connections.remove(connection_id).await.is_none() {
            return;
        }
        self.terminals.destroy_all_owned_by(connection_id).await;
        self.watches.unsubscribe_all_owned_by(connection_id).await;
        debug!(connection_id = %connection_id, "Connection resources released");
    }

    /// Detach every live connection (server shutdown).
    pub async fn shutdown(&self) {
        for id in self.connections.ids().await {
            self.detach(id).await;
        }
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.len().await
    }

    /// Event bus shared with the managers.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Latest metrics snapshot for late-subscriber catch-up.
    pub async fn latest_metrics_frame(&self) -> Option<ServerFrame> {
        self.metrics
            .latest()
            .await
            .map(|snapshot| ServerFrame::SystemMetrics { snapshot })
    }

    /// Route one inbound frame. Returns the direct reply, if any;
    /// asynchronous results arrive through the event bus.
    pub async fn dispatch(&self, connection_id: Uuid, frame: ClientFrame) -> Option<ServerFrame> {
        match frame {
            ClientFrame::CreateTerminal { cols, rows } => {
                match self
                    .terminals
                    .create(connection_id, cols.unwrap_or(80), rows.unwrap_or(24))
                    .await
                {
                    Ok(session_id) => Some(ServerFrame::TerminalCreated { session_id }),
                    Err(e) => {
                        warn!(connection_id = %connection_id, error = %e, "Terminal create failed");
                        Some(ServerFrame::Error {
                            message: e.to_string(),
                        })
                    }
                }
            }
            ClientFrame::TerminalInput { session_id, data } => {
                self.terminals.write(session_id, data).await;
                None
            }
            ClientFrame::ResizeTerminal {
                session_id,
                cols,
                rows,
            } => {
                self.terminals.resize(session_id, cols, rows).await;
                None
            }
            ClientFrame::CloseTerminal { session_id } => {
                self.terminals.destroy(session_id).await;
                None
            }
            ClientFrame::WatchFile { path } => {
                let path = self.resolve_path(&path);
                match self.watches.subscribe(connection_id, &path).await {
                    Ok(watch_id) => Some(ServerFrame::WatchStarted {
                        watch_id,
                        path: path.display().to_string(),
                    }),
                    Err(e) => Some(ServerFrame::Error {
                        message: e.to_string(),
                    }),
                }
            }
            ClientFrame::UnwatchFile { watch_id } => {
                self.watches.unsubscribe(watch_id).await;
                None
            }
            ClientFrame::SubmitTask { kind, request } => {
                let task_id = self.tasks.submit(kind, request).await;
                Some(ServerFrame::TaskAccepted { task_id })
            }
        }
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }
}

/// Drive one WebSocket connection until it closes.
pub async fn handle_socket(socket: WebSocket, hub: Arc<ConnectionHub>) {
    let conn_id = hub.attach().await;
    info!(connection_id = %conn_id, "WebSocket connection opened");

    // Subscribe before the catch-up push so no event can fall between.
    let mut event_rx = hub.bus().subscribe();
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Late-subscriber catch-up: current metrics snapshot, if any.
    if let Some(frame) = hub.latest_metrics_frame().await {
        if send_frame(&mut ws_tx, &frame).await.is_err() {
            hub.detach(conn_id).await;
            return;
        }
    }

    let ping_interval = tokio::time::interval(tokio::time::Duration::from_secs(PING_INTERVAL_SECS));
    tokio::pin!(ping_interval);
    let mut last_recv = tokio::time::Instant::now();
    let heartbeat_timeout = tokio::time::Duration::from_secs(HEARTBEAT_TIMEOUT_SECS);

    loop {
        tokio::select! {
            // Client message
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_recv = tokio::time::Instant::now();
                        let reply = match serde_json::from_str::<ClientFrame>(&text) {
                            Ok(frame) => hub.dispatch(conn_id, frame).await,
                            Err(e) => Some(ServerFrame::Error {
                                message: format!("invalid frame: {}", e),
                            }),
                        };
                        if let Some(frame) = reply {
                            if send_frame(&mut ws_tx, &frame).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        last_recv = tokio::time::Instant::now();
                        let _ = ws_tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_recv = tokio::time::Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(connection_id = %conn_id, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
            // Bus events → forward what this connection may see
            event = event_rx.recv() => {
                match event {
                    Ok(workspace_event) => {
                        if let Some(frame) = convert_event(conn_id, &workspace_event) {
                            if send_frame(&mut ws_tx, &frame).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!(connection_id = %conn_id, lagged = n, "Event subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            // Server ping / heartbeat check
            _ = ping_interval.tick() => {
                if last_recv.elapsed() > heartbeat_timeout {
                    info!(connection_id = %conn_id, "Heartbeat timeout, closing");
                    break;
                }
                if ws_tx.send(Message::Ping(vec![])).await.is_err() {
                    break;
                }
            }
        }
    }

    hub.detach(conn_id).await;
    info!(connection_id = %conn_id, "WebSocket connection closed");
}

async fn send_frame(
    ws_tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(frame).unwrap_or_default();
    ws_tx.send(Message::Text(json)).await
}
