//! File-change subscriptions.
//!
//! Each watch pairs a `notify` watcher with an owning connection. Change
//! notifications arrive on the watcher's own thread, cross into the async
//! world over a channel and are republished on the event bus with the
//! file's fresh content. Release follows the same at-most-once registry
//! discipline as terminals, and the pump discards notifications whose
//! watch id is no longer registered, so nothing is delivered after close.

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::event_bus::{EventBus, WorkspaceEvent};
use crate::registry::ResourceRegistry;

/// Registered handle for one watch subscription.
struct WatchHandle {
    id: Uuid,
    owner: Uuid,
    path: PathBuf,
    cancel: CancellationToken,
    // Taken out on release so the OS watch stops immediately, regardless
    // of outstanding handle clones.
    watcher: Mutex<Option<RecommendedWatcher>>,
}

/// Summary view of a live watch.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WatchInfo {
    /// Watch id
    pub id: Uuid,
    /// Owning connection
    pub connection_id: Uuid,
    /// Watched path
    pub path: PathBuf,
}

/// Owns file-watch subscriptions keyed by id and owning connection.
pub struct WatchManager {
    registry: Arc<ResourceRegistry<Arc<WatchHandle>>>,
    bus: EventBus,
}

impl WatchManager {
    /// Create a manager publishing on `bus`.
    pub fn new(bus: EventBus) -> Self {
        Self {
            registry: Arc::new(ResourceRegistry::new()),
            bus,
        }
    }

    /// Start watching `path` on behalf of `connection_id`.
    ///
    /// Each subscription is independent: two connections watching the
    /// same path each get their own watcher and their own deliveries.
    pub async fn subscribe(&self, connection_id: Uuid, path: impl AsRef<Path>) -> Result<Uuid> {
        let path = path.as_ref().to_path_buf();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = tx.send(res);
        })
        .map_err(|e| Error::WatchSetup {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|e| Error::WatchSetup {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let watch_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let handle = Arc::new(WatchHandle {
            id: watch_id,
            owner: connection_id,
            path: path.clone(),
            cancel: cancel.clone(),
            watcher: Mutex::new(Some(watcher)),
        });
        self.registry.insert(watch_id, handle).await;

        tokio::spawn(pump(
            watch_id,
            connection_id,
            path,
            rx,
            cancel,
            Arc::clone(&self.registry),
            self.bus.clone(),
        ));
        debug!(watch_id = %watch_id, connection_id = %connection_id, "Watch started");

        Ok(watch_id)
    }

    /// Stop a watch. Idempotent: a second call (or a call racing the
    /// owner's disconnect) is a no-op.
    pub async fn unsubscribe(&self, watch_id: Uuid) {
        if let Some(handle) = self.registry.remove(watch_id).await {
            self.release(&handle);
        }
    }

    /// Stop every watch owned by `connection_id`.
    pub async fn unsubscribe_all_owned_by(&self, connection_id: Uuid) {
        let drained = self
            .registry
            .remove_where(|h| h.owner == connection_id)
            .await;
        for (_, handle) in drained {
            self.release(&handle);
        }
    }

    /// Snapshot of live watches.
    pub async fn list(&self) -> Vec<WatchInfo> {
        self.registry
            .values()
            .await
            .iter()
            .map(|h| WatchInfo {
                id: h.id,
                connection_id: h.owner,
                path: h.path.clone(),
            })
            .collect()
    }

    /// Number of live watches.
    pub async fn watch_count(&self) -> usize {
        self.registry.len().await
    }

    fn release(&self, handle: &WatchHandle) {
        handle.cancel.cancel();
        // Dropping the watcher tears down the OS-level watch.
        handle
            .watcher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        self.bus.publish(WorkspaceEvent::WatchStopped {
            connection_id: handle.owner,
            watch_id: handle.id,
            path: handle.path.display().to_string(),
        });
    }
}

/// Forwards change notifications for one watch until it is released.
async fn pump(
    watch_id: Uuid,
    connection_id: Uuid,
    path: PathBuf,
    mut rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    cancel: CancellationToken,
    registry: Arc<ResourceRegistry<Arc<WatchHandle>>>,
    bus: EventBus,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            notification = rx.recv() => match notification {
                None => break,
                Some(Err(e)) => {
                    warn!(watch_id = %watch_id, error = %e, "Watcher error");
                }
                Some(Ok(event)) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        continue;
                    }
                    // A release may have raced this notification; once the
                    // id is gone nothing more may be delivered.
                    if !registry.contains(watch_id).await {
                        break;
                    }
                    match tokio::fs::read(&path).await {
                        Ok(bytes) => {
                            bus.publish(WorkspaceEvent::FileChanged {
                                connection_id,
                                watch_id,
                                path: path.display().to_string(),
                                content: String::from_utf8_lossy(&bytes).to_string(),
                            });
                        }
                        // Transient read-during-write races are expected;
                        // the watch stays alive.
                        Err(e) => {
                            warn!(
                                watch_id = %watch_id,
                                path = %path.display(),
                                error = %e,
                                "Read failed during change notification"
                            );
                        }
                    }
                }
            }
        }
    }
}
