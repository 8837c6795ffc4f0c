//! EventBus — broadcast-based event system for real-time workspace events.
//!
//! Publishes domain events (terminal output, file changes, task updates,
//! metrics snapshots) so that WebSocket connections and internal
//! subscribers can receive real-time updates. Delivery scoping is explicit:
//! every event names whether it belongs to one connection or to everyone.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::metrics::SystemMetricsSnapshot;
use crate::task::Task;

/// Who an event is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventScope {
    /// Delivered only to the owning connection (terminal and watch events).
    Connection(Uuid),
    /// Delivered to every live connection (task updates, metrics).
    Global,
}

/// Events emitted by the orchestration core.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkspaceEvent {
    /// Bytes arrived from a terminal session's PTY
    TerminalOutput {
        /// Owning connection
        connection_id: Uuid,
        /// Session that produced the output
        session_id: Uuid,
        /// Output chunk (lossy UTF-8)
        data: String,
    },
    /// A terminal session ended; emitted exactly once per session,
    /// whether it exited on its own or was destroyed
    TerminalClosed {
        /// Owning connection
        connection_id: Uuid,
        /// Session that closed
        session_id: Uuid,
    },
    /// A watched file changed on disk
    FileChanged {
        /// Owning connection
        connection_id: Uuid,
        /// Watch subscription that fired
        watch_id: Uuid,
        /// Watched path
        path: String,
        /// Full file content after the change
        content: String,
    },
    /// A watch subscription was released
    WatchStopped {
        /// Owning connection
        connection_id: Uuid,
        /// Watch subscription that was released
        watch_id: Uuid,
        /// Watched path
        path: String,
    },
    /// A task changed status; visible to all connections
    TaskUpdated {
        /// Full task record after the transition
        task: Task,
    },
    /// Periodic host metrics snapshot
    Metrics {
        /// Latest sampled snapshot
        snapshot: SystemMetricsSnapshot,
    },
}

impl WorkspaceEvent {
    /// Routing decision for this event.
    #[must_use]
    pub fn scope(&self) -> EventScope {
        match self {
            Self::TerminalOutput { connection_id, .. }
            | Self::TerminalClosed { connection_id, .. }
            | Self::FileChanged { connection_id, .. }
            | Self::WatchStopped { connection_id, .. } => EventScope::Connection(*connection_id),
            Self::TaskUpdated { .. } | Self::Metrics { .. } => EventScope::Global,
        }
    }
}

/// Broadcast-based event bus for real-time workspace events.
///
/// Uses `tokio::broadcast` so multiple subscribers can receive the same
/// events. Slow subscribers miss events (lagged) rather than blocking the
/// publisher, and a subscriber that drops mid-broadcast is simply skipped.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<WorkspaceEvent>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity.
    ///
    /// Capacity determines how many events can be buffered before slow
    /// subscribers start missing events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events. Returns a receiver that will get all future
    /// events; each subscriber gets an independent copy.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WorkspaceEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all active subscribers.
    ///
    /// Returns the number of subscribers that received the event. With no
    /// subscribers the event is silently dropped.
    pub fn publish(&self, event: WorkspaceEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Current number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let conn = Uuid::new_v4();
        let session = Uuid::new_v4();
        bus.publish(WorkspaceEvent::TerminalOutput {
            connection_id: conn,
            session_id: session,
            data: "hello".to_string(),
        });

        let event = rx.recv().await.unwrap();
        match event {
            WorkspaceEvent::TerminalOutput {
                session_id, data, ..
            } => {
                assert_eq!(session_id, session);
                assert_eq!(data, "hello");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        let conn = Uuid::new_v4();
        let count = bus.publish(WorkspaceEvent::TerminalClosed {
            connection_id: conn,
            session_id: Uuid::new_v4(),
        });
        assert_eq!(count, 2);

        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[test]
    fn test_publish_no_subscribers() {
        let bus = EventBus::new(16);
        let count = bus.publish(WorkspaceEvent::TerminalClosed {
            connection_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
        });
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_scope_routing() {
        let conn = Uuid::new_v4();
        let owned = WorkspaceEvent::TerminalOutput {
            connection_id: conn,
            session_id: Uuid::new_v4(),
            data: String::new(),
        };
        assert_eq!(owned.scope(), EventScope::Connection(conn));

        let global = WorkspaceEvent::TaskUpdated {
            task: Task::new(crate::task::TaskKind::AiCommand),
        };
        assert_eq!(global.scope(), EventScope::Global);
    }

    #[tokio::test]
    async fn test_event_ordering() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let conn = Uuid::new_v4();
        let session = Uuid::new_v4();
        for chunk in ["a", "b", "c"] {
            bus.publish(WorkspaceEvent::TerminalOutput {
                connection_id: conn,
                session_id: session,
                data: chunk.to_string(),
            });
        }

        for expected in ["a", "b", "c"] {
            match rx.recv().await.unwrap() {
                WorkspaceEvent::TerminalOutput { data, .. } => assert_eq!(data, expected),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[test]
    fn test_event_serialization() {
        let event = WorkspaceEvent::FileChanged {
            connection_id: Uuid::nil(),
            watch_id: Uuid::nil(),
            path: "/tmp/f".to_string(),
            content: "body".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"file_changed\""));
        assert!(json.contains("\"path\":\"/tmp/f\""));
    }
}
