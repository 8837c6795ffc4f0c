//! Atrium core — real-time session & task orchestration.
//!
//! The pieces behind the workspace server: a concurrent resource registry,
//! a broadcast event bus, PTY-backed terminal sessions, filesystem watches
//! and long-running task tracking. The server binary wires these to its
//! WebSocket and REST surfaces; everything here is transport-agnostic.

pub mod error;
pub mod event_bus;
pub mod metrics;
pub mod registry;
pub mod task;
pub mod terminal;
pub mod watch;

pub use error::{Error, Result};
pub use event_bus::{EventBus, EventScope, WorkspaceEvent};
pub use metrics::{HealthStatus, MetricsCache, SystemMetricsSnapshot};
pub use registry::ResourceRegistry;
pub use task::{SimulatedExecutor, Task, TaskExecutor, TaskKind, TaskStatus, TaskTracker};
pub use terminal::{SessionState, TerminalConfig, TerminalInfo, TerminalManager};
pub use watch::{WatchInfo, WatchManager};
