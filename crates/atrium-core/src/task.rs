//! Task tracking for long-running asynchronous work.
//!
//! AI command execution and deployments are opaque jobs behind the
//! [`TaskExecutor`] seam: the tracker records status transitions and
//! broadcasts them, it never looks inside the work. Status only moves
//! forward (Pending → Running → Succeeded | Failed) and tasks are retained
//! for the lifetime of the process so polling clients can enumerate them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::event_bus::{EventBus, WorkspaceEvent};
use crate::registry::ResourceRegistry;

/// What kind of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// An AI model invocation
    AiCommand,
    /// A deployment to a hosting target
    Deployment,
}

/// Lifecycle status of a task. Forward-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted, not yet handed to an executor
    Pending,
    /// An executor is working on it
    Running,
    /// Finished with a result payload
    Succeeded,
    /// Finished with a failure reason
    Failed,
}

impl TaskStatus {
    /// Whether this status is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// A tracked unit of asynchronous work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier
    pub id: Uuid,
    /// Work category
    pub kind: TaskKind,
    /// Current status
    pub status: TaskStatus,
    /// Submission timestamp
    pub created_at: DateTime<Utc>,
    /// Result payload, present only once Succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure reason, present only once Failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    /// Create a new Pending task.
    #[must_use]
    pub fn new(kind: TaskKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            result: None,
            error: None,
        }
    }
}

/// Performs the actual work behind a task.
///
/// The tracker only knows this contract: given the submitted request,
/// eventually return a result or a failure reason, exactly once. Variants
/// range from the timer-backed [`SimulatedExecutor`] to adapters that
/// delegate to a real AI provider or deployment service.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Execute the request, returning the result payload or a failure
    /// reason.
    async fn execute(&self, task_id: Uuid, kind: TaskKind, request: Value)
        -> std::result::Result<Value, String>;
}

/// Timer-backed executor producing canned results.
///
/// Stands in for the real AI/deployment collaborators: sleeps for a fixed
/// delay and fabricates a plausible payload for the task kind.
pub struct SimulatedExecutor {
    delay: Duration,
}

impl SimulatedExecutor {
    /// Create a simulated executor that completes after `delay`.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl TaskExecutor for SimulatedExecutor {
    async fn execute(
        &self,
        task_id: Uuid,
        kind: TaskKind,
        request: Value,
    ) -> std::result::Result<Value, String> {
        tokio::time::sleep(self.delay).await;
        match kind {
            TaskKind::AiCommand => {
                let prompt = request
                    .get("prompt")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                Ok(json!({
                    "response": format!("Generated response for: \"{}\"", prompt),
                    "tokens_used": 256,
                }))
            }
            TaskKind::Deployment => Ok(json!({
                "url": format!("https://{}.atrium.app", task_id),
                "completed_at": Utc::now(),
            })),
        }
    }
}

/// Tracks tasks through their lifecycle and broadcasts transitions.
#[derive(Clone)]
pub struct TaskTracker {
    registry: Arc<ResourceRegistry<Task>>,
    bus: EventBus,
    executor: Arc<dyn TaskExecutor>,
}

impl TaskTracker {
    /// Create a tracker that hands submitted work to `executor`.
    pub fn new(bus: EventBus, executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            registry: Arc::new(ResourceRegistry::new()),
            bus,
            executor,
        }
    }

    /// Submit new work.
    ///
    /// The task is registered as Pending, transitioned to Running and
    /// handed to the executor on a background task; the id returns
    /// immediately, the caller never blocks on completion.
    pub async fn submit(&self, kind: TaskKind, request: Value) -> Uuid {
        let task = Task::new(kind);
        let id = task.id;
        self.registry.insert(id, task).await;

        let running = self
            .registry
            .update(id, |t| t.status = TaskStatus::Running)
            .await;
        if let Some(task) = running {
            self.bus.publish(WorkspaceEvent::TaskUpdated { task });
        }
        info!(task_id = %id, kind = ?kind, "Task submitted");

        let tracker = self.clone();
        let executor = Arc::clone(&self.executor);
        tokio::spawn(async move {
            match executor.execute(id, kind, request).await {
                Ok(result) => {
                    if let Err(e) = tracker.complete(id, result).await {
                        warn!(task_id = %id, error = %e, "Executor completion rejected");
                    }
                }
                Err(reason) => {
                    if let Err(e) = tracker.fail(id, reason).await {
                        warn!(task_id = %id, error = %e, "Executor failure rejected");
                    }
                }
            }
        });

        id
    }

    /// Record a successful completion. Rejects double completion.
    pub async fn complete(&self, id: Uuid, result: Value) -> Result<Task> {
        self.finish(id, TaskStatus::Succeeded, Some(result), None)
            .await
    }

    /// Record a failure. Rejects double completion.
    pub async fn fail(&self, id: Uuid, reason: impl Into<String>) -> Result<Task> {
        self.finish(id, TaskStatus::Failed, None, Some(reason.into()))
            .await
    }

    async fn finish(
        &self,
        id: Uuid,
        status: TaskStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<Task> {
        let mut already_terminal = false;
        let updated = self
            .registry
            .update(id, |t| {
                if t.status.is_terminal() {
                    already_terminal = true;
                } else {
                    t.status = status;
                    t.result = result;
                    t.error = error;
                }
            })
            .await;

        match updated {
            None => Err(Error::TaskNotFound(id)),
            Some(_) if already_terminal => {
                warn!(task_id = %id, "Duplicate completion rejected, first result stands");
                Err(Error::TaskAlreadyFinished(id))
            }
            Some(task) => {
                info!(task_id = %id, status = ?task.status, "Task finished");
                self.bus
                    .publish(WorkspaceEvent::TaskUpdated { task: task.clone() });
                Ok(task)
            }
        }
    }

    /// Look up a task by id.
    pub async fn get(&self, id: Uuid) -> Option<Task> {
        self.registry.get(id).await
    }

    /// Snapshot of all tasks, oldest first.
    pub async fn list(&self) -> Vec<Task> {
        let mut tasks = self.registry.values().await;
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }
}
