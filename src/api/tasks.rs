//! Task API endpoints.
//!
//! GET  /api/tasks         - list all tracked tasks
//! GET  /api/tasks/:id     - fetch one task
//! POST /api/ai/command    - submit an AI command task
//! POST /api/deploy        - submit a deployment task
//! GET  /api/deployments   - list deployment tasks

use axum::{
    extract::Path,
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use atrium_core::{Task, TaskKind, TaskTracker};

/// Task routes.
pub fn routes() -> Router {
    Router::new()
        .route("/api/tasks", get(list_tasks))
        .route("/api/tasks/:id", get(get_task))
        .route("/api/ai/command", post(submit_ai_command))
        .route("/api/deploy", post(submit_deployment))
        .route("/api/deployments", get(list_deployments))
}

async fn list_tasks(Extension(tracker): Extension<TaskTracker>) -> Json<Value> {
    let tasks = tracker.list().await;
    Json(json!({
        "tasks": tasks,
        "count": tasks.len(),
    }))
}

async fn get_task(
    Extension(tracker): Extension<TaskTracker>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, StatusCode> {
    tracker.get(id).await.map(Json).ok_or(StatusCode::NOT_FOUND)
}

#[derive(Debug, Serialize, Deserialize)]
struct AiCommandRequest {
    prompt: String,
    #[serde(default)]
    model_id: Option<String>,
    #[serde(default)]
    context: Option<String>,
}

async fn submit_ai_command(
    Extension(tracker): Extension<TaskTracker>,
    Json(request): Json<AiCommandRequest>,
) -> Json<Value> {
    let payload = serde_json::to_value(&request).unwrap_or_default();
    let task_id = tracker.submit(TaskKind::AiCommand, payload).await;
    Json(json!({
        "task_id": task_id,
        "status": "running",
    }))
}

#[derive(Debug, Serialize, Deserialize)]
struct DeployRequest {
    #[serde(default = "default_platform")]
    platform: String,
    #[serde(default = "default_environment")]
    environment: String,
}

fn default_platform() -> String {
    "vercel".to_string()
}

fn default_environment() -> String {
    "production".to_string()
}

async fn submit_deployment(
    Extension(tracker): Extension<TaskTracker>,
    Json(request): Json<DeployRequest>,
) -> Json<Value> {
    let payload = serde_json::to_value(&request).unwrap_or_default();
    let task_id = tracker.submit(TaskKind::Deployment, payload).await;
    Json(json!({
        "task_id": task_id,
        "status": "running",
        "platform": request.platform,
        "environment": request.environment,
    }))
}

async fn list_deployments(Extension(tracker): Extension<TaskTracker>) -> Json<Value> {
    let deployments: Vec<Task> = tracker
        .list()
        .await
        .into_iter()
        .filter(|t| t.kind == TaskKind::Deployment)
        .collect();
    Json(json!({
        "deployments": deployments,
        "count": deployments.len(),
    }))
}
