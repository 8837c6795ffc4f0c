//! Workspace file API.
//!
//! GET /api/files?path=  - list a directory or return a file's content
//! PUT /api/files        - write a file
//!
//! All paths resolve under the configured workspace root; anything that
//! escapes it is rejected. Writes land on disk only; connected watchers
//! pick the change up through the normal notification pipeline.

use axum::{
    extract::Query,
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::server::ServerConfig;

/// File routes.
pub fn routes() -> Router {
    Router::new().route("/api/files", get(read_path).put(write_file))
}

#[derive(Debug, Deserialize)]
struct PathQuery {
    #[serde(default)]
    path: Option<String>,
}

type ApiError = (StatusCode, Json<Value>);

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

async fn read_path(
    Extension(config): Extension<Arc<ServerConfig>>,
    Query(query): Query<PathQuery>,
) -> Result<Json<Value>, ApiError> {
    let target = resolve(&config.workspace, query.path.as_deref().unwrap_or("."))
        .ok_or_else(|| error(StatusCode::BAD_REQUEST, "path escapes the workspace"))?;

    let metadata = tokio::fs::metadata(&target)
        .await
        .map_err(|_| error(StatusCode::NOT_FOUND, "file or directory not found"))?;

    if metadata.is_dir() {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&target)
            .await
            .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            let meta = entry.metadata().await.ok();
            let is_dir = meta.as_ref().map(|m| m.is_dir()).unwrap_or(false);
            let size = meta.as_ref().map(|m| m.len()).unwrap_or(0);
            let modified = meta
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from);
            entries.push(json!({
                "name": name,
                "kind": if is_dir { "directory" } else { "file" },
                "size": size,
                "modified": modified,
            }));
        }
        entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
        Ok(Json(json!({ "entries": entries })))
    } else {
        let content = tokio::fs::read(&target)
            .await
            .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
        Ok(Json(json!({
            "path": target.display().to_string(),
            "content": String::from_utf8_lossy(&content),
        })))
    }
}

#[derive(Debug, Deserialize)]
struct WriteRequest {
    path: String,
    content: String,
}

async fn write_file(
    Extension(config): Extension<Arc<ServerConfig>>,
    Json(request): Json<WriteRequest>,
) -> Result<Json<Value>, ApiError> {
    let target = resolve(&config.workspace, &request.path)
        .ok_or_else(|| error(StatusCode::BAD_REQUEST, "path escapes the workspace"))?;

    tokio::fs::write(&target, request.content.as_bytes())
        .await
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(json!({
        "success": true,
        "path": target.display().to_string(),
    })))
}

/// Resolve `path` under `workspace`, rejecting traversal outside it.
///
/// Lexical check: `..` components are refused outright instead of being
/// normalized, so the target does not need to exist yet (writes create
/// files).
fn resolve(workspace: &Path, path: &str) -> Option<PathBuf> {
    let candidate = Path::new(path);
    let relative = if candidate.is_absolute() {
        candidate.strip_prefix(workspace).ok()?
    } else {
        candidate
    };
    if relative
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return None;
    }
    Some(workspace.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_within_workspace() {
        let workspace = Path::new("/srv/workspace");
        assert_eq!(
            resolve(workspace, "src/main.rs"),
            Some(PathBuf::from("/srv/workspace/src/main.rs"))
        );
        assert_eq!(
            resolve(workspace, "."),
            Some(PathBuf::from("/srv/workspace/."))
        );
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let workspace = Path::new("/srv/workspace");
        assert_eq!(resolve(workspace, "../etc/passwd"), None);
        assert_eq!(resolve(workspace, "src/../../etc/passwd"), None);
        assert_eq!(resolve(workspace, "/etc/passwd"), None);
    }

    #[test]
    fn test_resolve_absolute_inside_workspace() {
        let workspace = Path::new("/srv/workspace");
        assert_eq!(
            resolve(workspace, "/srv/workspace/readme.md"),
            Some(PathBuf::from("/srv/workspace/readme.md"))
        );
    }
}
