//! REST API surface.
//!
//! Polling counterpart to the WebSocket push channel: task enumeration,
//! the latest host metrics snapshot and workspace file access.

pub mod files;
pub mod system;
pub mod tasks;

use axum::Router;

/// All REST API routes.
pub fn api_router() -> Router {
    Router::new()
        .merge(system::routes())
        .merge(tasks::routes())
        .merge(files::routes())
}
