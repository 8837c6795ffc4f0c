//! System health endpoint.

use axum::{routing::get, Extension, Json, Router};
use std::sync::Arc;

use atrium_core::{MetricsCache, SystemMetricsSnapshot};

/// System routes.
pub fn routes() -> Router {
    Router::new().route("/api/system/health", get(system_health))
}

/// Latest host metrics snapshot; zeros until the first sample lands.
async fn system_health(
    Extension(metrics): Extension<Arc<MetricsCache>>,
) -> Json<SystemMetricsSnapshot> {
    Json(metrics.latest().await.unwrap_or_default())
}
