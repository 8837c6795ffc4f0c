//! WebSocket surface: the `/ws` endpoint and its connection handling.

pub mod connection;
pub mod protocol;

pub use connection::ConnectionHub;

use axum::{extract::ws::WebSocketUpgrade, response::IntoResponse, routing::get, Extension, Router};
use std::sync::Arc;

/// Maximum size of a single WS text message (1 MB).
const MAX_MESSAGE_BYTES: usize = 1_048_576;

/// Routes for the WebSocket surface.
pub fn websocket_router() -> Router {
    Router::new().route("/ws", get(ws_handler))
}

/// WebSocket upgrade handler for `/ws`.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(hub): Extension<Arc<ConnectionHub>>,
) -> impl IntoResponse {
    ws.max_message_size(MAX_MESSAGE_BYTES)
        .on_upgrade(move |socket| connection::handle_socket(socket, hub))
}
