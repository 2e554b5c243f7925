use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::Response;

use crate::engine::Engine;

use super::connection::handle_socket;

/// Upgrades an HTTP request to a WebSocket and hands the socket off to the
/// per-connection task. No auth or sub-protocol negotiation happens here;
/// a connection only becomes a subject once it sends `register_subject`.
pub async fn websocket_handler(ws: WebSocketUpgrade, State(engine): State<Arc<Engine>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, engine))
}
