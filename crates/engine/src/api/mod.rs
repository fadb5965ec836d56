//! API layer - HTTP and WebSocket entry points.

pub mod connections;
pub mod http;
pub mod websocket;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

pub use connections::{ConnectionManager, Outbound};
pub use websocket::WsState;

use crate::app::App;

/// Build the full router with separate states for HTTP and WebSocket.
pub fn build_router(app: Arc<App>, ws_state: Arc<WsState>) -> Router {
    http::routes()
        .with_state(app)
        .route("/ws", get(websocket::ws_handler).with_state(ws_state))
        .layer(TraceLayer::new_for_http())
}
