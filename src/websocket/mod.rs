// WebSocket module - the bidirectional client channel and the HTTP surface.
//
// - handler: WebSocket upgrade handler (entry point)
// - connection: attach handshake and per-connection message loop
// - sending: frame serialization helpers
// - routes: HTTP route setup (sessions, views, health, metrics)

mod connection;
mod handler;
mod routes;
mod sending;

pub use handler::websocket_handler;
pub use routes::{create_router, error_status, metrics_handler};
