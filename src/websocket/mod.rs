//! WebSocket transport: upgrade handling, the per-connection send/receive
//! tasks, and the HTTP routes wrapping the engine (spec.md §4.1 and §6,
//! concretized by SPEC_FULL.md §4.12).

mod connection;
mod handler;
mod routes;

pub use handler::websocket_handler;
pub use routes::{create_router, run_server};
