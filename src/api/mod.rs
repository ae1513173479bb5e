//! HTTP API module: snapshot queries, health, and the diff WebSocket.

pub mod handlers;
pub mod routes;

pub use handlers::{ApiError, AppState};
pub use routes::create_router;
