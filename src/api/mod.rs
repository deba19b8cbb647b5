//! HTTP API module: echo, failure-injection and health endpoints.

pub mod handlers;
pub mod middleware;
pub mod routes;

pub use handlers::{AppState, BuildInfo};
pub use routes::create_router;
