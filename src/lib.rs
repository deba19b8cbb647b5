//! Demo HTTP service for exercising deployment, health-checking and
//! distributed-tracing infrastructure.
//!
//! # Endpoints
//!
//! ```text
//! GET /health                  health reporter snapshot
//! GET /randomResult?chance=p   fails with probability p (default 0.25)
//! GET /<anything else>         echoes request metadata
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`api`]: Handlers, middleware and router
//! - [`health`]: Periodic health reporter
//! - [`telemetry`]: Trace context propagation and Jaeger export
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Utility functions

pub mod api;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod telemetry;
pub mod utils;

pub use config::Config;
pub use error::ServiceError;
