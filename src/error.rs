//! Unified error types for the demo service.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, error};

/// Unified error type for process startup and shutdown.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Hostname lookup failed.
    #[error("failed to resolve hostname: {0}")]
    Hostname(#[source] std::io::Error),

    /// Tracer provider construction or flush error.
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    /// Listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: std::net::SocketAddr,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trace export errors.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Collector endpoint is not a valid URL.
    #[error("invalid collector endpoint {endpoint}: {source}")]
    InvalidEndpoint {
        /// Endpoint as configured.
        endpoint: String,
        /// Parse failure.
        #[source]
        source: url::ParseError,
    },

    /// Collector endpoint uses a scheme the Jaeger HTTP client cannot reach.
    #[error("unsupported collector scheme: {0}")]
    UnsupportedScheme(String),

    /// Exporter pipeline could not be built.
    #[error("trace pipeline error: {0}")]
    Pipeline(#[from] opentelemetry::trace::TraceError),

    /// Pending spans were not flushed in time.
    #[error("span export did not finish within {0:?}")]
    ShutdownTimeout(Duration),
}

/// Request-level errors. Rendered with an empty body.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// `chance` did not parse as a float.
    #[error("invalid chance value: {0:?}")]
    InvalidChance(String),

    /// Response body could not be encoded.
    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let status = match &self {
            HandlerError::InvalidChance(_) => {
                debug!(error = %self, "rejecting request");
                StatusCode::UNPROCESSABLE_ENTITY
            }
            HandlerError::Encode(_) => {
                error!(error = %self, "response encoding failed");
                StatusCode::SERVICE_UNAVAILABLE
            }
        };

        status.into_response()
    }
}
