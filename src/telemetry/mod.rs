//! Distributed tracing: inbound context propagation and the Jaeger-backed
//! tracer provider.

pub mod propagation;
pub mod provider;

pub use propagation::{extract_context, HeaderExtractor};
pub use provider::{Telemetry, TraceSettings};
