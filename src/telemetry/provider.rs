//! Tracer provider construction and bounded shutdown.

use std::time::Duration;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_sdk::trace::{Config as TraceConfig, Sampler, Tracer, TracerProvider};
use opentelemetry_sdk::{runtime, Resource};
use tracing::{info, warn};
use url::Url;

use crate::error::TelemetryError;

/// Inputs for building the tracer provider.
#[derive(Debug, Clone)]
pub struct TraceSettings {
    /// Jaeger collector endpoint, e.g. `http://localhost:14268/api/traces`.
    /// `None` keeps spans in-process only.
    pub endpoint: Option<String>,
    /// `service.name` resource attribute.
    pub service_name: String,
    /// `service.version` resource attribute.
    pub service_version: String,
}

/// Owns the tracer provider for the lifetime of the process.
///
/// Tracers handed out by [`Telemetry::tracer`] only hold a weak reference,
/// so spans stop recording once this value is shut down.
pub struct Telemetry {
    provider: TracerProvider,
    tracer: Tracer,
}

impl Telemetry {
    /// Build the provider. With an endpoint, finished spans are batched and
    /// sent to the Jaeger collector over HTTP; without one, they are dropped.
    pub fn new(settings: TraceSettings) -> Result<Self, TelemetryError> {
        let config = TraceConfig::default()
            .with_sampler(Sampler::AlwaysOn)
            .with_resource(Resource::new(vec![
                KeyValue::new("service.name", settings.service_name.clone()),
                KeyValue::new("service.version", settings.service_version.clone()),
            ]));

        let provider = match settings.endpoint.as_deref() {
            Some(endpoint) if !endpoint.is_empty() => {
                validate_endpoint(endpoint)?;
                info!("Exporting traces to Jaeger collector at {}", endpoint);
                opentelemetry_jaeger::new_collector_pipeline()
                    .with_endpoint(endpoint)
                    .with_service_name(settings.service_name.clone())
                    .with_reqwest()
                    .with_trace_config(config)
                    .build_batch(runtime::Tokio)?
            }
            _ => {
                info!("No trace collector configured, spans are not exported");
                TracerProvider::builder().with_config(config).build()
            }
        };

        let tracer = provider.tracer(env!("CARGO_PKG_NAME"));
        Ok(Self { provider, tracer })
    }

    /// Tracer for request and handler spans.
    pub fn tracer(&self) -> Tracer {
        self.tracer.clone()
    }

    /// Flush pending spans and stop the batch worker.
    ///
    /// Export failures are logged and swallowed; only running past `timeout`
    /// is an error.
    pub async fn shutdown(self, timeout: Duration) -> Result<(), TelemetryError> {
        let Telemetry { provider, tracer } = self;
        drop(tracer);

        // force_flush blocks on the batch worker, which runs on the runtime.
        let flush = tokio::task::spawn_blocking(move || {
            let results = provider.force_flush();
            drop(provider);
            results
        });

        match tokio::time::timeout(timeout, flush).await {
            Ok(Ok(results)) => {
                for err in results.into_iter().filter_map(Result::err) {
                    warn!("Trace export failed during shutdown: {}", err);
                }
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Trace flush task failed: {}", e);
                Ok(())
            }
            Err(_) => Err(TelemetryError::ShutdownTimeout(timeout)),
        }
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), TelemetryError> {
    let url = Url::parse(endpoint).map_err(|source| TelemetryError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        source,
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(TelemetryError::UnsupportedScheme(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(endpoint: Option<&str>) -> TraceSettings {
        TraceSettings {
            endpoint: endpoint.map(str::to_string),
            service_name: "demo-web".to_string(),
            service_version: "1.0.0".to_string(),
        }
    }

    #[test]
    fn rejects_unparseable_endpoint() {
        let err = Telemetry::new(settings(Some("not a url"))).err().unwrap();
        assert!(matches!(err, TelemetryError::InvalidEndpoint { .. }));
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let err = Telemetry::new(settings(Some("udp://localhost:6831")))
            .err()
            .unwrap();
        assert!(matches!(err, TelemetryError::UnsupportedScheme(s) if s == "udp"));
    }

    #[tokio::test]
    async fn disabled_provider_shuts_down_immediately() {
        let telemetry = Telemetry::new(settings(None)).unwrap();
        telemetry.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn empty_endpoint_means_disabled() {
        let telemetry = Telemetry::new(settings(Some(""))).unwrap();
        telemetry.shutdown(Duration::from_secs(1)).await.unwrap();
    }
}
