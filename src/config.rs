//! Application configuration loaded from environment variables.

use std::time::Duration;

use serde::Deserialize;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Build Identification ===
    /// Branch the running build was cut from.
    #[serde(default = "default_build_id")]
    pub git_branch: String,

    /// Revision hash of the running build.
    #[serde(default = "default_build_id")]
    pub git_hash: String,

    // === Tracing ===
    /// Jaeger collector endpoint (`/api/traces`). Empty or unset disables export.
    #[serde(default)]
    pub jaeger_trace_url: Option<String>,

    /// Service name attached to every exported span.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    // === Server Configuration ===
    /// HTTP listen port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Mount the `/randomResult` failure-injection endpoint.
    #[serde(default = "default_true")]
    pub enable_random_result: bool,

    /// Seconds between health check evaluations.
    #[serde(default = "default_health_interval")]
    pub health_check_interval_secs: u64,

    /// Port for the Prometheus scrape listener. Unset disables it.
    #[serde(default)]
    pub metrics_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

fn default_build_id() -> String {
    "dev".to_string()
}

fn default_service_name() -> String {
    "demo-web".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_true() -> bool {
    true
}

fn default_health_interval() -> u64 {
    15
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Resolve the trace collector endpoint.
    ///
    /// A non-empty command-line value wins over `JAEGER_TRACE_URL`; empty
    /// strings on either side count as unset.
    pub fn trace_endpoint(&self, cli_override: Option<&str>) -> Option<String> {
        cli_override
            .filter(|url| !url.is_empty())
            .or_else(|| self.jaeger_trace_url.as_deref().filter(|url| !url.is_empty()))
            .map(str::to_string)
    }

    /// Interval between health check runs.
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs.max(1))
    }
}
