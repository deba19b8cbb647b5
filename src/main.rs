//! Demo web service entry point.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use demo_web::api::{create_router, AppState, BuildInfo};
use demo_web::config::Config;
use demo_web::error::ServiceError;
use demo_web::health::HealthReporter;
use demo_web::metrics;
use demo_web::telemetry::{Telemetry, TraceSettings};
use demo_web::utils::shutdown_signal;

/// Time allowed for pending spans to reach the collector on exit.
const TRACE_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Demo HTTP service with echo, health and failure-injection endpoints.
#[derive(Parser, Debug)]
#[command(name = "demo-web")]
#[command(about = "Echo, health and failure-injection endpoints for infrastructure testing")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Jaeger collector endpoint, e.g. http://localhost:14268/api/traces.
    /// Takes precedence over JAEGER_TRACE_URL.
    #[arg(long)]
    jaeger_endpoint: Option<String>,

    /// HTTP listen port. Takes precedence over PORT.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load().map_err(ServiceError::from)?;

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("demo_web=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.rust_log))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("GIT Version: {} @ {}", config.git_branch, config.git_hash);

    if let Err(e) = run(args, config).await {
        error!("{:#}", e);
        return Err(e);
    }

    info!("Exiting cleanly");
    Ok(())
}

async fn run(args: Args, config: Config) -> anyhow::Result<()> {
    // Initialize metrics
    if let Some(metrics_port) = config.metrics_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], metrics_port));
        metrics::install_prometheus(addr).context("failed to start Prometheus listener")?;
        info!("Metrics listening on {}", addr);
    }
    metrics::init_metrics();

    let telemetry = Telemetry::new(TraceSettings {
        endpoint: config.trace_endpoint(args.jaeger_endpoint.as_deref()),
        service_name: config.service_name.clone(),
        service_version: env!("CARGO_PKG_VERSION").to_string(),
    })
    .map_err(ServiceError::from)?;

    let hostname = hostname::get()
        .map_err(ServiceError::Hostname)?
        .to_string_lossy()
        .into_owned();

    let health = HealthReporter::new();
    let _health_loop = health.spawn_checkers(config.health_check_interval());

    let app_state = AppState::new(
        hostname,
        BuildInfo {
            branch: config.git_branch.clone(),
            hash: config.git_hash.clone(),
        },
        telemetry.tracer(),
        health,
    )
    .with_random_result(config.enable_random_result);

    // Start HTTP server
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port.unwrap_or(config.port)));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServiceError::Bind { addr, source })?;
    info!("HTTP server listening on {}", addr);

    let router = create_router(app_state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServiceError::from)?;

    info!("HTTP server stopped, flushing traces");
    telemetry
        .shutdown(TRACE_FLUSH_TIMEOUT)
        .await
        .map_err(ServiceError::from)?;

    Ok(())
}
