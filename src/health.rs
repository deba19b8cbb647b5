//! Periodic health reporting.
//!
//! Components register named [`Checker`]s with a [`HealthReporter`]. A
//! background task re-evaluates every checker on a fixed interval and the
//! `/health` handler serves the latest snapshot, so requests never run
//! checks themselves.

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::metrics;

/// A named liveness/readiness check.
pub trait Checker: Send + Sync {
    /// Name reported as `service` in the health body.
    fn name(&self) -> &str;

    /// Run the check. `Err` carries a human-readable reason.
    fn check(&self) -> Result<(), String>;
}

/// Latest outcome of one checker.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    /// Checker name.
    pub service: String,
    /// Whether the last evaluation passed.
    pub healthy: bool,
    /// Failure reason, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the checker last ran.
    pub last_checked: DateTime<Utc>,
}

/// Aggregated health snapshot.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthReport {
    /// True when every reported check passed.
    pub healthy: bool,
    /// Per-checker results.
    pub checks: Vec<CheckResult>,
}

#[derive(Default)]
struct Inner {
    checkers: RwLock<Vec<Arc<dyn Checker>>>,
    results: RwLock<Vec<CheckResult>>,
}

/// Process-wide health reporter. Clones share state.
#[derive(Clone, Default)]
pub struct HealthReporter {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for HealthReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthReporter").finish_non_exhaustive()
    }
}

impl HealthReporter {
    /// Create a reporter with no checkers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a checker. It is reported from the next evaluation on.
    pub async fn register(&self, checker: impl Checker + 'static) {
        self.inner.checkers.write().await.push(Arc::new(checker));
    }

    /// Evaluate every checker once and store the results.
    pub async fn run_checks(&self) {
        let _timer = metrics::timer_health_check();
        let checkers = self.inner.checkers.read().await.clone();

        let mut results = Vec::with_capacity(checkers.len());
        for checker in &checkers {
            let outcome = checker.check();
            results.push(CheckResult {
                service: checker.name().to_string(),
                healthy: outcome.is_ok(),
                message: outcome.err(),
                last_checked: Utc::now(),
            });
        }

        let mut current = self.inner.results.write().await;
        for result in results.iter().filter(|r| !r.healthy) {
            let was_healthy = current
                .iter()
                .find(|prev| prev.service == result.service)
                .map_or(true, |prev| prev.healthy);
            if was_healthy {
                warn!(
                    service = %result.service,
                    "Health check failing: {}",
                    result.message.as_deref().unwrap_or("unknown")
                );
            }
        }
        *current = results;

        debug!(checks = current.len(), "Health checks evaluated");
    }

    /// Start the periodic evaluation loop. The first round runs immediately.
    pub fn spawn_checkers(&self, interval: Duration) -> JoinHandle<()> {
        let reporter = self.clone();
        info!("Running health checks every {:?}", interval);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                reporter.run_checks().await;
            }
        })
    }

    /// Latest snapshot.
    pub async fn report(&self) -> HealthReport {
        let checks = self.inner.results.read().await.clone();
        HealthReport {
            healthy: checks.iter().all(|c| c.healthy),
            checks,
        }
    }
}

/// Health handler - 200 when all checks pass, 503 otherwise.
pub async fn health(State(reporter): State<HealthReporter>) -> impl IntoResponse {
    let report = reporter.report().await;
    let status = if report.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(report))
}
