//! HTTP API handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{FromRef, OriginalUri, RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};
use opentelemetry::trace::{Span as _, Tracer as _};
use opentelemetry::Context;
use opentelemetry_sdk::trace::Tracer;
use rand::Rng;
use serde::{ser::Error as _, Serialize, Serializer};
use url::form_urlencoded;

use crate::error::HandlerError;
use crate::health::HealthReporter;
use crate::metrics;
use crate::utils::now_micros;

/// Failure chance used when the caller does not supply one.
pub const DEFAULT_CHANCE: f64 = 0.25;

/// Build identification reported by the echo endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    /// Source branch.
    pub branch: String,
    /// Source revision.
    pub hash: String,
}

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Hostname resolved at startup.
    pub hostname: Arc<str>,
    /// Build identifiers.
    pub build: Arc<BuildInfo>,
    /// Tracer for request and handler spans.
    pub tracer: Tracer,
    /// Health reporter backing `/health`.
    pub health: HealthReporter,
    /// Whether `/randomResult` is mounted.
    pub random_result_enabled: bool,
}

impl AppState {
    /// Create new app state with the failure-injection endpoint enabled.
    pub fn new(
        hostname: impl Into<Arc<str>>,
        build: BuildInfo,
        tracer: Tracer,
        health: HealthReporter,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            build: Arc::new(build),
            tracer,
            health,
            random_result_enabled: true,
        }
    }

    /// Toggle the failure-injection endpoint.
    pub fn with_random_result(mut self, enabled: bool) -> Self {
        self.random_result_enabled = enabled;
        self
    }
}

impl FromRef<AppState> for HealthReporter {
    fn from_ref(state: &AppState) -> Self {
        state.health.clone()
    }
}

/// Echo response. Empty fields are left out of the JSON.
#[derive(Debug, Serialize)]
pub struct EchoResponse {
    /// Microseconds since the epoch.
    #[serde(skip_serializing_if = "is_zero")]
    pub now: i64,
    /// Request target as received.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub uri: String,
    /// Request headers, canonical key to values in arrival order.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, Vec<String>>,
    /// Server hostname.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    /// Build revision.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub git_hash: String,
    /// Build branch.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub git_branch: String,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

/// Result of a single failure-injection trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialOutcome {
    /// The sample landed at or above the chance.
    Success,
    /// The sample landed below the chance.
    Failure,
}

impl TrialOutcome {
    /// Fail when `chance > point`. With `point` in `[0, 1)`, a chance of 0
    /// never fails.
    pub fn evaluate(chance: f64, point: f64) -> Self {
        if chance > point {
            TrialOutcome::Failure
        } else {
            TrialOutcome::Success
        }
    }

    /// HTTP status for this outcome.
    pub fn status(&self) -> StatusCode {
        match self {
            TrialOutcome::Success => StatusCode::OK,
            TrialOutcome::Failure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message placed in the response body.
    pub fn message(&self) -> &'static str {
        match self {
            TrialOutcome::Success => "Success!",
            TrialOutcome::Failure => "Random failure!",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            TrialOutcome::Success => "success",
            TrialOutcome::Failure => "failure",
        }
    }
}

/// Failure-injection response.
#[derive(Debug, Serialize)]
pub struct RandomResultResponse {
    /// Microseconds since the epoch.
    pub now: i64,
    /// Requested failure chance.
    #[serde(serialize_with = "finite")]
    pub chance: f64,
    /// Drawn sample in `[0, 1)`.
    #[serde(serialize_with = "finite")]
    pub point: f64,
    /// Outcome message.
    pub message: &'static str,
    /// Outcome of the trial.
    #[serde(skip)]
    pub outcome: TrialOutcome,
}

// JSON has no representation for NaN or infinities.
fn finite<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_finite() {
        serializer.serialize_f64(*value)
    } else {
        Err(S::Error::custom(format!("unsupported float value: {value}")))
    }
}

/// Read `chance` from a raw query string.
///
/// Missing or empty values fall back to [`DEFAULT_CHANCE`]. Anything that
/// does not parse as a float, including finite literals that overflow, is
/// rejected. No range check is applied.
pub fn parse_chance(raw_query: Option<&str>) -> Result<f64, HandlerError> {
    let raw = raw_query.and_then(|query| {
        form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "chance")
            .map(|(_, value)| value.into_owned())
    });

    let raw = match raw.as_deref() {
        None | Some("") => return Ok(DEFAULT_CHANCE),
        Some(raw) => raw,
    };

    let chance = raw
        .parse::<f64>()
        .ok()
        .or_else(|| parse_hex_float(raw))
        .ok_or_else(|| HandlerError::InvalidChance(raw.to_string()))?;

    if chance.is_infinite() && !spells_infinity(raw) {
        return Err(HandlerError::InvalidChance(raw.to_string()));
    }

    Ok(chance)
}

/// Parse a hexadecimal float such as `0x1p-2` or `-0x1.8P+1`.
///
/// The binary exponent is mandatory. Results that overflow to infinity are
/// rejected.
fn parse_hex_float(raw: &str) -> Option<f64> {
    let (negative, rest) = match raw.as_bytes().first()? {
        b'-' => (true, &raw[1..]),
        b'+' => (false, &raw[1..]),
        _ => (false, raw),
    };
    let rest = rest
        .strip_prefix("0x")
        .or_else(|| rest.strip_prefix("0X"))?;
    let (mantissa, exponent) = rest.split_once(|c| c == 'p' || c == 'P')?;
    let (int_digits, frac_digits) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_digits.is_empty() && frac_digits.is_empty() {
        return None;
    }

    let mut value = 0f64;
    for c in int_digits.chars().chain(frac_digits.chars()) {
        value = value * 16.0 + f64::from(c.to_digit(16)?);
    }

    let exponent: i32 = exponent.parse().ok()?;
    let frac_len = i32::try_from(frac_digits.len()).ok()?;
    let value = value * 2f64.powi(exponent.checked_sub(frac_len.checked_mul(4)?)?);
    if value.is_infinite() {
        return None;
    }

    Some(if negative { -value } else { value })
}

fn spells_infinity(raw: &str) -> bool {
    raw.trim_start_matches(|c| c == '+' || c == '-')
        .to_ascii_lowercase()
        .starts_with("inf")
}

/// Draw one sample and evaluate the trial.
pub fn run_trial<R: Rng + ?Sized>(chance: f64, rng: &mut R) -> RandomResultResponse {
    let point: f64 = rng.gen();
    let outcome = TrialOutcome::evaluate(chance, point);

    RandomResultResponse {
        now: now_micros(),
        chance,
        point,
        message: outcome.message(),
        outcome,
    }
}

/// Render a header name the way HTTP/1 peers conventionally spell it
/// (`x-test` becomes `X-Test`).
pub fn canonical_header_key(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}

/// Group header values by canonical name, keeping arrival order per name.
///
/// `Host` is part of the request target, not the header set, and is left out.
pub fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut collected: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        if name == header::HOST {
            continue;
        }
        collected
            .entry(canonical_header_key(name.as_str()))
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    collected
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Result<Response, HandlerError> {
    let bytes = serde_json::to_vec(body)?;
    Ok((status, [(header::CONTENT_TYPE, "application/json")], bytes).into_response())
}

/// Echo handler - reflects request metadata back to the caller.
pub async fn echo(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    parent: Option<Extension<Context>>,
    headers: HeaderMap,
) -> Result<Response, HandlerError> {
    let parent = parent.map(|Extension(cx)| cx).unwrap_or_default();
    let mut span = state.tracer.start_with_context("echo", &parent);

    let body = EchoResponse {
        now: now_micros(),
        uri: uri.to_string(),
        headers: collect_headers(&headers),
        hostname: state.hostname.to_string(),
        git_hash: state.build.hash.clone(),
        git_branch: state.build.branch.clone(),
    };
    span.end();

    json_response(StatusCode::OK, &body)
}

/// Failure-injection handler - fails with the requested probability.
pub async fn random_result(RawQuery(query): RawQuery) -> Result<Response, HandlerError> {
    let chance = parse_chance(query.as_deref())?;
    let result = run_trial(chance, &mut rand::thread_rng());
    metrics::inc_random_result(result.outcome.label());

    json_response(result.outcome.status(), &result)
}
