//! Request logging and trace-span middleware.

use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{MatchedPath, Request, State},
    http,
    middleware::Next,
    response::Response,
};
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer as _};
use opentelemetry::KeyValue;
use opentelemetry_sdk::trace::Tracer;
use tracing::{info, info_span, Instrument, Span};

use crate::metrics;
use crate::telemetry::extract_context;

/// Matched route template, or the raw path when nothing matched.
fn route_name<B>(request: &http::Request<B>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string())
}

/// Log span for the request-logging layer.
pub fn request_span(request: &http::Request<Body>) -> Span {
    info_span!(
        "http_request",
        method = %request.method(),
        path = %request.uri().path(),
        route = %route_name(request),
    )
}

/// Completion log line for the request-logging layer.
pub fn log_response(response: &http::Response<Body>, latency: Duration, _span: &Span) {
    info!(
        status = response.status().as_u16(),
        latency_us = latency.as_micros() as u64,
        "request completed"
    );
}

/// Record a server span per request, named after the matched route.
///
/// An inbound `traceparent` is continued when valid; anything else starts a
/// new trace. The OpenTelemetry [`Context`](opentelemetry::Context) holding
/// the server span is placed in the request extensions so handlers can open
/// child spans.
pub async fn trace_requests(
    State(tracer): State<Tracer>,
    mut request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let route = route_name(&request);

    let parent = extract_context(request.headers());
    let span = tracer
        .span_builder(route.clone())
        .with_kind(SpanKind::Server)
        .with_attributes(vec![
            KeyValue::new("http.method", request.method().to_string()),
            KeyValue::new("http.target", request.uri().to_string()),
            KeyValue::new("http.route", route.clone()),
        ])
        .start_with_context(&tracer, &parent);
    let cx = parent.with_span(span);
    request.extensions_mut().insert(cx.clone());

    let (trace_id, span_id) = {
        let span = cx.span();
        let span_context = span.span_context();
        (span_context.trace_id(), span_context.span_id())
    };

    let response = next
        .run(request)
        .instrument(info_span!("trace", trace_id = %trace_id, span_id = %span_id))
        .await;

    let status = response.status();
    let span = cx.span();
    span.set_attribute(KeyValue::new(
        "http.status_code",
        i64::from(status.as_u16()),
    ));
    if status.is_server_error() {
        span.set_status(Status::error(status.to_string()));
    }
    span.end();

    metrics::record_http_request(started, &route, status.as_u16());
    response
}
