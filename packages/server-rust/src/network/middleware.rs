//! HTTP middleware stack for the tracehop server.
//!
//! Middleware ordering follows the outer-to-inner convention: the first
//! layer listed is the outermost (processes the request first on the way
//! in, and the response last on the way out).

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::layer::util::{Identity, Stack};
use tower::ServiceBuilder;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::Span;

use super::config::NetworkConfig;
use super::correlation::{CorrelationLayer, RequestCorrelation};

type MakeRequestSpan = fn(&Request<Body>) -> Span;

/// The composed Tower layer type produced by [`build_http_layers`].
type HttpLayers = Stack<
    TimeoutLayer,
    Stack<
        TraceLayer<SharedClassifier<ServerErrorsAsFailures>, MakeRequestSpan>,
        Stack<CorrelationLayer, Identity>,
    >,
>;

/// Builds the HTTP-level Tower middleware stack from the network configuration.
///
/// **Middleware ordering (outermost to innermost):**
/// 1. `Correlation` -- extracts or generates the request id, installs it as
///    the ambient context and echoes it (plus `X-Host-ID`) on the response
/// 2. `Tracing` -- request span carrying method, URI and `request_id`
/// 3. `Timeout` -- enforces a maximum request processing duration
#[must_use]
pub fn build_http_layers(config: &NetworkConfig) -> HttpLayers {
    ServiceBuilder::new()
        .layer(
            CorrelationLayer::from_header_name(&config.correlation_header)
                .with_host_id(&config.host_id),
        )
        .layer(TraceLayer::new_for_http().make_span_with(request_span as MakeRequestSpan))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .into_inner()
}

fn request_span(req: &Request<Body>) -> Span {
    let request_id = req
        .extensions()
        .get::<RequestCorrelation>()
        .map_or("-", RequestCorrelation::as_str);
    tracing::info_span!(
        "request",
        method = %req.method(),
        uri = %req.uri(),
        request_id,
    )
}
