//! Inbound correlation: a Tower layer that establishes the request's
//! correlation context before any handler code runs.
//!
//! For every request the layer reads the configured correlation header
//! (generating a UUID when it is missing or blank), stores the id in the
//! request extensions, and drives the inner service inside a scope holding
//! that id as the ambient context. The scope ends with the response future,
//! so the context is cleared on every exit path. The id is echoed on the
//! response together with `X-Host-ID`.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use http::{HeaderName, HeaderValue, Request, Response};
use tower::{Layer, Service};
use tracehop_core::{
    extract_correlation_id, CorrelationContext, CorrelationId, HOST_ID_HEADER, REQUEST_ID_HEADER,
};
use tracing::warn;

/// Correlation id assigned to the current request, available to handlers
/// and inner layers as a request extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestCorrelation(pub CorrelationId);

impl RequestCorrelation {
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

// ---------------------------------------------------------------------------
// CorrelationLayer
// ---------------------------------------------------------------------------

/// Layer producing [`CorrelationService`].
#[derive(Debug, Clone)]
pub struct CorrelationLayer {
    header: HeaderName,
    host_id: Option<HeaderValue>,
}

impl CorrelationLayer {
    /// Reads and echoes `header`.
    #[must_use]
    pub fn new(header: HeaderName) -> Self {
        Self {
            header,
            host_id: None,
        }
    }

    /// Builds the layer from a configured header name, falling back to
    /// `X-Request-ID` when the name is not a valid header.
    #[must_use]
    pub fn from_header_name(name: &str) -> Self {
        let header = HeaderName::try_from(name).unwrap_or_else(|_| {
            warn!(header = name, "invalid correlation header name, using x-request-id");
            REQUEST_ID_HEADER
        });
        Self::new(header)
    }

    /// Adds `X-Host-ID: <host_id>` to every response. Ignored when `host_id`
    /// is not a valid header value.
    #[must_use]
    pub fn with_host_id(mut self, host_id: &str) -> Self {
        self.host_id = HeaderValue::from_str(host_id).ok();
        self
    }
}

impl<S> Layer<S> for CorrelationLayer {
    type Service = CorrelationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationService {
            inner,
            header: self.header.clone(),
            host_id: self.host_id.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// CorrelationService
// ---------------------------------------------------------------------------

/// See the [module docs](self).
#[derive(Debug, Clone)]
pub struct CorrelationService<S> {
    inner: S,
    header: HeaderName,
    host_id: Option<HeaderValue>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CorrelationService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: 'static,
    ResBody: 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let (id, echoed) = correlation_for(&req, &self.header);
        req.extensions_mut().insert(RequestCorrelation(id.clone()));

        let snapshot = CorrelationContext::with_request_id(id).snapshot();
        // `call` may run handler setup synchronously, so it also needs the scope.
        let inner = snapshot.clone().sync_scope(|| self.inner.call(req));
        let fut = snapshot.scope(inner);

        let header = self.header.clone();
        let host_id = self.host_id.clone();
        Box::pin(async move {
            let mut res = fut.await?;
            let headers = res.headers_mut();
            headers.insert(header, echoed);
            if let Some(host_id) = host_id {
                headers.insert(HOST_ID_HEADER, host_id);
            }
            Ok(res)
        })
    }
}

/// Extracted (or generated) id plus its header form for the response.
fn correlation_for<B>(req: &Request<B>, header: &HeaderName) -> (CorrelationId, HeaderValue) {
    let id = extract_correlation_id(req.headers(), header);
    match HeaderValue::from_str(id.as_str()) {
        Ok(value) => (id, value),
        Err(_) => {
            // Extracted values come from a valid header, so only a
            // pathological id lands here; replace it rather than fail.
            let fresh = CorrelationId::generate();
            let value = HeaderValue::from_str(fresh.as_str())
                .unwrap_or_else(|_| HeaderValue::from_static("unknown"));
            (fresh, value)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
