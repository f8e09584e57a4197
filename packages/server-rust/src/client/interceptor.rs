//! Request interceptors run by [`RestClient`](super::RestClient) before dispatch.

use tracehop_core::{stamp_outbound, CorrelationSnapshot, IdSource};
use tracing::{debug, info};

/// Mutates an outgoing request before it is sent.
///
/// Interceptors run synchronously, in registration order, on the task that
/// issues the call, so they observe that task's ambient correlation context.
pub trait RequestInterceptor: Send + Sync + 'static {
    fn intercept(&self, request: &mut reqwest::Request);
}

impl<F> RequestInterceptor for F
where
    F: Fn(&mut reqwest::Request) + Send + Sync + 'static,
{
    fn intercept(&self, request: &mut reqwest::Request) {
        self(request);
    }
}

/// Stamps `X-Request-ID` and `X-Session-ID` from the ambient context.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationInterceptor;

impl RequestInterceptor for CorrelationInterceptor {
    fn intercept(&self, request: &mut reqwest::Request) {
        let ambient = CorrelationSnapshot::current();
        let outcome = stamp_outbound(request.headers_mut(), &ambient);
        if outcome.source == IdSource::Generated {
            debug!(
                url = %request.url(),
                request_id = ?outcome.request_id,
                "no enclosing request context, generated outbound request id"
            );
        }
    }
}

/// Logs method and URL of every outgoing call.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

impl RequestInterceptor for LoggingInterceptor {
    fn intercept(&self, request: &mut reqwest::Request) {
        info!(method = %request.method(), url = %request.url(), "making outbound request");
    }
}

#[cfg(test)]
mod tests {
    use reqwest::{Method, Url};
    use tracehop_core::{CorrelationContext, REQUEST_ID_HEADER, SESSION_ID_HEADER};

    use super::*;

    fn request() -> reqwest::Request {
        reqwest::Request::new(Method::GET, Url::parse("http://localhost/api/info").unwrap())
    }

    #[tokio::test]
    async fn stamps_ambient_request_id() {
        let mut req = request();
        CorrelationContext::with_request_id("amb-42")
            .snapshot()
            .sync_scope(|| CorrelationInterceptor.intercept(&mut req));

        assert_eq!(req.headers()[REQUEST_ID_HEADER], "amb-42");
        assert_eq!(req.headers()[SESSION_ID_HEADER], "amb-42");
    }

    #[test]
    fn generates_outside_request_context() {
        let mut req = request();
        CorrelationInterceptor.intercept(&mut req);

        let id = req.headers()[REQUEST_ID_HEADER].to_str().unwrap();
        assert_eq!(id.len(), 10);
        assert_eq!(req.headers()[SESSION_ID_HEADER], id);
    }

    #[test]
    fn closures_are_interceptors() {
        let tag = |req: &mut reqwest::Request| {
            req.headers_mut()
                .insert("x-custom-header", "custom-value".parse().unwrap());
        };
        let mut req = request();
        tag.intercept(&mut req);
        assert_eq!(req.headers()["x-custom-header"], "custom-value");
    }
}
