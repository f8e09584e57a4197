//! [`RestClient`]: a reqwest client with a default header set, an optional
//! base URL, an interceptor chain and a fixed-backoff retry policy.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, Url};
use tracing::{debug, warn};

use super::error::ClientError;
use super::interceptor::{CorrelationInterceptor, RequestInterceptor};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Fixed-backoff retry applied to transport failures and 5xx responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(100),
        }
    }
}

// ---------------------------------------------------------------------------
// RestClientBuilder
// ---------------------------------------------------------------------------

/// Builder for [`RestClient`].
///
/// The correlation interceptor is always installed first; interceptors added
/// here run after it, in the order they were added.
pub struct RestClientBuilder {
    base_url: Option<String>,
    headers: HeaderMap,
    interceptors: Vec<Arc<dyn RequestInterceptor>>,
    connect_timeout: Duration,
    read_timeout: Duration,
    retry: Option<RetryPolicy>,
}

impl Default for RestClientBuilder {
    fn default() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("tracehop/", env!("CARGO_PKG_VERSION"))),
        );
        Self {
            base_url: None,
            headers,
            interceptors: vec![Arc::new(CorrelationInterceptor)],
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            retry: None,
        }
    }
}

impl RestClientBuilder {
    /// Relative paths passed to the client are resolved against `url`.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Adds (or replaces) a default header sent with every request.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidHeader`] if `name` or `value` is not a
    /// valid HTTP header component.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self, ClientError> {
        let invalid = |reason: String| ClientError::InvalidHeader {
            name: name.to_string(),
            reason,
        };
        let header_name = HeaderName::try_from(name).map_err(|e| invalid(e.to_string()))?;
        let header_value = HeaderValue::try_from(value).map_err(|e| invalid(e.to_string()))?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Adds several default headers. See [`header`](Self::header).
    ///
    /// # Errors
    ///
    /// Fails on the first invalid header.
    pub fn headers<'a, I>(self, headers: I) -> Result<Self, ClientError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        headers
            .into_iter()
            .try_fold(self, |builder, (name, value)| builder.header(name, value))
    }

    #[must_use]
    pub fn interceptor(mut self, interceptor: impl RequestInterceptor) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    #[must_use]
    pub fn timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    #[must_use]
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] for an unparseable base URL, or
    /// [`ClientError::Transport`] if the underlying client cannot be built.
    pub fn build(self) -> Result<RestClient, ClientError> {
        let base_url = self.base_url.map(|raw| parse_url(&raw)).transpose()?;
        let http = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.read_timeout)
            .build()?;

        Ok(RestClient {
            http,
            base_url,
            headers: self.headers,
            interceptors: self.interceptors.into(),
            retry: self.retry,
        })
    }
}

fn parse_url(raw: &str) -> Result<Url, ClientError> {
    Url::parse(raw).map_err(|e| ClientError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// RestClient
// ---------------------------------------------------------------------------

/// Outbound HTTP client that propagates the ambient correlation id.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Option<Url>,
    headers: HeaderMap,
    interceptors: Arc<[Arc<dyn RequestInterceptor>]>,
    retry: Option<RetryPolicy>,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("interceptors", &self.interceptors.len())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl RestClient {
    #[must_use]
    pub fn builder() -> RestClientBuilder {
        RestClientBuilder::default()
    }

    /// Client with defaults only.
    ///
    /// # Errors
    ///
    /// See [`RestClientBuilder::build`].
    pub fn new() -> Result<Self, ClientError> {
        Self::builder().build()
    }

    /// Client whose relative paths resolve against `base_url`.
    ///
    /// # Errors
    ///
    /// See [`RestClientBuilder::build`].
    pub fn with_base_url(base_url: &str) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    /// Client with extra default headers.
    ///
    /// # Errors
    ///
    /// See [`RestClientBuilder::header`] and [`RestClientBuilder::build`].
    pub fn with_headers<'a, I>(base_url: &str, headers: I) -> Result<Self, ClientError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        Self::builder().base_url(base_url).headers(headers)?.build()
    }

    /// Client with extra interceptors, run after the correlation interceptor.
    ///
    /// # Errors
    ///
    /// See [`RestClientBuilder::build`].
    pub fn with_interceptors<I>(base_url: &str, interceptors: I) -> Result<Self, ClientError>
    where
        I: IntoIterator<Item = Arc<dyn RequestInterceptor>>,
    {
        let mut builder = Self::builder().base_url(base_url);
        builder.interceptors.extend(interceptors);
        builder.build()
    }

    /// Client with explicit connect and read timeouts.
    ///
    /// # Errors
    ///
    /// See [`RestClientBuilder::build`].
    pub fn with_timeouts(base_url: &str, connect: Duration, read: Duration) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).timeouts(connect, read).build()
    }

    /// Resolves `uri` against the base URL. Absolute URLs pass through.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] if the result is not a valid URL.
    pub fn resolve(&self, uri: &str) -> Result<Url, ClientError> {
        if let Ok(absolute) = Url::parse(uri) {
            return Ok(absolute);
        }
        let joined = match &self.base_url {
            Some(base) => base.join(uri),
            None => Url::parse(uri),
        };
        joined.map_err(|e| ClientError::InvalidUrl {
            url: uri.to_string(),
            reason: e.to_string(),
        })
    }

    /// GETs `uri` and returns the response body as text.
    ///
    /// # Errors
    ///
    /// Transport failures, non-2xx statuses and invalid URLs are returned as
    /// [`ClientError`] after the retry policy (if any) is exhausted.
    pub async fn get_text(&self, uri: &str) -> Result<String, ClientError> {
        let response = self.send(Method::GET, uri).await?;
        Ok(response.text().await?)
    }

    /// GETs `uri` and deserializes the JSON body.
    ///
    /// # Errors
    ///
    /// As [`get_text`](Self::get_text), plus body decoding failures.
    pub async fn get_json<T>(&self, uri: &str) -> Result<T, ClientError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self.send(Method::GET, uri).await?;
        Ok(response.json().await?)
    }

    /// Sends a body-less request and returns the successful response.
    ///
    /// Default headers are applied first, then every interceptor in order.
    /// Interceptors run once per logical call; retries resend the same
    /// stamped request.
    ///
    /// # Errors
    ///
    /// See [`get_text`](Self::get_text).
    pub async fn send(&self, method: Method, uri: &str) -> Result<reqwest::Response, ClientError> {
        let url = self.resolve(uri)?;
        let mut request = reqwest::Request::new(method, url);
        for (name, value) in &self.headers {
            request
                .headers_mut()
                .entry(name)
                .or_insert_with(|| value.clone());
        }
        for interceptor in self.interceptors.iter() {
            interceptor.intercept(&mut request);
        }

        let Some(policy) = self.retry else {
            return self.execute_once(request).await;
        };

        let mut attempt = 0;
        loop {
            let Some(retry_copy) = request.try_clone() else {
                return self.execute_once(request).await;
            };
            match self.execute_once(retry_copy).await {
                Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                    attempt += 1;
                    warn!(error = %e, attempt, url = %request.url(), "retrying outbound request");
                    tokio::time::sleep(policy.backoff).await;
                }
                result => return result,
            }
        }
    }

    async fn execute_once(&self, request: reqwest::Request) -> Result<reqwest::Response, ClientError> {
        let url = request.url().to_string();
        let response = self.http.execute(request).await?;
        let status = response.status();
        debug!(%url, %status, "outbound response");
        if status.is_success() {
            Ok(response)
        } else {
            Err(ClientError::Status { status, url })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::http::{HeaderMap as AxumHeaders, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use tracehop_core::CorrelationContext;

    use super::*;

    async fn echo_headers(headers: AxumHeaders) -> Json<Value> {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(String::from);
        Json(json!({
            "request_id": header("x-request-id"),
            "session_id": header("x-session-id"),
            "content_type": header("content-type"),
            "custom": header("x-custom-header"),
        }))
    }

    /// Local server: `/echo` reflects headers, `/flaky` fails twice then
    /// succeeds, `/missing` is always 404.
    async fn spawn_server() -> (SocketAddr, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let flaky_hits = hits.clone();
        let app = Router::new()
            .route("/echo", get(echo_headers))
            .route(
                "/flaky",
                get(move || {
                    let hits = flaky_hits.clone();
                    async move {
                        if hits.fetch_add(1, Ordering::SeqCst) < 2 {
                            (StatusCode::SERVICE_UNAVAILABLE, "busy")
                        } else {
                            (StatusCode::OK, "ok")
                        }
                    }
                }),
            )
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (addr, hits)
    }

    #[tokio::test]
    async fn propagates_ambient_request_id() {
        let (addr, _) = spawn_server().await;
        let client = RestClient::with_base_url(&format!("http://{addr}")).unwrap();

        let body: Value = CorrelationContext::with_request_id("outbound-1")
            .snapshot()
            .scope(client.get_json("/echo"))
            .await
            .unwrap();

        assert_eq!(body["request_id"], "outbound-1");
        assert_eq!(body["session_id"], "outbound-1");
        assert_eq!(body["content_type"], "application/json");
    }

    #[tokio::test]
    async fn generates_request_id_without_context() {
        let (addr, _) = spawn_server().await;
        let client = RestClient::with_base_url(&format!("http://{addr}")).unwrap();

        let body: Value = client.get_json("/echo").await.unwrap();

        let id = body["request_id"].as_str().unwrap();
        assert_eq!(id.len(), 10);
        assert_eq!(body["session_id"], id);
    }

    #[tokio::test]
    async fn custom_headers_and_interceptors_are_applied() {
        let (addr, _) = spawn_server().await;
        let tag: Arc<dyn RequestInterceptor> = Arc::new(|req: &mut reqwest::Request| {
            req.headers_mut()
                .insert("x-custom-header", HeaderValue::from_static("from-interceptor"));
        });
        let client = RestClient::with_interceptors(&format!("http://{addr}"), [tag]).unwrap();
        let body: Value = client.get_json("/echo").await.unwrap();
        assert_eq!(body["custom"], "from-interceptor");

        let client =
            RestClient::with_headers(&format!("http://{addr}"), [("X-Custom-Header", "default")]).unwrap();
        let body: Value = client.get_json("/echo").await.unwrap();
        assert_eq!(body["custom"], "default");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let (addr, _) = spawn_server().await;
        let client = RestClient::with_base_url(&format!("http://{addr}")).unwrap();

        let err = client.get_text("/missing").await.unwrap_err();
        assert!(matches!(err, ClientError::Status { status, .. } if status == StatusCode::NOT_FOUND));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn retries_server_errors_with_fixed_backoff() {
        let (addr, hits) = spawn_server().await;
        let client = RestClient::builder()
            .base_url(format!("http://{addr}"))
            .retry(RetryPolicy {
                max_retries: 2,
                backoff: Duration::from_millis(10),
            })
            .build()
            .unwrap();

        assert_eq!(client.get_text("/flaky").await.unwrap(), "ok");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn without_retry_policy_first_failure_is_returned() {
        let (addr, hits) = spawn_server().await;
        let client = RestClient::with_base_url(&format!("http://{addr}")).unwrap();

        assert!(client.get_text("/flaky").await.is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn resolve_relative_and_absolute() {
        let client = RestClient::with_base_url("http://svc.local:8080/").unwrap();
        assert_eq!(
            client.resolve("/api/info").unwrap().as_str(),
            "http://svc.local:8080/api/info"
        );
        assert_eq!(
            client.resolve("https://example.com/x").unwrap().as_str(),
            "https://example.com/x"
        );

        let bare = RestClient::new().unwrap();
        assert!(matches!(bare.resolve("/api/info"), Err(ClientError::InvalidUrl { .. })));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            RestClient::with_base_url("not a url"),
            Err(ClientError::InvalidUrl { .. })
        ));
    }
}
