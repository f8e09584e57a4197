//! Instrumented outbound HTTP client.
//!
//! Every request passes through an interceptor chain before dispatch. The
//! correlation interceptor is always first, so outgoing calls carry the
//! ambient request id (or a generated one) in `X-Request-ID` / `X-Session-ID`.

pub mod error;
pub mod interceptor;
pub mod rest;

pub use error::ClientError;
pub use interceptor::{CorrelationInterceptor, LoggingInterceptor, RequestInterceptor};
pub use rest::{RestClient, RestClientBuilder, RetryPolicy};
