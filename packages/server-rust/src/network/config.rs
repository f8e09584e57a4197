//! Network configuration types for the tracehop server.

use std::time::Duration;

use tracehop_core::REQUEST_ID_HEADER;

/// Top-level network configuration for the server.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Maximum time to wait for a request to complete.
    pub request_timeout: Duration,
    /// Inbound header carrying the correlation id. Echoed on the response.
    pub correlation_header: String,
    /// Value of the `X-Host-ID` response header.
    pub host_id: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout: Duration::from_secs(30),
            correlation_header: REQUEST_ID_HEADER.as_str().to_string(),
            host_id: resolve_host_id(std::env::var("HOSTNAME").ok().as_deref()),
        }
    }
}

/// Targets and limits of the demo endpoints.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// URL fetched by `GET /api/info`.
    pub upstream_url: String,
    /// Base URL the fan-out endpoint calls back into. `None` means the
    /// server's own bound address.
    pub self_url: Option<String>,
    /// Shared deadline for all fan-out calls of one request.
    pub fanout_timeout: Duration,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            upstream_url: "https://dog.ceo/api/breeds/image/random".to_string(),
            self_url: None,
            fanout_timeout: Duration::from_secs(30),
        }
    }
}

/// Lower-cased host name, or `"localhost"` when unset or blank.
#[must_use]
pub fn resolve_host_id(hostname: Option<&str>) -> String {
    hostname
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .unwrap_or("localhost")
        .to_lowercase()
}
