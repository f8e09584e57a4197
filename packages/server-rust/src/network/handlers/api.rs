//! Demo endpoints exercising correlation propagation end to end.

use axum::extract::State;
use axum::Json;
use serde_json::Value;
use tracehop_core::CorrelationContext;
use tracing::{info, warn};

use super::AppState;
use crate::executor::current_worker;
use crate::fanout::fan_out;

/// Body of `GET /api/info` when the upstream call fails.
pub const UPSTREAM_FAILURE: &str = "Failed to fetch data from upstream";

/// Names of the calls made by `GET /api/info/async`.
pub const FAN_OUT_CALLS: [&str; 2] = ["call1", "call2"];

/// `GET /api/info`: fetches the configured upstream through the
/// instrumented client and returns its body.
pub async fn info_handler(State(state): State<AppState>) -> String {
    info!(upstream = %state.demo.upstream_url, "fetching upstream info");
    match state.client.get_text(&state.demo.upstream_url).await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "upstream call failed");
            UPSTREAM_FAILURE.to_string()
        }
    }
}

/// `GET /api/info/async`: calls this server's `/api/info` twice on the
/// executor and reports the request id each worker observed.
pub async fn info_async_handler(State(state): State<AppState>) -> Json<Value> {
    let url = format!("{}/api/info", state.self_url.trim_end_matches('/'));
    info!(%url, "starting fan-out calls");

    let calls = FAN_OUT_CALLS.map(|name| {
        let client = state.client.clone();
        let url = url.clone();
        let call = async move {
            info!(
                call = name,
                worker = current_worker().as_deref().unwrap_or("-"),
                "executing async call"
            );
            client.get_text(&url).await?;
            let observed = CorrelationContext::current()
                .request_id()
                .unwrap_or_default()
                .to_string();
            Ok::<_, crate::client::ClientError>(observed)
        };
        (name.to_string(), call)
    });

    let report = fan_out(&state.executor, calls, state.demo.fanout_timeout).await;
    Json(report.to_json())
}

/// `GET /api/context`: the ambient correlation context as a JSON object.
pub async fn context_handler() -> Json<CorrelationContext> {
    Json(CorrelationContext::current())
}
