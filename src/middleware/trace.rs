//! Per-request tracing span.

use std::time::Instant;

use async_trait::async_trait;
use tracing::{Instrument, info, info_span, warn};

use super::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// Wraps each request in an `http.request` span carrying method and path,
/// and logs status and latency when the response is ready. `5xx` responses
/// are logged at `warn`.
pub struct Trace;

#[async_trait]
impl Middleware for Trace {
    async fn handle(&self, req: Request, next: Next) -> Response {
        let span = info_span!("http.request", method = %req.method(), path = %req.path());
        async move {
            let start = Instant::now();
            let resp = next.run(req).await;
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
            let status = resp.status_code().as_u16();

            if resp.status_code().is_server_error() {
                warn!(status, latency_ms, "request failed");
            } else {
                info!(status, latency_ms, "request completed");
            }
            resp
        }
        .instrument(span)
        .await
    }
}
