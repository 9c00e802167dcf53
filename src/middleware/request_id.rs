//! Request-id propagation.

use async_trait::async_trait;
use http::HeaderValue;
use uuid::Uuid;

use super::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

const HEADER: &str = "x-request-id";

/// The id of the current request, readable through
/// [`Extension<RequestId>`](crate::injectables::Extension).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Reuses the caller's `x-request-id` or generates a UUIDv4, stores it in
/// the request extensions and echoes it on the response.
pub struct RequestIdLayer;

#[async_trait]
impl Middleware for RequestIdLayer {
    async fn handle(&self, mut req: Request, next: Next) -> Response {
        let id = req
            .header(HEADER)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        req.extensions_mut().insert(RequestId(id.clone()));
        let mut resp = next.run(req).await;

        if let Ok(value) = HeaderValue::from_str(&id) {
            resp.headers_mut().insert(HEADER, value);
        }
        resp
    }
}
