//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the right place for
//! cross-cutting concerns: structured tracing, request-id propagation,
//! header inspection. Each middleware receives the request and a [`Next`]
//! handle to the rest of the chain; it may rewrite the request, run `next`,
//! rewrite the response, or answer directly without calling `next` at all.
//!
//! Order: router-wide middleware in registration order, then middleware of
//! the nested router a route came from, then the endpoint.
//!
//! ```rust
//! use restkit::middleware::{self, Next};
//! use restkit::{Request, Response, Router, StatusCode};
//!
//! async fn maintenance(req: Request, next: Next) -> Response {
//!     if req.header("x-maintenance").is_some() {
//!         return Response::status(StatusCode::SERVICE_UNAVAILABLE);
//!     }
//!     next.run(req).await
//! }
//!
//! let app = Router::new()
//!     .layer(middleware::Trace)
//!     .layer(middleware::from_fn(maintenance));
//! ```

mod request_id;
mod trace;

pub use request_id::{RequestId, RequestIdLayer};
pub use trace::Trace;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::handler::Endpoint;
use crate::injector::Injector;
use crate::request::Request;
use crate::response::Response;

/// Request/response interceptor.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, req: Request, next: Next) -> Response;
}

/// What sits at the end of a chain.
pub(crate) enum Target {
    Endpoint(Endpoint),
    /// Routing already decided the answer (404, 405); the router-wide
    /// middleware still runs around it.
    Fixed(Response),
}

/// The remainder of a middleware chain.
pub struct Next {
    outer: Arc<[Arc<dyn Middleware>]>,
    position: usize,
    target: Target,
    injector: Arc<Injector>,
}

impl Next {
    pub(crate) fn new(
        outer: Arc<[Arc<dyn Middleware>]>,
        target: Target,
        injector: Arc<Injector>,
    ) -> Self {
        Self { outer, position: 0, target, injector }
    }

    /// Runs the rest of the chain.
    pub async fn run(mut self, req: Request) -> Response {
        let layer = if self.position < self.outer.len() {
            Some(Arc::clone(&self.outer[self.position]))
        } else if let Target::Endpoint(endpoint) = &self.target {
            endpoint.layers.get(self.position - self.outer.len()).cloned()
        } else {
            None
        };

        match layer {
            Some(layer) => {
                self.position += 1;
                layer.handle(req, self).await
            }
            None => match self.target {
                Target::Endpoint(endpoint) => self.injector.dispatch(&endpoint, req).await,
                Target::Fixed(resp) => resp,
            },
        }
    }
}

// ── from_fn ───────────────────────────────────────────────────────────────────

/// Adapts an `async fn(Request, Next) -> Response` into a [`Middleware`].
pub fn from_fn<F, Fut>(f: F) -> FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    FromFn(f)
}

/// See [`from_fn`].
pub struct FromFn<F>(F);

#[async_trait]
impl<F, Fut> Middleware for FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    async fn handle(&self, req: Request, next: Next) -> Response {
        (self.0)(req, next).await
    }
}
