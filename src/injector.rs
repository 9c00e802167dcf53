//! The argument-injection pipeline.
//!
//! Every handler parameter is an *injection*: its type names the resolver
//! ([`Inject`] implementation) and its position is its index. When a request
//! reaches an endpoint the [`Injector`] resolves the injections one at a
//! time, in index order, against a shared [`InjectionContext`]. The first
//! resolver to fail short-circuits the pipeline: later resolvers and the
//! handler never run, and the [`Rejection`] becomes the response.
//!
//! ```text
//! async fn update(Auth(user, _): Auth<User>, id: Path<Id>, body: Body<Patch>)
//!                 └─ index 0 ─────────────┘  └─ index 1 ─┘  └─ index 2 ───┘
//! ```
//!
//! Resolvers run sequentially, so an earlier resolver may leave values in the
//! request extensions for a later one. [`Auth`](crate::auth::Auth) stores the
//! authenticated principal this way.

use std::any::type_name;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use tracing::{debug, trace};

use crate::auth::AuthRegistry;
use crate::error::HttpError;
use crate::handler::{Endpoint, Handler};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

// ── Rejection ─────────────────────────────────────────────────────────────────

/// Why a resolver refused to produce its value.
///
/// Either a status-plus-message error, or a complete response to forward to
/// the client as-is (an auth handler that wants to set `www-authenticate`,
/// for instance).
#[derive(Debug)]
pub enum Rejection {
    Error(HttpError),
    Response(Response),
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Error(e) => e.status(),
            Self::Response(r) => r.status_code(),
        }
    }
}

impl From<HttpError> for Rejection {
    fn from(e: HttpError) -> Self { Self::Error(e) }
}

impl From<Response> for Rejection {
    fn from(r: Response) -> Self { Self::Response(r) }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        match self {
            Self::Error(e) => e.into_response(),
            Self::Response(r) => r,
        }
    }
}

// ── Inject ────────────────────────────────────────────────────────────────────

/// What a resolver sees: the request, and the shared registries.
pub struct InjectionContext {
    request: Request,
    auth: Option<Arc<AuthRegistry>>,
}

impl InjectionContext {
    pub fn new(request: Request) -> Self {
        Self { request, auth: None }
    }

    pub fn request(&self) -> &Request { &self.request }
    pub fn request_mut(&mut self) -> &mut Request { &mut self.request }
    pub fn auth_registry(&self) -> Option<&Arc<AuthRegistry>> { self.auth.as_ref() }
}

/// A type that can be resolved as a handler argument.
///
/// Implement it on your own types to plug in new resolvers:
///
/// ```rust
/// use restkit::{Inject, InjectionContext, Rejection, HttpError};
///
/// struct ApiVersion(u32);
///
/// #[async_trait::async_trait]
/// impl Inject for ApiVersion {
///     async fn inject(cx: &mut InjectionContext) -> Result<Self, Rejection> {
///         cx.request()
///             .header("x-api-version")
///             .and_then(|v| v.parse().ok())
///             .map(ApiVersion)
///             .ok_or_else(|| HttpError::bad_request("missing x-api-version").into())
///     }
/// }
/// ```
#[async_trait]
pub trait Inject: Sized + Send + 'static {
    async fn inject(cx: &mut InjectionContext) -> Result<Self, Rejection>;
}

/// Optional injection: a rejection becomes `None`.
#[async_trait]
impl<T: Inject> Inject for Option<T> {
    async fn inject(cx: &mut InjectionContext) -> Result<Self, Rejection> {
        Ok(T::inject(cx).await.ok())
    }
}

/// Hands the rejection to the handler instead of short-circuiting.
#[async_trait]
impl<T: Inject> Inject for Result<T, Rejection> {
    async fn inject(cx: &mut InjectionContext) -> Result<Self, Rejection> {
        Ok(T::inject(cx).await)
    }
}

/// One registered injection of an endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Injection {
    pub index: usize,
    pub resolver: &'static str,
}

/// Resolves injection `index` with resolver `T`, logging the outcome.
#[doc(hidden)]
pub async fn resolve<T: Inject>(cx: &mut InjectionContext, index: usize) -> Result<T, Rejection> {
    let resolver = type_name::<T>();
    trace!(index, resolver, "resolving injection");
    let out = T::inject(cx).await;
    if let Err(rejection) = &out {
        debug!(index, resolver, status = %rejection.status(), "injection rejected");
    }
    out
}

// ── Injector ──────────────────────────────────────────────────────────────────

/// Runs handlers by resolving their injections against a request.
///
/// Holds the registries resolvers consult. The router owns one and shares it
/// with every request.
#[derive(Clone, Default)]
pub struct Injector {
    auth: Option<Arc<AuthRegistry>>,
}

impl Injector {
    pub fn new() -> Self { Self::default() }

    pub fn with_auth(mut self, registry: AuthRegistry) -> Self {
        self.auth = Some(Arc::new(registry));
        self
    }

    pub fn auth(&self) -> Option<&AuthRegistry> { self.auth.as_deref() }

    pub fn context(&self, request: Request) -> InjectionContext {
        InjectionContext { request, auth: self.auth.clone() }
    }

    /// Resolves every injection of `handler` in order and calls it.
    pub async fn run<H, Args>(&self, handler: H, request: Request) -> Response
    where
        H: Handler<Args>,
        Args: 'static,
    {
        handler.call(self.context(request)).await
    }

    /// Resolves a single value, outside any handler.
    pub async fn resolve<T: Inject>(&self, request: Request) -> Result<T, Rejection> {
        resolve::<T>(&mut self.context(request), 0).await
    }

    pub(crate) async fn dispatch(&self, endpoint: &Endpoint, request: Request) -> Response {
        endpoint.call(self.context(request)).await
    }
}
