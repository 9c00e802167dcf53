//! Built-in resolvers.
//!
//! | Parameter type | Resolves to | Fails with |
//! |---|---|---|
//! | [`Request`] | the whole request context | never |
//! | [`Body<T>`] | JSON body as `T` | `400`, `415` |
//! | [`RawBody`] | body bytes | never |
//! | [`Path<T>`] | path parameters as `T` | `400` |
//! | [`Params`] | path parameters as a map | never |
//! | [`Query<T>`] | query string as `T` | `400` |
//! | [`Header<N>`] | header named by `N` | `400` |
//! | [`Extension<T>`] | value middleware stored | `500` |
//!
//! Authentication lives in [`crate::auth`], DTO-scrubbed bodies in
//! [`crate::dto`].

use std::collections::HashMap;
use std::marker::PhantomData;
use std::ops::Deref;

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::{HttpError, fatal};
use crate::injector::{Inject, InjectionContext, Rejection};
use crate::request::Request;

/// The request context. Always resolves, to a clone of the request as seen
/// at this point of the pipeline (including extensions added by earlier
/// resolvers).
#[async_trait]
impl Inject for Request {
    async fn inject(cx: &mut InjectionContext) -> Result<Self, Rejection> {
        Ok(cx.request().clone())
    }
}

// ── Body ──────────────────────────────────────────────────────────────────────

/// JSON request body deserialized into `T`.
#[derive(Debug, Clone, PartialEq)]
pub struct Body<T>(pub T);

impl<T> Deref for Body<T> {
    type Target = T;
    fn deref(&self) -> &T { &self.0 }
}

/// Checks content type and emptiness, then parses the body as `T`.
pub(crate) fn json_body<T: DeserializeOwned>(req: &Request) -> Result<T, HttpError> {
    if let Some(content_type) = req.header("content-type") {
        if !content_type.contains("json") {
            return Err(HttpError::new(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                format!("expected a JSON body, got `{content_type}`"),
            ));
        }
    }
    if req.body().is_empty() {
        return Err(HttpError::bad_request("missing request body"));
    }
    serde_json::from_slice(req.body())
        .map_err(|e| HttpError::bad_request(format!("invalid request body: {e}")))
}

#[async_trait]
impl<T: DeserializeOwned + Send + 'static> Inject for Body<T> {
    async fn inject(cx: &mut InjectionContext) -> Result<Self, Rejection> {
        Ok(Body(json_body(cx.request())?))
    }
}

/// Raw body bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBody(pub Bytes);

#[async_trait]
impl Inject for RawBody {
    async fn inject(cx: &mut InjectionContext) -> Result<Self, Rejection> {
        Ok(RawBody(cx.request().body().clone()))
    }
}

// ── Path parameters ───────────────────────────────────────────────────────────

/// Path parameters deserialized into `T`.
///
/// `T` is a struct whose fields are the parameter names:
///
/// ```rust
/// use restkit::injectables::Path;
///
/// #[derive(serde::Deserialize)]
/// struct PostId { user: String, post: u64 }
///
/// // GET /users/{user}/posts/{post}
/// async fn show(Path(id): Path<PostId>) -> String {
///     format!("{}#{}", id.user, id.post)
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Path<T>(pub T);

impl<T> Deref for Path<T> {
    type Target = T;
    fn deref(&self) -> &T { &self.0 }
}

#[async_trait]
impl<T: DeserializeOwned + Send + 'static> Inject for Path<T> {
    async fn inject(cx: &mut InjectionContext) -> Result<Self, Rejection> {
        // Parameters are plain strings; form decoding gives us number and
        // bool parsing for free.
        let encoded = serde_urlencoded::to_string(cx.request().params())
            .map_err(|e| fatal(format!("path parameters not encodable: {e}")))?;
        serde_urlencoded::from_str(&encoded)
            .map(Path)
            .map_err(|e| HttpError::bad_request(format!("invalid path parameter: {e}")).into())
    }
}

/// Every path parameter, by name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Params(pub HashMap<String, String>);

impl Params {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

#[async_trait]
impl Inject for Params {
    async fn inject(cx: &mut InjectionContext) -> Result<Self, Rejection> {
        Ok(Params(cx.request().params().clone()))
    }
}

// ── Query ─────────────────────────────────────────────────────────────────────

/// The query string deserialized into `T`. An absent query string is parsed
/// as empty, so `T` with all-optional fields always resolves.
#[derive(Debug, Clone, PartialEq)]
pub struct Query<T>(pub T);

impl<T> Deref for Query<T> {
    type Target = T;
    fn deref(&self) -> &T { &self.0 }
}

#[async_trait]
impl<T: DeserializeOwned + Send + 'static> Inject for Query<T> {
    async fn inject(cx: &mut InjectionContext) -> Result<Self, Rejection> {
        serde_urlencoded::from_str(cx.request().query().unwrap_or_default())
            .map(Query)
            .map_err(|e| HttpError::bad_request(format!("invalid query string: {e}")).into())
    }
}

// ── Header ────────────────────────────────────────────────────────────────────

/// Names the header a [`Header`] injection reads.
pub trait HeaderKey: Send + 'static {
    const NAME: &'static str;
}

/// A required request header.
///
/// ```rust
/// use restkit::injectables::{Header, HeaderKey};
///
/// struct TenantId;
/// impl HeaderKey for TenantId {
///     const NAME: &'static str = "x-tenant-id";
/// }
///
/// async fn list(tenant: Header<TenantId>) -> String {
///     format!("tenant {}", tenant.value())
/// }
/// ```
pub struct Header<N>(String, PhantomData<N>);

impl<N> Header<N> {
    pub fn value(&self) -> &str { &self.0 }
    pub fn into_inner(self) -> String { self.0 }
}

#[async_trait]
impl<N: HeaderKey> Inject for Header<N> {
    async fn inject(cx: &mut InjectionContext) -> Result<Self, Rejection> {
        cx.request()
            .header(N::NAME)
            .map(|v| Header(v.to_owned(), PhantomData))
            .ok_or_else(|| HttpError::bad_request(format!("missing header `{}`", N::NAME)).into())
    }
}

// ── Extension ─────────────────────────────────────────────────────────────────

/// A value that middleware (or an earlier resolver) put in the request
/// extensions. Missing means the application was wired wrong: `500`.
#[derive(Debug, Clone, PartialEq)]
pub struct Extension<T>(pub T);

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Inject for Extension<T> {
    async fn inject(cx: &mut InjectionContext) -> Result<Self, Rejection> {
        cx.request()
            .extensions()
            .get::<T>()
            .cloned()
            .map(Extension)
            .ok_or_else(|| {
                fatal(format!("no `{}` in request extensions", std::any::type_name::<T>())).into()
            })
    }
}
