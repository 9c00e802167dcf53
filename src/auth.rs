//! Authentication handlers and the [`Auth`] injectable.
//!
//! An auth handler looks at a request and either produces a *principal* (the
//! authenticated user, API client, service account…) or refuses. Handlers are
//! registered by name in an [`AuthRegistry`]; one of them is the default.
//! Handlers that ask for [`Auth<T>`] run the default handler before the
//! handler body; [`Auth<T, S>`] picks the handler named by the scheme `S`.
//!
//! ```rust
//! use restkit::auth::{self, AuthError, AuthRegistry};
//! use restkit::Request;
//!
//! #[derive(Clone)]
//! struct User { name: String }
//!
//! async fn bearer(req: Request) -> Result<User, AuthError> {
//!     match req.header("authorization") {
//!         Some("Bearer letmein") => Ok(User { name: "alice".into() }),
//!         _ => Err(AuthError::Denied("invalid token".into())),
//!     }
//! }
//!
//! let registry = AuthRegistry::new().register("bearer", auth::from_fn(bearer));
//! assert!(registry.default_handler().is_some());
//! ```
//!
//! Failure mapping:
//!
//! | Handler outcome | Response |
//! |---|---|
//! | `AuthError::Denied(msg)` | `401` with `msg` |
//! | `AuthError::Respond(resp)` | `resp`, unchanged |
//! | `AuthError::Fatal(msg)` | `500` |
//! | no handler registered | `500` |

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{HttpError, fatal};
use crate::injector::{Inject, InjectionContext, Rejection};
use crate::request::Request;
use crate::response::Response;

// ── Principal ─────────────────────────────────────────────────────────────────

/// The value an auth handler produced, with its concrete type erased.
#[derive(Clone)]
pub struct Principal(Arc<dyn Any + Send + Sync>);

impl Principal {
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Principal(..)")
    }
}

/// Stored in the request extensions after a successful authentication.
///
/// Resolvers later in the same handler's parameter list can read it through
/// [`Extension<AuthContext>`](crate::injectables::Extension). Middleware has
/// already run by then and never sees it.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub handler: String,
    pub principal: Principal,
}

// ── AuthHandler ───────────────────────────────────────────────────────────────

/// Why an auth handler refused a request.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Credentials missing or wrong. Becomes `401 Unauthorized`.
    #[error("denied: {0}")]
    Denied(String),
    /// Send this response instead.
    #[error("responded with {}", .0.status_code())]
    Respond(Response),
    /// The handler itself broke. Becomes `500 Internal Server Error`.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl From<AuthError> for Rejection {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Denied(msg) => HttpError::unauthorized(msg).into(),
            AuthError::Respond(resp) => Rejection::Response(resp),
            AuthError::Fatal(msg) => fatal(msg).into(),
        }
    }
}

/// Authenticates a request.
#[async_trait]
pub trait AuthHandler: Send + Sync + 'static {
    async fn authenticate(&self, request: Request) -> Result<Principal, AuthError>;
}

/// Adapts an async function into an [`AuthHandler`].
pub fn from_fn<F, Fut, T>(f: F) -> FromFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, AuthError>> + Send + 'static,
    T: Send + Sync + 'static,
{
    FromFn(f)
}

/// See [`from_fn`].
pub struct FromFn<F>(F);

#[async_trait]
impl<F, Fut, T> AuthHandler for FromFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, AuthError>> + Send + 'static,
    T: Send + Sync + 'static,
{
    async fn authenticate(&self, request: Request) -> Result<Principal, AuthError> {
        (self.0)(request).await.map(Principal::new)
    }
}

// ── AuthRegistry ──────────────────────────────────────────────────────────────

/// Named auth handlers plus the default.
///
/// Registering twice under the same name replaces the earlier handler. The
/// first handler registered becomes the default unless another one is
/// registered with [`register_default`](Self::register_default).
#[derive(Clone, Default)]
pub struct AuthRegistry {
    handlers: HashMap<String, Arc<dyn AuthHandler>>,
    default: Option<String>,
}

impl AuthRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn register(mut self, name: impl Into<String>, handler: impl AuthHandler) -> Self {
        let name = name.into();
        if self.handlers.insert(name.clone(), Arc::new(handler)).is_some() {
            debug!(handler = %name, "auth handler replaced");
        }
        if self.default.is_none() {
            self.default = Some(name);
        }
        self
    }

    /// Registers `handler` and makes it the default.
    pub fn register_default(mut self, name: impl Into<String>, handler: impl AuthHandler) -> Self {
        let name = name.into();
        self = self.register(name.clone(), handler);
        self.default = Some(name);
        self
    }

    pub fn handler(&self, name: &str) -> Option<Arc<dyn AuthHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn default_handler(&self) -> Option<Arc<dyn AuthHandler>> {
        self.default.as_deref().and_then(|name| self.handler(name))
    }

    pub fn default_name(&self) -> Option<&str> { self.default.as_deref() }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Runs the handler `name`, or the default when `name` is `None`.
    pub async fn authenticate(
        &self,
        name: Option<&str>,
        request: Request,
    ) -> Result<AuthContext, Rejection> {
        let Some(handler_name) = name.or(self.default.as_deref()) else {
            return Err(fatal("no default auth handler registered").into());
        };
        let Some(handler) = self.handler(handler_name) else {
            return Err(fatal(format!("no auth handler registered as `{handler_name}`")).into());
        };

        let principal = handler.authenticate(request).await?;
        debug!(handler = handler_name, "request authenticated");
        Ok(AuthContext { handler: handler_name.to_owned(), principal })
    }
}

// ── Auth injectable ───────────────────────────────────────────────────────────

/// Selects which registered auth handler an [`Auth`] injection runs.
pub trait Scheme: Send + 'static {
    /// Handler name; `None` means the registry default.
    const NAME: Option<&'static str>;
}

/// The registry's default handler.
pub struct DefaultScheme;

impl Scheme for DefaultScheme {
    const NAME: Option<&'static str> = None;
}

/// The authenticated principal of type `T`, produced by the handler that `S`
/// selects.
///
/// ```rust
/// use restkit::auth::{Auth, Scheme};
///
/// #[derive(Clone)]
/// struct Admin { id: u64 }
///
/// struct AdminToken;
/// impl Scheme for AdminToken {
///     const NAME: Option<&'static str> = Some("admin-token");
/// }
///
/// async fn purge(Auth(admin, _): Auth<Admin, AdminToken>) -> String {
///     format!("purged by {}", admin.id)
/// }
/// ```
pub struct Auth<T, S = DefaultScheme>(pub T, pub PhantomData<S>);

impl<T, S> Auth<T, S> {
    pub fn into_inner(self) -> T { self.0 }
}

impl<T, S> Deref for Auth<T, S> {
    type Target = T;
    fn deref(&self) -> &T { &self.0 }
}

#[async_trait]
impl<T, S> Inject for Auth<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: Scheme,
{
    async fn inject(cx: &mut InjectionContext) -> Result<Self, Rejection> {
        let registry = cx
            .auth_registry()
            .cloned()
            .ok_or_else(|| fatal("route requires authentication but no auth registry is attached"))?;

        let context = registry.authenticate(S::NAME, cx.request().clone()).await?;
        let value = context.principal.downcast_ref::<T>().cloned().ok_or_else(|| {
            fatal(format!(
                "auth handler `{}` did not produce a `{}`",
                context.handler,
                type_name::<T>(),
            ))
        })?;

        cx.request_mut().extensions_mut().insert(context);
        Ok(Auth(value, PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;
    use rstest::rstest;

    use super::*;
    use crate::injectables::Extension;
    use crate::injector::Injector;
    use crate::response::IntoResponse;

    #[derive(Clone, Debug, PartialEq)]
    struct User(String);

    struct Admin;
    impl Scheme for Admin {
        const NAME: Option<&'static str> = Some("admin");
    }

    async fn token(req: Request) -> Result<User, AuthError> {
        match req.header("authorization") {
            Some("Bearer alice") => Ok(User("alice".into())),
            Some("Bearer broken") => Err(AuthError::Fatal("token store offline".into())),
            Some(_) => Err(AuthError::Denied("unknown token".into())),
            None => Err(AuthError::Respond(
                Response::builder()
                    .status(StatusCode::UNAUTHORIZED)
                    .header("www-authenticate", "Bearer")
                    .no_body(),
            )),
        }
    }

    async fn admin(_req: Request) -> Result<User, AuthError> {
        Ok(User("root".into()))
    }

    async fn wrong_type(_req: Request) -> Result<u32, AuthError> {
        Ok(7)
    }

    fn registry() -> AuthRegistry {
        AuthRegistry::new()
            .register("token", from_fn(token))
            .register("admin", from_fn(admin))
            .register("numeric", from_fn(wrong_type))
    }

    fn request(auth: Option<&str>) -> Request {
        let mut builder = http::Request::builder();
        if let Some(value) = auth {
            builder = builder.header("authorization", value);
        }
        Request::from_http(builder.body(Bytes::new()).unwrap())
    }

    #[test]
    fn first_registration_is_default_and_last_wins() {
        let registry = registry().register("admin", from_fn(token));
        assert_eq!(registry.default_name(), Some("token"));

        let registry = registry.register_default("admin", from_fn(admin));
        assert_eq!(registry.default_name(), Some("admin"));
        assert_eq!(registry.names().count(), 3);
    }

    #[tokio::test]
    async fn default_handler_produces_principal() {
        let injector = Injector::new().with_auth(registry());
        let Auth(user, _) = injector
            .resolve::<Auth<User>>(request(Some("Bearer alice")))
            .await
            .unwrap();
        assert_eq!(user, User("alice".into()));
    }

    #[tokio::test]
    async fn named_scheme_selects_handler() {
        let injector = Injector::new().with_auth(registry());
        let Auth(user, _) = injector.resolve::<Auth<User, Admin>>(request(None)).await.unwrap();
        assert_eq!(user, User("root".into()));
    }

    #[rstest]
    #[case(Some("Bearer mallory"), StatusCode::UNAUTHORIZED)]
    #[case(Some("Bearer broken"), StatusCode::INTERNAL_SERVER_ERROR)]
    #[tokio::test]
    async fn failures_map_to_status(#[case] header: Option<&str>, #[case] expected: StatusCode) {
        let injector = Injector::new().with_auth(registry());
        let err = injector.resolve::<Auth<User>>(request(header)).await.err().unwrap();
        assert_eq!(err.status(), expected);
    }

    #[tokio::test]
    async fn respond_is_forwarded_unchanged() {
        let injector = Injector::new().with_auth(registry());
        let resp = injector
            .resolve::<Auth<User>>(request(None))
            .await
            .err()
            .unwrap()
            .into_response();
        assert_eq!(resp.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(resp.header("www-authenticate"), Some("Bearer"));
    }

    #[tokio::test]
    async fn missing_registry_or_handler_is_fatal() {
        let err = Injector::new().resolve::<Auth<User>>(request(None)).await.err().unwrap();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let injector = Injector::new().with_auth(AuthRegistry::new());
        let err = injector.resolve::<Auth<User>>(request(None)).await.err().unwrap();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn principal_type_mismatch_is_fatal() {
        struct Numeric;
        impl Scheme for Numeric {
            const NAME: Option<&'static str> = Some("numeric");
        }

        let injector = Injector::new().with_auth(registry());
        let err = injector.resolve::<Auth<User, Numeric>>(request(None)).await.err().unwrap();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn auth_context_is_visible_to_later_injections() {
        let injector = Injector::new().with_auth(registry());
        let resp = injector
            .run(
                |_: Auth<User>, Extension(cx): Extension<AuthContext>| async move { cx.handler },
                request(Some("Bearer alice")),
            )
            .await;
        assert_eq!(resp.body(), b"token");
    }
}
