//! Radix-tree request router.
//!
//! One tree per HTTP method, O(path-length) lookup. Routers nest: a resource
//! router built on its own (with its own middleware) can be mounted under a
//! prefix of the application router.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::header::ALLOW;
use http::{HeaderValue, Method, StatusCode};
use http_body_util::Full;
use matchit::Router as MatchitRouter;
use percent_encoding::percent_decode_str;

use crate::auth::AuthRegistry;
use crate::error::HttpError;
use crate::handler::{Endpoint, Handler};
use crate::injector::{Injection, Injector};
use crate::middleware::{Middleware, Next, Target};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// One row of [`Router::routes`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteInfo {
    pub method: Method,
    pub path: String,
    pub injections: Vec<Injection>,
}

/// The application router.
///
/// Build it once at startup and pass it to [`Server::serve`](crate::Server::serve).
/// Every builder method returns `self` so registrations chain naturally.
///
/// ```rust
/// use restkit::{Router, injectables::Path};
///
/// #[derive(serde::Deserialize)]
/// struct Id { id: u64 }
///
/// async fn show(Path(id): Path<Id>) -> String { format!("user {}", id.id) }
/// async fn list() -> &'static str { "[]" }
///
/// let users = Router::new()
///     .get("/", list)
///     .get("/{id}", show);
///
/// let app = Router::new().nest("/users", users);
/// ```
pub struct Router {
    trees: HashMap<Method, MatchitRouter<Endpoint>>,
    table: Vec<(Method, String, Endpoint)>,
    layers: Arc<[Arc<dyn Middleware>]>,
    injector: Arc<Injector>,
}

/// Outcome of matching a method + path.
enum Lookup {
    Found(Endpoint, HashMap<String, String>),
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

impl Router {
    pub fn new() -> Self {
        Self {
            trees: HashMap::new(),
            table: Vec::new(),
            layers: Vec::new().into(),
            injector: Arc::new(Injector::new()),
        }
    }

    /// Registers a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `{*rest}` is a catch-all.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid pattern or conflicts with a route
    /// already registered for `method`.
    pub fn on<H, T>(self, method: Method, path: &str, handler: H) -> Self
    where
        H: Handler<T>,
        T: 'static,
    {
        self.add(method, path, Endpoint::new(handler))
    }

    pub fn get<H: Handler<T>, T: 'static>(self, path: &str, handler: H) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post<H: Handler<T>, T: 'static>(self, path: &str, handler: H) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put<H: Handler<T>, T: 'static>(self, path: &str, handler: H) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn patch<H: Handler<T>, T: 'static>(self, path: &str, handler: H) -> Self {
        self.on(Method::PATCH, path, handler)
    }

    pub fn delete<H: Handler<T>, T: 'static>(self, path: &str, handler: H) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    /// Adds router-wide middleware. Runs for every request this router
    /// answers, including 404 and 405, in registration order.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        let mut layers = self.layers.to_vec();
        layers.push(Arc::new(middleware));
        self.layers = layers.into();
        self
    }

    /// Attaches the auth registry that [`Auth`](crate::auth::Auth)
    /// injections consult.
    pub fn auth(mut self, registry: AuthRegistry) -> Self {
        self.injector = Arc::new(Injector::new().with_auth(registry));
        self
    }

    /// Mounts every route of `other` under `prefix`.
    ///
    /// `other`'s middleware wraps only its own routes and runs after this
    /// router's middleware. If this router has no auth registry yet it
    /// adopts `other`'s.
    pub fn nest(mut self, prefix: &str, other: Router) -> Self {
        let prefix = prefix.trim_end_matches('/');
        if self.injector.auth().is_none() && other.injector.auth().is_some() {
            self.injector = other.injector;
        }
        for (method, path, endpoint) in other.table {
            let full = match path.as_str() {
                "/" if !prefix.is_empty() => prefix.to_owned(),
                _ => format!("{prefix}{path}"),
            };
            self = self.add(method, &full, endpoint.wrapped(&other.layers));
        }
        self
    }

    /// Every registered route, in registration order.
    pub fn routes(&self) -> Vec<RouteInfo> {
        self.table
            .iter()
            .map(|(method, path, endpoint)| RouteInfo {
                method: method.clone(),
                path: path.clone(),
                injections: endpoint.injections().to_vec(),
            })
            .collect()
    }

    fn add(mut self, method: Method, path: &str, endpoint: Endpoint) -> Self {
        self.trees
            .entry(method.clone())
            .or_default()
            .insert(path, endpoint.clone())
            .unwrap_or_else(|e| panic!("invalid route `{method} {path}`: {e}"));
        self.table.push((method, path.to_owned(), endpoint));
        self
    }

    fn lookup(&self, method: &Method, path: &str) -> Lookup {
        if let Some(matched) = self.trees.get(method).and_then(|tree| tree.at(path).ok()) {
            let params = matched.params.iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect();
            return Lookup::Found(matched.value.clone(), params);
        }

        let mut allowed: Vec<Method> = self.trees.iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(m, _)| m.clone())
            .collect();
        if allowed.is_empty() {
            return Lookup::NotFound;
        }
        allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Lookup::MethodNotAllowed(allowed)
    }

    /// Routes one request through middleware, injection and handler.
    pub async fn handle(&self, mut req: Request) -> Response {
        let target = match self.lookup(req.method(), req.path()) {
            Lookup::Found(endpoint, params) => match decode_params(params) {
                Ok(params) => {
                    req.params = params;
                    Target::Endpoint(endpoint)
                }
                Err(e) => Target::Fixed(e.into_response()),
            },
            Lookup::MethodNotAllowed(allowed) => Target::Fixed(method_not_allowed(&allowed)),
            Lookup::NotFound => Target::Fixed(
                HttpError::not_found(format!("no route for {} {}", req.method(), req.path()))
                    .into_response(),
            ),
        };

        Next::new(Arc::clone(&self.layers), target, Arc::clone(&self.injector))
            .run(req)
            .await
    }

    /// Dispatches a buffered `http` request in-process.
    pub async fn oneshot(&self, req: http::Request<Bytes>) -> http::Response<Full<Bytes>> {
        self.handle(Request::from_http(req)).await.into_inner()
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

/// matchit hands back raw segments; handlers see decoded text.
fn decode_params(raw: HashMap<String, String>) -> Result<HashMap<String, String>, HttpError> {
    raw.into_iter()
        .map(|(name, value)| {
            let decoded = percent_decode_str(&value).decode_utf8().map_err(|_| {
                HttpError::bad_request(format!("path parameter `{name}` is not valid UTF-8"))
            })?;
            Ok((name, decoded.into_owned()))
        })
        .collect()
}

fn method_not_allowed(allowed: &[Method]) -> Response {
    let list = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
    let mut resp = HttpError::new(StatusCode::METHOD_NOT_ALLOWED, "method not allowed").into_response();
    if let Ok(value) = HeaderValue::from_str(&list) {
        resp.headers_mut().insert(ALLOW, value);
    }
    resp
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::auth::{self, Auth, AuthError};
    use crate::injectables::{Params, Path};
    use crate::middleware;

    async fn show(params: Params) -> String {
        format!("user {}", params.get("id").unwrap_or("?"))
    }

    async fn list() -> &'static str { "all" }

    fn request(method: Method, uri: &str) -> Request {
        Request::from_http(
            http::Request::builder().method(method).uri(uri).body(Bytes::new()).unwrap(),
        )
    }

    fn app() -> Router {
        Router::new()
            .get("/users", list)
            .get("/users/{id}", show)
            .delete("/users/{id}", || async { StatusCode::NO_CONTENT })
    }

    #[rstest]
    #[case(Method::GET, "/users", StatusCode::OK, "all")]
    #[case(Method::GET, "/users/42", StatusCode::OK, "user 42")]
    #[case(Method::DELETE, "/users/42", StatusCode::NO_CONTENT, "")]
    #[tokio::test]
    async fn dispatches_by_method_and_path(
        #[case] method: Method,
        #[case] uri: &str,
        #[case] status: StatusCode,
        #[case] body: &str,
    ) {
        let resp = app().handle(request(method, uri)).await;
        assert_eq!(resp.status_code(), status);
        assert_eq!(resp.body(), body.as_bytes());
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let resp = app().handle(request(Method::GET, "/nope")).await;
        assert_eq!(resp.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn wrong_method_is_405_with_allow() {
        let resp = app().handle(request(Method::POST, "/users/1")).await;
        assert_eq!(resp.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(resp.header("allow"), Some("DELETE, GET"));
    }

    #[tokio::test]
    async fn nested_routes_get_prefix_and_own_middleware() {
        let tag = middleware::from_fn(|req: Request, next: Next| async move {
            let mut resp = next.run(req).await;
            resp.headers_mut().insert("x-nested", HeaderValue::from_static("1"));
            resp
        });
        let users = Router::new().get("/", list).get("/{id}", show).layer(tag);
        let app = Router::new().get("/health", || async { "ok" }).nest("/api/users", users);

        let resp = app.handle(request(Method::GET, "/api/users")).await;
        assert_eq!(resp.body(), b"all");
        assert_eq!(resp.header("x-nested"), Some("1"));

        let resp = app.handle(request(Method::GET, "/api/users/7")).await;
        assert_eq!(resp.body(), b"user 7");

        let resp = app.handle(request(Method::GET, "/health")).await;
        assert!(resp.header("x-nested").is_none());
    }

    #[test]
    fn routes_lists_injections() {
        let routes = app().routes();
        assert_eq!(routes.len(), 3);
        assert_eq!(routes[1].path, "/users/{id}");
        assert_eq!(routes[1].injections.len(), 1);
        assert!(routes[1].injections[0].resolver.ends_with("Params"));
    }

    #[derive(serde::Deserialize)]
    struct Name {
        name: String,
    }

    #[rstest]
    #[case("/users/john%20doe", StatusCode::OK, "john doe")]
    #[case("/raw/j%C3%BCrgen", StatusCode::OK, "jürgen")]
    #[case("/raw/plain", StatusCode::OK, "plain")]
    #[tokio::test]
    async fn path_params_are_percent_decoded(
        #[case] uri: &str,
        #[case] status: StatusCode,
        #[case] body: &str,
    ) {
        let app = Router::new()
            .get("/users/{name}", |Path(n): Path<Name>| async move { n.name })
            .get("/raw/{name}", |params: Params| async move {
                params.get("name").unwrap_or_default().to_owned()
            });

        let resp = app.handle(request(Method::GET, uri)).await;
        assert_eq!(resp.status_code(), status);
        assert_eq!(resp.body(), body.as_bytes());
    }

    #[tokio::test]
    async fn undecodable_path_param_is_400() {
        let app = Router::new().get("/raw/{name}", |_: Params| async { "unreachable" });
        let resp = app.handle(request(Method::GET, "/raw/%FF%FE")).await;
        assert_eq!(resp.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn nest_adopts_inner_auth_registry() {
        async fn always(_req: Request) -> Result<String, AuthError> {
            Ok("inner".to_owned())
        }

        let inner = Router::new()
            .auth(AuthRegistry::new().register("inner", auth::from_fn(always)))
            .get("/me", |Auth(who, _): Auth<String>| async move { who });
        let app = Router::new().nest("/api", inner);

        assert_eq!(app.injector.auth().and_then(|r| r.default_name()), Some("inner"));
        let resp = app.handle(request(Method::GET, "/api/me")).await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert_eq!(resp.body(), b"inner");
    }

    #[tokio::test]
    async fn nest_keeps_outer_auth_registry() {
        async fn outer(_req: Request) -> Result<String, AuthError> { Ok("outer".to_owned()) }
        async fn inner(_req: Request) -> Result<String, AuthError> { Ok("inner".to_owned()) }

        let nested = Router::new()
            .auth(AuthRegistry::new().register("inner", auth::from_fn(inner)))
            .get("/me", |Auth(who, _): Auth<String>| async move { who });
        let app = Router::new()
            .auth(AuthRegistry::new().register("outer", auth::from_fn(outer)))
            .nest("/api", nested);

        let resp = app.handle(request(Method::GET, "/api/me")).await;
        assert_eq!(resp.body(), b"outer");
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn conflicting_route_panics() {
        let _ = Router::new().get("/a/{id}", list).get("/a/{name}", list);
    }
}
