//! Minimal restkit example: authenticated CRUD-style JSON endpoints, DTO
//! scrubbing, middleware and health checks.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl -H 'authorization: Bearer demo' http://localhost:3000/users/42
//!   curl -X POST http://localhost:3000/users \
//!        -H 'authorization: Bearer demo' \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice","password":"correct horse","id":1000}'
//!   curl -X DELETE -H 'authorization: Bearer admin' http://localhost:3000/users/42
//!   curl http://localhost:3000/healthz

use restkit::auth::{self, Auth, AuthError, AuthRegistry, Scheme};
use restkit::dto::{Dto, DtoBody, Field, Scrubbed};
use restkit::injectables::{Extension, Path};
use restkit::middleware::{self, RequestId, RequestIdLayer};
use restkit::{Config, Request, Router, Server, StatusCode, health};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug)]
struct Caller {
    name: String,
}

struct AdminToken;

impl Scheme for AdminToken {
    const NAME: Option<&'static str> = Some("admin");
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct User {
    id: u64,
    name: String,
    password: String,
    created_by: String,
}

impl Dto for User {
    const FIELDS: &'static [Field] = &[
        Field::out("id"),
        Field::both("name").required().max_len(64),
        Field::input("password").required().min_len(8),
        Field::out("created_by").rename("createdBy"),
    ];
}

#[derive(Deserialize)]
struct UserId {
    id: u64,
}

#[tokio::main]
async fn main() -> Result<(), restkit::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let auth = AuthRegistry::new()
        .register("bearer", auth::from_fn(bearer))
        .register("admin", auth::from_fn(admin));

    let users = Router::new()
        .get("/{id}", get_user)
        .post("/", create_user)
        .delete("/{id}", delete_user);

    let app = Router::new()
        .auth(auth)
        .layer(middleware::Trace)
        .layer(RequestIdLayer)
        .get("/healthz", health::liveness)
        .get("/readyz", health::readiness)
        .nest("/users", users);

    for route in app.routes() {
        tracing::debug!(method = %route.method, path = %route.path, injections = route.injections.len(), "route");
    }

    let config = Config::from_env()?;
    Server::from_config(&config)?.serve(app).await
}

async fn bearer(req: Request) -> Result<Caller, AuthError> {
    match req.header("authorization").and_then(|v| v.strip_prefix("Bearer ")) {
        Some(token) if !token.is_empty() => Ok(Caller { name: token.to_owned() }),
        _ => Err(AuthError::Denied("missing bearer token".into())),
    }
}

async fn admin(req: Request) -> Result<Caller, AuthError> {
    match req.header("authorization") {
        Some("Bearer admin") => Ok(Caller { name: "admin".into() }),
        _ => Err(AuthError::Denied("admin token required".into())),
    }
}

// GET /users/{id}
async fn get_user(Auth(caller, _): Auth<Caller>, Path(user): Path<UserId>) -> Scrubbed<User> {
    Scrubbed(User {
        id: user.id,
        name: "alice".into(),
        password: "never leaves the server".into(),
        created_by: caller.name,
    })
}

// POST /users
//
// `id` in the body is ignored: it is not an incoming field of `User`.
async fn create_user(
    Auth(caller, _): Auth<Caller>,
    Extension(request_id): Extension<RequestId>,
    DtoBody(user): DtoBody<User>,
) -> (StatusCode, Scrubbed<User>) {
    tracing::info!(request_id = %request_id.0, name = %user.name, "creating user");
    (StatusCode::CREATED, Scrubbed(User { id: 99, created_by: caller.name, ..user }))
}

// DELETE /users/{id} → 204 No Content
async fn delete_user(_admin: Auth<Caller, AdminToken>, Path(_user): Path<UserId>) -> StatusCode {
    StatusCode::NO_CONTENT
}
