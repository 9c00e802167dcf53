//! # restkit
//!
//! A REST API framework built around argument injection.
//!
//! Handlers are plain `async fn`s. Each parameter's type says how to obtain
//! it (the authenticated principal, the request context, a JSON body, a path
//! parameter) and the [`Injector`] resolves them in order before the handler
//! runs. A resolver that cannot produce its value answers the request itself
//! with the right HTTP error, so handler bodies only deal with the happy path.
//!
//! What's in the box:
//!
//! - Radix-tree routing via [`matchit`], with nested resource routers
//! - Argument injection with pluggable resolvers ([`Inject`])
//! - An authentication-handler registry ([`auth`])
//! - DTO-based request/response scrubbing ([`dto`])
//! - Middleware chaining ([`middleware`])
//! - A hyper server with graceful shutdown ([`Server`])
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use restkit::auth::{self, Auth, AuthError, AuthRegistry};
//! use restkit::dto::{Dto, DtoBody, Field, Scrubbed};
//! use restkit::injectables::Path;
//! use restkit::{Request, Router, Server, StatusCode, middleware};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone)]
//! struct User { id: u64 }
//!
//! #[derive(Default, Serialize, Deserialize)]
//! #[serde(default)]
//! struct Note { id: u64, owner: u64, text: String }
//!
//! impl Dto for Note {
//!     const FIELDS: &'static [Field] = &[Field::out("id"), Field::both("text")];
//! }
//!
//! #[derive(Deserialize)]
//! struct NoteId { id: u64 }
//!
//! async fn token(req: Request) -> Result<User, AuthError> {
//!     match req.header("authorization") {
//!         Some("Bearer demo") => Ok(User { id: 1 }),
//!         _ => Err(AuthError::Denied("bad token".into())),
//!     }
//! }
//!
//! async fn show(Auth(user, _): Auth<User>, Path(n): Path<NoteId>) -> Scrubbed<Note> {
//!     Scrubbed(Note { id: n.id, owner: user.id, text: "hello".into() })
//! }
//!
//! async fn create(Auth(user, _): Auth<User>, DtoBody(note): DtoBody<Note>) -> (StatusCode, Scrubbed<Note>) {
//!     (StatusCode::CREATED, Scrubbed(Note { owner: user.id, ..note }))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), restkit::Error> {
//!     let app = Router::new()
//!         .auth(AuthRegistry::new().register("token", auth::from_fn(token)))
//!         .layer(middleware::Trace)
//!         .get("/notes/{id}", show)
//!         .post("/notes", create);
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//! ```

mod config;
mod error;
mod handler;
mod injector;
mod request;
mod response;
mod router;
mod server;

pub mod auth;
pub mod dto;
pub mod health;
pub mod injectables;
pub mod middleware;

pub use config::Config;
pub use error::{Error, HttpError, fatal};
pub use handler::{Endpoint, Handler};
pub use injector::{Inject, Injection, InjectionContext, Injector, Rejection};
pub use request::Request;
pub use response::{IntoResponse, Json, Response, ResponseBuilder};
pub use router::{RouteInfo, Router};
pub use server::Server;

pub use http::{Method, StatusCode};
