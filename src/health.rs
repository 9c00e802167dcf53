//! Built-in health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? |
//! | **Readiness** | `/readyz` | Can it serve traffic? |
//!
//! ```rust,no_run
//! use restkit::{Router, health};
//!
//! let app = Router::new()
//!     .get("/healthz", health::liveness)
//!     .get("/readyz", health::readiness);
//! ```
//!
//! Replace `readiness` with your own handler to gate on dependencies; it can
//! take injections like any other handler.

use crate::Response;

/// Always `200 OK` with body `"ok"`.
pub async fn liveness() -> Response {
    Response::text("ok")
}

/// `200 OK` with body `"ready"`.
pub async fn readiness() -> Response {
    Response::text("ready")
}
