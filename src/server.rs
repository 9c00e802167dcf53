//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown
//!
//! On SIGTERM or Ctrl-C the server:
//! 1. Immediately stops `listener.accept()`, so no new connections are made.
//! 2. Tells every open connection to close once its current request is
//!    answered. Idle keep-alive connections close right away.
//! 3. Waits for in-flight requests for at most
//!    [`Config::shutdown_grace_secs`](crate::Config), then aborts the rest.
//! 4. Returns from [`Server::serve`], which lets `main` exit cleanly.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body as HttpBody;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{Error, HttpError};
use crate::request::Request;
use crate::response::IntoResponse;
use crate::router::Router;

enum Bind {
    Addr(SocketAddr),
    Listener(TcpListener),
}

/// The HTTP server.
pub struct Server {
    bind: Bind,
    max_body_bytes: usize,
    shutdown_grace: Duration,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called, with default limits.
    ///
    /// ```rust,no_run
    /// let server = restkit::Server::bind("0.0.0.0:3000")?;
    /// # Ok::<(), restkit::Error>(())
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        Self::from_config(&Config { addr: addr.to_owned(), ..Config::default() })
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let addr: SocketAddr = config.addr.parse().map_err(|_| Error::Addr(config.addr.clone()))?;
        Ok(Self {
            bind: Bind::Addr(addr),
            max_body_bytes: config.max_body_bytes,
            shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
        })
    }

    /// Serves on an already-bound listener (port 0 in tests, socket
    /// activation in production).
    pub fn from_listener(listener: TcpListener) -> Self {
        let config = Config::default();
        Self {
            bind: Bind::Listener(listener),
            max_body_bytes: config.max_body_bytes,
            shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
        }
    }

    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// How long in-flight requests may run after the shutdown signal.
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by in-flight requests completing).
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), but stops when `signal` resolves.
    pub async fn serve_with_shutdown(
        self,
        router: Router,
        signal: impl Future<Output = ()> + Send,
    ) -> Result<(), Error> {
        let listener = match self.bind {
            Bind::Addr(addr) => TcpListener::bind(addr).await?,
            Bind::Listener(listener) => listener,
        };
        let local_addr = listener.local_addr()?;
        let router = Arc::new(router);
        let max_body_bytes = self.max_body_bytes;

        info!(addr = %local_addr, routes = router.routes().len(), "restkit listening");

        let builder = ConnBuilder::new(TokioExecutor::new());
        let graceful = GracefulShutdown::new();
        let mut tasks = tokio::task::JoinSet::new();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a signal immediately stops
                // accepting, even if more connections are queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let io = TokioIo::new(stream);

                    // Called once per request on the connection.
                    let svc = service_fn(move |req| {
                        let router = Arc::clone(&router);
                        async move { dispatch(router, req, max_body_bytes).await }
                    });
                    let conn = graceful.watch(builder.serve_connection(io, svc).into_owned());

                    tasks.spawn(async move {
                        if let Err(e) = conn.await {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);
        let drained = tokio::time::timeout(self.shutdown_grace, async {
            graceful.shutdown().await;
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(aborted = tasks.len(), "grace period elapsed, aborting connections");
            tasks.shutdown().await;
        }

        info!("restkit stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Buffers the body, then hands the request to the router. All failures
/// become responses, so hyper never sees an error.
async fn dispatch<B>(
    router: Arc<Router>,
    req: http::Request<B>,
    max_body_bytes: usize,
) -> Result<http::Response<Full<Bytes>>, std::convert::Infallible>
where
    B: HttpBody<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = req.into_parts();

    let body = match Limited::new(body, max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            let err = HttpError::new(
                http::StatusCode::PAYLOAD_TOO_LARGE,
                format!("request body exceeds {max_body_bytes} bytes"),
            );
            return Ok(err.into_response().into_inner());
        }
        Err(e) => {
            warn!("failed to read request body: {e}");
            return Ok(HttpError::bad_request("unreadable request body").into_response().into_inner());
        }
    };

    let req = Request::from_http(http::Request::from_parts(parts, body));
    Ok(router.handle(req).await.into_inner())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both SIGTERM and SIGINT (Ctrl-C). On other
/// platforms only Ctrl-C is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => { sig.recv().await; }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use hyper::body::Frame;
    use rstest::rstest;

    use super::*;
    use crate::injectables::RawBody;

    /// A body whose transport fails on the first read.
    struct Reset;

    impl HttpBody for Reset {
        type Data = Bytes;
        type Error = io::Error;

        fn poll_frame(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, io::Error>>> {
            Poll::Ready(Some(Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer reset"))))
        }
    }

    fn router() -> Arc<Router> {
        Arc::new(Router::new().post("/echo", |RawBody(body): RawBody| async move {
            String::from_utf8_lossy(&body).into_owned()
        }))
    }

    #[rstest]
    #[case("not an address")]
    #[case("localhost")]
    #[case("127.0.0.1:99999")]
    fn bad_address_is_rejected(#[case] addr: &str) {
        assert!(matches!(Server::bind(addr), Err(Error::Addr(a)) if a == addr));

        let config = Config { addr: addr.to_owned(), ..Config::default() };
        assert!(matches!(Server::from_config(&config), Err(Error::Addr(_))));
    }

    #[test]
    fn config_limits_are_applied() {
        let config = Config { max_body_bytes: 10, shutdown_grace_secs: 2, ..Config::default() };
        let server = Server::from_config(&config).unwrap();
        assert_eq!(server.max_body_bytes, 10);
        assert_eq!(server.shutdown_grace, Duration::from_secs(2));

        let server = server.shutdown_grace(Duration::from_millis(250));
        assert_eq!(server.shutdown_grace, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn unreadable_body_is_400() {
        let req = http::Request::builder().method("POST").uri("/echo").body(Reset).unwrap();
        let resp = dispatch(router(), req, 1024).await.unwrap();
        assert_eq!(resp.status(), http::StatusCode::BAD_REQUEST);
    }

    #[rstest]
    #[case("hello", 5, http::StatusCode::OK)]
    #[case("hello!", 5, http::StatusCode::PAYLOAD_TOO_LARGE)]
    #[tokio::test]
    async fn body_limit_is_inclusive(
        #[case] body: &'static str,
        #[case] limit: usize,
        #[case] expected: http::StatusCode,
    ) {
        let req = http::Request::builder()
            .method("POST")
            .uri("/echo")
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap();
        let resp = dispatch(router(), req, limit).await.unwrap();
        assert_eq!(resp.status(), expected);
    }
}
