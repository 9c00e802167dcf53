//! Handler trait and type erasure.
//!
//! # How handlers are stored
//!
//! The router keeps handlers of *different* types in one table, so each is
//! hidden behind a trait object (`dyn ErasedHandler`). Handler arguments are
//! resolved by the [`Injector`](crate::Injector) before the call.
//!
//! ```text
//! async fn show(id: Path<Id>, Auth(u, _): Auth<User>) -> Json<Post>   ← user writes this
//!        ↓ router.get("/posts/{id}", show)
//! Endpoint::new(show)                      ← records [Path<Id>, Auth<User>]
//!        ↓  stored as Arc<dyn ErasedHandler>
//! endpoint.call(cx)  at request time       ← one vtable dispatch
//!        ↓
//! resolve Path<Id>, then Auth<User>, then show(id, user).await.into_response()
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use crate::injector::{Inject, Injection, InjectionContext, resolve};
use crate::middleware::Middleware;
use crate::response::{IntoResponse, Response};

/// A heap-allocated, type-erased future that resolves to a [`Response`].
///
/// `#[doc(hidden)] pub` because it appears in the return type of the public
/// [`Handler::call`].
#[doc(hidden)]
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is satisfied by any
/// `async fn` (or closure returning a future) whose arguments all implement
/// [`Inject`], up to twelve of them, and whose output implements
/// [`IntoResponse`]:
///
/// ```text
/// async fn name(a: A, b: B, ..) -> impl IntoResponse
/// ```
///
/// `Args` is the tuple of argument types; it only exists to keep the
/// implementations for different arities apart.
pub trait Handler<Args>: Clone + Send + Sync + 'static {
    /// Resolves every argument in order, then runs the handler.
    fn call(self, cx: InjectionContext) -> BoxFuture;

    /// The injections this handler registers, in resolution order.
    fn injections() -> Vec<Injection>;
}

macro_rules! impl_handler {
    ($($ty:ident),*) => {
        #[allow(non_snake_case, unused_mut, unused_variables, unused_assignments)]
        impl<F, Fut, R, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: FnOnce($($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: IntoResponse,
            $( $ty: Inject, )*
        {
            fn call(self, mut cx: InjectionContext) -> BoxFuture {
                Box::pin(async move {
                    let mut index = 0usize;
                    $(
                        let $ty = match resolve::<$ty>(&mut cx, index).await {
                            Ok(value) => value,
                            Err(rejection) => return rejection.into_response(),
                        };
                        index += 1;
                    )*
                    (self)($($ty,)*).await.into_response()
                })
            }

            fn injections() -> Vec<Injection> {
                let resolvers: &[&'static str] = &[$(std::any::type_name::<$ty>(),)*];
                resolvers
                    .iter()
                    .enumerate()
                    .map(|(index, &resolver)| Injection { index, resolver })
                    .collect()
            }
        }
    };
}

impl_handler!();
impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12);

// ── Type erasure ──────────────────────────────────────────────────────────────

trait ErasedHandler: Send + Sync {
    fn call(&self, cx: InjectionContext) -> BoxFuture;
}

/// Newtype wrapper that holds a concrete handler `F` and bridges it to
/// [`ErasedHandler`]. `T` pins down which `Handler<T>` impl is meant.
struct HandlerFn<F, T> {
    f: F,
    _marker: PhantomData<fn() -> T>,
}

impl<F, T> ErasedHandler for HandlerFn<F, T>
where
    F: Handler<T>,
    T: 'static,
{
    fn call(&self, cx: InjectionContext) -> BoxFuture {
        self.f.clone().call(cx)
    }
}

/// A type-erased handler plus the metadata the router needs about it.
///
/// Cloning is a handful of reference-count increments.
#[derive(Clone)]
pub struct Endpoint {
    handler: Arc<dyn ErasedHandler>,
    injections: Arc<[Injection]>,
    pub(crate) layers: Arc<[Arc<dyn Middleware>]>,
}

impl Endpoint {
    pub fn new<H, T>(handler: H) -> Self
    where
        H: Handler<T>,
        T: 'static,
    {
        Self {
            handler: Arc::new(HandlerFn { f: handler, _marker: PhantomData }),
            injections: H::injections().into(),
            layers: Vec::new().into(),
        }
    }

    /// The handler's injections, in resolution order.
    pub fn injections(&self) -> &[Injection] { &self.injections }

    /// Returns a copy whose middleware stack is `outer` followed by the
    /// current one.
    pub(crate) fn wrapped(&self, outer: &[Arc<dyn Middleware>]) -> Self {
        let layers: Vec<_> = outer.iter().chain(self.layers.iter()).cloned().collect();
        Self { layers: layers.into(), ..self.clone() }
    }

    pub(crate) fn call(&self, cx: InjectionContext) -> BoxFuture {
        self.handler.call(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injectables::{Body, Params};
    use crate::request::Request;

    async fn create(_params: Params, _body: Body<serde_json::Value>) -> &'static str { "ok" }

    #[test]
    fn records_injections_in_parameter_order() {
        let endpoint = Endpoint::new(create);
        let injections = endpoint.injections();

        assert_eq!(injections.len(), 2);
        assert_eq!(injections[0].index, 0);
        assert!(injections[0].resolver.ends_with("Params"));
        assert_eq!(injections[1].index, 1);
        assert!(injections[1].resolver.contains("Body<"));
    }

    #[tokio::test]
    async fn erased_call_resolves_and_runs() {
        let endpoint = Endpoint::new(|req: Request| async move { req.path().to_owned() });
        let req = Request::from_http(
            http::Request::builder().uri("/ping").body(bytes::Bytes::new()).unwrap(),
        );
        let resp = endpoint.call(InjectionContext::new(req)).await;
        assert_eq!(resp.body(), b"/ping");
    }
}
