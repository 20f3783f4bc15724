//! The [`Endpoint`] seam every piece of the site plugs into.
//!
//! The host guard, the access log, the buildbot proxy, the content router
//! and the route table itself all answer requests the same way, so they
//! share one trait and nest freely. Small routes such as `/debug/uptime`
//! are plain async functions; [`Handler`] turns those into endpoints when
//! the route table is built.
//!
//! ```text
//! AccessLog ─▶ HostGuard ─▶ Router ─▶ ContentRouter | StaticDir | ReverseProxy | fn(Request)
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// The pending answer to one request.
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Answers requests: a route, a layer around another endpoint, or a whole
/// route table.
pub trait Endpoint: Send + Sync + 'static {
    fn call(&self, req: Request) -> BoxFuture;
}

/// How endpoints are stored in the route table and shared between
/// connections.
pub type BoxedEndpoint = Arc<dyn Endpoint>;

impl<E: Endpoint + ?Sized> Endpoint for Arc<E> {
    fn call(&self, req: Request) -> BoxFuture {
        (**self).call(req)
    }
}

/// Async functions and closures usable as routes.
///
/// Any `Fn(Request) -> impl Future<Output = impl IntoResponse>` qualifies,
/// so a route can return a [`Response`], a `String`, or a bare
/// `StatusCode`. Values that already implement [`Endpoint`] are mounted
/// with [`Router::mount`](crate::Router::mount) instead.
pub trait Handler: Send + Sync + 'static {
    fn into_endpoint(self) -> BoxedEndpoint;
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_endpoint(self) -> BoxedEndpoint {
        Arc::new(RouteFn(self))
    }
}

/// A route function seen as an endpoint.
struct RouteFn<F>(F);

impl<F, Fut, R> Endpoint for RouteFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}
