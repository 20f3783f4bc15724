//! Radix-tree request router.
//!
//! One tree per HTTP method plus one for method-agnostic mounts. Patterns
//! follow the website's conventions: a pattern ending in `/` owns its whole
//! subtree, anything else matches exactly, and the most specific pattern
//! wins. Host-qualified routes are consulted before any path.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::handler::{BoxFuture, BoxedEndpoint, Endpoint, Handler};
use crate::request::Request;
use crate::response::Response;

/// Name of the catch-all parameter appended to subtree patterns.
const REST: &str = "rest";

/// The site's route table.
///
/// Build it once at startup, then hand it to the middleware chain; it is
/// never mutated afterwards. Each registration returns `self` so calls chain.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedEndpoint>>,
    any: MatchitRouter<BoxedEndpoint>,
    hosts: Vec<(String, BoxedEndpoint)>,
    fallback: Option<BoxedEndpoint>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            any: MatchitRouter::new(),
            hosts: Vec::new(),
            fallback: None,
        }
    }

    /// Register a handler for a method + pattern pair.
    ///
    /// ```rust,no_run
    /// # use camweb::{Request, Response, Router};
    /// # use http::Method;
    /// # async fn err_page(_: Request) -> Response { Response::text("") }
    /// # async fn asset(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::GET, "/err/{code}", err_page)
    ///     .on(Method::GET, "/static/", asset);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics on a pattern matchit rejects or one already registered; both
    /// are programming errors in the startup route table.
    pub fn on(self, method: Method, pattern: &str, handler: impl Handler) -> Self {
        self.mount_method(method, pattern, handler.into_endpoint())
    }

    /// Register a handler for `GET` and `HEAD`.
    pub fn get(self, pattern: &str, handler: impl Handler) -> Self {
        let endpoint = handler.into_endpoint();
        self.mount_method(Method::GET, pattern, Arc::clone(&endpoint))
            .mount_method(Method::HEAD, pattern, endpoint)
    }

    /// Register a handler for every method.
    pub fn any(self, pattern: &str, handler: impl Handler) -> Self {
        self.mount(pattern, handler.into_endpoint())
    }

    /// Mount a ready-made endpoint for every method.
    pub fn mount(mut self, pattern: &str, endpoint: BoxedEndpoint) -> Self {
        insert(&mut self.any, pattern, endpoint);
        self
    }

    /// Route every request whose host is `host` (port ignored, case
    /// insensitive) to `endpoint`, regardless of path.
    pub fn host(mut self, host: &str, endpoint: BoxedEndpoint) -> Self {
        let host = host.trim_end_matches('/').to_ascii_lowercase();
        self.hosts.push((host, endpoint));
        self
    }

    /// Handler for requests no pattern claims: the `/` subtree.
    pub fn fallback(mut self, handler: impl Handler) -> Self {
        self.fallback = Some(handler.into_endpoint());
        self
    }

    fn mount_method(mut self, method: Method, pattern: &str, endpoint: BoxedEndpoint) -> Self {
        insert(self.routes.entry(method).or_default(), pattern, endpoint);
        self
    }

    pub(crate) fn lookup(
        &self,
        method: &Method,
        host: &str,
        path: &str,
    ) -> Option<(BoxedEndpoint, HashMap<String, String>)> {
        let host = strip_port(host).to_ascii_lowercase();
        if let Some((_, endpoint)) = self.hosts.iter().find(|(h, _)| *h == host) {
            return Some((Arc::clone(endpoint), HashMap::new()));
        }

        let matched = self
            .routes
            .get(method)
            .and_then(|tree| tree.at(path).ok())
            .or_else(|| self.any.at(path).ok());
        if let Some(matched) = matched {
            let params = matched
                .params
                .iter()
                .filter(|(k, _)| *k != REST)
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect();
            return Some((Arc::clone(matched.value), params));
        }

        self.fallback.as_ref().map(|f| (Arc::clone(f), HashMap::new()))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

impl Endpoint for Router {
    fn call(&self, req: Request) -> BoxFuture {
        match self.lookup(req.method(), req.host(), req.path()) {
            Some((endpoint, params)) => endpoint.call(req.with_params(params)),
            None => Box::pin(async { Response::status(StatusCode::NOT_FOUND) }),
        }
    }
}

/// Insert `pattern`, expanding a trailing-slash subtree pattern into the
/// bare directory route plus a catch-all below it.
fn insert(tree: &mut MatchitRouter<BoxedEndpoint>, pattern: &str, endpoint: BoxedEndpoint) {
    let add = |tree: &mut MatchitRouter<BoxedEndpoint>, route: String, ep: BoxedEndpoint| {
        tree.insert(route.as_str(), ep)
            .unwrap_or_else(|e| panic!("invalid route `{route}`: {e}"));
    };
    if pattern.ends_with('/') && pattern.len() > 1 {
        add(tree, pattern.to_owned(), Arc::clone(&endpoint));
        add(tree, format!("{pattern}{{*{REST}}}"), endpoint);
    } else {
        add(tree, pattern.to_owned(), endpoint);
    }
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literals keep their colons.
    if host.starts_with('[') {
        return host.split_once(']').map(|(h, _)| &host[..h.len() + 1]).unwrap_or(host);
    }
    host.rsplit_once(':').map(|(h, _)| h).unwrap_or(host)
}
