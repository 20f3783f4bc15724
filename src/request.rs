//! Incoming HTTP request type.

use std::borrow::Cow;
use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri, Version};

/// An incoming HTTP request with its body fully read.
///
/// Besides the usual method/URI/headers it remembers which connection it
/// arrived on: the peer address (for access logs) and whether that
/// connection was TLS (for scheme-preserving redirects).
pub struct Request {
    pub(crate) parts: http::request::Parts,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) remote_addr: SocketAddr,
    pub(crate) tls: bool,
}

impl Request {
    /// Wraps an `http::Request` received from `remote_addr`.
    ///
    /// The server builds requests this way; tests can too.
    pub fn new(req: http::Request<Bytes>, remote_addr: SocketAddr, tls: bool) -> Self {
        let (parts, body) = req.into_parts();
        Self { parts, body, params: HashMap::new(), remote_addr, tls }
    }

    pub fn method(&self) -> &Method { &self.parts.method }
    pub fn uri(&self) -> &Uri { &self.parts.uri }
    pub fn path(&self) -> &str { self.parts.uri.path() }
    pub fn query(&self) -> Option<&str> { self.parts.uri.query() }
    pub fn version(&self) -> Version { self.parts.version }
    pub fn headers(&self) -> &HeaderMap { &self.parts.headers }
    pub fn body(&self) -> &Bytes { &self.body }
    pub fn remote_addr(&self) -> SocketAddr { self.remote_addr }
    pub fn is_tls(&self) -> bool { self.tls }

    /// The path with percent-escapes decoded. Escapes that do not decode to
    /// UTF-8 leave the path as sent.
    pub fn decoded_path(&self) -> Cow<'_, str> {
        let path = self.path();
        urlencoding::decode(path).unwrap_or(Cow::Borrowed(path))
    }

    /// Path plus query, as sent on the request line.
    pub fn request_uri(&self) -> &str {
        self.parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }

    /// The `Host` header, falling back to the URI authority for
    /// absolute-form and HTTP/2 requests.
    pub fn host(&self) -> &str {
        self.header("host")
            .or_else(|| self.parts.uri.authority().map(|a| a.as_str()))
            .unwrap_or("")
    }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/err/{code}`, `req.param("code")` on `/err/no-server`
    /// returns `Some("no-server")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub(crate) fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }
}
