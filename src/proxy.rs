//! Reverse proxy for the build status host and the documentation server.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_LENGTH, HOST, HeaderName};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use reqwest::{Client, Url};
use tracing::warn;

use crate::error::{Error, Result};
use crate::handler::{BoxFuture, Endpoint};
use crate::request::Request;
use crate::response::Response;

/// Forwards every request to one backend, keeping the path and query
/// under the backend's own path.
#[derive(Clone)]
pub struct ReverseProxy {
    client: Client,
    upstream: Arc<Url>,
}

impl ReverseProxy {
    pub fn new(backend: &str) -> Result<Self> {
        let upstream = Url::parse(backend)
            .map_err(|e| Error::Config(format!("invalid proxy backend {backend:?}: {e}")))?;
        if !matches!(upstream.scheme(), "http" | "https") {
            return Err(Error::Config(format!("proxy backend {backend:?} is not an http(s) URL")));
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, upstream: Arc::new(upstream) })
    }

    /// Backend URL for a request path and query.
    pub fn target(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = (*self.upstream).clone();
        let joined = format!("{}/{}", url.path().trim_end_matches('/'), path.trim_start_matches('/'));
        url.set_path(&joined);
        url.set_query(query);
        url
    }

    async fn forward(&self, req: Request) -> Response {
        let url = self.target(req.path(), req.query());
        let mut builder = self
            .client
            .request(req.method().clone(), url)
            .headers(upstream_headers(req.headers(), req.remote_addr().ip()));
        if !req.body().is_empty() {
            builder = builder.body(req.body().clone());
        }

        let upstream = match builder.send().await {
            Ok(res) => res,
            Err(e) => {
                warn!(backend = %self.upstream, "proxy: {e}");
                return Response::status(StatusCode::BAD_GATEWAY);
            }
        };
        let status = upstream.status();
        let headers = end_to_end(upstream.headers());

        let bodyless = req.method() == Method::HEAD
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED;
        let body = if bodyless {
            Bytes::new()
        } else {
            match upstream.bytes().await {
                Ok(b) => b,
                Err(e) => {
                    warn!(backend = %self.upstream, "proxy body: {e}");
                    return Response::status(StatusCode::BAD_GATEWAY);
                }
            }
        };
        Response::from_parts(status, headers, body)
    }
}

impl Endpoint for ReverseProxy {
    fn call(&self, req: Request) -> BoxFuture {
        let this = self.clone();
        Box::pin(async move { this.forward(req).await })
    }
}

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers the client sent, as the backend should see them: end to end
/// only, with the client address appended to any `X-Forwarded-For` chain.
fn upstream_headers(incoming: &HeaderMap, client: IpAddr) -> HeaderMap {
    let mut headers = end_to_end(incoming);
    headers.remove(HOST);
    let prior: Vec<&str> = headers.get_all(&X_FORWARDED_FOR).iter().filter_map(|v| v.to_str().ok()).collect();
    let chain = if prior.is_empty() { client.to_string() } else { format!("{}, {client}", prior.join(", ")) };
    if let Ok(value) = HeaderValue::from_str(&chain) {
        headers.insert(X_FORWARDED_FOR, value);
    }
    headers
}

/// Drops hop-by-hop headers, including any the `Connection` header names,
/// and the length, which is recomputed for the new body.
fn end_to_end(headers: &HeaderMap) -> HeaderMap {
    let listed = connection_tokens(headers);
    let mut kept = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || name == CONTENT_LENGTH || listed.iter().any(|t| t == name.as_str()) {
            continue;
        }
        kept.append(name.clone(), value.clone());
    }
    kept
}

fn connection_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection" | "keep-alive" | "proxy-connection" | "proxy-authenticate"
            | "proxy-authorization" | "te" | "trailer" | "transfer-encoding" | "upgrade"
    )
}
