//! Host canonicalization and crawler denial.

use http::StatusCode;
use tracing::info;

use crate::handler::{BoxFuture, BoxedEndpoint, Endpoint};
use crate::request::Request;
use crate::response::Response;

/// The site's canonical host name.
pub const CANONICAL_HOST: &str = "camlistore.org";

/// Crawlers known to ignore robots.txt on the dynamic code browser.
const BOT_SIGNATURES: &[&str] = &["Baidu", "bingbot", "Ezooms", "Googlebot"];

/// Path segment whose query-string URLs are expensive to render.
const SENSITIVE_SEGMENT: &str = "/code/";

/// Wraps the whole route table.
///
/// Requests for `www.camlistore.org` are redirected to the bare host first;
/// only then are crawlers hitting `/code/…?…` turned away with `401`.
pub struct HostGuard {
    inner: BoxedEndpoint,
}

impl HostGuard {
    pub fn new(inner: BoxedEndpoint) -> Self {
        Self { inner }
    }
}

impl Endpoint for HostGuard {
    fn call(&self, req: Request) -> BoxFuture {
        if let Some(target) = canonical_redirect(&req) {
            return Box::pin(async move { Response::redirect(&target) });
        }
        if is_denied_bot(&req) {
            info!(peer = %req.remote_addr(), uri = req.request_uri(), "bot denied");
            return Box::pin(async {
                Response::builder().status(StatusCode::UNAUTHORIZED).text("bye")
            });
        }
        self.inner.call(req)
    }
}

/// Where a `www.` request should go instead, keeping scheme and URI.
fn canonical_redirect(req: &Request) -> Option<String> {
    let host = req.host().to_ascii_lowercase();
    if host != format!("www.{CANONICAL_HOST}") {
        return None;
    }
    let scheme = if req.is_tls() { "https" } else { "http" };
    Some(format!("{scheme}://{CANONICAL_HOST}{}", req.request_uri()))
}

fn is_denied_bot(req: &Request) -> bool {
    let uri = req.request_uri();
    if !uri.contains(SENSITIVE_SEGMENT) || !uri.contains('?') {
        return false;
    }
    let agent = req.header("user-agent").unwrap_or("");
    BOT_SIGNATURES.iter().any(|sig| agent.contains(sig))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::handler::Handler;

    fn guard() -> HostGuard {
        HostGuard::new((|_req: Request| async { "inner" }).into_endpoint())
    }

    fn request(host: &str, uri: &str, agent: &str, tls: bool) -> Request {
        let req = http::Request::builder()
            .uri(uri)
            .header("host", host)
            .header("user-agent", agent)
            .body(Bytes::new())
            .unwrap();
        Request::new(req, "10.0.0.1:1234".parse().unwrap(), tls)
    }

    #[tokio::test]
    async fn www_over_plaintext_redirects_to_http() {
        let res = guard().call(request("www.camlistore.org", "/docs/?x=1", "curl", false)).await;
        assert_eq!(res.status_code(), StatusCode::FOUND);
        assert_eq!(res.header("location"), Some("http://camlistore.org/docs/?x=1"));
    }

    #[tokio::test]
    async fn www_over_tls_redirects_to_https_case_insensitively() {
        let res = guard().call(request("WWW.Camlistore.ORG", "/", "curl", true)).await;
        assert_eq!(res.header("location"), Some("https://camlistore.org/"));
    }

    #[tokio::test]
    async fn www_wins_over_bot_denial() {
        let res = guard()
            .call(request("www.camlistore.org", "/code/?p=x", "Googlebot/2.1", false))
            .await;
        assert_eq!(res.status_code(), StatusCode::FOUND);
    }

    #[tokio::test]
    async fn bots_with_query_on_code_are_denied() {
        let res = guard()
            .call(request("camlistore.org", "/code/?p=camlistore.git", "Mozilla/5.0 (compatible; bingbot/2.0)", false))
            .await;
        assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(res.body().as_ref(), b"bye");
    }

    #[tokio::test]
    async fn bots_without_query_pass_through() {
        let res = guard().call(request("camlistore.org", "/code/", "Baiduspider", false)).await;
        assert_eq!(res.body().as_ref(), b"inner");
    }

    #[tokio::test]
    async fn humans_with_query_pass_through() {
        let res = guard().call(request("camlistore.org", "/code/?p=x", "Firefox", false)).await;
        assert_eq!(res.body().as_ref(), b"inner");
    }
}
