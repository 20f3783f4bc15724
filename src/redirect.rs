//! Redirects to the code review, release and issue hosts.
//!
//! [`resolve`] is pure: the same URI always gives the same answer, and
//! `None` means the request is not a redirect.

use std::sync::LazyLock;

use http::Uri;
use regex::Regex;

use crate::request::Request;
use crate::response::Response;

/// Browsable source on the code review host.
pub const GERRIT_URL_PREFIX: &str = "https://camlistore.googlesource.com/camlistore/+/";
pub const ISSUES_URL: &str = "https://github.com/camlistore/camlistore/issues";
pub const RELEASES_URL: &str = "https://storage.googleapis.com/camlistore-release/";
pub const REVIEW_URL: &str = "https://camlistore-review.googlesource.com/";

/// Old gitweb commit links: `/code/?p=camlistore.git;a=commit;h=<hash>`.
static COMMIT_HASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^p=camlistore.git;a=commit;h=([0-9a-f]+)$").expect("valid regex"));

static ISSUE_NUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/(?:issue|bug)s?(/\d*)?$").expect("valid regex"));

/// Where a request for `uri` should be sent, if anywhere.
///
/// Rules are tried in order and the first match wins: gitweb commit links,
/// `/gw/` source links, issue tracker paths, release downloads, reviews.
pub fn resolve(uri: &Uri) -> Option<String> {
    let path = uri.path();
    commit_redirect(path, uri.query().unwrap_or(""))
        .or_else(|| gitweb_redirect(path))
        .or_else(|| issue_redirect(path))
        .or_else(|| release_redirect(path))
        .or_else(|| review_redirect(path))
}

fn commit_redirect(path: &str, query: &str) -> Option<String> {
    if !path.starts_with("/code/") {
        return None;
    }
    let hash = COMMIT_HASH.captures(query)?.get(1)?.as_str();
    Some(format!("{GERRIT_URL_PREFIX}{hash}"))
}

fn gitweb_redirect(path: &str) -> Option<String> {
    let rest = path.strip_prefix("/gw/")?;
    if rest.starts_with("doc") || rest.starts_with("clients") {
        Some(format!("{GERRIT_URL_PREFIX}master/{rest}"))
    } else {
        // Anything else is taken to be a commit.
        Some(format!("{GERRIT_URL_PREFIX}{rest}"))
    }
}

/// `/issue`, `/issues/42`, `/bug/7`, `/bugs/` and friends.
pub fn issue_redirect(path: &str) -> Option<String> {
    let caps = ISSUE_NUM.captures(path)?;
    let number = caps.get(1).map_or("", |m| m.as_str().trim_start_matches('/'));
    if number.is_empty() {
        Some(ISSUES_URL.to_owned())
    } else {
        Some(format!("{ISSUES_URL}/{number}"))
    }
}

fn release_redirect(path: &str) -> Option<String> {
    let rest = path.strip_prefix("/dl/")?;
    Some(format!("{RELEASES_URL}{rest}"))
}

fn review_redirect(path: &str) -> Option<String> {
    if !path.starts_with("/r/") {
        return None;
    }
    if path.len() > "/r/".len() {
        Some(format!("{REVIEW_URL}{}", &path[1..]))
    } else {
        Some(REVIEW_URL.to_owned())
    }
}

/// `302` to wherever [`resolve`] points, or `None` to fall through.
pub fn respond(req: &Request) -> Option<Response> {
    resolve(req.uri()).map(|target| Response::redirect(&target))
}

/// Handler for the `/r/` and `/dl/` subtrees.
pub async fn external(req: Request) -> Response {
    respond(&req).unwrap_or_else(|| Response::redirect("/"))
}

/// Handler that always redirects to `target`.
pub fn to(target: &'static str) -> impl Fn(Request) -> std::future::Ready<Response> + Send + Sync + 'static {
    move |_req| std::future::ready(Response::redirect(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve_str(uri: &str) -> Option<String> {
        resolve(&uri.parse().unwrap())
    }

    #[test]
    fn gitweb_commit_links_go_to_gerrit() {
        assert_eq!(
            resolve_str("/code/?p=camlistore.git;a=commit;h=b0d2a8f0e5f27bbfc025a96ec3c7896b42d198ed").as_deref(),
            Some("https://camlistore.googlesource.com/camlistore/+/b0d2a8f0e5f27bbfc025a96ec3c7896b42d198ed")
        );
    }

    #[test]
    fn other_code_queries_do_not_redirect() {
        assert_eq!(resolve_str("/code/?p=camlistore.git;a=tree"), None);
        assert_eq!(resolve_str("/code/?p=camlistore.git;a=commit;h=XYZ"), None);
        assert_eq!(resolve_str("/code/"), None);
        assert_eq!(resolve_str("/code?p=camlistore.git;a=commit;h=abc"), None);
    }

    #[test]
    fn gw_links_split_docs_from_commits() {
        assert_eq!(
            resolve_str("/gw/doc/json-signing/json-signing.txt").as_deref(),
            Some("https://camlistore.googlesource.com/camlistore/+/master/doc/json-signing/json-signing.txt")
        );
        assert_eq!(
            resolve_str("/gw/clients/android").as_deref(),
            Some("https://camlistore.googlesource.com/camlistore/+/master/clients/android")
        );
        assert_eq!(
            resolve_str("/gw/b0d2a8f").as_deref(),
            Some("https://camlistore.googlesource.com/camlistore/+/b0d2a8f")
        );
    }

    #[test]
    fn issue_paths() {
        let cases = [
            ("/issue/42", Some("https://github.com/camlistore/camlistore/issues/42")),
            ("/issues/7", Some("https://github.com/camlistore/camlistore/issues/7")),
            ("/bug/3", Some("https://github.com/camlistore/camlistore/issues/3")),
            ("/bugs", Some("https://github.com/camlistore/camlistore/issues")),
            ("/issue", Some("https://github.com/camlistore/camlistore/issues")),
            ("/issues/", Some("https://github.com/camlistore/camlistore/issues")),
            ("/issues/abc", None),
            ("/issuesx", None),
        ];
        for (path, want) in cases {
            assert_eq!(resolve_str(path).as_deref(), want, "{path}");
        }
    }

    #[test]
    fn downloads_and_reviews() {
        assert_eq!(
            resolve_str("/dl/foo.tar.gz").as_deref(),
            Some("https://storage.googleapis.com/camlistore-release/foo.tar.gz")
        );
        assert_eq!(resolve_str("/dl/").as_deref(), Some(RELEASES_URL));
        assert_eq!(
            resolve_str("/r/1234").as_deref(),
            Some("https://camlistore-review.googlesource.com/r/1234")
        );
        assert_eq!(resolve_str("/r/").as_deref(), Some(REVIEW_URL));
    }

    #[test]
    fn resolving_is_deterministic() {
        for uri in ["/issue/42", "/dl/x", "/gw/doc", "/docs/", "/code/?p=camlistore.git;a=commit;h=ab"] {
            assert_eq!(resolve_str(uri), resolve_str(uri), "{uri}");
        }
    }

    #[tokio::test]
    async fn fixed_redirects() {
        let req = http::Request::builder().uri("/lists").body(bytes::Bytes::new()).unwrap();
        let res = to("/community")(Request::new(req, "127.0.0.1:1".parse().unwrap(), false)).await;
        assert_eq!(res.status_code(), http::StatusCode::FOUND);
        assert_eq!(res.header("location"), Some("/community"));
    }
}
