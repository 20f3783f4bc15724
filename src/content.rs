//! Markdown content pages under `<root>/content`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::SystemTime;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use http::StatusCode;
use pulldown_cmark::{Options, Parser};
use regex::Regex;
use tokio::fs;
use tracing::debug;

use crate::handler::{BoxFuture, Endpoint};
use crate::pages::Pages;
use crate::request::Request;
use crate::response::Response;

/// IMF-fixdate, the only HTTP-date form this server reads or writes.
const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

static H1_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<h1>([^<]+)</h1>").expect("valid regex"));

/// Turns page sources into HTML.
pub trait Renderer: Send + Sync + 'static {
    fn render(&self, source: &str) -> String;
}

/// CommonMark with the usual extensions. Inline HTML passes through, so
/// plain HTML content files render unchanged.
pub struct Markdown;

impl Renderer for Markdown {
    fn render(&self, source: &str) -> String {
        let options = Options::ENABLE_TABLES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_FOOTNOTES
            | Options::ENABLE_HEADING_ATTRIBUTES;
        let mut html = String::with_capacity(source.len() * 3 / 2);
        pulldown_cmark::html::push_html(&mut html, Parser::new_ext(source, options));
        html
    }
}

/// Serves every path no other route claims.
///
/// `/docs/arch` reads `<root>/content/docs/arch`; a directory reads its
/// `index.html`. The file is rendered as markdown, titled by its first
/// `<h1>`, and wrapped in the page template.
#[derive(Clone)]
pub struct ContentRouter {
    dir: PathBuf,
    pages: Arc<Pages>,
    renderer: Arc<dyn Renderer>,
}

impl ContentRouter {
    pub fn new(root: &Path, pages: Arc<Pages>) -> Self {
        Self::with_renderer(root, pages, Arc::new(Markdown))
    }

    pub fn with_renderer(root: &Path, pages: Arc<Pages>, renderer: Arc<dyn Renderer>) -> Self {
        Self { dir: root.join("content"), pages, renderer }
    }

    async fn serve(&self, req: Request) -> Response {
        let path = req.decoded_path();
        let mut rel = path.trim_start_matches('/').to_owned();
        if rel.contains("..") {
            return Response::builder().no_body();
        }

        let mut abs = self.dir.join(&rel);
        let mut meta = match fs::symlink_metadata(&abs).await {
            Ok(m) => m,
            Err(e) => return self.missing(&rel, &e),
        };
        if meta.is_dir() {
            rel = if rel.is_empty() {
                "index.html".to_owned()
            } else {
                format!("{}/index.html", rel.trim_end_matches('/'))
            };
            abs = self.dir.join(&rel);
            meta = match fs::symlink_metadata(&abs).await {
                Ok(m) => m,
                Err(e) => return self.missing(&rel, &e),
            };
        }
        if meta.is_dir() {
            return Response::builder().no_body();
        }

        let last_modified = match mtime(meta.modified()) {
            Some(mtime) => match check_last_modified(req.header("if-modified-since"), mtime) {
                Freshness::NotModified => return Response::status(StatusCode::NOT_MODIFIED),
                Freshness::Modified(stamp) => Some(stamp),
            },
            None => None,
        };

        let source = match fs::read(&abs).await {
            Ok(data) => data,
            Err(e) => return self.missing(&rel, &e),
        };
        let html = self.renderer.render(&String::from_utf8_lossy(&source));
        let title = page_title(&html).unwrap_or_default();

        let mut res = self.pages.page(StatusCode::OK, &title, "", &html);
        if let Some(stamp) = last_modified {
            if let Ok(value) = stamp.parse() {
                res.headers.insert(http::header::LAST_MODIFIED, value);
            }
        }
        res
    }

    fn missing(&self, rel: &str, err: &io::Error) -> Response {
        debug!(path = rel, "content: {err}");
        self.pages.not_found(rel, &describe(err))
    }
}

impl Endpoint for ContentRouter {
    fn call(&self, req: Request) -> BoxFuture {
        let this = self.clone();
        Box::pin(async move { this.serve(req).await })
    }
}

/// Error text safe to show visitors: the kind of failure, never the
/// absolute path the OS error carries.
pub(crate) fn describe(err: &io::Error) -> String {
    err.kind().to_string()
}

/// Text of the first `<h1>` in rendered HTML.
pub fn page_title(html: &str) -> Option<String> {
    H1_TITLE.captures(html).map(|c| c[1].to_owned())
}

/// Outcome of a conditional GET check.
#[derive(Debug, PartialEq, Eq)]
pub enum Freshness {
    /// The client's copy is current.
    NotModified,
    /// Serve the resource, stamped with this `Last-Modified` value.
    Modified(String),
}

/// Compares a resource's modification time against `If-Modified-Since`.
///
/// HTTP dates have whole-second precision, so the resource counts as
/// unmodified while `mtime < since + 1s`. A missing or unparsable header
/// always means modified.
pub fn check_last_modified(if_modified_since: Option<&str>, mtime: DateTime<Utc>) -> Freshness {
    if let Some(since) = if_modified_since.and_then(parse_http_date) {
        if mtime < since + TimeDelta::seconds(1) {
            return Freshness::NotModified;
        }
    }
    Freshness::Modified(format_http_date(mtime))
}

pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), HTTP_DATE)
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn format_http_date(time: DateTime<Utc>) -> String {
    time.format(HTTP_DATE).to_string()
}

/// A file's modification time, if the platform reports one.
pub(crate) fn mtime(modified: io::Result<SystemTime>) -> Option<DateTime<Utc>> {
    modified.ok().map(DateTime::<Utc>::from)
}

#[cfg(test)]
mod tests {
    use std::fs::{self, File};

    use bytes::Bytes;
    use chrono::TimeZone;

    use super::*;
    use crate::pages::tests::pages;

    fn request(uri: &str, if_modified_since: Option<&str>) -> Request {
        let mut req = http::Request::builder().uri(uri);
        if let Some(v) = if_modified_since {
            req = req.header("if-modified-since", v);
        }
        Request::new(req.body(Bytes::new()).unwrap(), "127.0.0.1:1".parse().unwrap(), false)
    }

    fn site() -> (tempfile::TempDir, ContentRouter) {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("content");
        fs::create_dir_all(content.join("docs")).unwrap();
        fs::write(content.join("index.html"), "<h1>Camlistore</h1>\n\nHome page.").unwrap();
        fs::write(content.join("docs/arch"), "# Architecture\n\nBlobs all the way down.").unwrap();
        let router = ContentRouter::new(dir.path(), Arc::new(pages()));
        (dir, router)
    }

    fn body(res: &Response) -> String {
        String::from_utf8(res.body().to_vec()).unwrap()
    }

    #[tokio::test]
    async fn markdown_is_rendered_and_titled() {
        let (_dir, router) = site();
        let res = router.call(request("/docs/arch", None)).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        let text = body(&res);
        assert!(text.starts_with("<title>Architecture</title>"), "{text}");
        assert!(text.contains("<p>Blobs all the way down.</p>"), "{text}");
        assert!(res.header("last-modified").is_some());
    }

    #[tokio::test]
    async fn directories_serve_their_index() {
        let (_dir, router) = site();
        let res = router.call(request("/", None)).await;
        assert!(body(&res).starts_with("<title>Camlistore</title>"));
    }

    #[tokio::test]
    async fn dot_dot_paths_touch_nothing() {
        let (dir, router) = site();
        fs::write(dir.path().join("secret"), "no").unwrap();
        for uri in ["/../secret", "/docs/..", "/%2e%2e/secret"] {
            let res = router.call(request(uri, None)).await;
            assert_eq!(res.status_code(), StatusCode::OK, "{uri}");
            assert!(res.body().is_empty(), "{uri}");
            assert!(res.header("content-type").is_none(), "{uri}");
        }
    }

    #[tokio::test]
    async fn missing_files_get_a_404_page_without_paths() {
        let (dir, router) = site();
        let res = router.call(request("/docs/nope", None)).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        let text = body(&res);
        assert!(text.contains("entity not found"), "{text}");
        assert!(!text.contains(&dir.path().display().to_string()), "{text}");
    }

    #[tokio::test]
    async fn directory_without_index_is_a_404() {
        let (dir, router) = site();
        fs::create_dir(dir.path().join("content/empty")).unwrap();
        let res = router.call(request("/empty/", None)).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn conditional_get_round_trip() {
        let (dir, router) = site();
        let t = Utc.with_ymd_and_hms(2026, 10, 17, 8, 0, 0).unwrap();
        File::options()
            .write(true)
            .open(dir.path().join("content/docs/arch"))
            .unwrap()
            .set_modified(t.into())
            .unwrap();
        let stamp = format_http_date(t);

        let res = router.call(request("/docs/arch", Some(&stamp))).await;
        assert_eq!(res.status_code(), StatusCode::NOT_MODIFIED);
        assert!(res.body().is_empty());
        assert!(res.header("content-type").is_none());
        assert!(res.header("content-length").is_none());

        let earlier = format_http_date(t - TimeDelta::hours(1));
        let res = router.call(request("/docs/arch", Some(&earlier))).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.header("last-modified"), Some(stamp.as_str()));
    }

    #[test]
    fn one_second_tolerance() {
        let since = Utc.with_ymd_and_hms(2026, 10, 17, 8, 0, 0).unwrap();
        let header = format_http_date(since);
        let just_under = since + TimeDelta::milliseconds(999);
        assert_eq!(check_last_modified(Some(&header), just_under), Freshness::NotModified);
        let one_second = since + TimeDelta::seconds(1);
        assert!(matches!(check_last_modified(Some(&header), one_second), Freshness::Modified(_)));
        assert!(matches!(check_last_modified(Some("yesterday"), since), Freshness::Modified(_)));
        assert!(matches!(check_last_modified(None, since), Freshness::Modified(_)));
    }

    #[test]
    fn http_dates_use_imf_fixdate() {
        let t = Utc.with_ymd_and_hms(2026, 10, 17, 8, 4, 5).unwrap();
        assert_eq!(format_http_date(t), "Sat, 17 Oct 2026 08:04:05 GMT");
        assert_eq!(parse_http_date("Sat, 17 Oct 2026 08:04:05 GMT"), Some(t));
    }

    #[test]
    fn title_is_the_first_h1() {
        assert_eq!(page_title("<h1>One</h1><h1>Two</h1>").as_deref(), Some("One"));
        assert_eq!(page_title("<h2>None</h2>"), None);
    }
}
