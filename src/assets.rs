//! Static asset trees: `/static/`, `/talks/`, `/favicon.ico`, `/robots.txt`.

use std::path::{Path, PathBuf};

use http::StatusCode;
use http::header::LAST_MODIFIED;
use tokio::fs;

use crate::content::{Freshness, check_last_modified, mtime};
use crate::handler::{BoxFuture, Endpoint};
use crate::request::Request;
use crate::response::Response;

/// Serves files from one directory, with a guessed `Content-Type`.
///
/// A directory serves its `index.html`; anything else missing is `404`.
#[derive(Clone, Debug)]
pub struct StaticDir {
    dir: PathBuf,
    strip_prefix: Option<String>,
}

impl StaticDir {
    /// Maps the request path directly onto `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), strip_prefix: None }
    }

    /// Removes `prefix` from the request path before mapping it onto `dir`.
    pub fn stripped(prefix: &str, dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), strip_prefix: Some(prefix.to_owned()) }
    }

    async fn serve(&self, req: Request) -> Response {
        let decoded = req.decoded_path();
        let path = match &self.strip_prefix {
            Some(prefix) => match decoded.strip_prefix(prefix.as_str()) {
                Some(rest) => rest,
                None => return not_found(),
            },
            None => decoded.as_ref(),
        };
        if path.split('/').any(|seg| seg == "..") {
            return Response::builder().status(StatusCode::BAD_REQUEST).text("invalid URL path");
        }

        let mut file = self.dir.join(path.trim_start_matches('/'));
        let mut meta = match fs::metadata(&file).await {
            Ok(m) => m,
            Err(_) => return not_found(),
        };
        if meta.is_dir() {
            file = file.join("index.html");
            meta = match fs::metadata(&file).await {
                Ok(m) if m.is_file() => m,
                _ => return not_found(),
            };
        }

        let mut builder = Response::builder();
        if let Some(modified) = mtime(meta.modified()) {
            match check_last_modified(req.header("if-modified-since"), modified) {
                Freshness::NotModified => return Response::status(StatusCode::NOT_MODIFIED),
                Freshness::Modified(stamp) => builder = builder.header(LAST_MODIFIED.as_str(), &stamp),
            }
        }

        match fs::read(&file).await {
            Ok(data) => builder.mime(content_type(&file).as_str(), data),
            Err(_) => not_found(),
        }
    }
}

impl Endpoint for StaticDir {
    fn call(&self, req: Request) -> BoxFuture {
        let this = self.clone();
        Box::pin(async move { this.serve(req).await })
    }
}

fn content_type(path: &Path) -> String {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if mime.type_() == mime_guess::mime::TEXT {
        format!("{}; charset=utf-8", mime.essence_str())
    } else {
        mime.essence_str().to_owned()
    }
}

fn not_found() -> Response {
    Response::builder().status(StatusCode::NOT_FOUND).text("404 page not found")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use bytes::Bytes;

    use super::*;

    fn request(uri: &str) -> Request {
        let req = http::Request::builder().uri(uri).body(Bytes::new()).unwrap();
        Request::new(req, "127.0.0.1:1".parse().unwrap(), false)
    }

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("css")).unwrap();
        fs::write(dir.path().join("css/site.css"), "body{}").unwrap();
        fs::write(dir.path().join("robots.txt"), "User-agent: *").unwrap();
        fs::write(dir.path().join("index.html"), "<p>talks</p>").unwrap();
        dir
    }

    #[tokio::test]
    async fn stripped_prefix_maps_into_the_tree() {
        let dir = tree();
        let res = StaticDir::stripped("/static/", dir.path()).call(request("/static/css/site.css")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.header("content-type"), Some("text/css; charset=utf-8"));
        assert_eq!(res.body().as_ref(), b"body{}");
        assert!(res.header("last-modified").is_some());
    }

    #[tokio::test]
    async fn unstripped_paths_map_directly() {
        let dir = tree();
        let res = StaticDir::new(dir.path()).call(request("/robots.txt")).await;
        assert_eq!(res.body().as_ref(), b"User-agent: *");
    }

    #[tokio::test]
    async fn directories_serve_index_html() {
        let dir = tree();
        let res = StaticDir::stripped("/talks/", dir.path()).call(request("/talks/")).await;
        assert_eq!(res.header("content-type"), Some("text/html; charset=utf-8"));
        assert_eq!(res.body().as_ref(), b"<p>talks</p>");

        let res = StaticDir::stripped("/static/", dir.path()).call(request("/static/css/")).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let dir = tree();
        let res = StaticDir::stripped("/static/", dir.path().join("css"))
            .call(request("/static/../robots.txt"))
            .await;
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unchanged_assets_are_not_resent() {
        let dir = tree();
        let server = StaticDir::new(dir.path());
        let first = server.call(request("/robots.txt")).await;
        let stamp = first.header("last-modified").unwrap().to_owned();
        let req = http::Request::builder()
            .uri("/robots.txt")
            .header("if-modified-since", stamp)
            .body(Bytes::new())
            .unwrap();
        let res = server.call(Request::new(req, "127.0.0.1:1".parse().unwrap(), false)).await;
        assert_eq!(res.status_code(), StatusCode::NOT_MODIFIED);
        assert!(res.body().is_empty());
    }
}
