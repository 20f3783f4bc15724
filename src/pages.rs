//! Page templates.
//!
//! Three templates live under `<root>/tmpl`:
//!
//! | File | Context | Used for |
//! |---|---|---|
//! | `page.html` | `title`, `subtitle`, `content` | every HTML page |
//! | `error.html` | `error` | body of the 404 page |
//! | `camlierror.html` | `code`, `description` | body of `/err/<code>` pages |
//!
//! `content` and `description` are already HTML; templates should print
//! them with the `safe` filter.

use std::borrow::Cow;
use std::path::Path;

use http::StatusCode;
use tera::{Context, Tera};
use tracing::error;

use crate::error::{Error, Result};
use crate::response::{ContentType, Response};

pub const PAGE: &str = "page.html";
pub const ERROR: &str = "error.html";
pub const CAMLI_ERROR: &str = "camlierror.html";

/// Prefix of the command documentation tree.
pub const CMD_PATTERN: &str = "/cmd/";

/// The site's parsed templates.
pub struct Pages {
    tera: Tera,
    page_source: String,
}

impl Pages {
    /// Reads and parses the templates under `root/tmpl`.
    pub fn load(root: &Path) -> Result<Self> {
        let dir = root.join("tmpl");
        let read = |name: &str| {
            let path = dir.join(name);
            std::fs::read_to_string(&path)
                .map_err(|e| Error::Config(format!("reading template {}: {e}", path.display())))
        };
        Self::from_sources(&read(PAGE)?, &read(ERROR)?, &read(CAMLI_ERROR)?)
    }

    pub fn from_sources(page: &str, error: &str, camli_error: &str) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![(PAGE, page), (ERROR, error), (CAMLI_ERROR, camli_error)])?;
        Ok(Self { tera, page_source: page.to_owned() })
    }

    /// Unparsed `page.html`, handed to the deploy launcher as its theme.
    pub fn page_source(&self) -> &str {
        &self.page_source
    }

    /// A full page around `content`.
    ///
    /// Pages of the command documentation tree get an installation snippet
    /// before their first paragraph.
    pub fn page(&self, status: StatusCode, title: &str, subtitle: &str, content: &str) -> Response {
        let content = with_install_snippet(title, subtitle, content);
        let mut ctx = Context::new();
        ctx.insert("title", title);
        ctx.insert("subtitle", subtitle);
        ctx.insert("content", content.as_ref());
        let body = self.render(PAGE, &ctx);
        Response::builder().status(status).bytes(ContentType::Html, body.into_bytes())
    }

    /// `404` page for a missing content file.
    pub fn not_found(&self, relpath: &str, detail: &str) -> Response {
        let mut ctx = Context::new();
        ctx.insert("error", detail);
        let contents = self.render(ERROR, &ctx);
        self.page(StatusCode::NOT_FOUND, &format!("File {relpath}"), "", &contents)
    }

    /// Body for an error-code page; `description` is HTML.
    pub fn camli_error(&self, code: &str, description: &str) -> String {
        let mut ctx = Context::new();
        ctx.insert("code", code);
        ctx.insert("description", description);
        self.render(CAMLI_ERROR, &ctx)
    }

    // A broken template still yields a response, like a half-written page.
    fn render(&self, name: &str, ctx: &Context) -> String {
        self.tera.render(name, ctx).unwrap_or_else(|e| {
            error!(template = name, "render: {e}");
            String::new()
        })
    }
}

fn with_install_snippet<'a>(title: &str, subtitle: &str, content: &'a str) -> Cow<'a, str> {
    if !title.contains(CMD_PATTERN) || subtitle == CMD_PATTERN {
        return Cow::Borrowed(content);
    }
    let snippet = format!(
        "\n\t\t<h3>Installation</h3>\n\t\t<pre>go get camlistore.org/cmd/{}</pre>\n\t\t<h3>Overview</h3><p>",
        html_escape::encode_text(subtitle)
    );
    Cow::Owned(content.replacen("<p>", &snippet, 1))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const PAGE_SRC: &str =
        "<title>{{ title }}</title><h2>{{ subtitle }}</h2><main>{{ content | safe }}</main>";
    pub(crate) const ERROR_SRC: &str = "<pre>{{ error }}</pre>";
    pub(crate) const CAMLI_ERROR_SRC: &str = "<h1>{{ code }}</h1><p>{{ description | safe }}</p>";

    pub(crate) fn pages() -> Pages {
        Pages::from_sources(PAGE_SRC, ERROR_SRC, CAMLI_ERROR_SRC).unwrap()
    }

    fn body(res: &Response) -> String {
        String::from_utf8(res.body().to_vec()).unwrap()
    }

    #[test]
    fn page_wraps_content_and_escapes_title() {
        let res = pages().page(StatusCode::OK, "A <b> title", "", "<p>hi</p>");
        assert_eq!(res.header("content-type"), Some("text/html; charset=utf-8"));
        assert_eq!(body(&res), "<title>A &lt;b&gt; title</title><h2></h2><main><p>hi</p></main>");
    }

    #[test]
    fn not_found_names_the_file() {
        let res = pages().not_found("missing.html", "entity not found");
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        let text = body(&res);
        assert!(text.contains("<title>File missing.html</title>"), "{text}");
        assert!(text.contains("<main><pre>entity not found</pre></main>"), "{text}");
    }

    #[test]
    fn command_pages_get_an_install_snippet() {
        let res = pages().page(StatusCode::OK, "Command /cmd/camput", "camput", "<p>one</p><p>two</p>");
        let text = body(&res);
        assert!(text.contains("<pre>go get camlistore.org/cmd/camput</pre>"), "{text}");
        assert_eq!(text.matches("<h3>Overview</h3><p>one</p><p>two</p>").count(), 1, "{text}");
    }

    #[test]
    fn command_index_is_left_alone() {
        assert_eq!(with_install_snippet("Commands /cmd/", CMD_PATTERN, "<p>x</p>"), "<p>x</p>");
        assert_eq!(with_install_snippet("Overview", "camput", "<p>x</p>"), "<p>x</p>");
    }

    #[test]
    fn missing_template_dir_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(Pages::load(dir.path()), Err(Error::Config(_))));
    }

    #[test]
    fn invalid_template_is_a_template_error() {
        let err = Pages::from_sources("{% if %}", ERROR_SRC, CAMLI_ERROR_SRC).err().unwrap();
        assert!(matches!(err, Error::Template(_)), "{err}");
    }
}
