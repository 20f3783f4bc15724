//! `/err/<code>`: explanations for the error codes Camlistore tools print.

use std::sync::{Arc, LazyLock};

use http::StatusCode;
use regex::Regex;

use crate::handler::Handler;
use crate::pages::Pages;
use crate::request::Request;
use crate::response::Response;

pub const ERR_PATTERN: &str = "/err/";

static CAMLI_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(https?://camlistore.org)([-a-zA-Z0-9_/]+)?").expect("valid regex"));

const CODES: &[(&str, &str)] = &[
    (
        "client-no-server",
        "No valid server defined. It can be set with the CAMLI_SERVER environment variable, \
         or the --server flag, or in the \"servers\" section of the client configuration file \
         (see https://camlistore.org/docs/client-config).",
    ),
    ("client-no-public-key", "No public key configured: see 'camput init'."),
];

/// Plain-text description of a known code.
pub fn lookup(code: &str) -> Option<&'static str> {
    CODES.iter().find(|(c, _)| *c == code).map(|(_, desc)| *desc)
}

/// Escapes `text` for HTML and links every camlistore.org URL in it.
pub fn hyperlink(text: &str) -> String {
    let escaped = html_escape::encode_text(text);
    CAMLI_URL.replace_all(&escaped, r#"<a href="$1$2">$1$2</a>"#).into_owned()
}

/// Handler for the `/err/` subtree.
pub fn handler(pages: Arc<Pages>) -> impl Handler {
    move |req: Request| {
        let pages = Arc::clone(&pages);
        async move { serve(&pages, &req) }
    }
}

fn serve(pages: &Pages, req: &Request) -> Response {
    let path = req.decoded_path();
    let code = path.strip_prefix(ERR_PATTERN).unwrap_or("");
    match lookup(code) {
        Some(desc) => {
            let contents = pages.camli_error(code, &hyperlink(desc));
            pages.page(StatusCode::OK, code, "", &contents)
        }
        None => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .text(format!("unknown error: {code}")),
    }
}
