//! Deploy launcher mounted at `/launch/`.
//!
//! The launcher walks visitors through creating their own Camlistore
//! instance. Its workflow lives behind [`LauncherFactory`]; this module
//! owns what the website needs to know to mount one: the credentials
//! ([`LauncherConfig`]), the public `host:port` its OAuth callback uses,
//! the page theme, and the logger.

use std::sync::Arc;

use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};
use tracing::info;

use crate::env::Environment;
use crate::error::{Error, Result};
use crate::handler::{BoxFuture, BoxedEndpoint, Endpoint};
use crate::logging::LauncherLogger;
use crate::middleware::guard::CANONICAL_HOST;
use crate::request::Request;
use crate::response::{ContentType, Response};

pub const PREFIX: &str = "/launch/";

/// OAuth client and target project for launched instances. The JSON keys
/// are the ones `launcher-config.json` has always used.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LauncherConfig {
    #[serde(rename = "ClientID")]
    pub client_id: String,
    pub client_secret: String,
    pub project: String,
    pub service_account: String,
    pub data_dir: String,
}

/// Everything a launcher is built from.
pub struct LauncherParams {
    /// Public `host:port` of the site, for building callback URLs.
    pub host_port: String,
    /// Mount point, with trailing slash.
    pub prefix: String,
    pub config: LauncherConfig,
    /// Source of the site's `page.html`.
    pub theme: String,
    pub logger: LauncherLogger,
}

/// Builds the launcher endpoint.
pub trait LauncherFactory: Send + Sync {
    fn build(&self, params: LauncherParams) -> Result<BoxedEndpoint>;
}

/// The launcher's public `host:port`, or `None` when it cannot know it.
///
/// Production is always `camlistore.org:443`. Elsewhere it comes from the
/// HTTPS listen address, which therefore needs an explicit host.
pub fn host_port(env: Environment, https_addr: &str) -> Option<String> {
    if env.is_production() {
        return Some(format!("{CANONICAL_HOST}:443"));
    }
    let (host, port) = split_host_port(https_addr);
    let port = port.unwrap_or("443");
    if host.is_empty() || port.parse::<u16>().is_err() {
        return None;
    }
    Some(format!("{host}:{port}"))
}

/// Splits `host:port`, keeping brackets on IPv6 literals.
fn split_host_port(addr: &str) -> (&str, Option<&str>) {
    if addr.starts_with('[') {
        return match addr.find(']') {
            Some(end) => (&addr[..=end], addr[end + 1..].strip_prefix(':')),
            None => (addr, None),
        };
    }
    match addr.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (addr, None),
    }
}

/// Landing page for the launcher: a themed page telling visitors which
/// project instances are created in and where sign-in returns to.
pub struct LandingLauncher;

impl LauncherFactory for LandingLauncher {
    fn build(&self, params: LauncherParams) -> Result<BoxedEndpoint> {
        if params.config.client_id.is_empty() {
            return Err(Error::Config("launcher config has no ClientID".into()));
        }
        let mut tera = Tera::default();
        tera.add_raw_template("theme.html", &params.theme)?;
        info!(
            "Starting Camlistore launcher on https://{}{}",
            params.host_port, params.prefix
        );
        Ok(Arc::new(Landing { tera: Arc::new(tera), params: Arc::new(params) }))
    }
}

#[derive(Clone)]
struct Landing {
    tera: Arc<Tera>,
    params: Arc<LauncherParams>,
}

impl Landing {
    fn serve(&self, req: &Request) -> Response {
        self.params.logger.log(&format!("{} {}", req.method(), req.request_uri()));
        if req.method() != Method::GET && req.method() != Method::HEAD {
            return Response::status(StatusCode::METHOD_NOT_ALLOWED);
        }
        let p = &self.params;
        let content = format!(
            "<p>Instances are created in project <code>{}</code>.</p>\n\
             <p>Sign-in returns to <code>https://{}{}callback</code>.</p>",
            html_escape::encode_text(&p.config.project),
            html_escape::encode_text(&p.host_port),
            html_escape::encode_text(&p.prefix),
        );
        let mut ctx = Context::new();
        ctx.insert("title", "Camlistore on Google Cloud");
        ctx.insert("subtitle", "");
        ctx.insert("content", &content);
        match self.tera.render("theme.html", &ctx) {
            Ok(html) => Response::builder().bytes(ContentType::Html, html.into_bytes()),
            Err(e) => {
                p.logger.log(&format!("theme: {e}"));
                Response::status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

impl Endpoint for Landing {
    fn call(&self, req: Request) -> BoxFuture {
        let res = self.serve(&req);
        Box::pin(async move { res })
    }
}
