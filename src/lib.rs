//! # camweb
//!
//! The camlistore.org website server.
//!
//! Every request flows through one chain, built once at startup:
//!
//! ```text
//! AccessLog → HostGuard → Router ─┬─ host routes (buildbot proxy)
//!                                 ├─ fixed routes (/static/, /err/, /r/, /launch/, …)
//!                                 └─ fallback: redirect rules, else content pages
//! ```
//!
//! Around it sits the startup work: detecting whether this is the
//! production instance, preparing the production host, choosing where
//! access logs go, fetching TLS material and launcher credentials, and
//! finally the [`supervisor`] that runs the listeners until one fails.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use camweb::{pages::Pages, site::Site, Server};
//!
//! #[tokio::main]
//! async fn main() -> camweb::Result<()> {
//!     let root = std::env::current_dir()?;
//!     let pages = Arc::new(Pages::load(&root)?);
//!     let endpoint = Site::new(root, pages).into_endpoint(None);
//!     Server::bind(":31798").serve(endpoint).await
//! }
//! ```

mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod assets;
pub mod bootstrap;
pub mod config;
pub mod containers;
pub mod content;
pub mod debug;
pub mod env;
pub mod errcode;
pub mod gcp;
pub mod launcher;
pub mod logging;
pub mod middleware;
pub mod notify;
pub mod pages;
pub mod proxy;
pub mod redirect;
pub mod site;
pub mod supervisor;
pub mod tls;

pub use error::{Error, Result};
pub use handler::{BoxFuture, BoxedEndpoint, Endpoint, Handler};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::{Server, TLS_KEEPALIVE};
