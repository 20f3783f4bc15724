//! The website's route table and middleware chain.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::assets::StaticDir;
use crate::content::ContentRouter;
use crate::handler::{BoxedEndpoint, Endpoint};
use crate::launcher;
use crate::logging::LogSink;
use crate::middleware::{AccessLog, HostGuard};
use crate::pages::Pages;
use crate::proxy::ReverseProxy;
use crate::request::Request;
use crate::router::Router;
use crate::{debug, errcode, redirect};

/// Everything the route table is built from.
pub struct Site {
    /// Website root: parent of `content`, `static`, `talks` and `tmpl`.
    pub root: PathBuf,
    pub pages: Arc<Pages>,
    pub started: Instant,
    /// Host whose requests all go to the proxy.
    pub buildbot: Option<(String, ReverseProxy)>,
    pub launcher: Option<BoxedEndpoint>,
    /// Package and command documentation, served under `/pkg/` and `/cmd/`.
    pub docs: Option<BoxedEndpoint>,
}

impl Site {
    pub fn new(root: PathBuf, pages: Arc<Pages>) -> Self {
        Self { root, pages, started: Instant::now(), buildbot: None, launcher: None, docs: None }
    }

    /// The route table.
    pub fn routes(&self) -> Router {
        let static_dir = self.root.join("static");
        let content = ContentRouter::new(&self.root, Arc::clone(&self.pages));

        let mut router = Router::new()
            .mount("/favicon.ico", Arc::new(StaticDir::new(&static_dir)))
            .mount("/robots.txt", Arc::new(StaticDir::new(&static_dir)))
            .mount("/static/", Arc::new(StaticDir::stripped("/static/", &static_dir)))
            .mount("/talks/", Arc::new(StaticDir::stripped("/talks/", self.root.join("talks"))))
            .any(errcode::ERR_PATTERN, errcode::handler(Arc::clone(&self.pages)))
            .any("/r/", redirect::external)
            .any("/dl/", redirect::external)
            .get("/debug/ip", debug::ip)
            .get("/debug/uptime", debug::uptime(self.started))
            .any("/docs/contributing", redirect::to("/code#contributing"))
            .any("/lists", redirect::to("/community"))
            .fallback(move |req: Request| {
                let content = content.clone();
                async move {
                    match redirect::respond(&req) {
                        Some(res) => res,
                        None => content.call(req).await,
                    }
                }
            });

        if let Some(docs) = &self.docs {
            router = router.mount("/pkg/", Arc::clone(docs)).mount("/cmd/", Arc::clone(docs));
        }
        if let Some((host, proxy)) = &self.buildbot {
            router = router.host(host, Arc::new(proxy.clone()));
        }
        if let Some(launcher) = &self.launcher {
            router = router.mount(launcher::PREFIX, Arc::clone(launcher));
        }
        router
    }

    /// The full chain: access log, host guard, route table.
    pub fn into_endpoint(self, access_log: Option<Arc<dyn LogSink>>) -> BoxedEndpoint {
        let guarded: BoxedEndpoint = Arc::new(HostGuard::new(Arc::new(self.routes())));
        match access_log {
            Some(sink) => Arc::new(AccessLog::new(guarded, sink)),
            None => guarded,
        }
    }
}
