use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use camweb::config::Config;
use camweb::env::Environment;
use camweb::gcp::{GcsBucket, MetadataClient, ObjectStore, TokenSource};
use camweb::launcher::{self, LandingLauncher, LauncherFactory, LauncherParams};
use camweb::pages::Pages;
use camweb::proxy::ReverseProxy;
use camweb::site::Site;
use camweb::supervisor::Supervisor;
use camweb::{bootstrap, logging};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Config::parse()).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(mut cfg: Config) -> anyhow::Result<()> {
    let probe = MetadataClient::new();
    let env = Environment::detect(&probe).await;
    info!(environment = %env, "starting");

    let store: Option<Box<dyn ObjectStore>> = if env.is_production() {
        cfg.apply_production();
        let bucket = GcsBucket::new(bootstrap::RESOURCE_BUCKET, TokenSource::metadata())?;
        Some(Box::new(bucket))
    } else {
        None
    };

    let root = cfg.root().context("resolving website root")?;
    if env.is_production() {
        bootstrap::prepare_production(&cfg, &root).await.context("preparing production host")?;
    }

    let pages = Arc::new(Pages::load(&root).context("loading templates")?);
    let sinks = logging::select(&cfg.log_settings(), &probe).await.context("setting up access logs")?;

    let tls = bootstrap::tls_material(env, &cfg, store.as_deref())
        .await
        .context("loading TLS material")?
        .map(|m| m.server_config())
        .transpose()
        .context("building TLS configuration")?;

    let mut site = Site::new(root.clone(), Arc::clone(&pages));
    if let Some((host, backend)) = cfg.buildbot() {
        let proxy = ReverseProxy::new(backend).context("buildbot backend")?;
        site.buildbot = Some((host.to_owned(), proxy));
    }
    if let Some(backend) = cfg.docs_backend() {
        site.docs = Some(Arc::new(ReverseProxy::new(backend).context("docs backend")?));
    }

    if let Some(https) = cfg.https_addr() {
        match launcher::host_port(env, https) {
            None => info!("starting without a launcher: --https needs an explicit host:port"),
            Some(host_port) => {
                let config_dir = bootstrap::camli_config_dir();
                let config = bootstrap::launcher_config(
                    env,
                    store.as_deref(),
                    |name| std::env::var(name).ok(),
                    config_dir.as_deref(),
                )
                .await
                .context("loading launcher credentials")?;
                match config {
                    None => info!("starting without a launcher: no credentials"),
                    Some(config) => {
                        let params = LauncherParams {
                            host_port,
                            prefix: launcher::PREFIX.to_owned(),
                            config,
                            theme: pages.page_source().to_owned(),
                            logger: sinks.launcher.clone(),
                        };
                        site.launcher = Some(LandingLauncher.build(params).context("starting launcher")?);
                    }
                }
            }
        }
    }

    let src_dir = cfg.src_dir(env, &root);
    let supervisor = Supervisor {
        env,
        http_addr: cfg.http.clone(),
        https: cfg.https_addr().map(str::to_owned).zip(tls),
        endpoint: site.into_endpoint(sinks.access),
        demo_blobserver: true,
        src_dir,
        also_run: cfg.also_run.clone(),
    };
    supervisor.run().await.context("serving")?;
    Ok(())
}
