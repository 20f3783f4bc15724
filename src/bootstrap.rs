//! One-time startup work: preparing the production host, and locating the
//! TLS material and launcher credentials for the current environment.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::Config;
use crate::containers::{self, Git};
use crate::env::{Environment, PROD_SRC_DIR};
use crate::error::{Error, Result};
use crate::gcp::ObjectStore;
use crate::launcher::LauncherConfig;
use crate::notify::StartupMail;
use crate::tls::TlsMaterial;

/// Bucket holding the production certificate and launcher credentials.
pub const RESOURCE_BUCKET: &str = "camlistore-website-resource";
pub const LAUNCHER_CONFIG: &str = "launcher-config.json";

/// Overrides the camlistore configuration directory.
const CONFIG_DIR_VAR: &str = "CAMLI_CONFIG_DIR";

/// Prepares a fresh production host: a clean source clone to serve from,
/// the container images the site relies on, and a restart notice.
///
/// Everything but the email is fatal.
pub async fn prepare_production(cfg: &Config, root: &Path) -> Result<()> {
    let src = Path::new(PROD_SRC_DIR);
    match tokio::fs::remove_dir_all(src).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => {
            return Err(Error::Config(format!("removing {}: {e}", src.display())));
        }
        _ => {}
    }
    tokio::fs::create_dir_all(src).await?;

    let http = reqwest::Client::builder().connect_timeout(Duration::from_secs(10)).build()?;
    containers::ensure_image(&http, containers::GIT_IMAGE).await?;
    containers::ensure_image(&http, containers::DEMO_IMAGE).await?;

    let git = Git { container: cfg.git_container };
    git.clone_shallow(src).await?;
    std::env::set_current_dir(root)?;
    info!(root = %root.display(), "source tree ready");

    let mail = StartupMail {
        recipients: cfg.email_recipients(),
        relay: cfg.smtp_server.clone().unwrap_or_default(),
    };
    let sent = async {
        let revision = git.revision(src).await?;
        mail.send(&revision).await
    };
    if let Err(e) = sent.await {
        warn!("startup email: {e}");
    }
    Ok(())
}

/// Certificate and key for the HTTPS listener, or `None` without `--https`.
///
/// Production reads them from the resource bucket; development from the
/// `--tlscert` and `--tlskey` files.
pub async fn tls_material(
    env: Environment,
    cfg: &Config,
    store: Option<&dyn ObjectStore>,
) -> Result<Option<TlsMaterial>> {
    if cfg.https_addr().is_none() {
        return Ok(None);
    }
    if env.is_production() {
        let store = store.ok_or_else(|| Error::Config("production needs the resource bucket".into()))?;
        return TlsMaterial::from_store(store).await.map(Some);
    }
    match (&cfg.tlscert, &cfg.tlskey) {
        (Some(cert), Some(key)) => TlsMaterial::from_files(cert, key).await.map(Some),
        _ => Err(Error::Config("--https requires --tlscert and --tlskey".into())),
    }
}

/// Finds the launcher credentials.
///
/// In production they must be in the resource bucket. Elsewhere the
/// `CAMLI_GCE_*` variables win when `CAMLI_GCE_CLIENTID` is set, then
/// `launcher-config.json` in `config_dir`. Finding nothing outside
/// production is `Ok(None)`.
pub async fn launcher_config<F>(
    env: Environment,
    store: Option<&dyn ObjectStore>,
    var: F,
    config_dir: Option<&Path>,
) -> Result<Option<LauncherConfig>>
where
    F: Fn(&str) -> Option<String>,
{
    if env.is_production() {
        let store = store.ok_or_else(|| Error::Config("production needs the resource bucket".into()))?;
        let data = store.get(LAUNCHER_CONFIG).await?;
        let config = serde_json::from_slice(&data)
            .map_err(|e| Error::Config(format!("decoding {LAUNCHER_CONFIG}: {e}")))?;
        return Ok(Some(config));
    }

    if let Some(client_id) = var("CAMLI_GCE_CLIENTID").filter(|id| !id.is_empty()) {
        let get = |name: &str| var(name).unwrap_or_default();
        return Ok(Some(LauncherConfig {
            client_id,
            client_secret: get("CAMLI_GCE_CLIENTSECRET"),
            project: get("CAMLI_GCE_PROJECT"),
            service_account: get("CAMLI_GCE_SERVICE_ACCOUNT"),
            data_dir: get("CAMLI_GCE_DATA"),
        }));
    }

    let Some(dir) = config_dir else { return Ok(None) };
    let path = dir.join(LAUNCHER_CONFIG);
    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Config(format!("reading {}: {e}", path.display()))),
    };
    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|e| Error::Config(format!("decoding {}: {e}", path.display())))
}

/// The camlistore configuration directory: `$CAMLI_CONFIG_DIR`, else
/// `camlistore` under the platform config directory.
pub fn camli_config_dir() -> Option<PathBuf> {
    match std::env::var_os(CONFIG_DIR_VAR) {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|d| d.join("camlistore")),
    }
}
