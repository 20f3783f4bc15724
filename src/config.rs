//! Command-line configuration.

use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};

use crate::env::{Environment, PROD_SRC_DIR};
use crate::logging::LogSettings;

/// Default plain-HTTP listen address.
pub const DEFAULT_ADDR: &str = ":31798";

/// Serves the camlistore.org website.
///
/// Every flag may also be set through the `CAMWEB_*` environment variable
/// named after it.
#[derive(Clone, Debug, Parser)]
#[command(name = "camweb", version, about)]
pub struct Config {
    /// HTTP service address (e.g. ':31798').
    #[arg(long, env = "CAMWEB_HTTP", default_value = DEFAULT_ADDR)]
    pub http: String,

    /// HTTPS service address.
    #[arg(long, env = "CAMWEB_HTTPS")]
    pub https: Option<String>,

    /// Website root (parent of 'static', 'content', and 'tmpl'). Defaults
    /// to the current directory.
    #[arg(long, env = "CAMWEB_ROOT")]
    pub root: Option<String>,

    /// Directory to write log files to (one per hour), or empty to not log.
    #[arg(long, env = "CAMWEB_LOGDIR")]
    pub logdir: Option<String>,

    /// Write access logs to stdout.
    #[arg(long, env = "CAMWEB_LOGSTDOUT", default_value_t = true, action = ArgAction::Set)]
    pub logstdout: bool,

    /// TLS cert file.
    #[arg(long, env = "CAMWEB_TLSCERT")]
    pub tlscert: Option<PathBuf>,

    /// TLS private key file.
    #[arg(long, env = "CAMWEB_TLSKEY")]
    pub tlskey: Option<PathBuf>,

    /// Build bot status backend URL.
    #[arg(long = "buildbot_backend", env = "CAMWEB_BUILDBOT_BACKEND")]
    pub buildbot_backend: Option<String>,

    /// Hostname to map to the buildbot backend: requests for this host are
    /// proxied there.
    #[arg(long = "buildbot_host", env = "CAMWEB_BUILDBOT_HOST")]
    pub buildbot_host: Option<String>,

    /// Documentation server URL; `/pkg/` and `/cmd/` are proxied there.
    #[arg(long = "docs_backend", env = "CAMWEB_DOCS_BACKEND")]
    pub docs_backend: Option<String>,

    /// Optional program to run as a child process.
    #[arg(long = "also_run", env = "CAMWEB_ALSO_RUN")]
    pub also_run: Option<String>,

    /// GCE project ID; required if not running on GCE and gce_log_name is
    /// specified.
    #[arg(long = "gce_project_id", env = "CAMWEB_GCE_PROJECT_ID")]
    pub gce_project_id: Option<String>,

    /// Cloud Logging log name; if set, access logs go to Cloud Logging
    /// instead of local files.
    #[arg(long = "gce_log_name", env = "CAMWEB_GCE_LOG_NAME")]
    pub gce_log_name: Option<String>,

    /// Service account JSON key file for Cloud Logging.
    #[arg(long = "gce_jwt_file", env = "CAMWEB_GCE_JWT_FILE")]
    pub gce_jwt_file: Option<PathBuf>,

    /// Use git in the camlistore/git Docker container.
    #[arg(long = "git_container", env = "CAMWEB_GIT_CONTAINER", default_value_t = false, action = ArgAction::Set)]
    pub git_container: bool,

    /// Comma-separated recipients of the startup email.
    #[arg(long = "email_to", env = "CAMWEB_EMAIL_TO")]
    pub email_to: Option<String>,

    /// SMTP relay (host:port) for outgoing mail.
    #[arg(long = "smtp_server", env = "CAMWEB_SMTP_SERVER")]
    pub smtp_server: Option<String>,
}

impl Config {
    /// Overrides the flags production always runs with.
    pub fn apply_production(&mut self) {
        self.http = ":80".into();
        self.https = Some(":443".into());
        self.buildbot_backend = Some("https://travis-ci.org/camlistore/camlistore".into());
        self.buildbot_host = Some("build.camlistore.org".into());
        self.gce_log_name = Some("camweb-access-log".into());
        self.root = Some(format!("{PROD_SRC_DIR}/website"));
        self.git_container = true;
        self.email_to = Some("camlistore-commits@googlegroups.com".into());
        self.smtp_server = Some("50.19.239.94:2500".into());
    }

    /// The website root, falling back to the current directory when unset
    /// or empty.
    pub fn root(&self) -> std::io::Result<PathBuf> {
        match self.root.as_deref().filter(|r| !r.is_empty()) {
            Some(root) => Ok(PathBuf::from(root)),
            None => std::env::current_dir(),
        }
    }

    /// Top of the source tree: the production clone, or the parent of the
    /// website root in development.
    pub fn src_dir(&self, env: Environment, root: &Path) -> PathBuf {
        match env {
            Environment::Production => PathBuf::from(PROD_SRC_DIR),
            Environment::Development => root.parent().unwrap_or(root).to_path_buf(),
        }
    }

    /// The HTTPS address, if one is set and non-empty.
    pub fn https_addr(&self) -> Option<&str> {
        self.https.as_deref().filter(|a| !a.is_empty())
    }

    /// The buildbot host/backend pair, when both are set.
    pub fn buildbot(&self) -> Option<(&str, &str)> {
        let host = self.buildbot_host.as_deref().filter(|h| !h.is_empty())?;
        let backend = self.buildbot_backend.as_deref().filter(|b| !b.is_empty())?;
        Some((host, backend))
    }

    pub fn docs_backend(&self) -> Option<&str> {
        self.docs_backend.as_deref().filter(|b| !b.is_empty())
    }

    pub fn email_recipients(&self) -> Vec<String> {
        self.email_to
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect()
    }

    pub fn log_settings(&self) -> LogSettings {
        LogSettings {
            log_dir: self.logdir.as_deref().filter(|d| !d.is_empty()).map(PathBuf::from),
            stdout: self.logstdout,
            cloud_log_name: self.gce_log_name.clone(),
            cloud_project: self.gce_project_id.clone(),
            service_account_file: self.gce_jwt_file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("camweb").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults() {
        let cfg = parse(&[]);
        assert_eq!(cfg.http, ":31798");
        assert!(cfg.logstdout);
        assert!(!cfg.git_container);
        assert!(cfg.https_addr().is_none());
        assert!(cfg.buildbot().is_none());
        assert!(cfg.docs_backend().is_none());
    }

    #[test]
    fn docs_backend_is_optional() {
        let cfg = parse(&["--docs_backend", "http://127.0.0.1:6060"]);
        assert_eq!(cfg.docs_backend(), Some("http://127.0.0.1:6060"));
        assert!(parse(&["--docs_backend", ""]).docs_backend().is_none());
    }

    #[test]
    fn underscore_flag_names_are_accepted() {
        let cfg = parse(&[
            "--buildbot_host", "build.example.org",
            "--buildbot_backend", "http://127.0.0.1:9000",
            "--logstdout", "false",
            "--email_to", "a@example.org, b@example.org",
        ]);
        assert_eq!(cfg.buildbot(), Some(("build.example.org", "http://127.0.0.1:9000")));
        assert!(!cfg.logstdout);
        assert_eq!(cfg.email_recipients(), vec!["a@example.org", "b@example.org"]);
    }

    #[test]
    fn production_overrides() {
        let mut cfg = parse(&["--http", ":8080", "--root", "/tmp/site"]);
        cfg.apply_production();
        assert_eq!(cfg.http, ":80");
        assert_eq!(cfg.https_addr(), Some(":443"));
        assert_eq!(cfg.buildbot(), Some(("build.camlistore.org", "https://travis-ci.org/camlistore/camlistore")));
        assert_eq!(cfg.gce_log_name.as_deref(), Some("camweb-access-log"));
        assert_eq!(cfg.root().unwrap(), PathBuf::from("/var/camweb/src/camlistore.org/website"));
        assert!(cfg.git_container);
        assert_eq!(cfg.email_recipients(), vec!["camlistore-commits@googlegroups.com"]);
        assert_eq!(cfg.smtp_server.as_deref(), Some("50.19.239.94:2500"));
    }

    #[test]
    fn empty_root_is_the_working_directory() {
        let cfg = parse(&["--root", ""]);
        assert_eq!(cfg.root().unwrap(), std::env::current_dir().unwrap());
    }

    #[test]
    fn development_sources_are_the_parent_of_root() {
        let cfg = parse(&[]);
        let root = Path::new("/home/dev/camlistore/website");
        assert_eq!(cfg.src_dir(Environment::Development, root), PathBuf::from("/home/dev/camlistore"));
        assert_eq!(cfg.src_dir(Environment::Production, root), PathBuf::from(PROD_SRC_DIR));
    }

    #[test]
    fn empty_logdir_means_no_files() {
        let cfg = parse(&["--logdir", ""]);
        assert!(cfg.log_settings().log_dir.is_none());
    }
}
