//! Access logging.
//!
//! Every handled request produces one [`LogRecord`], delivered by the
//! [`AccessLog`](crate::middleware::AccessLog) middleware to a single
//! [`LogSink`] chosen at startup:
//!
//! | Configuration | Sink |
//! |---|---|
//! | `--gce_log_name` set | [`cloud::CloudSink`] (Cloud Logging) |
//! | `--logdir` and/or `--logstdout` | [`apache::ApacheLogger`] (combined log format) |
//! | neither | no access log |
//!
//! Cloud and local logging never run together. When a deploy launcher is
//! mounted it gets its own [`LauncherLogger`], bound to a second cloud
//! client when cloud logging is active.

pub mod apache;
pub mod cloud;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::gcp::{MetadataProbe, TokenSource};
use crate::request::Request;
use crate::response::Response;

/// Common label attached to launcher lines in Cloud Logging.
pub const LAUNCHER_LABEL: (&str, &str) = ("from", "camli-gce-launcher");

/// One served request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogRecord {
    pub remote_addr: SocketAddr,
    pub time: DateTime<Utc>,
    pub method: String,
    pub uri: String,
    pub proto: String,
    pub status: u16,
    pub size: usize,
    pub referer: String,
    pub user_agent: String,
}

impl LogRecord {
    /// Captures the request side of a record before the handler consumes
    /// the request.
    pub(crate) fn start(req: &Request, time: DateTime<Utc>) -> Self {
        Self {
            remote_addr: req.remote_addr(),
            time,
            method: req.method().to_string(),
            uri: req.request_uri().to_owned(),
            proto: format!("{:?}", req.version()),
            status: 0,
            size: 0,
            referer: req.header("referer").unwrap_or("").to_owned(),
            user_agent: req.header("user-agent").unwrap_or("").to_owned(),
        }
    }

    pub(crate) fn finish(mut self, res: &Response) -> Self {
        self.status = res.status_code().as_u16();
        self.size = res.size();
        self
    }

    /// Apache combined log format line, without the trailing newline.
    pub fn combined(&self) -> String {
        format!(
            "{} - - [{}] \"{} {} {}\" {} {} \"{}\" \"{}\"",
            self.remote_addr.ip(),
            self.time.format("%d/%b/%Y:%H:%M:%S %z"),
            self.method,
            self.uri,
            self.proto,
            self.status,
            self.size,
            self.referer,
            self.user_agent,
        )
    }
}

/// Destination for access records.
pub trait LogSink: Send + Sync + 'static {
    fn log(&self, record: &LogRecord);
}

/// Settings the sink selection reads; a slice of the process configuration.
#[derive(Clone, Debug, Default)]
pub struct LogSettings {
    pub log_dir: Option<PathBuf>,
    pub stdout: bool,
    pub cloud_log_name: Option<String>,
    pub cloud_project: Option<String>,
    pub service_account_file: Option<PathBuf>,
}

/// Outcome of sink selection.
pub struct Sinks {
    pub access: Option<Arc<dyn LogSink>>,
    pub launcher: LauncherLogger,
}

/// Picks the access sink and the launcher logger.
///
/// Any cloud failure (no project, no credentials, failed ping) is fatal:
/// the server does not quietly fall back to local logs.
pub async fn select(settings: &LogSettings, probe: &dyn MetadataProbe) -> Result<Sinks> {
    let Some(log_name) = settings.cloud_log_name.as_deref().filter(|n| !n.is_empty()) else {
        let access: Option<Arc<dyn LogSink>> = if settings.log_dir.is_some() || settings.stdout {
            Some(Arc::new(apache::ApacheLogger::spawn(settings.log_dir.clone(), settings.stdout).await?))
        } else {
            None
        };
        return Ok(Sinks { access, launcher: LauncherLogger::local() });
    };

    let project = match settings.cloud_project.as_deref().filter(|p| !p.is_empty()) {
        Some(p) => p.to_owned(),
        None => probe.project_id().await.map_err(|e| {
            Error::Config(format!(
                "--gce_log_name requires --gce_project_id when not running on GCE: {e}"
            ))
        })?,
    };

    let tokens = match &settings.service_account_file {
        Some(path) => TokenSource::from_key_file(path, &[cloud::LOGGING_SCOPE]).await?,
        None if probe.on_gce().await => TokenSource::metadata(),
        None => {
            return Err(Error::Auth("no --gce_jwt_file and not running on GCE".into()));
        }
    };

    let client = cloud::CloudLogClient::new(&project, log_name, tokens.clone())?;
    client.ping().await?;
    info!(project = %project, log = %log_name, "access logs go to Cloud Logging");

    let launcher_client = cloud::CloudLogClient::new(&project, log_name, tokens)?
        .with_label(LAUNCHER_LABEL.0, LAUNCHER_LABEL.1);

    Ok(Sinks {
        access: Some(Arc::new(cloud::CloudSink::spawn(client))),
        launcher: LauncherLogger::cloud(cloud::CloudWriter::spawn(launcher_client)),
    })
}

/// Logger handed to the deploy launcher. Every line carries the
/// `launcher: ` prefix.
#[derive(Clone)]
pub struct LauncherLogger {
    cloud: Option<cloud::CloudWriter>,
}

impl LauncherLogger {
    pub const PREFIX: &'static str = "launcher: ";

    /// Lines go to the process diagnostics.
    pub fn local() -> Self {
        Self { cloud: None }
    }

    pub fn cloud(writer: cloud::CloudWriter) -> Self {
        Self { cloud: Some(writer) }
    }

    pub fn is_cloud(&self) -> bool {
        self.cloud.is_some()
    }

    pub fn log(&self, message: &str) {
        let line = format!("{}{message}", Self::PREFIX);
        match &self.cloud {
            Some(writer) => writer.text(line),
            None => info!("{line}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use chrono::TimeZone;
    use http::StatusCode;

    use super::*;
    use crate::gcp::testing::FakeProbe;

    fn sample() -> LogRecord {
        let req = http::Request::builder()
            .method("GET")
            .uri("/docs/?q=1")
            .header("referer", "https://example.com/")
            .header("user-agent", "curl/8.0")
            .body(Bytes::new())
            .unwrap();
        let req = Request::new(req, "192.0.2.7:5555".parse().unwrap(), false);
        let time = Utc.with_ymd_and_hms(2026, 10, 17, 9, 5, 3).unwrap();
        let res = Response::builder().status(StatusCode::NOT_FOUND).text("missing");
        LogRecord::start(&req, time).finish(&res)
    }

    #[test]
    fn record_captures_both_sides_of_the_exchange() {
        let rec = sample();
        assert_eq!(rec.method, "GET");
        assert_eq!(rec.uri, "/docs/?q=1");
        assert_eq!(rec.proto, "HTTP/1.1");
        assert_eq!(rec.status, 404);
        assert_eq!(rec.size, 7);
        assert_eq!(rec.referer, "https://example.com/");
        assert_eq!(rec.user_agent, "curl/8.0");
    }

    #[test]
    fn combined_format_matches_apache() {
        assert_eq!(
            sample().combined(),
            "192.0.2.7 - - [17/Oct/2026:09:05:03 +0000] \"GET /docs/?q=1 HTTP/1.1\" 404 7 \"https://example.com/\" \"curl/8.0\""
        );
    }

    #[tokio::test]
    async fn local_selection_without_outputs_disables_access_log() {
        let sinks = select(&LogSettings::default(), &FakeProbe::off_gce()).await.unwrap();
        assert!(sinks.access.is_none());
        assert!(!sinks.launcher.is_cloud());
    }

    #[tokio::test]
    async fn stdout_selection_builds_a_local_sink() {
        let settings = LogSettings { stdout: true, ..Default::default() };
        let sinks = select(&settings, &FakeProbe::off_gce()).await.unwrap();
        assert!(sinks.access.is_some());
    }

    #[tokio::test]
    async fn cloud_without_project_off_gce_is_fatal() {
        let settings = LogSettings {
            cloud_log_name: Some("camweb-access-log".into()),
            ..Default::default()
        };
        let err = select(&settings, &FakeProbe::off_gce()).await.err().unwrap();
        assert!(matches!(err, Error::Config(_)), "{err}");
    }

    #[tokio::test]
    async fn cloud_without_credentials_off_gce_is_fatal() {
        let settings = LogSettings {
            cloud_log_name: Some("camweb-access-log".into()),
            cloud_project: Some("camlistore-website".into()),
            ..Default::default()
        };
        let err = select(&settings, &FakeProbe::off_gce()).await.err().unwrap();
        assert!(matches!(err, Error::Auth(_)), "{err}");
    }
}
