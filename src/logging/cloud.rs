//! Cloud Logging output.
//!
//! [`CloudLogClient`] writes entries with the `entries:write` API.
//! [`CloudWriter`] puts a channel in front of a client so request handlers
//! never wait on the network; a background task drains it in batches.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

use super::{LogRecord, LogSink};
use crate::error::{Error, Result};
use crate::gcp::TokenSource;

/// OAuth2 scope for writing log entries.
pub const LOGGING_SCOPE: &str = "https://www.googleapis.com/auth/logging.write";

const WRITE_URL: &str = "https://logging.googleapis.com/v2/entries:write";
const MAX_BATCH: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_payload: Option<Value>,
}

impl Entry {
    pub fn text(time: DateTime<Utc>, text: String) -> Self {
        Self { timestamp: rfc3339(time), text_payload: Some(text), json_payload: None }
    }

    pub fn json(time: DateTime<Utc>, payload: Value) -> Self {
        Self { timestamp: rfc3339(time), text_payload: None, json_payload: Some(payload) }
    }
}

fn rfc3339(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WriteRequest<'a> {
    log_name: &'a str,
    resource: Resource,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    labels: &'a BTreeMap<String, String>,
    entries: &'a [Entry],
}

#[derive(Serialize)]
struct Resource {
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Writes to one log of one project.
#[derive(Clone)]
pub struct CloudLogClient {
    http: Client,
    log_name: String,
    labels: BTreeMap<String, String>,
    tokens: TokenSource,
}

impl CloudLogClient {
    pub fn new(project: &str, log_name: &str, tokens: TokenSource) -> Result<Self> {
        if project.is_empty() || log_name.is_empty() {
            return Err(Error::Config("cloud logging needs a project and a log name".into()));
        }
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            log_name: format!("projects/{project}/logs/{log_name}"),
            labels: BTreeMap::new(),
            tokens,
        })
    }

    /// Adds a label attached to every entry this client writes.
    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn log_name(&self) -> &str {
        &self.log_name
    }

    /// Writes one entry to check that the project, credentials and log
    /// name all work.
    pub async fn ping(&self) -> Result<()> {
        self.write(&[Entry::text(Utc::now(), "ping".into())]).await
    }

    pub async fn write(&self, entries: &[Entry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let token = self.tokens.token().await?;
        let body = WriteRequest {
            log_name: &self.log_name,
            resource: Resource { kind: "global" },
            labels: &self.labels,
            entries,
        };
        let res = self.http.post(WRITE_URL).bearer_auth(token).json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(Error::Config(format!("writing to {}: {status}: {text}", self.log_name)));
        }
        Ok(())
    }
}

/// Non-blocking, cloneable handle that queues entries for a client.
#[derive(Clone)]
pub struct CloudWriter {
    tx: mpsc::UnboundedSender<Entry>,
}

impl CloudWriter {
    /// Starts the flushing task on the current runtime.
    pub fn spawn(client: CloudLogClient) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(flush(client, rx));
        Self { tx }
    }

    pub fn text(&self, text: String) {
        self.push(Entry::text(Utc::now(), text));
    }

    pub fn json(&self, time: DateTime<Utc>, payload: Value) {
        self.push(Entry::json(time, payload));
    }

    fn push(&self, entry: Entry) {
        // Closed only once the flusher is gone, i.e. at runtime shutdown.
        let _ = self.tx.send(entry);
    }
}

async fn flush(client: CloudLogClient, mut rx: mpsc::UnboundedReceiver<Entry>) {
    let mut batch = Vec::with_capacity(MAX_BATCH);
    while rx.recv_many(&mut batch, MAX_BATCH).await > 0 {
        if let Err(e) = client.write(&batch).await {
            warn!(log = %client.log_name(), dropped = batch.len(), "cloud logging: {e}");
        }
        batch.clear();
    }
}

/// Access-log sink sending each record as a structured entry.
pub struct CloudSink {
    writer: CloudWriter,
}

impl CloudSink {
    pub fn spawn(client: CloudLogClient) -> Self {
        Self { writer: CloudWriter::spawn(client) }
    }
}

impl LogSink for CloudSink {
    fn log(&self, record: &LogRecord) {
        match serde_json::to_value(record) {
            Ok(payload) => self.writer.json(record.time, payload),
            Err(e) => warn!("encoding access record: {e}"),
        }
    }
}
