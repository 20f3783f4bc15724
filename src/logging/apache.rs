//! Local access logs in Apache combined format.
//!
//! With a log directory, records go to one file per hour,
//! `access-YYYYMMDD-HH.log` (UTC); the file is switched the first time a
//! record from a new hour arrives. With stdout enabled, each line is also
//! printed. Requests only queue their record; a writer task owns the file
//! and does all the I/O.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use super::{LogRecord, LogSink};

const MAX_BATCH: usize = 256;

pub struct ApacheLogger {
    tx: mpsc::UnboundedSender<LogRecord>,
    writer: JoinHandle<()>,
}

impl ApacheLogger {
    /// Creates the log directory if needed and starts the writer task.
    pub async fn spawn(dir: Option<PathBuf>, stdout: bool) -> io::Result<Self> {
        if let Some(dir) = &dir {
            fs::create_dir_all(dir).await?;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = Writer { dir, stdout: stdout.then(tokio::io::stdout), current: None };
        Ok(Self { tx, writer: tokio::spawn(writer.run(rx)) })
    }

    /// File name holding records from `time`'s hour.
    pub fn file_name(time: DateTime<Utc>) -> String {
        time.format("access-%Y%m%d-%H.log").to_string()
    }

    /// Stops accepting records and waits until the queued ones are written.
    pub async fn close(self) {
        drop(self.tx);
        let _ = self.writer.await;
    }
}

impl LogSink for ApacheLogger {
    fn log(&self, record: &LogRecord) {
        // Closed only once the writer is gone, i.e. at runtime shutdown.
        let _ = self.tx.send(record.clone());
    }
}

struct HourFile {
    name: String,
    file: File,
}

struct Writer {
    dir: Option<PathBuf>,
    stdout: Option<Stdout>,
    current: Option<HourFile>,
}

impl Writer {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<LogRecord>) {
        let mut batch = Vec::with_capacity(MAX_BATCH);
        while rx.recv_many(&mut batch, MAX_BATCH).await > 0 {
            for record in batch.drain(..) {
                let line = format!("{}\n", record.combined());
                if let Some(dir) = self.dir.clone() {
                    if let Err(e) = self.write_file(&dir, record.time, &line).await {
                        warn!(dir = %dir.display(), "writing access log: {e}");
                    }
                }
                if let Some(out) = self.stdout.as_mut() {
                    let _ = out.write_all(line.as_bytes()).await;
                }
            }
            self.flush().await;
        }
        self.flush().await;
    }

    async fn write_file(&mut self, dir: &Path, time: DateTime<Utc>, line: &str) -> io::Result<()> {
        let name = ApacheLogger::file_name(time);
        if self.current.as_ref().is_none_or(|h| h.name != name) {
            if let Some(mut old) = self.current.take() {
                old.file.flush().await?;
            }
            let file = OpenOptions::new().create(true).append(true).open(dir.join(&name)).await?;
            self.current = Some(HourFile { name, file });
        }
        if let Some(hour) = self.current.as_mut() {
            hour.file.write_all(line.as_bytes()).await?;
        }
        Ok(())
    }

    async fn flush(&mut self) {
        if let Some(hour) = self.current.as_mut() {
            if let Err(e) = hour.file.flush().await {
                warn!(file = %hour.name, "flushing access log: {e}");
            }
        }
        if let Some(out) = self.stdout.as_mut() {
            let _ = out.flush().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn record(hour: u32, uri: &str) -> LogRecord {
        LogRecord {
            remote_addr: "192.0.2.1:4000".parse().unwrap(),
            time: Utc.with_ymd_and_hms(2026, 10, 17, hour, 30, 0).unwrap(),
            method: "GET".into(),
            uri: uri.into(),
            proto: "HTTP/1.1".into(),
            status: 200,
            size: 12,
            referer: String::new(),
            user_agent: "test".into(),
        }
    }

    #[tokio::test]
    async fn one_file_per_hour() {
        let dir = tempfile::tempdir().unwrap();
        let logger = ApacheLogger::spawn(Some(dir.path().join("logs")), false).await.unwrap();

        logger.log(&record(9, "/a"));
        logger.log(&record(9, "/b"));
        logger.log(&record(10, "/c"));
        logger.close().await;

        let nine = std::fs::read_to_string(dir.path().join("logs/access-20261017-09.log")).unwrap();
        let ten = std::fs::read_to_string(dir.path().join("logs/access-20261017-10.log")).unwrap();
        assert_eq!(nine.lines().count(), 2);
        assert!(nine.contains("\"GET /a HTTP/1.1\" 200 12"));
        assert!(nine.contains("\"GET /b HTTP/1.1\""));
        assert_eq!(ten.lines().count(), 1);
        assert!(ten.contains("/c"));
    }

    #[tokio::test]
    async fn reopening_an_hour_appends() {
        let dir = tempfile::tempdir().unwrap();
        for uri in ["/x", "/y"] {
            let logger = ApacheLogger::spawn(Some(dir.path().into()), false).await.unwrap();
            logger.log(&record(3, uri));
            logger.close().await;
        }
        let text = std::fs::read_to_string(dir.path().join("access-20261017-03.log")).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn logging_only_queues_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let logger = ApacheLogger::spawn(Some(dir.path().into()), false).await.unwrap();
        logger.log(&record(5, "/queued"));
        // The writer has not been polled yet on this single-threaded runtime.
        assert!(!dir.path().join("access-20261017-05.log").exists());
        logger.close().await;
        assert!(dir.path().join("access-20261017-05.log").exists());
    }
}
