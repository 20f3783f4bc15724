//! Unified error type.

use thiserror::Error;

/// Shorthand for results carrying the crate [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type returned by camweb's fallible operations.
///
/// Application-level outcomes (404, 401, redirects) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// startup and infrastructure failures: binding a port, talking to the
/// metadata server, fetching objects, parsing credentials.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("tls: {0}")]
    Tls(#[from] rustls::Error),

    #[error("template: {0}")]
    Template(#[from] tera::Error),

    #[error("metadata: {0}")]
    Metadata(String),

    #[error("fetching object {key:?} in bucket {bucket:?}: {reason}")]
    Storage {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("auth: {0}")]
    Auth(String),

    #[error("config: {0}")]
    Config(String),

    #[error("process {program}: {reason}")]
    Process { program: String, reason: String },

    #[error("mail: {0}")]
    Mail(String),

    #[error("listener {addr}: {source}")]
    Listen {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn process(program: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Process { program: program.into(), reason: reason.to_string() }
    }
}
