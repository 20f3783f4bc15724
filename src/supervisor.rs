//! Long-running units of the process and how their failures end it.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::containers;
use crate::env::Environment;
use crate::error::{Error, Result};
use crate::handler::BoxedEndpoint;
use crate::server::{Server, TLS_KEEPALIVE};

/// Listeners, side-car container and child process, started together.
pub struct Supervisor {
    pub env: Environment,
    pub http_addr: String,
    /// HTTPS address and its TLS configuration.
    pub https: Option<(String, Arc<rustls::ServerConfig>)>,
    pub endpoint: BoxedEndpoint,
    /// Keep the demo blob server container running from `src_dir`.
    pub demo_blobserver: bool,
    pub src_dir: PathBuf,
    /// Program started alongside the server, looked up on `PATH`.
    pub also_run: Option<String>,
}

impl Supervisor {
    /// Starts every unit and waits for the first failure.
    ///
    /// Listeners never return on their own, so this normally runs for the
    /// life of the process. The container loop's failures are only logged.
    pub async fn run(self) -> Result<()> {
        let (done, mut failures) = mpsc::channel::<Result<()>>(4);

        let http = Server::bind(&self.http_addr);
        let endpoint = Arc::clone(&self.endpoint);
        let tx = done.clone();
        tokio::spawn(async move {
            let _ = tx.send(http.serve(endpoint).await).await;
        });

        if let Some((addr, tls)) = self.https {
            let https = Server::bind(&addr).tls(tls).keepalive(TLS_KEEPALIVE);
            let endpoint = Arc::clone(&self.endpoint);
            let tx = done.clone();
            tokio::spawn(async move {
                let _ = tx.send(https.serve(endpoint).await).await;
            });
        }

        if self.demo_blobserver {
            tokio::spawn(containers::run_demo_blobserver_loop(self.env, self.src_dir));
        }

        if let Some(program) = self.also_run.as_deref().filter(|p| !p.is_empty()) {
            watch_child(program, done.clone())?;
        }

        drop(done);
        while let Some(result) = failures.recv().await {
            result?;
        }
        Ok(())
    }
}

/// Starts `program` with the server's stdio and reports its exit.
fn watch_child(program: &str, done: mpsc::Sender<Result<()>>) -> Result<()> {
    let path = containers::which(program)
        .ok_or_else(|| Error::process(program, "not found on PATH"))?;
    let mut child = Command::new(&path)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| Error::process(program, e))?;
    info!(program = %path.display(), pid = child.id(), "started child process");

    let program = program.to_owned();
    tokio::spawn(async move {
        let result = match child.wait().await {
            Ok(status) if status.success() => {
                info!(program = %program, "child process exited");
                Ok(())
            }
            Ok(status) => Err(Error::process(&program, format!("exited with {status}"))),
            Err(e) => Err(Error::process(&program, e)),
        };
        if let Err(e) = &result {
            error!("{e}");
        }
        let _ = done.send(result).await;
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;
    use crate::router::Router;

    fn supervisor(http_addr: &str, also_run: Option<&str>) -> Supervisor {
        Supervisor {
            env: Environment::Development,
            http_addr: http_addr.into(),
            https: None,
            endpoint: Arc::new(Router::new()),
            demo_blobserver: false,
            src_dir: PathBuf::from("."),
            also_run: also_run.map(String::from),
        }
    }

    #[tokio::test]
    async fn listener_failure_ends_the_run() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let err = supervisor(&addr, None).run().await.unwrap_err();
        assert!(matches!(err, Error::Listen { .. }), "{err}");
    }

    #[tokio::test]
    async fn missing_child_program_is_fatal() {
        let err = supervisor("127.0.0.1:0", Some("no-such-program-camweb")).run().await.unwrap_err();
        assert!(err.to_string().contains("not found on PATH"), "{err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_child_is_fatal() {
        let err = supervisor("127.0.0.1:0", Some("false")).run().await.unwrap_err();
        assert!(matches!(err, Error::Process { ref program, .. } if program == "false"), "{err}");
    }
}
