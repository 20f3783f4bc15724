//! HTTP and HTTPS listeners.
//!
//! A [`Server`] accepts connections forever. There is no graceful shutdown:
//! the first fatal listener error is returned to the caller, which is
//! expected to end the process.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::handler::{BoxedEndpoint, Endpoint};
use crate::request::Request;
use crate::response::Response;

/// Keep-alive period applied to accepted HTTPS connections.
pub const TLS_KEEPALIVE: Duration = Duration::from_secs(3 * 60);

/// One listening socket serving an endpoint.
pub struct Server {
    addr: String,
    tls: Option<Arc<rustls::ServerConfig>>,
    keepalive: Option<Duration>,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// Go-style `:port` addresses bind every interface.
    ///
    /// ```rust,no_run
    /// use camweb::Server;
    /// let server = Server::bind(":31798");
    /// ```
    pub fn bind(addr: &str) -> Self {
        Self { addr: normalize_addr(addr), tls: None, keepalive: None }
    }

    /// Terminate TLS on accepted connections with `config`.
    pub fn tls(mut self, config: Arc<rustls::ServerConfig>) -> Self {
        self.tls = Some(config);
        self
    }

    /// Enable TCP keep-alive with the given idle period on accepted
    /// connections.
    pub fn keepalive(mut self, period: Duration) -> Self {
        self.keepalive = Some(period);
        self
    }

    /// Binds and accepts connections, dispatching each request to
    /// `endpoint`. Only returns on a fatal error.
    pub async fn serve(self, endpoint: BoxedEndpoint) -> Result<()> {
        let listener = TcpListener::bind(&self.addr)
            .await
            .map_err(|source| Error::Listen { addr: self.addr.clone(), source })?;
        let local = listener.local_addr()?;
        let acceptor = self.tls.map(TlsAcceptor::from);

        info!(addr = %local, tls = acceptor.is_some(), "camweb listening");

        loop {
            let (stream, remote_addr) = match listener.accept().await {
                Ok(v) => v,
                Err(e) if is_transient(&e) => {
                    warn!("accept error: {e}; retrying");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
                Err(source) => return Err(Error::Listen { addr: self.addr, source }),
            };

            if let Some(period) = self.keepalive {
                if let Err(e) = set_keepalive(&stream, period) {
                    debug!(peer = %remote_addr, "keepalive: {e}");
                }
            }

            let endpoint = Arc::clone(&endpoint);
            match acceptor.clone() {
                None => {
                    tokio::spawn(serve_connection(stream, remote_addr, false, endpoint));
                }
                Some(acceptor) => {
                    tokio::spawn(async move {
                        match acceptor.accept(stream).await {
                            Ok(tls_stream) => {
                                serve_connection(tls_stream, remote_addr, true, endpoint).await
                            }
                            Err(e) => debug!(peer = %remote_addr, "tls handshake: {e}"),
                        }
                    });
                }
            }
        }
    }
}

async fn serve_connection<S>(stream: S, remote_addr: SocketAddr, tls: bool, endpoint: BoxedEndpoint)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    // Called once per request on the connection, not once per connection.
    let svc = service_fn(move |req| {
        let endpoint = Arc::clone(&endpoint);
        async move { dispatch(endpoint, req, remote_addr, tls).await }
    });

    // `auto::Builder` handles both HTTP/1.1 and HTTP/2.
    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
        .serve_connection(io, svc)
        .await
    {
        error!(peer = %remote_addr, "connection error: {e}");
    }
}

/// Reads the request body and hands the request to the endpoint.
///
/// All failures become responses, so hyper never sees an error.
async fn dispatch(
    endpoint: BoxedEndpoint,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
    tls: bool,
) -> Result<http::Response<Full<Bytes>>, std::convert::Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!(peer = %remote_addr, "reading request body: {e}");
            return Ok(Response::status(http::StatusCode::BAD_REQUEST).into_inner());
        }
    };

    let request = Request::new(http::Request::from_parts(parts, body), remote_addr, tls);
    Ok(endpoint.call(request).await.into_inner())
}

fn set_keepalive(stream: &TcpStream, period: Duration) -> io::Result<()> {
    let socket = socket2::SockRef::from(stream);
    let keepalive = socket2::TcpKeepalive::new().with_time(period);
    #[cfg(any(
        target_os = "android",
        target_os = "freebsd",
        target_os = "fuchsia",
        target_os = "ios",
        target_os = "linux",
        target_os = "macos",
        target_os = "netbsd",
        windows,
    ))]
    let keepalive = keepalive.with_interval(period);
    socket.set_tcp_keepalive(&keepalive)
}

/// Per-connection accept failures that leave the listener usable.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) || e.raw_os_error() == Some(24) // EMFILE: wait for descriptors to free up
}

/// Turns `:80` into `0.0.0.0:80`; other addresses pass through.
pub fn normalize_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn go_style_port_binds_all_interfaces() {
        assert_eq!(normalize_addr(":31798"), "0.0.0.0:31798");
        assert_eq!(normalize_addr("127.0.0.1:80"), "127.0.0.1:80");
        assert_eq!(normalize_addr("localhost:443"), "localhost:443");
    }

    #[tokio::test]
    async fn bind_failure_is_reported_with_the_address() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let endpoint: BoxedEndpoint = Arc::new(crate::Router::new());
        let err = Server::bind(&addr).serve(endpoint).await.unwrap_err();
        match err {
            Error::Listen { addr: reported, .. } => assert_eq!(reported, addr),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn keepalive_probes_use_the_period() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();

        set_keepalive(&stream, Duration::from_secs(180)).unwrap();
        let socket = socket2::SockRef::from(&stream);
        assert!(socket.keepalive().unwrap());
        assert_eq!(socket.keepalive_time().unwrap(), Duration::from_secs(180));
        assert_eq!(socket.keepalive_interval().unwrap(), Duration::from_secs(180));
    }

    #[test]
    fn emfile_is_transient() {
        assert!(is_transient(&io::Error::from_raw_os_error(24)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }
}
