//! Certificate and key for the HTTPS listener.

use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::error::{Error, Result};
use crate::gcp::ObjectStore;

pub const CERT_OBJECT: &str = "ssl.crt";
pub const KEY_OBJECT: &str = "ssl.key";

/// A PEM certificate chain and its private key, kept in memory.
#[derive(Clone)]
pub struct TlsMaterial {
    cert_pem: Vec<u8>,
    key_pem: Vec<u8>,
}

impl TlsMaterial {
    pub fn from_pem(cert_pem: Vec<u8>, key_pem: Vec<u8>) -> Self {
        Self { cert_pem, key_pem }
    }

    pub async fn from_files(cert: &Path, key: &Path) -> Result<Self> {
        let read = |path: &Path| {
            let path = path.to_path_buf();
            async move {
                tokio::fs::read(&path)
                    .await
                    .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))
            }
        };
        Ok(Self::from_pem(read(cert).await?, read(key).await?))
    }

    /// Fetches `ssl.crt` and `ssl.key` from the site's resource bucket.
    pub async fn from_store(store: &dyn ObjectStore) -> Result<Self> {
        let cert = store.get(CERT_OBJECT).await?;
        let key = store.get(KEY_OBJECT).await?;
        Ok(Self::from_pem(cert, key))
    }

    /// A server configuration offering HTTP/2 and HTTP/1.1.
    pub fn server_config(&self) -> Result<Arc<ServerConfig>> {
        let certs: Vec<CertificateDer<'static>> =
            rustls_pemfile::certs(&mut BufReader::new(self.cert_pem.as_slice()))
                .collect::<std::io::Result<_>>()
                .map_err(|e| Error::Config(format!("parsing certificate: {e}")))?;
        if certs.is_empty() {
            return Err(Error::Config("no certificate in PEM data".into()));
        }
        let key: PrivateKeyDer<'static> =
            rustls_pemfile::private_key(&mut BufReader::new(self.key_pem.as_slice()))
                .map_err(|e| Error::Config(format!("parsing private key: {e}")))?
                .ok_or_else(|| Error::Config("no private key in PEM data".into()))?;

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(certs, key)?;
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
        Ok(Arc::new(config))
    }
}
