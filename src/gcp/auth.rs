//! OAuth2 access tokens for Google APIs.
//!
//! Two sources: a service-account JSON key (signed JWT exchanged at the
//! key's token endpoint), or the metadata server's default account. Tokens
//! are cached until shortly before they expire.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::metadata::MetadataClient;
use crate::error::{Error, Result};

const JWT_BEARER: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// The fields of a service-account key file this crate uses.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Clone)]
enum Provider {
    Key { key: Arc<ServiceAccountKey>, scopes: String, http: Client },
    Metadata(MetadataClient),
}

/// Cloneable, caching source of bearer tokens.
#[derive(Clone)]
pub struct TokenSource {
    provider: Provider,
    cache: Arc<Mutex<Option<(String, Instant)>>>,
}

impl TokenSource {
    /// Tokens for the instance's default service account.
    pub fn metadata() -> Self {
        Self::with(Provider::Metadata(MetadataClient::new()))
    }

    /// Tokens for the service account in the JSON key at `path`.
    pub async fn from_key_file(path: &Path, scopes: &[&str]) -> Result<Self> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            Error::Auth(format!("reading service account key {}: {e}", path.display()))
        })?;
        let key: ServiceAccountKey = serde_json::from_slice(&data).map_err(|e| {
            Error::Auth(format!("parsing service account key {}: {e}", path.display()))
        })?;
        // Fail on a bad key at startup rather than on first use.
        EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| Error::Auth(format!("service account private key: {e}")))?;
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self::with(Provider::Key { key: Arc::new(key), scopes: scopes.join(" "), http }))
    }

    fn with(provider: Provider) -> Self {
        Self { provider, cache: Arc::new(Mutex::new(None)) }
    }

    /// A valid bearer token, fetching a new one when the cached one is
    /// about to expire.
    pub async fn token(&self) -> Result<String> {
        let mut cache = self.cache.lock().await;
        if let Some((token, expires)) = cache.as_ref() {
            if Instant::now() + REFRESH_MARGIN < *expires {
                return Ok(token.clone());
            }
        }
        let (token, ttl) = match &self.provider {
            Provider::Metadata(client) => {
                let t = client.token().await?;
                (t.access_token, t.expires_in)
            }
            Provider::Key { key, scopes, http } => exchange(http, key, scopes).await?,
        };
        *cache = Some((token.clone(), Instant::now() + Duration::from_secs(ttl)));
        Ok(token)
    }
}

async fn exchange(http: &Client, key: &ServiceAccountKey, scopes: &str) -> Result<(String, u64)> {
    let aud = key.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
    let assertion = sign_assertion(key, scopes, aud, chrono::Utc::now().timestamp())?;
    let res = http
        .post(aud)
        .form(&[("grant_type", JWT_BEARER), ("assertion", assertion.as_str())])
        .send()
        .await?;
    if !res.status().is_success() {
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        return Err(Error::Auth(format!("token exchange: {status}: {body}")));
    }
    let t: TokenResponse = res.json().await?;
    Ok((t.access_token, t.expires_in))
}

/// RS256 JWT asserting `key`'s identity for `scopes`, valid one hour from `now`.
fn sign_assertion(key: &ServiceAccountKey, scopes: &str, aud: &str, now: i64) -> Result<String> {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();
    let claims = Claims { iss: &key.client_email, scope: scopes, aud, iat: now, exp: now + 3600 };
    let signing = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| Error::Auth(format!("service account private key: {e}")))?;
    jsonwebtoken::encode(&header, &claims, &signing)
        .map_err(|e| Error::Auth(format!("signing token request: {e}")))
}
