//! Cloud Storage object fetches.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::auth::TokenSource;
use crate::error::{Error, Result};

/// Read-only access to one bucket, by exact object key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
}

/// A Cloud Storage bucket read through the JSON API.
pub struct GcsBucket {
    http: Client,
    bucket: String,
    tokens: TokenSource,
}

impl GcsBucket {
    pub fn new(bucket: &str, tokens: TokenSource) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { http, bucket: bucket.to_owned(), tokens })
    }

    fn fail(&self, key: &str, reason: impl std::fmt::Display) -> Error {
        Error::Storage { bucket: self.bucket.clone(), key: key.to_owned(), reason: reason.to_string() }
    }
}

#[async_trait]
impl ObjectStore for GcsBucket {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let token = self.tokens.token().await?;
        let url = object_url(&self.bucket, key);
        let res = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| self.fail(key, e))?;
        match res.status() {
            StatusCode::OK => Ok(res.bytes().await.map_err(|e| self.fail(key, e))?.to_vec()),
            StatusCode::NOT_FOUND => Err(self.fail(key, "object does not exist")),
            status => Err(self.fail(key, format!("status {status}"))),
        }
    }
}

/// Media download URL; the object name is a single path segment.
fn object_url(bucket: &str, key: &str) -> String {
    format!(
        "https://storage.googleapis.com/storage/v1/b/{bucket}/o/{}?alt=media",
        urlencoding::encode(key)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_names_are_single_segments() {
        assert_eq!(object_url("b", "ssl.crt"), "https://storage.googleapis.com/storage/v1/b/b/o/ssl.crt?alt=media");
        assert_eq!(
            object_url("camlistore-website-resource", "a/b c.json"),
            "https://storage.googleapis.com/storage/v1/b/camlistore-website-resource/o/a%2Fb%20c.json?alt=media"
        );
    }
}
