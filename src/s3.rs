//! S3-compatible blob store.
//!
//! Reads and writes whole objects with the S3 REST API, signed with
//! [AWS Signature Version 4](crate::sigv4). Custom endpoints (MinIO,
//! LocalStack) are addressed path-style (`http://host:9000/<bucket>/<key>`);
//! AWS itself is addressed virtual-hosted-style
//! (`https://<bucket>.s3.<region>.amazonaws.com/<key>`).
//!
//! # Configuration
//!
//! ```toml
//! [storage]
//! bucket = "documents"
//! region = "us-east-1"
//! # endpoint_url = "http://localhost:9000"   # MinIO
//! ```

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::blob::BlobStore;
use crate::config::StorageConfig;
use crate::sigv4::{self, Credentials, Target};

/// Per-request timeout for object transfers.
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(120);

/// Where a bucket lives and how its objects are addressed.
#[derive(Debug, Clone)]
pub struct S3Location {
    pub bucket: String,
    pub region: String,
    pub scheme: String,
    pub host: String,
    pub path_style: bool,
}

impl S3Location {
    /// Resolve addressing for the configured bucket.
    ///
    /// If a custom `endpoint_url` is set, that host is used with path-style
    /// keys; otherwise the standard `<bucket>.s3.<region>.amazonaws.com`.
    pub fn from_config(config: &StorageConfig) -> Self {
        match config.endpoint_url {
            Some(ref endpoint) => {
                let (scheme, rest) = match endpoint.split_once("://") {
                    Some((scheme, rest)) => (scheme.to_string(), rest),
                    None => ("https".to_string(), endpoint.as_str()),
                };
                Self {
                    bucket: config.bucket.clone(),
                    region: config.region.clone(),
                    scheme,
                    host: rest.trim_end_matches('/').to_string(),
                    path_style: true,
                }
            }
            None => Self {
                bucket: config.bucket.clone(),
                region: config.region.clone(),
                scheme: "https".to_string(),
                host: format!("{}.s3.{}.amazonaws.com", config.bucket, config.region),
                path_style: false,
            },
        }
    }

    /// Canonical (encoded) path of an object.
    pub fn object_path(&self, key: &str) -> String {
        if self.path_style {
            format!("/{}/{}", sigv4::uri_encode(&self.bucket), sigv4::encode_key(key))
        } else {
            format!("/{}", sigv4::encode_key(key))
        }
    }

    pub fn target<'a>(&'a self, method: &'a str, path: &'a str) -> Target<'a> {
        Target {
            method,
            scheme: &self.scheme,
            host: &self.host,
            path,
        }
    }
}

/// [`BlobStore`] backed by an S3 bucket.
pub struct S3BlobStore {
    location: S3Location,
    creds: Credentials,
    client: reqwest::Client,
}

impl S3BlobStore {
    pub fn new(location: S3Location, creds: Credentials) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(TRANSFER_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            location,
            creds,
            client,
        })
    }

    /// Build a store from configuration, reading credentials from the
    /// environment.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        Self::new(S3Location::from_config(config), Credentials::from_env()?)
    }

    fn request(
        &self,
        method: reqwest::Method,
        key: &str,
        payload_hash: &str,
    ) -> reqwest::RequestBuilder {
        let path = self.location.object_path(key);
        let target = self.location.target(method.as_str(), &path);
        let headers = sigv4::sign_headers(
            &target,
            &self.location.region,
            &self.creds,
            payload_hash,
            Utc::now(),
        );
        let url = format!("{}://{}{}", self.location.scheme, self.location.host, path);
        let mut req = self.client.request(method, &url);
        for (name, value) in headers {
            req = req.header(name, value);
        }
        req
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn get(&self, name: &str) -> Result<Vec<u8>> {
        let resp = self
            .request(reqwest::Method::GET, name, &sigv4::hex_sha256(b""))
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!("Failed to get s3://{}/{}: {}", self.location.bucket, name, e)
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            bail!("S3 GetObject failed (HTTP {}) for key '{}'", status, name);
        }

        let bytes = resp.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let payload_hash = sigv4::hex_sha256(&bytes);
        let len = bytes.len();
        let resp = self
            .request(reqwest::Method::PUT, name, &payload_hash)
            .body(bytes)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!("Failed to put s3://{}/{}: {}", self.location.bucket, name, e)
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "S3 PutObject failed (HTTP {}) for key '{}': {}",
                status,
                name,
                body.chars().take(500).collect::<String>()
            );
        }
        tracing::debug!(blob = %name, bytes = len, "stored blob");
        Ok(())
    }
}
