//! Log artifact retrieval.
//!
//! This module provides the collaborator that fetches compressed log
//! objects, either from an object store over HTTP or from a local
//! directory laid out as `<root>/<bucket>/<key>`.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use url::Url;

use crate::models::{LogSourceConfig, LogSourceKind};

/// Errors that can occur while retrieving a log artifact
#[derive(Debug, Error)]
pub enum LogSourceError {
    #[error("Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Object {bucket}/{key} not found")]
    NotFound { bucket: String, key: String },
    #[error("Unexpected status {status} fetching {bucket}/{key}")]
    UnexpectedStatus {
        status: u16,
        bucket: String,
        key: String,
    },
    #[error("Invalid object location: {0}")]
    InvalidLocation(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decompress log: {0}")]
    Decompression(std::io::Error),
}

/// Source of compressed log artifacts
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Fetch the raw (still compressed) bytes of an object
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, LogSourceError>;
}

/// Object store reachable over plain HTTP(S) GETs of `<endpoint>/<bucket>/<key>`
pub struct ObjectStoreLogSource {
    client: Client,
    endpoint: Url,
}

impl ObjectStoreLogSource {
    pub fn new(client: Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    fn object_url(&self, bucket: &str, key: &str) -> Result<Url, LogSourceError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| LogSourceError::InvalidLocation(self.endpoint.to_string()))?
            .pop_if_empty()
            .push(bucket)
            .extend(key.split('/'));
        Ok(url)
    }
}

#[async_trait]
impl LogSource for ObjectStoreLogSource {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, LogSourceError> {
        let url = self.object_url(bucket, key)?;
        info!("Downloading log from object store: {}/{}", bucket, key);

        let response = self.client.get(url).send().await?;
        match response.status() {
            status if status.is_success() => {
                let body = response.bytes().await?;
                debug!("Downloaded {} bytes from {}/{}", body.len(), bucket, key);
                Ok(body.to_vec())
            }
            StatusCode::NOT_FOUND => Err(LogSourceError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            status => Err(LogSourceError::UnexpectedStatus {
                status: status.as_u16(),
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
        }
    }
}

/// Local directory holding one sub-directory per bucket
pub struct LocalLogSource {
    root: PathBuf,
}

impl LocalLogSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, LogSourceError> {
        for part in [bucket, key] {
            let plain = Path::new(part)
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
            if part.is_empty() || !plain {
                return Err(LogSourceError::InvalidLocation(format!("{}/{}", bucket, key)));
            }
        }
        Ok(self.root.join(bucket).join(key))
    }
}

#[async_trait]
impl LogSource for LocalLogSource {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, LogSourceError> {
        let path = self.object_path(bucket, key)?;
        info!("Reading log from {}", path.display());

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(LogSourceError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(LogSourceError::Io(e)),
        }
    }
}

/// Build the configured log source
pub fn from_config(config: &LogSourceConfig) -> Result<Arc<dyn LogSource>, LogSourceError> {
    match config.kind {
        LogSourceKind::ObjectStore => {
            let endpoint = Url::parse(&config.endpoint)
                .map_err(|e| LogSourceError::InvalidLocation(format!("{}: {}", config.endpoint, e)))?;
            let client = Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_seconds))
                .build()?;
            Ok(Arc::new(ObjectStoreLogSource::new(client, endpoint)))
        }
        LogSourceKind::Local => Ok(Arc::new(LocalLogSource::new(&config.root))),
    }
}
