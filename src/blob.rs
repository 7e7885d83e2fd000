//! Resume file storage.
//!
//! Objects live under `{owner}/{timestamp}_{file_name}`. The remote store speaks the object
//! storage HTTP API with the service key; the local store writes below a directory and is what
//! runs when no remote store is configured.

use crate::config::StorageConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

const LOCAL_SCHEME: &str = "local://";

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("only PDF files are accepted")]
    UnsupportedType,
    #[error("empty file uploaded")]
    Empty,
    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("storage io failed: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores the file and returns the URL recorded on the resume row.
    async fn put(&self, owner: Uuid, file_name: &str, content: Vec<u8>) -> Result<String, BlobError>;
    /// Removes an object previously returned by `put`. URLs this store did not issue are ignored.
    async fn delete(&self, url: &str) -> Result<(), BlobError>;
}

pub fn check_upload(file_name: &str, content: &[u8]) -> Result<(), BlobError> {
    if !file_name.to_ascii_lowercase().ends_with(".pdf") {
        return Err(BlobError::UnsupportedType);
    }
    if content.is_empty() {
        return Err(BlobError::Empty);
    }
    Ok(())
}

pub fn object_path(owner: Uuid, file_name: &str, at: DateTime<Utc>) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let safe: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    format!("{}/{}_{}", owner, at.format("%Y%m%d_%H%M%S"), safe)
}

pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

impl HttpBlobStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            bucket: config.bucket.clone(),
        }
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path)
    }

    fn public_prefix(&self) -> String {
        format!("{}/storage/v1/object/public/{}/", self.base_url, self.bucket)
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(&self, owner: Uuid, file_name: &str, content: Vec<u8>) -> Result<String, BlobError> {
        check_upload(file_name, &content)?;
        let path = object_path(owner, file_name, Utc::now());
        self.client
            .post(self.object_url(&path))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header(CONTENT_TYPE, "application/pdf")
            .body(content)
            .send()
            .await?
            .error_for_status()?;
        tracing::info!(%owner, %path, "resume file uploaded");
        Ok(format!("{}{}", self.public_prefix(), path))
    }

    async fn delete(&self, url: &str) -> Result<(), BlobError> {
        let Some(path) = url.strip_prefix(&self.public_prefix()) else {
            tracing::debug!(%url, "not a managed object, skipping delete");
            return Ok(());
        };
        self.client
            .delete(self.object_url(path))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .send()
            .await?
            .error_for_status()?;
        tracing::info!(%path, "resume file deleted");
        Ok(())
    }
}

pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, url: &str) -> Option<PathBuf> {
        let relative = Path::new(url.strip_prefix(LOCAL_SCHEME)?);
        if relative.components().all(|c| matches!(c, Component::Normal(_))) {
            Some(self.root.join(relative))
        } else {
            None
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, owner: Uuid, file_name: &str, content: Vec<u8>) -> Result<String, BlobError> {
        check_upload(file_name, &content)?;
        let path = object_path(owner, file_name, Utc::now());
        let target = self.root.join(&path);
        if let Some(dir) = target.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&target, content).await?;
        tracing::info!(%owner, %path, "resume file written");
        Ok(format!("{}{}", LOCAL_SCHEME, path))
    }

    async fn delete(&self, url: &str) -> Result<(), BlobError> {
        let Some(target) = self.resolve(url) else {
            return Ok(());
        };
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
