use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use s3::creds::Credentials;
use s3::{Bucket, Region};
use sha2::{Digest, Sha256};
use std::time::Duration;
use uuid::Uuid;

/// Location and fingerprint of an uploaded asset.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAsset {
    pub url: String,
    pub key: String,
    /// Hex-encoded SHA-256 of the uploaded bytes.
    pub checksum: String,
    pub size: u64,
}

/// Durable storage for finished model assets.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Upload under a freshly generated key; `suggested_name` only contributes its extension.
    async fn upload(
        &self,
        bytes: &[u8],
        suggested_name: &str,
        mime_type: &str,
    ) -> Result<StoredAsset, StorageError>;

    /// Best-effort check that the stored object has the expected size.
    async fn verify_integrity(&self, key: &str, expected_size: u64) -> bool;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    async fn health_check(&self) -> Result<(), StorageError>;
}

/// Object key of the form `models/YYYY-MM-DD/<uuid><ext>`.
pub fn asset_key(suggested_name: &str, date: NaiveDate) -> String {
    format!(
        "models/{}/{}{}",
        date.format("%Y-%m-%d"),
        Uuid::new_v4(),
        file_extension(suggested_name)
    )
}

/// Extension including the leading dot, lowercased; empty when absent or suspicious.
fn file_extension(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 10
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => String::new(),
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Client for Cloudflare R2 (or any S3-compatible) object storage.
pub struct R2AssetStore {
    bucket: Box<Bucket>,
    public_base_url: String,
    timeout: Duration,
}

impl R2AssetStore {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        public_base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        let public_base_url = match public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("{}/{}", endpoint.trim_end_matches('/'), bucket_name),
        };

        Ok(Self {
            bucket,
            public_base_url,
            timeout,
        })
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, s3::error::S3Error>>,
    ) -> Result<T, StorageError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| StorageError::Timeout)?
            .map_err(StorageError::S3)
    }
}

#[async_trait]
impl AssetStore for R2AssetStore {
    async fn upload(
        &self,
        bytes: &[u8],
        suggested_name: &str,
        mime_type: &str,
    ) -> Result<StoredAsset, StorageError> {
        let key = asset_key(suggested_name, Utc::now().date_naive());
        let checksum = sha256_hex(bytes);

        let response = self
            .with_timeout(self.bucket.put_object_with_content_type(&key, bytes, mime_type))
            .await?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(StorageError::Status { status, key });
        }

        tracing::info!(
            key = %key,
            size = bytes.len(),
            checksum = %checksum,
            "Asset uploaded to object storage"
        );

        Ok(StoredAsset {
            url: self.public_url(&key),
            key,
            checksum,
            size: bytes.len() as u64,
        })
    }

    async fn verify_integrity(&self, key: &str, expected_size: u64) -> bool {
        match self.with_timeout(self.bucket.head_object(key)).await {
            Ok((head, 200)) => match head.content_length {
                Some(len) if len as u64 == expected_size => true,
                actual => {
                    tracing::warn!(key, expected_size, ?actual, "Stored asset size mismatch");
                    false
                }
            },
            Ok((_, status)) => {
                tracing::warn!(key, status, "Stored asset not found during integrity check");
                false
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Integrity check failed");
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.with_timeout(self.bucket.delete_object(key)).await?;
        tracing::info!(key, "Asset deleted from object storage");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        let (_, status) = self
            .with_timeout(self.bucket.list_page(String::new(), None, None, None, Some(1)))
            .await?;
        if !(200..300).contains(&status) {
            return Err(StorageError::Status {
                status,
                key: String::new(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Storage operation timed out")]
    Timeout,

    #[error("Storage returned HTTP {status} for '{key}'")]
    Status { status: u16, key: String },

    #[error("Storage configuration error: {0}")]
    Config(String),
}
