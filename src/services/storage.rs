use async_trait::async_trait;
use aws_sdk_s3::{config::Region, primitives::ByteStream};

use crate::{config::AppConfig, services::asset_reconciliation::PendingFile};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    #[error("Storage rejected '{path}': {message}")]
    Rejected { path: String, message: String },
    #[error("Asset URL '{0}' does not belong to the configured storage.")]
    ForeignUrl(String),
}

/// Upload contract for property assets. One call per file, no retries.
#[async_trait]
pub trait AssetStorage: Send + Sync {
    /// Stores `file` at `path` and returns its public URL.
    async fn upload(&self, file: &PendingFile, path: &str) -> Result<String, StorageError>;

    async fn delete(&self, public_url: &str) -> Result<(), StorageError>;
}

/// `{entity_type}/{slug}/{role}-{timestamp}[-{index}].{ext}`
pub fn build_asset_path(
    entity_type: &str,
    slug: &str,
    role: &str,
    timestamp_millis: i64,
    index: Option<usize>,
    extension: &str,
) -> String {
    let slug = if slug.trim().is_empty() {
        "untitled"
    } else {
        slug.trim()
    };
    match index {
        Some(index) => {
            format!("{entity_type}/{slug}/{role}-{timestamp_millis}-{index}.{extension}")
        }
        None => format!("{entity_type}/{slug}/{role}-{timestamp_millis}.{extension}"),
    }
}

pub struct S3Storage {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base_url: String,
}

impl S3Storage {
    /// Returns `None` when no bucket is configured.
    pub async fn from_config(config: &AppConfig) -> Option<Self> {
        let bucket = config.storage_bucket.clone()?;
        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.storage_region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.storage_endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        let client = aws_sdk_s3::Client::from_conf(builder.build());

        let public_base_url = config
            .storage_public_base_url
            .clone()
            .unwrap_or_else(|| default_public_base_url(config, &bucket));

        tracing::info!(bucket = %bucket, "Asset storage configured");
        Some(Self {
            client,
            bucket,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn key_for_url<'a>(&self, public_url: &'a str) -> Option<&'a str> {
        public_url
            .strip_prefix(self.public_base_url.as_str())
            .map(|rest| rest.trim_start_matches('/'))
            .filter(|key| !key.is_empty())
    }
}

fn default_public_base_url(config: &AppConfig, bucket: &str) -> String {
    match &config.storage_endpoint {
        Some(endpoint) => format!("{}/{bucket}", endpoint.trim_end_matches('/')),
        None => format!(
            "https://{bucket}.s3.{}.amazonaws.com",
            config.storage_region
        ),
    }
}

#[async_trait]
impl AssetStorage for S3Storage {
    #[tracing::instrument(skip(self, file), fields(size = file.size()))]
    async fn upload(&self, file: &PendingFile, path: &str) -> Result<String, StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .content_type(&file.content_type)
            .body(ByteStream::from(file.bytes.to_vec()))
            .send()
            .await
            .map_err(|error| {
                tracing::error!(path = %path, error = %error, "Asset upload failed");
                StorageError::Rejected {
                    path: path.to_string(),
                    message: error.to_string(),
                }
            })?;
        Ok(format!("{}/{path}", self.public_base_url))
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, public_url: &str) -> Result<(), StorageError> {
        let key = self
            .key_for_url(public_url)
            .ok_or_else(|| StorageError::ForeignUrl(public_url.to_string()))?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|error| StorageError::Rejected {
                path: key.to_string(),
                message: error.to_string(),
            })?;
        Ok(())
    }
}

/// Stand-in used when no bucket is configured. Every call fails, which the
/// submit pipeline reports like any other storage rejection.
pub struct UnconfiguredStorage;

#[async_trait]
impl AssetStorage for UnconfiguredStorage {
    async fn upload(&self, _file: &PendingFile, path: &str) -> Result<String, StorageError> {
        Err(StorageError::Rejected {
            path: path.to_string(),
            message: "asset storage is not configured".to_string(),
        })
    }

    async fn delete(&self, public_url: &str) -> Result<(), StorageError> {
        Err(StorageError::ForeignUrl(public_url.to_string()))
    }
}
