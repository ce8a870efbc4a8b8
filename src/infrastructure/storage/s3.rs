/// S3 object store
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info};

use super::ObjectStore;
use crate::config::StorageConfig;
use crate::domain::shared::{Result, TelephonyError};
use crate::infrastructure::metrics::record_media_transfer;

#[derive(Clone)]
pub struct S3ObjectStore {
    client: Arc<Client>,
}

impl S3ObjectStore {
    /// Build a client for the configured region. A custom endpoint switches
    /// to path-style addressing for S3-compatible stores.
    pub async fn new(config: &StorageConfig) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            info!("Using S3 endpoint {}", endpoint);
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Arc::new(Client::from_conf(builder.build())),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(&self, bucket: &str, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        debug!("Uploading {} bytes to s3://{}/{}", body.len(), bucket, key);
        let result = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await;

        record_media_transfer("upload", result.is_ok());
        result
            .map(|_| ())
            .map_err(|e| TelephonyError::FileUpload(format!("s3://{}/{}: {}", bucket, key, e)))
    }

    async fn download(&self, bucket: &str, key: &str) -> Result<Bytes> {
        debug!("Downloading s3://{}/{}", bucket, key);
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                record_media_transfer("download", false);
                TelephonyError::FileDownload(format!("s3://{}/{}: {}", bucket, key, e))
            })?;

        let body = response.body.collect().await.map_err(|e| {
            record_media_transfer("download", false);
            TelephonyError::FileDownload(format!("s3://{}/{}: {}", bucket, key, e))
        })?;
        record_media_transfer("download", true);
        Ok(body.into_bytes())
    }
}
