//! Object storage for photos of confirmed meals (S3 / MinIO).

use std::time::Duration;

use anyhow::Context;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use axum::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use crate::capture::ext_from_mime;
use crate::config::StorageConfig;

pub const PHOTO_URL_TTL_SECS: u64 = 10 * 60;

#[async_trait]
pub trait PhotoArchive: Send + Sync {
    async fn put_photo(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn delete_photo(&self, key: &str) -> anyhow::Result<()>;
    async fn photo_url(&self, key: &str, seconds: u64) -> anyhow::Result<String>;
}

pub fn meal_photo_key(user_id: Uuid, meal_id: Uuid, content_type: &str) -> String {
    let ext = ext_from_mime(content_type).unwrap_or("bin");
    format!("meals/{}/{}.{}", user_id, meal_id, ext)
}

#[derive(Clone)]
pub struct S3PhotoArchive {
    client: Client,
    bucket: String,
}

impl S3PhotoArchive {
    pub async fn connect(cfg: &StorageConfig) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&cfg.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        tracing::info!(endpoint = %cfg.endpoint, bucket = %cfg.bucket, "photo archive enabled");
        Ok(Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
        })
    }
}

#[async_trait]
impl PhotoArchive for S3PhotoArchive {
    async fn put_photo(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .with_context(|| format!("s3 put_object {}", key))?;
        Ok(())
    }

    async fn delete_photo(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("s3 delete_object {}", key))?;
        Ok(())
    }

    async fn photo_url(&self, key: &str, seconds: u64) -> anyhow::Result<String> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(PresigningConfig::expires_in(Duration::from_secs(seconds))?)
            .await
            .with_context(|| format!("s3 presign {}", key))?;
        Ok(presigned.uri().to_string())
    }
}
