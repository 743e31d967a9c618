use crate::config::S3Config;
use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Credentials};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Errors building a storage key from a client-supplied file name
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("file name `{0}` has no extension")]
    MissingExtension(String),
}

/// Object store client for photo binaries.
///
/// Built once at startup and shared across requests; every call goes straight
/// to the S3 API with no local state.
pub struct S3Storage {
    client: S3Client,
    bucket: String,
    region: String,
    endpoint_url: Option<String>,
    key_prefix: String,
}

impl S3Storage {
    /// Create a new S3 storage client
    pub async fn new(config: &S3Config) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        // Static credentials for MinIO/LocalStack style deployments; the
        // default provider chain applies otherwise.
        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "gallery-config",
            ));
        }

        let aws_config = loader.load().await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 storage client initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            endpoint_url: config.endpoint_url.clone(),
            key_prefix: config.key_prefix.clone(),
        })
    }

    /// Generate a fresh storage key for an uploaded file name.
    /// Format: `{prefix}/{uuid}.{extension}`
    pub fn storage_key(&self, file_name: &str) -> Result<String, KeyError> {
        build_storage_key(&self.key_prefix, file_name)
    }

    /// Deterministic, non-expiring URL for an object (direct upload workflow)
    pub fn public_url(&self, key: &str) -> String {
        public_object_url(
            self.endpoint_url.as_deref(),
            &self.region,
            &self.bucket,
            key,
        )
    }

    /// Presign a time-limited GET URL for viewing an object
    pub async fn presign_get(&self, key: &str, expiry: Duration) -> Result<String> {
        let presigning_config =
            PresigningConfig::expires_in(expiry).context("Failed to create presigning config")?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .context("Failed to presign view URL")?;

        Ok(presigned.uri().to_string())
    }

    /// Presign a time-limited PUT URL so the client can upload directly
    pub async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expiry: Duration,
    ) -> Result<String> {
        let presigning_config =
            PresigningConfig::expires_in(expiry).context("Failed to create presigning config")?;

        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(presigning_config)
            .await
            .context("Failed to presign upload URL")?;

        Ok(presigned.uri().to_string())
    }

    /// Upload photo bytes under a key
    #[instrument(skip(self, data), fields(key = %key, size_bytes = data.len()))]
    pub async fn upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .context("Failed to upload photo to S3")?;

        debug!(key = %key, "Photo uploaded");
        Ok(())
    }

    /// Delete an object from the store
    #[instrument(skip(self), fields(key = %key))]
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("Failed to delete photo from S3")?;

        debug!(key = %key, "Photo deleted from S3");
        Ok(())
    }

    /// List every object key under the photo prefix
    #[instrument(skip(self))]
    pub async fn list_keys(&self) -> Result<Vec<String>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(format!("{}/", self.key_prefix))
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.context("Failed to list photo objects")?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(String::from)),
            );
        }

        Ok(keys)
    }
}

/// Extension of a file name: the substring after the last `.`, if any
pub fn file_extension(file_name: &str) -> Option<&str> {
    match file_name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => Some(ext),
        _ => None,
    }
}

/// Build a storage key of the form `{prefix}/{uuid}.{extension}`.
/// A file name without an extension is rejected rather than producing an
/// ill-formed key.
pub fn build_storage_key(prefix: &str, file_name: &str) -> Result<String, KeyError> {
    let extension =
        file_extension(file_name).ok_or_else(|| KeyError::MissingExtension(file_name.into()))?;
    Ok(format!("{}/{}.{}", prefix, Uuid::new_v4(), extension))
}

/// Public URL for an object: `{endpoint}/{bucket}/{key}` with a custom
/// endpoint, virtual-hosted style against AWS otherwise
pub fn public_object_url(endpoint_url: Option<&str>, region: &str, bucket: &str, key: &str) -> String {
    match endpoint_url {
        Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key),
        None => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key),
    }
}

/// Content type for a file extension
pub fn content_type_for(extension: &str) -> &'static str {
    match extension.to_lowercase().as_str() {
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}
